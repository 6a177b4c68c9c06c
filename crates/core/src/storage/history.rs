use crate::domain::{CompetitorObservation, DateRange, HistoricalObservation};
use crate::ingest::types::{CompetitorRateRow, ReservationRow};
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub async fn read_reservations(
    pool: &sqlx::PgPool,
    range: DateRange,
    room_type: Option<&str>,
) -> anyhow::Result<Vec<HistoricalObservation>> {
    let rows = sqlx::query_as::<_, (NaiveDate, String, i32, Option<i32>, f64)>(
        "SELECT date, room_type, rooms_sold, rooms_available, adr \
         FROM reservations \
         WHERE date >= $1 AND date < $2 AND ($3::text IS NULL OR room_type = $3) \
         ORDER BY date ASC, room_type ASC",
    )
    .persistent(false)
    .bind(range.start)
    .bind(range.end)
    .bind(room_type)
    .fetch_all(pool)
    .await
    .context("select reservations failed")?;

    rows.into_iter()
        .map(|(stay_date, room_type, rooms_sold, rooms_available, adr)| {
            let occupancy = u32::try_from(rooms_sold).with_context(|| {
                format!("negative rooms_sold for {room_type} on {stay_date}")
            })?;
            let rooms_available = rooms_available
                .map(u32::try_from)
                .transpose()
                .with_context(|| format!("negative rooms_available for {room_type} on {stay_date}"))?;
            Ok(HistoricalObservation {
                stay_date,
                room_type,
                occupancy,
                rooms_available,
                adr,
            })
        })
        .collect()
}

pub async fn read_competitor_rates(
    pool: &sqlx::PgPool,
    range: DateRange,
    room_type: Option<&str>,
) -> anyhow::Result<Vec<CompetitorObservation>> {
    let rows = sqlx::query_as::<_, (NaiveDate, String, String, f64)>(
        "SELECT date, competitor, room_type, rate \
         FROM competitor_rates \
         WHERE date >= $1 AND date < $2 AND ($3::text IS NULL OR room_type = $3) \
         ORDER BY date ASC, room_type ASC, competitor ASC",
    )
    .persistent(false)
    .bind(range.start)
    .bind(range.end)
    .bind(room_type)
    .fetch_all(pool)
    .await
    .context("select competitor_rates failed")?;

    Ok(rows
        .into_iter()
        .map(|(stay_date, competitor, room_type, rate)| CompetitorObservation {
            stay_date,
            competitor,
            room_type,
            rate,
        })
        .collect())
}

pub async fn upsert_reservations(
    pool: &sqlx::PgPool,
    rows: &[ReservationRow],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!rows.is_empty(), "rows must be non-empty");

    let rows = last_row_per_key(rows, |r| (r.date, r.room_type.trim().to_string()));
    let mut prepared = Vec::with_capacity(rows.len());
    for row in rows {
        let sold = i32::try_from(row.rooms_sold).context("rooms_sold out of range")?;
        let available = row
            .rooms_available
            .map(i32::try_from)
            .transpose()
            .context("rooms_available out of range")?;
        prepared.push((row, sold, available, row.revenue_or_derived()));
    }

    let chunk_size = super::batch_size_from_env("INGEST_UPSERT_BATCH")?;
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let mut affected: u64 = 0;

    for chunk in prepared.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO reservations (date, room_type, rooms_sold, rooms_available, adr, revenue) ",
        );
        qb.push_values(chunk, |mut b, (row, sold, available, revenue)| {
            b.push_bind(row.date)
                .push_bind(row.room_type.trim())
                .push_bind(*sold)
                .push_bind(*available)
                .push_bind(row.adr)
                .push_bind(*revenue);
        });
        qb.push(
            " ON CONFLICT (date, room_type) DO UPDATE \
               SET rooms_sold = EXCLUDED.rooms_sold, rooms_available = EXCLUDED.rooms_available, \
                   adr = EXCLUDED.adr, revenue = EXCLUDED.revenue",
        );

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert reservations failed")?;
        affected += res.rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}

pub async fn upsert_competitor_rates(
    pool: &sqlx::PgPool,
    rows: &[CompetitorRateRow],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!rows.is_empty(), "rows must be non-empty");

    let rows = last_row_per_key(rows, |r| {
        (
            r.date,
            r.competitor.trim().to_string(),
            r.room_type.trim().to_string(),
        )
    });
    let chunk_size = super::batch_size_from_env("INGEST_UPSERT_BATCH")?;
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let mut affected: u64 = 0;

    for chunk in rows.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO competitor_rates (date, competitor, room_type, rate) ",
        );
        qb.push_values(chunk, |mut b, &row| {
            b.push_bind(row.date)
                .push_bind(row.competitor.trim())
                .push_bind(row.room_type.trim())
                .push_bind(row.rate);
        });
        qb.push(" ON CONFLICT (date, competitor, room_type) DO UPDATE SET rate = EXCLUDED.rate");

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert competitor_rates failed")?;
        affected += res.rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}

/// One row per conflict key, the later row winning. A multi-row `ON CONFLICT DO UPDATE` cannot
/// touch the same key twice, and exports do repeat keys.
fn last_row_per_key<T, K: Ord>(rows: &[T], key: impl Fn(&T) -> K) -> Vec<&T> {
    let mut by_key = BTreeMap::new();
    for row in rows {
        by_key.insert(key(row), row);
    }
    by_key.into_values().collect()
}
