use crate::domain::ForecastRecord;
use anyhow::Context;
use chrono::NaiveDate;

type ForecastRow = (
    NaiveDate,
    NaiveDate,
    String,
    f64,
    String,
    f64,
    Option<f64>,
    String,
);

/// Replaces the records of `run_date` in one transaction: rows of that run_date are deleted, then
/// the new set is inserted with upsert-on-conflict so a racing writer cannot duplicate keys.
pub async fn upsert_forecasts_atomic(
    pool: &sqlx::PgPool,
    run_date: NaiveDate,
    records: &[ForecastRecord],
) -> anyhow::Result<u64> {
    anyhow::ensure!(
        records.iter().all(|r| r.run_date == run_date),
        "all records must belong to run_date {run_date}"
    );

    let chunk_size = super::batch_size_from_env("FORECASTS_UPSERT_BATCH")?;
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let deleted = sqlx::query("DELETE FROM forecasts WHERE run_date = $1")
        .persistent(false)
        .bind(run_date)
        .execute(&mut *tx)
        .await
        .context("delete forecasts failed")?
        .rows_affected();

    let mut affected: u64 = 0;
    for chunk in records.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO forecasts \
             (run_date, stay_date, room_type, demand_forecast, model_used, rec_adr, competitor_rate, notes) ",
        );
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.run_date)
                .push_bind(r.stay_date)
                .push_bind(r.room_type.as_str())
                .push_bind(r.demand_forecast)
                .push_bind(r.model_used.as_str())
                .push_bind(r.rec_adr)
                .push_bind(r.competitor_rate)
                .push_bind(r.notes.as_str());
        });
        qb.push(
            " ON CONFLICT (run_date, stay_date, room_type) DO UPDATE \
               SET demand_forecast = EXCLUDED.demand_forecast, model_used = EXCLUDED.model_used, \
                   rec_adr = EXCLUDED.rec_adr, competitor_rate = EXCLUDED.competitor_rate, \
                   notes = EXCLUDED.notes",
        );

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert forecasts failed")?;
        affected += res.rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;

    tracing::debug!(%run_date, deleted, affected, "forecasts replaced");
    Ok(affected)
}

/// Records of `run_date`, optionally limited to stay dates in `[stay_from, stay_until)`.
pub async fn fetch_forecasts(
    pool: &sqlx::PgPool,
    run_date: NaiveDate,
    stay_from: Option<NaiveDate>,
    stay_until: Option<NaiveDate>,
) -> anyhow::Result<Vec<ForecastRecord>> {
    let rows = sqlx::query_as::<_, ForecastRow>(
        "SELECT run_date, stay_date, room_type, demand_forecast, model_used, rec_adr, competitor_rate, notes \
         FROM forecasts \
         WHERE run_date = $1 \
           AND ($2::date IS NULL OR stay_date >= $2) \
           AND ($3::date IS NULL OR stay_date < $3) \
         ORDER BY stay_date ASC, room_type ASC",
    )
    .persistent(false)
    .bind(run_date)
    .bind(stay_from)
    .bind(stay_until)
    .fetch_all(pool)
    .await
    .context("select forecasts failed")?;

    rows.into_iter().map(into_record).collect()
}

pub async fn latest_run_date(pool: &sqlx::PgPool) -> anyhow::Result<Option<NaiveDate>> {
    let row: Option<(NaiveDate,)> =
        sqlx::query_as("SELECT run_date FROM forecasts ORDER BY run_date DESC LIMIT 1")
            .persistent(false)
            .fetch_optional(pool)
            .await
            .context("select latest run_date failed")?;
    Ok(row.map(|r| r.0))
}

fn into_record(row: ForecastRow) -> anyhow::Result<ForecastRecord> {
    let (run_date, stay_date, room_type, demand_forecast, model_used, rec_adr, competitor_rate, notes) =
        row;
    let model_used = model_used
        .parse()
        .with_context(|| format!("invalid model_used in DB for {room_type} on {stay_date}"))?;
    Ok(ForecastRecord {
        run_date,
        stay_date,
        room_type,
        demand_forecast,
        model_used,
        rec_adr,
        competitor_rate,
        notes,
    })
}
