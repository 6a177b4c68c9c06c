use anyhow::Context;
use hotelrate_core::ingest::csv;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
    pub reservations: u64,
    pub competitor_rates: u64,
}

/// Loads the given CSV exports and upserts them. Both files are validated in full before anything
/// is written, so a bad row in either file writes nothing. Each file is then upserted in its own
/// transaction: a database error on competitor rates leaves the reservations already committed,
/// and rerunning the ingest is safe.
pub async fn ingest_csv_files(
    pool: &sqlx::PgPool,
    reservations: Option<&Path>,
    competitors: Option<&Path>,
) -> anyhow::Result<IngestSummary> {
    anyhow::ensure!(
        reservations.is_some() || competitors.is_some(),
        "nothing to ingest: pass --reservations and/or --competitors"
    );

    let reservation_rows = reservations
        .map(csv::read_reservations_file)
        .transpose()?
        .unwrap_or_default();
    let competitor_rows = competitors
        .map(csv::read_competitor_rates_file)
        .transpose()?
        .unwrap_or_default();

    let mut summary = IngestSummary::default();

    if !reservation_rows.is_empty() {
        summary.reservations =
            hotelrate_core::storage::history::upsert_reservations(pool, &reservation_rows)
                .await
                .context("ingest reservations failed")?;
    }
    if !competitor_rows.is_empty() {
        summary.competitor_rates =
            hotelrate_core::storage::history::upsert_competitor_rates(pool, &competitor_rows)
                .await
                .context("ingest competitor rates failed")?;
    }

    tracing::info!(
        reservations = summary.reservations,
        competitor_rates = summary.competitor_rates,
        "csv ingest complete"
    );
    Ok(summary)
}
