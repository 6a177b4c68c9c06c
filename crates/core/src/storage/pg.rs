use crate::domain::{CompetitorObservation, DateRange, ForecastRecord, HistoricalObservation};
use crate::repository::{CompetitorRepository, ForecastWriter, HistoryRepository};
use chrono::NaiveDate;

/// Postgres-backed implementation of every collaborator contract.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl HistoryRepository for PgStore {
    async fn read(
        &self,
        range: DateRange,
        room_type: Option<&str>,
    ) -> anyhow::Result<Vec<HistoricalObservation>> {
        super::history::read_reservations(&self.pool, range, room_type).await
    }
}

#[async_trait::async_trait]
impl CompetitorRepository for PgStore {
    async fn read(
        &self,
        range: DateRange,
        room_type: Option<&str>,
    ) -> anyhow::Result<Vec<CompetitorObservation>> {
        super::history::read_competitor_rates(&self.pool, range, room_type).await
    }
}

#[async_trait::async_trait]
impl ForecastWriter for PgStore {
    async fn upsert(&self, run_date: NaiveDate, records: &[ForecastRecord]) -> anyhow::Result<u64> {
        super::forecasts::upsert_forecasts_atomic(&self.pool, run_date, records).await
    }
}
