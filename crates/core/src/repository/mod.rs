//! Collaborator contracts of the forecasting core. Reads are side-effect free; writes replace a
//! run_date's records as a whole. Implementations own retries; the core never retries.

pub mod memory;

pub use memory::InMemoryStore;

use crate::domain::{CompetitorObservation, DateRange, ForecastRecord, HistoricalObservation};
use chrono::NaiveDate;

#[async_trait::async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn read(
        &self,
        range: DateRange,
        room_type: Option<&str>,
    ) -> anyhow::Result<Vec<HistoricalObservation>>;
}

#[async_trait::async_trait]
pub trait CompetitorRepository: Send + Sync {
    async fn read(
        &self,
        range: DateRange,
        room_type: Option<&str>,
    ) -> anyhow::Result<Vec<CompetitorObservation>>;
}

#[async_trait::async_trait]
pub trait ForecastWriter: Send + Sync {
    /// Replaces every stored record of `run_date` with `records`. Re-invoking with the same input
    /// leaves exactly one record per `(run_date, stay_date, room_type)`. Returns rows written.
    async fn upsert(&self, run_date: NaiveDate, records: &[ForecastRecord]) -> anyhow::Result<u64>;
}
