use super::{CompetitorRepository, ForecastWriter, HistoryRepository};
use crate::domain::{CompetitorObservation, DateRange, ForecastRecord, HistoricalObservation};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Mutex;

type RecordKey = (NaiveDate, NaiveDate, String);

/// In-process history and forecast store. Backs tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    observations: Vec<HistoricalObservation>,
    competitors: Vec<CompetitorObservation>,
    forecasts: Mutex<BTreeMap<RecordKey, ForecastRecord>>,
}

impl InMemoryStore {
    pub fn new(
        observations: Vec<HistoricalObservation>,
        competitors: Vec<CompetitorObservation>,
    ) -> Self {
        Self {
            observations,
            competitors,
            forecasts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Stored forecasts ordered by run_date, stay_date, room_type.
    pub fn forecasts(&self) -> Vec<ForecastRecord> {
        self.forecasts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn forecasts_for(&self, run_date: NaiveDate) -> Vec<ForecastRecord> {
        self.forecasts()
            .into_iter()
            .filter(|r| r.run_date == run_date)
            .collect()
    }
}

fn matches_room(label: &str, room_type: Option<&str>) -> bool {
    room_type.map_or(true, |rt| rt == label)
}

#[async_trait::async_trait]
impl HistoryRepository for InMemoryStore {
    async fn read(
        &self,
        range: DateRange,
        room_type: Option<&str>,
    ) -> anyhow::Result<Vec<HistoricalObservation>> {
        Ok(self
            .observations
            .iter()
            .filter(|o| range.contains(o.stay_date) && matches_room(&o.room_type, room_type))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl CompetitorRepository for InMemoryStore {
    async fn read(
        &self,
        range: DateRange,
        room_type: Option<&str>,
    ) -> anyhow::Result<Vec<CompetitorObservation>> {
        Ok(self
            .competitors
            .iter()
            .filter(|c| range.contains(c.stay_date) && matches_room(&c.room_type, room_type))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ForecastWriter for InMemoryStore {
    async fn upsert(&self, run_date: NaiveDate, records: &[ForecastRecord]) -> anyhow::Result<u64> {
        anyhow::ensure!(
            records.iter().all(|r| r.run_date == run_date),
            "all records must belong to run_date {run_date}"
        );

        let mut stored = self
            .forecasts
            .lock()
            .map_err(|_| anyhow::anyhow!("forecast store lock poisoned"))?;
        stored.retain(|(rd, _, _), _| *rd != run_date);
        for record in records {
            stored.insert(
                (record.run_date, record.stay_date, record.room_type.clone()),
                record.clone(),
            );
        }
        Ok(records.len() as u64)
    }
}
