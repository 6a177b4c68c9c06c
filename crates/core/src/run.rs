use crate::config::{ForecastConfig, MAX_HORIZON_DAYS, MAX_LOOKBACK_DAYS};
use crate::domain::{DateRange, ForecastRecord, HistoricalObservation, ModelKind};
use crate::error::{ForecastError, RunStage};
use crate::features::{FeatureBuilder, FeatureRecord};
use crate::forecast::Forecaster;
use crate::pricing::{Baseline, CompetitorContext, PricingRules};
use crate::repository::{CompetitorRepository, ForecastWriter, HistoryRepository};
use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// One forecast batch: BuildFeatures -> Forecast -> Price -> Emit.
///
/// Holds no mutable state, so runs for different run_dates can execute concurrently. Callers must
/// not run the same run_date twice at once (see [`crate::storage::lock`]).
#[derive(Clone)]
pub struct ForecastRun {
    history: Arc<dyn HistoryRepository>,
    competitors: Arc<dyn CompetitorRepository>,
    config: ForecastConfig,
    builder: FeatureBuilder,
    forecaster: Forecaster,
    pricing: PricingRules,
}

impl ForecastRun {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        competitors: Arc<dyn CompetitorRepository>,
        config: ForecastConfig,
    ) -> Self {
        Self {
            history,
            competitors,
            builder: FeatureBuilder::from_config(&config),
            forecaster: Forecaster::from_config(&config),
            pricing: PricingRules::from_config(&config),
            config,
        }
    }

    pub fn with_forecaster(mut self, forecaster: Forecaster) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast records for `horizon_days` stay dates starting at `run_date`, one per room type
    /// and stay date. All-or-nothing: a fatal error returns no records.
    pub async fn execute(
        &self,
        run_date: NaiveDate,
        horizon_days: u32,
    ) -> Result<Vec<ForecastRecord>, ForecastError> {
        if !(1..=MAX_HORIZON_DAYS).contains(&horizon_days) {
            return Err(ForecastError::run_failed(
                RunStage::BuildFeatures,
                format!("horizon_days must be 1..={MAX_HORIZON_DAYS} (got {horizon_days})"),
            ));
        }
        let lookback = self.config.lookback_days;
        if !(1..=MAX_LOOKBACK_DAYS).contains(&lookback) {
            return Err(ForecastError::run_failed(
                RunStage::BuildFeatures,
                format!("lookback_days must be 1..={MAX_LOOKBACK_DAYS} (got {lookback})"),
            ));
        }

        // Training examples need their own lookback window, hence twice the lookback.
        let out_of_range = || {
            ForecastError::run_failed(
                RunStage::BuildFeatures,
                format!("date window around {run_date} is out of range"),
            )
        };
        let history_start = run_date
            .checked_sub_days(Days::new(2 * u64::from(lookback)))
            .ok_or_else(out_of_range)?;
        let competitor_start = run_date
            .checked_sub_days(Days::new(u64::from(lookback)))
            .ok_or_else(out_of_range)?;
        let horizon_end = run_date
            .checked_add_days(Days::new(u64::from(horizon_days)))
            .ok_or_else(out_of_range)?;
        let history_range = DateRange::new(history_start, run_date);
        let competitor_range = DateRange::new(competitor_start, horizon_end);

        let history = self
            .history
            .read(history_range, None)
            .await
            .map_err(|e| ForecastError::run_failed(RunStage::BuildFeatures, format!("{e:#}")))?;
        let competitors = self
            .competitors
            .read(competitor_range, None)
            .await
            .map_err(|e| ForecastError::run_failed(RunStage::BuildFeatures, format!("{e:#}")))?;

        let room_types = self.resolve_room_types(&history)?;
        let features = self.builder.build_set(
            run_date,
            horizon_days,
            &room_types,
            &history,
            &competitors,
        );
        tracing::debug!(
            %run_date,
            history = history.len(),
            competitors = competitors.len(),
            training = features.training.len(),
            horizon = features.horizon.len(),
            "features built"
        );

        let forecasts = self.forecaster.fit_and_predict(&features, horizon_days)?;

        let by_key: HashMap<(NaiveDate, &str), &FeatureRecord> = features
            .horizon
            .iter()
            .map(|r| ((r.stay_date, r.room_type.as_str()), r))
            .collect();

        let mut records = Vec::with_capacity(forecasts.len());
        let mut degraded = 0usize;
        let mut model_mix: BTreeMap<ModelKind, usize> = BTreeMap::new();

        for forecast in forecasts {
            let record = by_key
                .get(&(forecast.stay_date, forecast.room_type.as_str()))
                .copied()
                .ok_or_else(|| {
                    ForecastError::run_failed(
                        RunStage::Price,
                        format!(
                            "no features for {} on {}",
                            forecast.room_type, forecast.stay_date
                        ),
                    )
                })?;

            let baseline = Baseline::from_features(record);
            let competitor = CompetitorContext::from_features(record);
            let (recommendation, competitor_rate) =
                match self.pricing.recommend(&forecast, baseline, competitor) {
                    Ok(rec) => (rec, competitor.map(|c| c.mean)),
                    Err(err) => {
                        tracing::warn!(%run_date, error = %err, "pricing without competitor data");
                        degraded += 1;
                        (self.pricing.recommend(&forecast, baseline, None)?, None)
                    }
                };

            *model_mix.entry(forecast.model_used).or_default() += 1;
            records.push(ForecastRecord::merge(
                run_date,
                forecast,
                recommendation,
                competitor_rate,
            ));
        }

        let expected = room_types.len() * horizon_days as usize;
        if records.len() != expected {
            return Err(ForecastError::IncompleteForecast {
                expected,
                missing: Vec::new(),
            });
        }

        tracing::info!(
            %run_date,
            horizon_days,
            room_types = room_types.len(),
            records = records.len(),
            degraded,
            models = ?model_mix,
            "forecast run complete"
        );

        Ok(records)
    }

    /// [`Self::execute`] followed by a single upsert of the whole batch.
    pub async fn execute_and_persist(
        &self,
        writer: &dyn ForecastWriter,
        run_date: NaiveDate,
        horizon_days: u32,
    ) -> Result<Vec<ForecastRecord>, ForecastError> {
        let records = self.execute(run_date, horizon_days).await?;
        writer
            .upsert(run_date, &records)
            .await
            .map_err(|e| ForecastError::run_failed(RunStage::Emit, format!("{e:#}")))?;
        Ok(records)
    }

    /// [`Self::execute_and_persist`] on its own task, so a panic inside the run or a
    /// collaborator comes back as [`ForecastError::RunFailed`] instead of unwinding through the
    /// caller (which may be holding a run_date lock).
    pub async fn execute_and_persist_isolated(
        &self,
        writer: Arc<dyn ForecastWriter>,
        run_date: NaiveDate,
        horizon_days: u32,
    ) -> Result<Vec<ForecastRecord>, ForecastError> {
        let run = self.clone();
        let task = tokio::spawn(async move {
            run.execute_and_persist(writer.as_ref(), run_date, horizon_days)
                .await
        });
        match task.await {
            Ok(result) => result,
            Err(join_err) => Err(ForecastError::run_failed(
                RunStage::Forecast,
                format!("run task aborted: {join_err}"),
            )),
        }
    }

    fn resolve_room_types(
        &self,
        history: &[HistoricalObservation],
    ) -> Result<Vec<String>, ForecastError> {
        let room_types: Vec<String> = match &self.config.room_types {
            Some(configured) => {
                let mut seen = BTreeSet::new();
                configured
                    .iter()
                    .map(|rt| rt.trim().to_string())
                    .filter(|rt| seen.insert(rt.clone()))
                    .collect()
            }
            None => history
                .iter()
                .map(|o| o.room_type.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };

        if room_types.is_empty() {
            return Err(ForecastError::run_failed(
                RunStage::BuildFeatures,
                "no room types to forecast",
            ));
        }
        if room_types.iter().any(|rt| rt.is_empty()) {
            return Err(ForecastError::run_failed(
                RunStage::BuildFeatures,
                "room type labels must be non-empty",
            ));
        }
        Ok(room_types)
    }
}

/// Share of records produced by each model, for run logs.
pub fn model_summary(records: &[ForecastRecord]) -> String {
    let mut counts: BTreeMap<ModelKind, usize> = BTreeMap::new();
    for r in records {
        *counts.entry(r.model_used).or_default() += 1;
    }
    counts
        .iter()
        .map(|(kind, n)| format!("{kind}={n}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CompetitorObservation;
    use crate::repository::InMemoryStore;
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct FailingHistory;

    #[async_trait::async_trait]
    impl HistoryRepository for FailingHistory {
        async fn read(
            &self,
            _range: DateRange,
            _room_type: Option<&str>,
        ) -> anyhow::Result<Vec<HistoricalObservation>> {
            anyhow::bail!("connection refused")
        }
    }

    fn store_with(observations: Vec<HistoricalObservation>) -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::new(observations, vec![]))
    }

    fn obs(date: NaiveDate, room_type: &str, occupancy: u32) -> HistoricalObservation {
        HistoricalObservation {
            stay_date: date,
            room_type: room_type.to_string(),
            occupancy,
            rooms_available: Some(50),
            adr: 120.0,
        }
    }

    #[tokio::test]
    async fn history_failure_aborts_in_build_features() {
        let store = store_with(vec![]);
        let run = ForecastRun::new(Arc::new(FailingHistory), store, ForecastConfig::default());

        let err = run.execute(d(2026, 3, 9), 14).await.unwrap_err();
        match err {
            ForecastError::RunFailed { stage, detail } => {
                assert_eq!(stage, RunStage::BuildFeatures);
                assert!(detail.contains("connection refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_room_types_is_a_run_failure() {
        let store = store_with(vec![]);
        let run = ForecastRun::new(store.clone(), store, ForecastConfig::default());
        let err = run.execute(d(2026, 3, 9), 14).await.unwrap_err();
        assert!(matches!(
            err,
            ForecastError::RunFailed {
                stage: RunStage::BuildFeatures,
                ..
            }
        ));
    }

    struct PanickingHistory;

    #[async_trait::async_trait]
    impl HistoryRepository for PanickingHistory {
        async fn read(
            &self,
            _range: DateRange,
            _room_type: Option<&str>,
        ) -> anyhow::Result<Vec<HistoricalObservation>> {
            panic!("history backend crashed")
        }
    }

    fn assert_build_features_failure(err: ForecastError) {
        assert!(
            matches!(
                err,
                ForecastError::RunFailed {
                    stage: RunStage::BuildFeatures,
                    ..
                }
            ),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn zero_horizon_is_rejected() {
        let store = store_with(vec![obs(d(2026, 3, 8), "Standard", 10)]);
        let run = ForecastRun::new(store.clone(), store, ForecastConfig::default());
        assert!(run.execute(d(2026, 3, 9), 0).await.is_err());
    }

    #[tokio::test]
    async fn oversized_horizon_fails_without_panicking() {
        let store = store_with(vec![obs(d(2026, 3, 8), "Standard", 10)]);
        let run = ForecastRun::new(store.clone(), store, ForecastConfig::default());

        let err = run.execute(d(2026, 3, 9), u32::MAX).await.unwrap_err();
        assert_build_features_failure(err);
        let err = run
            .execute(d(2026, 3, 9), MAX_HORIZON_DAYS + 1)
            .await
            .unwrap_err();
        assert_build_features_failure(err);
    }

    #[tokio::test]
    async fn oversized_lookback_fails_without_panicking() {
        let store = store_with(vec![obs(d(2026, 3, 8), "Standard", 10)]);
        let config = ForecastConfig {
            lookback_days: 200_000_000,
            ..Default::default()
        };
        let run = ForecastRun::new(store.clone(), store, config);

        let err = run.execute(d(2026, 3, 9), 14).await.unwrap_err();
        assert_build_features_failure(err);
    }

    #[tokio::test]
    async fn window_past_the_calendar_edge_fails_without_panicking() {
        let store = store_with(vec![]);
        let run = ForecastRun::new(store.clone(), store, ForecastConfig::default());

        let err = run.execute(NaiveDate::MAX, 14).await.unwrap_err();
        assert_build_features_failure(err);
        let err = run.execute(NaiveDate::MIN, 14).await.unwrap_err();
        assert_build_features_failure(err);
    }

    #[tokio::test]
    async fn isolated_run_turns_a_panic_into_a_run_failure() {
        let store = store_with(vec![]);
        let run = ForecastRun::new(
            Arc::new(PanickingHistory),
            store.clone(),
            ForecastConfig::default(),
        );

        let err = run
            .execute_and_persist_isolated(store.clone(), d(2026, 3, 9), 14)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            ForecastError::RunFailed {
                stage: RunStage::Forecast,
                ..
            }
        ));
        assert!(store.forecasts().is_empty());
    }

    #[tokio::test]
    async fn isolated_run_persists_like_the_inline_one() {
        let run_date = d(2026, 3, 9);
        let store = store_with(vec![obs(d(2026, 3, 8), "Standard", 10)]);
        let run = ForecastRun::new(store.clone(), store.clone(), ForecastConfig::default());

        let records = run
            .execute_and_persist_isolated(store.clone(), run_date, 2)
            .await
            .unwrap();
        assert_eq!(store.forecasts_for(run_date), records);
    }

    #[tokio::test]
    async fn malformed_competitor_rate_degrades_only_that_record() {
        let run_date = d(2026, 3, 9);
        let history = vec![
            obs(d(2026, 3, 6), "Standard", 20),
            obs(d(2026, 3, 7), "Standard", 22),
            obs(d(2026, 3, 8), "Standard", 24),
        ];
        let competitors = vec![
            CompetitorObservation {
                stay_date: run_date,
                competitor: "Harbor Inn".into(),
                room_type: "Standard".into(),
                rate: f64::NAN,
            },
            CompetitorObservation {
                stay_date: run_date + Duration::days(1),
                competitor: "Harbor Inn".into(),
                room_type: "Standard".into(),
                rate: 140.0,
            },
        ];
        let store = Arc::new(InMemoryStore::new(history, competitors));
        let run = ForecastRun::new(store.clone(), store, ForecastConfig::default());

        let records = run.execute(run_date, 3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].notes.contains("competitor data unavailable"));
        assert_eq!(records[0].competitor_rate, None);
        assert_eq!(records[1].competitor_rate, Some(140.0));
        assert!(records[1].notes.contains("competitor-nudged"));
        assert!(records.iter().all(|r| r.rec_adr > 0.0));
    }

    #[tokio::test]
    async fn execute_and_persist_writes_the_batch() {
        let run_date = d(2026, 3, 9);
        let store = store_with(vec![obs(d(2026, 3, 8), "Standard", 10)]);
        let run = ForecastRun::new(store.clone(), store.clone(), ForecastConfig::default());

        let records = run
            .execute_and_persist(&*store, run_date, 2)
            .await
            .unwrap();
        assert_eq!(store.forecasts_for(run_date), records);
        assert_eq!(model_summary(&records), "fallback=2");
    }
}
