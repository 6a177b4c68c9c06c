pub mod boosting;
pub mod fallback;

pub use boosting::{BoostingParams, GradientBoostedModel};
pub use fallback::SeasonalNaiveModel;

use crate::config::ForecastConfig;
use crate::domain::{DemandForecast, ModelKind};
use crate::error::ForecastError;
use crate::features::{FeatureRecord, FeatureSet, TrainingExample};
use std::collections::BTreeSet;

/// A fitted demand model. Implementations are selected by [`Forecaster`] and never fail at
/// prediction time.
pub trait DemandModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Expected rooms sold for the record. May be negative or exceed capacity; the forecaster
    /// clamps.
    fn predict(&self, record: &FeatureRecord) -> f64;
}

/// Chooses between the boosted model and the seasonal-naive fallback, then forecasts the horizon.
#[derive(Debug, Clone)]
pub struct Forecaster {
    min_training_points: usize,
    boosting: BoostingParams,
}

impl Forecaster {
    pub fn new(min_training_points: usize) -> Self {
        Self {
            min_training_points,
            boosting: BoostingParams::default(),
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.min_training_points)
    }

    pub fn with_boosting_params(mut self, params: BoostingParams) -> Self {
        self.boosting = params;
        self
    }

    /// The boosted model when enough history exists and training succeeds, otherwise the fallback.
    pub fn select_model(&self, training: &[TrainingExample]) -> Box<dyn DemandModel> {
        match self.train_primary(training) {
            Ok(model) => {
                tracing::info!(
                    examples = training.len(),
                    trees = model.tree_count(),
                    "using primary demand model"
                );
                Box::new(model)
            }
            Err(err @ ForecastError::InsufficientData { .. }) => {
                tracing::debug!(error = %err, "using fallback demand model");
                Box::new(SeasonalNaiveModel)
            }
            Err(err) => {
                tracing::warn!(error = %err, "primary model training failed; using fallback");
                Box::new(SeasonalNaiveModel)
            }
        }
    }

    fn train_primary(
        &self,
        training: &[TrainingExample],
    ) -> Result<GradientBoostedModel, ForecastError> {
        if training.len() < self.min_training_points {
            return Err(ForecastError::InsufficientData {
                found: training.len(),
                required: self.min_training_points,
            });
        }
        GradientBoostedModel::fit(training, &self.boosting)
    }

    /// One forecast per horizon record, in horizon order. Fails with
    /// [`ForecastError::IncompleteForecast`] unless every `(stay_date, room_type)` of the
    /// `horizon_days` window is covered exactly once.
    pub fn fit_and_predict(
        &self,
        features: &FeatureSet,
        horizon_days: u32,
    ) -> Result<Vec<DemandForecast>, ForecastError> {
        let model = self.select_model(&features.training);
        let forecasts: Vec<DemandForecast> = features
            .horizon
            .iter()
            .map(|record| DemandForecast {
                stay_date: record.stay_date,
                room_type: record.room_type.clone(),
                demand_forecast: clamp_demand(model.predict(record), record.capacity),
                model_used: model.kind(),
            })
            .collect();

        ensure_complete(&features.requested_pairs(horizon_days), &forecasts)?;
        Ok(forecasts)
    }
}

/// Non-negative, finite, and within capacity when capacity is known.
pub fn clamp_demand(value: f64, capacity: Option<u32>) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let value = value.max(0.0);
    match capacity {
        Some(cap) => value.min(f64::from(cap)),
        None => value,
    }
}

pub fn ensure_complete(
    requested: &BTreeSet<(chrono::NaiveDate, String)>,
    forecasts: &[DemandForecast],
) -> Result<(), ForecastError> {
    let produced: BTreeSet<(chrono::NaiveDate, String)> = forecasts
        .iter()
        .map(|f| (f.stay_date, f.room_type.clone()))
        .collect();

    let missing: Vec<_> = requested.difference(&produced).cloned().collect();
    if !missing.is_empty() || forecasts.len() != requested.len() {
        return Err(ForecastError::IncompleteForecast {
            expected: requested.len(),
            missing,
        });
    }
    Ok(())
}
