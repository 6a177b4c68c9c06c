use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Stage of a forecast run, reported when the run aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    BuildFeatures,
    Forecast,
    Price,
    Emit,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BuildFeatures => "build_features",
            Self::Forecast => "forecast",
            Self::Price => "price",
            Self::Emit => "emit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    /// Too little history to train the primary model. Triggers the fallback; never leaves the
    /// forecaster.
    #[error("insufficient training data: {found} observations (need {required})")]
    InsufficientData { found: usize, required: usize },

    /// The primary model could not be trained. Triggers the fallback.
    #[error("model training failed: {0}")]
    ModelTraining(String),

    #[error(
        "incomplete forecast: {} of {expected} (stay_date, room_type) pairs missing",
        .missing.len()
    )]
    IncompleteForecast {
        expected: usize,
        missing: Vec<(NaiveDate, String)>,
    },

    #[error("forecast run failed at stage {stage}: {detail}")]
    RunFailed { stage: RunStage, detail: String },

    /// Competitor context for one record could not be used. Absorbed by the run.
    #[error("pricing degraded for {room_type} on {stay_date}: {reason}")]
    PricingDegraded {
        stay_date: NaiveDate,
        room_type: String,
        reason: String,
    },
}

impl ForecastError {
    pub fn run_failed(stage: RunStage, err: impl fmt::Display) -> Self {
        Self::RunFailed {
            stage,
            detail: err.to_string(),
        }
    }

    /// Fatal errors abort the whole run; nothing is persisted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IncompleteForecast { .. } | Self::RunFailed { .. })
    }
}
