use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which demand model produced a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Primary,
    Fallback,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "primary" => Ok(Self::Primary),
            "fallback" => Ok(Self::Fallback),
            other => anyhow::bail!("unknown model kind: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub stay_date: NaiveDate,
    pub room_type: String,
    /// Expected rooms sold.
    pub demand_forecast: f64,
    pub model_used: ModelKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRecommendation {
    pub stay_date: NaiveDate,
    pub room_type: String,
    pub rec_adr: f64,
    /// Plain-text audit trail of the adjustments applied, rendered verbatim by displays.
    pub notes: String,
}

/// Persisted output row; unique per `(run_date, stay_date, room_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub run_date: NaiveDate,
    pub stay_date: NaiveDate,
    pub room_type: String,
    pub demand_forecast: f64,
    pub model_used: ModelKind,
    pub rec_adr: f64,
    pub competitor_rate: Option<f64>,
    pub notes: String,
}

impl ForecastRecord {
    pub fn merge(
        run_date: NaiveDate,
        forecast: DemandForecast,
        recommendation: PricingRecommendation,
        competitor_rate: Option<f64>,
    ) -> Self {
        Self {
            run_date,
            stay_date: forecast.stay_date,
            room_type: forecast.room_type,
            demand_forecast: forecast.demand_forecast,
            model_used: forecast.model_used,
            rec_adr: recommendation.rec_adr,
            competitor_rate,
            notes: recommendation.notes,
        }
    }

    pub fn key(&self) -> (NaiveDate, NaiveDate, &str) {
        (self.run_date, self.stay_date, &self.room_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_round_trips_through_text() {
        for kind in [ModelKind::Primary, ModelKind::Fallback] {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("lightgbm".parse::<ModelKind>().is_err());
    }

    #[test]
    fn model_kind_serializes_snake_case() {
        let v = serde_json::to_value(ModelKind::Fallback).unwrap();
        assert_eq!(v, serde_json::json!("fallback"));
    }
}
