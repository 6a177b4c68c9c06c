use crate::config::ForecastConfig;
use crate::domain::{DemandForecast, PricingRecommendation};
use crate::error::ForecastError;
use crate::features::FeatureRecord;

/// Floor used if the configured one is not a positive number.
pub const FALLBACK_MIN_MARGIN_FLOOR: f64 = 1.0;

pub const NOTE_NO_COMPETITOR: &str = "competitor data unavailable";

/// Historical reference point of a room type: what it usually sells at, and how many rooms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub adr: f64,
    pub occupancy: f64,
}

impl Baseline {
    pub fn from_features(record: &FeatureRecord) -> Self {
        Self {
            adr: record.trailing_adr_mean,
            occupancy: record.trailing_occupancy_mean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompetitorContext {
    pub mean: f64,
    pub spread: f64,
}

impl CompetitorContext {
    pub fn from_features(record: &FeatureRecord) -> Option<Self> {
        Some(Self {
            mean: record.competitor_mean?,
            spread: record.competitor_spread.unwrap_or(0.0),
        })
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.mean.is_finite() && self.mean > 0.0) {
            return Err(format!("competitor mean rate {} is not a positive number", self.mean));
        }
        if !(self.spread.is_finite() && self.spread >= 0.0) {
            return Err(format!("competitor rate spread {} is invalid", self.spread));
        }
        Ok(())
    }
}

/// Rule-based ADR recommendation: demand band around the base rate, bounded competitor nudge,
/// hard minimum-margin floor.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingRules {
    pub band_floor_pct: f64,
    pub band_ceiling_pct: f64,
    pub min_margin_floor: f64,
    pub competitor_nudge: f64,
    pub demand_sensitivity: f64,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

impl PricingRules {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            band_floor_pct: config.band_floor_pct,
            band_ceiling_pct: config.band_ceiling_pct,
            min_margin_floor: config.min_margin_floor,
            competitor_nudge: config.competitor_nudge,
            demand_sensitivity: config.demand_sensitivity,
        }
    }

    /// Recommends an ADR for one forecast. Only an unusable competitor context fails, with
    /// [`ForecastError::PricingDegraded`]; pricing the same forecast with `None` always succeeds.
    /// The result is always at least the minimum-margin floor.
    pub fn recommend(
        &self,
        forecast: &DemandForecast,
        baseline: Baseline,
        competitor: Option<CompetitorContext>,
    ) -> Result<PricingRecommendation, ForecastError> {
        if let Some(ctx) = &competitor {
            ctx.validate().map_err(|reason| ForecastError::PricingDegraded {
                stay_date: forecast.stay_date,
                room_type: forecast.room_type.clone(),
                reason,
            })?;
        }

        let base = if baseline.adr.is_finite() && baseline.adr > 0.0 {
            baseline.adr
        } else {
            0.0
        };
        let band_floor = self.band_floor_pct.min(0.0);
        let band_ceiling = self.band_ceiling_pct.max(0.0);
        let band_low = base * (1.0 + band_floor);
        let band_high = base * (1.0 + band_ceiling);

        let mut notes = Vec::with_capacity(3);

        let adjustment = self
            .demand_adjustment(forecast.demand_forecast, baseline.occupancy)
            .clamp(band_floor, band_ceiling);
        let mut rate = base * (1.0 + adjustment);
        notes.push(format!(
            "demand-driven: {:+.1}% on base {:.2}",
            adjustment * 100.0,
            base
        ));

        match competitor {
            Some(ctx) => {
                let nudged = (rate + (ctx.mean - rate) * self.competitor_nudge.clamp(0.0, 1.0))
                    .clamp(band_low, band_high);
                if (nudged - rate).abs() >= 0.005 {
                    notes.push(format!(
                        "competitor-nudged: {:+.2} toward mean {:.2}",
                        nudged - rate,
                        ctx.mean
                    ));
                    rate = nudged;
                } else {
                    notes.push(format!("competitor mean {:.2}: no change", ctx.mean));
                }
            }
            None => notes.push(NOTE_NO_COMPETITOR.to_string()),
        }

        let floor = self.floor();
        if rate < floor {
            notes.push(format!("floor-clamped: raised to minimum {floor:.2}"));
            rate = floor;
        }

        Ok(PricingRecommendation {
            stay_date: forecast.stay_date,
            room_type: forecast.room_type.clone(),
            rec_adr: round_cents(rate).max(floor),
            notes: notes.join("; "),
        })
    }

    /// Relative rate change implied by forecast demand versus the historical mean, before
    /// banding. Zero when there is no reference demand.
    fn demand_adjustment(&self, demand: f64, reference: f64) -> f64 {
        if !(demand.is_finite() && reference.is_finite() && reference > 0.0) {
            return 0.0;
        }
        (demand / reference - 1.0) * self.demand_sensitivity
    }

    fn floor(&self) -> f64 {
        if self.min_margin_floor.is_finite() && self.min_margin_floor > 0.0 {
            self.min_margin_floor
        } else {
            FALLBACK_MIN_MARGIN_FLOOR
        }
    }
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use chrono::NaiveDate;

    fn forecast(demand: f64) -> DemandForecast {
        DemandForecast {
            stay_date: NaiveDate::from_ymd_opt(2026, 3, 13).unwrap(),
            room_type: "Standard".to_string(),
            demand_forecast: demand,
            model_used: ModelKind::Fallback,
        }
    }

    fn baseline(adr: f64, occupancy: f64) -> Baseline {
        Baseline { adr, occupancy }
    }

    #[test]
    fn neutral_demand_keeps_base_rate() {
        let rec = PricingRules::default()
            .recommend(&forecast(30.0), baseline(120.0, 30.0), None)
            .unwrap();
        assert_eq!(rec.rec_adr, 120.0);
        assert!(rec.notes.contains("demand-driven"));
        assert!(rec.notes.contains(NOTE_NO_COMPETITOR));
    }

    #[test]
    fn demand_moves_rate_within_band() {
        let rules = PricingRules::default();
        let up = rules
            .recommend(&forecast(33.0), baseline(100.0, 30.0), None)
            .unwrap();
        assert_eq!(up.rec_adr, 110.0);

        let capped = rules
            .recommend(&forecast(90.0), baseline(100.0, 30.0), None)
            .unwrap();
        assert_eq!(capped.rec_adr, 125.0);

        let down = rules
            .recommend(&forecast(3.0), baseline(100.0, 30.0), None)
            .unwrap();
        assert_eq!(down.rec_adr, 85.0);
    }

    #[test]
    fn competitor_above_nudges_up_by_at_most_ten_percent_of_gap() {
        let ctx = CompetitorContext {
            mean: 150.0,
            spread: 20.0,
        };
        let rec = PricingRules::default()
            .recommend(&forecast(30.0), baseline(120.0, 30.0), Some(ctx))
            .unwrap();
        assert!(rec.rec_adr > 120.0 && rec.rec_adr <= 123.0, "{}", rec.rec_adr);
        assert_eq!(rec.rec_adr, 123.0);
        assert!(rec.notes.contains("competitor-nudged"));
    }

    #[test]
    fn competitor_nudge_never_leaves_the_band() {
        let rules = PricingRules {
            competitor_nudge: 1.0,
            ..Default::default()
        };
        let ctx = CompetitorContext {
            mean: 400.0,
            spread: 0.0,
        };
        let rec = rules
            .recommend(&forecast(30.0), baseline(100.0, 30.0), Some(ctx))
            .unwrap();
        assert_eq!(rec.rec_adr, 125.0);
    }

    #[test]
    fn zero_history_lands_on_floor() {
        let rules = PricingRules::default();
        let rec = rules
            .recommend(&forecast(0.0), baseline(0.0, 0.0), None)
            .unwrap();
        assert_eq!(rec.rec_adr, rules.min_margin_floor);
        assert!(rec.notes.contains("floor-clamped"));
    }

    #[test]
    fn malformed_competitor_context_degrades() {
        let ctx = CompetitorContext {
            mean: f64::NAN,
            spread: 0.0,
        };
        let err = PricingRules::default()
            .recommend(&forecast(30.0), baseline(120.0, 30.0), Some(ctx))
            .unwrap_err();
        assert!(matches!(err, ForecastError::PricingDegraded { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn never_returns_non_positive_rate() {
        let rules = PricingRules {
            min_margin_floor: -5.0,
            ..Default::default()
        };
        let demands = [0.0, -1.0, f64::NAN, f64::INFINITY, 1e9];
        let baselines = [
            baseline(0.0, 0.0),
            baseline(-10.0, 5.0),
            baseline(f64::NAN, f64::NAN),
            baseline(0.001, 1.0),
            baseline(200.0, 40.0),
        ];
        let competitors = [
            None,
            Some(CompetitorContext {
                mean: 0.01,
                spread: 0.0,
            }),
            Some(CompetitorContext {
                mean: 900.0,
                spread: 50.0,
            }),
        ];
        for demand in demands {
            for b in baselines {
                for c in competitors {
                    let rec = rules.recommend(&forecast(demand), b, c).unwrap();
                    assert!(rec.rec_adr > 0.0, "demand={demand} baseline={b:?} comp={c:?}");
                }
            }
        }
    }
}
