use super::DemandModel;
use crate::domain::ModelKind;
use crate::features::FeatureRecord;

/// Same-day-of-week points needed before the seasonal factor is applied.
pub const MIN_SEASONAL_POINTS: usize = 2;

/// Demand assumed when a room type has no history at all.
pub const NO_HISTORY_DEMAND: f64 = 0.0;

/// Deterministic moving-average / seasonal-naive estimator.
///
/// The forecast is the exponentially weighted trailing occupancy of the room type, scaled by the
/// ratio of the same-weekday mean to the overall mean once enough same-weekday points exist. With
/// a single history point it repeats that point. Pure arithmetic over the feature record, so it
/// cannot fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeasonalNaiveModel;

impl DemandModel for SeasonalNaiveModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Fallback
    }

    fn predict(&self, record: &FeatureRecord) -> f64 {
        if !record.has_history() {
            return NO_HISTORY_DEMAND;
        }

        let base = record.weighted_occupancy;
        if record.dow_observation_count >= MIN_SEASONAL_POINTS
            && record.trailing_occupancy_mean > 0.0
        {
            base * (record.dow_occupancy_mean / record.trailing_occupancy_mean)
        } else {
            base
        }
    }
}
