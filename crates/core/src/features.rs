use crate::config::ForecastConfig;
use crate::domain::{CompetitorObservation, DateRange, HistoricalObservation};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Lookback windows shorter than this still work but produce noisy features.
pub const MIN_USEFUL_LOOKBACK_DAYS: u32 = 7;

/// Number of values in [`FeatureRecord::to_vector`].
pub const FEATURE_COUNT: usize = 9;

/// Numeric features for one `(stay_date, room_type)`. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub stay_date: NaiveDate,
    pub room_type: String,
    /// Monday = 0.
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub trailing_occupancy_mean: f64,
    /// Exponentially weighted trailing occupancy, newest point weighted highest.
    pub weighted_occupancy: f64,
    pub last_occupancy: f64,
    pub dow_occupancy_mean: f64,
    pub dow_observation_count: usize,
    pub trailing_adr_mean: f64,
    /// Most recent known capacity for the room type.
    pub capacity: Option<u32>,
    pub competitor_mean: Option<f64>,
    /// max - min of competitor rates for the same stay_date/room_type.
    pub competitor_spread: Option<f64>,
    /// History points found in the lookback window. Zero means "no data".
    pub observation_count: usize,
}

impl FeatureRecord {
    pub fn has_history(&self) -> bool {
        self.observation_count > 0
    }

    /// Dense vector for the boosted model. Missing competitor data is filled with the trailing
    /// ADR so the column stays comparable across rows.
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.day_of_week),
            if self.is_weekend { 1.0 } else { 0.0 },
            self.trailing_occupancy_mean,
            self.weighted_occupancy,
            self.last_occupancy,
            self.dow_occupancy_mean,
            self.trailing_adr_mean,
            self.competitor_mean.unwrap_or(self.trailing_adr_mean),
            self.competitor_spread.unwrap_or(0.0),
        ]
    }
}

/// A historical feature record paired with the occupancy that was actually observed.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: FeatureRecord,
    pub occupancy: f64,
}

/// Everything the forecaster needs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub run_date: NaiveDate,
    pub room_types: Vec<String>,
    pub training: Vec<TrainingExample>,
    /// One record per requested `(stay_date, room_type)`, ordered by stay_date then room_type.
    pub horizon: Vec<FeatureRecord>,
}

impl FeatureSet {
    /// The `(stay_date, room_type)` pairs a complete forecast must cover.
    pub fn requested_pairs(&self, horizon_days: u32) -> BTreeSet<(NaiveDate, String)> {
        DateRange::starting(self.run_date, horizon_days)
            .dates()
            .flat_map(|d| self.room_types.iter().map(move |rt| (d, rt.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureBuilder {
    lookback_days: u32,
    decay: f64,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

impl FeatureBuilder {
    pub fn new(lookback_days: u32, decay: f64) -> Self {
        Self {
            lookback_days,
            decay,
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.lookback_days, config.fallback_decay)
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    /// Features for `stay_date`/`room_type` from history strictly before `as_of` and inside the
    /// lookback window. Never fails: no history yields zeroed features with
    /// `observation_count == 0`.
    pub fn build(
        &self,
        stay_date: NaiveDate,
        room_type: &str,
        as_of: NaiveDate,
        history: &[HistoricalObservation],
        competitors: &[CompetitorObservation],
    ) -> FeatureRecord {
        let window = DateRange::trailing(as_of, self.lookback_days);
        let weekday = stay_date.weekday();

        let mut points: Vec<&HistoricalObservation> = history
            .iter()
            .filter(|o| o.room_type == room_type && window.contains(o.stay_date))
            .collect();
        points.sort_by_key(|o| o.stay_date);

        let occupancy: Vec<f64> = points.iter().map(|o| f64::from(o.occupancy)).collect();
        let adr: Vec<f64> = points.iter().map(|o| o.adr).collect();
        let same_dow: Vec<f64> = points
            .iter()
            .filter(|o| o.stay_date.weekday() == weekday)
            .map(|o| f64::from(o.occupancy))
            .collect();
        let capacity = points.iter().rev().find_map(|o| o.rooms_available);

        let rates: Vec<f64> = competitors
            .iter()
            .filter(|c| c.stay_date == stay_date && c.room_type == room_type)
            .map(|c| c.rate)
            .collect();
        let (competitor_mean, competitor_spread) = if rates.is_empty() {
            (None, None)
        } else {
            let max = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = rates.iter().copied().fold(f64::INFINITY, f64::min);
            (Some(mean(&rates)), Some(max - min))
        };

        FeatureRecord {
            stay_date,
            room_type: room_type.to_string(),
            day_of_week: weekday.num_days_from_monday(),
            is_weekend: is_hotel_weekend(weekday),
            trailing_occupancy_mean: mean(&occupancy),
            weighted_occupancy: exponentially_weighted_mean(&occupancy, self.decay),
            last_occupancy: occupancy.last().copied().unwrap_or(0.0),
            dow_occupancy_mean: mean(&same_dow),
            dow_observation_count: same_dow.len(),
            trailing_adr_mean: mean(&adr),
            capacity,
            competitor_mean,
            competitor_spread,
            observation_count: points.len(),
        }
    }

    /// Training examples for every observation in the lookback window before `run_date`, and
    /// horizon records for `horizon_days` stay dates starting at `run_date`.
    pub fn build_set(
        &self,
        run_date: NaiveDate,
        horizon_days: u32,
        room_types: &[String],
        history: &[HistoricalObservation],
        competitors: &[CompetitorObservation],
    ) -> FeatureSet {
        if self.lookback_days < MIN_USEFUL_LOOKBACK_DAYS {
            tracing::debug!(
                lookback_days = self.lookback_days,
                "lookback window shorter than a week; features will be noisy"
            );
        }

        let window = DateRange::trailing(run_date, self.lookback_days);
        let mut targets: Vec<&HistoricalObservation> = history
            .iter()
            .filter(|o| window.contains(o.stay_date) && room_types.contains(&o.room_type))
            .collect();
        targets.sort_by(|a, b| {
            a.stay_date
                .cmp(&b.stay_date)
                .then_with(|| a.room_type.cmp(&b.room_type))
        });

        let training = targets
            .into_iter()
            .map(|o| TrainingExample {
                features: self.build(o.stay_date, &o.room_type, o.stay_date, history, competitors),
                occupancy: f64::from(o.occupancy),
            })
            .collect();

        let horizon = DateRange::starting(run_date, horizon_days)
            .dates()
            .flat_map(|d| {
                room_types
                    .iter()
                    .map(move |rt| self.build(d, rt, run_date, history, competitors))
            })
            .collect();

        FeatureSet {
            run_date,
            room_types: room_types.to_vec(),
            training,
            horizon,
        }
    }
}

/// Friday and Saturday nights.
pub fn is_hotel_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Fri | Weekday::Sat)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Weighted mean of a chronological series where each point weighs `decay` times the point after
/// it. A single point returns itself; an empty series returns 0.
pub fn exponentially_weighted_mean(values: &[f64], decay: f64) -> f64 {
    let mut weight = 1.0;
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for v in values.iter().rev() {
        weighted_sum += v * weight;
        weight_total += weight;
        weight *= decay;
    }
    if weight_total == 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}
