pub mod brief;
pub mod domain;
pub mod error;
pub mod features;
pub mod forecast;
pub mod ingest;
pub mod pricing;
pub mod repository;
pub mod run;
pub mod storage;
pub mod time;

pub use error::{ForecastError, RunStage};

pub mod config {
    use anyhow::Context;
    use std::str::FromStr;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub hotel_utc_offset_hours: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                hotel_utc_offset_hours: std::env::var("HOTEL_UTC_OFFSET_HOURS").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        /// Hotel-local UTC offset used to resolve "today". Defaults to UTC.
        pub fn utc_offset_hours(&self) -> anyhow::Result<i32> {
            let Some(raw) = self.hotel_utc_offset_hours.as_deref() else {
                return Ok(0);
            };
            let hours = raw
                .trim()
                .parse::<i32>()
                .with_context(|| format!("HOTEL_UTC_OFFSET_HOURS must be an integer (got {raw})"))?;
            anyhow::ensure!(
                (-12..=14).contains(&hours),
                "HOTEL_UTC_OFFSET_HOURS must be -12..=14 (got {hours})"
            );
            Ok(hours)
        }
    }

    /// Longest forecast horizon a run accepts.
    pub const MAX_HORIZON_DAYS: u32 = 366;

    /// Longest lookback window a run accepts.
    pub const MAX_LOOKBACK_DAYS: u32 = 3650;

    /// Business parameters of the forecasting core. Supplied by the caller; the defaults are
    /// illustrative and meant to be overridden per property.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ForecastConfig {
        /// Trailing history length used to compute features.
        pub lookback_days: u32,

        /// Minimum number of history points before the boosted model is trained.
        pub min_training_points: usize,

        pub horizon_days: u32,

        /// Lower bound of the demand-driven band, as a fraction of base ADR (e.g. -0.15).
        pub band_floor_pct: f64,

        /// Upper bound of the demand-driven band, as a fraction of base ADR (e.g. 0.25).
        pub band_ceiling_pct: f64,

        /// Absolute minimum-margin price. Recommendations never go below it.
        pub min_margin_floor: f64,

        /// Fraction of the gap to the competitor mean applied to the rate.
        pub competitor_nudge: f64,

        /// Rate change per unit of relative demand change (1.0 = +10% demand, +10% rate).
        pub demand_sensitivity: f64,

        /// Weight ratio between consecutive history points in the fallback average.
        pub fallback_decay: f64,

        /// Room types to forecast. `None` forecasts every room type found in history.
        pub room_types: Option<Vec<String>>,
    }

    impl Default for ForecastConfig {
        fn default() -> Self {
            Self {
                lookback_days: 90,
                min_training_points: 30,
                horizon_days: 14,
                band_floor_pct: -0.15,
                band_ceiling_pct: 0.25,
                min_margin_floor: 50.0,
                competitor_nudge: 0.10,
                demand_sensitivity: 1.0,
                fallback_decay: 0.5,
                room_types: None,
            }
        }
    }

    impl ForecastConfig {
        pub fn from_env() -> Self {
            let mut out = Self::default();

            if let Some(n) = env_parse("FORECAST_LOOKBACK_DAYS") {
                out.lookback_days = n;
            }
            if let Some(n) = env_parse("FORECAST_MIN_TRAINING_POINTS") {
                out.min_training_points = n;
            }
            if let Some(n) = env_parse("FORECAST_HORIZON_DAYS") {
                out.horizon_days = n;
            }
            if let Some(v) = env_parse("PRICING_BAND_FLOOR_PCT") {
                out.band_floor_pct = v;
            }
            if let Some(v) = env_parse("PRICING_BAND_CEILING_PCT") {
                out.band_ceiling_pct = v;
            }
            if let Some(v) = env_parse("PRICING_MIN_MARGIN_FLOOR") {
                out.min_margin_floor = v;
            }
            if let Some(v) = env_parse("PRICING_COMPETITOR_NUDGE") {
                out.competitor_nudge = v;
            }
            if let Some(v) = env_parse("PRICING_DEMAND_SENSITIVITY") {
                out.demand_sensitivity = v;
            }
            if let Some(v) = env_parse("FALLBACK_DECAY") {
                out.fallback_decay = v;
            }
            if let Ok(s) = std::env::var("FORECAST_ROOM_TYPES") {
                out.room_types = parse_room_types(&s);
            }

            out
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(
                (1..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days),
                "lookback_days must be 1..={MAX_LOOKBACK_DAYS} (got {})",
                self.lookback_days
            );
            anyhow::ensure!(
                (1..=MAX_HORIZON_DAYS).contains(&self.horizon_days),
                "horizon_days must be 1..={MAX_HORIZON_DAYS} (got {})",
                self.horizon_days
            );
            anyhow::ensure!(
                self.min_margin_floor.is_finite() && self.min_margin_floor > 0.0,
                "min_margin_floor must be > 0 (got {})",
                self.min_margin_floor
            );
            anyhow::ensure!(
                self.band_floor_pct.is_finite()
                    && self.band_ceiling_pct.is_finite()
                    && self.band_floor_pct <= 0.0
                    && self.band_ceiling_pct >= 0.0
                    && self.band_floor_pct > -1.0,
                "pricing band must satisfy -1 < floor <= 0 <= ceiling (got {}..{})",
                self.band_floor_pct,
                self.band_ceiling_pct
            );
            anyhow::ensure!(
                (0.0..=1.0).contains(&self.competitor_nudge),
                "competitor_nudge must be 0..=1 (got {})",
                self.competitor_nudge
            );
            anyhow::ensure!(
                self.demand_sensitivity.is_finite() && self.demand_sensitivity >= 0.0,
                "demand_sensitivity must be >= 0 (got {})",
                self.demand_sensitivity
            );
            anyhow::ensure!(
                self.fallback_decay > 0.0 && self.fallback_decay <= 1.0,
                "fallback_decay must be in (0, 1] (got {})",
                self.fallback_decay
            );
            if let Some(room_types) = &self.room_types {
                anyhow::ensure!(!room_types.is_empty(), "room_types must be non-empty when set");
                anyhow::ensure!(
                    room_types.iter().all(|rt| !rt.trim().is_empty()),
                    "room type labels must be non-empty"
                );
            }
            Ok(())
        }
    }

    fn env_parse<T: FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    fn parse_room_types(s: &str) -> Option<Vec<String>> {
        let out: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

}
