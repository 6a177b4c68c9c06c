pub mod forecast;
pub mod observation;

pub use forecast::{DemandForecast, ForecastRecord, ModelKind, PricingRecommendation};
pub use observation::{CompetitorObservation, DateRange, HistoricalObservation};
