pub mod csv;
pub mod types;

pub use types::{CompetitorRateRow, ReservationRow};
