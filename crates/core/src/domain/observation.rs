use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// One night of recorded sales for a room type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalObservation {
    pub stay_date: NaiveDate,
    pub room_type: String,
    /// Rooms sold.
    pub occupancy: u32,
    /// Sellable rooms of this type on that night, when known.
    pub rooms_available: Option<u32>,
    pub adr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorObservation {
    pub stay_date: NaiveDate,
    pub competitor: String,
    pub room_type: String,
    pub rate: f64,
}

/// Half-open range of stay dates, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days` dates strictly before `end`, saturating at the earliest representable date.
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        Self {
            start: end
                .checked_sub_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MIN),
            end,
        }
    }

    /// The `days` dates starting at `start`, saturating at the latest representable date.
    pub fn starting(start: NaiveDate, days: u32) -> Self {
        Self {
            start,
            end: start
                .checked_add_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}
