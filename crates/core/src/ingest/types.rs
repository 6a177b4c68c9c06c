use crate::domain::{CompetitorObservation, HistoricalObservation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One line of a reservations export: `date,room_type,rooms_sold,rooms_available,adr,revenue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRow {
    pub date: NaiveDate,
    pub room_type: String,
    pub rooms_sold: u32,
    pub rooms_available: Option<u32>,
    pub adr: f64,
    pub revenue: Option<f64>,
}

impl ReservationRow {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.room_type.trim().is_empty(), "room_type must be non-empty");
        anyhow::ensure!(
            self.adr.is_finite() && self.adr > 0.0,
            "adr must be positive (got {})",
            self.adr
        );
        if let Some(available) = self.rooms_available {
            anyhow::ensure!(
                self.rooms_sold <= available,
                "rooms_sold {} exceeds rooms_available {available}",
                self.rooms_sold
            );
        }
        if let Some(revenue) = self.revenue {
            anyhow::ensure!(
                revenue.is_finite() && revenue >= 0.0,
                "revenue must be non-negative (got {revenue})"
            );
        }
        Ok(())
    }

    pub fn revenue_or_derived(&self) -> f64 {
        self.revenue
            .unwrap_or_else(|| f64::from(self.rooms_sold) * self.adr)
    }

    pub fn to_observation(&self) -> HistoricalObservation {
        HistoricalObservation {
            stay_date: self.date,
            room_type: self.room_type.trim().to_string(),
            occupancy: self.rooms_sold,
            rooms_available: self.rooms_available,
            adr: self.adr,
        }
    }
}

/// One line of a competitor rate shop export: `date,competitor,room_type,rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorRateRow {
    pub date: NaiveDate,
    pub competitor: String,
    pub room_type: String,
    pub rate: f64,
}

impl CompetitorRateRow {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.competitor.trim().is_empty(), "competitor must be non-empty");
        anyhow::ensure!(!self.room_type.trim().is_empty(), "room_type must be non-empty");
        anyhow::ensure!(
            self.rate.is_finite() && self.rate > 0.0,
            "rate must be positive (got {})",
            self.rate
        );
        Ok(())
    }

    pub fn to_observation(&self) -> CompetitorObservation {
        CompetitorObservation {
            stay_date: self.date,
            competitor: self.competitor.trim().to_string(),
            room_type: self.room_type.trim().to_string(),
            rate: self.rate,
        }
    }
}
