use chrono::{Duration, NaiveDate};
use hotelrate_core::config::ForecastConfig;
use hotelrate_core::domain::{CompetitorObservation, HistoricalObservation, ModelKind};
use hotelrate_core::repository::{ForecastWriter, InMemoryStore};
use hotelrate_core::run::ForecastRun;
use hotelrate_core::ForecastError;
use std::collections::BTreeSet;
use std::sync::Arc;

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
}

/// Observations on consecutive nights ending the day before `end`.
fn nights(end: NaiveDate, room_type: &str, occupancy: &[u32], adr: f64) -> Vec<HistoricalObservation> {
    let n = occupancy.len() as i64;
    occupancy
        .iter()
        .enumerate()
        .map(|(i, occ)| HistoricalObservation {
            stay_date: end - Duration::days(n - i as i64),
            room_type: room_type.to_string(),
            occupancy: *occ,
            rooms_available: Some(50),
            adr,
        })
        .collect()
}

/// `days` nights with a weekly pattern, enough to train the primary model.
fn long_history(end: NaiveDate, room_type: &str, days: i64, level: u32) -> Vec<HistoricalObservation> {
    (1..=days)
        .map(|back| {
            let stay_date = end - Duration::days(back);
            let weekend = matches!(back % 7, 2 | 3);
            HistoricalObservation {
                stay_date,
                room_type: room_type.to_string(),
                occupancy: if weekend { level + 15 } else { level } + (back % 3) as u32,
                rooms_available: Some(level * 2 + 20),
                adr: if weekend { 160.0 } else { 125.0 },
            }
        })
        .collect()
}

fn run_over(store: &Arc<InMemoryStore>, config: ForecastConfig) -> ForecastRun {
    ForecastRun::new(store.clone(), store.clone(), config)
}

#[tokio::test]
async fn scenario_a_short_history_uses_weighted_fallback() {
    let history = nights(run_date(), "Standard", &[10, 12, 11, 13, 14], 120.0);
    let store = Arc::new(InMemoryStore::new(history, vec![]));

    let records = run_over(&store, ForecastConfig::default())
        .execute(run_date(), 14)
        .await
        .unwrap();

    assert_eq!(records.len(), 14);
    for r in &records {
        assert_eq!(r.model_used, ModelKind::Fallback);
        assert!((r.demand_forecast - 406.0 / 31.0).abs() < 1e-9, "{}", r.demand_forecast);
        assert!(r.demand_forecast > 12.5 && r.demand_forecast < 13.5);
    }
}

#[tokio::test]
async fn scenario_b_competitor_above_nudges_rate_up() {
    let history = nights(run_date(), "Standard", &[20, 20, 20, 20, 20], 120.0);
    let competitors = vec![
        CompetitorObservation {
            stay_date: run_date(),
            competitor: "Harbor Inn".into(),
            room_type: "Standard".into(),
            rate: 140.0,
        },
        CompetitorObservation {
            stay_date: run_date(),
            competitor: "Grand Central".into(),
            room_type: "Standard".into(),
            rate: 160.0,
        },
    ];
    let store = Arc::new(InMemoryStore::new(history, competitors));

    let records = run_over(&store, ForecastConfig::default())
        .execute(run_date(), 2)
        .await
        .unwrap();

    let first = &records[0];
    assert_eq!(first.stay_date, run_date());
    assert_eq!(first.competitor_rate, Some(150.0));
    assert!(first.rec_adr > 120.0 && first.rec_adr <= 123.0, "{}", first.rec_adr);
    assert!(first.notes.contains("competitor-nudged"), "{}", first.notes);

    let second = &records[1];
    assert_eq!(second.rec_adr, 120.0);
    assert!(second.notes.contains("competitor data unavailable"));
}

#[tokio::test]
async fn scenario_c_room_type_without_history_prices_at_floor() {
    let history = nights(run_date(), "Standard", &[20, 22, 21], 120.0);
    let store = Arc::new(InMemoryStore::new(history, vec![]));
    let config = ForecastConfig {
        room_types: Some(vec!["Standard".into(), "Suite".into()]),
        ..Default::default()
    };
    let floor = config.min_margin_floor;

    let records = run_over(&store, config).execute(run_date(), 14).await.unwrap();
    assert_eq!(records.len(), 28);

    let suites: Vec<_> = records.iter().filter(|r| r.room_type == "Suite").collect();
    assert_eq!(suites.len(), 14);
    for r in suites {
        assert_eq!(r.model_used, ModelKind::Fallback);
        assert_eq!(r.demand_forecast, 0.0);
        assert_eq!(r.rec_adr, floor);
        assert!(r.notes.contains("floor-clamped"), "{}", r.notes);
    }
}

#[tokio::test]
async fn horizon_covers_every_room_type_and_date() {
    let mut history = Vec::new();
    for (rt, level) in [("Standard", 30), ("Deluxe", 18), ("Suite", 6)] {
        history.extend(long_history(run_date(), rt, 120, level));
    }
    let store = Arc::new(InMemoryStore::new(history, vec![]));

    let records = run_over(&store, ForecastConfig::default())
        .execute(run_date(), 14)
        .await
        .unwrap();

    assert_eq!(records.len(), 42);
    assert!(records.iter().all(|r| r.model_used == ModelKind::Primary));
    assert!(records.iter().all(|r| r.rec_adr > 0.0 && r.demand_forecast >= 0.0));

    let keys: BTreeSet<_> = records.iter().map(|r| (r.stay_date, r.room_type.clone())).collect();
    assert_eq!(keys.len(), 42);
    let last = run_date() + Duration::days(13);
    assert!(records.iter().all(|r| r.stay_date >= run_date() && r.stay_date <= last));
}

#[tokio::test]
async fn rerunning_a_run_date_is_idempotent() {
    let mut history = long_history(run_date(), "Standard", 40, 25);
    history.extend(nights(run_date(), "Suite", &[3, 4, 5], 320.0));
    let store = Arc::new(InMemoryStore::new(history, vec![]));
    let run = run_over(&store, ForecastConfig::default());

    let first = run.execute(run_date(), 14).await.unwrap();
    store.upsert(run_date(), &first).await.unwrap();
    let second = run.execute(run_date(), 14).await.unwrap();
    store.upsert(run_date(), &second).await.unwrap();

    let stored = store.forecasts_for(run_date());
    assert_eq!(stored.len(), 28);
    let keys: BTreeSet<_> = stored.iter().map(|r| (r.stay_date, r.room_type.clone())).collect();
    assert_eq!(keys.len(), stored.len());
}

#[tokio::test]
async fn different_run_dates_can_execute_concurrently() {
    let history = long_history(run_date(), "Standard", 60, 25);
    let store = Arc::new(InMemoryStore::new(history, vec![]));
    let run = run_over(&store, ForecastConfig::default());

    let earlier = run_date() - Duration::days(7);
    let (a, b) = tokio::join!(
        run.execute_and_persist(&*store, run_date(), 14),
        run.execute_and_persist(&*store, earlier, 14)
    );
    assert_eq!(a.unwrap().len(), 14);
    assert_eq!(b.unwrap().len(), 14);
    assert_eq!(store.forecasts_for(run_date()).len(), 14);
    assert_eq!(store.forecasts_for(earlier).len(), 14);
}

#[tokio::test]
async fn fatal_errors_persist_nothing() {
    let store = Arc::new(InMemoryStore::new(vec![], vec![]));
    let err = run_over(&store, ForecastConfig::default())
        .execute_and_persist(&*store, run_date(), 14)
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, ForecastError::RunFailed { .. }));
    assert!(store.forecasts().is_empty());
}
