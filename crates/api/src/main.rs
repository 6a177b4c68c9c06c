use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use hotelrate_core::config::{ForecastConfig, Settings, MAX_HORIZON_DAYS};
use hotelrate_core::domain::ForecastRecord;
use hotelrate_core::run::ForecastRun;
use hotelrate_core::storage::runs::{self, LockedRun};
use hotelrate_core::storage::{forecasts, PgStore};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_BRIEF_DAYS: u32 = 7;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let config = ForecastConfig::from_env();
    config.validate()?;

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match hotelrate_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState { pool, config };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/forecasts/latest", get(get_latest_forecasts))
        .route("/forecasts/:run_date", get(get_forecasts_by_date))
        .route("/runs/:run_date", post(trigger_run))
        .route("/brief/:run_date", get(get_brief))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
    config: ForecastConfig,
}

#[derive(Debug, Serialize)]
struct ApiForecasts {
    run_date: NaiveDate,
    records: Vec<ForecastRecord>,
}

#[derive(Debug, Deserialize)]
struct StayDateQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQuery {
    horizon_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct BriefQuery {
    days: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiRun {
    run_id: Uuid,
    run_date: NaiveDate,
    records: usize,
    model_used: String,
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %e, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn parse_date(s: &str) -> Result<NaiveDate, StatusCode> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)
}

fn parse_optional_date(s: Option<&str>) -> Result<Option<NaiveDate>, StatusCode> {
    s.map(parse_date).transpose()
}

fn requested_horizon(requested: Option<u32>, default: u32) -> Result<u32, StatusCode> {
    let horizon_days = requested.unwrap_or(default);
    if (1..=MAX_HORIZON_DAYS).contains(&horizon_days) {
        Ok(horizon_days)
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

async fn get_latest_forecasts(
    State(state): State<AppState>,
) -> Result<Json<ApiForecasts>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let run_date = forecasts::latest_run_date(pool)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let records = forecasts::fetch_forecasts(pool, run_date, None, None)
        .await
        .map_err(internal_error)?;

    Ok(Json(ApiForecasts { run_date, records }))
}

async fn get_forecasts_by_date(
    State(state): State<AppState>,
    Path(run_date): Path<String>,
    Query(query): Query<StayDateQuery>,
) -> Result<Json<ApiForecasts>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let run_date = parse_date(&run_date)?;
    let start = parse_optional_date(query.start.as_deref())?;
    let end = parse_optional_date(query.end.as_deref())?;
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let records = forecasts::fetch_forecasts(pool, run_date, start, end)
        .await
        .map_err(internal_error)?;
    if records.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(ApiForecasts { run_date, records }))
}

async fn trigger_run(
    State(state): State<AppState>,
    Path(run_date): Path<String>,
    Query(query): Query<RunQuery>,
) -> Result<Json<ApiRun>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let run_date = parse_date(&run_date)?;
    let horizon_days = requested_horizon(query.horizon_days, state.config.horizon_days)?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let run = ForecastRun::new(store.clone(), store, state.config.clone());

    match runs::run_locked(pool, &run, run_date, horizon_days)
        .await
        .map_err(internal_error)?
    {
        LockedRun::Completed { run_id, records } => {
            tracing::info!(%run_date, %run_id, records = records.len(), "persisted forecast run");
            Ok(Json(ApiRun {
                run_id,
                run_date,
                records: records.len(),
                model_used: hotelrate_core::run::model_summary(&records),
            }))
        }
        LockedRun::Failed { run_id, error } => {
            let err = anyhow::Error::new(error);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%run_date, %run_id, error = %err, "forecast run failed");
            Err(StatusCode::UNPROCESSABLE_ENTITY)
        }
        LockedRun::Busy => Err(StatusCode::CONFLICT),
    }
}

async fn get_brief(
    State(state): State<AppState>,
    Path(run_date): Path<String>,
    Query(query): Query<BriefQuery>,
) -> Result<String, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let run_date = parse_date(&run_date)?;
    let days = query.days.unwrap_or(DEFAULT_BRIEF_DAYS);
    if days == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let records = forecasts::fetch_forecasts(pool, run_date, None, None)
        .await
        .map_err(internal_error)?;
    if records.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(hotelrate_core::brief::render_brief(&records, days))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_query_is_bounded() {
        assert_eq!(requested_horizon(None, 14), Ok(14));
        assert_eq!(requested_horizon(Some(30), 14), Ok(30));
        assert_eq!(requested_horizon(Some(0), 14), Err(StatusCode::BAD_REQUEST));
        assert_eq!(
            requested_horizon(Some(u32::MAX), 14),
            Err(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            requested_horizon(Some(MAX_HORIZON_DAYS), 14),
            Ok(MAX_HORIZON_DAYS)
        );
    }

    #[test]
    fn rejects_malformed_dates() {
        assert_eq!(parse_date("2026-03-09"), Ok(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()));
        assert_eq!(parse_date("09/03/2026"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(parse_optional_date(None), Ok(None));
    }
}
