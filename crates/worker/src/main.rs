use anyhow::Context;
use clap::{Parser, Subcommand};
use hotelrate_core::config::{ForecastConfig, Settings, MAX_HORIZON_DAYS};
use hotelrate_core::run::ForecastRun;
use hotelrate_core::storage::runs::{self, LockedRun};
use hotelrate_core::storage::{self, PgStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ingest;

#[derive(Debug, Parser)]
#[command(name = "hotelrate_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Forecast demand and recommend rates for the horizon starting at the run date.
    Forecast {
        /// Run date (YYYY-MM-DD). Defaults to today's hotel-local date.
        #[arg(long)]
        run_date: Option<String>,

        /// Overrides FORECAST_HORIZON_DAYS.
        #[arg(long)]
        horizon_days: Option<u32>,

        /// Do everything except writing to the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Load reservation history and/or competitor rates from CSV exports.
    Ingest {
        #[arg(long)]
        reservations: Option<PathBuf>,

        #[arg(long)]
        competitors: Option<PathBuf>,
    },
}

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

    let args = Args::parse();

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    storage::migrate(&pool).await?;

    match args.command {
        Command::Forecast {
            run_date,
            horizon_days,
            dry_run,
        } => run_forecast(&settings, pool, run_date.as_deref(), horizon_days, dry_run).await,
        Command::Ingest {
            reservations,
            competitors,
        } => {
            ingest::ingest_csv_files(&pool, reservations.as_deref(), competitors.as_deref())
                .await?;
            Ok(())
        }
    }
}

async fn run_forecast(
    settings: &Settings,
    pool: sqlx::PgPool,
    run_date_arg: Option<&str>,
    horizon_override: Option<u32>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let config = ForecastConfig::from_env();
    config.validate()?;
    let horizon_days = horizon_override.unwrap_or(config.horizon_days);
    anyhow::ensure!(
        (1..=MAX_HORIZON_DAYS).contains(&horizon_days),
        "--horizon-days must be 1..={MAX_HORIZON_DAYS} (got {horizon_days})"
    );

    let run_date = hotelrate_core::time::resolve_run_date(
        run_date_arg,
        chrono::Utc::now(),
        settings.utc_offset_hours()?,
    )?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let run = ForecastRun::new(store.clone(), store, config);

    if dry_run {
        let records = run.execute(run_date, horizon_days).await?;
        tracing::info!(
            %run_date,
            dry_run = true,
            records = records.len(),
            models = %hotelrate_core::run::model_summary(&records),
            "forecast run (dry-run)"
        );
        return Ok(());
    }

    match runs::run_locked(&pool, &run, run_date, horizon_days).await? {
        LockedRun::Completed { run_id, records } => {
            tracing::info!(%run_date, %run_id, records = records.len(), "persisted forecast run");
            Ok(())
        }
        LockedRun::Failed { run_id, error } => {
            let err = anyhow::Error::new(error);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%run_date, %run_id, error = %err, "forecast run failed");
            Err(err)
        }
        LockedRun::Busy => {
            tracing::warn!(%run_date, "run_date lock not acquired; another run in progress");
            Ok(())
        }
    }
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
