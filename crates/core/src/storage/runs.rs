use super::{lock, PgStore};
use crate::domain::ForecastRecord;
use crate::error::ForecastError;
use crate::run::{model_summary, ForecastRun};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Connection;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub enum LockedRun {
    Completed {
        run_id: Uuid,
        records: Vec<ForecastRecord>,
    },
    Failed {
        run_id: Uuid,
        error: ForecastError,
    },
    /// Another process holds the run_date lock; nothing was executed.
    Busy,
}

/// Executes and persists one run under the run_date advisory lock, recording the outcome in
/// `forecast_runs`. A failed or panicking forecast is an `Ok(LockedRun::Failed)`; `Err` means the
/// database itself was unusable.
pub async fn run_locked(
    pool: &sqlx::PgPool,
    run: &ForecastRun,
    run_date: NaiveDate,
    horizon_days: u32,
) -> anyhow::Result<LockedRun> {
    let mut conn = pool.acquire().await.context("acquire lock connection failed")?;
    if !lock::try_acquire_run_date_lock(&mut *conn, run_date).await? {
        return Ok(LockedRun::Busy);
    }

    let store = Arc::new(PgStore::new(pool.clone()));
    let outcome = match run
        .execute_and_persist_isolated(store, run_date, horizon_days)
        .await
    {
        Ok(records) => record_success(pool, run_date, &records)
            .await
            .map(|run_id| LockedRun::Completed { run_id, records }),
        Err(error) => record_failure(pool, run_date, &error.to_string())
            .await
            .map(|run_id| LockedRun::Failed { run_id, error }),
    };

    let released = lock::release_run_date_lock(&mut *conn, run_date).await;
    if let Err(err) = released {
        // The lock is session-scoped: end the session rather than pool a locked connection.
        tracing::warn!(%run_date, error = %err, "failed to release run_date lock; closing connection");
        if let Err(err) = conn.detach().close().await {
            tracing::warn!(%run_date, error = %err, "closing lock connection failed");
        }
    }
    outcome
}

pub async fn record_success(
    pool: &sqlx::PgPool,
    run_date: NaiveDate,
    records: &[ForecastRecord],
) -> anyhow::Result<Uuid> {
    let records_len = i32::try_from(records.len()).context("record count out of range")?;
    insert_run(
        pool,
        run_date,
        "success",
        Some(model_summary(records)),
        records_len,
        None,
    )
    .await
}

pub async fn record_failure(
    pool: &sqlx::PgPool,
    run_date: NaiveDate,
    error: &str,
) -> anyhow::Result<Uuid> {
    insert_run(pool, run_date, "error", None, 0, Some(error)).await
}

async fn insert_run(
    pool: &sqlx::PgPool,
    run_date: NaiveDate,
    status: &str,
    model_used: Option<String>,
    records: i32,
    error: Option<&str>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO forecast_runs (id, run_date, generated_at, status, model_used, records, error) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .persistent(false)
    .bind(id)
    .bind(run_date)
    .bind(generated_at)
    .bind(status)
    .bind(model_used)
    .bind(records)
    .bind(error)
    .execute(pool)
    .await
    .context("insert forecast_runs failed")?;

    Ok(id)
}
