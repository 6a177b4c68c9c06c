pub mod forecasts;
pub mod history;
pub mod lock;
pub mod pg;
pub mod runs;

pub use pg::PgStore;

use anyhow::Context;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Rows per multi-row INSERT, overridable through `key` (must be >= 1).
pub(crate) fn batch_size_from_env(key: &str) -> anyhow::Result<usize> {
    let chunk_size: usize = std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(200);
    anyhow::ensure!(chunk_size >= 1, "{key} must be >= 1");
    Ok(chunk_size)
}
