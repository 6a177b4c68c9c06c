use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Run date for a forecast batch: the explicit `YYYY-MM-DD` argument when given, otherwise the
/// hotel's local calendar date at `now_utc`.
pub fn resolve_run_date(
    run_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    utc_offset_hours: i32,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = run_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid run date {s:?}, expected YYYY-MM-DD"));
    }

    let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
        .with_context(|| format!("invalid UTC offset: {utc_offset_hours}h"))?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}
