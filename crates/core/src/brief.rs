use crate::domain::ForecastRecord;
use chrono::Days;

/// Plain-text daily rate brief for the first `days` stay dates of a run. One line per
/// stay_date/room_type; records are expected in stay_date order.
pub fn render_brief(records: &[ForecastRecord], days: u32) -> String {
    let Some(first) = records.iter().map(|r| r.stay_date).min() else {
        return "Daily Rate Brief: no forecasts available.".to_string();
    };
    // None past the end of the calendar: every record is in range.
    let until = first.checked_add_days(Days::new(u64::from(days)));

    let mut out = format!("Daily Rate Brief (run {}):\n", records[0].run_date);
    for r in records
        .iter()
        .filter(|r| until.map_or(true, |until| r.stay_date < until))
    {
        out.push_str(&brief_line(r));
        out.push('\n');
    }
    out
}

fn brief_line(r: &ForecastRecord) -> String {
    let competitor = r
        .competitor_rate
        .map(|rate| format!(", competitor ${rate:.2}"))
        .unwrap_or_default();
    format!(
        "{} {}: demand {:.0}, rec ADR ${:.2}{competitor} [{}]",
        r.stay_date, r.room_type, r.demand_forecast, r.rec_adr, r.model_used
    )
}
