use super::types::{CompetitorRateRow, ReservationRow};
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::path::Path;

pub fn read_reservations<R: Read>(reader: R) -> anyhow::Result<Vec<ReservationRow>> {
    read_rows(reader, "reservations", ReservationRow::validate)
}

pub fn read_competitor_rates<R: Read>(reader: R) -> anyhow::Result<Vec<CompetitorRateRow>> {
    read_rows(reader, "competitor rates", CompetitorRateRow::validate)
}

pub fn read_reservations_file(path: &Path) -> anyhow::Result<Vec<ReservationRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_reservations(file).with_context(|| format!("failed to load {}", path.display()))
}

pub fn read_competitor_rates_file(path: &Path) -> anyhow::Result<Vec<CompetitorRateRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_competitor_rates(file).with_context(|| format!("failed to load {}", path.display()))
}

fn read_rows<R, T>(
    reader: R,
    what: &str,
    validate: impl Fn(&T) -> anyhow::Result<()>,
) -> anyhow::Result<Vec<T>>
where
    R: Read,
    T: DeserializeOwned,
{
    let mut rdr = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .from_reader(reader);

    let mut out = Vec::new();
    for (idx, result) in rdr.deserialize::<T>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let row = result.with_context(|| format!("{what} line {line}: malformed row"))?;
        validate(&row).with_context(|| format!("{what} line {line}: invalid row"))?;
        out.push(row);
    }
    Ok(out)
}
