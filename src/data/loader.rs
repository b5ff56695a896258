use crate::data::bar::Bar;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CsvRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    symbol: Option<String>,
}

//a loaded bar together with the symbol column, if the file has one
#[derive(Debug, Clone)]
pub struct SymbolBar {
    pub symbol: Option<String>,
    pub bar: Bar,
}

//accepts rfc3339 strings or epoch milliseconds (exchange kline exports)
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(millis) = raw.trim().parse::<i64>() {
        return Utc
            .timestamp_millis_opt(millis)
            .single()
            .context(format!("Timestamp out of range: {}", millis));
    }

    Ok(DateTime::parse_from_rfc3339(raw.trim())
        .context(format!("Failed to parse timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

//loads bars (with their optional symbol) from a csv file
pub fn load_csv_records<P: AsRef<Path>>(path: P) -> Result<Vec<SymbolBar>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(format!("Failed to open CSV file: {:?}", path))?;

    let mut records = Vec::new();

    for (index, result) in reader.deserialize().enumerate() {
        let record: CsvRecord =
            result.context(format!("Failed to parse CSV record at line {}", index + 2))?;

        let timestamp = parse_timestamp(&record.timestamp)
            .context(format!("Bad timestamp at line {}", index + 2))?;

        let bar = Bar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        )
        .context(format!("Invalid bar at line {}", index + 2))?;

        records.push(SymbolBar {
            symbol: record.symbol.filter(|s| !s.is_empty()),
            bar,
        });
    }

    //sort by timestamp to ensure chronological order
    records.sort_by(|a, b| a.bar.timestamp.cmp(&b.bar.timestamp));

    Ok(records)
}

//loads every bar in a csv file regardless of symbol
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Bar>> {
    Ok(load_csv_records(path)?
        .into_iter()
        .map(|record| record.bar)
        .collect())
}

//keeps bars for the symbol; rows without a symbol column always match
pub fn filter_by_symbol(records: &[SymbolBar], symbol: &str) -> Vec<Bar> {
    records
        .iter()
        .filter(|record| {
            record
                .symbol
                .as_deref()
                .map_or(true, |s| s.eq_ignore_ascii_case(symbol))
        })
        .map(|record| record.bar.clone())
        .collect()
}

//keeps bars whose timestamp lies within [start, end]
pub fn filter_by_range(bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar> {
    bars.iter()
        .filter(|bar| bar.timestamp >= start && bar.timestamp <= end)
        .cloned()
        .collect()
}
