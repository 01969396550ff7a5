//! Bar loading from CSV files into an in-memory provider.
//!
//! Expected header: `time,open,high,low,close[,volume][,spread]`. Times are
//! RFC 3339 or plain `YYYY-MM-DD` dates (midnight UTC). Prices are mids; the
//! optional `spread` column builds the bid/ask sides.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use signalcore_core::data::InMemoryDataProvider;
use signalcore_core::domain::Bar;
use thiserror::Error;
use tracing::info;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: invalid time '{value}'")]
    InvalidTime { line: usize, value: String },

    #[error("line {line}: bar fails sanity check")]
    InsaneBar { line: usize },

    #[error("no bars in input")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(default)]
    spread: f64,
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Read bars for `symbol` from CSV. Output is sorted by time.
pub fn read_bars<R: Read>(reader: R, symbol: &str) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();

    for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        // Header is line 1.
        let line = i + 2;
        let time = parse_time(&row.time).ok_or_else(|| LoadError::InvalidTime {
            line,
            value: row.time.clone(),
        })?;
        let bar = Bar::from_mid(
            symbol, time, row.open, row.high, row.low, row.close, row.volume, row.spread,
        );
        if !bar.is_sane() {
            return Err(LoadError::InsaneBar { line });
        }
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(LoadError::Empty);
    }
    bars.sort_by_key(|b| b.time);
    Ok(bars)
}

/// Load one symbol's bars from a CSV file.
pub fn load_bars_csv(path: impl AsRef<Path>, symbol: &str) -> Result<Vec<Bar>, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars(file, symbol)?;
    info!(symbol, path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(bars)
}

/// Build a provider serving one CSV file per symbol under `feed`.
pub fn provider_from_csv<P: AsRef<Path>>(
    feed: &str,
    files: &[(String, P)],
) -> Result<InMemoryDataProvider, LoadError> {
    let mut provider = InMemoryDataProvider::new();
    for (symbol, path) in files {
        provider.insert_bars(feed, load_bars_csv(path, symbol)?);
    }
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
time,open,high,low,close,volume
2024-01-03,101,103,100,102,1000
2024-01-02,100,102,99,101,900
";

    #[test]
    fn reads_and_sorts() {
        let bars = read_bars(SAMPLE.as_bytes(), "SPY").unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].time < bars[1].time);
        assert_eq!(bars[0].close_mid(), 101.0);
        assert_eq!(bars[0].symbol, "SPY");
        assert_eq!(bars[1].total_volume(), 1000.0);
    }

    #[test]
    fn spread_column_builds_both_sides() {
        let text = "time,open,high,low,close,spread\n2024-01-02T14:30:00Z,10,11,9,10.5,0.2\n";
        let bars = read_bars(text.as_bytes(), "X").unwrap();
        assert!((bars[0].close_ask - bars[0].close_bid - 0.2).abs() < 1e-12);
        assert_eq!(bars[0].total_volume(), 0.0);
    }

    #[test]
    fn bad_time_reports_line() {
        let text = "time,open,high,low,close\n2024-01-02,1,1,1,1\nyesterday,1,1,1,1\n";
        match read_bars(text.as_bytes(), "X") {
            Err(LoadError::InvalidTime { line, value }) => {
                assert_eq!(line, 3);
                assert_eq!(value, "yesterday");
            }
            other => panic!("expected InvalidTime, got {other:?}"),
        }
    }

    #[test]
    fn insane_bar_rejected() {
        let text = "time,open,high,low,close\n2024-01-02,10,9,8,10\n";
        assert!(matches!(
            read_bars(text.as_bytes(), "X"),
            Err(LoadError::InsaneBar { line: 2 })
        ));
    }

    #[test]
    fn header_only_is_empty() {
        assert!(matches!(
            read_bars("time,open,high,low,close\n".as_bytes(), "X"),
            Err(LoadError::Empty)
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let bars = load_bars_csv(file.path(), "SPY").unwrap();
        assert_eq!(bars.len(), 2);

        let missing = load_bars_csv("/definitely/not/here.csv", "SPY");
        assert!(matches!(missing, Err(LoadError::Io { .. })));
    }
}
