//! Compressed trade log stored inside each backtest summary.
//!
//! One record per trade, `timestamp|signed-price|quantity;`, where the
//! timestamp is Unix milliseconds and sells carry a negative price. The
//! concatenated text is gzip-compressed.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use signalcore_core::domain::OrderSide;
use thiserror::Error;

use crate::stats::TradeEntry;

#[derive(Debug, Error)]
pub enum TradeLogError {
    #[error("trade log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trade log is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("malformed trade record '{0}'")]
    Malformed(String),
}

/// Render trades in the delimited text form, uncompressed.
pub fn format_trades(trades: &[TradeEntry]) -> String {
    trades
        .iter()
        .map(|t| {
            format!(
                "{}|{}|{};",
                t.time.timestamp_millis(),
                t.side.sign() * t.price,
                t.quantity
            )
        })
        .collect()
}

/// Parse the delimited text form back into trades.
pub fn parse_trades(text: &str) -> Result<Vec<TradeEntry>, TradeLogError> {
    text.split(';')
        .filter(|r| !r.trim().is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Result<TradeEntry, TradeLogError> {
    let malformed = || TradeLogError::Malformed(record.to_string());
    let mut fields = record.trim().split('|');
    let (Some(ts), Some(price), Some(qty), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };
    let ms: i64 = ts.parse().map_err(|_| malformed())?;
    let signed_price: f64 = price.parse().map_err(|_| malformed())?;
    let quantity: f64 = qty.parse().map_err(|_| malformed())?;
    let time = DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(malformed)?;
    let side = if signed_price < 0.0 {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    };
    Ok(TradeEntry {
        time,
        side,
        price: signed_price.abs(),
        quantity,
    })
}

pub fn encode_trade_log(trades: &[TradeEntry]) -> Result<Vec<u8>, TradeLogError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(format_trades(trades).as_bytes())?;
    Ok(encoder.finish()?)
}

pub fn decode_trade_log(bytes: &[u8]) -> Result<Vec<TradeEntry>, TradeLogError> {
    let mut raw = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut raw)?;
    parse_trades(&String::from_utf8(raw)?)
}
