//! Price feed decoding
//!
//! Upstream feeds are third-party JSON with no stable schema. Each known
//! shape is a [`PriceSource`] variant with its own decode step; field names
//! are matched through aliases and prices may be numbers or (comma-decimal)
//! strings. Records that cannot be read are dropped, not fatal.

pub mod poller;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{PriceRecord, PriceSnapshot};
use crate::services::xtream::types::{string_or_number, value_as_string};

pub use poller::{spawn_ticker, FeedUrlSource, PollerSettings, PricePoller, StaticFeedUrl, TickerHandle};

lazy_static! {
    /// Keys in keyed snapshots that carry metadata, not quotes
    static ref META_KEY_REGEX: Regex = Regex::new(r"(?i)^(update_?date|tarih|meta|timestamp|time)$").unwrap();
}

/// Timestamp layouts seen in feeds
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FeedError::Network("Request timed out".to_string())
        } else {
            FeedError::Network(e.without_url().to_string())
        }
    }
}

/// Upstream feed shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// `{"USDTRY": {"alis": .., "satis": ..}, "Update_Date": ".."}`
    Keyed,
    /// `[{"k": "USDTRY", "t": "..", "s": "..", "a": ".."}]`
    RecordList,
}

impl FromStr for PriceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyed" | "object" => Ok(PriceSource::Keyed),
            "list" | "records" | "array" => Ok(PriceSource::RecordList),
            other => Err(format!("Unknown price feed format: {}", other)),
        }
    }
}

/// Which symbols to keep
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    /// Upper-case code prefixes ("USD" keeps "USDTRY")
    codes: Vec<String>,
    /// Case-insensitive keyword alternation ("ALTIN|GOLD")
    keywords: Option<Regex>,
}

impl SymbolFilter {
    pub fn new<S: AsRef<str>>(codes: &[S], keywords: &[S]) -> Self {
        let codes: Vec<String> = codes
            .iter()
            .map(|c| c.as_ref().trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();

        let words: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        let keywords = if words.is_empty() {
            None
        } else {
            match RegexBuilder::new(&words.join("|")).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Ignoring price keywords, bad pattern: {}", e);
                    None
                }
            }
        };

        Self { codes, keywords }
    }

    /// Keep everything
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, symbol: &str) -> bool {
        if self.codes.is_empty() && self.keywords.is_none() {
            return true;
        }

        let upper = symbol.to_uppercase();
        self.codes.iter().any(|code| upper.starts_with(code.as_str()))
            || self.keywords.as_ref().is_some_and(|re| re.is_match(symbol))
    }
}

/// One quote as sent upstream, before validation
#[derive(Debug, Default, Deserialize)]
struct RawQuote {
    #[serde(default, alias = "k", alias = "code", alias = "symbol", deserialize_with = "string_or_number")]
    key: Option<String>,
    #[serde(default, alias = "satis", alias = "s", alias = "selling", deserialize_with = "string_or_number")]
    sell: Option<String>,
    #[serde(default, alias = "alis", alias = "a", alias = "buying", deserialize_with = "string_or_number")]
    buy: Option<String>,
    #[serde(default, alias = "degisim", alias = "d", alias = "percent_change", deserialize_with = "string_or_number")]
    change: Option<String>,
    #[serde(default, alias = "tarih", alias = "t", alias = "timestamp", deserialize_with = "string_or_number")]
    time: Option<String>,
}

impl RawQuote {
    fn into_record(self, symbol: String, fallback_time: NaiveDateTime) -> Option<PriceRecord> {
        let Some(sell_price) = self.sell.as_deref().and_then(parse_decimal) else {
            debug!("Dropping {}: no usable sell price", symbol);
            return None;
        };

        Some(PriceRecord {
            symbol,
            sell_price,
            buy_price: self.buy.as_deref().and_then(parse_decimal),
            percent_change: self.change.as_deref().and_then(parse_decimal),
            timestamp: self
                .time
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(fallback_time),
            direction: None,
        })
    }
}

impl PriceSource {
    /// Decode a raw feed body into a snapshot.
    ///
    /// Fails only when the body is not JSON or has the wrong top-level shape.
    pub fn decode(
        &self,
        body: &str,
        filter: &SymbolFilter,
        fetched_at: DateTime<Utc>,
    ) -> Result<PriceSnapshot, FeedError> {
        let value: Value = serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;

        let records = match (self, value) {
            (PriceSource::Keyed, Value::Object(obj)) => decode_keyed(obj, filter, fetched_at),
            (PriceSource::RecordList, Value::Array(list)) => decode_list(list, filter, fetched_at),
            (PriceSource::Keyed, _) => {
                return Err(FeedError::Parse("expected a JSON object keyed by symbol".to_string()))
            }
            (PriceSource::RecordList, _) => {
                return Err(FeedError::Parse("expected a JSON array of records".to_string()))
            }
        };

        Ok(PriceSnapshot { records, fetched_at })
    }
}

fn decode_keyed(obj: Map<String, Value>, filter: &SymbolFilter, fetched_at: DateTime<Utc>) -> Vec<PriceRecord> {
    // Feed-wide update time applies to quotes without their own
    let feed_time = obj
        .iter()
        .find(|(key, _)| META_KEY_REGEX.is_match(key))
        .and_then(|(_, v)| value_as_string(v))
        .and_then(|s| parse_timestamp(&s))
        .unwrap_or_else(|| fetched_at.naive_utc());

    obj.into_iter()
        .filter(|(key, _)| !META_KEY_REGEX.is_match(key) && filter.matches(key))
        .filter_map(|(key, value)| {
            if !value.is_object() {
                return None;
            }
            let raw: RawQuote = match serde_json::from_value(value) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("Dropping {}: {}", key, e);
                    return None;
                }
            };
            raw.into_record(key, feed_time)
        })
        .collect()
}

fn decode_list(list: Vec<Value>, filter: &SymbolFilter, fetched_at: DateTime<Utc>) -> Vec<PriceRecord> {
    let fallback = fetched_at.naive_utc();

    list.into_iter()
        .filter(Value::is_object)
        .filter_map(|value| serde_json::from_value::<RawQuote>(value).ok())
        .filter_map(|mut raw| {
            let symbol = raw.key.take()?;
            if !filter.matches(&symbol) {
                return None;
            }
            raw.into_record(symbol, fallback)
        })
        .collect()
}

/// Parse "34,5123", "1.234,56", "1,234.56", "%0.45", "-0.12%"
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%')
        .collect();

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a feed timestamp; unix seconds or milliseconds are accepted too
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(epoch) = raw.parse::<i64>() {
        let dt = if epoch > 100_000_000_000 {
            Utc.timestamp_millis_opt(epoch).single()
        } else {
            Utc.timestamp_opt(epoch, 0).single()
        };
        return dt.map(|d| d.naive_utc());
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
