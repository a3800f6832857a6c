use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Price movement relative to the previous snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Unchanged,
}

/// One quote from a price feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    pub symbol: String,
    pub sell_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
    pub timestamp: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl PriceRecord {
    /// Symbol as shown to users ("GRAM_ALTIN" -> "GRAM ALTIN"); only the first
    /// underscore becomes a space
    pub fn display_symbol(&self) -> String {
        self.symbol.replacen('_', " ", 1)
    }
}

/// Result of a single successful poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub records: Vec<PriceRecord>,
    pub fetched_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Derive up/down direction of each record against the previous snapshot.
    /// Symbols absent from `previous` get no direction.
    pub fn with_directions(mut self, previous: Option<&PriceSnapshot>) -> Self {
        let Some(previous) = previous else {
            return self;
        };

        let last: HashMap<&str, f64> = previous
            .records
            .iter()
            .map(|r| (r.symbol.as_str(), r.sell_price))
            .collect();

        for record in &mut self.records {
            record.direction = last.get(record.symbol.as_str()).map(|&before| {
                if record.sell_price > before {
                    Direction::Up
                } else if record.sell_price < before {
                    Direction::Down
                } else {
                    Direction::Unchanged
                }
            });
        }

        self
    }

    /// Records whose symbol contains `query` (case-insensitive)
    pub fn filter(&self, query: &str) -> Vec<&PriceRecord> {
        let needle = query.trim().to_uppercase();
        self.records
            .iter()
            .filter(|r| needle.is_empty() || r.symbol.to_uppercase().contains(&needle))
            .collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&PriceRecord> {
        self.records.iter().find(|r| r.symbol == symbol)
    }
}

/// What the presentation layer renders for the ticker
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerState {
    /// Last successfully decoded snapshot, kept across failed polls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PriceSnapshot>,
    pub status: String,
    /// Ticker lifetime; bumped when the ticker is stopped. A state whose
    /// generation is behind the handle's belongs to a torn-down ticker.
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, sell: f64) -> PriceRecord {
        PriceRecord {
            symbol: symbol.to_string(),
            sell_price: sell,
            buy_price: None,
            percent_change: None,
            timestamp: NaiveDateTime::default(),
            direction: None,
        }
    }

    fn snapshot(records: Vec<PriceRecord>) -> PriceSnapshot {
        PriceSnapshot {
            records,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_with_directions() {
        let previous = snapshot(vec![record("USDTRY", 34.0), record("EURTRY", 37.0), record("GBPTRY", 43.0)]);
        let current = snapshot(vec![
            record("USDTRY", 34.5),
            record("EURTRY", 36.9),
            record("GBPTRY", 43.0),
            record("CHFTRY", 39.0),
        ])
        .with_directions(Some(&previous));

        assert_eq!(current.get("USDTRY").unwrap().direction, Some(Direction::Up));
        assert_eq!(current.get("EURTRY").unwrap().direction, Some(Direction::Down));
        assert_eq!(current.get("GBPTRY").unwrap().direction, Some(Direction::Unchanged));
        assert_eq!(current.get("CHFTRY").unwrap().direction, None);
    }

    #[test]
    fn test_with_directions_no_previous() {
        let current = snapshot(vec![record("USDTRY", 34.5)]).with_directions(None);
        assert_eq!(current.records[0].direction, None);
    }

    #[test]
    fn test_filter_case_insensitive() {
        let snap = snapshot(vec![record("USDTRY", 1.0), record("GRAM_ALTIN", 2.0)]);
        let hits = snap.filter("altin");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "GRAM_ALTIN");
        assert_eq!(snap.filter("").len(), 2);
    }

    #[test]
    fn test_display_symbol() {
        assert_eq!(record("GRAM_ALTIN", 1.0).display_symbol(), "GRAM ALTIN");
        assert_eq!(record("CEYREK_ALTIN_ESKI", 1.0).display_symbol(), "CEYREK ALTIN_ESKI");
        assert_eq!(record("USDTRY", 1.0).display_symbol(), "USDTRY");
    }
}
