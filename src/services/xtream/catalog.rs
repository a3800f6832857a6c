//! Catalog decoding
//!
//! Listing responses are decoded from untyped JSON so that a panel sending an
//! odd shape degrades to an empty or shorter list instead of an error.

use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

use super::types::value_as_string;
use crate::models::{ContentItem, ContentKind};

/// Listing actions understood by the Player API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryAction {
    LiveStreams,
    VodStreams,
    Series,
}

impl CategoryAction {
    pub fn action(&self) -> &'static str {
        match self {
            CategoryAction::LiveStreams => "get_live_streams",
            CategoryAction::VodStreams => "get_vod_streams",
            CategoryAction::Series => "get_series",
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            CategoryAction::LiveStreams => ContentKind::Live,
            CategoryAction::VodStreams => ContentKind::Movie,
            CategoryAction::Series => ContentKind::Series,
        }
    }

    /// Kind-specific identifier field, tried before the generic `id`
    fn id_field(&self) -> &'static str {
        match self {
            CategoryAction::LiveStreams | CategoryAction::VodStreams => "stream_id",
            CategoryAction::Series => "series_id",
        }
    }
}

impl FromStr for CategoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "get_live_streams" => Ok(CategoryAction::LiveStreams),
            "vod" | "movie" | "get_vod_streams" => Ok(CategoryAction::VodStreams),
            "series" | "get_series" => Ok(CategoryAction::Series),
            other => Err(format!("Invalid media type: {}. Use: live, vod, or series", other)),
        }
    }
}

/// Decode a listing response into catalog items.
/// Anything that is not an array yields an empty list.
pub fn decode_items(body: &Value, action: CategoryAction) -> Vec<ContentItem> {
    let Some(entries) = body.as_array() else {
        debug!("Listing for {} is not an array", action.action());
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let obj = entry.as_object()?;
            Some(item_from_object(obj, index, action.id_field(), action.kind()))
        })
        .collect()
}

/// Flatten a `get_series_info` response into episode items, ordered by
/// season then episode number.
pub fn decode_episodes(body: &Value) -> Vec<ContentItem> {
    let seasons: Vec<(i64, &Value)> = match body.get("episodes") {
        Some(Value::Object(by_season)) => by_season
            .iter()
            .map(|(season, list)| (season.parse().unwrap_or(i64::MAX), list))
            .collect(),
        Some(Value::Array(lists)) => lists
            .iter()
            .enumerate()
            .map(|(i, list)| (i as i64 + 1, list))
            .collect(),
        _ => return Vec::new(),
    };

    let mut episodes: Vec<(i64, i64, &Map<String, Value>)> = seasons
        .into_iter()
        .filter_map(|(season, list)| Some((season, list.as_array()?)))
        .flat_map(|(season, list)| {
            list.iter().filter_map(move |ep| {
                let obj = ep.as_object()?;
                let season = obj.get("season").and_then(as_i64).unwrap_or(season);
                let number = obj.get("episode_num").and_then(as_i64).unwrap_or(i64::MAX);
                Some((season, number, obj))
            })
        })
        .collect();

    // Stable sort keeps panel order for equal keys
    episodes.sort_by_key(|(season, number, _)| (*season, *number));

    episodes
        .into_iter()
        .enumerate()
        .map(|(index, (_, _, obj))| item_from_object(obj, index, "id", ContentKind::Series))
        .collect()
}

fn item_from_object(
    obj: &Map<String, Value>,
    index: usize,
    id_field: &str,
    kind: ContentKind,
) -> ContentItem {
    let id = field(obj, id_field)
        .or_else(|| field(obj, "id"))
        .unwrap_or_else(|| index.to_string());

    let name = field(obj, "name")
        .or_else(|| field(obj, "title"))
        .unwrap_or_else(|| format!("#{}", id));

    ContentItem {
        id,
        name,
        kind,
        container_extension: field(obj, "container_extension"),
        category_id: field(obj, "category_id"),
        icon: field(obj, "stream_icon").or_else(|| field(obj, "cover")),
    }
}

fn field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(value_as_string)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identifier_tie_break() {
        let body = json!([
            {"stream_id": 101, "id": 9, "name": "Specific"},
            {"id": "abc", "name": "Generic"},
            {"name": "Positional"},
        ]);
        let items = decode_items(&body, CategoryAction::LiveStreams);

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "abc", "2"]);
        assert!(items.iter().all(|i| i.kind == ContentKind::Live));
    }

    #[test]
    fn test_series_uses_series_id() {
        let body = json!([{"series_id": "77", "stream_id": 1, "name": "Show", "cover": "http://img"}]);
        let items = decode_items(&body, CategoryAction::Series);
        assert_eq!(items[0].id, "77");
        assert_eq!(items[0].kind, ContentKind::Series);
        assert_eq!(items[0].icon.as_deref(), Some("http://img"));
    }

    #[test]
    fn test_vod_keeps_extension() {
        let body = json!([{"stream_id": 5, "name": "Film", "container_extension": "mkv", "category_id": 3}]);
        let items = decode_items(&body, CategoryAction::VodStreams);
        assert_eq!(items[0].kind, ContentKind::Movie);
        assert_eq!(items[0].container_extension.as_deref(), Some("mkv"));
        assert_eq!(items[0].category_id.as_deref(), Some("3"));
    }

    #[test]
    fn test_non_array_is_empty() {
        assert!(decode_items(&json!({"error": "nope"}), CategoryAction::LiveStreams).is_empty());
        assert!(decode_items(&Value::Null, CategoryAction::Series).is_empty());
    }

    #[test]
    fn test_non_object_entries_skipped() {
        let body = json!([1, "x", {"stream_id": 3, "name": "Ok"}]);
        let items = decode_items(&body, CategoryAction::LiveStreams);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "3");
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("movie".parse::<CategoryAction>(), Ok(CategoryAction::VodStreams));
        assert_eq!("LIVE".parse::<CategoryAction>(), Ok(CategoryAction::LiveStreams));
        assert!("radio".parse::<CategoryAction>().is_err());
    }

    #[test]
    fn test_decode_episodes_ordered() {
        let body = json!({
            "info": {"name": "Show"},
            "episodes": {
                "2": [{"id": "201", "episode_num": 1, "title": "S2E1", "container_extension": "mp4"}],
                "1": [
                    {"id": "102", "episode_num": 2, "title": "S1E2", "container_extension": "mkv"},
                    {"id": "101", "episode_num": 1, "title": "S1E1", "container_extension": "mkv"}
                ]
            }
        });
        let episodes = decode_episodes(&body);

        let ids: Vec<&str> = episodes.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102", "201"]);
        assert_eq!(episodes[0].name, "S1E1");
        assert_eq!(episodes[2].container_extension.as_deref(), Some("mp4"));
    }

    #[test]
    fn test_decode_episodes_array_form() {
        let body = json!({"episodes": [[{"id": 1, "episode_num": 1, "title": "Pilot"}]]});
        let episodes = decode_episodes(&body);
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].id, "1");
    }

    #[test]
    fn test_decode_episodes_missing() {
        assert!(decode_episodes(&json!({"info": {}})).is_empty());
    }
}
