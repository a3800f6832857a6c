use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Content kind of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Live,
    Movie,
    Series,
}

impl ContentKind {
    /// Root path segment used by the panel for playback URLs
    pub fn path_root(&self) -> &'static str {
        match self {
            ContentKind::Live => "live",
            ContentKind::Movie => "movie",
            ContentKind::Series => "series",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Live => write!(f, "live"),
            ContentKind::Movie => write!(f, "movie"),
            ContentKind::Series => write!(f, "series"),
        }
    }
}

/// Playback platform class
///
/// `HlsPreferred` players only decode HLS reliably, `Permissive` players
/// take whatever container the panel declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    HlsPreferred,
    Permissive,
}

impl Default for Platform {
    fn default() -> Self {
        Self::Permissive
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hls" | "hls_preferred" | "ios" => Ok(Platform::HlsPreferred),
            "permissive" | "android" | "any" => Ok(Platform::Permissive),
            other => Err(format!("Unknown platform: {}", other)),
        }
    }
}

/// Single catalog entry (channel/movie/series or episode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub name: String,
    pub kind: ContentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// One playback URL guess
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamCandidate {
    pub url: String,
    pub extension: String,
}
