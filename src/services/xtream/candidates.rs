//! Stream candidate builder
//!
//! Turns a catalog item into the ordered list of playback URLs to try. Which
//! container a given panel/player pair accepts is not knowable up front, so
//! the builder emits several guesses and the playback session walks them.
//!
//! URL layout:
//! ```text
//! {server}/live/{username}/{password}/{id}.{ext}
//! {server}/movie/{username}/{password}/{id}.{ext}
//! {server}/series/{username}/{password}/{id}.{ext}
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::types::Credentials;
use crate::models::{ContentItem, ContentKind, Platform, StreamCandidate};

/// When the segmented (HLS) extension leads the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentedFirst {
    /// Only on players that need HLS
    HlsPlatformOnly,
    Always,
    Never,
}

impl FromStr for SegmentedFirst {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hls_platform_only" | "platform" => Ok(SegmentedFirst::HlsPlatformOnly),
            "always" => Ok(SegmentedFirst::Always),
            "never" => Ok(SegmentedFirst::Never),
            other => Err(format!("Unknown segmented-first policy: {}", other)),
        }
    }
}

/// Extension ordering policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionPolicy {
    /// Playlist-based adaptive format
    pub segmented: String,
    /// Single-file fallback, always tried last
    pub progressive: String,
    /// Assumed container for live items without a declared extension
    pub live_default: String,
    /// Assumed container for movies/episodes without a declared extension
    pub vod_default: String,
    pub segmented_first: SegmentedFirst,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self {
            segmented: "m3u8".to_string(),
            progressive: "mp4".to_string(),
            live_default: "ts".to_string(),
            vod_default: "mp4".to_string(),
            segmented_first: SegmentedFirst::HlsPlatformOnly,
        }
    }
}

impl ExtensionPolicy {
    fn leads_with_segmented(&self, platform: Platform) -> bool {
        match self.segmented_first {
            SegmentedFirst::HlsPlatformOnly => platform == Platform::HlsPreferred,
            SegmentedFirst::Always => true,
            SegmentedFirst::Never => false,
        }
    }

    /// Ordered, duplicate-free extensions for an item
    pub fn extensions(&self, item: &ContentItem, platform: Platform) -> Vec<String> {
        let declared = item
            .container_extension
            .as_deref()
            .and_then(normalize_extension)
            .or_else(|| {
                let fallback = match item.kind {
                    ContentKind::Live => &self.live_default,
                    ContentKind::Movie | ContentKind::Series => &self.vod_default,
                };
                normalize_extension(fallback)
            });

        let segmented = normalize_extension(&self.segmented);
        let progressive = normalize_extension(&self.progressive);

        let order = if self.leads_with_segmented(platform) {
            [segmented, declared, progressive]
        } else {
            [declared, segmented, progressive]
        };

        let mut out: Vec<String> = Vec::with_capacity(order.len());
        for ext in order.into_iter().flatten() {
            if !out.contains(&ext) {
                out.push(ext);
            }
        }

        // A policy of blank strings must still produce something playable
        if out.is_empty() {
            out.push("ts".to_string());
        }

        out
    }
}

/// "  .M3U8 " -> "m3u8"; blank -> None
fn normalize_extension(raw: &str) -> Option<String> {
    let ext = raw.trim().trim_start_matches('.').trim().to_ascii_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Build the playback URLs to attempt, in order
pub fn build_candidates(
    creds: &Credentials,
    item: &ContentItem,
    platform: Platform,
    policy: &ExtensionPolicy,
) -> Vec<StreamCandidate> {
    let base = format!(
        "{}/{}/{}/{}/{}",
        creds.server,
        item.kind.path_root(),
        urlencoding::encode(&creds.username),
        urlencoding::encode(&creds.password),
        urlencoding::encode(&item.id)
    );

    policy
        .extensions(item, platform)
        .into_iter()
        .map(|extension| StreamCandidate {
            url: format!("{}.{}", base, extension),
            extension,
        })
        .collect()
}

/// Candidate URL with the credential segments masked, for logs
pub fn redact_url(creds: &Credentials, url: &str) -> String {
    let user = urlencoding::encode(&creds.username);
    let pass = urlencoding::encode(&creds.password);
    url.replacen(&format!("/{}/{}/", user, pass), "/***/***/", 1)
}
