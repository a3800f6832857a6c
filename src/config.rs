use std::env;
use std::time::Duration;

use crate::models::Platform;
use crate::services::price_feed::{PollerSettings, PriceSource, SymbolFilter};
use crate::services::xtream::{ClientOptions, ExtensionPolicy, SegmentedFirst};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Price feed
    pub price_feed_url: String,
    pub price_feed_format: PriceSource,
    pub price_poll_interval_secs: u64,
    pub price_allowed_codes: Vec<String>,
    pub price_keywords: Vec<String>,

    // HTTP
    pub fetch_timeout_ms: u64,
    pub user_agent: String,

    // Playback
    pub platform: Platform,
    pub segmented_first: SegmentedFirst,

    // Panel
    pub credentials_path: String,
    pub xtream_server: Option<String>,
    pub xtream_username: Option<String>,
    pub xtream_password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Price feed
            price_feed_url: env::var("PRICE_FEED_URL")
                .unwrap_or_else(|_| "https://imdatgel.site/harem/piyasa_cache.json".to_string()),
            price_feed_format: env::var("PRICE_FEED_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(PriceSource::RecordList),
            price_poll_interval_secs: env::var("PRICE_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .unwrap_or(60)
                .max(1),
            price_allowed_codes: split_list(
                &env::var("PRICE_ALLOWED_CODES").unwrap_or_else(|_| "USD,EUR,GBP,CHF".to_string()),
            ),
            price_keywords: split_list(
                &env::var("PRICE_KEYWORDS").unwrap_or_else(|_| "ALTIN,GOLD".to_string()),
            ),

            // HTTP
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .unwrap_or(15_000), // 15 seconds

            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),

            // Playback
            platform: env::var("PLATFORM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            segmented_first: env::var("SEGMENTED_FIRST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(SegmentedFirst::HlsPlatformOnly),

            // Panel
            credentials_path: env::var("CREDENTIALS_PATH")
                .unwrap_or_else(|_| ".panelcast/credentials.json".to_string()),
            xtream_server: non_empty_var("XTREAM_SERVER"),
            xtream_username: non_empty_var("XTREAM_USERNAME"),
            xtream_password: non_empty_var("XTREAM_PASSWORD"),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.price_poll_interval_secs)
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            default_url: self.price_feed_url.clone(),
            source: self.price_feed_format,
            filter: SymbolFilter::new(&self.price_allowed_codes, &self.price_keywords),
            user_agent: self.user_agent.clone(),
            timeout: self.fetch_timeout(),
        }
    }

    pub fn extension_policy(&self) -> ExtensionPolicy {
        ExtensionPolicy {
            segmented_first: self.segmented_first,
            ..ExtensionPolicy::default()
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            user_agent: self.user_agent.clone(),
            timeout: self.fetch_timeout(),
        }
    }

    /// Panel login from the environment, if all three parts are set
    pub fn xtream_login(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.xtream_server.as_deref()?,
            self.xtream_username.as_deref()?,
            self.xtream_password.as_deref()?,
        ))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// "USD, eur,,GBP" -> ["USD", "eur", "GBP"]
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
