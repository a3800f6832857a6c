//! Xtream Codes URL Detection
//!
//! Lets a user log in by pasting a playlist link instead of typing the
//! server, username and password separately.

use super::types::Credentials;
use tracing::debug;
use url::Url;

/// Extract Xtream credentials from an M3U URL
///
/// Supported URL patterns:
/// - `http://server:port/get.php?username=X&password=Y&...`
/// - `http://server:port/get.php?username=X&password=Y&type=m3u_plus&output=ts`
///
/// # Returns
/// - `Some(Credentials)` if URL matches Xtream pattern
/// - `None` if URL is not an Xtream M3U URL
pub fn extract_credentials(m3u_url: &str) -> Option<Credentials> {
    let parsed = match Url::parse(m3u_url.trim()) {
        Ok(url) => url,
        Err(e) => {
            debug!("Failed to parse URL: {}", e);
            return None;
        }
    };

    let path = parsed.path().to_lowercase();
    if !path.ends_with("/get.php") {
        debug!("URL path is not /get.php: {}", path);
        return None;
    }

    let mut username = None;
    let mut password = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "username" => username = Some(value.into_owned()),
            "password" => password = Some(value.into_owned()),
            _ => {}
        }
    }

    let host = parsed.host_str()?;
    let port_suffix = parsed
        .port()
        .map(|p| format!(":{}", p))
        .unwrap_or_default();
    let server = format!("{}://{}{}", parsed.scheme(), host, port_suffix);

    // Empty values are rejected by Credentials::new
    match Credentials::new(&server, &username?, &password?) {
        Ok(creds) => {
            debug!("Extracted Xtream credentials for server={}", creds.server);
            Some(creds)
        }
        Err(e) => {
            debug!("Playlist URL has Xtream shape but unusable credentials: {}", e);
            None
        }
    }
}
