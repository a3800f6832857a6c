//! Price ticker
//!
//! Fetches the feed on a fixed interval and publishes a [`TickerState`]
//! through a watch channel. A failed poll keeps the previous snapshot on
//! display and only changes the status line.
//!
//! Stopping a ticker bumps its generation; a fetch that completes after the
//! stop sees the mismatch and its result is thrown away.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{FeedError, PriceSource, SymbolFilter};
use crate::models::{PriceSnapshot, TickerState};

/// Where to fetch the feed from; resolved again on every tick
#[async_trait]
pub trait FeedUrlSource: Send + Sync {
    async fn resolve(&self) -> anyhow::Result<String>;
}

/// Fixed feed URL
pub struct StaticFeedUrl(pub String);

#[async_trait]
impl FeedUrlSource for StaticFeedUrl {
    async fn resolve(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

/// Poller construction settings
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Used when the URL source fails
    pub default_url: String,
    pub source: PriceSource,
    pub filter: SymbolFilter,
    pub user_agent: String,
    pub timeout: Duration,
}

/// Fetch-and-decode for one feed
pub struct PricePoller {
    http: Client,
    settings: PollerSettings,
    url_source: Box<dyn FeedUrlSource>,
}

impl PricePoller {
    pub fn new(settings: PollerSettings) -> Result<Self, FeedError> {
        let http = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .gzip(true)
            .build()
            .map_err(|e| FeedError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let url_source = Box::new(StaticFeedUrl(settings.default_url.clone()));

        Ok(Self {
            http,
            settings,
            url_source,
        })
    }

    /// Replace the URL source (e.g. a remote-config lookup)
    pub fn with_url_source(mut self, source: impl FeedUrlSource + 'static) -> Self {
        self.url_source = Box::new(source);
        self
    }

    async fn feed_url(&self) -> String {
        match self.url_source.resolve().await {
            Ok(url) if !url.trim().is_empty() => url,
            Ok(_) => self.settings.default_url.clone(),
            Err(e) => {
                warn!("Feed URL lookup failed, using default: {}", e);
                self.settings.default_url.clone()
            }
        }
    }

    /// One fetch + decode, no state changes
    pub async fn fetch_snapshot(&self) -> Result<PriceSnapshot, FeedError> {
        let url = self.feed_url().await;
        debug!("Fetching price feed: {}", url);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http(status.as_u16()));
        }

        let body = response.text().await?;
        self.settings
            .source
            .decode(&body, &self.settings.filter, Utc::now())
    }

    /// Fold a poll result into the ticker state
    pub fn apply(state: &mut TickerState, result: Result<PriceSnapshot, FeedError>) {
        match result {
            Ok(snapshot) => {
                let snapshot = snapshot.with_directions(state.snapshot.as_ref());
                state.status = format!(
                    "Updated {} symbols at {}",
                    snapshot.records.len(),
                    snapshot.fetched_at.format("%H:%M:%S")
                );
                state.snapshot = Some(snapshot);
            }
            Err(e) => {
                warn!("Price poll failed, keeping last snapshot: {}", e);
                state.status = format!("Update failed: {}", e);
            }
        }
    }

    /// Fetch and apply. Never fails: errors end up in `state.status`.
    pub async fn poll_once(&self, state: &mut TickerState) {
        let result = self.fetch_snapshot().await;
        Self::apply(state, result);
    }
}

/// Control handle for a running ticker
pub struct TickerHandle {
    generation: Arc<AtomicU64>,
    tx: Arc<watch::Sender<TickerState>>,
    refresh: Arc<Notify>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Poll now instead of waiting for the next tick (pull-to-refresh)
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Cancel the timer. An in-flight fetch is left to finish and discarded.
    ///
    /// The bump happens under the channel lock, so no poll result can be
    /// published once this returns.
    pub fn stop(&self) {
        self.tx.send_modify(|state| {
            state.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        });
        self.shutdown.notify_one();
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Stop and wait for the task to exit
    pub async fn join(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!("Ticker task ended abnormally: {}", e);
        }
    }
}

/// Start polling on a fixed interval. The first poll runs immediately.
pub fn spawn_ticker(poller: PricePoller, interval: Duration) -> (TickerHandle, watch::Receiver<TickerState>) {
    let generation = Arc::new(AtomicU64::new(0));
    let refresh = Arc::new(Notify::new());
    let shutdown = Arc::new(Notify::new());

    let my_generation = generation.load(Ordering::SeqCst);
    let initial = TickerState {
        snapshot: None,
        status: "Loading".to_string(),
        generation: my_generation,
    };
    let (tx, rx) = watch::channel(initial.clone());
    let tx = Arc::new(tx);

    let task = tokio::spawn({
        let generation = generation.clone();
        let tx = tx.clone();
        let refresh = refresh.clone();
        let shutdown = shutdown.clone();

        async move {
            info!("Starting price ticker (interval: {}s)", interval.as_secs());

            let mut state = initial;
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = refresh.notified() => {
                        ticker.reset();
                    }
                    _ = shutdown.notified() => break,
                }

                let result = poller.fetch_snapshot().await;
                PricePoller::apply(&mut state, result);

                // Generation is checked while holding the channel lock that stop() takes
                let published = tx.send_if_modified(|current| {
                    if generation.load(Ordering::SeqCst) != my_generation {
                        return false;
                    }
                    *current = state.clone();
                    true
                });

                if !published {
                    debug!("Discarding price poll finished after teardown");
                    break;
                }
                if tx.is_closed() {
                    debug!("No ticker subscribers left");
                    break;
                }
            }

            info!("Price ticker stopped");
        }
    });

    (
        TickerHandle {
            generation,
            tx,
            refresh,
            shutdown,
            task,
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use std::sync::atomic::AtomicUsize;

    async fn spawn_feed(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Serves the given bodies in order, repeating the last one
    async fn scripted_feed(bodies: Vec<(StatusCode, &'static str)>) -> String {
        let hits = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(bodies);
        let app = Router::new().route(
            "/feed.json",
            get(move || {
                let hits = hits.clone();
                let bodies = bodies.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst).min(bodies.len() - 1);
                    bodies[n]
                }
            }),
        );
        format!("{}/feed.json", spawn_feed(app).await)
    }

    fn poller(url: String) -> PricePoller {
        PricePoller::new(PollerSettings {
            default_url: url,
            source: PriceSource::Keyed,
            filter: SymbolFilter::new(&["USD", "EUR"], &[]),
            user_agent: "test".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_poll_keeps_previous_list() {
        let url = scripted_feed(vec![
            (StatusCode::OK, r#"{"USDTRY": {"satis": "34.2"}, "Update_Date": "2024-11-05 14:30:00"}"#),
            (StatusCode::OK, "{ this is not json"),
            (StatusCode::SERVICE_UNAVAILABLE, ""),
            (StatusCode::OK, r#"{"USDTRY": {"satis": "34.0"}}"#),
        ])
        .await;
        let poller = poller(url);
        let mut state = TickerState::default();

        poller.poll_once(&mut state).await;
        let first = state.snapshot.clone().unwrap();
        assert_eq!(first.records.len(), 1);
        assert!(state.status.starts_with("Updated 1 symbols"));

        poller.poll_once(&mut state).await;
        assert_eq!(state.snapshot.as_ref(), Some(&first));
        assert!(state.status.starts_with("Update failed: Parse error"));

        poller.poll_once(&mut state).await;
        assert_eq!(state.snapshot.as_ref(), Some(&first));
        assert_eq!(state.status, "Update failed: HTTP error: 503");

        poller.poll_once(&mut state).await;
        let usd = state.snapshot.as_ref().unwrap().get("USDTRY").unwrap();
        assert_eq!(usd.sell_price, 34.0);
        assert_eq!(usd.direction, Some(crate::models::Direction::Down));
    }

    #[tokio::test]
    async fn test_redirect_loop_error_omits_url() {
        let app = Router::new().route(
            "/feed.json",
            get(|uri: axum::http::Uri| async move { axum::response::Redirect::temporary(&uri.to_string()) }),
        );
        let url = format!("{}/feed.json?token=hunter2", spawn_feed(app).await);

        let err = poller(url).fetch_snapshot().await.unwrap_err();
        assert!(matches!(err, FeedError::Network(_)));
        assert!(!err.to_string().contains("hunter2"), "leaked: {}", err);
    }

    struct FailingUrlSource;

    #[async_trait]
    impl FeedUrlSource for FailingUrlSource {
        async fn resolve(&self) -> anyhow::Result<String> {
            anyhow::bail!("remote config unavailable")
        }
    }

    #[tokio::test]
    async fn test_url_source_failure_uses_default() {
        let url = scripted_feed(vec![(StatusCode::OK, r#"{"EURTRY": {"satis": 37}}"#)]).await;
        let poller = poller(url).with_url_source(FailingUrlSource);

        let snapshot = poller.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.records[0].symbol, "EURTRY");
    }

    #[tokio::test]
    async fn test_url_source_overrides_default() {
        let real = scripted_feed(vec![(StatusCode::OK, r#"{"USDTRY": {"satis": 1}}"#)]).await;
        let poller = poller("http://127.0.0.1:9/unused".to_string()).with_url_source(StaticFeedUrl(real));

        assert_eq!(poller.fetch_snapshot().await.unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn test_ticker_publishes_and_refreshes() {
        let url = scripted_feed(vec![(StatusCode::OK, r#"{"USDTRY": {"satis": "34.2"}}"#)]).await;
        let (handle, mut rx) = spawn_ticker(poller(url), Duration::from_secs(3600));

        rx.changed().await.unwrap();
        assert!(rx.borrow().snapshot.is_some());

        handle.refresh();
        rx.changed().await.unwrap();
        assert!(rx.borrow().status.starts_with("Updated"));

        handle.join().await;
        assert_eq!(rx.borrow_and_update().generation, 1);
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_late_result_after_stop_discarded() {
        let app = Router::new().route(
            "/slow.json",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                r#"{"USDTRY": {"satis": "34.2"}}"#
            }),
        );
        let url = format!("{}/slow.json", spawn_feed(app).await);
        let (handle, rx) = spawn_ticker(poller(url), Duration::from_secs(3600));

        // Let the first fetch get in flight, then tear down
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
        assert_eq!(handle.generation(), 1);
        assert_eq!(rx.borrow().generation, 1);

        // Give the in-flight fetch time to complete before joining
        tokio::time::sleep(Duration::from_millis(400)).await;
        let state = rx.borrow().clone();
        assert!(state.snapshot.is_none());
        assert_eq!(state.status, "Loading");
        assert_eq!(state.generation, 1);

        handle.join().await;
    }

    #[tokio::test]
    async fn test_published_state_tracks_generation() {
        let url = scripted_feed(vec![(StatusCode::OK, r#"{"USDTRY": {"satis": "34.2"}}"#)]).await;
        let (handle, mut rx) = spawn_ticker(poller(url), Duration::from_secs(3600));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().generation, handle.generation());
        assert_eq!(handle.generation(), 0);

        handle.stop();
        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.generation, 1);
        assert!(state.snapshot.is_some());

        handle.join().await;
    }
}
