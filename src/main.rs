use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use panelcast::config::Config;
use panelcast::services::price_feed::{spawn_ticker, PricePoller};
use panelcast::services::store::{CredentialStore, FileStore};
use panelcast::services::xtream::{build_candidates, redact_url, CategoryAction, PanelSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "panelcast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env();
    tracing::info!("Starting Panelcast v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform: {:?}", config.platform);

    // Price ticker
    let poller = PricePoller::new(config.poller_settings())?;
    let (ticker, mut updates) = spawn_ticker(poller, config.poll_interval());

    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            let symbols = state.snapshot.as_ref().map(|s| s.records.len()).unwrap_or(0);
            tracing::info!(symbols, status = %state.status, "ticker update");
        }
    });

    // IPTV panel
    if let Err(e) = run_panel(&config).await {
        tracing::warn!("Panel flow skipped: {:#}", e);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    ticker.join().await;

    Ok(())
}

/// Log in (or restore the saved session), list live streams and show the
/// candidate URLs for the first one.
async fn run_panel(config: &Config) -> anyhow::Result<()> {
    let store = CredentialStore::new(FileStore::new(&config.credentials_path));
    let options = config.client_options();

    let session = match config.xtream_login() {
        Some((server, username, password)) => {
            Some(PanelSession::login(server, username, password, &store, &options).await?)
        }
        None => PanelSession::restore(&store, &options).await?,
    };

    let Some(session) = session else {
        tracing::info!("No panel credentials configured");
        return Ok(());
    };

    let expires = session
        .account()
        .and_then(|account| account.user_info.exp_timestamp())
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0));
    if let Some(expires) = expires {
        tracing::info!("Panel account expires {}", expires.format("%Y-%m-%d"));
    }

    let channels = session.client().list(CategoryAction::LiveStreams, None).await?;
    tracing::info!("Panel has {} live streams", channels.len());

    if let Some(first) = channels.first() {
        let policy = config.extension_policy();
        for candidate in build_candidates(session.credentials(), first, config.platform, &policy) {
            tracing::info!(
                channel = %first.name,
                url = %redact_url(session.credentials(), &candidate.url),
                "stream candidate"
            );
        }
    }

    Ok(())
}
