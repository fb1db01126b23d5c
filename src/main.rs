//! scout-rss — log every new entry of a feed as it appears.
//!
//! ```text
//! scout-rss [URL]
//! ```
//!
//! * `RUST_LOG` — log filter (default `scout_rss=info`).
//! * `SCOUT_RSS_INTERVAL` — seconds between checks (default 60).
//! * `SCOUT_RSS_DATA` — watermark file (default `scoutrss.data.json`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scout_rss::store::DEFAULT_PATH;
use scout_rss::watcher::DEFAULT_INTERVAL;
use scout_rss::{FeedEntry, FileStore, ListenOptions, Watcher};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scout_rss=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // -- parse arguments -----------------------------------------------------
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://feeds.bbci.co.uk/news/rss.xml".into());

    let interval = match std::env::var("SCOUT_RSS_INTERVAL") {
        Ok(secs) => Duration::from_secs(
            secs.parse()
                .with_context(|| format!("SCOUT_RSS_INTERVAL is not a number: {secs:?}"))?,
        ),
        Err(_) => DEFAULT_INTERVAL,
    };
    let data_path = std::env::var("SCOUT_RSS_DATA").unwrap_or_else(|_| DEFAULT_PATH.into());

    // -- wire the watcher ----------------------------------------------------
    let store = FileStore::new(&data_path)
        .with_context(|| format!("failed to open watermark file {data_path}"))?;
    let watcher = Watcher::builder(&url, log_entry)
        .store(Arc::new(store))
        .build()
        .context("failed to create watcher")?;

    // Blocks until the process is killed.
    Arc::new(watcher).listen(ListenOptions::default().interval(interval).blocking(true))?;
    Ok(())
}

fn log_entry(entry: &FeedEntry) -> Result<bool> {
    let date = entry
        .published
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "no date".into());
    tracing::info!(
        published = %date,
        link = entry.link.as_deref().unwrap_or("-"),
        "{}",
        entry.title.as_deref().unwrap_or("(untitled)")
    );
    Ok(true)
}
