// Category HTTP Server: Listing Scrape
//
// Serves listing searches and the tracker admin endpoints over HTTP.
// Typically running on port 30446.

use anyhow::{Context, Result};
use kodegen_tools_listingscrape::config::{ScrapeConfig, default_storage_dir};
use kodegen_tools_listingscrape::server;
use kodegen_tools_listingscrape::service::ListingScraper;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "LISTINGSCRAPE_CONFIG";
const STORAGE_DIR_ENV: &str = "LISTINGSCRAPE_STORAGE_DIR";
const ADDR_ENV: &str = "LISTINGSCRAPE_ADDR";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config = load_config()?;
    tracing::info!(
        "Starting listing scraper (storage: {}, fetch mode: {:?})",
        config.storage_dir().display(),
        config.fetch_mode()
    );

    std::fs::create_dir_all(config.storage_dir()).with_context(|| {
        format!(
            "Failed to create storage directory {}",
            config.storage_dir().display()
        )
    })?;

    let scraper = Arc::new(
        ListingScraper::from_config(&config).context("Failed to initialize listing scraper")?,
    );
    scraper.start();

    let addr = std::env::var(ADDR_ENV).unwrap_or_else(|_| config.listen_addr().to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let served = server::serve(listener, Arc::clone(&scraper), shutdown_signal()).await;

    // Close browsers even when the server loop failed
    scraper.shutdown().await;
    served.context("HTTP server error")?;

    tracing::info!("Listing scraper stopped");
    Ok(())
}

fn load_config() -> Result<ScrapeConfig> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return ScrapeConfig::from_json_file(&path);
    }

    let storage_dir = std::env::var(STORAGE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_storage_dir());
    ScrapeConfig::builder().storage_dir(storage_dir).build()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}
