//! HTTP server with live reload for ripple.
//!
//! This crate provides a native Rust HTTP server using axum, serving:
//! - Static files from a site directory
//! - A long-lived streaming endpoint (`/_live_reload`) that tells browsers
//!   when watched files change
//!
//! Every HTML response gets a small client script injected before its
//! closing `</body>` tag. The script keeps a request to `/_live_reload` open
//! and reloads the page when a `reload` marker arrives.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use ripple_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         root_dir: PathBuf::from("public"),
//!         watch_dirs: vec![PathBuf::from("assets"), PathBuf::from("views")],
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (ripple-server)
//!                        │
//!                        ├─► GET /_live_reload ──► Session ◄── ListenerRegistry
//!                        │                                          ▲
//!                        │                        notify ──► ChangeNotifier
//!                        │
//!                        └─► Static files (tower-http) ──► script injection
//! ```

mod app;
mod error;
pub mod inject;
pub mod live_reload;
mod middleware;
mod state;
mod static_files;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use state::AppState;
use tokio_util::sync::CancellationToken;

pub use error::ServerError;
use live_reload::{ChangeNotifier, ListenerRegistry};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory of static files to serve.
    pub root_dir: PathBuf,
    /// Enable live reload.
    pub live_reload_enabled: bool,
    /// Directories watched for changes.
    pub watch_dirs: Vec<PathBuf>,
    /// Idle period after which sessions write a keep-alive marker.
    pub keep_alive: Duration,
    /// Quiet period used to batch filesystem events.
    pub debounce: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7878,
            root_dir: PathBuf::from("public"),
            live_reload_enabled: true,
            watch_dirs: ripple_config::DEFAULT_WATCH_DIRS
                .iter()
                .map(PathBuf::from)
                .collect(),
            keep_alive: Duration::from_secs(1),
            debounce: Duration::from_millis(100),
        }
    }
}

/// Run the server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if a watch directory cannot be watched, the address
/// cannot be bound, or the server fails while running.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let shutdown = CancellationToken::new();

    // Create and start the change notifier if enabled
    let live_reload = if config.live_reload_enabled {
        let registry = Arc::new(ListenerRegistry::new());
        let mut notifier =
            ChangeNotifier::new(config.watch_dirs.clone(), registry).with_debounce(config.debounce);
        notifier.start(shutdown.clone())?;
        tracing::info!(roots = notifier.roots().len(), "Live reload enabled");
        Some(notifier)
    } else {
        None
    };

    let state = Arc::new(AppState {
        live_reload,
        keep_alive: config.keep_alive,
        shutdown: shutdown.clone(),
    });

    let app = app::create_router(state, &config.root_dir);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(address = %addr, root = %config.root_dir.display(), "Starting server");

    // Open live reload streams never finish on their own, so sessions must
    // see the shutdown before graceful shutdown can complete.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from ripple config.
#[must_use]
pub fn server_config_from_ripple_config(config: &ripple_config::Config) -> ServerConfig {
    let live_reload = &config.live_reload_resolved;

    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root_dir: config.site_resolved.root_dir.clone(),
        live_reload_enabled: live_reload.enabled,
        watch_dirs: live_reload.watch.clone(),
        keep_alive: live_reload.keep_alive,
        debounce: live_reload.debounce,
    }
}
