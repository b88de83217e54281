use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{Router, response::Html, routing::get};
use flatearth_core::App;
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Configuration for the page server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to serve on
    pub port: u16,
    /// Directory served for paths no page claims
    pub static_dir: Option<PathBuf>,
    /// Auto-open browser
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            static_dir: None,
            open: false,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Route every page view of `app`. Each slashed rule also answers without
/// its trailing slash.
pub fn router(app: &App, config: &ServerConfig) -> Router {
    let mut router = Router::new();
    let mut seen = HashSet::new();

    for (rule, view) in app.routes() {
        let bare = rule.trim_end_matches('/');
        let paths = [rule, bare];
        for path in paths.into_iter().filter(|p| !p.is_empty()) {
            if !seen.insert(path.to_string()) {
                continue;
            }
            let view = Arc::clone(&view);
            router = router.route(
                path,
                get(move || {
                    let view = Arc::clone(&view);
                    async move { Html(view()) }
                }),
            );
        }
    }

    if let Some(dir) = &config.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http())
}

/// Serve `app` until the process stops.
pub async fn serve(app: &App, config: ServerConfig) -> Result<()> {
    if let Some(dir) = config.static_dir.as_ref().filter(|d| !d.exists()) {
        return Err(anyhow::anyhow!(
            "Static directory does not exist: {}",
            dir.display()
        ));
    }

    let addr = config.addr()?;
    let router = router(app, &config);

    info!(%addr, routes = app.routes().count(), "serving pages");
    if config.open {
        if let Err(e) = open::that(format!("http://{addr}")) {
            warn!(error = %e, "failed to open browser");
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Install a `tracing` subscriber. `RUST_LOG` refines the default level.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init();
}
