use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sa_domain::config::{Config, ConfigSeverity, CorsConfig};
use sa_hub::hub::Hub;
use sa_hub::state::AppState;
use sa_providers::AnthropicProvider;
use sa_sessions::SessionStore;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Parser)]
#[command(name = "sa-hub", about = "Distributed tool-execution hub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the hub's HTTP + WebSocket server (default when no subcommand is given).
    Serve {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,
    },
}

fn init_tracing() {
    let format = std::env::var("HUB_LOG_FORMAT").unwrap_or_else(|_| "compact".into());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sa_hub=debug"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }
}

/// Load the configuration from `path`, falling back to compiled-in
/// defaults if the file doesn't exist.
fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = match &cli.command {
        Some(Command::Serve { config }) => config.clone(),
        None => DEFAULT_CONFIG_FILE.into(),
    };

    let config = load_config(&config_path)?;

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let provider = Arc::new(
        AnthropicProvider::from_env(&config.llm.api_key_env, config.llm.base_url.as_deref())
            .context("initializing Anthropic provider")?,
    );
    tracing::info!(provider = ?config.llm.provider, "llm provider ready");

    let sessions = Arc::new(
        SessionStore::new(config.sessions.directory.clone()).context("initializing session store")?,
    );
    tracing::info!(directory = %config.sessions.directory.display(), "session store ready");

    let hub = Hub::new();
    let config = Arc::new(config);
    let state = AppState {
        hub,
        sessions,
        provider,
        config: Arc::clone(&config),
    };

    let max_concurrent = std::env::var("HUB_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(config.server.max_concurrent_requests);
    tracing::info!(max_concurrent, "concurrency limit set");

    let cors_layer = build_cors_layer(&config.server.cors);
    let app = sa_hub::api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "hub listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins. Entries
/// ending in `:*` match any port on that origin; a literal `"*"` allows
/// everything (not recommended outside local development).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if let Some(prefix) = origin.strip_suffix('*') {
            wildcard_prefixes.push(prefix.to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
