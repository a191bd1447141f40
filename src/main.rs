use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skycache::app::build_router;
use skycache::cache::{CacheStore, MemoryStore, RedisStore};
use skycache::config::{CacheBackend, Config};
use skycache::security::{RateLimitConfig, RateLimitMiddleware};
use skycache::server::Server;
use skycache::upstream::VisualCrossingClient;
use skycache::weather::WeatherService;

/// How often idle rate-limit state and expired memory entries are swept.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skycache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "ignoring unreadable .env file"),
    }

    let config = Config::from_env().context("invalid configuration")?;

    let memory = Arc::new(MemoryStore::new());
    let cache: Arc<dyn CacheStore> = match config.cache_backend {
        CacheBackend::Redis => Arc::new(
            RedisStore::connect(&config.redis_url)
                .await
                .context("failed to connect to redis")?,
        ),
        CacheBackend::Memory => {
            info!("using in-memory cache");
            Arc::clone(&memory) as Arc<dyn CacheStore>
        }
    };

    let provider = VisualCrossingClient::new(
        &config.weather_api_base_url,
        config.weather_api_key.clone(),
        config.upstream_timeout,
    )
    .context("failed to build weather provider client")?;

    let service = WeatherService::new(cache, Arc::new(provider)).with_ttl(config.cache_ttl);

    let limits = RateLimitConfig::new(config.rate_limit_max, config.rate_limit_window)
        .context("rate limit must allow at least one request per window")?
        .trust_forwarded(config.trust_proxy);
    let limiter = RateLimitMiddleware::new(limits);

    let maintenance = {
        let limiter = limiter.clone();
        let memory = Arc::clone(&memory);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                limiter.prune();
                let purged = memory.purge_expired().await;
                tracing::debug!(
                    tracked_clients = limiter.tracked_clients(),
                    purged,
                    "maintenance sweep"
                );
            }
        })
    };

    let router = Arc::new(build_router(service, limiter));
    let server = Server::bind(config.listen_addr()).await?;
    info!(
        address = %server.local_addr(),
        rate_limit = config.rate_limit_max,
        window_secs = config.rate_limit_window.as_secs(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "weather proxy started"
    );

    server
        .run_until(
            move |req| {
                let router = Arc::clone(&router);
                async move { router.route(req).await }
            },
            shutdown_signal(),
        )
        .await?;

    maintenance.abort();
    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
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
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
