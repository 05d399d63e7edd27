use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use market_leaderboard::api::health::HealthState;
use market_leaderboard::api::latency::LatencyStats;
use market_leaderboard::api::routes::{router, ApiState};
use market_leaderboard::cache::{CacheLayer, MemoryCache};
use market_leaderboard::config::{Config, CACHE_SWEEP_INTERVAL_SECS};
use market_leaderboard::db::{SnapshotRepository, SqliteRepository};
use market_leaderboard::error::Result;
use market_leaderboard::leaderboard::LeaderboardService;
use market_leaderboard::metrics::DerivedMetricsEngine;
use market_leaderboard::ranking::{RankingEngine, RankingScheduler};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let sqlite = SqliteRepository::connect(&format!("sqlite:{}", cfg.db_path), 8).await?;
    info!("Database ready at {}", cfg.db_path);
    let repo: Arc<dyn SnapshotRepository> = Arc::new(sqlite.clone());

    // --- Cache: constructed here, closed on shutdown ---
    let cache_backend = MemoryCache::new();
    let cache = Arc::new(CacheLayer::new(cache_backend.clone(), cfg.cache.call_timeout));
    let sweeper = Arc::clone(&cache_backend);
    tokio::spawn(async move {
        sweeper
            .run_sweeper(Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS))
            .await
    });
    info!(
        "Cache ready (ttl leaderboard={:?} detail={:?} series={:?}, timeout={:?})",
        cfg.cache.leaderboard_ttl,
        cfg.cache.detail_ttl,
        cfg.cache.series_ttl,
        cfg.cache.call_timeout,
    );

    // --- Engines ---
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());
    let derived = Arc::new(DerivedMetricsEngine::new(Arc::clone(&repo), cfg.metrics.clone()));
    let ranking = Arc::new(RankingEngine::new(Arc::clone(&repo)));
    let leaderboard = Arc::new(LeaderboardService::new(
        Arc::clone(&repo),
        Arc::clone(&cache),
        cfg.cache.clone(),
        Arc::clone(&latency),
        cfg.read_budget,
    ));

    // Ranking scheduler (background)
    let scheduler = RankingScheduler::new(
        Arc::clone(&derived),
        Arc::clone(&ranking),
        Arc::clone(&health),
        Duration::from_secs(cfg.ranking_interval_secs),
    );
    tokio::spawn(async move { scheduler.run().await });

    // --- HTTP API server ---
    let api_state = ApiState {
        leaderboard,
        derived,
        ranking,
        cache: Arc::clone(&cache),
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down: closing cache and database");
    cache.close().await;
    sqlite.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
