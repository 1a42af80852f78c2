use std::sync::Arc;

use oraclebot::api::router::create_router;
use oraclebot::config::AppConfig;
use oraclebot::db::{self, MarketStore, PgMarketStore};
use oraclebot::metrics::init_metrics;
use oraclebot::services::scheduler::run_resolution_poller;
use oraclebot::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Connecting to database...");
    let db = db::init_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    let metrics_handle = init_metrics();
    let oracle = config.oracle_config();

    if config.has_llm() {
        tracing::info!(model = %config.llm_model, "LLM corroboration enabled");
    } else {
        tracing::warn!("ORACLE_LLM_API_KEY not set — resolving on the heuristic ladder only");
    }

    // --- Resolution scheduler ---
    let store: Arc<dyn MarketStore> = Arc::new(PgMarketStore::new(db.clone()));
    let poller_cfg = oracle.clone();
    let poll_interval = config.poll_interval_secs;
    tokio::spawn(async move {
        run_resolution_poller(store, poller_cfg, poll_interval).await;
    });
    tracing::info!(interval_secs = poll_interval, "Resolution poller spawned");

    let state = AppState {
        db,
        config,
        oracle,
        metrics_handle,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
