pub mod market_repo;

pub use market_repo::PgMarketStore;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::models::StoredMarket;

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

/// Read-then-overwrite access to the stored market collection. The scheduler
/// is assumed to be the only writer of oracle state.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn load_markets(&self) -> anyhow::Result<Vec<StoredMarket>>;
    async fn save_markets(&self, markets: &[StoredMarket]) -> anyhow::Result<()>;
}
