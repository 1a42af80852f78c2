use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::MarketStore;
use crate::models::StoredMarket;

/// Fetch every stored market, oracle state decoded from its JSONB column.
pub async fn get_all_markets(pool: &PgPool) -> anyhow::Result<Vec<StoredMarket>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, category, description, expires_at, resolves_at,
               unit, domain, resolved_outcome, oracle
        FROM markets
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_market).collect()
}

/// Fetch a single market by id.
pub async fn get_market(pool: &PgPool, id: &str) -> anyhow::Result<Option<StoredMarket>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, category, description, expires_at, resolves_at,
               unit, domain, resolved_outcome, oracle
        FROM markets
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_market).transpose()
}

/// Insert or fully overwrite a market row.
pub async fn upsert_market(pool: &PgPool, market: &StoredMarket) -> anyhow::Result<()> {
    let domain = market.domain.map(serde_json::to_value).transpose()?;
    let oracle = market.oracle.as_ref().map(serde_json::to_value).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO markets
            (id, title, category, description, expires_at, resolves_at,
             unit, domain, resolved_outcome, oracle)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            category = EXCLUDED.category,
            description = EXCLUDED.description,
            expires_at = EXCLUDED.expires_at,
            resolves_at = EXCLUDED.resolves_at,
            unit = EXCLUDED.unit,
            domain = EXCLUDED.domain,
            resolved_outcome = EXCLUDED.resolved_outcome,
            oracle = EXCLUDED.oracle,
            updated_at = NOW()
        "#,
    )
    .bind(&market.id)
    .bind(&market.title)
    .bind(&market.category)
    .bind(&market.description)
    .bind(market.expires_at)
    .bind(market.resolves_at)
    .bind(&market.unit)
    .bind(domain)
    .bind(market.resolved_outcome.map(i16::from))
    .bind(oracle)
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_market(row: PgRow) -> anyhow::Result<StoredMarket> {
    let domain: Option<serde_json::Value> = row.try_get("domain")?;
    let oracle: Option<serde_json::Value> = row.try_get("oracle")?;

    Ok(StoredMarket {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        expires_at: row.try_get("expires_at")?,
        resolves_at: row.try_get("resolves_at")?,
        unit: row.try_get("unit")?,
        domain: domain.map(serde_json::from_value).transpose()?,
        resolved_outcome: row
            .try_get::<Option<i16>, _>("resolved_outcome")?
            .map(|v| v as u8),
        oracle: oracle.map(serde_json::from_value).transpose()?,
    })
}

/// Postgres-backed [`MarketStore`]. `save_markets` upserts row by row; the
/// scheduler only calls it when at least one market actually changed.
#[derive(Debug, Clone)]
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn load_markets(&self) -> anyhow::Result<Vec<StoredMarket>> {
        get_all_markets(&self.pool).await
    }

    async fn save_markets(&self, markets: &[StoredMarket]) -> anyhow::Result<()> {
        for market in markets {
            upsert_market(&self.pool, market).await?;
        }
        Ok(())
    }
}
