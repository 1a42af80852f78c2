use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use oraclebot::db::MarketStore;
use oraclebot::models::{
    MarketOracleState, OracleKind, OracleStatus, OutcomeOption, OutcomeRequest, StoredMarket,
    Unit,
};
use oraclebot::oracle::collector::{CollectError, FeedFetcher};
use oraclebot::oracle::OracleConfig;

/// In-memory market store. Counts writes so tests can observe the
/// change-gated batch persistence.
#[allow(dead_code)]
pub struct MemStore {
    markets: Mutex<Vec<StoredMarket>>,
    pub saves: AtomicU32,
}

#[allow(dead_code)]
impl MemStore {
    pub fn new(markets: Vec<StoredMarket>) -> Self {
        Self {
            markets: Mutex::new(markets),
            saves: AtomicU32::new(0),
        }
    }

    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketStore for MemStore {
    async fn load_markets(&self) -> anyhow::Result<Vec<StoredMarket>> {
        Ok(self.markets.lock().unwrap().clone())
    }

    async fn save_markets(&self, markets: &[StoredMarket]) -> anyhow::Result<()> {
        *self.markets.lock().unwrap() = markets.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Feed fetcher that replays one canned body for every query, or fails
/// every request when no body is scripted.
#[allow(dead_code)]
pub struct ScriptedFetcher {
    body: Option<String>,
    pub calls: AtomicU32,
}

#[allow(dead_code)]
impl ScriptedFetcher {
    pub fn with_feed(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, CollectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Some(body) => Ok(body.clone()),
            None => Err(CollectError::Status(503)),
        }
    }
}

/// Build an RSS body from (headline, link, description) triples.
#[allow(dead_code)]
pub fn rss_feed(items: &[(&str, &str, &str)]) -> String {
    let mut feed = String::from("<?xml version=\"1.0\"?><rss><channel>");
    for (headline, link, description) in items {
        feed.push_str(&format!(
            "<item><title>{headline}</title><link>{link}</link>\
             <description>{description}</description></item>"
        ));
    }
    feed.push_str("</channel></rss>");
    feed
}

/// Oracle config wired to the given fetcher, HTTPS + HTTP test feed bases,
/// no LLM.
#[allow(dead_code)]
pub fn oracle_config(fetcher: Arc<dyn FeedFetcher>) -> OracleConfig {
    let mut cfg = OracleConfig::new(fetcher);
    cfg.feed_bases = vec![
        "https://feed.test/search?q=".into(),
        "http://feed.test/search?q=".into(),
    ];
    cfg
}

/// A generic-index request over the default [0, 100] domain.
#[allow(dead_code)]
pub fn sample_request(market_id: &str, keywords: &[&str]) -> OutcomeRequest {
    OutcomeRequest {
        market_id: market_id.into(),
        question: "What will the reading be?".into(),
        resolution_criteria: Some("Settles on the official reading".into()),
        resolution_deadline: None,
        options: vec![OutcomeOption {
            id: "yes".into(),
            label: "Yes".into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }],
        unit: Unit::GenericIndex,
        domain: None,
    }
}

/// A stored market whose deadline passed `deadline_mins_ago` minutes ago
/// (negative for a future deadline), with a pending AI oracle attached.
#[allow(dead_code)]
pub fn sample_market(id: &str, deadline_mins_ago: i64) -> StoredMarket {
    let deadline = Utc::now() - Duration::minutes(deadline_mins_ago);
    StoredMarket {
        id: id.into(),
        title: "What will the reading be?".into(),
        category: Some("indices".into()),
        description: None,
        expires_at: None,
        resolves_at: Some(deadline),
        unit: None,
        domain: None,
        resolved_outcome: None,
        oracle: Some(MarketOracleState {
            kind: OracleKind::Ai,
            request: sample_request(id, &["reading"]),
            status: OracleStatus::Pending,
            last_checked_at: None,
            last_verdict: None,
            resolved_outcome: None,
            error: None,
        }),
    }
}
