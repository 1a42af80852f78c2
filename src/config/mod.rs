use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::oracle::collector::HttpFeedFetcher;
use crate::oracle::corroborate::{Corroborator, LlmClient, DEFAULT_LLM_BASE, DEFAULT_LLM_MODEL};
use crate::oracle::{
    OracleConfig, DEFAULT_FEED_BASES, DEFAULT_MAX_SIGNALS, DEFAULT_RECHECK_INTERVAL_SECS,
    DEFAULT_RESOLUTION_THRESHOLD, DEFAULT_VALUE_TOLERANCE,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Feed collection
    pub feed_bases: Vec<String>,
    pub max_signals: usize,
    pub fetch_timeout_secs: u64,

    // Resolution tuning
    pub resolution_threshold: f64,
    pub value_tolerance: f64,
    pub recheck_interval_secs: i64,
    pub poll_interval_secs: u64,

    // LLM corroboration (optional — disabled when no key is set)
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_base_url: String,
    pub llm_max_retries: u32,
    pub llm_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let feed_bases_raw = env::var("FEED_BASES").unwrap_or_default();
        let mut feed_bases: Vec<String> = feed_bases_raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if feed_bases.is_empty() {
            feed_bases = DEFAULT_FEED_BASES.iter().map(|s| s.to_string()).collect();
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,

            feed_bases,
            max_signals: env::var("MAX_SIGNALS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_SIGNALS),
            fetch_timeout_secs: env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),

            resolution_threshold: env::var("RESOLUTION_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RESOLUTION_THRESHOLD),
            value_tolerance: env::var("VALUE_TOLERANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_VALUE_TOLERANCE),
            recheck_interval_secs: env::var("RECHECK_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RECHECK_INTERVAL_SECS),
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),

            llm_api_key: env::var("ORACLE_LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_model: env::var("ORACLE_LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.into()),
            llm_base_url: env::var("ORACLE_LLM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_BASE.into()),
            llm_max_retries: env::var("ORACLE_LLM_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }

    /// Returns true if LLM corroboration is configured.
    pub fn has_llm(&self) -> bool {
        self.llm_api_key.is_some()
    }

    /// Assemble the injected oracle configuration from this app config.
    pub fn oracle_config(&self) -> OracleConfig {
        let fetcher = Arc::new(HttpFeedFetcher::new(Duration::from_secs(
            self.fetch_timeout_secs,
        )));

        let corroborator = self.llm_api_key.as_ref().map(|key| Corroborator {
            transport: Arc::new(LlmClient::new(
                key.clone(),
                self.llm_base_url.clone(),
                Duration::from_secs(self.llm_timeout_secs),
            )),
            model: self.llm_model.clone(),
            max_retries: self.llm_max_retries,
        });

        OracleConfig {
            fetcher,
            feed_bases: self.feed_bases.clone(),
            max_signals: self.max_signals,
            resolution_threshold: self.resolution_threshold,
            value_tolerance: self.value_tolerance,
            recheck_interval: chrono::Duration::seconds(self.recheck_interval_secs),
            corroborator,
        }
    }
}
