pub mod aggregate;
pub mod collector;
pub mod corroborate;
pub mod domain;
pub mod extract;

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use metrics::{counter, histogram};

use crate::models::{
    MarketOracleState, OracleKind, OracleStatus, Outcome, OutcomeOption, OutcomeRequest,
    OutcomeVerdict, StoredMarket, Unit,
};

use aggregate::estimate_outcome;
use collector::{collect_signals, FeedFetcher};
use corroborate::Corroborator;
use domain::resolve_domain;

/// News-search feed bases, tried in order. The plain-HTTP base is the
/// fallback when the proxy's TLS endpoint misbehaves.
pub const DEFAULT_FEED_BASES: [&str; 2] = [
    "https://r.jina.ai/https://news.google.com/rss/search?q=",
    "http://r.jina.ai/https://news.google.com/rss/search?q=",
];

pub const DEFAULT_MAX_SIGNALS: usize = 12;
pub const DEFAULT_RESOLUTION_THRESHOLD: f64 = 0.6;
pub const DEFAULT_VALUE_TOLERANCE: f64 = 0.1;
pub const DEFAULT_RECHECK_INTERVAL_SECS: i64 = 300;

/// Everything one oracle check needs, injected by the caller. No global
/// state: the scheduler, the API, and tests each hand in their own.
#[derive(Clone)]
pub struct OracleConfig {
    pub fetcher: Arc<dyn FeedFetcher>,
    pub feed_bases: Vec<String>,
    /// Total signals collected per check, across all queries.
    pub max_signals: usize,
    /// Heuristic confidence below this resolves to PENDING.
    pub resolution_threshold: f64,
    /// Domain slack (fraction of the span) for accepting extracted values.
    pub value_tolerance: f64,
    /// Minimum spacing between two checks of the same market.
    pub recheck_interval: Duration,
    /// LLM corroboration; absent when no API credential is configured.
    pub corroborator: Option<Corroborator>,
}

impl OracleConfig {
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self {
            fetcher,
            feed_bases: DEFAULT_FEED_BASES.iter().map(|s| s.to_string()).collect(),
            max_signals: DEFAULT_MAX_SIGNALS,
            resolution_threshold: DEFAULT_RESOLUTION_THRESHOLD,
            value_tolerance: DEFAULT_VALUE_TOLERANCE,
            recheck_interval: Duration::seconds(DEFAULT_RECHECK_INTERVAL_SECS),
            corroborator: None,
        }
    }
}

/// Run one full resolution check for a market:
/// 1. Collect news signals for the request's queries.
/// 2. Extract and aggregate values into a heuristic verdict.
/// 3. Optionally let the LLM corroborate or override it.
///
/// LLM failures fall back to the heuristic verdict; the check itself only
/// fails on unexpected internal errors.
pub async fn check_outcome(
    cfg: &OracleConfig,
    request: &OutcomeRequest,
) -> anyhow::Result<OutcomeVerdict> {
    let start = Instant::now();
    let domain = resolve_domain(request);

    let signals =
        collect_signals(cfg.fetcher.as_ref(), &cfg.feed_bases, request, cfg.max_signals).await;
    counter!("oracle_signals_collected_total").increment(signals.len() as u64);

    if signals.is_empty() {
        tracing::info!(market_id = %request.market_id, "No signals collected — PENDING");
        histogram!("oracle_check_seconds").record(start.elapsed().as_secs_f64());
        counter!("oracle_checks_total").increment(1);
        return Ok(OutcomeVerdict::pending(
            "No news signals were collected for this check.",
        ));
    }

    let estimate = estimate_outcome(request, &signals, domain, cfg.value_tolerance);

    let heuristic = match &estimate {
        Some(est) => {
            let outcome = if est.confidence >= cfg.resolution_threshold {
                Outcome::Index(est.index)
            } else {
                Outcome::Pending
            };
            OutcomeVerdict {
                outcome,
                confidence: est.confidence,
                reasoning: est.reasoning.clone(),
                decided_at: Utc::now(),
                signals: signals.clone(),
            }
        }
        None => OutcomeVerdict {
            outcome: Outcome::Pending,
            confidence: 0.0,
            reasoning: format!(
                "Collected {} signal(s) but none contained usable {} values.",
                signals.len(),
                request.unit,
            ),
            decided_at: Utc::now(),
            signals: signals.clone(),
        },
    };

    let verdict = match &cfg.corroborator {
        Some(corroborator) => {
            match corroborator
                .corroborate(request, domain, estimate.as_ref(), &signals)
                .await
            {
                Ok(verdict) => {
                    counter!("oracle_llm_corroborations_total").increment(1);
                    verdict
                }
                Err(e) => {
                    counter!("oracle_llm_fallbacks_total").increment(1);
                    tracing::warn!(
                        market_id = %request.market_id,
                        error = %e,
                        "LLM corroboration failed — keeping heuristic verdict"
                    );
                    heuristic
                }
            }
        }
        None => heuristic,
    };

    tracing::info!(
        market_id = %request.market_id,
        outcome = %verdict.outcome,
        confidence = verdict.confidence,
        signals = verdict.signals.len(),
        "Oracle check complete"
    );
    histogram!("oracle_check_seconds").record(start.elapsed().as_secs_f64());
    counter!("oracle_checks_total").increment(1);

    Ok(verdict)
}

// ---------------------------------------------------------------------------
// Request seeding
// ---------------------------------------------------------------------------

/// Title tokens that carry no search value.
const STOPWORDS: [&str; 28] = [
    "the", "a", "an", "and", "or", "of", "in", "on", "at", "to", "for", "by", "with", "will",
    "be", "is", "are", "was", "than", "how", "what", "when", "much", "many", "does", "do",
    "this", "that",
];

/// Generic boosters attached to the default yes/no options so relevance
/// scoring rewards decisive language.
const POSITIVE_BOOSTERS: [&str; 5] = ["yes", "confirmed", "official", "wins", "approved"];
const NEGATIVE_BOOSTERS: [&str; 5] = ["no", "denied", "rejected", "fails", "loses"];

/// Seed the AI oracle state for a freshly created market: a normalized
/// request with auto-derived keywords and default binary options, status
/// `pending`, nothing checked yet.
pub fn create_default_ai_oracle_state(market: &StoredMarket) -> MarketOracleState {
    let base_keywords = derive_keywords(&market.title, market.category.as_deref());

    let with_boosters = |boosters: &[&str]| {
        let mut keywords = base_keywords.clone();
        keywords.extend(boosters.iter().map(|b| b.to_string()));
        keywords
    };

    let request = OutcomeRequest {
        market_id: market.id.clone(),
        question: market.title.clone(),
        resolution_criteria: market.description.clone(),
        resolution_deadline: market.resolves_at.or(market.expires_at),
        options: vec![
            OutcomeOption {
                id: "yes".into(),
                label: "Yes".into(),
                keywords: with_boosters(&POSITIVE_BOOSTERS),
            },
            OutcomeOption {
                id: "no".into(),
                label: "No".into(),
                keywords: with_boosters(&NEGATIVE_BOOSTERS),
            },
        ],
        unit: Unit::from_raw(market.unit.as_deref()),
        domain: market.domain,
    };

    MarketOracleState {
        kind: OracleKind::Ai,
        request,
        status: OracleStatus::Pending,
        last_checked_at: None,
        last_verdict: None,
        resolved_outcome: None,
        error: None,
    }
}

/// Stopword-filtered, deduplicated title tokens plus the category.
pub fn derive_keywords(title: &str, category: Option<&str>) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();

    for token in title.split(|c: char| !c.is_alphanumeric()) {
        let token = token.to_lowercase();
        if token.len() <= 2 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if !keywords.contains(&token) {
            keywords.push(token);
        }
    }

    if let Some(category) = category {
        let category = category.trim().to_lowercase();
        if !category.is_empty() && !keywords.contains(&category) {
            keywords.push(category);
        }
    }

    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_keywords_filters_and_dedupes() {
        let keywords = derive_keywords(
            "Will the Lakers win the NBA finals before the Lakers rebuild?",
            Some("Sports"),
        );
        assert_eq!(
            keywords,
            vec!["lakers", "win", "nba", "finals", "before", "rebuild", "sports"]
        );
    }

    #[test]
    fn test_default_state_shape() {
        let market = StoredMarket {
            id: "mkt_7".into(),
            title: "Will bitcoin close above $100k this year?".into(),
            category: Some("Crypto".into()),
            description: Some("Settles on the December 31 close.".into()),
            expires_at: None,
            resolves_at: None,
            unit: Some("USD".into()),
            domain: None,
            resolved_outcome: None,
            oracle: None,
        };

        let state = create_default_ai_oracle_state(&market);
        assert_eq!(state.kind, OracleKind::Ai);
        assert_eq!(state.status, OracleStatus::Pending);
        assert_eq!(state.request.unit, Unit::Currency);
        assert_eq!(state.request.market_id, "mkt_7");
        assert_eq!(state.request.options.len(), 2);
        assert!(state.request.options[0]
            .keywords
            .iter()
            .any(|k| k == "confirmed"));
        assert!(state.request.options[1].keywords.iter().any(|k| k == "denied"));
        assert!(state.request.options[0].keywords.iter().any(|k| k == "bitcoin"));
        assert!(state.last_checked_at.is_none());
    }
}
