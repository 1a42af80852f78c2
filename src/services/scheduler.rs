use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use tokio::time::interval;

use crate::db::MarketStore;
use crate::models::{OracleKind, OracleStatus, Outcome, StoredMarket};
use crate::oracle::{check_outcome, OracleConfig};

/// Result of one batch pass over the stored markets.
#[derive(Debug)]
pub struct SyncReport {
    pub markets: Vec<StoredMarket>,
    /// True when at least one market changed and the batch was written back.
    pub updated: bool,
}

/// Periodically sync every stored market with the oracle until shutdown.
pub async fn run_resolution_poller(
    store: Arc<dyn MarketStore>,
    cfg: OracleConfig,
    interval_secs: u64,
) {
    let mut ticker = interval(std::time::Duration::from_secs(interval_secs));

    loop {
        ticker.tick().await;

        tracing::debug!("Resolution poller: syncing stored markets");
        match sync_stored_markets(store.as_ref(), &cfg).await {
            Ok(report) => {
                if report.updated {
                    tracing::info!(markets = report.markets.len(), "Oracle sync wrote changes");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Oracle sync failed");
            }
        }
    }
}

/// One pass of the resolution state machine: load all markets, run the
/// pipeline for each eligible one, and write the collection back only if
/// some persisted field actually changed in value. Per-market failures land
/// in that market's `error` field and never abort the batch.
pub async fn sync_stored_markets(
    store: &dyn MarketStore,
    cfg: &OracleConfig,
) -> anyhow::Result<SyncReport> {
    let mut markets = store.load_markets().await?;
    let now = Utc::now();
    let mut updated = false;

    // Sequential on purpose: the feed proxy and the LLM are rate-limited,
    // and market order carries no meaning.
    for market in &mut markets {
        if !eligible_for_check(market, cfg.recheck_interval, now) {
            continue;
        }

        let before = serde_json::to_value(&*market)?;
        run_market_check(market, cfg).await;
        if serde_json::to_value(&*market)? != before {
            updated = true;
        }
    }

    let pending = markets.iter().filter(|m| !m.is_resolved()).count();
    gauge!("oracle_pending_markets").set(pending as f64);

    if updated {
        store.save_markets(&markets).await?;
    }

    Ok(SyncReport { markets, updated })
}

/// Scheduling guards, in order: never touch a terminal market, only drive
/// AI-oracle markets, respect the recheck interval, and wait for the
/// resolution deadline to pass.
fn eligible_for_check(market: &StoredMarket, recheck_interval: Duration, now: DateTime<Utc>) -> bool {
    if market.is_resolved() {
        return false;
    }

    let Some(oracle) = &market.oracle else {
        return false;
    };
    if oracle.kind != OracleKind::Ai {
        return false;
    }

    if let Some(last) = oracle.last_checked_at {
        if now - last < recheck_interval {
            return false;
        }
    }

    match market.resolution_deadline() {
        Some(deadline) => deadline <= now,
        None => false,
    }
}

/// Run the pipeline for one market and fold the result into its oracle
/// state. A failed check records the error and the check time, nothing else.
async fn run_market_check(market: &mut StoredMarket, cfg: &OracleConfig) {
    let now = Utc::now();
    let Some(oracle) = market.oracle.as_mut() else {
        return;
    };

    tracing::info!(market_id = %market.id, "Checking market outcome");

    match check_outcome(cfg, &oracle.request).await {
        Ok(verdict) => {
            oracle.last_checked_at = Some(now);
            oracle.error = None;

            if !verdict.outcome.is_pending() {
                oracle.status = OracleStatus::Resolved;
                oracle.resolved_outcome = Some(verdict.outcome);
                if let Outcome::Index(index) = verdict.outcome {
                    market.resolved_outcome = Some(index);
                }
                counter!("oracle_markets_resolved_total").increment(1);
                tracing::info!(
                    market_id = %market.id,
                    outcome = %verdict.outcome,
                    confidence = verdict.confidence,
                    "Market resolved"
                );
            }

            oracle.last_verdict = Some(verdict);
        }
        Err(e) => {
            oracle.last_checked_at = Some(now);
            oracle.error = Some(e.to_string());
            tracing::error!(market_id = %market.id, error = %e, "Oracle check failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketOracleState, OutcomeRequest, Unit};

    fn market(deadline_mins_ago: i64) -> StoredMarket {
        let deadline = Utc::now() - Duration::minutes(deadline_mins_ago);
        StoredMarket {
            id: "mkt_1".into(),
            title: "Test market".into(),
            category: None,
            description: None,
            expires_at: None,
            resolves_at: Some(deadline),
            unit: None,
            domain: None,
            resolved_outcome: None,
            oracle: Some(MarketOracleState {
                kind: OracleKind::Ai,
                request: OutcomeRequest {
                    market_id: "mkt_1".into(),
                    question: "?".into(),
                    resolution_criteria: None,
                    resolution_deadline: None,
                    options: vec![],
                    unit: Unit::GenericIndex,
                    domain: None,
                },
                status: OracleStatus::Pending,
                last_checked_at: None,
                last_verdict: None,
                resolved_outcome: None,
                error: None,
            }),
        }
    }

    fn five_minutes() -> Duration {
        Duration::minutes(5)
    }

    #[test]
    fn test_eligible_when_deadline_passed() {
        assert!(eligible_for_check(&market(10), five_minutes(), Utc::now()));
    }

    #[test]
    fn test_skips_future_deadline() {
        assert!(!eligible_for_check(&market(-60), five_minutes(), Utc::now()));
    }

    #[test]
    fn test_skips_within_recheck_interval() {
        let mut m = market(10);
        m.oracle.as_mut().unwrap().last_checked_at = Some(Utc::now() - Duration::minutes(2));
        assert!(!eligible_for_check(&m, five_minutes(), Utc::now()));

        m.oracle.as_mut().unwrap().last_checked_at = Some(Utc::now() - Duration::minutes(6));
        assert!(eligible_for_check(&m, five_minutes(), Utc::now()));
    }

    #[test]
    fn test_skips_terminal_market() {
        let mut by_top_level = market(10);
        by_top_level.resolved_outcome = Some(70);
        assert!(!eligible_for_check(&by_top_level, five_minutes(), Utc::now()));

        let mut by_status = market(10);
        by_status.oracle.as_mut().unwrap().status = OracleStatus::Resolved;
        assert!(!eligible_for_check(&by_status, five_minutes(), Utc::now()));
    }

    #[test]
    fn test_skips_non_ai_or_missing_oracle() {
        let mut manual = market(10);
        manual.oracle.as_mut().unwrap().kind = OracleKind::Manual;
        assert!(!eligible_for_check(&manual, five_minutes(), Utc::now()));

        let mut bare = market(10);
        bare.oracle = None;
        assert!(!eligible_for_check(&bare, five_minutes(), Utc::now()));
    }

    #[test]
    fn test_explicit_request_deadline_wins() {
        let mut m = market(-60); // resolves_at still in the future
        m.oracle.as_mut().unwrap().request.resolution_deadline =
            Some(Utc::now() - Duration::minutes(1));
        assert!(eligible_for_check(&m, five_minutes(), Utc::now()));
    }
}
