use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Outcome, OutcomeRequest, OutcomeVerdict};

/// Which oracle drives a market's resolution. Only the AI oracle is handled
/// here; manually settled markets are skipped by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    Ai,
    Manual,
}

/// Oracle lifecycle: `pending` until a confident verdict lands, then the
/// terminal `resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleStatus {
    Pending,
    Resolved,
}

impl OracleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleStatus::Pending => "pending",
            OracleStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for OracleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oracle bookkeeping owned by a market record and persisted alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOracleState {
    #[serde(rename = "type")]
    pub kind: OracleKind,
    pub request: OutcomeRequest,
    pub status: OracleStatus,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_verdict: Option<OutcomeVerdict>,
    #[serde(default)]
    pub resolved_outcome: Option<Outcome>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MarketOracleState {
    /// A terminal state must never be re-checked or overwritten.
    pub fn is_terminal(&self) -> bool {
        self.status == OracleStatus::Resolved
            || matches!(self.resolved_outcome, Some(Outcome::Index(_)))
    }
}

/// A market record as the surrounding system stores it. The oracle only ever
/// touches `resolved_outcome` and the nested `oracle` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMarket {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolves_at: Option<DateTime<Utc>>,
    /// Free-form unit label from the market wizard (e.g. "USD", "%").
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub domain: Option<super::ValueDomain>,
    /// Top-level settlement index, mirrored from the oracle once final.
    #[serde(default)]
    pub resolved_outcome: Option<u8>,
    #[serde(default)]
    pub oracle: Option<MarketOracleState>,
}

impl StoredMarket {
    /// True once either the market record or its oracle state is final.
    pub fn is_resolved(&self) -> bool {
        self.resolved_outcome.is_some()
            || self.oracle.as_ref().is_some_and(|o| o.is_terminal())
    }

    /// Deadline after which the oracle may start checking: an explicit
    /// request deadline wins, else the market's resolves-at / expiry.
    pub fn resolution_deadline(&self) -> Option<DateTime<Utc>> {
        self.oracle
            .as_ref()
            .and_then(|o| o.request.resolution_deadline)
            .or(self.resolves_at)
            .or(self.expires_at)
    }
}
