use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Unit, ValueDomain};

/// One outcome option on a market, with keywords used to score how relevant a
/// news signal is to this market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Immutable description of what the oracle has to resolve. Built once at
/// market inception and reused verbatim for every scheduled check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRequest {
    pub market_id: String,
    pub question: String,
    #[serde(default)]
    pub resolution_criteria: Option<String>,
    #[serde(default)]
    pub resolution_deadline: Option<DateTime<Utc>>,
    pub options: Vec<OutcomeOption>,
    #[serde(default)]
    pub unit: Unit,
    /// Explicit value domain; when absent the unit default applies.
    #[serde(default)]
    pub domain: Option<ValueDomain>,
}
