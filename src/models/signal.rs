use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One piece of external textual evidence (a news item) bearing on a market's
/// likely outcome. Ephemeral per check; only kept as part of the verdict it
/// contributed to, never persisted individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeSignal {
    /// Publisher hostname, www-stripped (e.g. "reuters.com").
    pub source: String,
    pub url: String,
    pub headline: String,
    pub snippet: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Ordinal credibility score in [0, 1] derived from the item text.
    pub confidence: f64,
}

/// A domain-clamped numeric value extracted from one signal, carrying the
/// weight it contributes during aggregation. Exists only inside a check.
#[derive(Debug, Clone)]
pub struct ValueSample {
    pub value: f64,
    pub weight: f64,
    pub signal: OutcomeSignal,
}
