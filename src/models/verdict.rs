use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Outcome, OutcomeSignal};

/// Result of a single oracle check. The latest verdict is kept on the
/// market's oracle state as `last_verdict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeVerdict {
    pub outcome: Outcome,
    /// Confidence in [0, 1] that `outcome` is correct.
    pub confidence: f64,
    pub reasoning: String,
    pub decided_at: DateTime<Utc>,
    /// Evidence the verdict was derived from.
    #[serde(default)]
    pub signals: Vec<OutcomeSignal>,
}

impl OutcomeVerdict {
    /// A zero-confidence PENDING verdict, used when no evidence survived.
    pub fn pending(reasoning: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Pending,
            confidence: 0.0,
            reasoning: reasoning.into(),
            decided_at: Utc::now(),
            signals: Vec::new(),
        }
    }
}
