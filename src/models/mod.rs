pub mod market;
pub mod request;
pub mod signal;
pub mod verdict;

pub use market::{MarketOracleState, OracleKind, OracleStatus, StoredMarket};
pub use request::{OutcomeOption, OutcomeRequest};
pub use signal::{OutcomeSignal, ValueSample};
pub use verdict::OutcomeVerdict;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// Measurement unit of a market's real-world value, resolved once when the
/// request is built and matched exhaustively during extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Currency,
    Percent,
    Temperature,
    #[default]
    GenericIndex,
}

impl Unit {
    /// Map a free-form unit label (as stored by the market wizard) onto the
    /// closed unit set. Unknown labels fall back to the generic index.
    pub fn from_raw(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Unit::GenericIndex;
        };
        match raw.trim().to_lowercase().as_str() {
            "currency" | "usd" | "eur" | "gbp" | "dollar" | "dollars" | "$" => Unit::Currency,
            "percent" | "percentage" | "pct" | "%" => Unit::Percent,
            "temperature" | "celsius" | "fahrenheit" | "degrees" | "°c" | "°f" => {
                Unit::Temperature
            }
            _ => Unit::GenericIndex,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Currency => "currency",
            Unit::Percent => "percent",
            Unit::Temperature => "temperature",
            Unit::GenericIndex => "generic_index",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ValueDomain
// ---------------------------------------------------------------------------

/// The [min, max] real-world range a market's outcome can take. Used to map
/// raw extracted numbers to and from the 0–100 outcome index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueDomain {
    pub min: f64,
    pub max: f64,
}

impl ValueDomain {
    /// The outcome index itself, as a domain.
    pub const INDEX: ValueDomain = ValueDomain {
        min: 0.0,
        max: 100.0,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

// ---------------------------------------------------------------------------
// Outcome — 0–100 index or sentinel
// ---------------------------------------------------------------------------

/// Settlement outcome of one oracle check: a point on the canonical 0–100
/// index, or a sentinel. Serialized as a bare number or the sentinel string,
/// matching the stored verdict format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Resolved to a point on the 0–100 index.
    Index(u8),
    /// Not enough confident evidence yet; re-check later.
    Pending,
    /// The market cannot be meaningfully resolved.
    Invalid,
}

impl Outcome {
    pub fn as_index(&self) -> Option<u8> {
        match self {
            Outcome::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Index(i) => write!(f, "{i}"),
            Outcome::Pending => f.write_str("PENDING"),
            Outcome::Invalid => f.write_str("INVALID"),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Index(i) => serializer.serialize_u8(*i),
            Outcome::Pending => serializer.serialize_str("PENDING"),
            Outcome::Invalid => serializer.serialize_str("INVALID"),
        }
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Num(n) if n.is_finite() && (0.0..=100.0).contains(&n) => {
                Ok(Outcome::Index(n.round() as u8))
            }
            Repr::Num(n) => Err(D::Error::custom(format!("outcome index out of range: {n}"))),
            Repr::Text(s) => match s.as_str() {
                "PENDING" => Ok(Outcome::Pending),
                "INVALID" => Ok(Outcome::Invalid),
                other => Err(D::Error::custom(format!("unknown outcome sentinel: {other}"))),
            },
        }
    }
}
