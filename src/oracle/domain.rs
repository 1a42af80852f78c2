use crate::models::{OutcomeRequest, Unit, ValueDomain};

/// Fallback domain when the market creator did not specify one.
fn default_domain(unit: Unit) -> ValueDomain {
    match unit {
        Unit::Currency => ValueDomain::new(0.0, 1_000_000_000.0),
        Unit::Percent | Unit::Temperature | Unit::GenericIndex => ValueDomain::new(0.0, 100.0),
    }
}

/// Effective value domain for a check: the explicit domain when present,
/// else the unit default. One check always uses a single domain for both
/// extraction and normalization.
pub fn resolve_domain(request: &OutcomeRequest) -> ValueDomain {
    request.domain.unwrap_or_else(|| default_domain(request.unit))
}

/// Clamp `value` into `domain` and map it linearly onto the 0–100 outcome
/// index, rounding up. A degenerate domain (max <= min) maps everything to
/// index 0 rather than dividing by zero.
pub fn normalize_to_index(value: f64, domain: ValueDomain) -> u8 {
    if domain.span() <= 0.0 {
        return 0;
    }
    let clamped = value.clamp(domain.min, domain.max);
    let ratio = (clamped - domain.min) / domain.span();
    (ratio * 100.0).ceil().clamp(0.0, 100.0) as u8
}

/// Inverse of [`normalize_to_index`]: the real-world value an index encodes.
/// Used for reasoning text and LLM prompts.
pub fn index_to_value(index: u8, domain: ValueDomain) -> f64 {
    if domain.span() <= 0.0 {
        return domain.min;
    }
    domain.min + (f64::from(index) / 100.0) * domain.span()
}
