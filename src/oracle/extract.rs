use regex::Regex;
use std::sync::OnceLock;

use crate::models::{Unit, ValueDomain};

/// Extract candidate numeric values from a block of free text, dispatching on
/// the market's unit. Returns raw matches; duplicates are expected and get
/// resolved by the aggregator's per-signal median.
pub fn extract_values(unit: Unit, text: &str, domain: ValueDomain, tolerance: f64) -> Vec<f64> {
    match unit {
        Unit::Currency => extract_currency(text),
        Unit::Percent => extract_percent(text),
        Unit::Temperature => extract_temperature(text),
        Unit::GenericIndex => extract_generic(text, domain, tolerance),
    }
}

fn currency_marked_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:[$€£]|usd|eur|gbp)\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(k|mm|m|bn|b|t|thousand|million|billion|trillion)?\b",
        )
        .expect("currency pattern")
    })
}

fn currency_suffixed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Bare amounts only count as currency when a magnitude suffix is attached ("3bn").
        Regex::new(
            r"(?i)\b([0-9][0-9,]*(?:\.[0-9]+)?)\s*(k|mm|m|bn|b|t|thousand|million|billion|trillion)\b",
        )
        .expect("currency suffix pattern")
    })
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(-?[0-9]+(?:\.[0-9]+)?)\s*(?:%|percent(?:age)?(?:\s+points?)?|pct)")
            .expect("percent pattern")
    })
}

fn temperature_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "[cf]\b" keeps "5C" but rejects "5cm"-style false positives.
        Regex::new(
            r"(?i)(-?[0-9]+(?:\.[0-9]+)?)\s*(?:°\s*[cf]|degrees?(?:\s+(?:celsius|fahrenheit))?|[cf]\b)",
        )
        .expect("temperature pattern")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?[0-9]+(?:\.[0-9]+)?").expect("number pattern"))
}

fn magnitude(suffix: &str) -> f64 {
    match suffix.to_lowercase().as_str() {
        "k" | "thousand" => 1e3,
        "m" | "mm" | "million" => 1e6,
        "b" | "bn" | "billion" => 1e9,
        "t" | "trillion" => 1e12,
        _ => 1.0,
    }
}

fn parse_amount(digits: &str) -> Option<f64> {
    digits.replace(',', "").parse::<f64>().ok()
}

fn extract_currency(text: &str) -> Vec<f64> {
    let mut values = Vec::new();
    let mut covered: Vec<(usize, usize)> = Vec::new();

    for caps in currency_marked_re().captures_iter(text) {
        if let Some(amount) = caps.get(1).and_then(|m| parse_amount(m.as_str())) {
            let mult = caps.get(2).map_or(1.0, |m| magnitude(m.as_str()));
            values.push(amount * mult);
            if let Some(whole) = caps.get(0) {
                covered.push((whole.start(), whole.end()));
            }
        }
    }

    // Second pass for marker-less amounts like "3bn"; spans the first pass
    // already claimed are skipped so "$1.5 million" is not counted twice.
    for caps in currency_suffixed_re().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if covered
            .iter()
            .any(|(start, end)| whole.start() < *end && *start < whole.end())
        {
            continue;
        }
        if let (Some(amount), Some(suffix)) =
            (caps.get(1).and_then(|m| parse_amount(m.as_str())), caps.get(2))
        {
            values.push(amount * magnitude(suffix.as_str()));
        }
    }
    values
}

fn extract_percent(text: &str) -> Vec<f64> {
    percent_re()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()))
        .collect()
}

fn extract_temperature(text: &str) -> Vec<f64> {
    temperature_re()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()))
        .collect()
}

/// Bare numbers carry no unit marker, so anything far outside the market's
/// domain is treated as noise (dates, ids, unrelated figures).
fn extract_generic(text: &str, domain: ValueDomain, tolerance: f64) -> Vec<f64> {
    let lo = domain.min.min(domain.max);
    let hi = domain.max.max(domain.min);
    let slack = domain.span().abs() * tolerance;

    number_re()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| *v >= lo - slack && *v <= hi + slack)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDE: ValueDomain = ValueDomain {
        min: 0.0,
        max: 100.0,
    };

    fn currency(text: &str) -> Vec<f64> {
        extract_values(Unit::Currency, text, WIDE, 0.1)
    }

    #[test]
    fn test_currency_symbol_with_commas() {
        assert_eq!(currency("traded at $1,234.56 today"), vec![1234.56]);
    }

    #[test]
    fn test_currency_code_and_word_magnitude() {
        assert_eq!(currency("valued at USD 1.2 million"), vec![1_200_000.0]);
        assert_eq!(currency("a $1.5 million payout"), vec![1_500_000.0]);
        assert_eq!(currency("raised USD 2,000 overnight"), vec![2_000.0]);
    }

    #[test]
    fn test_currency_bare_suffix() {
        assert_eq!(currency("market cap crossed 3bn"), vec![3_000_000_000.0]);
        assert_eq!(currency("roughly 250k users"), vec![250_000.0]);
    }

    #[test]
    fn test_currency_marked_amount_not_double_counted() {
        assert_eq!(currency("sold for $3bn"), vec![3_000_000_000.0]);
    }

    #[test]
    fn test_percent_variants() {
        let percent = |t: &str| extract_values(Unit::Percent, t, WIDE, 0.1);
        assert_eq!(percent("inflation fell -3.2% year on year"), vec![-3.2]);
        assert_eq!(percent("up 5 percentage points since June"), vec![5.0]);
        assert_eq!(percent("support at 47 percent"), vec![47.0]);
        assert!(percent("the 10 runners finished").is_empty());
    }

    #[test]
    fn test_temperature_variants() {
        let temp = |t: &str| extract_values(Unit::Temperature, t, WIDE, 0.1);
        assert_eq!(temp("lows of -2°C expected"), vec![-2.0]);
        assert_eq!(temp("warmed by 3 degrees Celsius"), vec![3.0]);
        assert_eq!(temp("peaking at 5C tomorrow"), vec![5.0]);
        assert!(temp("a 5cm snowfall").is_empty());
    }

    #[test]
    fn test_generic_tolerance_window() {
        let domain = ValueDomain::new(0.0, 100.0);
        let values = extract_values(
            Unit::GenericIndex,
            "scored 95 out of a possible 2024 entries, median 47.5",
            domain,
            0.1,
        );
        // 2024 is far outside [0-10%, 100+10%] and must be rejected.
        assert_eq!(values, vec![95.0, 47.5]);
    }

    #[test]
    fn test_generic_accepts_near_boundary() {
        let domain = ValueDomain::new(0.0, 100.0);
        let values = extract_values(Unit::GenericIndex, "peaked at 108", domain, 0.1);
        assert_eq!(values, vec![108.0]);
        let rejected = extract_values(Unit::GenericIndex, "peaked at 111", domain, 0.1);
        assert!(rejected.is_empty());
    }
}
