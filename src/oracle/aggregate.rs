use crate::models::{OutcomeOption, OutcomeRequest, OutcomeSignal, ValueDomain, ValueSample};

use super::domain::normalize_to_index;
use super::extract::extract_values;

/// Sample weights never fall below this floor, so even a weak signal that
/// produced a usable value keeps a voice.
const MIN_SAMPLE_WEIGHT: f64 = 0.1;

/// Heuristic resolution computed purely from weighted aggregation of
/// extracted values, before any LLM corroboration.
#[derive(Debug, Clone)]
pub struct HeuristicEstimate {
    /// Position on the 0–100 outcome index.
    pub index: u8,
    /// Blended domain-value estimate behind `index`.
    pub value: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub sample_count: usize,
}

/// Fold the collected signals into one confidence-weighted estimate.
///
/// Per signal:
/// - extract unit-appropriate values from headline+snippet
/// - take the median of the signal's own matches as its representative
/// - discard representatives outside domain±tolerance, clamp the rest
/// - weight by signal confidence boosted by option-keyword hits
///
/// Returns `None` when no sample survives (the caller reports PENDING).
pub fn estimate_outcome(
    request: &OutcomeRequest,
    signals: &[OutcomeSignal],
    domain: ValueDomain,
    tolerance: f64,
) -> Option<HeuristicEstimate> {
    let samples = build_samples(request, signals, domain, tolerance);
    if samples.is_empty() {
        return None;
    }

    let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
    let mean = samples.iter().map(|s| s.value * s.weight).sum::<f64>() / total_weight;
    let median = weighted_median(&samples);

    // Blend of a precision estimator and a robust one; tuned, not derived.
    let value = (mean + median) / 2.0;
    let index = normalize_to_index(value, domain);

    let count = samples.len();
    let avg_weight = (total_weight / count as f64).min(1.0);
    let support_factor = (count as f64 / 3.0).min(1.0);
    let confidence = (avg_weight * 0.6 + support_factor * 0.4).min(1.0);

    Some(HeuristicEstimate {
        index,
        value,
        confidence,
        reasoning: build_reasoning(value, index, &samples),
        sample_count: count,
    })
}

fn build_samples(
    request: &OutcomeRequest,
    signals: &[OutcomeSignal],
    domain: ValueDomain,
    tolerance: f64,
) -> Vec<ValueSample> {
    let lo = domain.min.min(domain.max);
    let hi = domain.max.max(domain.min);
    let slack = domain.span().abs() * tolerance;

    let mut samples = Vec::new();
    for signal in signals {
        let text = format!("{} {}", signal.headline, signal.snippet);
        let mut values = extract_values(request.unit, &text, domain, tolerance);
        if values.is_empty() {
            continue;
        }

        // A signal's own matches collapse to their median, so one article
        // stuffed with numbers still casts a single vote.
        let representative = median(&mut values);
        if representative < lo - slack || representative > hi + slack {
            continue;
        }

        let hits = keyword_hits(&request.options, &text);
        let weight =
            (signal.confidence * (1.0 + (hits.min(5) as f64) * 0.1)).max(MIN_SAMPLE_WEIGHT);

        samples.push(ValueSample {
            value: representative.clamp(lo, hi),
            weight,
            signal: signal.clone(),
        });
    }
    samples
}

/// Case-insensitive substring hits of option keywords in `text`, as a fold
/// over the immutable option list.
fn keyword_hits(options: &[OutcomeOption], text: &str) -> usize {
    let haystack = text.to_lowercase();
    options
        .iter()
        .flat_map(|o| o.keywords.iter())
        .fold(0, |hits, keyword| {
            let needle = keyword.trim().to_lowercase();
            if !needle.is_empty() && haystack.contains(&needle) {
                hits + 1
            } else {
                hits
            }
        })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

/// First sample (sorted by value) whose cumulative weight reaches half the
/// total weight.
fn weighted_median(samples: &[ValueSample]) -> f64 {
    let mut ordered: Vec<(f64, f64)> = samples.iter().map(|s| (s.value, s.weight)).collect();
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

    let half = ordered.iter().map(|(_, w)| w).sum::<f64>() / 2.0;
    let mut cumulative = 0.0;
    for (value, weight) in &ordered {
        cumulative += weight;
        if cumulative >= half {
            return *value;
        }
    }
    ordered.last().map(|(v, _)| *v).unwrap_or(0.0)
}

fn build_reasoning(value: f64, index: u8, samples: &[ValueSample]) -> String {
    let mut ranked: Vec<&ValueSample> = samples.iter().collect();
    ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    let cited = ranked
        .iter()
        .take(3)
        .map(|s| {
            format!(
                "{}: \"{}\" -> {:.2} (weight {:.2})",
                s.signal.source, s.signal.headline, s.value, s.weight
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    format!(
        "Weighted estimate {value:.2} (index {index}) from {} extracted sample(s). Top evidence: {cited}",
        samples.len(),
    )
}
