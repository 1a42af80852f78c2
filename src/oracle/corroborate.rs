use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Outcome, OutcomeRequest, OutcomeSignal, OutcomeVerdict, ValueDomain};

use super::aggregate::HeuristicEstimate;
use super::domain::{index_to_value, normalize_to_index};

/// At most this many evidence items go into the prompt.
pub const MAX_EVIDENCE_ITEMS: usize = 8;
/// Reasoning returned by the model is truncated to this many characters.
pub const MAX_REASONING_CHARS: usize = 512;

const BACKOFF_STEP_MS: u64 = 500;
const TEMPERATURE: f64 = 0.1;
const MAX_OUTPUT_TOKENS: u32 = 600;

pub const DEFAULT_LLM_BASE: &str = "https://api.openai.com/v1/responses";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM endpoint returned status {0}")]
    Status(u16),

    #[error("LLM response contained no output text")]
    MissingText,

    #[error("malformed LLM verdict: {0}")]
    Malformed(String),
}

/// Transport seam for the corroboration call: takes the full request body,
/// returns the model's output text. Tests script this; production uses
/// [`LlmClient`].
#[async_trait]
pub trait Llm: Send + Sync {
    async fn complete(&self, body: &Value) -> Result<String, LlmError>;
}

/// Bearer-authenticated reqwest client for the LLM endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Llm for LlmClient {
    async fn complete(&self, body: &Value) -> Result<String, LlmError> {
        let resp = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LlmError::Status(resp.status().as_u16()));
        }

        let payload: Value = resp.json().await?;
        extract_output_text(&payload).ok_or(LlmError::MissingText)
    }
}

/// Pull the first text block out of an `output`/`outputs`/`choices` array,
/// whatever shape the endpoint favors.
pub fn extract_output_text(payload: &Value) -> Option<String> {
    for key in ["output", "outputs", "choices"] {
        let Some(entries) = payload.get(key).and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            if let Some(parts) = entry.get("content").and_then(Value::as_array) {
                for part in parts {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        if !text.is_empty() {
                            return Some(text.to_string());
                        }
                    }
                }
            }
            if let Some(text) = entry
                .pointer("/message/content")
                .and_then(Value::as_str)
                .or_else(|| entry.get("text").and_then(Value::as_str))
                .or_else(|| entry.get("content").and_then(Value::as_str))
            {
                if !text.is_empty() {
                    return Some(text.to_string());
                }
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Retry combinator
// ---------------------------------------------------------------------------

/// Result of a bounded retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded(T),
    Exhausted(E),
}

/// Run `op` up to `max_attempts` times (numbered from 1), sleeping
/// `delay(attempt)` after each failure except the last.
pub async fn retry_with_backoff<T, E, F, Fut, D>(
    max_attempts: u32,
    delay: D,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: Fn(u32) -> Duration,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return RetryOutcome::Succeeded(value),
            Err(e) => {
                if attempt >= max_attempts.max(1) {
                    return RetryOutcome::Exhausted(e);
                }
                tokio::time::sleep(delay(attempt)).await;
            }
        }
    }
}

fn linear_backoff(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_STEP_MS * u64::from(attempt))
}

// ---------------------------------------------------------------------------
// Corroborator
// ---------------------------------------------------------------------------

/// The optional LLM pass over the heuristic verdict. Holds the transport and
/// the retry budget; one instance serves every check.
#[derive(Clone)]
pub struct Corroborator {
    pub transport: Arc<dyn Llm>,
    pub model: String,
    pub max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    outcome: Value,
    confidence: f64,
    reasoning: String,
}

impl Corroborator {
    /// Ask the model to confirm or override the heuristic baseline using the
    /// same evidence. Transport failures and malformed JSON are retried with
    /// linear backoff; a malformed outcome value in an otherwise well-formed
    /// reply is raised directly. Either way the caller falls back to the
    /// heuristic verdict on error.
    pub async fn corroborate(
        &self,
        request: &OutcomeRequest,
        domain: ValueDomain,
        baseline: Option<&HeuristicEstimate>,
        signals: &[OutcomeSignal],
    ) -> Result<OutcomeVerdict, LlmError> {
        let body = build_request_body(&self.model, request, domain, baseline, signals);

        let outcome = retry_with_backoff(self.max_retries + 1, linear_backoff, |attempt| {
            let body = body.clone();
            async move {
                tracing::debug!(
                    market_id = %request.market_id,
                    attempt,
                    "Requesting LLM corroboration"
                );
                let text = self.transport.complete(&body).await?;
                serde_json::from_str::<RawVerdict>(&text)
                    .map_err(|e| LlmError::Malformed(format!("invalid verdict JSON: {e}")))
            }
        })
        .await;

        let raw = match outcome {
            RetryOutcome::Succeeded(raw) => raw,
            RetryOutcome::Exhausted(e) => return Err(e),
        };

        let reasoning: String = raw.reasoning.chars().take(MAX_REASONING_CHARS).collect();
        Ok(OutcomeVerdict {
            outcome: normalize_llm_outcome(&raw.outcome)?,
            confidence: raw.confidence.clamp(0.0, 1.0),
            reasoning,
            decided_at: Utc::now(),
            signals: signals.to_vec(),
        })
    }
}

/// Map the model's `outcome` field onto [`Outcome`]: numbers are normalized
/// onto the index, sentinels pass through, numeric strings are parsed, and
/// anything else is an error.
fn normalize_llm_outcome(value: &Value) -> Result<Outcome, LlmError> {
    if let Some(n) = value.as_f64() {
        return Ok(Outcome::Index(normalize_to_index(n, ValueDomain::INDEX)));
    }
    if let Some(s) = value.as_str() {
        return match s.trim() {
            "PENDING" => Ok(Outcome::Pending),
            "INVALID" => Ok(Outcome::Invalid),
            other => other
                .parse::<f64>()
                .map(|n| Outcome::Index(normalize_to_index(n, ValueDomain::INDEX)))
                .map_err(|_| LlmError::Malformed(format!("unparsable outcome: {other}"))),
        };
    }
    Err(LlmError::Malformed(format!("unparsable outcome: {value}")))
}

fn build_request_body(
    model: &str,
    request: &OutcomeRequest,
    domain: ValueDomain,
    baseline: Option<&HeuristicEstimate>,
    signals: &[OutcomeSignal],
) -> Value {
    json!({
        "model": model,
        "input": [
            {
                "role": "system",
                "content": "You are a prediction-market resolution oracle. \
                    Weigh the evidence and answer with the requested JSON object only.",
            },
            {
                "role": "user",
                "content": build_prompt(request, domain, baseline, signals),
            },
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": "outcome_verdict",
                "schema": {
                    "type": "object",
                    "properties": {
                        "outcome": {
                            "oneOf": [
                                { "type": "integer", "minimum": 0, "maximum": 100 },
                                { "type": "string", "enum": ["PENDING", "INVALID"] },
                            ],
                        },
                        "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                        "reasoning": { "type": "string", "maxLength": MAX_REASONING_CHARS },
                    },
                    "required": ["outcome", "confidence", "reasoning"],
                    "additionalProperties": false,
                },
            },
        },
        "temperature": TEMPERATURE,
        "max_output_tokens": MAX_OUTPUT_TOKENS,
    })
}

fn build_prompt(
    request: &OutcomeRequest,
    domain: ValueDomain,
    baseline: Option<&HeuristicEstimate>,
    signals: &[OutcomeSignal],
) -> String {
    let mut prompt = format!(
        "Resolve this prediction market.\n\
         Market id: {}\n\
         Question: {}\n",
        request.market_id, request.question
    );

    if let Some(criteria) = &request.resolution_criteria {
        prompt.push_str(&format!("Resolution criteria: {criteria}\n"));
    }
    if let Some(deadline) = request.resolution_deadline {
        prompt.push_str(&format!("Resolution deadline: {}\n", deadline.to_rfc3339()));
    }

    prompt.push_str(&format!(
        "\nOutcomes are reported on a 0-100 index over the value domain \
         [{}, {}]: index I encodes the value {} + I/100 * {}. \
         Use \"PENDING\" if the evidence is not conclusive yet and \
         \"INVALID\" if the market cannot be resolved.\n",
        domain.min,
        domain.max,
        domain.min,
        domain.span(),
    ));

    match baseline {
        Some(est) => prompt.push_str(&format!(
            "\nHeuristic baseline: index {} (value {:.2}) at confidence {:.2}.\n",
            est.index,
            index_to_value(est.index, domain),
            est.confidence,
        )),
        None => prompt.push_str(
            "\nHeuristic baseline: PENDING — no usable numeric evidence was extracted.\n",
        ),
    }

    prompt.push_str("\nEvidence:\n");
    for signal in signals.iter().take(MAX_EVIDENCE_ITEMS) {
        prompt.push_str(&format!(
            "- [{}] {} — {} (signal confidence {:.2})\n",
            signal.source, signal.headline, signal.snippet, signal.confidence
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays canned reply texts in order; answers 503 once they run out.
    struct ScriptedLlm {
        replies: Vec<String>,
        calls: AtomicU32,
    }

    impl ScriptedLlm {
        fn failing() -> Self {
            Self {
                replies: vec![],
                calls: AtomicU32::new(0),
            }
        }

        fn with_reply(text: &str) -> Self {
            Self {
                replies: vec![text.to_string()],
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Llm for ScriptedLlm {
        async fn complete(&self, _body: &Value) -> Result<String, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.replies.get(call) {
                Some(text) => Ok(text.clone()),
                None => Err(LlmError::Status(503)),
            }
        }
    }

    fn request() -> OutcomeRequest {
        OutcomeRequest {
            market_id: "mkt_9".into(),
            question: "Final vote share?".into(),
            resolution_criteria: Some("Certified tally".into()),
            resolution_deadline: None,
            options: vec![],
            unit: crate::models::Unit::Percent,
            domain: None,
        }
    }

    fn baseline() -> HeuristicEstimate {
        HeuristicEstimate {
            index: 55,
            value: 55.0,
            confidence: 0.7,
            reasoning: "baseline".into(),
            sample_count: 3,
        }
    }

    fn signals(n: usize) -> Vec<OutcomeSignal> {
        (0..n)
            .map(|i| OutcomeSignal {
                source: format!("source-{i}.com"),
                url: format!("https://source-{i}.com/a"),
                headline: format!("headline {i}"),
                snippet: "snippet".into(),
                published_at: None,
                confidence: 0.8,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_retry_runs_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<(), &str> =
            retry_with_backoff(3, |_| Duration::from_millis(1), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            })
            .await;

        assert!(matches!(outcome, RetryOutcome::Exhausted("nope")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_backoff(5, |_| Duration::from_millis(1), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err("transient")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Succeeded(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_linear_backoff_steps() {
        assert_eq!(linear_backoff(1), Duration::from_millis(500));
        assert_eq!(linear_backoff(2), Duration::from_millis(1000));
        assert_eq!(linear_backoff(3), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_corroborate_exhausts_then_raises() {
        let llm = Arc::new(ScriptedLlm::failing());
        let corroborator = Corroborator {
            transport: llm.clone(),
            model: "test-model".into(),
            max_retries: 2,
        };

        let err = corroborator
            .corroborate(&request(), ValueDomain::INDEX, Some(&baseline()), &signals(2))
            .await
            .expect_err("should exhaust retries");

        assert!(matches!(err, LlmError::Status(503)));
        // max_retries + 1 attempts in total.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_corroborate_success_replaces_verdict() {
        let llm = Arc::new(ScriptedLlm::with_reply(
            r#"{"outcome": 62, "confidence": 0.85, "reasoning": "certified tally reported"}"#,
        ));
        let corroborator = Corroborator {
            transport: llm,
            model: "test-model".into(),
            max_retries: 2,
        };

        let sigs = signals(3);
        let verdict = corroborator
            .corroborate(&request(), ValueDomain::INDEX, Some(&baseline()), &sigs)
            .await
            .expect("verdict");

        assert_eq!(verdict.outcome, Outcome::Index(62));
        assert_eq!(verdict.confidence, 0.85);
        assert_eq!(verdict.signals.len(), 3);
    }

    #[tokio::test]
    async fn test_corroborate_malformed_outcome_value_raises() {
        let llm = Arc::new(ScriptedLlm::with_reply(
            r#"{"outcome": "MAYBE", "confidence": 0.5, "reasoning": "??"}"#,
        ));
        let corroborator = Corroborator {
            transport: llm.clone(),
            model: "test-model".into(),
            max_retries: 2,
        };

        let err = corroborator
            .corroborate(&request(), ValueDomain::INDEX, None, &signals(1))
            .await
            .expect_err("malformed outcome");
        assert!(matches!(err, LlmError::Malformed(_)));
        // Well-formed JSON with a bad outcome value is not retried.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_normalize_llm_outcome_variants() {
        assert_eq!(
            normalize_llm_outcome(&json!(40)).unwrap(),
            Outcome::Index(40)
        );
        assert_eq!(
            normalize_llm_outcome(&json!(250)).unwrap(),
            Outcome::Index(100)
        );
        assert_eq!(
            normalize_llm_outcome(&json!("PENDING")).unwrap(),
            Outcome::Pending
        );
        assert_eq!(
            normalize_llm_outcome(&json!("INVALID")).unwrap(),
            Outcome::Invalid
        );
        assert_eq!(
            normalize_llm_outcome(&json!("73")).unwrap(),
            Outcome::Index(73)
        );
        assert!(normalize_llm_outcome(&json!(["x"])).is_err());
    }

    #[test]
    fn test_extract_output_text_shapes() {
        let responses_api = json!({
            "output": [
                { "type": "message", "content": [ { "type": "output_text", "text": "hello" } ] }
            ]
        });
        assert_eq!(extract_output_text(&responses_api).unwrap(), "hello");

        let chat_api = json!({
            "choices": [ { "message": { "content": "from chat" } } ]
        });
        assert_eq!(extract_output_text(&chat_api).unwrap(), "from chat");

        let flat = json!({ "outputs": [ { "text": "flat text" } ] });
        assert_eq!(extract_output_text(&flat).unwrap(), "flat text");

        assert!(extract_output_text(&json!({ "usage": {} })).is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let body = build_request_body(
            "test-model",
            &request(),
            ValueDomain::INDEX,
            Some(&baseline()),
            &signals(10),
        );

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(
            body["response_format"]["json_schema"]["name"],
            "outcome_verdict"
        );
        assert_eq!(body["input"].as_array().unwrap().len(), 2);

        let prompt = body["input"][1]["content"].as_str().unwrap();
        assert!(prompt.contains("mkt_9"));
        assert!(prompt.contains("index 55"));
        // Evidence is capped at eight items.
        assert_eq!(prompt.matches("- [source-").count(), MAX_EVIDENCE_ITEMS);
    }

    #[test]
    fn test_reasoning_truncated() {
        let raw = RawVerdict {
            outcome: json!(10),
            confidence: 0.9,
            reasoning: "x".repeat(2000),
        };
        let truncated: String = raw.reasoning.chars().take(MAX_REASONING_CHARS).collect();
        assert_eq!(truncated.len(), MAX_REASONING_CHARS);
    }
}
