use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::models::{OutcomeRequest, OutcomeSignal};

/// Snippets are capped so verdict payloads stay small.
pub const SNIPPET_MAX_CHARS: usize = 280;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(u16),

    #[error("no feed base produced a response for query: {0}")]
    AllBasesFailed(String),
}

/// Injected feed transport. The production implementation is a reqwest
/// client; tests script responses per URL.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, CollectError>;
}

/// reqwest-backed fetcher with a hard per-request timeout, so one slow feed
/// query cannot stall the whole check.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    http: Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CollectError> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(CollectError::Status(resp.status().as_u16()));
        }
        Ok(resp.text().await?)
    }
}

/// Collect ranked news signals for one market. Queries run in priority order
/// and individual failures are skipped; `max_signals` bounds the total
/// collected across all queries.
pub async fn collect_signals(
    fetcher: &dyn FeedFetcher,
    feed_bases: &[String],
    request: &OutcomeRequest,
    max_signals: usize,
) -> Vec<OutcomeSignal> {
    let mut signals: Vec<OutcomeSignal> = Vec::new();

    for query in build_queries(request) {
        if signals.len() >= max_signals {
            break;
        }
        match fetch_feed(fetcher, feed_bases, &query).await {
            Ok(body) => {
                for signal in parse_rss(&body) {
                    if signals.len() >= max_signals {
                        break;
                    }
                    signals.push(signal);
                }
            }
            Err(e) => {
                tracing::warn!(
                    market_id = %request.market_id,
                    query = %query,
                    error = %e,
                    "Feed query failed — skipping"
                );
            }
        }
    }

    signals
}

/// Ordered search queries: question first, then resolution criteria, joined
/// option keywords, and the market id for disambiguation.
pub fn build_queries(request: &OutcomeRequest) -> Vec<String> {
    let mut queries = vec![request.question.clone()];

    if let Some(criteria) = &request.resolution_criteria {
        if !criteria.trim().is_empty() {
            queries.push(criteria.clone());
        }
    }

    let keywords = request
        .options
        .iter()
        .flat_map(|o| o.keywords.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    if !keywords.is_empty() {
        queries.push(keywords);
    }

    queries.push(request.market_id.clone());
    queries
}

/// Try each feed base in order (HTTPS first, plain HTTP as fallback) and
/// return the first body. Only the final error propagates.
async fn fetch_feed(
    fetcher: &dyn FeedFetcher,
    feed_bases: &[String],
    query: &str,
) -> Result<String, CollectError> {
    let encoded = urlencoding::encode(query);
    let mut last_err: Option<CollectError> = None;

    for base in feed_bases {
        let url = format!("{base}{encoded}");
        match fetcher.fetch(&url).await {
            Ok(body) => return Ok(body),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Feed base failed, trying next");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| CollectError::AllBasesFailed(query.to_string())))
}

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<item\b[^>]*>(.*?)</item>").expect("item pattern"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag pattern"))
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern"))
}

/// Parse RSS `<item>` blocks into signals, tolerating CDATA wrappers and
/// embedded HTML in titles and descriptions.
pub fn parse_rss(xml: &str) -> Vec<OutcomeSignal> {
    let mut signals = Vec::new();

    for caps in item_re().captures_iter(xml) {
        let Some(block) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };

        let headline = tag_text(block, "title").map(|t| strip_html(&t)).unwrap_or_default();
        let link = tag_text(block, "link").map(|t| strip_html(&t)).unwrap_or_default();
        let description = tag_text(block, "description").unwrap_or_default();

        if headline.is_empty() && link.is_empty() {
            continue;
        }

        let snippet: String = strip_html(&description)
            .chars()
            .take(SNIPPET_MAX_CHARS)
            .collect();

        let published_at = tag_text(block, "pubDate").and_then(|raw| {
            DateTime::parse_from_rfc2822(raw.trim())
                .ok()
                .map(|d| d.with_timezone(&Utc))
        });

        signals.push(OutcomeSignal {
            source: source_host(&link),
            url: link,
            confidence: signal_confidence(&description),
            headline,
            snippet,
            published_at,
        });
    }

    signals
}

/// Inner text of the first `<tag>` in `block`, CDATA unwrapped.
fn tag_text(block: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?is)<{tag}[^>]*>(.*?)</{tag}>")).ok()?;
    let inner = re.captures(block)?.get(1)?.as_str().trim();
    let inner = inner
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(inner);
    Some(inner.trim().to_string())
}

/// Drop markup, decode the common entities, collapse whitespace.
fn strip_html(text: &str) -> String {
    let no_tags = tag_re().replace_all(text, " ");
    let decoded = no_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    ws_re().replace_all(&decoded, " ").trim().to_string()
}

/// Ordinal credibility heuristic over the raw item description.
pub fn signal_confidence(description: &str) -> f64 {
    let text = description.to_lowercase();
    if text.contains("official results") {
        1.0
    } else if text.contains("confirmed") || text.contains("announced") {
        0.8
    } else if text.contains("reported") || text.contains("sources say") {
        0.6
    } else {
        0.4
    }
}

/// Publisher hostname from an item link, www-stripped.
fn source_host(link: &str) -> String {
    Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .map(|h| h.strip_prefix("www.").unwrap_or(&h).to_string())
        .unwrap_or_else(|| "unknown".into())
}
