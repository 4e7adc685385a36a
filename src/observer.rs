//! Page observation boundary.
//!
//! The controller consumes snapshots through [`PageObserver`]; browser-grade
//! capture (JS rendering, download interception, screenshots) lives outside
//! this crate. [`HttpObserver`] is the built-in plain-HTTP fallback so the
//! binary works end to end without a browser attached.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::workspace::Workspace;

/// One outbound link discovered on the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageLink {
    pub label: String,
    pub url: String,
}

/// Snapshot of an observed page. Captured fresh per round and immutable for
/// the round.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub text: String,
    pub links: Vec<PageLink>,
    /// Filenames available in the mission workspace at capture time.
    pub files: Vec<String>,
    /// PNG screenshot when the observer can produce one.
    pub screenshot: Option<Vec<u8>>,
}

#[async_trait]
pub trait PageObserver: Send + Sync {
    /// Capture a snapshot of `url`, downloading any linked payloads into the
    /// mission workspace as a side effect.
    async fn observe(&self, url: &str, workspace: &Workspace) -> Result<PageContext, AgentError>;
}

/// Capture with bounded retry and exponential backoff. Transient navigation
/// failures are the norm on freshly deployed challenge pages.
pub async fn observe_with_retry(
    observer: &dyn PageObserver,
    url: &str,
    workspace: &Workspace,
    attempts: u32,
    base_backoff: Duration,
) -> Result<PageContext, AgentError> {
    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            let backoff = base_backoff.saturating_mul(2u32.saturating_pow(attempt - 1));
            tokio::time::sleep(backoff.min(Duration::from_secs(10))).await;
        }
        match observer.observe(url, workspace).await {
            Ok(context) => {
                debug!(
                    url,
                    chars = context.text.len(),
                    links = context.links.len(),
                    "snapshot captured"
                );
                return Ok(context);
            }
            Err(err) => {
                warn!(url, attempt = attempt + 1, error = %err, "snapshot capture failed");
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| AgentError::navigation("observer produced no result")))
}

static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
        .expect("valid anchor regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").expect("valid tag regex")
});

/// Plain-HTTP observer: fetches the page body, strips markup for the text
/// view and lifts anchors into links. No screenshot, no JS rendering.
pub struct HttpObserver {
    client: Client,
}

impl HttpObserver {
    pub fn new(timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AgentError::navigation(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageObserver for HttpObserver {
    async fn observe(&self, url: &str, workspace: &Workspace) -> Result<PageContext, AgentError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| AgentError::navigation(format!("GET {url}: {err}")))?;
        if !response.status().is_success() {
            return Err(AgentError::navigation(format!(
                "GET {url}: status {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|err| AgentError::navigation(format!("GET {url}: {err}")))?;

        let links = extract_links(&body, url);
        let text = strip_markup(&body);
        let files = workspace.list().unwrap_or_default();

        Ok(PageContext {
            text,
            links,
            files,
            screenshot: None,
        })
    }
}

fn extract_links(body: &str, base: &str) -> Vec<PageLink> {
    let base_url = url::Url::parse(base).ok();
    ANCHOR_RE
        .captures_iter(body)
        .take(20)
        .map(|cap| {
            let href = cap[1].trim().to_string();
            let resolved = match &base_url {
                Some(base) => base
                    .join(&href)
                    .map(|joined| joined.to_string())
                    .unwrap_or(href),
                None => href,
            };
            PageLink {
                label: strip_markup(&cap[2]).trim().to_string(),
                url: resolved,
            }
        })
        .collect()
}

fn strip_markup(body: &str) -> String {
    let stripped = TAG_RE.replace_all(body, " ");
    let mut out = String::with_capacity(stripped.len());
    for token in stripped.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_links_and_resolves_relative_hrefs() {
        let body = r#"<p>Start</p><a href="/data.csv">Download data</a> <a href="https://x.test/submit">Submit</a>"#;
        let links = extract_links(body, "https://x.test/q1");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://x.test/data.csv");
        assert_eq!(links[0].label, "Download data");
        assert_eq!(links[1].url, "https://x.test/submit");
    }

    #[test]
    fn strips_scripts_and_tags() {
        let body = "<html><script>var x = 1;</script><body><h1>The answer is 42</h1></body></html>";
        assert_eq!(strip_markup(body), "The answer is 42");
    }
}
