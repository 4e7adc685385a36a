//! Answer submission and verdict interpretation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::sandbox::AnswerValue;

/// Identity fields plus the submitted value.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub email: String,
    pub secret: String,
    /// Round URL the answer belongs to.
    pub url: String,
    pub answer: Value,
}

/// The grading server's response. `correct` may be absent; a present `url`
/// always names the next round.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Verdict {
    #[serde(default)]
    pub correct: Option<bool>,
    #[serde(default, alias = "next_url")]
    pub url: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn is_correct(&self) -> bool {
        self.correct == Some(true)
    }

    /// Folded form of a transport or parse failure: incorrect, no next URL,
    /// the error text as the rejection reason.
    pub fn from_failure(error: impl Into<String>) -> Self {
        Self {
            correct: Some(false),
            url: None,
            reason: Some(error.into()),
        }
    }

    pub fn rejection_reason(&self) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| "Incorrect answer".to_string())
    }
}

#[async_trait]
pub trait AnswerSubmitter: Send + Sync {
    /// POST the answer to `submit_url` and interpret the response. Transport
    /// and parse failures fold into an incorrect verdict rather than erroring.
    async fn submit(&self, submit_url: &str, submission: &Submission) -> Verdict;
}

pub struct HttpSubmitter {
    client: Client,
}

impl HttpSubmitter {
    pub fn new(timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AgentError::submission(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AnswerSubmitter for HttpSubmitter {
    async fn submit(&self, submit_url: &str, submission: &Submission) -> Verdict {
        let response = match self
            .client
            .post(submit_url)
            .json(submission)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(submit_url, error = %err, "submission transport failed");
                return Verdict::from_failure(format!("submission failed: {err}"));
            }
        };

        match response.json::<Verdict>().await {
            Ok(verdict) => {
                info!(
                    submit_url,
                    correct = ?verdict.correct,
                    next_url = ?verdict.url,
                    "verdict received"
                );
                verdict
            }
            Err(err) => {
                warn!(submit_url, error = %err, "verdict body unreadable");
                Verdict::from_failure(format!("unreadable verdict: {err}"))
            }
        }
    }
}

/// Build the submission payload for a clean answer value.
pub fn build_submission(
    email: &str,
    secret: &str,
    round_url: &str,
    value: &AnswerValue,
) -> Submission {
    Submission {
        email: email.to_string(),
        secret: secret.to_string(),
        url: round_url.to_string(),
        answer: value.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_verdict() {
        let verdict: Verdict =
            serde_json::from_str(r#"{"correct":true,"url":"https://x.test/q2","reason":"nice"}"#)
                .expect("parse");
        assert!(verdict.is_correct());
        assert_eq!(verdict.url.as_deref(), Some("https://x.test/q2"));
    }

    #[test]
    fn absent_fields_default() {
        let verdict: Verdict = serde_json::from_str("{}").expect("parse");
        assert!(!verdict.is_correct());
        assert!(verdict.url.is_none());
        assert_eq!(verdict.rejection_reason(), "Incorrect answer");
    }

    #[test]
    fn failure_folds_into_incorrect_verdict() {
        let verdict = Verdict::from_failure("connection refused");
        assert!(!verdict.is_correct());
        assert!(verdict.url.is_none());
        assert!(verdict.rejection_reason().contains("connection refused"));
    }

    #[test]
    fn submission_serializes_identity_and_answer() {
        let submission = build_submission(
            "a@b.test",
            "s3cret",
            "https://x.test/q1",
            &AnswerValue::from_json(serde_json::json!(42)),
        );
        let raw = serde_json::to_value(&submission).expect("serialize");
        assert_eq!(raw["email"], "a@b.test");
        assert_eq!(raw["answer"], 42);
    }
}
