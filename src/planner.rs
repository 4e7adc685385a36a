//! Task resolution: primary model, repair model, then pure defaulting.
//!
//! The chain never fails; every round ends up with a concrete task even when
//! both models misbehave.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::ModelChainConfig;
use crate::llm::{ModelClient, ModelRequest};
use crate::observer::PageContext;
use crate::prompts::{self, PLANNER_SYSTEM_ROLE, REPAIR_SYSTEM_ROLE};
use crate::recorder::{StepRecord, StepRecorder};

const QUESTION_FALLBACK_CHARS: usize = 500;
const DEFAULT_QUESTION: &str = "Read the page and extract the requested answer.";
pub const DEFAULT_FORMAT_HINT: &str = "auto";

/// Resolved task for one round. Missing model output is always defaulted, so
/// every field is concrete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub question: String,
    pub submit_url: String,
    pub format_hint: String,
}

/// Raw shape the planner models are asked to produce.
#[derive(Debug, Default, Deserialize)]
struct RawPlan {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    submit_url: Option<String>,
    #[serde(default)]
    format_hint: Option<String>,
}

pub struct PlannerChain<'a> {
    pub models: &'a ModelChainConfig,
    pub client: &'a dyn ModelClient,
    pub recorder: &'a dyn StepRecorder,
}

impl<'a> PlannerChain<'a> {
    /// Resolve the round's task. Stage order: primary planner (with
    /// screenshot), fallback planner, repair model on broken output, then
    /// synthesis from the snapshot alone.
    pub async fn resolve(&self, page: &PageContext, round_url: &str) -> TaskPlan {
        let raw = self.ask_planners(page).await;
        let parsed = match raw {
            Some(text) => match parse_plan(&text) {
                Some(plan) => Some(plan),
                None => self.repair(&text).await,
            },
            None => None,
        };

        let plan = finalize(parsed.unwrap_or_default(), page, round_url);
        self.recorder.record(StepRecord::new(
            "planning",
            json!({
                "question": plan.question,
                "submit_url": plan.submit_url,
                "format_hint": plan.format_hint,
            }),
        ));
        info!(question = %plan.question, format_hint = %plan.format_hint, "task resolved");
        plan
    }

    async fn ask_planners(&self, page: &PageContext) -> Option<String> {
        let prompt = prompts::planning_prompt(page);

        let primary = ModelRequest::new(PLANNER_SYSTEM_ROLE, &prompt, &self.models.planner)
            .with_image(page.screenshot.clone());
        match self.client.complete(&primary).await {
            Ok(text) => {
                self.record_stage("plan_primary", &self.models.planner, Some(&text));
                return Some(text);
            }
            Err(err) => {
                warn!(model = %self.models.planner, error = %err, "primary planner failed");
                self.record_stage("plan_primary", &self.models.planner, None);
            }
        }

        let fallback = ModelRequest::new(
            PLANNER_SYSTEM_ROLE,
            &prompt,
            &self.models.planner_fallback,
        )
        .with_image(page.screenshot.clone());
        match self.client.complete(&fallback).await {
            Ok(text) => {
                self.record_stage("plan_fallback", &self.models.planner_fallback, Some(&text));
                Some(text)
            }
            Err(err) => {
                warn!(model = %self.models.planner_fallback, error = %err, "fallback planner failed");
                self.record_stage("plan_fallback", &self.models.planner_fallback, None);
                None
            }
        }
    }

    async fn repair(&self, broken: &str) -> Option<RawPlan> {
        let request = ModelRequest::new(
            REPAIR_SYSTEM_ROLE,
            prompts::repair_prompt(broken),
            &self.models.repair,
        );
        match self.client.complete(&request).await {
            Ok(text) => {
                let parsed = parse_plan(&text);
                self.record_stage("plan_repair", &self.models.repair, Some(&text));
                parsed
            }
            Err(err) => {
                warn!(model = %self.models.repair, error = %err, "repair model failed");
                self.record_stage("plan_repair", &self.models.repair, None);
                None
            }
        }
    }

    fn record_stage(&self, stage: &str, model: &str, response: Option<&str>) {
        self.recorder.record(StepRecord::new(
            stage,
            json!({
                "model": model,
                "ok": response.is_some(),
                "response": response.map(|text| text.chars().take(2000).collect::<String>()),
            }),
        ));
    }
}

/// Fill in whatever the models left blank, per the defaulting rules: question
/// from truncated page text, submit target from the round URL, format hint
/// `auto`. A missing submit target is also hunted for in the question text.
fn finalize(raw: RawPlan, page: &PageContext, round_url: &str) -> TaskPlan {
    let question = raw
        .question
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| {
            let slice: String = page.text.chars().take(QUESTION_FALLBACK_CHARS).collect();
            let trimmed = slice.trim().to_string();
            if trimmed.is_empty() {
                DEFAULT_QUESTION.to_string()
            } else {
                trimmed
            }
        });

    let submit_url = raw
        .submit_url
        .filter(|u| !u.trim().is_empty())
        .or_else(|| find_url_like(&question))
        .unwrap_or_else(|| round_url.to_string());

    let format_hint = raw
        .format_hint
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FORMAT_HINT.to_string());

    TaskPlan {
        question,
        submit_url,
        format_hint,
    }
}

/// Extract a JSON object from free-form model output: a leading object, a
/// fenced block, or the first balanced brace run.
pub fn extract_json_object(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('{') {
        return Some(trim_symmetric(raw));
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    raw.split('{').nth(1).and_then(|rest| {
        let mut depth = 1i32;
        for (idx, ch) in rest.char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let mut candidate = String::from("{");
                        candidate.push_str(&rest[..=idx]);
                        return Some(trim_symmetric(&candidate));
                    }
                }
                _ => {}
            }
        }
        None
    })
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

fn parse_plan(raw: &str) -> Option<RawPlan> {
    let json = extract_json_object(raw)?;
    serde_json::from_str(&json).ok()
}

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>)\]]+"#).expect("valid url regex"));

/// Best-effort URL hunt in free text. Advisory only; the caller still falls
/// back to the round URL.
pub fn find_url_like(text: &str) -> Option<String> {
    URL_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
}
