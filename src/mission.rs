//! Mission controller: the observe → plan → execute → submit state machine.
//!
//! One mission is a sequence of rounds, each bound to a single URL. Verdicts
//! only feed forward as prompt feedback; past rounds are never revisited.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::coder;
use crate::config::AgentConfig;
use crate::llm::ModelClient;
use crate::observer::{observe_with_retry, PageObserver};
use crate::planner::PlannerChain;
use crate::recorder::{StepRecord, StepRecorder};
use crate::sandbox::CodeSandbox;
use crate::submit::{build_submission, AnswerSubmitter};
use crate::workspace::Workspace;

/// Inbound mission parameters.
#[derive(Debug, Clone)]
pub struct MissionRequest {
    pub email: String,
    pub secret: String,
    pub url: String,
}

/// Lifecycle states of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Observing,
    Planning,
    Executing(u8),
    Submitted,
    Advanced,
    Failed,
}

/// How a round ended, from the mission's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Correct answer, or a next URL handed out regardless of correctness.
    Advanced { next_url: Option<String> },
    /// Attempt budget exhausted without advancing.
    Failed,
    /// Uncaught fault; carries a next URL salvaged from the round's last
    /// verdict when one exists.
    Faulted { salvage_url: Option<String> },
    /// Mission clock exceeded at the round boundary.
    DeadlineExceeded,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub url: String,
    pub phases: Vec<RoundPhase>,
    pub attempts: u8,
}

impl RoundReport {
    pub fn final_phase(&self) -> Option<RoundPhase> {
        self.phases.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Ended without an unresolved URL: the chain was exhausted cleanly.
    Completed,
    /// A round failed with no next URL to move to.
    Failed,
    /// A round faulted and nothing could be salvaged.
    Faulted,
    /// The global mission clock ran out.
    DeadlineExceeded,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionReport {
    pub status: MissionStatus,
    pub rounds: Vec<RoundReport>,
}

/// Drives missions against the configured collaborator set. The controller
/// itself is stateless across missions; workspace and recorder are handed in
/// per mission.
pub struct MissionController {
    config: AgentConfig,
    observer: Arc<dyn PageObserver>,
    model: Arc<dyn ModelClient>,
    submitter: Arc<dyn AnswerSubmitter>,
}

impl MissionController {
    pub fn new(
        config: AgentConfig,
        observer: Arc<dyn PageObserver>,
        model: Arc<dyn ModelClient>,
        submitter: Arc<dyn AnswerSubmitter>,
    ) -> Self {
        Self {
            config,
            observer,
            model,
            submitter,
        }
    }

    pub async fn run(
        &self,
        request: &MissionRequest,
        workspace: Workspace,
        recorder: &dyn StepRecorder,
    ) -> MissionReport {
        let started = Instant::now();
        recorder.record(StepRecord::new("start", json!({ "url": request.url })));

        let sandbox = CodeSandbox::new(workspace.clone());
        let mut rounds = Vec::new();
        let mut status = MissionStatus::Completed;
        let mut current_url = Some(request.url.clone());

        while let Some(url) = current_url.take() {
            info!(url = %url, "round started");
            let (report, outcome) = self
                .run_round(request, &url, &workspace, &sandbox, recorder, started)
                .await;
            rounds.push(report);

            match outcome {
                RoundOutcome::Advanced { next_url } => {
                    current_url = next_url;
                }
                RoundOutcome::Failed => {
                    status = MissionStatus::Failed;
                }
                RoundOutcome::Faulted { salvage_url } => match salvage_url {
                    Some(next) => {
                        warn!(next = %next, "round faulted; continuing from salvaged URL");
                        current_url = Some(next);
                    }
                    None => {
                        status = MissionStatus::Faulted;
                    }
                },
                RoundOutcome::DeadlineExceeded => {
                    status = MissionStatus::DeadlineExceeded;
                }
            }
        }

        recorder.record(StepRecord::new(
            "mission_end",
            json!({ "status": status, "rounds": rounds.len() }),
        ));
        info!(?status, rounds = rounds.len(), "mission finished");
        MissionReport { status, rounds }
    }

    async fn run_round(
        &self,
        request: &MissionRequest,
        url: &str,
        workspace: &Workspace,
        sandbox: &CodeSandbox,
        recorder: &dyn StepRecorder,
        mission_started: Instant,
    ) -> (RoundReport, RoundOutcome) {
        let mut phases = vec![RoundPhase::Observing];
        let mut attempts = 0u8;

        // Mission clock, checked once per round boundary.
        if mission_started.elapsed() >= self.config.mission_deadline() {
            warn!(url, "mission deadline exceeded before planning");
            recorder.record(StepRecord::new(
                "deadline_exceeded",
                json!({ "url": url }),
            ));
            let report = RoundReport {
                url: url.to_string(),
                phases,
                attempts,
            };
            return (report, RoundOutcome::DeadlineExceeded);
        }

        let page = match observe_with_retry(
            self.observer.as_ref(),
            url,
            workspace,
            self.config.observe_attempts,
            self.config.observe_backoff(),
        )
        .await
        {
            Ok(page) => page,
            Err(err) => {
                error!(url, error = %err, "round faulted during observation");
                recorder.record(StepRecord::new("error", json!({ "error": err.to_string() })));
                phases.push(RoundPhase::Failed);
                let report = RoundReport {
                    url: url.to_string(),
                    phases,
                    attempts,
                };
                return (report, RoundOutcome::Faulted { salvage_url: None });
            }
        };

        let mut observation = StepRecord::new(
            "observation",
            json!({
                "chars": page.text.len(),
                "links": page.links.len(),
                "files": page.files,
            }),
        );
        if let Some(screenshot) = &page.screenshot {
            observation = observation.with_attachment("image/png", screenshot.clone());
        }
        recorder.record(observation);

        // Settle delay before reading the page: challenge pages render late.
        let think_delay = self.config.think_delay();
        if !think_delay.is_zero() {
            tokio::time::sleep(think_delay).await;
        }

        phases.push(RoundPhase::Planning);
        let planner = PlannerChain {
            models: &self.config.models,
            client: self.model.as_ref(),
            recorder,
        };
        let task = planner.resolve(&page, url).await;

        let mut last_error = String::new();
        let mut server_feedback = String::new();
        let budget = self.config.attempt_budget() as u8;

        for attempt in 1..=budget {
            phases.push(RoundPhase::Executing(attempt));
            attempts = attempt;
            let model = &self.config.models.coders[usize::from(attempt - 1)];

            let code = match coder::generate_code(
                self.model.as_ref(),
                model,
                &task,
                &page,
                &last_error,
                &server_feedback,
            )
            .await
            {
                Ok(code) => code,
                Err(err) => {
                    warn!(model = %model, attempt, error = %err, "code generation failed");
                    recorder.record(StepRecord::new(
                        format!("exec_{attempt}"),
                        json!({ "model": model, "error": err.to_string() }),
                    ));
                    last_error = format!("code generation failed: {err}");
                    continue;
                }
            };

            let result = sandbox.execute(&code).await;
            recorder.record(StepRecord::new(
                format!("exec_{attempt}"),
                json!({
                    "model": model,
                    "success": result.success,
                    "value": result.value.to_json(),
                    "stdout": result.stdout.chars().take(2000).collect::<String>(),
                    "error": result.error,
                    "chart": result.artifact.as_ref().map(|artifact| artifact.byte_len),
                }),
            ));

            if !result.success {
                last_error = result
                    .error
                    .unwrap_or_else(|| "execution failed without detail".to_string());
                warn!(model = %model, attempt, "generated code failed");
                continue;
            }

            if result.value.is_error_shaped() {
                last_error = format!(
                    "generated code returned an error-shaped value: {}",
                    result.value.to_json()
                );
                warn!(model = %model, attempt, "error-shaped value withheld from submission");
                continue;
            }

            phases.push(RoundPhase::Submitted);
            let submission = build_submission(&request.email, &request.secret, url, &result.value);
            let verdict = self.submitter.submit(&task.submit_url, &submission).await;
            recorder.record(StepRecord::new("submission", json!(verdict)));

            if verdict.is_correct() || verdict.url.is_some() {
                if !verdict.is_correct() {
                    info!(url, "incorrect but skipping ahead via provided URL");
                }
                phases.push(RoundPhase::Advanced);
                let report = RoundReport {
                    url: url.to_string(),
                    phases,
                    attempts,
                };
                return (report, RoundOutcome::Advanced { next_url: verdict.url });
            }

            server_feedback = verdict.rejection_reason();
            warn!(url, attempt, feedback = %server_feedback, "answer rejected");
        }

        phases.push(RoundPhase::Failed);
        info!(url, attempts, "round failed after exhausting attempts");
        let report = RoundReport {
            url: url.to_string(),
            phases,
            attempts,
        };
        (report, RoundOutcome::Failed)
    }
}
