//! End-to-end mission flow against scripted collaborators. The sandbox is
//! real; pages, models and the grading server are mocks.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use quizrunner::config::AgentConfig;
use quizrunner::errors::AgentError;
use quizrunner::llm::{ModelClient, ModelError, ModelRequest};
use quizrunner::mission::{
    MissionController, MissionRequest, MissionStatus, RoundPhase,
};
use quizrunner::observer::{PageContext, PageObserver};
use quizrunner::prompts::{CODER_SYSTEM_ROLE, PLANNER_SYSTEM_ROLE};
use quizrunner::recorder::MemoryRecorder;
use quizrunner::submit::{AnswerSubmitter, Submission, Verdict};
use quizrunner::workspace::Workspace;

struct StaticObserver {
    pages: HashMap<String, PageContext>,
}

impl StaticObserver {
    fn with_page(url: &str, text: &str) -> Self {
        let mut pages = HashMap::new();
        pages.insert(
            url.to_string(),
            PageContext {
                text: text.to_string(),
                ..PageContext::default()
            },
        );
        Self { pages }
    }

    fn add_page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            PageContext {
                text: text.to_string(),
                ..PageContext::default()
            },
        );
        self
    }
}

#[async_trait]
impl PageObserver for StaticObserver {
    async fn observe(&self, url: &str, _workspace: &Workspace) -> Result<PageContext, AgentError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AgentError::navigation(format!("no page for {url}")))
    }
}

/// Role-aware scripted model: a fixed planner reply plus a queue of coder
/// replies, recording every request it sees.
struct ScriptedModel {
    plan: Option<String>,
    coder: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    fn new(plan: Option<&str>, coder: &[&str]) -> Self {
        Self {
            plan: plan.map(str::to_string),
            coder: Mutex::new(coder.iter().map(|s| s.to_string()).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn coder_requests(&self) -> Vec<ModelRequest> {
        self.seen
            .lock()
            .expect("model lock")
            .iter()
            .filter(|request| request.system_role == CODER_SYSTEM_ROLE)
            .cloned()
            .collect()
    }

    fn planner_requests(&self) -> Vec<ModelRequest> {
        self.seen
            .lock()
            .expect("model lock")
            .iter()
            .filter(|request| request.system_role == PLANNER_SYSTEM_ROLE)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.seen.lock().expect("model lock").push(request.clone());
        if request.system_role == CODER_SYSTEM_ROLE {
            return self
                .coder
                .lock()
                .expect("model lock")
                .pop_front()
                .ok_or(ModelError::EmptyResponse);
        }
        self.plan.clone().ok_or(ModelError::EmptyResponse)
    }
}

struct ScriptedSubmitter {
    verdicts: Mutex<VecDeque<Verdict>>,
    submissions: Mutex<Vec<(String, Submission)>>,
}

impl ScriptedSubmitter {
    fn new(verdicts: Vec<Verdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    fn submissions(&self) -> Vec<(String, Submission)> {
        self.submissions.lock().expect("submitter lock").clone()
    }
}

#[async_trait]
impl AnswerSubmitter for ScriptedSubmitter {
    async fn submit(&self, submit_url: &str, submission: &Submission) -> Verdict {
        self.submissions
            .lock()
            .expect("submitter lock")
            .push((submit_url.to_string(), submission.clone()));
        self.verdicts
            .lock()
            .expect("submitter lock")
            .pop_front()
            .unwrap_or_else(|| Verdict::from_failure("no scripted verdict"))
    }
}

fn test_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.think_delay_secs = 0;
    config.observe_attempts = 1;
    config.observe_backoff_ms = 0;
    config.mission_deadline_secs = 60;
    config.models.planner = "planner-a".to_string();
    config.models.planner_fallback = "planner-b".to_string();
    config.models.repair = "fixer".to_string();
    config.models.coders = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];
    config
}

fn request() -> MissionRequest {
    MissionRequest {
        email: "agent@example.test".to_string(),
        secret: "s3cret".to_string(),
        url: "https://x.test/q1".to_string(),
    }
}

fn verdict(correct: Option<bool>, url: Option<&str>, reason: Option<&str>) -> Verdict {
    Verdict {
        correct,
        url: url.map(str::to_string),
        reason: reason.map(str::to_string),
    }
}

struct Harness {
    controller: MissionController,
    model: Arc<ScriptedModel>,
    submitter: Arc<ScriptedSubmitter>,
    recorder: MemoryRecorder,
    workspace: Workspace,
    _dir: tempfile::TempDir,
}

fn harness(
    config: AgentConfig,
    observer: StaticObserver,
    model: ScriptedModel,
    submitter: ScriptedSubmitter,
) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::open(dir.path()).expect("workspace");
    let model = Arc::new(model);
    let submitter = Arc::new(submitter);
    let controller = MissionController::new(
        config,
        Arc::new(observer),
        model.clone(),
        submitter.clone(),
    );
    Harness {
        controller,
        model,
        submitter,
        recorder: MemoryRecorder::new(),
        workspace,
        _dir: dir,
    }
}

fn executing_count(phases: &[RoundPhase]) -> usize {
    phases
        .iter()
        .filter(|phase| matches!(phase, RoundPhase::Executing(_)))
        .count()
}

#[tokio::test]
async fn scenario_a_correct_answer_advances_to_next_round() {
    let observer = StaticObserver::with_page("https://x.test/q1", "the answer is 42")
        .add_page("https://x.test/q2", "done, nothing more to solve");
    let model = ScriptedModel::new(
        Some(r#"{"question":"What is the answer?","submit_url":"https://x.test/submit","format_hint":"number"}"#),
        &["solution = 42;", "solution = 0;"],
    );
    let submitter = ScriptedSubmitter::new(vec![
        verdict(Some(true), Some("https://x.test/q2"), None),
        verdict(Some(true), None, None),
    ]);
    let h = harness(test_config(), observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::Completed);
    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.rounds[0].final_phase(), Some(RoundPhase::Advanced));
    assert_eq!(report.rounds[1].url, "https://x.test/q2");

    let submissions = h.submitter.submissions();
    assert_eq!(submissions[0].0, "https://x.test/submit");
    assert_eq!(submissions[0].1.answer, serde_json::json!(42));
    assert_eq!(submissions[0].1.url, "https://x.test/q1");
}

#[tokio::test]
async fn scenario_b_third_attempt_succeeds_after_two_failures() {
    let observer = StaticObserver::with_page("https://x.test/q1", "q");
    let model = ScriptedModel::new(
        Some(r#"{"question":"q","submit_url":"https://x.test/submit","format_hint":"string"}"#),
        &[
            "this is not javascript at all %%",
            "also broken ((",
            "solution = \"ok\";",
        ],
    );
    let submitter = ScriptedSubmitter::new(vec![verdict(Some(true), None, None)]);
    let h = harness(test_config(), observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::Completed);
    let phases = &report.rounds[0].phases;
    assert_eq!(executing_count(phases), 3);
    assert!(phases.contains(&RoundPhase::Submitted));
    assert_eq!(report.rounds[0].attempts, 3);

    let submissions = h.submitter.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].1.answer, serde_json::json!("ok"));

    // Retried prompts carry the preceding failure forward.
    let coder = h.model.coder_requests();
    assert_eq!(coder.len(), 3);
    assert!(!coder[0].prompt.contains("[PREVIOUS CODE ERROR]"));
    assert!(coder[1].prompt.contains("[PREVIOUS CODE ERROR]"));
    assert!(coder[2].prompt.contains("[PREVIOUS CODE ERROR]"));
}

#[tokio::test]
async fn scenario_c_three_rejections_fail_round_and_mission() {
    let observer = StaticObserver::with_page("https://x.test/q1", "q");
    let model = ScriptedModel::new(
        Some(r#"{"question":"q","submit_url":"https://x.test/submit","format_hint":"number"}"#),
        &["solution = 1;", "solution = 2;", "solution = 3;"],
    );
    let submitter = ScriptedSubmitter::new(vec![
        verdict(Some(false), None, Some("off by one")),
        verdict(Some(false), None, Some("off by one")),
        verdict(Some(false), None, Some("off by one")),
    ]);
    let h = harness(test_config(), observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::Failed);
    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.rounds[0].final_phase(), Some(RoundPhase::Failed));
    assert_eq!(h.submitter.submissions().len(), 3);

    // Server feedback threads into the retried prompts.
    let coder = h.model.coder_requests();
    assert!(coder[1].prompt.contains("[SERVER REJECTED ANSWER]: off by one"));
    assert!(coder[2].prompt.contains("[SERVER REJECTED ANSWER]: off by one"));
}

#[tokio::test]
async fn scenario_d_deadline_halts_before_planning() {
    let observer = StaticObserver::with_page("https://x.test/q1", "q");
    let model = ScriptedModel::new(Some(r#"{"question":"q"}"#), &["solution = 1;"]);
    let submitter = ScriptedSubmitter::new(vec![]);
    let mut config = test_config();
    config.mission_deadline_secs = 0;
    let h = harness(config, observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::DeadlineExceeded);
    assert_eq!(report.rounds[0].phases, vec![RoundPhase::Observing]);
    assert!(h.model.planner_requests().is_empty());
    assert!(h.submitter.submissions().is_empty());
}

#[tokio::test]
async fn error_shaped_values_are_withheld_and_retried() {
    let observer = StaticObserver::with_page("https://x.test/q1", "q");
    let model = ScriptedModel::new(
        Some(r#"{"question":"q","submit_url":"https://x.test/submit","format_hint":"auto"}"#),
        &[
            "solution = { error: \"no data\" };",
            "solution = \"Error: short\";",
            "solution = 7;",
        ],
    );
    let submitter = ScriptedSubmitter::new(vec![verdict(Some(true), None, None)]);
    let h = harness(test_config(), observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::Completed);
    let submissions = h.submitter.submissions();
    assert_eq!(submissions.len(), 1, "error-shaped values must not be submitted");
    assert_eq!(submissions[0].1.answer, serde_json::json!(7));

    let coder = h.model.coder_requests();
    assert!(coder[1].prompt.contains("error-shaped"));
}

#[tokio::test]
async fn attempts_run_in_strict_model_priority_order() {
    let observer = StaticObserver::with_page("https://x.test/q1", "q");
    let model = ScriptedModel::new(
        Some(r#"{"question":"q"}"#),
        &["broken ((", "broken ((", "broken (("],
    );
    let submitter = ScriptedSubmitter::new(vec![]);
    let h = harness(test_config(), observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::Failed);
    let coder = h.model.coder_requests();
    let models: Vec<&str> = coder.iter().map(|r| r.model.as_str()).collect();
    assert_eq!(models, vec!["m1", "m2", "m3"]);
    assert!(h.submitter.submissions().is_empty());
}

#[tokio::test]
async fn skip_on_url_advances_despite_incorrect_verdict() {
    let observer = StaticObserver::with_page("https://x.test/q1", "q")
        .add_page("https://x.test/q2", "next");
    let model = ScriptedModel::new(
        Some(r#"{"question":"q","submit_url":"https://x.test/submit"}"#),
        &["solution = 1;", "solution = 2;"],
    );
    let submitter = ScriptedSubmitter::new(vec![
        verdict(Some(false), Some("https://x.test/q2"), Some("wrong")),
        verdict(Some(true), None, None),
    ]);
    let h = harness(test_config(), observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::Completed);
    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.rounds[0].final_phase(), Some(RoundPhase::Advanced));
    assert_eq!(report.rounds[0].attempts, 1);
}

#[tokio::test]
async fn broken_planner_output_falls_back_to_defaults() {
    let observer = StaticObserver::with_page("https://x.test/q1", "the page text question");
    // Planner and repair both emit garbage; defaulting must kick in and the
    // answer goes to the round's own URL.
    let model = ScriptedModel::new(Some("total nonsense, no json here"), &["solution = 5;"]);
    let submitter = ScriptedSubmitter::new(vec![verdict(Some(true), None, None)]);
    let h = harness(test_config(), observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::Completed);
    let submissions = h.submitter.submissions();
    assert_eq!(submissions[0].0, "https://x.test/q1");

    // The coder saw the defaulted question taken from page text.
    let coder = h.model.coder_requests();
    assert!(coder[0].prompt.contains("the page text question"));
}

#[tokio::test]
async fn observer_fault_fails_round_and_stops_mission() {
    let observer = StaticObserver::with_page("https://other.test/", "unused");
    let model = ScriptedModel::new(Some(r#"{"question":"q"}"#), &["solution = 1;"]);
    let submitter = ScriptedSubmitter::new(vec![]);
    let h = harness(test_config(), observer, model, submitter);

    let report = h
        .controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    assert_eq!(report.status, MissionStatus::Faulted);
    assert_eq!(report.rounds[0].final_phase(), Some(RoundPhase::Failed));
    assert!(h.submitter.submissions().is_empty());
}

#[tokio::test]
async fn audit_trail_is_ordered() {
    let observer = StaticObserver::with_page("https://x.test/q1", "q");
    let model = ScriptedModel::new(
        Some(r#"{"question":"q","submit_url":"https://x.test/submit"}"#),
        &["solution = 1;"],
    );
    let submitter = ScriptedSubmitter::new(vec![verdict(Some(true), None, None)]);
    let h = harness(test_config(), observer, model, submitter);

    h.controller
        .run(&request(), h.workspace.clone(), &h.recorder)
        .await;

    let names = h.recorder.step_names();
    assert_eq!(names.first().map(String::as_str), Some("start"));
    assert_eq!(names.last().map(String::as_str), Some("mission_end"));
    let observation = names.iter().position(|n| n == "observation").expect("observation");
    let planning = names.iter().position(|n| n == "planning").expect("planning");
    let exec = names.iter().position(|n| n == "exec_1").expect("exec_1");
    let submission = names.iter().position(|n| n == "submission").expect("submission");
    assert!(observation < planning && planning < exec && exec < submission);
}
