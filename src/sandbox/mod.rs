//! Sandboxed execution of model-generated JavaScript.
//!
//! The executor evaluates code against the fixed capability surface, then
//! normalizes whatever landed in the `solution` slot. Errors of any kind are
//! captured into the result; this call never fails upward.

mod capabilities;
mod chart;
mod value;

pub use chart::ChartSpec;
pub use value::AnswerValue;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use boa_engine::{js_string, Context, Source};
use tokio::task;
use tracing::debug;

use crate::workspace::Workspace;

const LOOP_ITERATION_LIMIT: u64 = 10_000_000;
const RECURSION_LIMIT: usize = 1_024;
const PLOT_SENTINEL: &str = "USE_PLOT";

/// Rendered by-product of a run, e.g. the captured chart.
#[derive(Debug, Clone)]
pub struct RunArtifact {
    pub label: String,
    pub content_type: String,
    pub data_base64: String,
    pub byte_len: usize,
}

impl RunArtifact {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.data_base64)
    }
}

/// Normalized outcome of one code attempt.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub value: AnswerValue,
    pub stdout: String,
    pub artifact: Option<RunArtifact>,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn failed(error: String, stdout: String) -> Self {
        Self {
            success: false,
            value: AnswerValue::Null,
            stdout,
            artifact: None,
            error: Some(error),
        }
    }
}

/// Synchronous, run-to-completion executor bound to one mission workspace.
pub struct CodeSandbox {
    workspace: Workspace,
}

impl CodeSandbox {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Evaluate one generated program. Runs on a blocking thread; the async
    /// caller suspends until the code finishes (no wall-clock bound).
    pub async fn execute(&self, code: &str) -> ExecutionResult {
        let code = code.to_string();
        let workspace = self.workspace.clone();
        match task::spawn_blocking(move || run_blocking(&code, workspace)).await {
            Ok(result) => result,
            Err(err) => ExecutionResult::failed(format!("sandbox task failed: {err}"), String::new()),
        }
    }
}

fn run_blocking(code: &str, workspace: Workspace) -> ExecutionResult {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    context.runtime_limits_mut().set_recursion_limit(RECURSION_LIMIT);

    if let Err(err) = capabilities::install(&mut context) {
        return ExecutionResult::failed(format!("sandbox setup failed: {err}"), String::new());
    }

    capabilities::activate(capabilities::RunState::new(workspace));
    let evaluated = context.eval(Source::from_bytes(code));
    let solution = context
        .global_object()
        .get(js_string!("solution"), &mut context);
    let state = match capabilities::deactivate() {
        Some(state) => state,
        None => {
            return ExecutionResult::failed(
                "sandbox state lost during execution".to_string(),
                String::new(),
            )
        }
    };

    let artifact = state
        .charts
        .iter()
        .rev()
        .find(|spec| spec.is_renderable())
        .map(|spec| {
            let svg = chart::render_svg(spec);
            RunArtifact {
                label: "chart".to_string(),
                content_type: "image/svg+xml".to_string(),
                data_base64: BASE64.encode(svg.as_bytes()),
                byte_len: svg.len(),
            }
        });

    if let Err(err) = evaluated {
        return ExecutionResult::failed(err.to_string(), state.stdout);
    }

    let value = match solution {
        Ok(raw) if raw.is_undefined() || raw.is_null() => AnswerValue::Null,
        Ok(raw) => match raw.to_json(&mut context) {
            Ok(json) => AnswerValue::from_json(json),
            // Not representable in the interchange format: keep the string
            // form instead of failing the attempt.
            Err(_) => AnswerValue::text(raw.display().to_string()),
        },
        Err(err) => {
            return ExecutionResult::failed(format!("reading solution failed: {err}"), state.stdout)
        }
    };

    let value = value.unwrap_answer_envelope();
    let value = match (&value, &artifact) {
        (AnswerValue::Text(text), Some(chart)) if text == PLOT_SENTINEL => {
            AnswerValue::text(chart.data_url())
        }
        _ => value,
    };

    debug!(success = true, "sandbox run finished");
    ExecutionResult {
        success: true,
        value,
        stdout: state.stdout,
        artifact,
        error: None,
    }
}
