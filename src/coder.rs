//! Code generation: one model per attempt, feedback threaded forward.

use tracing::debug;

use crate::llm::{ModelClient, ModelError, ModelRequest};
use crate::observer::PageContext;
use crate::planner::TaskPlan;
use crate::prompts::{self, CODER_SYSTEM_ROLE};

/// Ask `model` for solver code for this task, carrying the previous
/// execution error and server rejection into the prompt.
pub async fn generate_code(
    client: &dyn ModelClient,
    model: &str,
    task: &TaskPlan,
    page: &PageContext,
    previous_error: &str,
    server_feedback: &str,
) -> Result<String, ModelError> {
    let prompt = prompts::coding_prompt(
        &task.question,
        &task.format_hint,
        page,
        previous_error,
        server_feedback,
    );
    let request = ModelRequest::new(CODER_SYSTEM_ROLE, prompt, model);
    let raw = client.complete(&request).await?;
    let code = strip_code_fences(&raw);
    debug!(model, bytes = code.len(), "generated solver code");
    Ok(code)
}

/// Remove a surrounding markdown fence, with or without a language tag.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = match rest.split_once('\n') {
        Some((first_line, body)) if first_line.chars().all(|c| c.is_alphanumeric() || c == '_') => {
            body
        }
        _ => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tagged_fence() {
        let raw = "```javascript\nsolution = 1;\n```";
        assert_eq!(strip_code_fences(raw), "solution = 1;");
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\nsolution = 1;\n```";
        assert_eq!(strip_code_fences(raw), "solution = 1;");
    }

    #[test]
    fn leaves_plain_code_untouched() {
        assert_eq!(strip_code_fences("solution = 1;"), "solution = 1;");
    }

    #[test]
    fn keeps_internal_backticks() {
        let raw = "```js\nvar s = `tpl`;\nsolution = s;\n```";
        assert_eq!(strip_code_fences(raw), "var s = `tpl`;\nsolution = s;");
    }
}
