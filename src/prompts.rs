//! Prompt builders for the planner and coder stages.

use crate::observer::{PageContext, PageLink};

pub const PLANNER_SYSTEM_ROLE: &str = "You are a senior data forensic analyst. \
You parse messy page text and identify the exact extraction task. \
You are paranoid about decoy data (example JSON, sample payloads) and focus \
only on the instructions that ask for a calculation or extraction.";

pub const CODER_SYSTEM_ROLE: &str = "You are a principal JavaScript engineer. \
You write robust code that extracts data, processes it and computes the raw \
result. You never POST data anywhere; you only calculate the answer.";

pub const REPAIR_SYSTEM_ROLE: &str = "JSON fixer";

const PAGE_TEXT_LIMIT: usize = 15_000;

fn render_links(links: &[PageLink]) -> String {
    links
        .iter()
        .map(|link| format!("- {} -> {}", link.label, link.url))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn planning_prompt(page: &PageContext) -> String {
    let text: String = page.text.chars().take(PAGE_TEXT_LIMIT).collect();
    format!(
        "=== MISSION BRIEF ===\n\
         [RESOURCES]\n\
         FILES: {files:?}\n\
         LINKS:\n{links}\n\
         PAGE TEXT:\n{text}\n\n\
         [OBJECTIVE]\n\
         1. THE ACTUAL QUESTION.\n\
            - If the page says \"Download X\", X is the question.\n\
            - If the page says \"Scrape /data\", finding that data is the question.\n\
            - Ignore any example JSON shown on the page.\n\
         2. THE SUBMISSION URL.\n\
         3. THE ANSWER FORMAT (number, string, list, dict).\n\n\
         [OUTPUT]\n\
         Return ONLY JSON:\n\
         {{\"question\": \"...\", \"submit_url\": \"...\", \"format_hint\": \"...\"}}",
        files = page.files,
        links = render_links(&page.links),
        text = text,
    )
}

pub fn coding_prompt(
    question: &str,
    format_hint: &str,
    page: &PageContext,
    previous_error: &str,
    server_feedback: &str,
) -> String {
    let mut prompt = format!(
        "=== CODING TASK ===\n\
         GOAL: \"{question}\"\n\
         FILES: {files:?} (readable via read_file(name))\n\
         LINKS:\n{links}\n\
         EXPECTED FORMAT: {format_hint}\n\n\
         [ENVIRONMENT]\n\
         Plain JavaScript, no imports. Available helpers:\n\
         - read_file(name): file contents from the workspace, or null\n\
         - list_files(): workspace filenames\n\
         - http_get(url): response body as a string (GET only; you are \
         forbidden from submitting data anywhere)\n\
         - parse_csv(text): array of rows, each an array of strings\n\
         - plot(spec): record a chart, e.g. {{\"kind\":\"line\",\"title\":\"t\",\"points\":[[0,1],[1,2]]}}\n\
         - transcribe(name): transcript of an audio file in the workspace\n\
         - print(...): debug output\n\n\
         [OUTPUT ASSIGNMENT]\n\
         Assign the final result to the predeclared `solution` variable.\n\
         `solution` MUST be the answer value itself (e.g. 600, \"secret_code\").\n\
         `solution` MUST NOT be an object like {{\"error\": ...}}.",
        question = question,
        files = page.files,
        links = render_links(&page.links),
        format_hint = format_hint,
    );

    if !previous_error.is_empty() {
        prompt.push_str(&format!(
            "\n\n[PREVIOUS CODE ERROR]: {previous_error}\nFix the logic."
        ));
    }
    if !server_feedback.is_empty() {
        prompt.push_str(&format!(
            "\n\n[SERVER REJECTED ANSWER]: {server_feedback}\nRe-calculate."
        ));
    }
    prompt
}

pub fn repair_prompt(broken: &str) -> String {
    format!("Return ONLY valid JSON. Broken string:\n{broken}")
}
