//! Fixed capability surface exposed to generated code.
//!
//! Capabilities are plain native functions reading a thread-local run state;
//! the executor activates the state before eval and drains it afterwards.
//! Network access is a GET-only helper and file access is read-only inside
//! the mission workspace.

use std::cell::RefCell;
use std::time::Duration;

use boa_engine::{
    js_string, Context, JsArgs, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source,
};
use serde_json::json;

use super::chart::ChartSpec;
use crate::workspace::Workspace;

const HTTP_GET_TIMEOUT: Duration = Duration::from_secs(20);

/// Mutable state shared by the capabilities of one sandbox run.
#[derive(Debug)]
pub struct RunState {
    pub workspace: Workspace,
    pub stdout: String,
    pub charts: Vec<ChartSpec>,
}

impl RunState {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            stdout: String::new(),
            charts: Vec::new(),
        }
    }
}

thread_local! {
    static ACTIVE: RefCell<Option<RunState>> = RefCell::new(None);
}

pub fn activate(state: RunState) {
    ACTIVE.with(|cell| *cell.borrow_mut() = Some(state));
}

pub fn deactivate() -> Option<RunState> {
    ACTIVE.with(|cell| cell.borrow_mut().take())
}

fn with_state<R>(f: impl FnOnce(&mut RunState) -> R) -> JsResult<R> {
    ACTIVE.with(|cell| {
        let mut guard = cell.borrow_mut();
        match guard.as_mut() {
            Some(state) => Ok(f(state)),
            None => Err(JsNativeError::error()
                .with_message("capability called outside a sandbox run")
                .into()),
        }
    })
}

/// Predeclares the output slot and aliases `console` onto `print`.
const PRELUDE: &str = "var solution = null;\nvar console = { log: print, error: print, warn: print };\n";

/// Register every capability and evaluate the prelude.
pub fn install(context: &mut Context) -> JsResult<()> {
    context.register_global_callable(
        js_string!("print"),
        0,
        NativeFunction::from_fn_ptr(cap_print),
    )?;
    context.register_global_callable(
        js_string!("read_file"),
        1,
        NativeFunction::from_fn_ptr(cap_read_file),
    )?;
    context.register_global_callable(
        js_string!("list_files"),
        0,
        NativeFunction::from_fn_ptr(cap_list_files),
    )?;
    context.register_global_callable(
        js_string!("http_get"),
        1,
        NativeFunction::from_fn_ptr(cap_http_get),
    )?;
    context.register_global_callable(
        js_string!("parse_csv"),
        1,
        NativeFunction::from_fn_ptr(cap_parse_csv),
    )?;
    context.register_global_callable(
        js_string!("plot"),
        1,
        NativeFunction::from_fn_ptr(cap_plot),
    )?;
    context.register_global_callable(
        js_string!("transcribe"),
        1,
        NativeFunction::from_fn_ptr(cap_transcribe),
    )?;
    context.eval(Source::from_bytes(PRELUDE))?;
    Ok(())
}

fn string_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    Ok(args
        .get_or_undefined(index)
        .to_string(context)?
        .to_std_string_escaped())
}

fn cap_print(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(arg.to_string(context)?.to_std_string_escaped());
    }
    with_state(|state| {
        state.stdout.push_str(&parts.join(" "));
        state.stdout.push('\n');
    })?;
    Ok(JsValue::undefined())
}

fn cap_read_file(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = string_arg(args, 0, context)?;
    let resolved = with_state(|state| state.workspace.resolve(&name))?;
    let Some(path) = resolved else {
        return Err(JsNativeError::typ()
            .with_message(format!("read_file: path escapes workspace: {name}"))
            .into());
    };
    match std::fs::read(&path) {
        Ok(bytes) => Ok(JsValue::from(JsString::from(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))),
        Err(_) => Ok(JsValue::null()),
    }
}

fn cap_list_files(_this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let names = with_state(|state| state.workspace.list())?
        .map_err(|err| JsNativeError::error().with_message(err.to_string()))?;
    JsValue::from_json(&json!(names), context)
}

fn cap_http_get(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let url = string_arg(args, 0, context)?;
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_GET_TIMEOUT)
        .build()
        .map_err(|err| JsNativeError::error().with_message(format!("http_get: {err}")))?;
    let response = client
        .get(&url)
        .send()
        .map_err(|err| JsNativeError::error().with_message(format!("http_get {url}: {err}")))?;
    if !response.status().is_success() {
        return Err(JsNativeError::error()
            .with_message(format!("http_get {url}: status {}", response.status()))
            .into());
    }
    let text = response
        .text()
        .map_err(|err| JsNativeError::error().with_message(format!("http_get {url}: {err}")))?;
    Ok(JsValue::from(JsString::from(text)))
}

fn cap_parse_csv(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let text = string_arg(args, 0, context)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|err| JsNativeError::typ().with_message(format!("parse_csv: {err}")))?;
        rows.push(
            record
                .iter()
                .map(|field| field.to_string())
                .collect::<Vec<_>>(),
        );
    }
    JsValue::from_json(&json!(rows), context)
}

fn cap_plot(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let raw = args.get_or_undefined(0).to_json(context)?;
    let spec: ChartSpec = serde_json::from_value(raw)
        .map_err(|err| JsNativeError::typ().with_message(format!("plot: invalid spec: {err}")))?;
    with_state(|state| state.charts.push(spec))?;
    Ok(JsValue::undefined())
}

fn cap_transcribe(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = string_arg(args, 0, context)?;
    let resolved = with_state(|state| state.workspace.resolve(&name))?;
    let reply = match resolved {
        Some(path) if path.exists() => format!(
            "Transcription placeholder for {name}; no speech backend is attached."
        ),
        _ => format!("Error: audio file not found: {name}"),
    };
    Ok(JsValue::from(JsString::from(reply)))
}
