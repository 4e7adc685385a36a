//! Audit trail boundary.
//!
//! The core emits an ordered sequence of named step records; persistence is a
//! collaborator concern. [`DiskRecorder`] mirrors the mission-report layout
//! the operators already grep through; [`MemoryRecorder`] backs tests.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Binary payload attached to a step, e.g. a page screenshot.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub details: Value,
    #[serde(skip)]
    pub attachment: Option<Attachment>,
}

impl StepRecord {
    pub fn new(step: impl Into<String>, details: Value) -> Self {
        Self {
            step: step.into(),
            details,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachment = Some(Attachment {
            content_type: content_type.into(),
            bytes,
        });
        self
    }
}

pub trait StepRecorder: Send + Sync {
    /// Persist one step. Ordering of calls is the audit ordering; recorders
    /// must not reorder.
    fn record(&self, record: StepRecord);
}

/// Recorder that keeps everything in memory, preserving order.
#[derive(Default)]
pub struct MemoryRecorder {
    steps: Mutex<Vec<StepRecord>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps
            .lock()
            .expect("recorder lock poisoned")
            .iter()
            .map(|record| record.step.clone())
            .collect()
    }

    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps.lock().expect("recorder lock poisoned").clone()
    }
}

impl StepRecorder for MemoryRecorder {
    fn record(&self, record: StepRecord) {
        self.steps
            .lock()
            .expect("recorder lock poisoned")
            .push(record);
    }
}

/// Disk-backed recorder: one directory per mission with a rolling
/// `report.json` plus attachment files named after their step.
pub struct DiskRecorder {
    dir: PathBuf,
    entries: Mutex<Vec<ReportEntry>>,
}

#[derive(Debug, Clone, Serialize)]
struct ReportEntry {
    timestamp: String,
    step: String,
    details: Value,
}

impl DiskRecorder {
    pub fn create(log_root: &std::path::Path, mission_id: &str) -> std::io::Result<Self> {
        let stamp = Utc::now().format("%H-%M-%S");
        let clean: String = mission_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let tail: String = clean
            .chars()
            .rev()
            .take(10)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let dir = log_root.join(format!("{stamp}_{tail}"));
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            entries: Mutex::new(Vec::new()),
        })
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    fn flush(&self, entries: &[ReportEntry]) {
        match serde_json::to_vec_pretty(entries) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(self.dir.join("report.json"), bytes) {
                    warn!(error = %err, "failed to write mission report");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize mission report"),
        }
    }
}

impl StepRecorder for DiskRecorder {
    fn record(&self, record: StepRecord) {
        if let Some(attachment) = &record.attachment {
            let ext = match attachment.content_type.as_str() {
                "image/png" => "png",
                "image/svg+xml" => "svg",
                _ => "bin",
            };
            let path = self.dir.join(format!("{}.{ext}", record.step));
            if let Err(err) = std::fs::write(&path, &attachment.bytes) {
                warn!(error = %err, path = %path.display(), "failed to write attachment");
            }
        }

        let mut entries = self.entries.lock().expect("recorder lock poisoned");
        entries.push(ReportEntry {
            timestamp: Utc::now().to_rfc3339(),
            step: record.step,
            details: record.details,
        });
        self.flush(&entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_recorder_preserves_order() {
        let recorder = MemoryRecorder::new();
        recorder.record(StepRecord::new("start", json!({"url": "https://x.test"})));
        recorder.record(StepRecord::new("observation", json!({})));
        recorder.record(StepRecord::new("planning", json!({})));
        assert_eq!(recorder.step_names(), vec!["start", "observation", "planning"]);
    }

    #[test]
    fn disk_recorder_writes_report_and_attachments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recorder = DiskRecorder::create(dir.path(), "https://x.test/q1").expect("recorder");
        recorder.record(
            StepRecord::new("observation", json!({"files": []}))
                .with_attachment("image/png", vec![1, 2, 3]),
        );
        recorder.record(StepRecord::new("planning", json!({"question": "q"})));

        let report = std::fs::read_to_string(recorder.dir().join("report.json")).expect("report");
        let parsed: Vec<Value> = serde_json::from_str(&report).expect("json");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["step"], "observation");
        assert!(recorder.dir().join("observation.png").exists());
    }
}
