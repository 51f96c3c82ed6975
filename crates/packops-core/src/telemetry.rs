//! Append-only JSONL telemetry for dynamic runs.
//!
//! Two streams: `runs.jsonl` carries `run_start`/`run_end` events and
//! `steps.jsonl` carries one `step` event per executed action. Together they
//! are enough to rebuild the bucket key and episode return of every step.

use crate::error::Result;
use crate::paths;
use crate::policy::PolicyMode;
use crate::task_state::StateSnapshot;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStart {
    pub run_id: String,
    pub work_item_id: String,
    pub policy_mode: PolicyMode,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEnd {
    pub run_id: String,
    #[serde(default)]
    pub work_item_id: String,
    pub final_reward: f64,
    pub success: bool,
    pub steps_taken: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStart(RunStart),
    RunEnd(RunEnd),
}

/// One executed action. `action` stays a plain string so records written by
/// older vocabularies still load and can be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: String,
    pub step_index: u32,
    pub action: String,
    /// State the action was chosen in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_state: Option<StateSnapshot>,
    /// State after the action.
    pub state: StateSnapshot,
    pub tokens_used: u64,
    pub local_reward: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    Step(StepRecord),
}

// ---------------------------------------------------------------------------
// RunLogger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunLogger {
    runs_path: PathBuf,
    steps_path: PathBuf,
}

impl RunLogger {
    pub fn new(root: &Path) -> Self {
        Self {
            runs_path: paths::runs_log_path(root),
            steps_path: paths::steps_log_path(root),
        }
    }

    pub fn runs_path(&self) -> &Path {
        &self.runs_path
    }

    pub fn steps_path(&self) -> &Path {
        &self.steps_path
    }

    pub fn log_run_start(&self, start: RunStart) -> Result<()> {
        append(&self.runs_path, &RunEvent::RunStart(start))
    }

    pub fn log_step(&self, step: StepRecord) -> Result<()> {
        append(&self.steps_path, &StepEvent::Step(step))
    }

    pub fn log_run_end(&self, end: RunEnd) -> Result<()> {
        append(&self.runs_path, &RunEvent::RunEnd(end))
    }

    pub fn load(&self) -> Result<Logs> {
        Ok(Logs {
            runs: read_jsonl(&self.runs_path)?,
            steps: read_jsonl::<StepEvent>(&self.steps_path)?
                .into_iter()
                .map(|StepEvent::Step(s)| s)
                .collect(),
        })
    }
}

fn append<T: Serialize>(path: &Path, event: &T) -> Result<()> {
    let line = serde_json::to_string(event)?;
    crate::io::append_line(path, &line)
}

/// Everything currently in both streams.
#[derive(Debug, Default)]
pub struct Logs {
    pub runs: Vec<RunEvent>,
    pub steps: Vec<StepRecord>,
}

impl Logs {
    pub fn run_ends(&self) -> impl Iterator<Item = &RunEnd> {
        self.runs.iter().filter_map(|e| match e {
            RunEvent::RunEnd(end) => Some(end),
            RunEvent::RunStart(_) => None,
        })
    }
}

/// Parse a JSONL file, skipping blank and malformed lines. A missing file
/// reads as empty.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for (n, line) in std::io::BufReader::new(file).split(b'\n').enumerate() {
        let line = line?;
        let Ok(line) = std::str::from_utf8(&line) else {
            warn!(path = %path.display(), line = n + 1, "skipping log line that is not UTF-8");
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(v) => out.push(v),
            Err(e) => warn!(path = %path.display(), line = n + 1, error = %e, "skipping malformed log line"),
        }
    }
    Ok(out)
}
