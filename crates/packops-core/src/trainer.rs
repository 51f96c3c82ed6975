//! Offline training of the RL weight table from run telemetry.
//!
//! Every step of a completed run moves its bucket's preference for the
//! action taken by `learning_rate × episode_reward`. Runs folded in once are
//! recorded in a watermark file so training the same logs twice is a no-op.

use crate::action::Action;
use crate::config::{PolicyConfig, TrainingConfig};
use crate::error::Result;
use crate::paths;
use crate::policy::rl::Features;
use crate::policy::RlPolicy;
use crate::telemetry::{Logs, RunEnd, RunLogger, StepRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainReport {
    pub runs_processed: usize,
    pub runs_skipped: usize,
    pub avg_reward: f64,
    pub updated_buckets: usize,
}

/// Run ids already folded into the weight table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    #[serde(default)]
    pub runs: BTreeSet<String>,
}

impl Watermark {
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read training watermark; treating all runs as new");
                return Self::default();
            }
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "malformed training watermark; treating all runs as new");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::io::write_json_pretty(path, self)
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.runs.contains(run_id)
    }
}

pub struct Trainer {
    logger: RunLogger,
    weights_path: PathBuf,
    watermark_path: PathBuf,
    pub learning_rate: f64,
    pub max_runs: usize,
}

impl Trainer {
    pub fn new(root: &Path, cfg: &TrainingConfig) -> Self {
        Self {
            logger: RunLogger::new(root),
            weights_path: paths::weights_path(root),
            watermark_path: paths::watermark_path(root),
            learning_rate: cfg.learning_rate,
            max_runs: cfg.max_runs,
        }
    }

    pub fn train(&self) -> Result<TrainReport> {
        let logs = self.logger.load()?;
        let mut watermark = Watermark::load(&self.watermark_path);
        let (batch, skipped) = select_runs(&logs, &watermark, self.max_runs);

        if batch.is_empty() {
            info!(skipped, "no new runs to train on");
            return Ok(TrainReport {
                runs_skipped: skipped,
                ..TrainReport::default()
            });
        }

        let mut steps_by_run: HashMap<&str, Vec<&StepRecord>> = HashMap::new();
        for step in &logs.steps {
            steps_by_run.entry(step.run_id.as_str()).or_default().push(step);
        }

        let mut policy = RlPolicy::load(&self.weights_path, &PolicyConfig::default());
        let mut touched = BTreeSet::new();
        for run in &batch {
            let mut steps = steps_by_run.remove(run.run_id.as_str()).unwrap_or_default();
            steps.sort_by_key(|s| s.step_index);
            let delta = self.learning_rate * run.final_reward;
            for step in steps {
                let Ok(action) = step.action.parse::<Action>() else {
                    warn!(run_id = %run.run_id, action = %step.action, "step uses a retired action name; skipped");
                    continue;
                };
                let snapshot = step.prior_state.as_ref().unwrap_or(&step.state);
                let key = Features::from_snapshot(snapshot).key();
                *policy.weights_mut().bucket_mut(&key).entry(action).or_insert(0.0) += delta;
                touched.insert(key);
            }
        }

        policy.save()?;
        watermark
            .runs
            .extend(batch.iter().map(|r| r.run_id.clone()));
        watermark.save(&self.watermark_path)?;

        let avg_reward = batch.iter().map(|r| r.final_reward).sum::<f64>() / batch.len() as f64;
        info!(
            runs = batch.len(),
            skipped,
            buckets = touched.len(),
            avg_reward,
            "weights updated"
        );
        Ok(TrainReport {
            runs_processed: batch.len(),
            runs_skipped: skipped,
            avg_reward,
            updated_buckets: touched.len(),
        })
    }
}

/// Completed runs not yet trained on, newest first and capped at `max_runs`,
/// plus the number skipped because the watermark already holds them.
fn select_runs<'a>(logs: &'a Logs, watermark: &Watermark, max_runs: usize) -> (Vec<&'a RunEnd>, usize) {
    let mut seen = HashSet::new();
    let mut skipped = 0;
    let mut fresh = Vec::new();
    for end in logs.run_ends() {
        if !seen.insert(end.run_id.as_str()) {
            continue;
        }
        if watermark.contains(&end.run_id) {
            skipped += 1;
        } else {
            fresh.push(end);
        }
    }
    fresh.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    fresh.truncate(max_runs);
    (fresh, skipped)
}
