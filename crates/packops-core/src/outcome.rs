//! Advisory sales and pipeline signals recorded by external systems.
//!
//! Both feeds are optional: a missing or malformed file contributes nothing
//! to the reward and is reported with a warning.

use crate::paths;
use crate::types::LeadStage;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// External outcome for one work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub sales: u32,
    pub pipeline_stage: Option<LeadStage>,
}

#[derive(Deserialize)]
struct PipelineEntry {
    slug: String,
    stage: String,
}

#[derive(Debug, Clone)]
pub struct OutcomeFeeds {
    sales_path: PathBuf,
    pipeline_path: PathBuf,
}

impl OutcomeFeeds {
    pub fn new(root: &Path) -> Self {
        Self {
            sales_path: paths::sales_path(root),
            pipeline_path: paths::pipeline_path(root),
        }
    }

    pub fn lookup(&self, slug: &str) -> Outcome {
        Outcome {
            sales: self.sales_for(slug),
            pipeline_stage: self.pipeline_stage_for(slug),
        }
    }

    fn sales_for(&self, slug: &str) -> u32 {
        let Some(data) = read_optional(&self.sales_path) else {
            return 0;
        };
        match serde_json::from_str::<HashMap<String, Value>>(&data) {
            Ok(counts) => counts
                .get(slug)
                .and_then(Value::as_u64)
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(0),
            Err(e) => {
                warn!(path = %self.sales_path.display(), error = %e, "malformed sales feed ignored");
                0
            }
        }
    }

    /// Most advanced stage recorded for `slug`.
    fn pipeline_stage_for(&self, slug: &str) -> Option<LeadStage> {
        let data = read_optional(&self.pipeline_path)?;
        let raw: Vec<Value> = match serde_json::from_str(&data) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.pipeline_path.display(), error = %e, "malformed pipeline feed ignored");
                return None;
            }
        };
        let entries: Vec<PipelineEntry> = raw
            .into_iter()
            .enumerate()
            .filter_map(|(i, v)| match serde_json::from_value(v) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(path = %self.pipeline_path.display(), index = i, error = %e, "malformed pipeline entry skipped");
                    None
                }
            })
            .collect();
        entries
            .iter()
            .filter(|e| e.slug == slug)
            .filter_map(|e| match e.stage.parse::<LeadStage>() {
                Ok(stage) => Some(stage),
                Err(_) => {
                    warn!(slug, stage = %e.stage, "unknown pipeline stage ignored");
                    None
                }
            })
            .max_by_key(|s| s.rank())
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(data) => Some(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "outcome feed unreadable");
            None
        }
    }
}
