//! Research stages and the fixed pipeline that chains them.
//!
//! Each stage takes the current record and the run context and returns an
//! updated copy of the record plus the backend tokens it spent. Stages never
//! write the catalog themselves; the caller merges the owned fields back
//! through [`persist`] so concurrent runs do not clobber each other.

pub mod deep_research;
pub mod icp_analysis;
pub mod intake;
pub mod scoring_gate;
pub mod summary;
pub mod validation;

use crate::backend::GenerationBackend;
use crate::error::Result;
use crate::record::{merge_owned, WorkItem};
use crate::run_context::RunContext;
use crate::store::RecordStore;
use crate::types::Stage;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Collaborators shared by every stage.
#[derive(Clone)]
pub struct StageEnv {
    pub store: Arc<dyn RecordStore>,
    pub backend: Arc<dyn GenerationBackend>,
    pub root: PathBuf,
    pub research_template: Option<PathBuf>,
}

/// Result of one stage: the record as the stage left it and what it cost.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub record: WorkItem,
    pub cost: u64,
}

impl StageOutput {
    pub fn unchanged(record: &WorkItem) -> Self {
        Self {
            record: record.clone(),
            cost: 0,
        }
    }
}

pub type StageFn = fn(&StageEnv, &WorkItem, &mut RunContext) -> Result<StageOutput>;

/// UTC timestamp in the catalog's `2025-01-01T00:00:00.000Z` format.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Move `currentStage` forward to `stage`. Never moves it backwards, and
/// leaves stage names this crate does not know untouched.
pub fn advance_stage(record: &mut WorkItem, stage: Stage) {
    match Stage::parse(record.current_stage()) {
        Some(current) if current < stage => record.set_current_stage(stage),
        _ => {}
    }
}

/// Merge the changes between `base` and `updated` into the stored record and
/// return the result, which becomes the input to the next stage.
pub fn persist(env: &StageEnv, slug: &str, base: &WorkItem, updated: &WorkItem) -> Result<WorkItem> {
    if base == updated {
        return Ok(updated.clone());
    }
    env.store
        .update(slug, &mut |stored| Ok(merge_owned(&stored, base, updated)))
}

// ---------------------------------------------------------------------------
// Fixed graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Intake,
    Validation,
    ScoringGate,
    DeepResearch,
    Summary,
}

impl Node {
    pub fn as_str(self) -> &'static str {
        match self {
            Node::Intake => "intake",
            Node::Validation => "validation",
            Node::ScoringGate => "scoring_gate",
            Node::DeepResearch => "deep_research",
            Node::Summary => "summary",
        }
    }

    fn stage(self) -> StageFn {
        match self {
            Node::Intake => intake::run,
            Node::Validation => validation::run,
            Node::ScoringGate => scoring_gate::run,
            Node::DeepResearch => deep_research::run,
            Node::Summary => summary::run,
        }
    }

    /// Edge out of this node. The scoring gate is the only branch: deep
    /// research runs only when it passed.
    fn next(self, ctx: &RunContext) -> Option<Node> {
        match self {
            Node::Intake => Some(Node::Validation),
            Node::Validation => Some(Node::ScoringGate),
            Node::ScoringGate => {
                if ctx.gate.scoring.is_some_and(|g| g.passed()) {
                    Some(Node::DeepResearch)
                } else {
                    Some(Node::Summary)
                }
            }
            Node::DeepResearch => Some(Node::Summary),
            Node::Summary => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub nodes: Vec<Node>,
    pub context: RunContext,
    pub run_state_path: String,
}

/// Run intake → validation → scoring gate → (deep research) → summary.
pub fn run_pipeline(env: &StageEnv, slug: &str) -> Result<PipelineReport> {
    let mut ctx = RunContext::new(slug);
    info!(slug, run_id = %ctx.run_id, "pipeline started");

    // Intake fails fast on an unknown slug before any stage runs.
    let mut record = env.store.get(slug)?;
    let mut nodes = Vec::new();
    let mut node = Some(Node::Intake);

    while let Some(current) = node {
        let out = (current.stage())(env, &record, &mut ctx)?;
        ctx.record_step(out.cost);
        record = persist(env, slug, &record, &out.record)?;
        nodes.push(current);
        node = current.next(&ctx);
    }

    let run_state_path = crate::paths::run_state_path(&env.root, &ctx.run_id)
        .display()
        .to_string();
    info!(slug, run_id = %ctx.run_id, stages = nodes.len(), "pipeline finished");
    Ok(PipelineReport {
        nodes,
        context: ctx,
        run_state_path,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
