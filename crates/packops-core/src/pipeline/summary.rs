use super::{now_timestamp, StageEnv, StageOutput};
use crate::error::Result;
use crate::paths;
use crate::record::WorkItem;
use crate::run_context::RunContext;
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct RunStateFile<'a> {
    #[serde(flatten)]
    context: &'a RunContext,
    current_stage: &'a str,
    completed_at: String,
}

/// Write the run context to `.packops/runs/<run_id>.json`.
pub fn run(env: &StageEnv, record: &WorkItem, ctx: &mut RunContext) -> Result<StageOutput> {
    let path = paths::run_state_path(&env.root, &ctx.run_id);
    let file = RunStateFile {
        context: ctx,
        current_stage: record.current_stage(),
        completed_at: now_timestamp(),
    };
    crate::io::write_json_pretty(&path, &file)?;
    info!(slug = %ctx.work_item_id, path = %path.display(), "run state saved");
    Ok(StageOutput::unchanged(record))
}
