use super::{advance_stage, StageEnv, StageOutput};
use crate::error::Result;
use crate::record::WorkItem;
use crate::run_context::RunContext;
use crate::types::Stage;
use tracing::info;

/// Reload the record from the store. A missing work item is an error.
///
/// A record still at `idea` moves on to `validation`.
pub fn run(env: &StageEnv, _record: &WorkItem, ctx: &mut RunContext) -> Result<StageOutput> {
    let mut fresh = env.store.get(&ctx.work_item_id)?;
    info!(
        slug = %ctx.work_item_id,
        name = fresh.name().unwrap_or("unnamed"),
        number = %fresh.number_label(),
        stage = fresh.current_stage(),
        "intake loaded work item"
    );
    advance_stage(&mut fresh, Stage::Validation);
    Ok(StageOutput {
        record: fresh,
        cost: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackopsError;
    use crate::store::MemoryCatalog;
    use crate::testing::{sample_record, ScriptedBackend};
    use std::sync::Arc;

    fn env(store: MemoryCatalog) -> StageEnv {
        StageEnv {
            store: Arc::new(store),
            backend: Arc::new(ScriptedBackend::new()),
            root: std::env::temp_dir(),
            research_template: None,
        }
    }

    #[test]
    fn reloads_and_advances_from_idea() {
        let env = env(MemoryCatalog::new(vec![sample_record("a")]));
        let mut ctx = RunContext::with_run_id("r1", "a");
        let stale = WorkItem::default();
        let out = run(&env, &stale, &mut ctx).unwrap();
        assert_eq!(out.record.slug(), Some("a"));
        assert_eq!(out.record.current_stage(), "validation");
        assert_eq!(out.cost, 0);
    }

    #[test]
    fn missing_item_fails_fast() {
        let env = env(MemoryCatalog::default());
        let mut ctx = RunContext::with_run_id("r1", "ghost");
        let err = run(&env, &WorkItem::default(), &mut ctx).unwrap_err();
        assert!(matches!(err, PackopsError::WorkItemNotFound(ref s) if s == "ghost"));
    }
}
