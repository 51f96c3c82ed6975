use super::{now_timestamp, StageEnv, StageOutput};
use crate::backend::CompletionRequest;
use crate::error::{PackopsError, Result};
use crate::record::WorkItem;
use crate::run_context::RunContext;
use serde_json::Value;
use tracing::info;

const ICP_MAX_TOKENS: u32 = 600;

const ICP_SYSTEM_PROMPT: &str = "You are a B2B go-to-market analyst. Describe ideal customer \
profiles concisely and concretely.";

pub fn build_prompt(record: &WorkItem, research_summary: Option<&str>) -> String {
    let audience = record.target_audience();
    format!(
        "Write an ideal customer profile (ICP) summary for a compliance pack.\n\n\
         Regulation/Standard: {regulation}\n\
         Target Audience: {audience}\n\
         Idea Notes: {idea}\n\
         Research Summary: {research}\n\n\
         Respond with 2-4 sentences naming the buyer role, company size, the trigger that \
         makes them buy, and where to reach them. Plain text only.",
        regulation = record.regulation_name(),
        audience = if audience.is_empty() {
            "Not specified".to_string()
        } else {
            audience.join(", ")
        },
        idea = record.idea_notes().unwrap_or("No idea notes provided"),
        research = research_summary.unwrap_or("Not yet researched"),
    )
}

/// Fill `crm.icpSummary` when it is blank. An existing summary is kept and
/// no backend call is made.
pub fn run(env: &StageEnv, record: &WorkItem, ctx: &mut RunContext) -> Result<StageOutput> {
    if let Some(existing) = record.icp_summary() {
        ctx.notes.icp_summary = Some(existing.to_string());
        info!(slug = %ctx.work_item_id, "icp summary already present");
        return Ok(StageOutput::unchanged(record));
    }

    let completion = env.backend.generate(&CompletionRequest {
        system: ICP_SYSTEM_PROMPT.to_string(),
        prompt: build_prompt(record, ctx.notes.deep_dive_summary.as_deref()),
        max_tokens: Some(ICP_MAX_TOKENS),
        json_output: false,
    })?;
    let summary = completion.text.trim().to_string();
    if summary.is_empty() {
        return Err(PackopsError::BackendResponse(
            "empty ICP summary".to_string(),
        ));
    }

    let now = now_timestamp();
    let mut updated = record.clone();
    updated.set_path(&["crm", "icpSummary"], Value::String(summary.clone()));
    updated.touch(&now);
    ctx.notes.icp_summary = Some(summary);

    info!(slug = %ctx.work_item_id, tokens = completion.tokens_used, "icp summary generated");
    Ok(StageOutput {
        record: updated,
        cost: completion.tokens_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCatalog;
    use crate::testing::{sample_record, ScriptedBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn env(backend: Arc<ScriptedBackend>) -> StageEnv {
        StageEnv {
            store: Arc::new(MemoryCatalog::default()),
            backend,
            root: std::env::temp_dir(),
            research_template: None,
        }
    }

    #[test]
    fn fills_blank_summary() {
        let backend = Arc::new(ScriptedBackend::new().reply("  Payroll managers at 10-50 person firms.  ", 300));
        let env = env(backend.clone());
        let mut ctx = RunContext::with_run_id("r1", "a");
        ctx.notes.deep_dive_summary = Some("Withholding errors are common.".into());

        let out = run(&env, &sample_record("a"), &mut ctx).unwrap();

        assert_eq!(out.record.icp_summary(), Some("Payroll managers at 10-50 person firms."));
        assert_eq!(out.cost, 300);
        assert_eq!(ctx.notes.icp_summary.as_deref(), out.record.icp_summary());
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("Withholding errors are common."));
    }

    #[test]
    fn keeps_existing_summary_without_calling_backend() {
        let backend = Arc::new(ScriptedBackend::new());
        let env = env(backend.clone());
        let mut record = sample_record("a");
        record.set_path(&["crm", "icpSummary"], json!("Existing ICP"));
        let mut ctx = RunContext::with_run_id("r1", "a");

        let out = run(&env, &record, &mut ctx).unwrap();

        assert_eq!(out.record, record);
        assert_eq!(out.cost, 0);
        assert_eq!(backend.prompt_count(), 0);
        assert_eq!(ctx.notes.icp_summary.as_deref(), Some("Existing ICP"));
    }

    #[test]
    fn blank_completion_is_rejected() {
        let env = env(Arc::new(ScriptedBackend::new().reply("   ", 10)));
        let mut ctx = RunContext::with_run_id("r1", "a");
        assert!(run(&env, &sample_record("a"), &mut ctx).is_err());
    }
}
