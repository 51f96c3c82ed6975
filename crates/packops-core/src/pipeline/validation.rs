use super::{advance_stage, now_timestamp, StageEnv, StageOutput};
use crate::error::Result;
use crate::record::WorkItem;
use crate::run_context::RunContext;
use crate::types::{Stage, ValidationGate};
use tracing::info;

/// Viability needed to pass validation.
pub const VALIDATION_PASS_VIABILITY: u8 = 60;

pub fn build_prompt(record: &WorkItem) -> String {
    let audience = record.target_audience();
    let audience = if audience.is_empty() {
        "Not specified".to_string()
    } else {
        audience.join(", ")
    };
    format!(
        "You are an AI research assistant evaluating a compliance pack idea.\n\n\
         Pack Information:\n\
         - Regulation/Standard: {regulation}\n\
         - Target Audience: {audience}\n\n\
         Idea Notes:\n{idea}\n\n\
         ICP Summary:\n{icp}\n\n\
         Please evaluate this pack idea and provide:\n\
         1. Viability Score (0-100): market need, clarity of value proposition, feasibility.\n\
         2. Data Availability Score (0-100): how readily available the source material is.\n\
         3. ICP Clarity Score (0-100): how specific and reachable the target audience is.\n\n\
         Respond with a JSON object:\n\
         {{\"viability\": <0-100>, \"data_availability\": <0-100>, \
         \"icp_clarity\": <0-100>, \"rationale\": \"<2-3 sentences>\"}}",
        regulation = record.regulation_name(),
        idea = record.idea_notes().unwrap_or("No idea notes provided"),
        icp = record.icp_summary().unwrap_or("No ICP summary provided"),
    )
}

/// Score the work item through the backend and apply the validation gate.
pub fn run(env: &StageEnv, record: &WorkItem, ctx: &mut RunContext) -> Result<StageOutput> {
    let assessment = env.backend.assess(&build_prompt(record))?;

    let gate = if assessment.viability >= VALIDATION_PASS_VIABILITY {
        ValidationGate::Pass
    } else {
        ValidationGate::Fail
    };
    ctx.scores.viability = Some(assessment.viability);
    ctx.scores.data_availability = Some(assessment.data_availability);
    ctx.scores.icp_clarity = Some(assessment.icp_clarity);
    ctx.notes.validation_rationale = Some(assessment.rationale.clone());
    ctx.gate.validation = Some(gate);

    let now = now_timestamp();
    let mut updated = record.clone();
    updated.complete_stage(Stage::Validation.as_str(), &now);
    updated.set_gate_note(
        Stage::Validation.as_str(),
        format!(
            "Validation {}. Scores: Viability={}, Data Availability={}, ICP Clarity={}. {}",
            if gate == ValidationGate::Pass { "passed" } else { "failed" },
            assessment.viability,
            assessment.data_availability,
            assessment.icp_clarity,
            assessment.rationale
        ),
    );
    updated.touch(&now);
    advance_stage(&mut updated, Stage::Scoring);

    info!(
        slug = %ctx.work_item_id,
        viability = assessment.viability,
        data_availability = assessment.data_availability,
        icp_clarity = assessment.icp_clarity,
        gate = %gate,
        "validation scored"
    );
    Ok(StageOutput {
        record: updated,
        cost: assessment.tokens_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCatalog;
    use crate::testing::{sample_record, ScriptedBackend};
    use std::sync::Arc;

    fn env(backend: ScriptedBackend) -> StageEnv {
        StageEnv {
            store: Arc::new(MemoryCatalog::default()),
            backend: Arc::new(backend),
            root: std::env::temp_dir(),
            research_template: None,
        }
    }

    #[test]
    fn prompt_includes_record_fields() {
        let prompt = build_prompt(&sample_record("a"));
        assert!(prompt.contains("IRS Publication 15"));
        assert!(prompt.contains("Accountants, Payroll teams"));
        assert!(prompt.contains("Payroll withholding checklist"));
        assert!(prompt.contains("No ICP summary provided"));
    }

    #[test]
    fn viability_sixty_passes() {
        let env = env(ScriptedBackend::new().assessment(60, 10, 20, 800));
        let mut ctx = RunContext::with_run_id("r1", "a");
        let out = run(&env, &sample_record("a"), &mut ctx).unwrap();

        assert_eq!(ctx.gate.validation, Some(ValidationGate::Pass));
        assert_eq!(ctx.scores.viability, Some(60));
        assert_eq!(out.cost, 800);
        assert_eq!(out.record.stage_status("validation"), Some("completed"));
        assert_eq!(out.record.current_stage(), "scoring");
        let note = out
            .record
            .str_at(&["crm", "gateDecisionNotes", "validation"])
            .unwrap();
        assert!(note.starts_with("Validation passed. Scores: Viability=60"));
        assert!(out.record.str_at(&["metadata", "updatedAt"]).is_some());
    }

    #[test]
    fn viability_below_sixty_fails() {
        let env = env(ScriptedBackend::new().assessment(59, 90, 90, 800));
        let mut ctx = RunContext::with_run_id("r1", "a");
        let out = run(&env, &sample_record("a"), &mut ctx).unwrap();
        assert_eq!(ctx.gate.validation, Some(ValidationGate::Fail));
        let note = out
            .record
            .str_at(&["crm", "gateDecisionNotes", "validation"])
            .unwrap();
        assert!(note.starts_with("Validation failed."));
    }

    #[test]
    fn backend_error_propagates() {
        let env = env(ScriptedBackend::new().failure("rate limited"));
        let mut ctx = RunContext::with_run_id("r1", "a");
        assert!(run(&env, &sample_record("a"), &mut ctx).is_err());
        assert!(ctx.gate.validation.is_none());
    }
}
