use super::{advance_stage, now_timestamp, StageEnv, StageOutput};
use crate::error::{PackopsError, Result};
use crate::record::WorkItem;
use crate::run_context::RunContext;
use crate::types::{ScoringGate, Stage};
use serde_json::{json, Value};
use tracing::info;

pub const PASS_VIABILITY: u8 = 70;
pub const PASS_DATA_AVAILABILITY: u8 = 60;
pub const SOFT_FAIL_VIABILITY: u8 = 50;

/// Deterministic tiered gate over the validation scores.
pub fn evaluate(viability: u8, data_availability: u8) -> (ScoringGate, String) {
    if viability >= PASS_VIABILITY && data_availability >= PASS_DATA_AVAILABILITY {
        (
            ScoringGate::Pass,
            format!(
                "Passed scoring gate with viability {viability} and data availability \
                 {data_availability}. Scores meet thresholds for proceeding to deep research."
            ),
        )
    } else if viability >= SOFT_FAIL_VIABILITY {
        (
            ScoringGate::SoftFailRetry,
            format!(
                "Soft fail: Viability {viability} is moderate but data availability \
                 {data_availability} is below threshold. May retry after improving data \
                 sources or refining idea."
            ),
        )
    } else {
        (
            ScoringGate::HardFail,
            format!(
                "Hard fail: Viability {viability} is below threshold. Pack idea needs \
                 significant refinement before proceeding."
            ),
        )
    }
}

pub fn run(_env: &StageEnv, record: &WorkItem, ctx: &mut RunContext) -> Result<StageOutput> {
    let (Some(viability), Some(data_availability)) =
        (ctx.scores.viability, ctx.scores.data_availability)
    else {
        return Err(PackopsError::StagePrecondition {
            stage: "scoring_gate".to_string(),
            reason: "viability and data_availability must be scored first".to_string(),
        });
    };

    let (gate, rationale) = evaluate(viability, data_availability);
    ctx.gate.scoring = Some(gate);
    ctx.notes.scoring_rationale = Some(rationale.clone());

    let now = now_timestamp();
    let mut updated = record.clone();
    let stage = updated.complete_stage(Stage::Scoring.as_str(), &now);
    stage.insert("score".to_string(), json!(viability));
    stage.insert(
        "gate".to_string(),
        Value::String(if gate.passed() { "pass" } else { "fail" }.to_string()),
    );
    updated.set_gate_note(Stage::Scoring.as_str(), rationale);
    updated.touch(&now);
    if gate.passed() {
        advance_stage(&mut updated, Stage::DeepDive);
    }

    info!(slug = %ctx.work_item_id, viability, data_availability, gate = %gate, "scoring gate decided");
    Ok(StageOutput {
        record: updated,
        cost: 0,
    })
}
