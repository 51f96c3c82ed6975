//! Portable snapshot of orchestration progress, and the adapter that derives
//! it from a work-item record plus the run context.

use crate::record::WorkItem;
use crate::run_context::RunContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// What a policy sees when choosing the next action.
///
/// A new `TaskState` is derived after every step; `has_research`, `has_icp`
/// and `gates_passed` only ever grow within a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub run_id: String,
    pub work_item_id: String,
    pub current_stage: String,
    pub has_research: bool,
    pub has_icp: bool,
    pub gates_passed: BTreeSet<String>,
    pub steps_taken: u32,
    pub resources_used: u64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// The subset of a `TaskState` written to step logs; enough to rebuild the
/// RL bucket key for that step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default = "default_stage")]
    pub current_stage: String,
    #[serde(default)]
    pub has_research: bool,
    #[serde(default)]
    pub has_icp: bool,
    #[serde(default)]
    pub gates_passed: Vec<String>,
    #[serde(default)]
    pub steps_taken: u32,
    #[serde(default)]
    pub resources_used: u64,
}

fn default_stage() -> String {
    "idea".to_string()
}

impl TaskState {
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            current_stage: self.current_stage.clone(),
            has_research: self.has_research,
            has_icp: self.has_icp,
            gates_passed: self.gates_passed.iter().cloned().collect(),
            steps_taken: self.steps_taken,
            resources_used: self.resources_used,
        }
    }

    pub fn metadata_flag(&self, section: &str, key: &str) -> bool {
        self.metadata
            .get(section)
            .and_then(|s| s.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn stage_completed(&self, stage: &str) -> bool {
        self.metadata
            .get("stages")
            .and_then(|s| s.get(stage))
            .and_then(|s| s.get("status"))
            .and_then(Value::as_str)
            == Some("completed")
    }
}

/// Derive a `TaskState` from the current record and run context.
pub fn to_task_state(record: &WorkItem, ctx: &RunContext) -> TaskState {
    let mut gates: BTreeSet<String> = record.completed_stages().into_iter().collect();
    gates.extend(record.gate_note_keys());
    gates.extend(ctx.passed_gates().into_iter().map(str::to_string));

    let mut metadata = Map::new();
    for key in ["stages", "crm", "research", "deployment"] {
        if let Some(v) = record.get_path(&[key]) {
            metadata.insert(key.to_string(), v.clone());
        }
    }
    let mut flags = Map::new();
    for flag in ["build_attempted", "tests_run"] {
        flags.insert(
            flag.to_string(),
            Value::Bool(record.bool_at(&["metadata", flag])),
        );
    }
    metadata.insert("metadata".to_string(), Value::Object(flags));

    let work_item_id = record
        .slug()
        .map(str::to_string)
        .unwrap_or_else(|| ctx.work_item_id.clone());

    TaskState {
        run_id: ctx.run_id.clone(),
        work_item_id,
        current_stage: record.current_stage().to_string(),
        has_research: record.research_completed(),
        has_icp: record.icp_summary().is_some(),
        gates_passed: gates,
        steps_taken: ctx.steps_taken,
        resources_used: ctx.resources_used,
        metadata,
    }
}

/// Fold one executed step into the state: counters advance from `prev`, and
/// the monotonic fields never shrink.
pub fn apply_result(prev: &TaskState, record: &WorkItem, ctx: &RunContext, cost: u64) -> TaskState {
    let mut next = to_task_state(record, ctx);
    next.steps_taken = prev.steps_taken + 1;
    next.resources_used = prev.resources_used + cost;
    if next.run_id.is_empty() {
        next.run_id = prev.run_id.clone();
    }
    if next.work_item_id.is_empty() {
        next.work_item_id = prev.work_item_id.clone();
    }
    next.gates_passed.extend(prev.gates_passed.iter().cloned());
    next.has_research |= prev.has_research;
    next.has_icp |= prev.has_icp;
    next
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidationGate;
    use serde_json::json;

    fn record(v: Value) -> WorkItem {
        WorkItem::from_value(v).unwrap()
    }

    #[test]
    fn derives_flags_and_gates() {
        let r = record(json!({
            "slug": "tax-assist",
            "currentStage": "scoring",
            "stages": {"idea": {"status": "completed"}, "validation": {"status": "in_progress"}},
            "research": {"researchArtifacts": ["a.md"]},
            "crm": {"icpSummary": "Accountants", "gateDecisionNotes": {"scoring": "ok"}},
            "metadata": {"tests_run": true}
        }));
        let mut ctx = RunContext::with_run_id("r1", "tax-assist");
        ctx.gate.validation = Some(ValidationGate::Pass);
        let s = to_task_state(&r, &ctx);

        assert_eq!(s.current_stage, "scoring");
        assert!(s.has_research);
        assert!(s.has_icp);
        let gates: Vec<_> = s.gates_passed.iter().map(String::as_str).collect();
        assert_eq!(gates, vec!["idea", "scoring", "validation"]);
        assert!(s.metadata_flag("metadata", "tests_run"));
        assert!(!s.metadata_flag("metadata", "build_attempted"));
        assert!(s.stage_completed("idea"));
    }

    #[test]
    fn empty_record_defaults() {
        let s = to_task_state(&record(json!({})), &RunContext::with_run_id("r1", "x"));
        assert_eq!(s.current_stage, "idea");
        assert_eq!(s.work_item_id, "x");
        assert!(!s.has_research && !s.has_icp);
        assert!(s.gates_passed.is_empty());
    }

    #[test]
    fn apply_result_is_monotonic() {
        let ctx = RunContext::with_run_id("r1", "a");
        let rich = record(json!({
            "slug": "a",
            "research": {"researchCompleted": true},
            "crm": {"icpSummary": "x", "gateDecisionNotes": {"validation": "ok"}}
        }));
        let prev = apply_result(&to_task_state(&rich, &ctx), &rich, &ctx, 100);

        // A later record that (wrongly) lost everything must not shrink the state.
        let poor = record(json!({"slug": "a"}));
        let next = apply_result(&prev, &poor, &ctx, 50);

        assert!(next.has_research && next.has_icp);
        assert!(next.gates_passed.is_superset(&prev.gates_passed));
        assert_eq!(next.steps_taken, prev.steps_taken + 1);
        assert_eq!(next.resources_used, 150);
    }

    #[test]
    fn apply_result_keeps_ids_from_prev() {
        let prev = TaskState {
            run_id: "r9".into(),
            work_item_id: "kept".into(),
            ..TaskState::default()
        };
        let next = apply_result(&prev, &record(json!({})), &RunContext::default(), 0);
        assert_eq!(next.run_id, "r9");
        assert_eq!(next.work_item_id, "kept");
    }

    #[test]
    fn snapshot_deserializes_with_defaults() {
        let snap: StateSnapshot = serde_json::from_value(json!({"has_icp": true})).unwrap();
        assert_eq!(snap.current_stage, "idea");
        assert!(snap.has_icp);
        assert_eq!(snap.steps_taken, 0);
    }
}
