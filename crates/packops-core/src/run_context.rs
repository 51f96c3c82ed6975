use crate::types::{ScoringGate, ValidationGate};
use serde::{Deserialize, Serialize};

/// Scores returned by the assessment backend, each 0..=100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub viability: Option<u8>,
    pub data_availability: Option<u8>,
    pub icp_clarity: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateDecisions {
    pub validation: Option<ValidationGate>,
    pub scoring: Option<ScoringGate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub deep_dive_report_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notes {
    pub validation_rationale: Option<String>,
    pub scoring_rationale: Option<String>,
    pub deep_dive_summary: Option<String>,
    pub icp_summary: Option<String>,
}

/// Per-run working state carried across stages and steps.
///
/// Unlike the record, nothing here is written to the catalog; the summary
/// stage dumps it to `.packops/runs/<run_id>.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: String,
    pub work_item_id: String,
    pub steps_taken: u32,
    pub resources_used: u64,
    #[serde(default)]
    pub scores: Scores,
    #[serde(default)]
    pub gate: GateDecisions,
    #[serde(default)]
    pub artifacts: Artifacts,
    #[serde(default)]
    pub notes: Notes,
}

impl RunContext {
    pub fn new(work_item_id: impl Into<String>) -> Self {
        Self::with_run_id(new_run_id(), work_item_id)
    }

    pub fn with_run_id(run_id: impl Into<String>, work_item_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            work_item_id: work_item_id.into(),
            ..Self::default()
        }
    }

    /// Names of the gates this run has passed so far.
    pub fn passed_gates(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.gate.validation == Some(ValidationGate::Pass) {
            out.push("validation");
        }
        if self.gate.scoring.is_some_and(ScoringGate::passed) {
            out.push("scoring");
        }
        out
    }

    pub fn record_step(&mut self, cost: u64) {
        self.steps_taken += 1;
        self.resources_used += cost;
    }
}

pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
