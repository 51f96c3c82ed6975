use super::{Policy, PolicyMode};
use crate::action::Action;
use crate::task_state::TaskState;

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// One entry in the priority list. The first rule whose condition holds
/// decides the action.
pub struct Rule {
    pub id: &'static str,
    pub condition: fn(&TaskState) -> bool,
    pub action: Action,
}

macro_rules! rule {
    ($id:expr, $cond:expr => $action:expr) => {
        Rule {
            id: $id,
            condition: $cond,
            action: $action,
        }
    };
}

// ---------------------------------------------------------------------------
// Condition helpers
// ---------------------------------------------------------------------------

fn build_completed(s: &TaskState) -> bool {
    s.stage_completed("build")
}

fn deployed(s: &TaskState) -> bool {
    s.metadata_flag("deployment", "frontendDeployed") || s.metadata_flag("deployment", "workerDeployed")
}

fn stage_in(s: &TaskState, stages: &[&str]) -> bool {
    stages.contains(&s.current_stage.as_str())
}

pub fn default_rules() -> Vec<Rule> {
    vec![
        rule!("research_missing", |s| !s.has_research => Action::Research),
        rule!("icp_missing", |s| !s.has_icp => Action::IcpAnalysis),
        rule!("early_stage", |s| stage_in(s, &["idea", "validation"]) => Action::Evaluate),
        rule!(
            "build_pending",
            |s| !build_completed(s) && stage_in(s, &["build", "scoring", "deep_dive"])
                => Action::BuildCode
        ),
        rule!(
            "tests_pending",
            |s| build_completed(s) && !s.metadata_flag("metadata", "tests_run") => Action::Test
        ),
        rule!(
            "ready_to_publish",
            |s| s.current_stage == "build" && build_completed(s) && deployed(s) => Action::Publish
        ),
    ]
}

// ---------------------------------------------------------------------------
// RuleBasedPolicy
// ---------------------------------------------------------------------------

/// Deterministic heuristic router; also the RL policy's cold-start fallback.
pub struct RuleBasedPolicy {
    rules: Vec<Rule>,
}

impl RuleBasedPolicy {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// The rule that fires for `state`, or `None` when falling through to STOP.
    pub fn matching_rule(&self, state: &TaskState) -> Option<&Rule> {
        self.rules.iter().find(|r| (r.condition)(state))
    }

    pub fn decide(&self, state: &TaskState) -> Action {
        self.matching_rule(state)
            .map(|r| r.action)
            .unwrap_or(Action::Stop)
    }
}

impl Default for RuleBasedPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for RuleBasedPolicy {
    fn select_next(&mut self, state: &TaskState) -> Action {
        self.decide(state)
    }

    fn mode(&self) -> PolicyMode {
        PolicyMode::Rule
    }
}
