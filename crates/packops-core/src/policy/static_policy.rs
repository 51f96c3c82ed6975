use super::{Policy, PolicyMode};
use crate::action::Action;
use crate::task_state::TaskState;
use crate::types::Stage;

/// Fixed stage → action lookup, kept as a baseline for comparing policies.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPolicy;

impl Policy for StaticPolicy {
    fn select_next(&mut self, state: &TaskState) -> Action {
        match Stage::parse(&state.current_stage) {
            Some(Stage::Idea) => Action::Intake,
            Some(Stage::Validation | Stage::Scoring) => Action::Evaluate,
            Some(Stage::DeepDive) if !state.has_research => Action::Research,
            Some(Stage::DeepDive) => Action::Stop,
            Some(Stage::Build) => Action::BuildCode,
            Some(Stage::Published) | None => Action::Stop,
        }
    }

    fn mode(&self) -> PolicyMode {
        PolicyMode::Static
    }
}
