//! Policies decide the next action from a [`TaskState`].

pub mod rl;
pub mod rule_based;
pub mod static_policy;

pub use rl::{bucket_key, RlPolicy, WeightTable};
pub use rule_based::RuleBasedPolicy;
pub use static_policy::StaticPolicy;

use crate::action::Action;
use crate::config::PolicyConfig;
use crate::error::PackopsError;
use crate::task_state::TaskState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub trait Policy {
    /// Static and rule-based policies are deterministic; the RL policy is
    /// deterministic unless softmax sampling is enabled.
    fn select_next(&mut self, state: &TaskState) -> Action;

    fn mode(&self) -> PolicyMode;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    Static,
    Rule,
    Rl,
}

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyMode::Static => "static",
            PolicyMode::Rule => "rule",
            PolicyMode::Rl => "rl",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyMode {
    type Err = PackopsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "static" => Ok(PolicyMode::Static),
            "rule" | "rule_based" | "rule-based" => Ok(PolicyMode::Rule),
            "rl" => Ok(PolicyMode::Rl),
            other => Err(PackopsError::UnknownPolicyMode(other.to_string())),
        }
    }
}

/// Build the policy for `mode`. The RL policy loads its weight table from
/// `weights_path`.
pub fn make_policy(mode: PolicyMode, weights_path: &Path, settings: &PolicyConfig) -> Box<dyn Policy> {
    match mode {
        PolicyMode::Static => Box::new(StaticPolicy),
        PolicyMode::Rule => Box::new(RuleBasedPolicy::new()),
        PolicyMode::Rl => Box::new(RlPolicy::load(weights_path, settings)),
    }
}
