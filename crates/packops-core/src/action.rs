//! The closed vocabulary of control actions a policy may choose.
//!
//! Action names are persisted in step logs and in the RL weight table, so the
//! serialized form (`as_str`) is a storage format. Renaming or removing a
//! variant orphans historical data; readers report unknown names as a
//! migration warning instead of remapping them.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Intake,
    Research,
    IcpAnalysis,
    Evaluate,
    DesignSpec,
    BuildCode,
    Test,
    Deploy,
    Publish,
    Stop,
}

impl Action {
    /// Every action in canonical order. Argmax tie-breaks follow this order.
    pub fn all() -> &'static [Action] {
        &[
            Action::Intake,
            Action::Research,
            Action::IcpAnalysis,
            Action::Evaluate,
            Action::DesignSpec,
            Action::BuildCode,
            Action::Test,
            Action::Deploy,
            Action::Publish,
            Action::Stop,
        ]
    }

    pub fn is_terminal(self) -> bool {
        self == Action::Stop
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Intake => "INTAKE",
            Action::Research => "RESEARCH",
            Action::IcpAnalysis => "ICP_ANALYSIS",
            Action::Evaluate => "EVALUATE",
            Action::DesignSpec => "DESIGN_SPEC",
            Action::BuildCode => "BUILD_CODE",
            Action::Test => "TEST",
            Action::Deploy => "DEPLOY",
            Action::Publish => "PUBLISH",
            Action::Stop => "STOP",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = crate::error::PackopsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::all()
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| crate::error::PackopsError::UnknownAction(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stop_is_terminal() {
        let terminal: Vec<_> = Action::all().iter().filter(|a| a.is_terminal()).collect();
        assert_eq!(terminal, vec![&Action::Stop]);
    }

    #[test]
    fn serde_name_matches_as_str() {
        for &action in Action::all() {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            let parsed: Action = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("LAUNCH_ROCKET".parse::<Action>().is_err());
        assert!("research".parse::<Action>().is_err());
    }
}
