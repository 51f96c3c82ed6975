use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Lifecycle stage of a work item, as stored in the record's `currentStage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idea,
    Validation,
    Scoring,
    DeepDive,
    Build,
    Published,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Idea,
            Stage::Validation,
            Stage::Scoring,
            Stage::DeepDive,
            Stage::Build,
            Stage::Published,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idea => "idea",
            Stage::Validation => "validation",
            Stage::Scoring => "scoring",
            Stage::DeepDive => "deep_dive",
            Stage::Build => "build",
            Stage::Published => "published",
        }
    }

    /// Lenient parse for stage names read from records; unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Stage> {
        Stage::all().iter().copied().find(|st| st.as_str() == s)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StageStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
        }
    }
}

// ---------------------------------------------------------------------------
// Gate outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationGate {
    Pass,
    Fail,
}

impl ValidationGate {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationGate::Pass => "pass",
            ValidationGate::Fail => "fail",
        }
    }
}

impl fmt::Display for ValidationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tiered outcome of the deterministic scoring gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringGate {
    Pass,
    SoftFailRetry,
    HardFail,
}

impl ScoringGate {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoringGate::Pass => "pass",
            ScoringGate::SoftFailRetry => "soft_fail_retry",
            ScoringGate::HardFail => "hard_fail",
        }
    }

    pub fn passed(self) -> bool {
        self == ScoringGate::Pass
    }
}

impl fmt::Display for ScoringGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LeadStage
// ---------------------------------------------------------------------------

/// Sales-pipeline stage recorded for a work item by the external CRM feed.
///
/// Ordered: prospect < engaged < qualified < proposal = purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    Prospect,
    Engaged,
    Qualified,
    Proposal,
    Purchased,
}

impl LeadStage {
    pub fn rank(self) -> u8 {
        match self {
            LeadStage::Prospect => 0,
            LeadStage::Engaged => 1,
            LeadStage::Qualified => 2,
            LeadStage::Proposal | LeadStage::Purchased => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStage::Prospect => "prospect",
            LeadStage::Engaged => "engaged",
            LeadStage::Qualified => "qualified",
            LeadStage::Proposal => "proposal",
            LeadStage::Purchased => "purchased",
        }
    }
}

impl std::str::FromStr for LeadStage {
    type Err = crate::error::PackopsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prospect" => Ok(LeadStage::Prospect),
            "engaged" => Ok(LeadStage::Engaged),
            "qualified" => Ok(LeadStage::Qualified),
            "proposal" => Ok(LeadStage::Proposal),
            "purchased" => Ok(LeadStage::Purchased),
            other => Err(crate::error::PackopsError::UnknownPipelineStage(
                other.to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
