//! Reward shaping for the dynamic loop. Every function here is pure.

use crate::config::RewardConfig;
use crate::outcome::Outcome;
use crate::task_state::TaskState;
use crate::types::{LeadStage, Stage};

/// Gates needed for a run to count as a partial success.
pub const SUCCESS_GATES: usize = 3;

/// Reward for one transition `prev → next` that cost `cost` tokens.
pub fn step_reward(cfg: &RewardConfig, prev: &TaskState, next: &TaskState, cost: u64) -> f64 {
    let mut reward = -(cfg.token_penalty * cost as f64) - cfg.step_penalty;
    if next.has_research && !prev.has_research {
        reward += cfg.research_bonus;
    }
    if next.has_icp && !prev.has_icp {
        reward += cfg.icp_bonus;
    }
    let new_gates = next.gates_passed.difference(&prev.gates_passed).count();
    reward + cfg.gate_bonus * new_gates as f64
}

/// Bonus for the most advanced sales-pipeline stage: one multiple of
/// `pipeline_bonus` at qualified, two at proposal or purchased.
pub fn pipeline_tier_bonus(cfg: &RewardConfig, stage: Option<LeadStage>) -> f64 {
    let tier = stage.map(|s| s.rank().saturating_sub(1)).unwrap_or(0);
    cfg.pipeline_bonus * f64::from(tier)
}

/// Return for a whole episode ending in `last`.
pub fn episode_reward(cfg: &RewardConfig, last: &TaskState, outcome: &Outcome) -> f64 {
    let gates = last.gates_passed.len();
    let completion = if last.current_stage == Stage::Published.as_str() {
        cfg.success_weight
    } else if gates >= SUCCESS_GATES {
        cfg.success_weight * 0.5
    } else {
        0.0
    };
    let sales = outcome.sales.min(cfg.max_sales);

    completion - cfg.token_penalty * last.resources_used as f64
        - cfg.step_penalty * f64::from(last.steps_taken)
        + cfg.gate_bonus * gates as f64
        + cfg.sale_bonus * f64::from(sales)
        + pipeline_tier_bonus(cfg, outcome.pipeline_stage)
}

/// Published, or at least three gates, or both research and ICP in hand.
pub fn is_success(last: &TaskState) -> bool {
    last.current_stage == Stage::Published.as_str()
        || last.gates_passed.len() >= SUCCESS_GATES
        || (last.has_research && last.has_icp)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn state(stage: &str, research: bool, icp: bool, gates: &[&str], steps: u32, cost: u64) -> TaskState {
        TaskState {
            current_stage: stage.to_string(),
            has_research: research,
            has_icp: icp,
            gates_passed: gates.iter().map(|g| g.to_string()).collect(),
            steps_taken: steps,
            resources_used: cost,
            ..TaskState::default()
        }
    }

    #[test]
    fn step_reward_bonuses_and_penalties() {
        let cfg = RewardConfig::default();
        let prev = state("idea", false, false, &["idea"], 0, 0);
        let next = state("deep_dive", true, false, &["idea", "deep_dive"], 1, 8000);
        // -0.8 tokens, -0.01 step, +0.2 research, +0.1 one new gate
        let r = step_reward(&cfg, &prev, &next, 8000);
        assert!((r - (-0.8 - 0.01 + 0.2 + 0.1)).abs() < EPS);
    }

    #[test]
    fn step_reward_is_pure() {
        let cfg = RewardConfig::default();
        let prev = state("idea", false, false, &[], 0, 0);
        let next = state("idea", false, true, &["validation"], 1, 1500);
        assert_eq!(
            step_reward(&cfg, &prev, &next, 1500),
            step_reward(&cfg, &prev, &next, 1500)
        );
    }

    #[test]
    fn no_bonus_for_already_held_milestones() {
        let cfg = RewardConfig::default();
        let prev = state("idea", true, true, &["idea"], 3, 0);
        let r = step_reward(&cfg, &prev, &prev.clone(), 0);
        assert!((r + cfg.step_penalty).abs() < EPS);
    }

    #[test]
    fn episode_reward_published() {
        let cfg = RewardConfig::default();
        let last = state("published", true, true, &["a", "b"], 10, 1000);
        let r = episode_reward(&cfg, &last, &Outcome::default());
        // 1.0 - 0.1 - 0.1 + 0.2
        assert!((r - 1.0).abs() < EPS);
    }

    #[test]
    fn episode_reward_partial_success_and_outcomes() {
        let cfg = RewardConfig::default();
        let last = state("deep_dive", true, true, &["a", "b", "c"], 0, 0);
        let outcome = Outcome {
            sales: 9,
            pipeline_stage: Some(LeadStage::Purchased),
        };
        let r = episode_reward(&cfg, &last, &outcome);
        // 0.5 + 0.3 gates + 0.5*5 capped sales + 0.2 tier
        assert!((r - (0.5 + 0.3 + 2.5 + 0.2)).abs() < EPS);
    }

    #[test]
    fn pipeline_tiers() {
        let cfg = RewardConfig::default();
        assert_eq!(pipeline_tier_bonus(&cfg, None), 0.0);
        assert_eq!(pipeline_tier_bonus(&cfg, Some(LeadStage::Prospect)), 0.0);
        assert_eq!(pipeline_tier_bonus(&cfg, Some(LeadStage::Engaged)), 0.0);
        assert!((pipeline_tier_bonus(&cfg, Some(LeadStage::Qualified)) - 0.1).abs() < EPS);
        assert!((pipeline_tier_bonus(&cfg, Some(LeadStage::Proposal)) - 0.2).abs() < EPS);
        assert!((pipeline_tier_bonus(&cfg, Some(LeadStage::Purchased)) - 0.2).abs() < EPS);
    }

    #[test]
    fn success_disjunction() {
        assert!(is_success(&state("published", false, false, &[], 1, 0)));
        assert!(is_success(&state("idea", false, false, &["a", "b", "c"], 1, 0)));
        assert!(is_success(&state("idea", true, true, &[], 1, 0)));
        assert!(!is_success(&state("idea", true, false, &["a", "b"], 1, 0)));
    }
}
