//! The dynamic loop: a policy picks one action at a time until it stops, the
//! step budget runs out, or an action fails.

use crate::action::Action;
use crate::config::RewardConfig;
use crate::error::Result;
use crate::executor::StepExecutor;
use crate::outcome::OutcomeFeeds;
use crate::policy::{Policy, PolicyMode};
use crate::record::{merge_owned, WorkItem};
use crate::reward;
use crate::run_context::RunContext;
use crate::store::RecordStore;
use crate::task_state::{apply_result, to_task_state, TaskState};
use crate::telemetry::{RunEnd, RunLogger, RunStart, StepRecord};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub work_item_id: String,
    pub policy_mode: PolicyMode,
    /// Every selected action in order, including a final STOP.
    pub actions: Vec<Action>,
    pub steps_taken: u32,
    pub resources_used: u64,
    pub final_state: TaskState,
    pub episode_reward: f64,
    pub success: bool,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    executor: Box<dyn StepExecutor>,
    logger: RunLogger,
    outcomes: OutcomeFeeds,
    reward: RewardConfig,
    max_steps: u32,
}

impl Orchestrator {
    pub fn new(
        root: &Path,
        store: Arc<dyn RecordStore>,
        executor: Box<dyn StepExecutor>,
        reward: RewardConfig,
        max_steps: u32,
    ) -> Self {
        Self {
            store,
            executor,
            logger: RunLogger::new(root),
            outcomes: OutcomeFeeds::new(root),
            reward,
            max_steps,
        }
    }

    /// Run one episode for `slug`. Only an unknown slug is an error; every
    /// started run ends in a summary, failed or not.
    pub fn run(&self, slug: &str, policy: &mut dyn Policy) -> Result<RunSummary> {
        let mut record = self.store.get(slug)?;
        let mut ctx = RunContext::new(slug);
        let mut state = to_task_state(&record, &ctx);
        let mode = policy.mode();

        info!(slug, run_id = %ctx.run_id, policy = %mode, max_steps = self.max_steps, "run started");
        self.emit(self.logger.log_run_start(RunStart {
            run_id: ctx.run_id.clone(),
            work_item_id: slug.to_string(),
            policy_mode: mode,
            timestamp: Utc::now(),
            metadata: Map::from_iter([("max_steps".to_string(), Value::from(self.max_steps))]),
        }));

        let mut actions = Vec::new();
        let mut failure = None;
        for _ in 0..self.max_steps {
            let action = policy.select_next(&state);
            actions.push(action);
            if action.is_terminal() {
                break;
            }

            let step_index = state.steps_taken;
            match self.step(slug, action, &record, &mut ctx) {
                Ok((updated, cost)) => {
                    let next = apply_result(&state, &updated, &ctx, cost);
                    let local = reward::step_reward(&self.reward, &state, &next, cost);
                    info!(slug, %action, cost, reward = local, stage = %next.current_stage, "step done");
                    self.log_step(&ctx, step_index, action, &state, &next, cost, local);
                    record = updated;
                    state = next;
                }
                Err(e) => {
                    warn!(slug, %action, error = %e, "step failed");
                    self.log_step(&ctx, step_index, action, &state, &state, 0, self.reward.failure_penalty);
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        let status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Done
        };
        let (episode_reward, success) = match status {
            RunStatus::Failed => (self.reward.failure_penalty, false),
            RunStatus::Done => (
                reward::episode_reward(&self.reward, &state, &self.outcomes.lookup(slug)),
                reward::is_success(&state),
            ),
        };

        self.emit(self.logger.log_run_end(RunEnd {
            run_id: ctx.run_id.clone(),
            work_item_id: slug.to_string(),
            final_reward: episode_reward,
            success,
            steps_taken: state.steps_taken,
            error: failure.clone(),
            timestamp: Utc::now(),
            metadata: Map::from_iter([
                ("policy_mode".to_string(), Value::from(mode.as_str())),
                ("final_stage".to_string(), Value::from(state.current_stage.clone())),
            ]),
        }));
        info!(
            slug,
            run_id = %ctx.run_id,
            steps = state.steps_taken,
            reward = episode_reward,
            success,
            "run finished"
        );

        Ok(RunSummary {
            run_id: ctx.run_id,
            work_item_id: slug.to_string(),
            policy_mode: mode,
            actions,
            steps_taken: state.steps_taken,
            resources_used: state.resources_used,
            final_state: state,
            episode_reward,
            success,
            status,
            error: failure,
        })
    }

    /// Execute `action` and merge what it changed into the store. Returns
    /// the stored record after the merge and the tokens spent.
    fn step(
        &self,
        slug: &str,
        action: Action,
        record: &WorkItem,
        ctx: &mut RunContext,
    ) -> Result<(WorkItem, u64)> {
        let out = self.executor.execute(action, record, ctx)?;
        ctx.record_step(out.cost);
        if out.record == *record {
            return Ok((out.record, out.cost));
        }
        let stored = self
            .store
            .update(slug, &mut |stored| Ok(merge_owned(&stored, record, &out.record)))?;
        Ok((stored, out.cost))
    }

    #[allow(clippy::too_many_arguments)]
    fn log_step(
        &self,
        ctx: &RunContext,
        step_index: u32,
        action: Action,
        prior: &TaskState,
        next: &TaskState,
        cost: u64,
        local_reward: f64,
    ) {
        self.emit(self.logger.log_step(StepRecord {
            run_id: ctx.run_id.clone(),
            step_index,
            action: action.as_str().to_string(),
            prior_state: Some(prior.snapshot()),
            state: next.snapshot(),
            tokens_used: cost,
            local_reward,
            timestamp: Utc::now(),
        }));
    }

    /// Telemetry is best-effort; a failed append never fails the run.
    fn emit(&self, result: Result<()>) {
        if let Err(e) = result {
            warn!(error = %e, "telemetry write failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackopsError;
    use crate::executor::StageExecutor;
    use crate::pipeline::StageEnv;
    use crate::policy::{RuleBasedPolicy, StaticPolicy};
    use crate::store::MemoryCatalog;
    use crate::telemetry::RunEvent;
    use crate::testing::{sample_record, ScriptedBackend};
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir, store: Arc<MemoryCatalog>, backend: ScriptedBackend, max_steps: u32) -> Orchestrator {
        let env = StageEnv {
            store: store.clone(),
            backend: Arc::new(backend),
            root: dir.path().to_path_buf(),
            research_template: None,
        };
        Orchestrator::new(
            dir.path(),
            store,
            Box::new(StageExecutor::new(env)),
            RewardConfig::default(),
            max_steps,
        )
    }

    fn full_script() -> ScriptedBackend {
        ScriptedBackend::new()
            .reply("# Executive Summary\nPayroll teams file late.\n", 6000)
            .reply("Payroll managers at firms with 10-50 staff.", 500)
            .assessment(80, 70, 75, 1500)
    }

    #[test]
    fn rule_policy_runs_research_icp_evaluate_in_order() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCatalog::new(vec![sample_record("tax-assist")]));
        let orch = orchestrator(&dir, store.clone(), full_script(), 20);

        let summary = orch.run("tax-assist", &mut RuleBasedPolicy::new()).unwrap();
        assert_eq!(
            summary.actions,
            vec![
                Action::Research,
                Action::IcpAnalysis,
                Action::Evaluate,
                Action::BuildCode,
                Action::Test,
                Action::Stop
            ]
        );
        assert_eq!(summary.status, RunStatus::Done);
        assert_eq!(summary.steps_taken, 5);
        assert_eq!(summary.resources_used, 8000);
        assert!(summary.success);
        assert!(summary.final_state.gates_passed.contains("scoring"));

        let stored = store.get("tax-assist").unwrap();
        assert!(stored.research_completed());
        assert!(stored.icp_summary().is_some());
        assert_eq!(stored.stage_status("build"), Some("completed"));
        assert!(stored.bool_at(&["metadata", "tests_run"]));
        assert_eq!(stored.current_stage(), "build");
    }

    #[test]
    fn telemetry_covers_every_executed_step() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCatalog::new(vec![sample_record("tax-assist")]));
        let orch = orchestrator(&dir, store, full_script(), 20);
        let summary = orch.run("tax-assist", &mut RuleBasedPolicy::new()).unwrap();

        let logs = RunLogger::new(dir.path()).load().unwrap();
        assert_eq!(logs.steps.len(), 5);
        assert_eq!(logs.steps[0].action, "RESEARCH");
        assert_eq!(logs.steps[0].prior_state.as_ref().map(|s| s.has_research), Some(false));
        assert!(logs.steps[0].state.has_research);
        assert_eq!(
            logs.steps.iter().map(|s| s.step_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(matches!(&logs.runs[0], RunEvent::RunStart(s) if s.run_id == summary.run_id));
        let end = logs.run_ends().next().unwrap();
        assert_eq!(end.final_reward, summary.episode_reward);
        assert_eq!(end.steps_taken, 5);
    }

    #[test]
    fn failing_action_ends_run_with_penalty() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCatalog::new(vec![sample_record("tax-assist")]));
        let backend = ScriptedBackend::new().failure("upstream 503");
        let orch = orchestrator(&dir, store, backend, 20);

        let summary = orch.run("tax-assist", &mut RuleBasedPolicy::new()).unwrap();
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.actions, vec![Action::Research]);
        assert_eq!(summary.steps_taken, 0);
        assert_eq!(summary.episode_reward, -1.0);
        assert!(!summary.success);
        assert!(summary.error.as_deref().unwrap_or_default().contains("upstream 503"));

        let logs = RunLogger::new(dir.path()).load().unwrap();
        assert_eq!(logs.steps.len(), 1);
        assert_eq!(logs.steps[0].local_reward, -1.0);
    }

    #[test]
    fn unknown_slug_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCatalog::new(vec![sample_record("tax-assist")]));
        let orch = orchestrator(&dir, store, ScriptedBackend::new(), 20);
        let err = orch.run("nope", &mut RuleBasedPolicy::new()).unwrap_err();
        assert!(matches!(err, PackopsError::WorkItemNotFound(_)));
        assert!(!crate::paths::runs_log_path(dir.path()).exists());
    }

    #[test]
    fn budget_exhaustion_is_done() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCatalog::new(vec![sample_record("tax-assist")]));
        let orch = orchestrator(&dir, store, full_script(), 2);

        let summary = orch.run("tax-assist", &mut RuleBasedPolicy::new()).unwrap();
        assert_eq!(summary.status, RunStatus::Done);
        assert_eq!(summary.actions, vec![Action::Research, Action::IcpAnalysis]);
        assert_eq!(summary.steps_taken, 2);
        // research and ICP in hand
        assert!(summary.success);
    }

    #[test]
    fn static_policy_walks_the_stage_ladder() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCatalog::new(vec![sample_record("tax-assist")]));
        let backend = ScriptedBackend::new()
            .assessment(80, 70, 75, 1500)
            .reply("# Executive Summary\nWorth building.\n", 6000);
        let orch = orchestrator(&dir, store, backend, 20);

        let summary = orch.run("tax-assist", &mut StaticPolicy).unwrap();
        assert_eq!(
            summary.actions,
            vec![Action::Intake, Action::Evaluate, Action::Research, Action::Stop]
        );
        assert_eq!(summary.final_state.current_stage, "deep_dive");
    }
}
