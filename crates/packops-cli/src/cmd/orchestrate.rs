use crate::output::print_json;
use anyhow::Context;
use packops_core::{
    config::Config,
    executor::StageExecutor,
    orchestrator::{Orchestrator, RunStatus, RunSummary},
    paths,
    policy::{make_policy, PolicyMode},
};
use std::path::Path;

pub struct RunOptions {
    pub policy: PolicyMode,
    pub max_steps: Option<u32>,
    pub softmax: bool,
    pub seed: Option<u64>,
}

pub fn run(root: &Path, slug: &str, opts: RunOptions, json: bool) -> anyhow::Result<()> {
    paths::validate_slug(slug)?;
    let config = super::load_config(root)?;
    let orchestrator = build(root, &config, opts.max_steps)?;

    let mut settings = config.policy.clone();
    settings.use_softmax |= opts.softmax;
    if opts.seed.is_some() {
        settings.seed = opts.seed;
    }
    let mut policy = make_policy(opts.policy, &paths::weights_path(root), &settings);

    let summary = orchestrator
        .run(slug, policy.as_mut())
        .with_context(|| format!("orchestration failed for '{slug}'"))?;

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }

    match summary.status {
        RunStatus::Done => Ok(()),
        RunStatus::Failed => anyhow::bail!(
            "run {} failed: {}",
            summary.run_id,
            summary.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Orchestrator over the configured catalog and backend.
pub fn build(root: &Path, config: &Config, max_steps: Option<u32>) -> anyhow::Result<Orchestrator> {
    let env = super::stage_env(root, config)?;
    Ok(Orchestrator::new(
        root,
        env.store.clone(),
        Box::new(StageExecutor::new(env)),
        config.reward.clone(),
        max_steps.unwrap_or(config.run_loop.max_steps),
    ))
}

fn print_summary(s: &RunSummary) {
    let actions: Vec<&str> = s.actions.iter().map(|a| a.as_str()).collect();
    println!("Pack:     {}", s.work_item_id);
    println!("Run:      {}", s.run_id);
    println!("Policy:   {}", s.policy_mode);
    println!("Actions:  {}", actions.join(" -> "));
    println!("Steps:    {}", s.steps_taken);
    println!("Tokens:   {}", s.resources_used);
    println!("Stage:    {}", s.final_state.current_stage);
    println!("Reward:   {:.4}", s.episode_reward);
    println!("Success:  {}", if s.success { "yes" } else { "no" });
}
