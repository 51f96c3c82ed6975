use crate::output::{print_json, print_table};
use anyhow::Context;
use packops_core::{
    orchestrator::{RunStatus, RunSummary},
    paths,
    policy::{make_policy, PolicyMode},
    store::RecordStore,
};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct BatchReport {
    runs: usize,
    successes: usize,
    failures: usize,
    mean_reward: f64,
    summaries: Vec<RunSummary>,
}

pub fn run(
    root: &Path,
    count: usize,
    slug: Option<&str>,
    mode: PolicyMode,
    max_steps: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let slugs = match slug {
        Some(s) => {
            paths::validate_slug(s)?;
            vec![s.to_string()]
        }
        None => super::open_catalog(root, &config)
            .slugs()
            .context("failed to list catalog")?,
    };
    if slugs.is_empty() {
        anyhow::bail!("catalog has no work items");
    }

    let orchestrator = super::orchestrate::build(root, &config, max_steps)?;
    let mut policy = make_policy(mode, &paths::weights_path(root), &config.policy);

    let mut summaries = Vec::with_capacity(count);
    for slug in slugs.iter().cycle().take(count) {
        let summary = orchestrator
            .run(slug, policy.as_mut())
            .with_context(|| format!("orchestration failed for '{slug}'"))?;
        summaries.push(summary);
    }

    let successes = summaries.iter().filter(|s| s.success).count();
    let failures = summaries
        .iter()
        .filter(|s| s.status == RunStatus::Failed)
        .count();
    let mean_reward = if summaries.is_empty() {
        0.0
    } else {
        summaries.iter().map(|s| s.episode_reward).sum::<f64>() / summaries.len() as f64
    };

    if json {
        return print_json(&BatchReport {
            runs: summaries.len(),
            successes,
            failures,
            mean_reward,
            summaries,
        });
    }

    let rows = summaries
        .iter()
        .map(|s| {
            vec![
                s.work_item_id.clone(),
                s.steps_taken.to_string(),
                s.final_state.current_stage.clone(),
                format!("{:.4}", s.episode_reward),
                if s.success { "yes" } else { "no" }.to_string(),
                s.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["PACK", "STEPS", "STAGE", "REWARD", "SUCCESS", "ERROR"], rows);
    println!(
        "\n{} runs, {} succeeded, {} failed, mean reward {:.4}",
        summaries.len(),
        successes,
        failures,
        mean_reward
    );
    Ok(())
}
