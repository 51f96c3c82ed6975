use crate::output::print_json;
use anyhow::Context;
use packops_core::{
    paths,
    policy::{bucket_key, make_policy, Policy, PolicyMode},
    run_context::RunContext,
    store::RecordStore,
    task_state::to_task_state,
};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Preview {
    slug: String,
    policy: PolicyMode,
    stage: String,
    has_research: bool,
    has_icp: bool,
    gates_passed: Vec<String>,
    bucket: String,
    action: String,
}

pub fn run(root: &Path, slug: &str, mode: PolicyMode, json: bool) -> anyhow::Result<()> {
    paths::validate_slug(slug)?;
    let config = super::load_config(root)?;
    let record = super::open_catalog(root, &config)
        .get(slug)
        .with_context(|| format!("work item '{slug}' not found"))?;

    let state = to_task_state(&record, &RunContext::new(slug));
    let mut policy = make_policy(mode, &paths::weights_path(root), &config.policy);
    let action = policy.select_next(&state);

    let preview = Preview {
        slug: slug.to_string(),
        policy: mode,
        stage: state.current_stage.clone(),
        has_research: state.has_research,
        has_icp: state.has_icp,
        gates_passed: state.gates_passed.iter().cloned().collect(),
        bucket: bucket_key(&state),
        action: action.to_string(),
    };

    if json {
        return print_json(&preview);
    }
    println!("Pack:     {}", preview.slug);
    println!("Policy:   {}", preview.policy);
    println!("Stage:    {}", preview.stage);
    println!("Research: {}", if preview.has_research { "yes" } else { "no" });
    println!("ICP:      {}", if preview.has_icp { "yes" } else { "no" });
    println!("Gates:    {}", preview.gates_passed.join(", "));
    println!("Bucket:   {}", preview.bucket);
    println!("Action:   {}", preview.action);
    Ok(())
}
