use crate::output::print_json;
use anyhow::Context;
use packops_core::{paths, pipeline::run_pipeline};
use std::path::Path;

pub fn run(root: &Path, slug: &str, json: bool) -> anyhow::Result<()> {
    paths::validate_slug(slug)?;
    let config = super::load_config(root)?;
    let env = super::stage_env(root, &config)?;

    let report = run_pipeline(&env, slug).with_context(|| format!("pipeline failed for '{slug}'"))?;

    if json {
        return print_json(&report);
    }

    let ctx = &report.context;
    let stages: Vec<&str> = report.nodes.iter().map(|n| n.as_str()).collect();
    let score = |s: Option<u8>| s.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    println!("Pack:       {slug}");
    println!("Run:        {}", ctx.run_id);
    println!("Stages:     {}", stages.join(" -> "));
    println!(
        "Scores:     viability={} data={} icp={}",
        score(ctx.scores.viability),
        score(ctx.scores.data_availability),
        score(ctx.scores.icp_clarity)
    );
    if let Some(gate) = ctx.gate.validation {
        println!("Validation: {gate}");
    }
    if let Some(gate) = ctx.gate.scoring {
        println!("Scoring:    {gate}");
    }
    if let Some(ref report_path) = ctx.artifacts.deep_dive_report_path {
        println!("Report:     {report_path}");
    }
    println!("Tokens:     {}", ctx.resources_used);
    println!("State:      {}", report.run_state_path);
    Ok(())
}
