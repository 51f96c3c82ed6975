use crate::output::print_json;
use anyhow::Context;
use packops_core::trainer::Trainer;
use std::path::Path;

pub fn run(
    root: &Path,
    learning_rate: Option<f64>,
    max_runs: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let mut trainer = Trainer::new(root, &config.training);
    if let Some(lr) = learning_rate {
        anyhow::ensure!(lr > 0.0, "--learning-rate must be positive");
        trainer.learning_rate = lr;
    }
    if let Some(n) = max_runs {
        trainer.max_runs = n;
    }

    let report = trainer.train().context("training failed")?;

    if json {
        return print_json(&report);
    }
    if report.runs_processed == 0 {
        println!(
            "No new runs to train on ({} already trained).",
            report.runs_skipped
        );
        return Ok(());
    }
    println!("Runs processed:  {}", report.runs_processed);
    println!("Runs skipped:    {}", report.runs_skipped);
    println!("Mean reward:     {:.4}", report.avg_reward);
    println!("Buckets updated: {}", report.updated_buckets);
    Ok(())
}
