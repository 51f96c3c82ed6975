use anyhow::Context;
use packops_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing packops in: {}", root.display());

    let dirs = [
        paths::PACKOPS_DIR,
        paths::LOGS_DIR,
        paths::POLICY_DIR,
        paths::RUNS_DIR,
        paths::RESEARCH_DIR,
        paths::OUTCOMES_DIR,
    ];
    for dir in dirs {
        let p = root.join(dir);
        std::fs::create_dir_all(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load config")?
    } else {
        let cfg = Config::default();
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let catalog = config.catalog_path(root);
    let created = io::write_if_missing(&catalog, b"[]\n")
        .with_context(|| format!("failed to create {}", catalog.display()))?;
    let label = config.catalog.display();
    if created {
        println!("  created: {label}");
    } else {
        println!("  exists:  {label}");
    }

    println!("\npackops initialized. Next: packops run-pack <slug>");
    Ok(())
}
