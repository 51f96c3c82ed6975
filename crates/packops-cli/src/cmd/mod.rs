pub mod batch;
pub mod init;
pub mod next;
pub mod orchestrate;
pub mod run_pack;
pub mod train;

use anyhow::Context;
use packops_core::{
    backend::OpenAiBackend,
    config::{Config, WarnLevel},
    pipeline::StageEnv,
    store::JsonCatalog,
};
use std::path::Path;
use std::sync::Arc;

/// Load the config and surface its warnings. Error-level findings abort.
pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    let config = Config::load(root).context("failed to load config")?;
    let mut errors = Vec::new();
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            WarnLevel::Error => errors.push(w.message),
        }
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }
    Ok(config)
}

pub fn open_catalog(root: &Path, config: &Config) -> Arc<JsonCatalog> {
    Arc::new(JsonCatalog::new(config.catalog_path(root)))
}

/// Everything a stage needs: the catalog, the configured backend and the root.
pub fn stage_env(root: &Path, config: &Config) -> anyhow::Result<StageEnv> {
    let backend =
        OpenAiBackend::from_env(&config.backend).context("failed to configure the generation backend")?;
    Ok(StageEnv {
        store: open_catalog(root, config),
        backend: Arc::new(backend),
        root: root.to_path_buf(),
        research_template: config.research_template_path(root),
    })
}
