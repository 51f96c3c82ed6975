use crate::error::{PackopsError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PACKOPS_DIR: &str = ".packops";
pub const LOGS_DIR: &str = ".packops/logs";
pub const POLICY_DIR: &str = ".packops/policy";
pub const RUNS_DIR: &str = ".packops/runs";
pub const RESEARCH_DIR: &str = ".packops/research";
pub const OUTCOMES_DIR: &str = ".packops/outcomes";

pub const CONFIG_FILE: &str = ".packops/config.yaml";
pub const RUNS_LOG: &str = "runs.jsonl";
pub const STEPS_LOG: &str = "steps.jsonl";
pub const WEIGHTS_FILE: &str = "weights.json";
pub const WATERMARK_FILE: &str = "trained.json";
pub const SALES_FILE: &str = "sales.json";
pub const PIPELINE_FILE: &str = "pipeline.json";

pub const DEFAULT_CATALOG: &str = "pack-crm/data/packs.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn packops_dir(root: &Path) -> PathBuf {
    root.join(PACKOPS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn runs_log_path(root: &Path) -> PathBuf {
    root.join(LOGS_DIR).join(RUNS_LOG)
}

pub fn steps_log_path(root: &Path) -> PathBuf {
    root.join(LOGS_DIR).join(STEPS_LOG)
}

pub fn weights_path(root: &Path) -> PathBuf {
    root.join(POLICY_DIR).join(WEIGHTS_FILE)
}

pub fn watermark_path(root: &Path) -> PathBuf {
    root.join(POLICY_DIR).join(WATERMARK_FILE)
}

pub fn run_state_path(root: &Path, run_id: &str) -> PathBuf {
    root.join(RUNS_DIR).join(format!("{run_id}.json"))
}

pub fn research_report_path(root: &Path, slug: &str, run_id: &str) -> PathBuf {
    root.join(RESEARCH_DIR)
        .join(format!("{slug}-{run_id}-deep-dive.md"))
}

pub fn sales_path(root: &Path) -> PathBuf {
    root.join(OUTCOMES_DIR).join(SALES_FILE)
}

pub fn pipeline_path(root: &Path) -> PathBuf {
    root.join(OUTCOMES_DIR).join(PIPELINE_FILE)
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").expect("slug pattern is valid")
    })
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(PackopsError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
