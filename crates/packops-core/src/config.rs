use crate::error::{PackopsError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// Settings for the OpenAI-compatible generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_timeout_seconds() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

// ---------------------------------------------------------------------------
// RewardConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default = "default_success_weight")]
    pub success_weight: f64,
    #[serde(default = "default_token_penalty")]
    pub token_penalty: f64,
    #[serde(default = "default_step_penalty")]
    pub step_penalty: f64,
    #[serde(default = "default_gate_bonus")]
    pub gate_bonus: f64,
    #[serde(default = "default_research_bonus")]
    pub research_bonus: f64,
    #[serde(default = "default_icp_bonus")]
    pub icp_bonus: f64,
    #[serde(default = "default_sale_bonus")]
    pub sale_bonus: f64,
    #[serde(default = "default_max_sales")]
    pub max_sales: u32,
    #[serde(default = "default_pipeline_bonus")]
    pub pipeline_bonus: f64,
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty: f64,
}

fn default_success_weight() -> f64 {
    1.0
}

fn default_token_penalty() -> f64 {
    0.0001
}

fn default_step_penalty() -> f64 {
    0.01
}

fn default_gate_bonus() -> f64 {
    0.1
}

fn default_research_bonus() -> f64 {
    0.2
}

fn default_icp_bonus() -> f64 {
    0.1
}

fn default_sale_bonus() -> f64 {
    0.5
}

fn default_max_sales() -> u32 {
    5
}

fn default_pipeline_bonus() -> f64 {
    0.1
}

fn default_failure_penalty() -> f64 {
    -1.0
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            success_weight: default_success_weight(),
            token_penalty: default_token_penalty(),
            step_penalty: default_step_penalty(),
            gate_bonus: default_gate_bonus(),
            research_bonus: default_research_bonus(),
            icp_bonus: default_icp_bonus(),
            sale_bonus: default_sale_bonus(),
            max_sales: default_max_sales(),
            pipeline_bonus: default_pipeline_bonus(),
            failure_penalty: default_failure_penalty(),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyConfig / TrainingConfig / LoopConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Sample from a softmax over bucket weights instead of taking the argmax.
    #[serde(default)]
    pub use_softmax: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Newest completed runs considered per training pass.
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_max_runs() -> usize {
    1000
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            max_runs: default_max_runs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_max_steps() -> u32 {
    20
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Catalog file, relative to the project root unless absolute.
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default, rename = "loop")]
    pub run_loop: LoopConfig,
    /// Optional markdown template appended to the deep-research prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_template: Option<PathBuf>,
}

fn default_version() -> u32 {
    1
}

fn default_catalog() -> PathBuf {
    PathBuf::from(paths::DEFAULT_CATALOG)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            catalog: default_catalog(),
            backend: BackendConfig::default(),
            reward: RewardConfig::default(),
            policy: PolicyConfig::default(),
            training: TrainingConfig::default(),
            run_loop: LoopConfig::default(),
            research_template: None,
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PackopsError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn catalog_path(&self, root: &Path) -> PathBuf {
        root.join(&self.catalog)
    }

    pub fn research_template_path(&self, root: &Path) -> Option<PathBuf> {
        self.research_template.as_ref().map(|p| root.join(p))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !(0.0..=2.0).contains(&self.backend.temperature) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "backend.temperature={} is outside the usual 0.0..=2.0 range",
                    self.backend.temperature
                ),
            });
        }

        if self.backend.timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "backend.timeout_seconds must be greater than zero".to_string(),
            });
        }

        if self.training.learning_rate <= 0.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "training.learning_rate={} must be positive",
                    self.training.learning_rate
                ),
            });
        }

        if self.reward.failure_penalty > 0.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "reward.failure_penalty={} is positive; failed runs will be reinforced",
                    self.reward.failure_penalty
                ),
            });
        }

        if self.run_loop.max_steps == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "loop.max_steps=0 ends every run before its first action".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
