use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackopsError {
    #[error("not initialized: run 'packops init'")]
    NotInitialized,

    #[error("work item not found: {0}")]
    WorkItemNotFound(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unknown policy mode '{0}': expected static, rule, or rl")]
    UnknownPolicyMode(String),

    #[error("unknown pipeline stage: {0}")]
    UnknownPipelineStage(String),

    #[error("catalog file not found: {}", .0.display())]
    CatalogMissing(std::path::PathBuf),

    #[error("malformed catalog: {0}")]
    MalformedCatalog(String),

    #[error("stage '{stage}' cannot run: {reason}")]
    StagePrecondition { stage: String, reason: String },

    #[error("generation backend error: {0}")]
    Backend(String),

    #[error("generation backend returned an unusable response: {0}")]
    BackendResponse(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PackopsError>;
