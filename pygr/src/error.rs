use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] pygr_cache::Error),

    #[error(transparent)]
    Meta(#[from] pygr_meta::Error),

    #[error("Cannot resolve ref '{reference}' in {repo}")]
    UnresolvableRef { repo: String, reference: String },

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Unknown generation {generation} for profile '{profile}'")]
    UnknownGeneration { profile: String, generation: u64 },

    #[error("Invalid package spec '{0}'")]
    InvalidSpec(String),

    #[error("Distro package operation failed: {0}")]
    Distro(String),

    #[error("'{0}' not found in PATH")]
    ToolNotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
