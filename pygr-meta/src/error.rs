use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("Invalid recipe: {0}")]
    RecipeInvalid(String),

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("No recipe found for '{0}'")]
    NoRecipe(String),

    #[error("No version of '{name}' satisfies '{constraint}'")]
    NoMatchingVersion { name: String, constraint: String },

    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    #[error("Incompatible requirement: '{name}' is selected at {selected} but '{constraint}' is required")]
    IncompatibleRequirement {
        name: String,
        selected: String,
        constraint: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
