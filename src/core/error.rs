//! Error type shared by the path resolver, the surface and the runtime entry points.
//!
//! Inside a cascade these errors never escape: the engine logs them and skips
//! the offending update so the rest of the cascade still runs.

/// Everything that can go wrong while resolving names or touching the surface.
#[derive(Debug, thiserror::Error)]
pub enum WeftError {
    #[error("variable not found: {0}")]
    MissingVariable(String),

    #[error("instance not found: {0}")]
    MissingInstance(String),

    #[error("render target not found: {target}:{instance}")]
    MissingNode { target: String, instance: String },

    #[error("cannot index `{segment}` of `{name}`: value is not a structure")]
    NotStructural { name: String, segment: String },

    #[error("field `{segment}` missing in `{name}`")]
    MissingField { name: String, segment: String },

    #[error("`{0}` is not a list template")]
    NotTemplate(String),

    #[error("malformed value for `{name}`: {reason}")]
    Malformed { name: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WeftError>;
