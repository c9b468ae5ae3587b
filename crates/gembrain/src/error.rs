//! Brain error types.
//!
//! All subsystems below the [`crate::brain::Brain`] façade surface errors
//! through [`BrainError`].  Transport-level failures use the separate
//! [`crate::transport::SendError`] type because they carry a recovery policy
//! (cooldown, fallback, retry) rather than a plain reason.  Nothing from
//! either type ever escapes `generate_response` — the façade converts every
//! failure into a returned string.

/// Unified error type for the invocation layer.
#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    // -- Transport construction ---------------------------------------------
    /// The API key is missing for the direct transport.
    #[error("missing api key for the direct transport")]
    MissingApiKey,

    // -- Skill registry ------------------------------------------------------
    /// A requested skill does not exist in the registry.  Handler *failures*
    /// never get a variant: the registry converts them into result values
    /// visible to the model.
    #[error("unknown skill: {name}")]
    UnknownSkill { name: String },

    // -- Configuration -------------------------------------------------------
    /// The model hierarchy is empty.
    #[error("model hierarchy must contain at least one model")]
    EmptyHierarchy,

    /// Configuration loading or validation failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Upstream ------------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Building the HTTP client failed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BrainError>;
