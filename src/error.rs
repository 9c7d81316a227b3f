use thiserror::Error;

/// Errors raised by the engine. Variants correspond to the error kinds in
/// the component design: authoring errors fail route construction,
/// everything else is surfaced per-request.
#[derive(Debug, Error)]
pub enum FirError {
    #[error("authoring error: {0}")]
    Authoring(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown event id: {0}")]
    UnknownEvent(String),

    #[error("template render failed: {0}")]
    Render(String),

    #[error("channel string must not be empty")]
    EmptyChannel,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FirResult<T> = Result<T, FirError>;
