use thiserror::Error;

/// Errors from the M-Team API client.
#[derive(Debug, Error)]
pub enum MTeamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (code {code}): {message}")]
    Api { code: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}
