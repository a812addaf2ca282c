// src/infra/errors.rs — Error types for jieyou

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JieyouError {
    // Client errors (never retried server-side)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Daily chat limit reached ({limit} per day)")]
    LimitExceeded { limit: u32 },

    // Upstream generation
    #[error("Provider '{provider}' error: {message}")]
    Provider { provider: String, message: String },

    // Infra
    #[error("Store error: {0}")]
    Store(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JieyouError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        JieyouError::Store(err.to_string())
    }

    /// True for errors caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            JieyouError::InvalidRequest(_)
                | JieyouError::NotFound(_)
                | JieyouError::LimitExceeded { .. }
        )
    }

    /// HTTP status code used when the error reaches the API edge.
    pub fn status_code(&self) -> u16 {
        match self {
            JieyouError::InvalidRequest(_) => 400,
            JieyouError::NotFound(_) => 404,
            JieyouError::LimitExceeded { .. } => 429,
            JieyouError::Provider { .. } => 502,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(JieyouError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(JieyouError::NotFound("user".into()).status_code(), 404);
        assert_eq!(JieyouError::LimitExceeded { limit: 10 }.status_code(), 429);
        assert_eq!(JieyouError::store("disk full").status_code(), 500);
    }

    #[test]
    fn test_client_error_classification() {
        assert!(JieyouError::InvalidRequest("x".into()).is_client_error());
        assert!(JieyouError::LimitExceeded { limit: 1 }.is_client_error());
        assert!(!JieyouError::Transport("closed".into()).is_client_error());
        assert!(!JieyouError::Provider {
            provider: "hunyuan".into(),
            message: "boom".into(),
        }
        .is_client_error());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            JieyouError::NotFound("User".into()).to_string(),
            "User not found"
        );
        assert_eq!(
            JieyouError::LimitExceeded { limit: 10 }.to_string(),
            "Daily chat limit reached (10 per day)"
        );
    }
}
