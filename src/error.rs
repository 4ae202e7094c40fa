//! Error types for backend access and saving.

use thiserror::Error;

/// Errors raised while talking to the annotation backend.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure (connection refused, timeout, TLS, ...)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {detail}")]
    Status {
        /// HTTP status code
        status: u16,
        /// `detail` field of the error payload, or the raw body
        detail: String,
    },

    /// The response body did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Local file access failed (uploads)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image bytes could not be decoded
    #[error("image decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Malformed(err.to_string())
    }
}

impl ClientError {
    /// True for a 404, which list endpoints use to mean "nothing matched".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }
}

/// Reasons a save request is refused before or after reaching the backend.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("a save for this image is already in progress")]
    AlreadyPending,

    #[error("no class is available to label the boxes with")]
    NoClassAvailable,

    #[error("there are no boxes to save")]
    NothingToSave,

    #[error(transparent)]
    Remote(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message_includes_detail() {
        let err = ClientError::Status {
            status: 400,
            detail: "Corrections list is empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "backend returned 400: Corrections list is empty"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_json_errors_are_malformed() {
        let err: ClientError = serde_json::from_str::<u32>("{").unwrap_err().into();
        assert!(matches!(err, ClientError::Malformed(_)));
    }
}
