use thiserror::Error;
use voice_domain::DomainError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Invalid option. Choose from: {}", .valid.join(", "))]
    InvalidOption { option: String, valid: Vec<String> },

    #[error("No file provided")]
    MissingFile,

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("{stage} stage timed out after {timeout_ms} ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Errors caused by the caller's input, rejected before any processing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ApplicationError::InvalidOption { .. }
                | ApplicationError::MissingFile
                | ApplicationError::EmptyFile
                | ApplicationError::Validation(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApplicationError::InvalidOption { .. } => "invalid_option",
            ApplicationError::MissingFile => "missing_file",
            ApplicationError::EmptyFile => "empty_file",
            ApplicationError::Validation(_) => "validation",
            ApplicationError::Domain(err) => err.kind(),
            ApplicationError::Timeout { .. } => "timeout",
            ApplicationError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApplicationError;

    #[test]
    fn invalid_option_lists_every_key() {
        let error = ApplicationError::InvalidOption {
            option: "9".to_string(),
            valid: vec!["0".to_string(), "1".to_string(), "2".to_string()],
        };

        assert_eq!(error.to_string(), "Invalid option. Choose from: 0, 1, 2");
        assert!(error.is_client_error());
    }
}
