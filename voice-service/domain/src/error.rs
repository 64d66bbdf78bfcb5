use thiserror::Error;

/// Failures classified by the stage that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("unsupported audio format `{format}`: {message}")]
    UnsupportedFormat { format: String, message: String },

    #[error("corrupt audio input: {0}")]
    CorruptInput(String),

    #[error("audio transform failed: {0}")]
    TransformFailure(String),

    #[error("audio encode failed: {0}")]
    EncodeFailure(String),

    #[error("blob storage failed: {0}")]
    StorageFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn unsupported_format(format: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::UnsupportedFormat {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn corrupt_input(message: impl Into<String>) -> Self {
        DomainError::CorruptInput(message.into())
    }

    pub fn transform_failure(message: impl Into<String>) -> Self {
        DomainError::TransformFailure(message.into())
    }

    pub fn encode_failure(message: impl Into<String>) -> Self {
        DomainError::EncodeFailure(message.into())
    }

    pub fn storage_failure(message: impl Into<String>) -> Self {
        DomainError::StorageFailure(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        DomainError::Internal(message.into())
    }

    /// Short machine-readable tag, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::UnsupportedFormat { .. } => "unsupported_format",
            DomainError::CorruptInput(_) => "corrupt_input",
            DomainError::TransformFailure(_) => "transform_failure",
            DomainError::EncodeFailure(_) => "encode_failure",
            DomainError::StorageFailure(_) => "storage_failure",
            DomainError::Internal(_) => "internal",
        }
    }
}
