use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use voice_application::ApplicationError;
use voice_domain::DomainError;

#[derive(Debug)]
pub enum HttpError {
    BadRequest { message: String },
    Rejected { status: StatusCode, message: String },
    Internal { message: &'static str },
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            HttpError::Rejected { status, message } => (status, message),
            HttpError::Internal { message } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
        };

        (
            status,
            Json(json!({
                "error": message,
            })),
        )
            .into_response()
    }
}

/// Client errors keep their message; server errors get a fixed message and
/// the detail goes to the log only.
pub fn error_mapper(error: ApplicationError) -> HttpError {
    if error.is_client_error() {
        tracing::warn!(kind = error.kind(), error = %error, "rejected request");
        return HttpError::BadRequest {
            message: error.to_string(),
        };
    }

    tracing::error!(kind = error.kind(), error = %error, "voice processing failed");
    let message = match &error {
        ApplicationError::Domain(DomainError::UnsupportedFormat { .. })
        | ApplicationError::Domain(DomainError::CorruptInput(_)) => "Audio conversion failed",
        ApplicationError::Domain(DomainError::TransformFailure(_)) => "Voice modification failed",
        ApplicationError::Domain(DomainError::EncodeFailure(_)) => "Final conversion failed",
        ApplicationError::Domain(DomainError::StorageFailure(_)) => "Upload to blob store failed",
        ApplicationError::Timeout { .. } => "Processing timed out",
        _ => "Internal server error",
    };
    HttpError::Internal { message }
}
