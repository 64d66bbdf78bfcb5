use axum::{
    extract::{multipart::{MultipartError, MultipartRejection}, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use voice_application::{ProcessAudioRequest, ProcessAudioResponse, UploadedFile};

use crate::{error_mapper, AppState, HttpError};

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn process_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, HttpError> {
    let mut multipart = multipart.map_err(multipart_rejection)?;
    let request = read_process_form(&mut multipart).await?;

    tracing::info!(
        file_name = request.file.as_ref().map(|file| file.file_name.as_str()).unwrap_or(""),
        file_bytes = request.file.as_ref().map(|file| file.content.len()).unwrap_or(0),
        option = request.option.as_deref().unwrap_or("<default>"),
        "received process-audio request"
    );

    let response = state.usecase.process(request).await.map_err(error_mapper)?;

    Ok(match response {
        ProcessAudioResponse::Stream(streamed) => (
            [
                (header::CONTENT_TYPE, streamed.media_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", streamed.file_name),
                ),
            ],
            streamed.bytes,
        )
            .into_response(),
        ProcessAudioResponse::Stored(stored) => Json(stored).into_response(),
    })
}

/// Collects the `file` and `option` parts; unknown parts are ignored.
async fn read_process_form(multipart: &mut Multipart) -> Result<ProcessAudioRequest, HttpError> {
    let mut request = ProcessAudioRequest {
        file: None,
        option: None,
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content = field.bytes().await.map_err(multipart_error)?;
                request.file = Some(UploadedFile {
                    file_name,
                    content: content.to_vec(),
                });
            }
            Some("option") => {
                let value = field.text().await.map_err(multipart_error)?;
                request.option = Some(value.trim().to_string());
            }
            _ => {}
        }
    }

    Ok(request)
}

fn multipart_error(err: MultipartError) -> HttpError {
    tracing::warn!(error = %err, "malformed multipart body");
    HttpError::Rejected {
        status: err.status(),
        message: err.body_text(),
    }
}

fn multipart_rejection(rejection: MultipartRejection) -> HttpError {
    tracing::warn!(error = %rejection, "request is not multipart/form-data");
    HttpError::Rejected {
        status: rejection.status(),
        message: rejection.body_text(),
    }
}
