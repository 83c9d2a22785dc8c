use crate::AppState;
use crate::api::error::AppError;
use crate::services::storage::StorageError;
use crate::utils::validation::sanitize_extension;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode, header},
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    #[serde(rename = "shareLink")]
    pub share_link: String,
}

/// Multipart form accepted by `/upload`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored, share link issued", body = UploadResponse),
        (status = 400, description = "No file provided"),
        (status = 413, description = "File too large")
    ),
    tag = "documents"
)]
pub async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut stored_id: Option<String> = None;

    let result: Result<Json<UploadResponse>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name != "file" || stored_id.is_some() {
                // Only the first file field is kept.
                continue;
            }

            let extension = sanitize_extension(field.file_name().unwrap_or_default());
            let id = Uuid::new_v4().to_string();

            let body_with_io_error = field.map_err(std::io::Error::other);
            let reader = StreamReader::new(Box::pin(body_with_io_error));

            let stored = state
                .store
                .put(&id, &extension, Box::new(reader))
                .await
                .map_err(storage_error)?;
            stored_id = Some(stored.id);
        }

        let id = stored_id
            .clone()
            .ok_or(AppError::BadRequest("No file provided".to_string()))?;

        let base = share_base(&headers, &state.config.public_base_url);
        Ok(Json(UploadResponse {
            message: "File received".to_string(),
            share_link: format!("{}/sign/{}", base, id),
        }))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain the rest of the body so the client sees our error instead of a reset
            tracing::warn!("Upload failed: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large()
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// A body that breaks mid-field surfaces from the store as the
/// `MultipartError` wrapped in `io::Error`.
fn storage_error(e: StorageError) -> AppError {
    let multipart = match &e {
        StorageError::Io(io) => io
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MultipartError>())
            .map(|m| (m.status(), m.body_text())),
        _ => None,
    };

    match multipart {
        Some((status, _)) if status == StatusCode::PAYLOAD_TOO_LARGE => too_large(),
        Some((_, text)) => AppError::BadRequest(text),
        None => AppError::from(e),
    }
}

fn too_large() -> AppError {
    AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
}

/// Origin of the request when it is a usable http(s) URL, else `fallback`.
pub fn share_base(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .and_then(|origin| url::Url::parse(origin).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .map(|url| url.origin().ascii_serialization())
        .unwrap_or_else(|| fallback.trim_end_matches('/').to_string())
}
