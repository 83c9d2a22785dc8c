use crate::AppState;
use crate::api::error::AppError;
use crate::utils::content_type;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;

#[utoipa::path(
    get,
    path = "/file/{file_id}",
    params(
        ("file_id" = String, Path, description = "Document identifier")
    ),
    responses(
        (status = 200, description = "Current document bytes"),
        (status = 404, description = "File not found")
    ),
    tag = "documents"
)]
pub async fn get_document(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    let (file, reader) = state.store.open(&file_id).await?;
    let filename = file.file_name();

    tracing::debug!("📎 Serving {} ({} bytes)", filename, file.size);

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            content_type::resolve(&filename, None),
        )
        .header(header::CONTENT_LENGTH, file.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", filename),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(e.to_string()))
}
