use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::JsonOrForm;
use crate::utils::validation::not_blank;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, Validate, ToSchema)]
pub struct SignRequest {
    #[serde(rename = "signerName", default)]
    #[validate(
        custom(function = "not_blank", message = "Signer name is required"),
        length(max = 200, message = "Signer name is too long")
    )]
    #[schema(example = "Dana Levi")]
    pub signer_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct SignResponse {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/sign/{file_id}",
    params(
        ("file_id" = String, Path, description = "Document identifier from the share link")
    ),
    request_body = SignRequest,
    responses(
        (status = 200, description = "Document signed and mailed", body = SignResponse),
        (status = 400, description = "Signer name missing"),
        (status = 404, description = "No .docx document with this identifier"),
        (status = 500, description = "Template, storage or mail failure")
    ),
    tag = "documents"
)]
pub async fn sign_document(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    JsonOrForm(req): JsonOrForm<SignRequest>,
) -> Result<Json<SignResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let outcome = state.signing.sign(&file_id, &req.signer_name).await?;

    Ok(Json(SignResponse {
        message: format!(
            "Document signed and sent successfully by {}",
            outcome.signer
        ),
    }))
}
