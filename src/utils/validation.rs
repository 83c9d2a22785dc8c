use std::path::Path;
use validator::ValidationError;

/// Longest extension kept from an uploaded file name.
const MAX_EXTENSION_LEN: usize = 16;

/// Extract a storable extension from a client-supplied file name.
///
/// Only the final path component is considered. The result is lower-cased
/// ASCII alphanumerics; anything else yields an empty extension.
pub fn sanitize_extension(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("");

    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    if extension.is_empty()
        || extension.len() > MAX_EXTENSION_LEN
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        if !extension.is_empty() {
            tracing::warn!("Dropping unusable extension from upload: {}", filename);
        }
        return String::new();
    }

    extension.to_ascii_lowercase()
}

/// Rejects empty and whitespace-only strings.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
