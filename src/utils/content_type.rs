pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Content type known from the extension alone.
pub fn from_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "docx" => DOCX,
        "doc" => "application/msword",
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(mime)
}

/// Resolve the content type for `filename`, sniffing `bytes` when the
/// extension is unknown.
pub fn resolve(filename: &str, bytes: Option<&[u8]>) -> String {
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    from_extension(extension)
        .map(str::to_string)
        .or_else(|| bytes.and_then(infer::get).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}
