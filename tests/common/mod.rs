#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use docsign_backend::config::AppConfig;
use docsign_backend::services::notifier::{Notification, Notifier, NotifyError};
use docsign_backend::services::signing::SigningService;
use docsign_backend::services::storage::{
    DocumentStore, LocalDocumentStore, Result as StorageResult, StorageError, StoredFile,
};
use docsign_backend::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const RECIPIENT: &str = "desk@example.com";
pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Notifier fake that records what would have been sent.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(NotifyError::Transport(message));
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// In-memory document store.
#[derive(Default)]
pub struct MemoryDocumentStore {
    files: Mutex<HashMap<String, (StoredFile, Vec<u8>)>>,
}

impl MemoryDocumentStore {
    pub fn insert(&self, id: &str, extension: &str, data: Vec<u8>) {
        let file = StoredFile {
            id: id.to_string(),
            extension: extension.to_string(),
            path: Path::new("/memory").join(format!("{}.{}", id, extension)),
            size: data.len() as u64,
            modified_at: chrono::Utc::now(),
        };
        self.files
            .lock()
            .unwrap()
            .insert(id.to_string(), (file, data));
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put<'a>(
        &self,
        id: &str,
        extension: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> StorageResult<StoredFile> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        if self.files.lock().unwrap().contains_key(id) {
            return Err(StorageError::AlreadyExists(id.to_string()));
        }
        self.insert(id, extension, data);
        Ok(self.locate(id).await.unwrap())
    }

    async fn get(&self, id: &str) -> StorageResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(id)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn open(
        &self,
        id: &str,
    ) -> StorageResult<(StoredFile, Box<dyn AsyncRead + Unpin + Send>)> {
        let (file, data) = self
            .files
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        Ok((file, Box::new(Cursor::new(data))))
    }

    async fn overwrite(&self, id: &str, data: &[u8]) -> StorageResult<StoredFile> {
        let mut files = self.files.lock().unwrap();
        let (file, content) = files
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        *content = data.to_vec();
        file.size = data.len() as u64;
        Ok(file.clone())
    }

    async fn exists(&self, id: &str) -> bool {
        self.files.lock().unwrap().contains_key(id)
    }

    async fn locate(&self, id: &str) -> Option<StoredFile> {
        self.files.lock().unwrap().get(id).map(|(file, _)| file.clone())
    }
}

pub struct TestApp {
    pub app: Router,
    pub store: Arc<LocalDocumentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub dir: tempfile::TempDir,
}

pub async fn setup_app() -> TestApp {
    setup_app_with(|_| {}).await
}

pub async fn setup_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig {
        upload_dir: dir.path().to_path_buf(),
        email_address: Some(RECIPIENT.to_string()),
        ..AppConfig::development()
    };
    configure(&mut config);

    let store = Arc::new(LocalDocumentStore::open(dir.path()).await.unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let signing = Arc::new(SigningService::new(
        store.clone(),
        notifier.clone(),
        RECIPIENT,
    ));

    let app = create_app(AppState {
        store: store.clone(),
        signing,
        config,
    });

    TestApp {
        app,
        store,
        notifier,
        dir,
    }
}

/// Minimal DOCX whose body holds one paragraph per entry of `paragraphs`.
pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|text| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text))
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file("[Content_Types].xml", options).unwrap();
    writer
        .write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
        .unwrap();
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(document.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// `word/document.xml` of a DOCX archive.
pub fn document_xml(bytes: &[u8]) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut file = archive.by_name("word/document.xml").unwrap();
    let mut xml = String::new();
    file.read_to_string(&mut xml).unwrap();
    xml
}

pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
        Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(filename: &str, content: &[u8], origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(origin) = origin {
        builder = builder.header("Origin", origin);
    }
    builder
        .body(Body::from(multipart_body("file", filename, content)))
        .unwrap()
}

pub fn sign_request(file_id: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/sign/{}", file_id))
        .header("Content-Type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Identifier at the end of a share link.
pub fn id_from_link(link: &str) -> String {
    link.rsplit('/').next().unwrap().to_string()
}
