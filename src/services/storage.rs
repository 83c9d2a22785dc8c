use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid document key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A document held in the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    /// Lower-cased extension without the leading dot, empty when absent
    pub extension: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

impl StoredFile {
    /// On-disk file name, `<id>.<ext>` or just `<id>`.
    pub fn file_name(&self) -> String {
        file_name_for(&self.id, &self.extension)
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.extension.eq_ignore_ascii_case(extension)
    }
}

pub fn file_name_for(id: &str, extension: &str) -> String {
    if extension.is_empty() {
        id.to_string()
    } else {
        format!("{}.{}", id, extension)
    }
}

/// Keyed document storage injected into the handlers.
///
/// Every stored document is addressed by its identifier only; the extension
/// is fixed at `put` time and kept across `overwrite`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a new document. Fails if the identifier is already taken.
    async fn put<'a>(
        &self,
        id: &str,
        extension: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredFile>;

    /// Read the whole current content.
    async fn get(&self, id: &str) -> Result<Vec<u8>>;

    /// Open the current content as a stream.
    async fn open(&self, id: &str) -> Result<(StoredFile, Box<dyn AsyncRead + Unpin + Send>)>;

    /// Replace the content in place. Readers see either the old or the new bytes.
    async fn overwrite(&self, id: &str, data: &[u8]) -> Result<StoredFile>;

    async fn exists(&self, id: &str) -> bool;

    async fn locate(&self, id: &str) -> Option<StoredFile>;
}

/// Flat-directory store with an in-memory identifier index.
pub struct LocalDocumentStore {
    root: PathBuf,
    index: DashMap<String, StoredFile>,
}

impl LocalDocumentStore {
    /// Open (creating if needed) the storage directory and index its files.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let index = DashMap::new();
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            // Dotfiles are in-flight temp files.
            if name.starts_with('.') {
                continue;
            }

            let (id, extension) = split_file_name(&name);
            if index.contains_key(&id) {
                tracing::warn!("Duplicate document id {} on disk, ignoring {}", id, name);
                continue;
            }

            index.insert(
                id.clone(),
                StoredFile {
                    id,
                    extension,
                    path: entry.path(),
                    size: metadata.len(),
                    modified_at: modified_at(&metadata),
                },
            );
        }

        tracing::debug!("Indexed {} documents in {}", index.len(), root.display());
        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Write into a temp file in the storage root, then rename over `target`.
    async fn write_atomic<R>(&self, target: &Path, reader: &mut R) -> Result<std::fs::Metadata>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let tmp = tempfile::Builder::new()
            .prefix(".write-")
            .tempfile_in(&self.root)?;
        let (std_file, tmp_path) = tmp.into_parts();

        let mut file = tokio::fs::File::from_std(std_file);
        tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tmp_path.persist(target).map_err(|e| e.error)?;
        Ok(tokio::fs::metadata(target).await?)
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn put<'a>(
        &self,
        id: &str,
        extension: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredFile> {
        validate_key(id)?;
        if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::InvalidKey(extension.to_string()));
        }
        if self.index.contains_key(id) {
            return Err(StorageError::AlreadyExists(id.to_string()));
        }

        let extension = extension.to_ascii_lowercase();
        let path = self.root.join(file_name_for(id, &extension));
        let metadata = self.write_atomic(&path, &mut reader).await?;

        let stored = StoredFile {
            id: id.to_string(),
            extension,
            path,
            size: metadata.len(),
            modified_at: modified_at(&metadata),
        };
        self.index.insert(id.to_string(), stored.clone());
        tracing::info!("💾 Stored {} ({} bytes)", stored.file_name(), stored.size);
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let file = self
            .locate(id)
            .await
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        match tokio::fs::read(&file.path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Removed behind our back
                self.index.remove(id);
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, id: &str) -> Result<(StoredFile, Box<dyn AsyncRead + Unpin + Send>)> {
        let file = self
            .locate(id)
            .await
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        match tokio::fs::File::open(&file.path).await {
            Ok(handle) => {
                let size = handle.metadata().await?.len();
                Ok((StoredFile { size, ..file }, Box::new(handle)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.index.remove(id);
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn overwrite(&self, id: &str, data: &[u8]) -> Result<StoredFile> {
        let file = self
            .locate(id)
            .await
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let mut reader = data;
        let metadata = self.write_atomic(&file.path, &mut reader).await?;

        let updated = StoredFile {
            size: metadata.len(),
            modified_at: modified_at(&metadata),
            ..file
        };
        self.index.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn exists(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    async fn locate(&self, id: &str) -> Option<StoredFile> {
        self.index.get(id).map(|entry| entry.value().clone())
    }
}

fn validate_key(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(id.to_string()))
    }
}

/// Split `<id>.<ext>` on the last dot, lower-casing the extension.
fn split_file_name(name: &str) -> (String, String) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), ext.to_ascii_lowercase()),
        _ => (name.to_string(), String::new()),
    }
}

fn modified_at(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
