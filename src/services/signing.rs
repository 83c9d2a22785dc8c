use crate::services::notifier::{Attachment, Notification, Notifier, NotifyError};
use crate::services::storage::{DocumentStore, StorageError, StoredFile};
use crate::services::template::{DocxTemplate, TemplateError};
use crate::utils::keyed_mutex::KeyedMutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Template tag replaced with the signer's name.
pub const SIGNER_PLACEHOLDER: &str = "signerName";

/// Only documents stored with this extension can be signed.
pub const TEMPLATE_EXTENSION: &str = "docx";

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Signer name is required")]
    MissingSigner,

    #[error("No .docx document found for {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Template worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct SignOutcome {
    pub file: StoredFile,
    pub signer: String,
    pub substitutions: usize,
}

/// Fills the signer placeholder of a stored template, overwrites it and
/// mails the result to the configured recipient.
pub struct SigningService {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    recipient: String,
    locks: KeyedMutex,
}

impl SigningService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            recipient: recipient.into(),
            locks: KeyedMutex::new(),
        }
    }

    /// Sign document `id` as `signer_name`.
    ///
    /// Requests for the same document run one at a time. A document that was
    /// already signed no longer contains the placeholder, so signing it again
    /// leaves the content as is and still sends the mail. The overwrite is
    /// not undone when mail delivery fails.
    pub async fn sign(&self, id: &str, signer_name: &str) -> Result<SignOutcome, SigningError> {
        let signer = signer_name.trim();
        if signer.is_empty() {
            return Err(SigningError::MissingSigner);
        }

        let guard = self.locks.lock(id).await;
        let result = self.sign_locked(id, signer).await;
        drop(guard);
        self.locks.cleanup();

        result
    }

    async fn sign_locked(&self, id: &str, signer: &str) -> Result<SignOutcome, SigningError> {
        let file = self
            .store
            .locate(id)
            .await
            .filter(|file| file.has_extension(TEMPLATE_EXTENSION))
            .ok_or_else(|| SigningError::NotFound(id.to_string()))?;

        let original = self.store.get(id).await.map_err(|e| match e {
            StorageError::NotFound(_) => SigningError::NotFound(id.to_string()),
            other => other.into(),
        })?;

        let data = HashMap::from([(SIGNER_PLACEHOLDER.to_string(), signer.to_string())]);
        let rendered =
            tokio::task::spawn_blocking(move || DocxTemplate::load(original)?.render(&data))
                .await??;

        if rendered.substitutions == 0 {
            tracing::warn!(
                "No {{{}}} placeholder left in {}",
                SIGNER_PLACEHOLDER,
                file.file_name()
            );
        }

        let file = self.store.overwrite(id, &rendered.bytes).await?;
        tracing::info!(
            "✍️  {} signed by {} ({} substitutions)",
            file.file_name(),
            signer,
            rendered.substitutions
        );

        self.notifier
            .send(Notification {
                to: self.recipient.clone(),
                subject: format!("Document signed by: {}", signer),
                html_body: "<p>The signed document is attached.</p>".to_string(),
                attachment: Attachment {
                    filename: file.file_name(),
                    content: rendered.bytes,
                },
            })
            .await?;

        Ok(SignOutcome {
            file,
            signer: signer.to_string(),
            substitutions: rendered.substitutions,
        })
    }
}
