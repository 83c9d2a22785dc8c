use crate::config::AppConfig;
use crate::services::storage::LocalDocumentStore;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<LocalDocumentStore>> {
    let store = LocalDocumentStore::open(&config.upload_dir).await?;

    info!(
        "🗂️  Document storage: {} ({} documents indexed)",
        store.root().display(),
        store.len()
    );

    Ok(Arc::new(store))
}
