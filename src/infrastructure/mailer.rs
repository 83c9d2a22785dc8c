use crate::config::AppConfig;
use crate::services::notifier::MailNotifier;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub fn setup_notifier(config: &AppConfig) -> anyhow::Result<Arc<MailNotifier>> {
    let notifier = MailNotifier::new(config).context("Failed to initialize mail notifier")?;

    info!(
        "📮 Notifications go to {} via {}",
        config.email_address.as_deref().unwrap_or("-"),
        config.mail_transport.as_str()
    );

    Ok(Arc::new(notifier))
}
