//! Outbound mail carrying signed documents.

use crate::config::{AppConfig, MailTransport};
use crate::utils::content_type;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Mail is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid mail address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Failed to build mail message: {0}")]
    Build(String),

    #[error("Mail delivery failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: Attachment,
}

/// Delivery port for notifications. One attempt per call, no retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

enum MailerTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// lettre-backed notifier sending from the configured account.
pub struct MailNotifier {
    transport: MailerTransport,
    from: Mailbox,
}

impl MailNotifier {
    pub fn new(config: &AppConfig) -> Result<Self, NotifyError> {
        let address = config
            .email_address
            .as_deref()
            .ok_or_else(|| NotifyError::NotConfigured("EMAIL_ADDRESS is not set".to_string()))?;
        let from = parse_mailbox(address)?;

        let transport = match config.mail_transport {
            MailTransport::Smtp => {
                let password = config.email_password.clone().ok_or_else(|| {
                    NotifyError::NotConfigured("EMAIL_PASSWORD is not set".to_string())
                })?;

                // 465 is implicit TLS, anything else negotiates STARTTLS.
                let builder = if config.smtp_port == 465 {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                }
                .map_err(|e| NotifyError::NotConfigured(format!("SMTP relay: {}", e)))?;

                let mailer = builder
                    .port(config.smtp_port)
                    .credentials(Credentials::new(address.to_string(), password))
                    .build();

                tracing::info!(
                    host = %config.smtp_host,
                    port = config.smtp_port,
                    "Mail notifier initialized (SMTP)"
                );
                MailerTransport::Smtp(mailer)
            }
            MailTransport::File => {
                let outbox = Path::new(&config.mail_outbox_dir);
                std::fs::create_dir_all(outbox).map_err(|e| {
                    NotifyError::NotConfigured(format!("create outbox directory: {}", e))
                })?;
                tracing::info!(outbox = %outbox.display(), "Mail notifier initialized (file)");
                MailerTransport::File(AsyncFileTransport::<Tokio1Executor>::new(outbox))
            }
        };

        Ok(Self { transport, from })
    }

    fn build_message(&self, notification: Notification) -> Result<Message, NotifyError> {
        let to = parse_mailbox(&notification.to)?;

        let Attachment { filename, content } = notification.attachment;
        let mime = content_type::resolve(&filename, Some(&content));
        let attachment_type = ContentType::parse(&mime)
            .map_err(|e| NotifyError::Build(format!("content type {}: {}", mime, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(notification.html_body))
                    .singlepart(MailAttachment::new(filename).body(content, attachment_type)),
            )
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let to = notification.to.clone();
        let message = self.build_message(notification)?;

        match &self.transport {
            MailerTransport::Smtp(smtp) => {
                smtp.send(message)
                    .await
                    .map_err(|e| NotifyError::Transport(e.to_string()))?;
            }
            MailerTransport::File(file) => {
                file.send(message)
                    .await
                    .map_err(|e| NotifyError::Transport(e.to_string()))?;
            }
        }

        tracing::info!(to = %to, "📧 Notification sent");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })
}
