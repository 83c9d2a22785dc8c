use std::env;
use std::path::PathBuf;

/// How outgoing notifications are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTransport {
    /// Authenticated SMTP relay
    Smtp,
    /// Write `.eml` files into the outbox directory (development)
    File,
}

impl MailTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailTransport::Smtp => "smtp",
            MailTransport::File => "file",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "smtp" => Some(MailTransport::Smtp),
            "file" => Some(MailTransport::File),
            _ => None,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listening port (default: 5000)
    pub port: u16,

    /// Directory holding uploaded and signed documents (default: "uploads")
    pub upload_dir: PathBuf,

    /// Maximum upload size in bytes (default: 50 MB)
    pub max_file_size: usize,

    /// Base used for share links when the request carries no Origin header
    pub public_base_url: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    /// Mail account address, used as both sender and recipient
    pub email_address: Option<String>,

    /// Mail account credential
    pub email_password: Option<String>,

    /// SMTP relay host (default: "smtp.gmail.com")
    pub smtp_host: String,

    /// SMTP relay port (default: 465, implicit TLS)
    pub smtp_port: u16,

    /// Notification transport (default: smtp)
    pub mail_transport: MailTransport,

    /// Outbox directory for the file transport (default: "outbox")
    pub mail_outbox_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            max_file_size: 50 * 1024 * 1024, // 50 MB
            public_base_url: "https://my-client.onrender.com".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "https://my-client.onrender.com".to_string(),
            ],
            email_address: None,
            email_password: None,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            mail_transport: MailTransport::Smtp,
            mail_outbox_dir: PathBuf::from("outbox"),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default.public_base_url),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_origins),
            email_address: env::var("EMAIL_ADDRESS").ok().filter(|v| !v.is_empty()),
            email_password: env::var("EMAIL_PASSWORD").ok().filter(|v| !v.is_empty()),
            smtp_host: env::var("SMTP_HOST").unwrap_or(default.smtp_host),
            smtp_port: env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.smtp_port),
            mail_transport: env::var("MAIL_TRANSPORT")
                .ok()
                .and_then(|v| MailTransport::parse(&v))
                .unwrap_or(default.mail_transport),
            mail_outbox_dir: env::var("MAIL_OUTBOX_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.mail_outbox_dir),
        }
    }

    /// Create config for development (file mail transport, local origins)
    pub fn development() -> Self {
        Self {
            email_address: Some("signer-desk@localhost".to_string()),
            mail_transport: MailTransport::File,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
            ],
            ..Self::default()
        }
    }
}
