use crate::errors::{AppError, AppResult};
use crate::models::SnapshotStats;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub caption: String,
}

/// Outbound messages to a chat channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> AppResult<()>;

    async fn send_document(&self, chat_id: &str, attachment: Attachment) -> AppResult<()>;
}

/// Builds a messenger for the bot credential stored in settings.
pub trait MessengerConnector: Send + Sync {
    fn connect(&self, bot_token: &str) -> AppResult<Arc<dyn Messenger>>;
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client: one multipart POST per message.
#[derive(Debug, Clone)]
pub struct TelegramMessenger {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramMessenger {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn post(&self, method: &str, form: Form) -> AppResult<()> {
        let response = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|err| AppError::Messaging(format!("{}: {}", method, err.without_url())))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<BotApiResponse>(&body).ok();

        match parsed {
            Some(reply) if status.is_success() && reply.ok => Ok(()),
            Some(reply) => Err(AppError::Messaging(format!(
                "{}: HTTP {}: {}",
                method,
                status,
                reply.description.unwrap_or_default()
            ))),
            None if status.is_success() => Ok(()),
            None => Err(AppError::Messaging(format!("{}: HTTP {}", method, status))),
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: &str, text: &str) -> AppResult<()> {
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("text", text.to_string())
            .text("parse_mode", "Markdown");
        self.post("sendMessage", form).await
    }

    async fn send_document(&self, chat_id: &str, attachment: Attachment) -> AppResult<()> {
        let part = Part::bytes(attachment.bytes)
            .file_name(attachment.file_name)
            .mime_str(&attachment.mime_type)
            .map_err(|err| AppError::Messaging(err.to_string()))?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part)
            .text("caption", attachment.caption);
        self.post("sendDocument", form).await
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConnector {
    base_url: String,
}

impl TelegramConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl MessengerConnector for TelegramConnector {
    fn connect(&self, bot_token: &str) -> AppResult<Arc<dyn Messenger>> {
        let token = bot_token.trim();
        if token.is_empty() {
            return Err(AppError::NoBotCredential);
        }
        Ok(Arc::new(TelegramMessenger::new(&self.base_url, token)))
    }
}

/// Report sent to the tenant's channel after a successful remote snapshot.
pub fn backup_report(tenant_name: &str, stats: &SnapshotStats) -> String {
    [
        "*Backup Report*".to_string(),
        format!("*Tenant:* {}", crate::export::escape_markdown(tenant_name)),
        format!("*Customers:* {}", stats.customers),
        format!("*Contracts:* {}", stats.contracts),
        format!("*Payments:* {}", stats.payments),
        format!("*Total Revenue:* {:.2}", stats.total_revenue),
        format!("*Collected:* {:.2}", stats.total_collected()),
        format!("*Outstanding:* {:.2}", stats.total_debt),
    ]
    .join("\n")
}


#[cfg(test)]
mod tests {
    use super::{backup_report, MessengerConnector, TelegramConnector, TelegramMessenger};
    use crate::errors::AppError;
    use crate::models::SnapshotStats;

    #[test]
    fn method_urls_embed_the_token() {
        let messenger = TelegramMessenger::new("https://api.telegram.org/", "123:abc");
        assert_eq!(
            messenger.method_url("sendDocument"),
            "https://api.telegram.org/bot123:abc/sendDocument"
        );
    }

    #[test]
    fn blank_token_is_rejected_before_any_request() {
        let connector = TelegramConnector::new("https://api.telegram.org");
        let error = connector.connect("  ").err().expect("blank token");
        assert!(matches!(error, AppError::NoBotCredential));
    }

    #[test]
    fn backup_report_lists_collected_and_outstanding() {
        let stats = SnapshotStats::from_figures(12, 2, 1, 1500.0, 300.0);
        let report = backup_report("Shop_One", &stats);
        assert!(report.starts_with("*Backup Report*\n*Tenant:* Shop\\_One"));
        assert!(report.contains("*Customers:* 12"));
        assert!(report.contains("*Collected:* 300.00"));
        assert!(report.ends_with("*Outstanding:* 1200.00"));
    }
}
