use super::{render_document, ExportData};
use crate::errors::{AppError, AppResult};
use crate::messaging::{Attachment, Messenger};
use crate::models::{AppSettings, Tenant};
use chrono::{DateTime, Utc};

/// The tenant's own channel, else the global default channel.
pub fn resolve_channel(tenant: &Tenant, settings: &AppSettings) -> AppResult<String> {
    tenant
        .channel_id()
        .map(ToString::to_string)
        .or_else(|| settings.default_chat_id.clone())
        .ok_or_else(|| AppError::NoChannelConfigured(tenant.id.clone()))
}

/// Header, one `table: N records` line per exported table, then the time.
pub fn compose_summary(tenant_name: &str, data: &ExportData, at: DateTime<Utc>) -> String {
    let mut summary = format!("*Data export - {}*\n", escape_markdown(tenant_name));
    for table in data.tables() {
        summary.push_str(&format!(
            "{}: {} records\n",
            escape_markdown(&table.name),
            table.rows.len()
        ));
    }
    summary.push_str(&format!("\n{}", at.format("%Y-%m-%d %H:%M UTC")));
    summary
}

/// Sends the summary text, then the JSON document as an attachment.
pub async fn send_export_message(
    messenger: &dyn Messenger,
    chat_id: &str,
    tenant_name: &str,
    data: &ExportData,
    at: DateTime<Utc>,
) -> AppResult<()> {
    let document = render_document(data)?;
    messenger
        .send_text(chat_id, &compose_summary(tenant_name, data, at))
        .await?;
    messenger
        .send_document(
            chat_id,
            Attachment {
                file_name: format!("{}_export.json", tenant_name.trim()),
                mime_type: "application/json".to_string(),
                bytes: document.into_bytes(),
                caption: format!("Full data export for {}", tenant_name),
            },
        )
        .await
}

/// Escapes characters that legacy Markdown parse mode treats as markup.
pub(crate) fn escape_markdown(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
