use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single row returned by a remote source: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub const BOT_TOKEN_KEY: &str = "bot_token";
pub const DEFAULT_CHAT_ID_KEY: &str = "default_chat_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TenantStatus {
    #[default]
    Active,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: TenantStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messaging_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_end: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TenantStatus::Active,
            remote_url: None,
            remote_key: None,
            messaging_channel_id: None,
            phone: None,
            last_backup_at: None,
            subscription_start: None,
            subscription_end: None,
            paid: None,
            notes: None,
        }
    }

    pub fn with_remote(mut self, url: impl Into<String>, key: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self.remote_key = Some(key.into());
        self
    }

    /// Endpoint and credential, present only when both are non-blank.
    pub fn remote_credentials(&self) -> Option<RemoteCredentials> {
        let endpoint = non_blank(self.remote_url.as_deref())?;
        let credential = non_blank(self.remote_key.as_deref())?;
        Some(RemoteCredentials {
            endpoint: endpoint.to_string(),
            credential: credential.to_string(),
        })
    }

    pub fn is_manual(&self) -> bool {
        self.remote_credentials().is_none()
    }

    pub fn channel_id(&self) -> Option<&str> {
        non_blank(self.messaging_channel_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub endpoint: String,
    pub credential: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    pub customers: u64,
    pub contracts: u64,
    pub payments: u64,
    pub total_revenue: f64,
    pub total_debt: f64,
}

impl SnapshotStats {
    pub fn from_figures(customers: u64, contracts: u64, payments: u64, revenue: f64, collected: f64) -> Self {
        Self {
            customers,
            contracts,
            payments,
            total_revenue: revenue,
            total_debt: revenue - collected,
        }
    }

    pub fn total_collected(&self) -> f64 {
        self.total_revenue - self.total_debt
    }
}

/// One entry in the snapshot history. `tenant_name` is copied at creation
/// time and is not re-synced when the tenant is renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub tenant_id: String,
    pub tenant_name: String,
    pub taken_at: DateTime<Utc>,
    pub outcome: SnapshotOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SnapshotStats>,
}

impl Snapshot {
    pub fn success(tenant: &Tenant, taken_at: DateTime<Utc>, stats: SnapshotStats) -> Self {
        Self {
            id: None,
            tenant_id: tenant.id.clone(),
            tenant_name: tenant.name.clone(),
            taken_at,
            outcome: SnapshotOutcome::Success,
            stats: Some(stats),
        }
    }

    pub fn failed(tenant: &Tenant, taken_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            tenant_id: tenant.id.clone(),
            tenant_name: tenant.name.clone(),
            taken_at,
            outcome: SnapshotOutcome::Failed,
            stats: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == SnapshotOutcome::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub bot_token: Option<String>,
    pub default_chat_id: Option<String>,
}

impl AppSettings {
    pub fn from_entries(entries: &[SettingEntry]) -> Self {
        let mut settings = Self::default();
        for entry in entries {
            let value = non_blank(Some(entry.value.as_str())).map(ToString::to_string);
            match entry.key.as_str() {
                BOT_TOKEN_KEY => settings.bot_token = value,
                DEFAULT_CHAT_ID_KEY => settings.default_chat_id = value,
                _ => {}
            }
        }
        settings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub tenant_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub tenant_id: String,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    pub approximate_row_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    Document,
    Workbook,
    Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub format: ExportFormat,
    pub tables: Vec<ExportedTableSummary>,
    pub path: Option<String>,
    pub sheets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedTableSummary {
    pub name: String,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSnapshotPayload {
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    pub revenue: f64,
    pub collected: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSnapshotPayload {
    pub snapshot_id: i64,
    pub revenue: f64,
    pub collected: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub latest_revenue: f64,
    pub latest_outstanding: f64,
    pub latest_collected: f64,
    pub lifetime_revenue: f64,
    pub tenant_count: usize,
    pub active_tenant_count: usize,
    pub successful_snapshots: usize,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
