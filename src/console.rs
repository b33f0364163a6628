//! Tenant orchestration over the local store, remote sources and sinks.
//!
//! Every write goes through the store's generic operations and is followed by
//! a full reload of the in-memory lists. Nothing here serializes concurrent
//! calls: two backups of one tenant both append history and the last tenant
//! write wins.

use crate::config::ConsoleConfig;
use crate::db::{open_store, Collection, IndexField, Store, STORE_FILE_NAME};
use crate::discovery::SchemaDiscovery;
use crate::errors::{AppError, AppResult};
use crate::export::{
    export_file_name, fetch_tables, render_document, render_workbook, resolve_channel, send_export_message,
    write_export,
};
use crate::fanout::fan_out;
use crate::messaging::{backup_report, MessengerConnector, TelegramConnector};
use crate::models::{
    AppSettings, ConnectionStatus, DashboardSummary, EditSnapshotPayload, ExportFormat, ExportResponse,
    ManualSnapshotPayload, Note, Row, ScheduleEntry, SettingEntry, Snapshot, TableDescriptor, Tenant, TenantStatus,
    BOT_TOKEN_KEY, DEFAULT_CHAT_ID_KEY,
};
use crate::remote::{PostgrestConnector, RemoteConnector, RemoteSource, SelectQuery};
use crate::snapshot::{edited_stats, manual_snapshot, SnapshotBuilder};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory copy of the persisted lists, replaced wholesale after each write.
#[derive(Debug, Clone, Default)]
pub struct ConsoleState {
    pub tenants: Vec<Tenant>,
    pub settings: AppSettings,
    pub history: Vec<Snapshot>,
}

pub struct TenantConsole {
    store: Arc<Store>,
    remote: Arc<dyn RemoteConnector>,
    messaging: Arc<dyn MessengerConnector>,
    config: ConsoleConfig,
    discovery: SchemaDiscovery,
    builder: SnapshotBuilder,
    data_dir: PathBuf,
    state: RwLock<ConsoleState>,
}

impl TenantConsole {
    /// Opens the console rooted at `data_dir` with the HTTP connectors.
    pub async fn new(data_dir: PathBuf) -> AppResult<Arc<Self>> {
        let config = ConsoleConfig::load(&data_dir)?;
        let store = open_store(&data_dir.join(STORE_FILE_NAME))?;
        let remote = Arc::new(PostgrestConnector::new(config.remote_timeout()));
        let messaging = Arc::new(TelegramConnector::new(config.messaging_base_url.clone()));
        Self::with_connectors(data_dir, config, store, remote, messaging).await
    }

    pub async fn with_connectors(
        data_dir: PathBuf,
        config: ConsoleConfig,
        store: Arc<Store>,
        remote: Arc<dyn RemoteConnector>,
        messaging: Arc<dyn MessengerConnector>,
    ) -> AppResult<Arc<Self>> {
        let this = Arc::new(Self {
            store,
            remote,
            messaging,
            discovery: SchemaDiscovery::new(config.probe_tables.clone()),
            builder: SnapshotBuilder::new(config.aggregation.clone()),
            config,
            data_dir,
            state: RwLock::new(ConsoleState::default()),
        });
        this.reload().await?;
        Ok(this)
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    /// Re-reads tenants, settings and history from the store.
    pub async fn reload(&self) -> AppResult<()> {
        let tenants = self.store.list_all::<Tenant>()?;
        let settings = AppSettings::from_entries(&self.store.list_all::<SettingEntry>()?);
        let history = self.store.list_all::<Snapshot>()?;
        *self.state.write().await = ConsoleState {
            tenants,
            settings,
            history,
        };
        Ok(())
    }

    pub async fn state(&self) -> ConsoleState {
        self.state.read().await.clone()
    }

    pub async fn tenants(&self) -> Vec<Tenant> {
        self.state.read().await.tenants.clone()
    }

    pub async fn history(&self) -> Vec<Snapshot> {
        self.state.read().await.history.clone()
    }

    pub async fn settings(&self) -> AppSettings {
        self.state.read().await.settings.clone()
    }

    pub fn tenant(&self, tenant_id: &str) -> AppResult<Tenant> {
        self.store
            .get_by_id::<Tenant>(tenant_id)?
            .ok_or_else(|| AppError::NotFound(format!("Tenant {} not found", tenant_id)))
    }

    // ─── Tenants ────────────────────────────────────────────────────────────

    pub async fn add_tenant(&self, tenant: Tenant) -> AppResult<Tenant> {
        validate_tenant(&tenant)?;
        let tenant = self.store.insert(tenant)?;
        tracing::info!(tenant_id = %tenant.id, manual = tenant.is_manual(), "tenant added");
        self.reload().await?;
        Ok(tenant)
    }

    pub async fn update_tenant(&self, tenant: Tenant) -> AppResult<Tenant> {
        validate_tenant(&tenant)?;
        if !self.store.exists(Collection::Tenants, &tenant.id)? {
            return Err(AppError::NotFound(format!("Tenant {} not found", tenant.id)));
        }
        let tenant = self.store.upsert(tenant)?;
        self.reload().await?;
        Ok(tenant)
    }

    /// Removes the tenant record only. Its snapshots, notes and schedule
    /// entries stay behind.
    pub async fn delete_tenant(&self, tenant_id: &str) -> AppResult<()> {
        self.store.delete_by_id(Collection::Tenants, tenant_id)?;
        tracing::info!(tenant_id = %tenant_id, "tenant deleted");
        self.reload().await
    }

    // ─── Snapshots ──────────────────────────────────────────────────────────

    /// Builds and records a snapshot from the tenant's remote source. A remote
    /// failure is recorded as a failed snapshot and returned, not raised.
    pub async fn run_backup(&self, tenant_id: &str) -> AppResult<Snapshot> {
        let tenant = self.tenant(tenant_id)?;
        let source = match self.remote.connect(&tenant) {
            Ok(source) => source,
            Err(error) if !tenant.is_manual() => {
                tracing::warn!(tenant_id = %tenant.id, error = %error, "remote client could not be built");
                let snapshot = self.store.insert(Snapshot::failed(&tenant, Utc::now()))?;
                self.reload().await?;
                return Ok(snapshot);
            }
            Err(error) => return Err(error),
        };
        let snapshot = self.builder.build_snapshot(&tenant, source.as_deref()).await?;
        let snapshot = self.store.insert(snapshot)?;

        if let Some(stats) = snapshot.stats.filter(|_| snapshot.is_success()) {
            self.touch_last_backup(&tenant.id, snapshot.taken_at)?;
            self.send_backup_report(&tenant, &backup_report(&tenant.name, &stats))
                .await;
        }
        tracing::info!(
            tenant_id = %tenant.id,
            snapshot_id = ?snapshot.id,
            outcome = ?snapshot.outcome,
            "backup recorded"
        );

        self.reload().await?;
        Ok(snapshot)
    }

    /// Backs up every active tenant with a remote source, a few at a time.
    /// Manual and inactive tenants are skipped.
    pub async fn backup_all(&self) -> AppResult<Vec<Snapshot>> {
        let targets: Vec<String> = self
            .store
            .list_by_index::<Tenant>(IndexField::Status, &TenantStatus::Active.as_str())?
            .into_iter()
            .filter(|tenant| !tenant.is_manual())
            .map(|tenant| tenant.id)
            .collect();

        let outcome = fan_out(targets, Some(self.config.export_concurrency), |tenant_id: String| async move {
            self.run_backup(&tenant_id).await
        })
        .await;

        for (tenant_id, error) in &outcome.failed {
            tracing::warn!(tenant_id = %tenant_id, error = %error, "scheduled backup failed");
        }
        Ok(outcome
            .succeeded
            .into_iter()
            .map(|(_, snapshot)| snapshot)
            .collect())
    }

    /// Records operator-entered figures. Targets the tenant by id, else by
    /// case-insensitive exact name, else creates a new manual tenant.
    pub async fn record_manual_snapshot(&self, payload: ManualSnapshotPayload) -> AppResult<Snapshot> {
        validate_amount("revenue", payload.revenue)?;
        validate_amount("collected", payload.collected)?;

        let tenant = match payload.tenant_id.as_deref() {
            Some(tenant_id) => self.tenant(tenant_id)?,
            None => {
                let name = payload.tenant_name.as_deref().map(str::trim).unwrap_or_default();
                if name.is_empty() {
                    return Err(AppError::InvalidInput(
                        "a tenant id or tenant name is required".to_string(),
                    ));
                }
                match self.find_tenant_by_name(name)? {
                    Some(existing) => existing,
                    None => self.store.insert(new_manual_tenant(name))?,
                }
            }
        };

        let snapshot = self.store.insert(manual_snapshot(
            &tenant,
            payload.revenue,
            payload.collected,
            Utc::now(),
        ))?;
        self.touch_last_backup(&tenant.id, snapshot.taken_at)?;
        tracing::info!(tenant_id = %tenant.id, snapshot_id = ?snapshot.id, "manual snapshot recorded");

        self.reload().await?;
        Ok(snapshot)
    }

    /// Replaces revenue and debt on a recorded snapshot. Counts and outcome
    /// are left as they were.
    pub async fn edit_snapshot(&self, payload: EditSnapshotPayload) -> AppResult<Snapshot> {
        validate_amount("revenue", payload.revenue)?;
        validate_amount("collected", payload.collected)?;
        let mut snapshot = self
            .store
            .get_by_id::<Snapshot>(payload.snapshot_id)?
            .ok_or_else(|| AppError::NotFound(format!("Snapshot {} not found", payload.snapshot_id)))?;

        snapshot.stats = Some(edited_stats(snapshot.stats, payload.revenue, payload.collected));
        let snapshot = self.store.upsert(snapshot)?;
        self.reload().await?;
        Ok(snapshot)
    }

    pub async fn delete_snapshot(&self, snapshot_id: i64) -> AppResult<()> {
        self.store.delete_by_id(Collection::SnapshotHistory, snapshot_id)?;
        self.reload().await
    }

    fn find_tenant_by_name(&self, name: &str) -> AppResult<Option<Tenant>> {
        let wanted = name.to_lowercase();
        Ok(self
            .store
            .list_all::<Tenant>()?
            .into_iter()
            .find(|tenant| tenant.name.to_lowercase() == wanted))
    }

    /// Re-reads the tenant so a concurrent edit is not overwritten with a
    /// stale copy. A tenant deleted meanwhile is left deleted.
    fn touch_last_backup(&self, tenant_id: &str, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(mut tenant) = self.store.get_by_id::<Tenant>(tenant_id)? {
            tenant.last_backup_at = Some(at);
            self.store.upsert(tenant)?;
        }
        Ok(())
    }

    async fn send_backup_report(&self, tenant: &Tenant, report: &str) {
        let entries = match self.store.list_all::<SettingEntry>() {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(tenant_id = %tenant.id, error = %error, "settings unreadable, backup report skipped");
                return;
            }
        };
        let settings = AppSettings::from_entries(&entries);
        let Some(token) = settings.bot_token.as_deref() else {
            return;
        };
        let Ok(chat_id) = resolve_channel(tenant, &settings) else {
            return;
        };

        let sent = match self.messaging.connect(token) {
            Ok(messenger) => messenger.send_text(&chat_id, report).await,
            Err(error) => Err(error),
        };
        if let Err(error) = sent {
            tracing::warn!(tenant_id = %tenant.id, error = %error, "backup report not delivered");
        }
    }

    // ─── Remote browsing ────────────────────────────────────────────────────

    fn remote_source(&self, tenant: &Tenant) -> AppResult<Arc<dyn RemoteSource>> {
        self.remote
            .connect(tenant)?
            .ok_or_else(|| AppError::NoRemoteConfigured(tenant.id.clone()))
    }

    /// Readable tables of the tenant's source, rebuilt on every call.
    pub async fn browse_tables(&self, tenant_id: &str) -> AppResult<Vec<TableDescriptor>> {
        let tenant = self.tenant(tenant_id)?;
        let source = self.remote_source(&tenant)?;
        Ok(self.discovery.discover(source.as_ref()).await)
    }

    /// `Online` when a customer count succeeds. Manual tenants are always
    /// offline and never touch the network.
    pub async fn check_connection(&self, tenant_id: &str) -> AppResult<ConnectionStatus> {
        let tenant = self.tenant(tenant_id)?;
        let Some(source) = self.remote.connect(&tenant)? else {
            return Ok(ConnectionStatus::Offline);
        };
        match source.count(&self.config.aggregation.customers_table).await {
            Ok(_) => Ok(ConnectionStatus::Online),
            Err(error) => {
                tracing::debug!(tenant_id = %tenant.id, error = %error, "connection check failed");
                Ok(ConnectionStatus::Offline)
            }
        }
    }

    /// Latest rows of the activity table, newest first.
    pub async fn recent_activity(&self, tenant_id: &str) -> AppResult<Vec<Row>> {
        let tenant = self.tenant(tenant_id)?;
        let Some(source) = self.remote.connect(&tenant)? else {
            return Ok(Vec::new());
        };
        let query = SelectQuery::all()
            .order_desc(self.config.activity_order_column.clone())
            .limit(self.config.activity_limit);
        source.select(&self.config.activity_table, &query).await
    }

    // ─── Export ─────────────────────────────────────────────────────────────

    /// Fetches the selected tables once and hands them to one sink. Missing
    /// messaging configuration fails before any table is fetched.
    pub async fn export_tables(
        &self,
        tenant_id: &str,
        tables: &[String],
        format: ExportFormat,
    ) -> AppResult<ExportResponse> {
        let tenant = self.tenant(tenant_id)?;
        let source = self.remote_source(&tenant)?;

        let delivery = match format {
            ExportFormat::Message => {
                let settings = AppSettings::from_entries(&self.store.list_all::<SettingEntry>()?);
                let token = settings.bot_token.clone().ok_or(AppError::NoBotCredential)?;
                let chat_id = resolve_channel(&tenant, &settings)?;
                Some((self.messaging.connect(&token)?, chat_id))
            }
            ExportFormat::Document | ExportFormat::Workbook => None,
        };

        let data = fetch_tables(source.as_ref(), tables, self.config.export_concurrency).await;
        let now = Utc::now();
        let mut response = ExportResponse {
            format,
            tables: data.summaries(),
            path: None,
            sheets: Vec::new(),
        };

        match (format, delivery) {
            (ExportFormat::Document, _) => {
                let file_name = export_file_name(&tenant.name, now.date_naive(), "json");
                let path = write_export(&self.export_dir(), &file_name, render_document(&data)?.as_bytes())?;
                response.path = Some(path.to_string_lossy().to_string());
            }
            (ExportFormat::Workbook, _) => {
                let workbook = render_workbook(&data)?;
                let file_name = export_file_name(&tenant.name, now.date_naive(), "xlsx");
                let path = write_export(&self.export_dir(), &file_name, &workbook.bytes)?;
                response.path = Some(path.to_string_lossy().to_string());
                response.sheets = workbook.sheets;
            }
            (ExportFormat::Message, Some((messenger, chat_id))) => {
                send_export_message(messenger.as_ref(), &chat_id, &tenant.name, &data, now).await?;
            }
            (ExportFormat::Message, None) => {
                return Err(AppError::Internal("messaging sink was not resolved".to_string()));
            }
        }

        tracing::info!(
            tenant_id = %tenant.id,
            format = ?format,
            requested = tables.len(),
            exported = response.tables.len(),
            "export finished"
        );
        Ok(response)
    }

    // ─── Dashboard ──────────────────────────────────────────────────────────

    /// Totals over the latest successful snapshot of each existing tenant,
    /// plus fleet-wide counts. Snapshots of deleted tenants only count toward
    /// the lifetime figures.
    pub async fn dashboard_summary(&self) -> DashboardSummary {
        let state = self.state.read().await;
        let mut latest: HashMap<&str, &Snapshot> = HashMap::new();
        for snapshot in state.history.iter().filter(|snapshot| snapshot.is_success()) {
            latest.insert(snapshot.tenant_id.as_str(), snapshot);
        }

        let mut summary = DashboardSummary {
            tenant_count: state.tenants.len(),
            active_tenant_count: state
                .tenants
                .iter()
                .filter(|tenant| tenant.status == TenantStatus::Active)
                .count(),
            successful_snapshots: state.history.iter().filter(|snapshot| snapshot.is_success()).count(),
            lifetime_revenue: state
                .history
                .iter()
                .filter_map(|snapshot| snapshot.stats)
                .map(|stats| stats.total_revenue)
                .sum(),
            ..DashboardSummary::default()
        };
        for tenant in &state.tenants {
            if let Some(stats) = latest.get(tenant.id.as_str()).and_then(|snapshot| snapshot.stats) {
                summary.latest_revenue += stats.total_revenue;
                summary.latest_outstanding += stats.total_debt;
            }
        }
        summary.latest_collected = summary.latest_revenue - summary.latest_outstanding;
        summary
    }

    // ─── Settings ───────────────────────────────────────────────────────────

    pub async fn set_setting(&self, key: &str, value: &str) -> AppResult<AppSettings> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidInput("setting key is required".to_string()));
        }
        self.store.upsert(SettingEntry {
            key: key.to_string(),
            value: value.trim().to_string(),
        })?;
        self.reload().await?;
        Ok(self.settings().await)
    }

    /// Writes both known settings key by key. `None` clears a value.
    pub async fn save_settings(&self, settings: AppSettings) -> AppResult<AppSettings> {
        for (key, value) in [
            (BOT_TOKEN_KEY, settings.bot_token),
            (DEFAULT_CHAT_ID_KEY, settings.default_chat_id),
        ] {
            self.store.upsert(SettingEntry {
                key: key.to_string(),
                value: value.unwrap_or_default().trim().to_string(),
            })?;
        }
        self.reload().await?;
        Ok(self.settings().await)
    }

    // ─── Notes & schedule ───────────────────────────────────────────────────

    pub fn add_note(&self, tenant_id: &str, body: &str) -> AppResult<Note> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::InvalidInput("note body is required".to_string()));
        }
        self.store.insert(Note {
            id: None,
            tenant_id: tenant_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        })
    }

    pub fn notes_for(&self, tenant_id: &str) -> AppResult<Vec<Note>> {
        self.store.list_by_index(IndexField::TenantId, &tenant_id)
    }

    pub fn delete_note(&self, note_id: i64) -> AppResult<()> {
        self.store.delete_by_id(Collection::Notes, note_id)
    }

    pub fn add_schedule_entry(&self, tenant_id: &str, title: &str, date: NaiveDate) -> AppResult<ScheduleEntry> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidInput("schedule title is required".to_string()));
        }
        self.store.insert(ScheduleEntry {
            id: None,
            tenant_id: tenant_id.to_string(),
            title: title.to_string(),
            date,
            completed: false,
            created_at: Utc::now(),
        })
    }

    /// The tenant's entries ordered by date.
    pub fn schedule_for(&self, tenant_id: &str) -> AppResult<Vec<ScheduleEntry>> {
        let mut entries: Vec<ScheduleEntry> = self.store.list_by_index(IndexField::TenantId, &tenant_id)?;
        entries.sort_by_key(|entry| entry.date);
        Ok(entries)
    }

    /// Open entries across every tenant due on or before `date`.
    pub fn pending_schedule(&self, date: NaiveDate) -> AppResult<Vec<ScheduleEntry>> {
        let mut entries: Vec<ScheduleEntry> = self
            .store
            .list_by_index::<ScheduleEntry>(IndexField::Completed, &false)?
            .into_iter()
            .filter(|entry| entry.date <= date)
            .collect();
        entries.sort_by_key(|entry| entry.date);
        Ok(entries)
    }

    pub fn complete_schedule_entry(&self, entry_id: i64) -> AppResult<ScheduleEntry> {
        let mut entry = self
            .store
            .get_by_id::<ScheduleEntry>(entry_id)?
            .ok_or_else(|| AppError::NotFound(format!("Schedule entry {} not found", entry_id)))?;
        entry.completed = true;
        self.store.upsert(entry)
    }

    pub fn delete_schedule_entry(&self, entry_id: i64) -> AppResult<()> {
        self.store.delete_by_id(Collection::Schedule, entry_id)
    }
}

fn validate_tenant(tenant: &Tenant) -> AppResult<()> {
    if tenant.id.trim().is_empty() {
        return Err(AppError::InvalidInput("tenant id is required".to_string()));
    }
    if tenant.name.trim().is_empty() {
        return Err(AppError::InvalidInput("tenant name is required".to_string()));
    }
    Ok(())
}

fn validate_amount(field: &str, value: f64) -> AppResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!("{} must be a finite number", field)))
    }
}

fn new_manual_tenant(name: &str) -> Tenant {
    let mut tenant = Tenant::new(format!("manual_{}", uuid::Uuid::new_v4().simple()), name);
    if name.chars().all(|ch| ch.is_ascii_digit()) {
        tenant.phone = Some(name.to_string());
    }
    tenant
}
