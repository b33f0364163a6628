use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tenant_console_lib::{
    open_store, AppError, AppResult, ConsoleConfig, ExportFormat, ManualSnapshotPayload, RemoteConnector,
    RemoteSource, Row, SelectQuery, SnapshotOutcome, Store, Tenant, TenantConsole, STORE_FILE_NAME,
};
use tenant_console_lib::{Attachment, Messenger, MessengerConnector};

#[derive(Default)]
struct TableSource {
    tables: BTreeMap<String, Vec<Row>>,
    calls: Mutex<usize>,
}

impl TableSource {
    fn with_table(mut self, name: &str, rows: Vec<Value>) -> Self {
        let rows = rows.into_iter().filter_map(|row| row.as_object().cloned()).collect();
        self.tables.insert(name.to_string(), rows);
        self
    }

    fn rows(&self, table: &str) -> AppResult<Vec<Row>> {
        *self.calls.lock().expect("calls") += 1;
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| AppError::remote(table, "HTTP 404"))
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().expect("calls")
    }
}

#[async_trait]
impl RemoteSource for TableSource {
    async fn describe(&self) -> AppResult<Value> {
        Err(AppError::remote("(schema)", "HTTP 404"))
    }

    async fn count(&self, table: &str) -> AppResult<u64> {
        Ok(self.rows(table)?.len() as u64)
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> AppResult<Vec<Row>> {
        let mut rows = self.rows(table)?;
        if !query.columns.is_empty() {
            for row in &mut rows {
                row.retain(|column, _| query.columns.contains(column));
            }
        }
        Ok(rows)
    }
}

struct SharedConnector(Arc<TableSource>);

impl RemoteConnector for SharedConnector {
    fn connect(&self, tenant: &Tenant) -> AppResult<Option<Arc<dyn RemoteSource>>> {
        if tenant.is_manual() {
            return Ok(None);
        }
        let source: Arc<dyn RemoteSource> = self.0.clone();
        Ok(Some(source))
    }
}

#[derive(Default)]
struct Outbox(Mutex<Vec<String>>);

#[async_trait]
impl Messenger for Outbox {
    async fn send_text(&self, chat_id: &str, text: &str) -> AppResult<()> {
        self.0.lock().expect("outbox").push(format!("{}:{}", chat_id, text));
        Ok(())
    }

    async fn send_document(&self, chat_id: &str, attachment: Attachment) -> AppResult<()> {
        self.0
            .lock()
            .expect("outbox")
            .push(format!("{}:file:{}", chat_id, attachment.file_name));
        Ok(())
    }
}

struct OutboxConnector(Arc<Outbox>);

impl MessengerConnector for OutboxConnector {
    fn connect(&self, bot_token: &str) -> AppResult<Arc<dyn Messenger>> {
        if bot_token.trim().is_empty() {
            return Err(AppError::NoBotCredential);
        }
        let messenger: Arc<dyn Messenger> = self.0.clone();
        Ok(messenger)
    }
}

fn installment_source() -> TableSource {
    TableSource::default()
        .with_table("customers", vec![json!({"id": 1}), json!({"id": 2})])
        .with_table(
            "installment_contracts",
            vec![json!({"total_price": 1000}), json!({"total_price": 500})],
        )
        .with_table("payments", vec![json!({"amount": 300})])
}

async fn console_at(
    store: Arc<Store>,
    dir: &std::path::Path,
    source: Arc<TableSource>,
    outbox: Arc<Outbox>,
) -> Arc<TenantConsole> {
    TenantConsole::with_connectors(
        dir.to_path_buf(),
        ConsoleConfig::default(),
        store,
        Arc::new(SharedConnector(source)),
        Arc::new(OutboxConnector(outbox)),
    )
    .await
    .expect("console")
}

#[tokio::test]
async fn remote_and_manual_tenants_share_one_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir.path().join(STORE_FILE_NAME)).expect("store");
    let source = Arc::new(installment_source());
    let outbox = Arc::new(Outbox::default());
    let console = console_at(store, dir.path(), source.clone(), outbox.clone()).await;

    console
        .add_tenant(Tenant::new("t1", "T1").with_remote("https://t1.example.co", "anon"))
        .await
        .expect("add t1");
    let remote = console.run_backup("t1").await.expect("backup");
    let stats = remote.stats.expect("stats");
    assert_eq!(stats.total_revenue, 1500.0);
    assert_eq!(stats.total_collected(), 300.0);
    assert_eq!(stats.total_debt, 1200.0);

    let calls_before_manual = source.call_count();
    let manual = console
        .record_manual_snapshot(ManualSnapshotPayload {
            tenant_id: None,
            tenant_name: Some("Ahmed".to_string()),
            revenue: 2000.0,
            collected: 800.0,
        })
        .await
        .expect("manual");
    assert_eq!(source.call_count(), calls_before_manual);
    assert_eq!(manual.stats.map(|stats| stats.total_debt), Some(1200.0));

    let history = console.history().await;
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|snapshot| snapshot.outcome == SnapshotOutcome::Success));
    assert_eq!(console.tenants().await.len(), 2);
}

#[tokio::test]
async fn reopened_store_sees_the_same_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(STORE_FILE_NAME);
    let first = open_store(&path).expect("first open");
    let second = open_store(&path).expect("second open");
    assert!(Arc::ptr_eq(&first, &second));

    let console = console_at(
        first,
        dir.path(),
        Arc::new(TableSource::default()),
        Arc::new(Outbox::default()),
    )
    .await;
    console.add_tenant(Tenant::new("m1", "Corner Shop")).await.expect("add");

    let reopened = Store::open(&path).expect("independent reopen");
    assert_eq!(reopened.list_all::<Tenant>().expect("tenants").len(), 1);
}

#[tokio::test]
async fn message_export_reaches_default_channel() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir.path().join(STORE_FILE_NAME)).expect("store");
    let outbox = Arc::new(Outbox::default());
    let console = console_at(store, dir.path(), Arc::new(installment_source()), outbox.clone()).await;

    console
        .add_tenant(Tenant::new("t1", "Shop").with_remote("https://t1.example.co", "anon"))
        .await
        .expect("add");
    console.set_setting("bot_token", "123:abc").await.expect("token");
    console.set_setting("default_chat_id", "-100").await.expect("chat");

    let tables = vec!["payments".to_string(), "missing".to_string()];
    let response = console
        .export_tables("t1", &tables, ExportFormat::Message)
        .await
        .expect("export");
    assert_eq!(response.tables.len(), 1);

    let sent = outbox.0.lock().expect("outbox").clone();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].starts_with("-100:*Data export - Shop*"));
    assert!(sent[0].contains("payments: 1 records"));
    assert_eq!(sent[1], "-100:file:Shop_export.json");
}

#[tokio::test]
async fn empty_workbook_export_still_writes_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir.path().join(STORE_FILE_NAME)).expect("store");
    let console = console_at(
        store,
        dir.path(),
        Arc::new(installment_source()),
        Arc::new(Outbox::default()),
    )
    .await;
    console
        .add_tenant(Tenant::new("t1", "Shop").with_remote("https://t1.example.co", "anon"))
        .await
        .expect("add");

    let response = console
        .export_tables("t1", &[], ExportFormat::Workbook)
        .await
        .expect("export");
    assert!(response.sheets.is_empty());
    assert!(response.tables.is_empty());
    let path = response.path.expect("path");
    assert!(std::fs::metadata(&path).expect("file").len() > 0);

    let document = console
        .export_tables("t1", &[], ExportFormat::Document)
        .await
        .expect("document");
    let written = std::fs::read_to_string(document.path.expect("path")).expect("read");
    assert_eq!(written, "{}");
}
