mod config;
mod console;
mod db;
mod discovery;
mod errors;
mod export;
mod fanout;
mod messaging;
mod models;
mod remote;
mod snapshot;

pub use crate::config::{AggregationConfig, ConsoleConfig, CONFIG_FILE_NAME};
pub use crate::console::{ConsoleState, TenantConsole};
pub use crate::db::{open_store, Collection, IndexField, Record, Store, StoreKey, STORE_FILE_NAME, STORE_VERSION};
pub use crate::discovery::{resource_names, DiscoveryStrategy, IntrospectionStrategy, ProbeStrategy, SchemaDiscovery};
pub use crate::errors::{AppError, AppResult};
pub use crate::export::{
    compose_summary, export_file_name, fetch_tables, render_document, render_workbook, sheet_name, ExportData,
    ExportedTable, RenderedWorkbook, MAX_SHEET_NAME_CHARS,
};
pub use crate::fanout::{fan_out, FanOut};
pub use crate::messaging::{
    backup_report, Attachment, Messenger, MessengerConnector, TelegramConnector, TelegramMessenger,
};
pub use crate::models::*;
pub use crate::remote::{
    OrderBy, PostgrestClient, PostgrestConnector, RemoteConnector, RemoteSource, SelectQuery,
};
pub use crate::snapshot::{edited_stats, manual_snapshot, sum_column, FinancialFigures, SnapshotBuilder};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the JSON file logger under `<data_dir>/logs`. `RUST_LOG`
/// overrides the default `info` filter.
pub fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "console.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
