use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tenant_console_lib::{
    init_tracing, EditSnapshotPayload, ExportFormat, ManualSnapshotPayload, Tenant, TenantConsole, TenantStatus,
};

#[derive(Parser, Debug)]
#[command(name = "tenant-console", version, about = "Tenant data aggregation console")]
struct Cli {
    /// Directory holding the local store, config, exports and logs
    #[arg(long, env = "TENANT_CONSOLE_DATA_DIR", default_value = ".tenant-console")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tenants
    Tenants,
    /// Register a tenant; omit the remote options for a manual tenant
    AddTenant {
        id: String,
        name: String,
        #[arg(long)]
        remote_url: Option<String>,
        #[arg(long)]
        remote_key: Option<String>,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        inactive: bool,
    },
    /// Delete a tenant record (history is kept)
    RemoveTenant { id: String },
    /// Snapshot one tenant from its remote source
    Backup { id: String },
    /// Snapshot every active remote tenant
    BackupAll,
    /// Record hand-entered figures by tenant id or name
    Manual {
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        revenue: f64,
        #[arg(long)]
        collected: f64,
    },
    /// Show snapshot history
    History,
    /// Recompute revenue and debt of a recorded snapshot
    EditSnapshot {
        id: i64,
        #[arg(long)]
        revenue: f64,
        #[arg(long)]
        collected: f64,
    },
    DeleteSnapshot { id: i64 },
    /// Discover readable tables of a tenant's source
    Tables { id: String },
    /// Export selected tables to a file or the messaging channel
    Export {
        id: String,
        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
        #[arg(required = true)]
        tables: Vec<String>,
    },
    /// Check whether a tenant's source answers
    Ping { id: String },
    /// Latest activity rows of a tenant's source
    Activity { id: String },
    Settings,
    SetSetting { key: String, value: String },
    Dashboard,
    /// Add a note to a tenant, or list its notes when no text is given
    Note { id: String, text: Option<String> },
    /// Schedule a follow-up, or list the tenant's schedule when no title is given
    Schedule {
        id: String,
        #[arg(long, requires = "title")]
        date: Option<NaiveDate>,
        #[arg(long, requires = "date")]
        title: Option<String>,
    },
    /// Mark a schedule entry done
    Complete { entry_id: i64 },
    /// Run `backup-all` repeatedly on the configured interval
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Json,
    Xlsx,
    Message,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Json => ExportFormat::Document,
            FormatArg::Xlsx => ExportFormat::Workbook,
            FormatArg::Message => ExportFormat::Message,
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating data directory {}", cli.data_dir.display()))?;
    if let Err(error) = init_tracing(&cli.data_dir) {
        eprintln!("logging disabled: {}", error);
    }

    let console = TenantConsole::new(cli.data_dir.clone()).await?;

    match cli.command {
        Command::Tenants => print_json(&console.tenants().await)?,
        Command::AddTenant {
            id,
            name,
            remote_url,
            remote_key,
            channel,
            inactive,
        } => {
            let mut tenant = Tenant::new(id, name);
            tenant.remote_url = remote_url;
            tenant.remote_key = remote_key;
            tenant.messaging_channel_id = channel;
            if inactive {
                tenant.status = TenantStatus::Inactive;
            }
            print_json(&console.add_tenant(tenant).await?)?;
        }
        Command::RemoveTenant { id } => console.delete_tenant(&id).await?,
        Command::Backup { id } => print_json(&console.run_backup(&id).await?)?,
        Command::BackupAll => print_json(&console.backup_all().await?)?,
        Command::Manual {
            id,
            name,
            revenue,
            collected,
        } => {
            let snapshot = console
                .record_manual_snapshot(ManualSnapshotPayload {
                    tenant_id: id,
                    tenant_name: name,
                    revenue,
                    collected,
                })
                .await?;
            print_json(&snapshot)?;
        }
        Command::History => print_json(&console.history().await)?,
        Command::EditSnapshot {
            id,
            revenue,
            collected,
        } => {
            let snapshot = console
                .edit_snapshot(EditSnapshotPayload {
                    snapshot_id: id,
                    revenue,
                    collected,
                })
                .await?;
            print_json(&snapshot)?;
        }
        Command::DeleteSnapshot { id } => console.delete_snapshot(id).await?,
        Command::Tables { id } => print_json(&console.browse_tables(&id).await?)?,
        Command::Export { id, format, tables } => {
            print_json(&console.export_tables(&id, &tables, format.into()).await?)?
        }
        Command::Ping { id } => print_json(&console.check_connection(&id).await?)?,
        Command::Activity { id } => print_json(&console.recent_activity(&id).await?)?,
        Command::Settings => print_json(&console.settings().await)?,
        Command::SetSetting { key, value } => print_json(&console.set_setting(&key, &value).await?)?,
        Command::Dashboard => print_json(&console.dashboard_summary().await)?,
        Command::Note { id, text } => match text {
            Some(text) => print_json(&console.add_note(&id, &text)?)?,
            None => print_json(&console.notes_for(&id)?)?,
        },
        Command::Schedule { id, date, title } => match (date, title) {
            (Some(date), Some(title)) => print_json(&console.add_schedule_entry(&id, &title, date)?)?,
            _ => print_json(&console.schedule_for(&id)?)?,
        },
        Command::Complete { entry_id } => print_json(&console.complete_schedule_entry(entry_id)?)?,
        Command::Watch { interval_secs } => {
            let secs = interval_secs.unwrap_or(console.config().backup_interval_secs);
            if secs == 0 {
                bail!("backup interval must be at least one second");
            }
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            loop {
                interval.tick().await;
                match console.backup_all().await {
                    Ok(snapshots) => {
                        let failed = snapshots.iter().filter(|snapshot| !snapshot.is_success()).count();
                        tracing::info!(recorded = snapshots.len(), failed, "periodic backup pass finished");
                        if let Ok(due) = console.pending_schedule(Utc::now().date_naive()) {
                            if !due.is_empty() {
                                tracing::info!(due = due.len(), "schedule entries due");
                            }
                        }
                    }
                    Err(error) => tracing::warn!(error = %error, "periodic backup pass failed"),
                }
            }
        }
    }
    Ok(())
}
