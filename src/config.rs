use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "console.yaml";
const DEFAULT_PROBE_TABLES: &str = include_str!("probe_tables.yaml");

/// Console configuration read from `console.yaml` in the data directory.
/// Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleConfig {
    /// Reference list probed when a source cannot describe itself.
    pub probe_tables: Vec<String>,
    pub aggregation: AggregationConfig,
    pub export_concurrency: usize,
    pub messaging_base_url: String,
    pub activity_table: String,
    pub activity_order_column: String,
    pub activity_limit: usize,
    pub backup_interval_secs: u64,
    /// Per-request limit for remote calls. Unset means no limit.
    pub remote_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregationConfig {
    pub customers_table: String,
    pub contracts_table: String,
    pub contract_price_column: String,
    pub payments_table: String,
    pub payment_amount_column: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            customers_table: "customers".to_string(),
            contracts_table: "installment_contracts".to_string(),
            contract_price_column: "total_price".to_string(),
            payments_table: "payments".to_string(),
            payment_amount_column: "amount".to_string(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            probe_tables: default_probe_tables(),
            aggregation: AggregationConfig::default(),
            export_concurrency: 8,
            messaging_base_url: "https://api.telegram.org".to_string(),
            activity_table: "print_logs".to_string(),
            activity_order_column: "created_at".to_string(),
            activity_limit: 50,
            backup_interval_secs: 86_400,
            remote_timeout_secs: None,
        }
    }
}

impl ConsoleConfig {
    /// Loads `console.yaml` from `data_dir`, falling back to defaults when absent.
    pub fn load(data_dir: &Path) -> AppResult<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Self::from_yaml(&raw)
    }

    pub fn remote_timeout(&self) -> Option<std::time::Duration> {
        self.remote_timeout_secs
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(raw)?;
        config.export_concurrency = config.export_concurrency.max(1);
        Ok(config)
    }
}

fn default_probe_tables() -> Vec<String> {
    serde_yaml::from_str(DEFAULT_PROBE_TABLES).unwrap_or_default()
}
