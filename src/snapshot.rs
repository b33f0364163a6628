use crate::config::AggregationConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{Row, Snapshot, SnapshotStats, Tenant};
use crate::remote::RemoteSource;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Figures pulled from a tenant's source before they are folded into stats.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FinancialFigures {
    pub customers: u64,
    pub contracts: u64,
    pub payments: u64,
    pub total_revenue: f64,
    pub total_collected: f64,
}

impl FinancialFigures {
    pub fn total_debt(&self) -> f64 {
        self.total_revenue - self.total_collected
    }

    pub fn into_stats(self) -> SnapshotStats {
        SnapshotStats::from_figures(
            self.customers,
            self.contracts,
            self.payments,
            self.total_revenue,
            self.total_collected,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    config: AggregationConfig,
}

impl SnapshotBuilder {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Issues the customer count, contract price read and payment amount read
    /// concurrently. The first failing read fails the whole collection.
    pub async fn collect_figures(&self, source: &dyn RemoteSource) -> AppResult<FinancialFigures> {
        let config = &self.config;
        let price_column = [config.contract_price_column.as_str()];
        let amount_column = [config.payment_amount_column.as_str()];
        let (customers, contracts, payments) = tokio::try_join!(
            source.count(&config.customers_table),
            source.select_columns(&config.contracts_table, &price_column),
            source.select_columns(&config.payments_table, &amount_column),
        )?;

        Ok(FinancialFigures {
            customers,
            contracts: contracts.len() as u64,
            payments: payments.len() as u64,
            total_revenue: sum_column(&contracts, &config.contract_price_column),
            total_collected: sum_column(&payments, &config.payment_amount_column),
        })
    }

    /// Builds a snapshot from the tenant's remote source. A remote failure is
    /// not an error here: it produces a `failed` snapshot without stats.
    pub async fn build_snapshot(&self, tenant: &Tenant, source: Option<&dyn RemoteSource>) -> AppResult<Snapshot> {
        let Some(source) = source else {
            return Err(AppError::NoRemoteConfigured(tenant.id.clone()));
        };

        match self.collect_figures(source).await {
            Ok(figures) => Ok(Snapshot::success(tenant, Utc::now(), figures.into_stats())),
            Err(error) => {
                tracing::warn!(tenant_id = %tenant.id, error = %error, "snapshot collection failed");
                Ok(Snapshot::failed(tenant, Utc::now()))
            }
        }
    }
}

/// Snapshot from operator-entered figures. Never touches a remote source.
pub fn manual_snapshot(tenant: &Tenant, revenue: f64, collected: f64, taken_at: DateTime<Utc>) -> Snapshot {
    Snapshot::success(
        tenant,
        taken_at,
        SnapshotStats::from_figures(0, 0, 0, revenue, collected),
    )
}

/// Recomputes revenue and debt from new inputs; counts are preserved.
pub fn edited_stats(existing: Option<SnapshotStats>, revenue: f64, collected: f64) -> SnapshotStats {
    let existing = existing.unwrap_or_default();
    SnapshotStats::from_figures(
        existing.customers,
        existing.contracts,
        existing.payments,
        revenue,
        collected,
    )
}

/// Sums a numeric column; absent, null and non-numeric cells count as 0.
pub fn sum_column(rows: &[Row], column: &str) -> f64 {
    rows.iter()
        .map(|row| row.get(column).map(numeric_value).unwrap_or(0.0))
        .sum()
}

fn numeric_value(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(raw) => raw.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}
