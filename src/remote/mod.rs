//! Per-tenant connectors to remote tabular data sources.
//!
//! A client is built fresh from the tenant's credentials for every operation
//! and never caches. Manual tenants have no client at all.

mod postgrest;

#[cfg(test)]
pub(crate) mod fake;

pub use postgrest::{PostgrestClient, PostgrestConnector};

use crate::errors::AppResult;
use crate::models::{Row, Tenant};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Column projection, ordering and row limit for a remote read.
/// An empty column list selects every column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub columns: Vec<String>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn select_clause(&self) -> String {
        if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        }
    }
}

/// Tabular reads against one tenant's remote source. Every call is a single
/// round-trip; failures surface as `RemoteUnavailable` naming the table.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// The endpoint's self-describing interface document, if it serves one.
    async fn describe(&self) -> AppResult<serde_json::Value>;

    /// Exact row count without transferring rows.
    async fn count(&self, table: &str) -> AppResult<u64>;

    async fn select(&self, table: &str, query: &SelectQuery) -> AppResult<Vec<Row>>;

    async fn select_columns(&self, table: &str, columns: &[&str]) -> AppResult<Vec<Row>> {
        self.select(table, &SelectQuery::columns(columns.iter().copied()))
            .await
    }

    async fn select_all(&self, table: &str) -> AppResult<Vec<Row>> {
        self.select(table, &SelectQuery::all()).await
    }
}

/// Builds a remote client for a tenant; `None` for manual tenants.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, tenant: &Tenant) -> AppResult<Option<Arc<dyn RemoteSource>>>;
}
