use super::{RemoteConnector, RemoteSource, SelectQuery};
use crate::errors::{AppError, AppResult};
use crate::models::{Row, Tenant};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-memory remote source that records every call it receives.
#[derive(Default)]
pub(crate) struct FakeSource {
    tables: BTreeMap<String, Vec<Row>>,
    failing: HashSet<String>,
    schema: Option<serde_json::Value>,
    calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_table(mut self, name: &str, rows: Vec<serde_json::Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| row.as_object().cloned())
            .collect();
        self.tables.insert(name.to_string(), rows);
        self
    }

    pub(crate) fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub(crate) fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn rows(&self, table: &str) -> AppResult<&Vec<Row>> {
        if self.failing.contains(table) {
            return Err(AppError::remote(table, "HTTP 503 Service Unavailable"));
        }
        self.tables
            .get(table)
            .ok_or_else(|| AppError::remote(table, "HTTP 404 Not Found"))
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn describe(&self) -> AppResult<serde_json::Value> {
        self.record("describe".to_string());
        self.schema
            .clone()
            .ok_or_else(|| AppError::remote("(schema)", "HTTP 404 Not Found"))
    }

    async fn count(&self, table: &str) -> AppResult<u64> {
        self.record(format!("count:{}", table));
        Ok(self.rows(table)?.len() as u64)
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> AppResult<Vec<Row>> {
        self.record(format!("select:{}:{}", table, query.select_clause()));
        let mut rows = self.rows(table)?.clone();
        if let Some(order) = &query.order_by {
            rows.sort_by(|left, right| {
                let left = left.get(&order.column).map(ToString::to_string).unwrap_or_default();
                let right = right.get(&order.column).map(ToString::to_string).unwrap_or_default();
                if order.descending {
                    right.cmp(&left)
                } else {
                    left.cmp(&right)
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        if !query.columns.is_empty() {
            for row in &mut rows {
                row.retain(|column, _| query.columns.iter().any(|wanted| wanted == column));
            }
        }
        Ok(rows)
    }
}

/// Hands out one shared fake to every tenant that has remote credentials.
pub(crate) struct FakeConnector {
    pub(crate) source: Arc<FakeSource>,
}

impl RemoteConnector for FakeConnector {
    fn connect(&self, tenant: &Tenant) -> AppResult<Option<Arc<dyn RemoteSource>>> {
        if tenant.is_manual() {
            return Ok(None);
        }
        let source: Arc<dyn RemoteSource> = self.source.clone();
        Ok(Some(source))
    }
}
