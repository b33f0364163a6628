//! Schema discovery against a remote source whose table set is unknown.
//!
//! Candidate names come from a primary strategy (the source's own interface
//! document) or, only when that yields nothing, from a configured probe list.
//! A candidate is kept iff a `count` against it succeeds.

use crate::fanout::fan_out;
use crate::models::TableDescriptor;
use crate::remote::RemoteSource;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn candidates(&self, source: &dyn RemoteSource) -> Vec<String>;
}

/// Reads resource names from the endpoint's self-describing document.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntrospectionStrategy;

#[async_trait]
impl DiscoveryStrategy for IntrospectionStrategy {
    fn name(&self) -> &'static str {
        "introspection"
    }

    async fn candidates(&self, source: &dyn RemoteSource) -> Vec<String> {
        match source.describe().await {
            Ok(document) => resource_names(&document),
            Err(error) => {
                tracing::debug!(error = %error, "schema document unavailable");
                Vec::new()
            }
        }
    }
}

/// Offers a fixed reference list of commonly used table names.
#[derive(Debug, Clone, Default)]
pub struct ProbeStrategy {
    tables: Vec<String>,
}

impl ProbeStrategy {
    pub fn new(tables: Vec<String>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl DiscoveryStrategy for ProbeStrategy {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn candidates(&self, _source: &dyn RemoteSource) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.tables
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect()
    }
}

pub struct SchemaDiscovery {
    primary: Box<dyn DiscoveryStrategy>,
    fallback: Box<dyn DiscoveryStrategy>,
}

impl SchemaDiscovery {
    pub fn new(probe_tables: Vec<String>) -> Self {
        Self::with_strategies(
            Box::new(IntrospectionStrategy),
            Box::new(ProbeStrategy::new(probe_tables)),
        )
    }

    pub fn with_strategies(primary: Box<dyn DiscoveryStrategy>, fallback: Box<dyn DiscoveryStrategy>) -> Self {
        Self { primary, fallback }
    }

    /// Readable tables sorted by name. An empty result is a valid outcome.
    pub async fn discover(&self, source: &dyn RemoteSource) -> Vec<TableDescriptor> {
        let mut strategy = self.primary.as_ref();
        let mut candidates = strategy.candidates(source).await;
        if candidates.is_empty() {
            strategy = self.fallback.as_ref();
            candidates = strategy.candidates(source).await;
        }

        let outcome = fan_out(candidates, None, |table: String| async move {
            source.count(&table).await
        })
        .await;

        for (table, error) in &outcome.failed {
            tracing::warn!(table = %table, error = %error, "table not readable");
        }

        let mut tables: Vec<TableDescriptor> = outcome
            .succeeded
            .into_iter()
            .map(|(name, count)| TableDescriptor {
                name,
                approximate_row_count: Some(count),
            })
            .collect();
        tables.sort_by(|left, right| left.name.cmp(&right.name));

        tracing::info!(
            strategy = strategy.name(),
            readable = tables.len(),
            rejected = outcome.failed.len(),
            "schema discovery finished"
        );
        tables
    }
}

/// Resource names from an interface document's `definitions` (preferred) or
/// `paths`, skipping internal (`_`-prefixed) and RPC entries.
pub fn resource_names(document: &Value) -> Vec<String> {
    if let Some(definitions) = document.get("definitions").and_then(Value::as_object) {
        let names: Vec<String> = definitions
            .keys()
            .filter(|name| !name.starts_with('_') && name.as_str() != "rpc")
            .cloned()
            .collect();
        if !names.is_empty() {
            return names;
        }
    }

    document
        .get("paths")
        .and_then(Value::as_object)
        .map(|paths| {
            paths
                .keys()
                .filter(|path| path.starts_with('/') && !path.contains("rpc"))
                .map(|path| path.trim_start_matches('/').to_string())
                .filter(|name| !name.is_empty() && !name.starts_with('_'))
                .collect()
        })
        .unwrap_or_default()
}
