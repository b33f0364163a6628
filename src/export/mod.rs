//! Best-effort export of selected remote tables to one sink per invocation.

mod document;
mod message;
mod workbook;

pub use document::{export_file_name, render_document, write_export};
pub(crate) use message::escape_markdown;
pub use message::{compose_summary, resolve_channel, send_export_message};
pub use workbook::{render_workbook, sheet_name, RenderedWorkbook, MAX_SHEET_NAME_CHARS};

use crate::fanout::fan_out;
use crate::models::{ExportedTableSummary, Row};
use crate::remote::RemoteSource;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedTable {
    pub name: String,
    pub rows: Vec<Row>,
}

/// Fetched rows keyed by table, iterating in the order tables were requested.
/// Serializes as a JSON object of `table -> [rows]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportData {
    tables: Vec<ExportedTable>,
}

impl ExportData {
    pub fn tables(&self) -> &[ExportedTable] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[Row]> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .map(|table| table.rows.as_slice())
    }

    pub fn summaries(&self) -> Vec<ExportedTableSummary> {
        self.tables
            .iter()
            .map(|table| ExportedTableSummary {
                name: table.name.clone(),
                row_count: table.rows.len(),
            })
            .collect()
    }
}

impl FromIterator<ExportedTable> for ExportData {
    fn from_iter<I: IntoIterator<Item = ExportedTable>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().collect(),
        }
    }
}

impl Serialize for ExportData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for table in &self.tables {
            map.serialize_entry(&table.name, &table.rows)?;
        }
        map.end()
    }
}

/// Fetches every requested table's full row set with at most `concurrency`
/// reads in flight. Tables whose fetch fails are left out of the result.
pub async fn fetch_tables(source: &dyn RemoteSource, table_names: &[String], concurrency: usize) -> ExportData {
    let mut seen = HashSet::new();
    let requested: Vec<String> = table_names
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect();

    let outcome = fan_out(requested, Some(concurrency), |table: String| async move {
        source.select_all(&table).await
    })
    .await;

    for (table, error) in &outcome.failed {
        tracing::warn!(table = %table, error = %error, "table omitted from export");
    }

    outcome
        .succeeded
        .into_iter()
        .map(|(name, rows)| ExportedTable { name, rows })
        .collect()
}
