use super::ExportData;
use crate::errors::{AppError, AppResult};
use crate::models::Row;
use once_cell::sync::Lazy;
use rust_xlsxwriter::{Workbook, Worksheet};
use serde_json::Value;
use std::collections::HashSet;

pub const MAX_SHEET_NAME_CHARS: usize = 31;
const MAX_CELL_CHARS: usize = 32_767;
const MAX_COLUMNS: usize = 16_384;

static INVALID_SHEET_CHARS: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[\[\]:*?/\\]").expect("valid sheet name regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedWorkbook {
    pub bytes: Vec<u8>,
    /// Sheets written, one per non-empty table, in export order.
    pub sheets: Vec<String>,
}

/// One sheet per table with at least one row. The header row is the union
/// of the table's columns in first-seen order.
pub fn render_workbook(data: &ExportData) -> AppResult<RenderedWorkbook> {
    let mut workbook = Workbook::new();
    let mut sheets = Vec::new();
    let mut used = HashSet::new();

    for table in data.tables().iter().filter(|table| !table.rows.is_empty()) {
        let name = unique_sheet_name(&table.name, &mut used);
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name.as_str())?;
        write_rows(worksheet, &table.rows)?;
        sheets.push(name);
    }

    let bytes = workbook.save_to_buffer()?;
    Ok(RenderedWorkbook { bytes, sheets })
}

/// Table name cut to the format's 31-character limit, with characters the
/// format forbids replaced.
pub fn sheet_name(table: &str) -> String {
    let cleaned = INVALID_SHEET_CHARS.replace_all(table, "_");
    let truncated: String = cleaned.chars().take(MAX_SHEET_NAME_CHARS).collect();
    let trimmed = truncated.trim_matches('\'');
    if trimmed.trim().is_empty() {
        "Sheet".to_string()
    } else {
        trimmed.to_string()
    }
}

fn unique_sheet_name(table: &str, used: &mut HashSet<String>) -> String {
    let base = sheet_name(table);
    if used.insert(base.to_lowercase()) {
        return base;
    }
    let mut counter = 2usize;
    loop {
        let suffix = format!("~{}", counter);
        let keep = MAX_SHEET_NAME_CHARS - suffix.chars().count();
        let stem: String = base.chars().take(keep).collect();
        let candidate = format!("{}{}", stem.trim_end_matches('\''), suffix);
        if used.insert(candidate.to_lowercase()) {
            return candidate;
        }
        counter += 1;
    }
}

fn columns_of(rows: &[Row]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for row in rows {
        for column in row.keys() {
            if seen.insert(column.as_str()) {
                columns.push(column.as_str());
            }
        }
    }
    columns
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Row]) -> AppResult<()> {
    let columns = columns_of(rows);
    if columns.len() > MAX_COLUMNS {
        return Err(AppError::InvalidInput(format!(
            "table has {} columns, more than a sheet can hold",
            columns.len()
        )));
    }

    for (col, column) in columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, *column)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let row_number = u32::try_from(index + 1)
            .map_err(|_| AppError::InvalidInput("table has too many rows for a sheet".to_string()))?;
        for (col, column) in columns.iter().enumerate() {
            let col = col as u16;
            match row.get(*column) {
                None | Some(Value::Null) => {}
                Some(Value::Bool(value)) => {
                    worksheet.write_boolean(row_number, col, *value)?;
                }
                Some(Value::Number(value)) => match value.as_f64() {
                    Some(number) => {
                        worksheet.write_number(row_number, col, number)?;
                    }
                    None => {
                        worksheet.write_string(row_number, col, cell_text(&value.to_string()))?;
                    }
                },
                Some(Value::String(value)) => {
                    worksheet.write_string(row_number, col, cell_text(value))?;
                }
                Some(other) => {
                    worksheet.write_string(row_number, col, cell_text(&other.to_string()))?;
                }
            }
        }
    }
    Ok(())
}

fn cell_text(raw: &str) -> String {
    raw.chars().take(MAX_CELL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::{columns_of, render_workbook, sheet_name, unique_sheet_name};
    use crate::export::{ExportData, ExportedTable};
    use crate::models::Row;
    use serde_json::json;
    use std::collections::HashSet;

    fn rows(values: Vec<serde_json::Value>) -> Vec<Row> {
        values.into_iter().filter_map(|value| value.as_object().cloned()).collect()
    }

    #[test]
    fn long_names_are_cut_to_31_chars() {
        let name = sheet_name("installment_contracts_archive_2024_q4");
        assert_eq!(name, "installment_contracts_archive_2");
        assert_eq!(name.chars().count(), 31);
        assert_eq!(sheet_name("a/b[c]"), "a_b_c_");
    }

    #[test]
    fn colliding_truncations_get_suffixes() {
        let mut used = HashSet::new();
        let first = unique_sheet_name("installment_contracts_archive_2023", &mut used);
        let second = unique_sheet_name("installment_contracts_archive_2024", &mut used);
        assert_eq!(first, "installment_contracts_archive_2");
        assert_eq!(second, "installment_contracts_archive~2");
        assert_eq!(second.chars().count(), 31);
    }

    #[test]
    fn header_is_union_of_columns_in_first_seen_order() {
        let rows = rows(vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "phone": "0555"})]);
        assert_eq!(columns_of(&rows), vec!["id", "name", "phone"]);
    }

    #[test]
    fn empty_tables_are_not_written() {
        let data: ExportData = vec![
            ExportedTable {
                name: "customers".to_string(),
                rows: rows(vec![json!({"id": 1, "tags": ["a"], "meta": {"k": true}, "gone": null})]),
            },
            ExportedTable {
                name: "payments".to_string(),
                rows: Vec::new(),
            },
        ]
        .into_iter()
        .collect();

        let workbook = render_workbook(&data).expect("render");
        assert_eq!(workbook.sheets, vec!["customers".to_string()]);
        assert!(workbook.bytes.starts_with(b"PK"));
    }

    #[test]
    fn empty_export_still_produces_a_file() {
        let workbook = render_workbook(&ExportData::default()).expect("render");
        assert!(workbook.sheets.is_empty());
        assert!(workbook.bytes.starts_with(b"PK"));
    }

    #[test]
    fn apostrophe_at_the_cut_is_trimmed() {
        let table = "abcdefghijklmnopqrstuvwxyz1234'x";
        assert_eq!(sheet_name(table), "abcdefghijklmnopqrstuvwxyz1234");

        let mut used = HashSet::new();
        unique_sheet_name("abcdefghijklmnopqrstuvwxyz12'34_a", &mut used);
        let second = unique_sheet_name("abcdefghijklmnopqrstuvwxyz12'34_b", &mut used);
        assert_eq!(second, "abcdefghijklmnopqrstuvwxyz12~2");

        let data: ExportData = vec![ExportedTable {
            name: table.to_string(),
            rows: rows(vec![json!({"id": 1})]),
        }]
        .into_iter()
        .collect();
        let workbook = render_workbook(&data).expect("render");
        assert_eq!(workbook.sheets, vec!["abcdefghijklmnopqrstuvwxyz1234".to_string()]);
    }
}
