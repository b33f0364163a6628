use super::ExportData;
use crate::errors::{AppError, AppResult};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

static UNSAFE_FILE_CHARS: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).expect("valid file name regex"));

/// Pretty-printed JSON object of `table -> [rows]`; `{}` when nothing was fetched.
pub fn render_document(data: &ExportData) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// `<tenant>_export_<YYYY-MM-DD>.<extension>` with path-unsafe characters replaced.
pub fn export_file_name(tenant_name: &str, date: NaiveDate, extension: &str) -> String {
    let safe = UNSAFE_FILE_CHARS.replace_all(tenant_name.trim(), "_");
    let safe = safe.trim_matches('.');
    let stem = if safe.is_empty() { "tenant" } else { safe };
    format!("{}_export_{}.{}", stem, date.format("%Y-%m-%d"), extension)
}

pub fn write_export(export_dir: &Path, file_name: &str, contents: &[u8]) -> AppResult<PathBuf> {
    std::fs::create_dir_all(export_dir).map_err(|error| AppError::Io(error.to_string()))?;
    let output_path = export_dir.join(file_name);
    if output_path.parent() != Some(export_dir) {
        return Err(AppError::Io("Resolved export path escaped export directory".to_string()));
    }
    std::fs::write(&output_path, contents).map_err(|error| AppError::Io(error.to_string()))?;
    Ok(output_path)
}
