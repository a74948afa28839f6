//! Tabular source adapter.
//!
//! Turns a source reference (a local CSV/TSV export, a saved Google Sheets
//! GViz response, or a sheet URL) into a rectangular [`Table`] of headers and
//! row objects. Every failure is reported as [`AppError::SourceUnavailable`].
//!
//! Normalization runs the same way for every source:
//!
//! 1. Trim to the *effective width*: the last column holding any non-empty
//!    value across the first [`WIDTH_SAMPLE_ROWS`] rows.
//! 2. When every header is generic (blank, `Column N`, or a bare column
//!    letter), promote the first data row to headers if at least
//!    [`HEADER_ROW_THRESHOLD_PERCENT`] of its cells are non-empty text.
//! 3. Name remaining blank headers `Column N` and de-duplicate repeats.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::Context;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    data::{RecordData, display_value, is_non_empty, parse_number},
    error::{AppError, Result},
    io_utils,
};

pub const WIDTH_SAMPLE_ROWS: usize = 25;
pub const HEADER_ROW_THRESHOLD_PERCENT: usize = 60;
pub const DEFAULT_SHEET_RANGE: &str = "A1:Z200";
pub const PREVIEW_ROW_LIMIT: usize = 50;

const GVIZ_BASE: &str = "https://docs.google.com/spreadsheets/d";

/// Where an app's rows come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceRef {
    CsvFile {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delimiter: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encoding: Option<String>,
    },
    /// A downloaded `gviz/tq?tqx=out:json` response body.
    GvizFile { path: PathBuf },
    GoogleSheet {
        spreadsheet_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gid: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
    },
}

impl SourceRef {
    /// Parses a Google Sheets URL or bare spreadsheet id.
    pub fn parse_sheet(input: &str, sheet_name: Option<&str>) -> Result<Self> {
        let spreadsheet_id = extract_spreadsheet_id(input)
            .ok_or_else(|| AppError::source("Invalid Google Sheet URL / ID."))?;
        Ok(SourceRef::GoogleSheet {
            spreadsheet_id,
            gid: extract_gid(input),
            sheet_name: sheet_name
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            SourceRef::CsvFile { path, .. } => format!("CSV file {}", path.display()),
            SourceRef::GvizFile { path } => format!("GViz response {}", path.display()),
            SourceRef::GoogleSheet {
                spreadsheet_id,
                gid,
                sheet_name,
            } => match (sheet_name, gid) {
                (Some(name), _) => format!("Google Sheet {spreadsheet_id} ({name})"),
                (None, Some(gid)) => format!("Google Sheet {spreadsheet_id} (gid:{gid})"),
                (None, None) => format!("Google Sheet {spreadsheet_id}"),
            },
        }
    }
}

/// A rectangular table: ordered headers plus one object per data row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<RecordData>,
}

impl Table {
    pub fn head(&self, limit: usize) -> Table {
        Table {
            headers: self.headers.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
        }
    }
}

/// Headers as labelled by the source plus positional cell values, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

pub trait TableSource {
    /// Fetches the table behind `source`, optionally limited to an A1-style range.
    fn fetch_table(&self, source: &SourceRef, range: Option<&str>) -> Result<Table>;
}

/// Reads file-backed sources from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTableSource;

impl TableSource for FileTableSource {
    fn fetch_table(&self, source: &SourceRef, range: Option<&str>) -> Result<Table> {
        let raw = match source {
            SourceRef::CsvFile {
                path,
                delimiter,
                encoding,
            } => read_csv_raw(path, *delimiter, encoding.as_deref())?,
            SourceRef::GvizFile { path } => {
                let text = fs::read_to_string(path).map_err(|err| {
                    AppError::source(format!("Reading GViz response {path:?}: {err}"))
                })?;
                parse_gviz_response(&text)?
            }
            SourceRef::GoogleSheet { .. } => {
                return Err(AppError::source(format!(
                    "{} must be fetched over the network; download {} and connect it as a GViz file",
                    source.describe(),
                    gviz_url(source, range.or(Some(DEFAULT_SHEET_RANGE)))
                        .unwrap_or_default()
                )));
            }
        };
        let raw = match range {
            Some(range) => CellRange::parse(range)?.apply(raw),
            None => raw,
        };
        let table = normalize_table(raw);
        debug!(
            "Fetched {} column(s) and {} row(s) from {}",
            table.headers.len(),
            table.rows.len(),
            source.describe()
        );
        Ok(table)
    }
}

fn read_csv_raw(path: &Path, delimiter: Option<u8>, encoding: Option<&str>) -> Result<RawTable> {
    let fetch = || -> anyhow::Result<RawTable> {
        let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
        let encoding = io_utils::resolve_encoding(encoding)?;
        let records = io_utils::read_all_records(path, delimiter, encoding)
            .with_context(|| format!("Reading CSV source {path:?}"))?;
        let rows = records
            .into_iter()
            .map(|record| record.into_iter().map(JsonValue::String).collect())
            .collect::<Vec<Vec<JsonValue>>>();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Ok(RawTable {
            headers: vec![String::new(); width],
            rows,
        })
    };
    fetch().map_err(|err| AppError::source(format!("{err:#}")))
}

/// Parses a GViz JSON response (optionally wrapped in its JS callback).
pub fn parse_gviz_response(text: &str) -> Result<RawTable> {
    let trimmed = text.trim();
    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(AppError::source("Unexpected GViz response format."));
    };
    if end <= start {
        return Err(AppError::source("Unexpected GViz response format."));
    }
    let json: JsonValue = serde_json::from_str(&trimmed[start..=end])
        .map_err(|err| AppError::source(format!("Unexpected GViz response format: {err}")))?;

    if json.get("status").and_then(JsonValue::as_str) != Some("ok") {
        let first_error = json.get("errors").and_then(|e| e.get(0));
        let message = first_error
            .and_then(|e| e.get("detailed_message").or_else(|| e.get("message")))
            .and_then(JsonValue::as_str)
            .unwrap_or("GViz query failed. Is the sheet shared as 'Anyone with the link can view'?");
        return Err(AppError::source(message));
    }

    let table = json.get("table").cloned().unwrap_or(JsonValue::Null);
    let empty = Vec::new();
    let cols = table.get("cols").and_then(JsonValue::as_array).unwrap_or(&empty);
    let rows = table.get("rows").and_then(JsonValue::as_array).unwrap_or(&empty);

    let headers = cols
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let label = col
                .get("label")
                .map(display_value)
                .unwrap_or_default()
                .trim()
                .to_string();
            if !label.is_empty() {
                return label;
            }
            let id = col
                .get("id")
                .map(display_value)
                .unwrap_or_default()
                .trim()
                .to_string();
            if !id.is_empty() {
                return id;
            }
            generic_column_name(idx)
        })
        .collect::<Vec<_>>();

    let rows = rows
        .iter()
        .map(|row| {
            row.get("c")
                .and_then(JsonValue::as_array)
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| cell.get("v").cloned().unwrap_or(JsonValue::Null))
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    Ok(RawTable { headers, rows })
}

/// Applies effective-width trimming, header-row promotion, and header naming.
pub fn normalize_table(raw: RawTable) -> Table {
    let RawTable { headers, rows } = raw;
    let max_cols = headers
        .len()
        .max(rows.iter().map(Vec::len).max().unwrap_or(0));
    let width = effective_width(&rows, max_cols);

    let (mut headers, mut rows) = if width > 0 {
        let headers = (0..width)
            .map(|idx| headers.get(idx).cloned().unwrap_or_default())
            .collect::<Vec<_>>();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, JsonValue::Null);
                row
            })
            .collect::<Vec<_>>();
        (headers, rows)
    } else {
        (headers, rows)
    };

    let headers_generic = !headers.is_empty() && headers.iter().all(|h| is_generic_header(h));
    if headers_generic
        && let Some(first) = rows.first()
        && looks_like_header_row(first)
    {
        headers = first.iter().map(display_value).collect();
        rows.remove(0);
        debug!("Promoted first data row to headers: {headers:?}");
    }

    let headers = finalize_headers(&headers);
    let rows = rows
        .into_iter()
        .filter(|row| row.iter().any(is_non_empty))
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(idx, header)| {
                    (
                        header.clone(),
                        row.get(idx).cloned().unwrap_or(JsonValue::Null),
                    )
                })
                .collect::<RecordData>()
        })
        .collect();
    Table { headers, rows }
}

/// Last column index (+1) with any non-empty value across the early rows.
pub fn effective_width(rows: &[Vec<JsonValue>], max_cols: usize) -> usize {
    let sample = &rows[..rows.len().min(WIDTH_SAMPLE_ROWS)];
    (0..max_cols)
        .rev()
        .find(|&col| {
            sample
                .iter()
                .any(|row| row.get(col).is_some_and(is_non_empty))
        })
        .map(|col| col + 1)
        .unwrap_or(0)
}

pub fn is_generic_header(header: &str) -> bool {
    static COLUMN_N: OnceLock<Regex> = OnceLock::new();
    static LETTERS: OnceLock<Regex> = OnceLock::new();
    let trimmed = header.trim();
    if trimmed.is_empty() {
        return true;
    }
    let column_n = COLUMN_N.get_or_init(|| Regex::new(r"(?i)^column\s+\d+$").unwrap());
    let letters = LETTERS.get_or_init(|| Regex::new(r"^[A-Z]{1,2}$").unwrap());
    column_n.is_match(trimmed) || letters.is_match(trimmed)
}

/// Majority rule: at least 60% (rounded up, minimum one) of the cells are non-empty text.
pub fn looks_like_header_row(row: &[JsonValue]) -> bool {
    if row.is_empty() {
        return false;
    }
    let text_cells = row.iter().filter(|value| is_text_cell(value)).count();
    let required = (row.len() * HEADER_ROW_THRESHOLD_PERCENT).div_ceil(100).max(1);
    text_cells >= required
}

fn is_text_cell(value: &JsonValue) -> bool {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && parse_number(trimmed).is_none()
        }
        _ => false,
    }
}

fn generic_column_name(idx: usize) -> String {
    format!("Column {}", idx + 1)
}

fn finalize_headers(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let trimmed = header.trim();
            let base = if trimmed.is_empty() {
                generic_column_name(idx)
            } else {
                trimmed.to_string()
            };
            let mut candidate = base.clone();
            let mut suffix = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{base} ({suffix})");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

pub fn extract_spreadsheet_id(url_or_id: &str) -> Option<String> {
    static BARE_ID: OnceLock<Regex> = OnceLock::new();
    static URL_ID: OnceLock<Regex> = OnceLock::new();
    let s = url_or_id.trim();
    if s.is_empty() {
        return None;
    }
    let bare = BARE_ID.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]{20,}$").unwrap());
    if bare.is_match(s) {
        return Some(s.to_string());
    }
    let url = URL_ID.get_or_init(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap());
    url.captures(s).map(|caps| caps[1].to_string())
}

pub fn extract_gid(url: &str) -> Option<String> {
    static GID: OnceLock<Regex> = OnceLock::new();
    let gid = GID.get_or_init(|| Regex::new(r"[?#&]gid=(\d+)").unwrap());
    gid.captures(url).map(|caps| caps[1].to_string())
}

/// GViz query URL for a Google Sheet reference; `None` for file sources.
pub fn gviz_url(source: &SourceRef, range: Option<&str>) -> Option<String> {
    let SourceRef::GoogleSheet {
        spreadsheet_id,
        gid,
        sheet_name,
    } = source
    else {
        return None;
    };
    let mut params = vec![("tqx", "out:json".to_string())];
    if let Some(sheet) = sheet_name {
        params.push(("sheet", sheet.clone()));
    }
    if let Some(gid) = gid {
        params.push(("gid", gid.clone()));
    }
    if let Some(range) = range {
        params.push(("range", range.to_string()));
    }
    params.push(("tq", "select *".to_string()));
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    Some(format!(
        "{GVIZ_BASE}/{}/gviz/tq?{query}",
        urlencoding::encode(spreadsheet_id)
    ))
}

/// Inclusive A1-style range (`A1:Z200`), zero-based internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_col: usize,
    pub first_row: usize,
    pub last_col: usize,
    pub last_row: usize,
}

impl CellRange {
    pub fn parse(range: &str) -> Result<Self> {
        static RANGE: OnceLock<Regex> = OnceLock::new();
        let pattern = RANGE.get_or_init(|| Regex::new(r"^([A-Z]+)(\d+):([A-Z]+)(\d+)$").unwrap());
        let normalized = range.trim().to_ascii_uppercase();
        let caps = pattern
            .captures(&normalized)
            .ok_or_else(|| AppError::source(format!("Invalid range '{range}'")))?;
        let row = |text: &str| -> Result<usize> {
            text.parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .ok_or_else(|| AppError::source(format!("Invalid range '{range}'")))
        };
        let parsed = CellRange {
            first_col: column_index(&caps[1]),
            first_row: row(&caps[2])?,
            last_col: column_index(&caps[3]),
            last_row: row(&caps[4])?,
        };
        if parsed.first_col > parsed.last_col || parsed.first_row > parsed.last_row {
            return Err(AppError::source(format!("Invalid range '{range}'")));
        }
        Ok(parsed)
    }

    /// Restricts a raw table; the label row of file sources is data row 1.
    pub fn apply(&self, raw: RawTable) -> RawTable {
        let cols = self.first_col..=self.last_col;
        let slice = |values: &[JsonValue]| -> Vec<JsonValue> {
            cols.clone()
                .map(|idx| values.get(idx).cloned().unwrap_or(JsonValue::Null))
                .collect()
        };
        let headers = cols
            .clone()
            .map(|idx| raw.headers.get(idx).cloned().unwrap_or_default())
            .collect();
        let rows = raw
            .rows
            .iter()
            .skip(self.first_row)
            .take(self.last_row - self.first_row + 1)
            .map(|row| slice(row.as_slice()))
            .collect();
        RawTable { headers, rows }
    }
}

fn column_index(letters: &str) -> usize {
    letters
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A' + 1))
        - 1
}
