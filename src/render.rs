//! Plain-text rendering of tables, field models, and runtime views.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    classify::ColumnSample,
    data::display_value,
    model::FieldModel,
    runtime::{AppRuntime, FormState, FormTarget, Modal, View},
    source::Table,
    store::StoredSpec,
};

/// Cells wider than this are cut and suffixed with `…`.
const MAX_CELL_WIDTH: usize = 40;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let cells = |row: &[String]| -> Vec<String> {
        (0..headers.len())
            .map(|idx| clip(row.get(idx).map(String::as_str).unwrap_or_default()).into_owned())
            .collect()
    };
    let header_cells = cells(headers);
    let body = rows.iter().map(|row| cells(row.as_slice())).collect::<Vec<_>>();

    let widths = (0..headers.len())
        .map(|idx| {
            body.iter()
                .map(|row| display_width(&row[idx]))
                .chain(std::iter::once(display_width(&header_cells[idx])))
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect::<Vec<_>>();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in &body {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let pad = width.saturating_sub(display_width(value));
            format!("{value}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn clip(value: &str) -> Cow<'_, str> {
    let flat: Cow<'_, str> = if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    };
    if display_width(&flat) > MAX_CELL_WIDTH {
        let cut = flat.chars().take(MAX_CELL_WIDTH - 1).collect::<String>();
        Cow::Owned(format!("{cut}…"))
    } else {
        flat
    }
}

pub fn render_source_table(table: &Table) -> String {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            table
                .headers
                .iter()
                .map(|h| row.get(h).map(display_value).unwrap_or_default())
                .collect()
        })
        .collect::<Vec<_>>();
    render_table(&table.headers, &rows)
}

/// Classification result: one line per field with its sample statistics.
pub fn render_classification(model: &FieldModel, samples: &[ColumnSample]) -> String {
    let headers = ["Column", "Mode", "Kind", "Unique", "Samples"].map(String::from);
    let rows = model
        .fields
        .iter()
        .map(|field| {
            let sample = samples.iter().find(|s| s.key == field.key);
            let unique = sample
                .map(|s| s.unique_count.to_string())
                .unwrap_or_else(|| "-".to_string());
            let values = field
                .fixed_options
                .as_ref()
                .or(sample.map(|s| &s.sample_values))
                .map(|values| values.join(", "))
                .unwrap_or_default();
            vec![
                field.key.clone(),
                field.mode.to_string(),
                field.kind.to_string(),
                unique,
                values,
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn render_spec_versions(specs: &[StoredSpec]) -> String {
    let headers = ["Version", "Status", "Created", "Columns", "Pages"].map(String::from);
    let rows = specs
        .iter()
        .map(|stored| {
            vec![
                stored.version.to_string(),
                stored.status.as_str().to_string(),
                stored.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                stored.spec.ui.main_list.columns.join(", "),
                stored.spec.ui.pages.len().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

/// Sidebar, notices, the current page, and any open form or pending delete.
pub fn render_runtime(runtime: &AppRuntime<'_>) -> String {
    let mut out = String::new();
    let spec = runtime.spec();
    let _ = writeln!(out, "{} (v{})", spec.app.name, runtime.scope().version);
    let current = runtime.navigator().current();
    for item in runtime.navigator().menu() {
        let marker = if item.key == current { ">" } else { " " };
        let _ = writeln!(out, "{marker} {:<24} [{}]", item.label, item.key);
    }
    out.push('\n');

    for notice in runtime.notices() {
        let hint = if notice.retryable { " (retry)" } else { "" };
        let _ = writeln!(out, "! {}{hint}", notice.message);
    }

    match runtime.view() {
        View::Overview(overview) => {
            for kpi in &overview.kpis {
                let value = kpi.value.map(|v| v.to_string()).unwrap_or_else(|| "—".into());
                let _ = writeln!(out, "{:<28} {value}", kpi.label);
            }
            if let Some(card) = overview.sample {
                let _ = writeln!(out, "\nSample: {}", card.title);
                for (key, value) in card.fields {
                    let _ = writeln!(out, "  {key}: {value}");
                }
            }
        }
        View::MainList(list) => {
            let _ = writeln!(out, "{} ({} record(s))", list.title, list.total);
            if list.pages > 1 {
                let _ = writeln!(out, "Page {} of {}", list.page + 1, list.pages);
            }
            if !list.query.is_empty() {
                let _ = writeln!(out, "Search {}: {:?}", list.search_key, list.query);
            }
            let mut headers = vec!["Id".to_string()];
            headers.extend(list.columns.iter().cloned());
            let rows = list
                .rows
                .iter()
                .map(|row| {
                    let mut cells = vec![row.id.clone()];
                    cells.extend(row.cells.iter().cloned());
                    cells
                })
                .collect::<Vec<_>>();
            out.push_str(&render_table(&headers, &rows));
        }
        View::Managed(managed) => {
            let _ = writeln!(out, "{} ({} value(s))", managed.key, managed.values.len());
            for value in &managed.values {
                let _ = writeln!(out, "  {value}");
            }
        }
        View::Unavailable { key } => {
            let _ = writeln!(out, "'{key}' is not available yet.");
        }
    }

    if let Modal::Open(form) = runtime.modal() {
        out.push('\n');
        out.push_str(&render_form(form));
    }
    if let Some(id) = runtime.pending_delete() {
        let _ = writeln!(out, "\nDelete record {id}? Confirm to continue.");
    }
    out
}

pub fn render_form(form: &FormState) -> String {
    let mut out = String::new();
    let target = match &form.target {
        FormTarget::Creating => String::new(),
        FormTarget::Editing(id) => format!(" [{id}]"),
    };
    let _ = writeln!(out, "{}{target}", form.title);
    for field in &form.fields {
        let choices = field
            .options
            .as_ref()
            .map(|options| format!(" ({})", options.join(" | ")))
            .unwrap_or_default();
        let _ = writeln!(out, "  {}: {}{choices}", field.key, field.value);
    }
    if let Some(error) = &form.error {
        let _ = writeln!(out, "  error: {error}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_and_pad_missing_cells() {
        let headers = vec!["Name".to_string(), "Status".to_string()];
        let rows = vec![
            vec!["Ada".to_string(), "Active".to_string()],
            vec!["Grace Hopper".to_string()],
        ];
        let rendered = render_table(&headers, &rows);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Name          Status");
        assert_eq!(lines[1], "------------  ------");
        assert_eq!(lines[2], "Ada           Active");
        assert_eq!(lines[3], "Grace Hopper");
    }

    #[test]
    fn long_and_multiline_cells_are_flattened_and_clipped() {
        let headers = vec!["Notes".to_string()];
        let rows = vec![vec![format!("line\none {}", "x".repeat(60))]];
        let rendered = render_table(&headers, &rows);
        let body = rendered.lines().nth(2).unwrap();
        assert!(body.starts_with("line one "));
        assert!(body.ends_with('…'));
        assert_eq!(body.chars().count(), MAX_CELL_WIDTH);
    }
}
