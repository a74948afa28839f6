#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use sheet_crud::data::RecordData;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory passed as `--workspace` to the binary.
    pub fn state_dir(&self) -> PathBuf {
        self.path().join("state")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a GViz response body wrapped in its JS callback.
    pub fn write_gviz(&self, name: &str, labels: &[&str], rows: &[Vec<Value>]) -> PathBuf {
        let cols = labels
            .iter()
            .map(|label| json!({ "id": "", "label": label, "type": "string" }))
            .collect::<Vec<_>>();
        let rows = rows
            .iter()
            .map(|row| {
                let cells = row.iter().map(|v| json!({ "v": v })).collect::<Vec<_>>();
                json!({ "c": cells })
            })
            .collect::<Vec<_>>();
        let body = json!({
            "version": "0.6",
            "status": "ok",
            "table": { "cols": cols, "rows": rows }
        });
        self.write(
            name,
            &format!("/*O_o*/\ngoogle.visualization.Query.setResponse({body});"),
        )
    }
}

/// Students sheet: 40 names, 3 statuses, 95 distinct notes over 120 rows.
pub fn students_csv() -> String {
    let mut csv = String::from("Name,Status,Notes\n");
    for i in 0..120 {
        let status = ["Active", "Alumni", "Paused"][i % 3];
        csv.push_str(&format!("Student {},{status},note {}\n", i % 40, i % 95));
    }
    csv
}

pub fn record(pairs: &[(&str, &str)]) -> RecordData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}
