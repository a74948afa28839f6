//! Tunable bounds for classification, layout generation, the runtime, and import.
//!
//! Settings live in an optional YAML file. Every field has a default, so a
//! partial file (or none at all) is valid.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.yml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub classifier: ClassifierSettings,
    pub layout: LayoutSettings,
    pub runtime: RuntimeSettings,
    pub import: ImportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Highest unique count still suggested as FIXED.
    pub fixed_max: usize,
    /// Highest unique count still suggested as MANAGED.
    pub managed_max: usize,
    /// Unique counting stops past this many distinct values.
    pub unique_cap: usize,
    /// Length cap of a FIXED column's option snapshot.
    pub fixed_options_cap: usize,
    /// Rows scanned per classification pass (0 = all).
    pub sample_rows: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            fixed_max: 8,
            managed_max: 60,
            unique_cap: 200,
            fixed_options_cap: 12,
            sample_rows: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutSettings {
    pub max_list_columns: usize,
    pub max_form_fields: usize,
    /// Include MANAGED columns as form inputs.
    pub managed_in_form: bool,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            max_list_columns: 6,
            max_form_fields: 10,
            managed_in_form: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeSettings {
    pub managed_display_limit: usize,
    pub page_size: usize,
    /// Column cap used when list columns are inferred from a record.
    pub list_column_fallback: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            managed_display_limit: 50,
            page_size: 100,
            list_column_fallback: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImportSettings {
    pub chunk_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self { chunk_size: 200 }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let settings: Settings =
            serde_yaml::from_reader(reader).context("Parsing config YAML")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `explicit` when given, else `<workspace>/config.yml` if present, else defaults.
    pub fn resolve(explicit: Option<&Path>, workspace: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = workspace.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        ensure!(
            c.fixed_max < c.managed_max,
            "classifier.fixed_max ({}) must be below classifier.managed_max ({})",
            c.fixed_max,
            c.managed_max
        );
        ensure!(
            c.unique_cap > c.managed_max,
            "classifier.unique_cap must exceed classifier.managed_max"
        );
        ensure!(
            self.layout.max_list_columns >= 1 && self.layout.max_form_fields >= 1,
            "layout column and field caps must be at least 1"
        );
        ensure!(self.import.chunk_size >= 1, "import.chunk_size must be at least 1");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_fields() {
        let yaml = "layout:\n  managed_in_form: false\nimport:\n  chunk_size: 50\n";
        let settings: Settings = serde_yaml::from_str(yaml).expect("parse settings");
        assert!(!settings.layout.managed_in_form);
        assert_eq!(settings.layout.max_list_columns, 6);
        assert_eq!(settings.import.chunk_size, 50);
        assert_eq!(settings.classifier.fixed_max, 8);
        assert_eq!(settings.classifier.managed_max, 60);
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut settings = Settings::default();
        settings.classifier.fixed_max = 70;
        let err = settings.validate().expect_err("inverted thresholds");
        assert!(err.to_string().contains("fixed_max"));
    }

    #[test]
    fn resolve_falls_back_to_defaults_without_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = Settings::resolve(None, dir.path()).expect("resolve");
        assert_eq!(settings, Settings::default());
    }
}
