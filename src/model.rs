//! Field model: the user-confirmed mapping of source columns to semantic roles.
//!
//! The classifier produces a suggested model; the mapping editor mutates it
//! through [`FieldModel::set_primary`] and [`FieldModel::set_mode`]; the layout
//! builder consumes it once [`FieldModel::validate`] passes.

use std::{
    collections::HashSet,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    classify::{ColumnSample, Classifier},
    data::ScalarKind,
    error::{AppError, Result},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldMode {
    Primary,
    Fixed,
    Managed,
    FreeText,
    Ignore,
}

impl FieldMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldMode::Primary => "PRIMARY",
            FieldMode::Fixed => "FIXED",
            FieldMode::Managed => "MANAGED",
            FieldMode::FreeText => "FREE_TEXT",
            FieldMode::Ignore => "IGNORE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldMode::Primary => "Main record name",
            FieldMode::Fixed => "Fixed choices (no management screen)",
            FieldMode::Managed => "Managed list (creates sidebar page)",
            FieldMode::FreeText => "Free text (just type it)",
            FieldMode::Ignore => "Ignore this column",
        }
    }
}

impl fmt::Display for FieldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "PRIMARY" => Ok(FieldMode::Primary),
            "FIXED" => Ok(FieldMode::Fixed),
            "MANAGED" => Ok(FieldMode::Managed),
            "FREE_TEXT" | "FREETEXT" | "TEXT" => Ok(FieldMode::FreeText),
            "IGNORE" => Ok(FieldMode::Ignore),
            _ => Err(format!(
                "Unknown field mode '{value}'. Expected one of: primary, fixed, managed, free-text, ignore"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub key: String,
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_options: Option<Vec<String>>,
    #[serde(default)]
    pub kind: ScalarKind,
}

impl FieldSpec {
    pub fn new(key: &str, mode: FieldMode, kind: ScalarKind) -> Self {
        Self {
            key: key.to_string(),
            mode,
            fixed_options: None,
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldModel {
    pub app_name: String,
    pub primary_field_key: String,
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FieldModel {
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    fn field_mut(&mut self, key: &str) -> Result<&mut FieldSpec> {
        self.fields
            .iter_mut()
            .find(|f| f.key == key)
            .ok_or_else(|| AppError::invalid_model(format!("Unknown field '{key}'")))
    }

    /// Keys with `mode`, in field (source header) order.
    pub fn keys_with_mode(&self, mode: FieldMode) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.mode == mode)
            .map(|f| f.key.clone())
            .collect()
    }

    /// Checks every model invariant; `options_cap` bounds FIXED snapshots.
    pub fn validate(&self, options_cap: usize) -> Result<()> {
        if self.fields.is_empty() {
            return Err(AppError::invalid_model("The model has no fields"));
        }
        if self.primary_field_key.trim().is_empty() {
            return Err(AppError::invalid_model("No primary field selected"));
        }
        if self.field(&self.primary_field_key).is_none() {
            return Err(AppError::invalid_model(format!(
                "Primary field '{}' is not one of the model's fields",
                self.primary_field_key
            )));
        }

        let mut seen = HashSet::new();
        let mut primaries = 0usize;
        for field in &self.fields {
            if !seen.insert(field.key.as_str()) {
                return Err(AppError::invalid_model(format!(
                    "Field '{}' appears more than once",
                    field.key
                )));
            }
            if field.mode == FieldMode::Primary {
                primaries += 1;
                if field.key != self.primary_field_key {
                    return Err(AppError::invalid_model(format!(
                        "Field '{}' is marked PRIMARY but the primary field is '{}'",
                        field.key, self.primary_field_key
                    )));
                }
            }
            match (&field.fixed_options, field.mode) {
                (Some(options), FieldMode::Fixed) => {
                    if options.len() > options_cap {
                        return Err(AppError::invalid_model(format!(
                            "Field '{}' has {} fixed options (limit {options_cap})",
                            field.key,
                            options.len()
                        )));
                    }
                    let distinct = options.iter().collect::<HashSet<_>>();
                    if distinct.len() != options.len() {
                        return Err(AppError::invalid_model(format!(
                            "Field '{}' has duplicate fixed options",
                            field.key
                        )));
                    }
                }
                (None, FieldMode::Fixed) => {
                    return Err(AppError::invalid_model(format!(
                        "Field '{}' is FIXED but has no option snapshot",
                        field.key
                    )));
                }
                (Some(_), mode) => {
                    return Err(AppError::invalid_model(format!(
                        "Field '{}' is {mode} and must not carry fixed options",
                        field.key
                    )));
                }
                (None, _) => {}
            }
        }
        if primaries != 1 {
            return Err(AppError::invalid_model(format!(
                "Expected exactly one PRIMARY field, found {primaries}"
            )));
        }
        Ok(())
    }

    /// Every field key must be one of `headers`.
    pub fn validate_against_headers(&self, headers: &[String]) -> Result<()> {
        let unknown = self
            .fields
            .iter()
            .filter(|f| !headers.contains(&f.key))
            .map(|f| f.key.as_str())
            .collect::<Vec<_>>();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(AppError::invalid_model(format!(
                "Field(s) not present in source headers: {}",
                unknown.join(", ")
            )))
        }
    }

    /// Makes `key` the primary field.
    ///
    /// The previous primary loses its free pass and is re-classified from its
    /// sample; other fields keep whatever mode they had.
    pub fn set_primary(
        &mut self,
        key: &str,
        classifier: &Classifier,
        samples: &[ColumnSample],
    ) -> Result<()> {
        if self.field(key).is_none() {
            return Err(AppError::invalid_model(format!("Unknown field '{key}'")));
        }
        if self.primary_field_key == key {
            return Ok(());
        }
        for field in &mut self.fields {
            if field.key == key {
                field.mode = FieldMode::Primary;
                field.fixed_options = None;
            } else if field.mode == FieldMode::Primary {
                let sample = samples.iter().find(|s| s.key == field.key);
                *field = match sample {
                    Some(sample) => classifier.suggest_field(sample),
                    None => FieldSpec::new(&field.key, FieldMode::FreeText, field.kind),
                };
            }
        }
        self.primary_field_key = key.to_string();
        Ok(())
    }

    /// Sets a non-primary mode on a non-primary field.
    ///
    /// Switching to FIXED captures the option snapshot from `samples`;
    /// switching away from FIXED drops it.
    pub fn set_mode(&mut self, key: &str, mode: FieldMode, samples: &[ColumnSample]) -> Result<()> {
        if mode == FieldMode::Primary {
            return Err(AppError::invalid_model(format!(
                "Use the primary selection to make '{key}' the primary field"
            )));
        }
        if key == self.primary_field_key {
            return Err(AppError::invalid_model(format!(
                "'{key}' is the primary field; choose another primary first"
            )));
        }
        let field = self.field_mut(key)?;
        if field.mode == mode {
            return Ok(());
        }
        field.mode = mode;
        field.fixed_options = if mode == FieldMode::Fixed {
            Some(
                samples
                    .iter()
                    .find(|s| s.key == key)
                    .map(|s| s.sample_values.clone())
                    .unwrap_or_default(),
            )
        } else {
            None
        };
        Ok(())
    }

    /// Re-captures every FIXED snapshot from the current samples.
    pub fn snapshot_fixed_options(&mut self, samples: &[ColumnSample]) {
        for field in self.fields.iter_mut().filter(|f| f.mode == FieldMode::Fixed) {
            if let Some(sample) = samples.iter().find(|s| s.key == field.key) {
                field.fixed_options = Some(sample.sample_values.clone());
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path).with_context(|| format!("Creating model file {path:?}"))?;
        serde_json::to_writer_pretty(file, self).context("Writing field model JSON")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening model file {path:?}"))?;
        let reader = BufReader::new(file);
        let model = serde_json::from_reader(reader).context("Parsing field model JSON")?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> FieldModel {
        FieldModel {
            app_name: "Students".into(),
            primary_field_key: "Name".into(),
            fields: vec![
                FieldSpec::new("Name", FieldMode::Primary, ScalarKind::String),
                FieldSpec {
                    fixed_options: Some(vec!["Active".into(), "Inactive".into()]),
                    ..FieldSpec::new("Status", FieldMode::Fixed, ScalarKind::String)
                },
                FieldSpec::new("Notes", FieldMode::FreeText, ScalarKind::String),
            ],
            updated_at: None,
        }
    }

    #[test]
    fn valid_model_passes() {
        model().validate(12).expect("valid model");
    }

    #[test]
    fn validate_rejects_broken_invariants() {
        let mut empty = model();
        empty.fields.clear();
        assert!(matches!(empty.validate(12), Err(AppError::InvalidModel(_))));

        let mut missing = model();
        missing.primary_field_key = "Ghost".into();
        assert!(matches!(missing.validate(12), Err(AppError::InvalidModel(_))));

        let mut blank = model();
        blank.primary_field_key = "  ".into();
        assert!(matches!(blank.validate(12), Err(AppError::InvalidModel(_))));

        let mut two = model();
        two.fields[2].mode = FieldMode::Primary;
        assert!(matches!(two.validate(12), Err(AppError::InvalidModel(_))));

        let mut no_options = model();
        no_options.fields[1].fixed_options = None;
        assert!(matches!(no_options.validate(12), Err(AppError::InvalidModel(_))));

        let mut stray_options = model();
        stray_options.fields[2].fixed_options = Some(vec!["x".into()]);
        assert!(matches!(stray_options.validate(12), Err(AppError::InvalidModel(_))));

        assert!(matches!(model().validate(1), Err(AppError::InvalidModel(_))));

        let mut duplicate = model();
        duplicate.fields.push(FieldSpec::new("Notes", FieldMode::Ignore, ScalarKind::String));
        assert!(matches!(duplicate.validate(12), Err(AppError::InvalidModel(_))));
    }

    #[test]
    fn set_mode_guards_primary_and_snapshots_options() {
        let mut model = model();
        assert!(model.set_mode("Name", FieldMode::Ignore, &[]).is_err());
        assert!(model.set_mode("Notes", FieldMode::Primary, &[]).is_err());

        let samples = vec![ColumnSample {
            key: "Notes".into(),
            sample_values: vec!["a".into(), "b".into()],
            unique_count: 2,
            kind: ScalarKind::String,
        }];
        model.set_mode("Notes", FieldMode::Fixed, &samples).unwrap();
        assert_eq!(
            model.field("Notes").unwrap().fixed_options,
            Some(vec!["a".to_string(), "b".to_string()])
        );
        model.set_mode("Status", FieldMode::Ignore, &samples).unwrap();
        assert_eq!(model.field("Status").unwrap().fixed_options, None);
        model.validate(12).expect("still valid");
    }

    #[test]
    fn field_mode_parses_cli_spellings() {
        assert_eq!("free-text".parse::<FieldMode>(), Ok(FieldMode::FreeText));
        assert_eq!("managed".parse::<FieldMode>(), Ok(FieldMode::Managed));
        assert!("bogus".parse::<FieldMode>().is_err());
    }

    #[test]
    fn model_serializes_with_camel_case_keys() {
        let json = serde_json::to_value(model()).unwrap();
        assert_eq!(json["primaryFieldKey"], "Name");
        assert_eq!(json["fields"][1]["mode"], "FIXED");
        assert_eq!(json["fields"][1]["fixedOptions"][0], "Active");
        assert!(json["fields"][0].get("fixedOptions").is_none());
    }
}
