//! Column classification.
//!
//! Samples every column of a table and proposes a [`FieldMode`] from its
//! cardinality: few distinct values become a closed dropdown (`FIXED`), a
//! medium number become a sidebar page of their own (`MANAGED`), and anything
//! larger is plain text (`FREE_TEXT`). The first header is the provisional
//! primary column. `IGNORE` is never suggested.
//!
//! Each sample also records a [`ScalarKind`], inferred by eliminating
//! candidates value by value, so forms can validate input later.

use std::collections::HashMap;

use itertools::Itertools;
use log::debug;
use serde_json::Value as JsonValue;

use crate::{
    config::ClassifierSettings,
    data::{RecordData, ScalarKind, non_empty_text, parse_naive_date, parse_number},
    model::{FieldMode, FieldModel, FieldSpec},
};

/// Observed shape of one column across the sampled rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSample {
    pub key: String,
    /// Distinct non-empty trimmed values in first-appearance order, capped.
    pub sample_values: Vec<String>,
    /// Distinct non-empty count; values above the cap mean "more than the cap".
    pub unique_count: usize,
    pub kind: ScalarKind,
}

impl ColumnSample {
    pub fn collect<'a, I>(key: &str, values: I, settings: &ClassifierSettings) -> Self
    where
        I: IntoIterator<Item = Option<&'a JsonValue>>,
    {
        let mut candidate = KindCandidate::new();
        let mut distinct = Vec::new();
        let mut saturated = false;
        for text in values.into_iter().filter_map(|value| {
            candidate.update(value);
            non_empty_text(value)
        }) {
            if saturated || distinct.contains(&text) {
                continue;
            }
            distinct.push(text);
            if distinct.len() > settings.unique_cap {
                saturated = true;
            }
        }
        let unique_count = distinct.len();
        distinct.truncate(settings.fixed_options_cap);
        ColumnSample {
            key: key.to_string(),
            sample_values: distinct,
            unique_count,
            kind: candidate.decide(),
        }
    }

    pub fn is_saturated(&self, settings: &ClassifierSettings) -> bool {
        self.unique_count > settings.unique_cap
    }
}

/// Order-preserving distinct non-empty values, at most `cap`.
pub fn distinct_values<'a, I>(values: I, cap: usize) -> Vec<String>
where
    I: IntoIterator<Item = Option<&'a JsonValue>>,
{
    values
        .into_iter()
        .filter_map(non_empty_text)
        .unique()
        .take(cap)
        .collect()
}

/// Distinct non-empty count, stopping once it exceeds `cap`.
pub fn unique_count<'a, I>(values: I, cap: usize) -> usize
where
    I: IntoIterator<Item = Option<&'a JsonValue>>,
{
    values
        .into_iter()
        .filter_map(non_empty_text)
        .unique()
        .take(cap.saturating_add(1))
        .count()
}

#[derive(Debug, Clone)]
struct KindCandidate {
    seen_value: bool,
    possible_boolean: bool,
    possible_number: bool,
    possible_date: bool,
}

impl KindCandidate {
    fn new() -> Self {
        Self {
            seen_value: false,
            possible_boolean: true,
            possible_number: true,
            possible_date: true,
        }
    }

    fn update(&mut self, value: Option<&JsonValue>) {
        match value {
            None | Some(JsonValue::Null) => {}
            Some(JsonValue::Bool(_)) => {
                self.seen_value = true;
                self.possible_number = false;
                self.possible_date = false;
            }
            Some(JsonValue::Number(_)) => {
                self.seen_value = true;
                self.possible_boolean = false;
                self.possible_date = false;
            }
            Some(JsonValue::String(raw)) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return;
                }
                self.seen_value = true;
                if self.possible_boolean
                    && !matches!(
                        trimmed.to_ascii_lowercase().as_str(),
                        "true" | "false" | "t" | "f" | "yes" | "no" | "y" | "n"
                    )
                {
                    self.possible_boolean = false;
                }
                if self.possible_number && parse_number(trimmed).is_none() {
                    self.possible_number = false;
                }
                if self.possible_date && parse_naive_date(trimmed).is_err() {
                    self.possible_date = false;
                }
            }
            Some(_) => {
                self.seen_value = true;
                self.possible_boolean = false;
                self.possible_number = false;
                self.possible_date = false;
            }
        }
    }

    fn decide(&self) -> ScalarKind {
        if !self.seen_value {
            ScalarKind::String
        } else if self.possible_boolean {
            ScalarKind::Boolean
        } else if self.possible_number {
            ScalarKind::Number
        } else if self.possible_date {
            ScalarKind::Date
        } else {
            ScalarKind::String
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    settings: ClassifierSettings,
}

impl Classifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Ordered cardinality heuristic for a non-primary column.
    pub fn suggest_mode(&self, unique_count: usize) -> FieldMode {
        if unique_count <= self.settings.fixed_max {
            FieldMode::Fixed
        } else if unique_count <= self.settings.managed_max {
            FieldMode::Managed
        } else {
            FieldMode::FreeText
        }
    }

    pub fn sample_columns(&self, headers: &[String], rows: &[RecordData]) -> Vec<ColumnSample> {
        let limit = match self.settings.sample_rows {
            0 => rows.len(),
            n => n.min(rows.len()),
        };
        let sampled = &rows[..limit];
        headers
            .iter()
            .map(|key| {
                ColumnSample::collect(key, sampled.iter().map(|row| row.get(key)), &self.settings)
            })
            .collect()
    }

    /// Suggests a fresh field model; the first header is provisionally primary.
    pub fn classify(&self, headers: &[String], rows: &[RecordData]) -> FieldModel {
        let samples = self.sample_columns(headers, rows);
        self.classify_samples(&samples, None)
    }

    /// Suggests a model, reconciling against a previously saved one when given.
    pub fn classify_with_prior(
        &self,
        headers: &[String],
        rows: &[RecordData],
        prior: Option<&FieldModel>,
    ) -> FieldModel {
        let samples = self.sample_columns(headers, rows);
        self.classify_samples(&samples, prior)
    }

    /// Builds a model from samples.
    ///
    /// With a prior model, the prior primary stays primary while its header
    /// still exists, known headers keep their saved mode and option snapshot,
    /// new headers are freshly classified, and vanished headers are dropped.
    pub fn classify_samples(&self, samples: &[ColumnSample], prior: Option<&FieldModel>) -> FieldModel {
        let prior_fields: HashMap<&str, &FieldSpec> = prior
            .map(|model| model.fields.iter().map(|f| (f.key.as_str(), f)).collect())
            .unwrap_or_default();
        let primary_key = prior
            .map(|model| model.primary_field_key.as_str())
            .filter(|key| samples.iter().any(|s| s.key == *key))
            .or_else(|| samples.first().map(|s| s.key.as_str()))
            .unwrap_or_default()
            .to_string();

        let fields = samples
            .iter()
            .map(|sample| {
                if sample.key == primary_key {
                    return FieldSpec::new(&sample.key, FieldMode::Primary, sample.kind);
                }
                match prior_fields.get(sample.key.as_str()) {
                    Some(saved) if saved.mode != FieldMode::Primary => {
                        let mut field = (*saved).clone();
                        field.kind = sample.kind;
                        if field.mode == FieldMode::Fixed && field.fixed_options.is_none() {
                            field.fixed_options = Some(sample.sample_values.clone());
                        }
                        field
                    }
                    _ => self.suggest_field(sample),
                }
            })
            .collect::<Vec<_>>();

        if let Some(prior) = prior {
            let dropped = prior
                .fields
                .iter()
                .filter(|f| !samples.iter().any(|s| s.key == f.key))
                .map(|f| f.key.as_str())
                .collect::<Vec<_>>();
            if !dropped.is_empty() {
                debug!("Dropping field(s) no longer in source headers: {dropped:?}");
            }
        }

        FieldModel {
            app_name: prior.map(|m| m.app_name.clone()).unwrap_or_default(),
            primary_field_key: primary_key,
            fields,
            updated_at: None,
        }
    }

    /// Heuristic suggestion for one non-primary column.
    pub fn suggest_field(&self, sample: &ColumnSample) -> FieldSpec {
        let mode = self.suggest_mode(sample.unique_count);
        let mut field = FieldSpec::new(&sample.key, mode, sample.kind);
        if mode == FieldMode::Fixed {
            field.fixed_options = Some(sample.sample_values.clone());
        }
        field
    }
}

/// Classifies with the default thresholds.
pub fn classify(headers: &[String], rows: &[RecordData]) -> FieldModel {
    Classifier::default().classify(headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> ClassifierSettings {
        ClassifierSettings::default()
    }

    #[test]
    fn sample_dedupes_trims_and_caps() {
        let values = [json!(" CS"), json!("CS "), json!(""), json!(null), json!("Math")];
        let sample = ColumnSample::collect("Major", values.iter().map(Some), &settings());
        assert_eq!(sample.sample_values, vec!["CS", "Math"]);
        assert_eq!(sample.unique_count, 2);
    }

    #[test]
    fn unique_count_stops_past_the_cap() {
        let values = (0..500).map(|i| json!(i.to_string())).collect::<Vec<_>>();
        assert_eq!(unique_count(values.iter().map(Some), 200), 201);
        let sample = ColumnSample::collect("Id", values.iter().map(Some), &settings());
        assert_eq!(sample.unique_count, 201);
        assert!(sample.is_saturated(&settings()));
        assert_eq!(sample.sample_values.len(), 12);
    }

    #[test]
    fn distinct_values_preserve_first_appearance() {
        let values = [json!("b"), json!("a"), json!("b"), json!("c")];
        assert_eq!(distinct_values(values.iter().map(Some), 2), vec!["b", "a"]);
    }

    #[test]
    fn suggest_mode_follows_thresholds() {
        let classifier = Classifier::default();
        assert_eq!(classifier.suggest_mode(0), FieldMode::Fixed);
        assert_eq!(classifier.suggest_mode(8), FieldMode::Fixed);
        assert_eq!(classifier.suggest_mode(9), FieldMode::Managed);
        assert_eq!(classifier.suggest_mode(60), FieldMode::Managed);
        assert_eq!(classifier.suggest_mode(61), FieldMode::FreeText);
    }

    #[test]
    fn kind_inference_eliminates_candidates() {
        fn kind(values: &[JsonValue]) -> ScalarKind {
            ColumnSample::collect("c", values.iter().map(Some), &settings()).kind
        }
        assert_eq!(kind(&[json!("yes"), json!("No")]), ScalarKind::Boolean);
        assert_eq!(kind(&[json!("12"), json!("3.5"), json!("")]), ScalarKind::Number);
        assert_eq!(kind(&[json!(4), json!(5)]), ScalarKind::Number);
        assert_eq!(kind(&[json!("2024-01-01"), json!("02/03/2024")]), ScalarKind::Date);
        assert_eq!(kind(&[json!("12"), json!("twelve")]), ScalarKind::String);
        assert_eq!(kind(&[json!(null)]), ScalarKind::String);
    }

    #[test]
    fn sample_rows_bounds_the_scan() {
        let classifier = Classifier::new(ClassifierSettings {
            sample_rows: 2,
            ..ClassifierSettings::default()
        });
        let rows = ["a", "b", "c"]
            .iter()
            .map(|v| {
                let mut row = RecordData::new();
                row.insert("k".into(), json!(v));
                row
            })
            .collect::<Vec<_>>();
        let samples = classifier.sample_columns(&["k".to_string()], &rows);
        assert_eq!(samples[0].unique_count, 2);
    }
}
