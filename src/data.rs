use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{AppError, Result};

/// Record payload: column key to loosely typed value, in column order.
pub type RecordData = serde_json::Map<String, JsonValue>;

/// Scalar kind of a spreadsheet column, inferred from sampled values.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalarKind {
    #[default]
    String,
    Number,
    Date,
    Boolean,
}

impl ScalarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Number => "number",
            ScalarKind::Date => "date",
            ScalarKind::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated form value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Empty,
    String(String),
    Number(f64),
    Date(NaiveDate),
    Boolean(bool),
}

impl FieldValue {
    pub fn as_display(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::String(s) => s.clone(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Boolean(b) => b.to_string(),
        }
    }

    pub fn into_json(self) -> JsonValue {
        match self {
            FieldValue::Empty => JsonValue::String(String::new()),
            FieldValue::String(s) => JsonValue::String(s),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    JsonValue::from(n as i64)
                } else {
                    serde_json::Number::from_f64(n)
                        .map(JsonValue::Number)
                        .unwrap_or_else(|| JsonValue::String(n.to_string()))
                }
            }
            FieldValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Boolean(b) => JsonValue::Bool(b),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Stringifies a stored value the way every comparison in the crate sees it.
pub fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format_number(f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Trimmed, stringified value; `None` when blank.
pub fn non_empty_text(value: Option<&JsonValue>) -> Option<String> {
    let text = display_value(value?);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn is_non_empty(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(AppError::InvalidValue {
        field: String::new(),
        message: format!("'{value}' is not a date"),
    })
}

pub fn parse_boolean_token(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned = value.trim().replace(',', "");
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parses raw form input against a column kind. Blank input is always accepted.
pub fn parse_field_value(field: &str, raw: &str, kind: ScalarKind) -> Result<FieldValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(FieldValue::Empty);
    }
    let invalid = |message: String| AppError::InvalidValue {
        field: field.to_string(),
        message,
    };
    let parsed = match kind {
        ScalarKind::String => FieldValue::String(trimmed.to_string()),
        ScalarKind::Number => FieldValue::Number(
            parse_number(trimmed).ok_or_else(|| invalid(format!("'{trimmed}' is not a number")))?,
        ),
        ScalarKind::Date => FieldValue::Date(
            parse_naive_date(trimmed).map_err(|_| invalid(format!("'{trimmed}' is not a date")))?,
        ),
        ScalarKind::Boolean => FieldValue::Boolean(
            parse_boolean_token(trimmed)
                .ok_or_else(|| invalid(format!("'{trimmed}' is not a yes/no value")))?,
        ),
    };
    Ok(parsed)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_value_flattens_json_scalars() {
        assert_eq!(display_value(&json!(null)), "");
        assert_eq!(display_value(&json!("CS")), "CS");
        assert_eq!(display_value(&json!(42)), "42");
        assert_eq!(display_value(&json!(3.0)), "3");
        assert_eq!(display_value(&json!(2.5)), "2.5");
        assert_eq!(display_value(&json!(true)), "true");
    }

    #[test]
    fn non_empty_text_trims_and_drops_blanks() {
        assert_eq!(non_empty_text(Some(&json!("  Bio "))), Some("Bio".to_string()));
        assert_eq!(non_empty_text(Some(&json!("   "))), None);
        assert_eq!(non_empty_text(None), None);
    }

    #[test]
    fn parse_naive_date_supports_multiple_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_naive_date("2024-05-06").unwrap(), expected);
        assert_eq!(parse_naive_date("06/05/2024").unwrap(), expected);
        assert_eq!(parse_naive_date("2024/05/06").unwrap(), expected);
    }

    #[test]
    fn parse_field_value_validates_per_kind() {
        assert_eq!(
            parse_field_value("Age", "", ScalarKind::Number).unwrap(),
            FieldValue::Empty
        );
        assert_eq!(
            parse_field_value("Age", "1,200", ScalarKind::Number).unwrap(),
            FieldValue::Number(1200.0)
        );
        assert_eq!(
            parse_field_value("Active", "Yes", ScalarKind::Boolean).unwrap(),
            FieldValue::Boolean(true)
        );
        let err = parse_field_value("Age", "old", ScalarKind::Number).unwrap_err();
        assert_eq!(
            err,
            AppError::InvalidValue {
                field: "Age".into(),
                message: "'old' is not a number".into()
            }
        );
    }

    #[test]
    fn field_value_into_json_keeps_integers_integral() {
        assert_eq!(FieldValue::Number(7.0).into_json(), json!(7));
        assert_eq!(FieldValue::Number(7.5).into_json(), json!(7.5));
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(FieldValue::Date(date).into_json(), json!("2024-01-02"));
    }
}
