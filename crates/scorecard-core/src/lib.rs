//! Core domain model for the College Scorecard pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod schema;

pub use schema::{
    ColumnKind, ColumnSpec, NormalizedTables, Row, Table, TableSchema, ALL_TABLES, DIM_ADMISSION,
    DIM_DEMOGRAPHICS, DIM_SCHOOL, DIM_TEST_SCORES, DIM_TRANSFER_RATE, FACT_COLLEGE_METRICS,
};

pub const CRATE_NAME: &str = "scorecard-core";

/// Single-level cell value used by flat rows and normalized tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Converts a JSON leaf. Arrays and objects are not scalars.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Scalar::Null),
            JsonValue::Bool(b) => Some(Scalar::Bool(*b)),
            JsonValue::Number(n) => Some(n.as_f64().map(Scalar::Number).unwrap_or(Scalar::Null)),
            JsonValue::String(s) => Some(Scalar::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Lenient numeric view: finite numbers and numeric text, nothing else.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Scalar::Number(n) => *n,
            Scalar::Text(s) => s.trim().parse::<f64>().ok()?,
            Scalar::Null | Scalar::Bool(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Canonical string form used for identifiers and text columns.
    /// Integral numbers print without a fraction (`166027.0` -> `"166027"`);
    /// blank text and non-finite numbers have no text form.
    pub fn canonical_text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Number(n) if !n.is_finite() => None,
            Scalar::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                Some(format!("{}", *n as i64))
            }
            Scalar::Number(n) => Some(n.to_string()),
            Scalar::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<Option<f64>> for Scalar {
    fn from(value: Option<f64>) -> Self {
        value.map(Scalar::Number).unwrap_or(Scalar::Null)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// One institution as returned by the source API. Only lives between fetch and flatten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawInstitutionRecord(pub JsonValue);

impl RawInstitutionRecord {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &JsonValue {
        &self.0
    }

    pub fn id(&self) -> Option<&JsonValue> {
        self.0.get("id").filter(|v| !v.is_null())
    }

    /// The object carrying the `school`/`student`/... groups: `latest` when present,
    /// otherwise the record root.
    pub fn groups(&self) -> &JsonValue {
        match self.0.get("latest") {
            Some(latest) if latest.is_object() => latest,
            _ => &self.0,
        }
    }
}

/// Scalar-valued, single-level representation of one institution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRow {
    fields: BTreeMap<String, Scalar>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn id(&self) -> Option<&Scalar> {
        self.get("id").filter(|v| !v.is_null())
    }

    /// Value of the first alias present in the row.
    pub fn first_of(&self, aliases: &[&str]) -> Option<&Scalar> {
        aliases.iter().find_map(|name| self.fields.get(*name))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_numeric_view_is_lenient_but_finite() {
        assert_eq!(Scalar::from(0.25).as_f64(), Some(0.25));
        assert_eq!(Scalar::from(" 42 ").as_f64(), Some(42.0));
        assert_eq!(Scalar::from("n/a").as_f64(), None);
        assert_eq!(Scalar::from(f64::NAN).as_f64(), None);
        assert_eq!(Scalar::Bool(true).as_f64(), None);
    }

    #[test]
    fn canonical_text_drops_integral_fraction() {
        assert_eq!(Scalar::from(166027.0).canonical_text().as_deref(), Some("166027"));
        assert_eq!(Scalar::from(2.5).canonical_text().as_deref(), Some("2.5"));
        assert_eq!(Scalar::from("  ").canonical_text(), None);
        assert_eq!(Scalar::from(" 00123 ").canonical_text().as_deref(), Some("00123"));
        assert_eq!(Scalar::Null.canonical_text(), None);
    }

    #[test]
    fn nested_json_is_not_a_scalar() {
        assert!(Scalar::from_json(&json!({"a": 1})).is_none());
        assert!(Scalar::from_json(&json!([1, 2])).is_none());
        assert_eq!(Scalar::from_json(&json!(null)), Some(Scalar::Null));
    }

    #[test]
    fn first_alias_present_wins() {
        let mut row = FlatRow::new();
        row.insert("school_name", "lower");
        row.insert("School_Name", "Upper");
        assert_eq!(
            row.first_of(&["School_Name", "school_name"]),
            Some(&Scalar::from("Upper"))
        );
        assert_eq!(row.first_of(&["name"]), None);
    }

    #[test]
    fn groups_fall_back_to_root_without_latest() {
        let nested = RawInstitutionRecord::new(json!({"id": 1, "latest": {"school": {}}}));
        assert!(nested.groups().get("school").is_some());
        let flat = RawInstitutionRecord::new(json!({"id": 1, "school": {}}));
        assert!(flat.groups().get("school").is_some());
        assert!(RawInstitutionRecord::new(json!({"id": null})).id().is_none());
    }
}
