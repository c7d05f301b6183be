//! Nested institution record -> [`FlatRow`].

use std::collections::HashSet;

use scorecard_core::{FlatRow, RawInstitutionRecord, Scalar};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlattenError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no id")]
    MissingId,
    #[error("record is missing the `{0}` group")]
    MissingGroup(&'static str),
}

/// Groups a record must carry; a record missing any of them is skipped.
pub const REQUIRED_GROUPS: [&str; 6] = ["school", "student", "admissions", "cost", "aid", "completion"];

/// Fixed leaf paths (relative to the group container) and their flat names.
const CORE_FIELDS: &[(&[&str], &str)] = &[
    (&["school", "name"], "School_Name"),
    (&["school", "address"], "Address"),
    (&["school", "state"], "State"),
    (&["school", "city"], "City"),
    (&["school", "degrees_awarded", "highest"], "Highest_Degree"),
    (&["school", "degrees_awarded", "predominant"], "Predominant_Degree"),
    (&["school", "degrees_awarded", "predominant_recoded"], "Predominant_Recoded"),
    (&["school", "accreditor_code"], "Accreditor_Code"),
    (&["school", "institutional_characteristics", "level"], "Institution_Level"),
    (&["school", "religious_affiliation"], "Religious_affiliation"),
    (&["student", "size"], "Student_Size"),
    (&["student", "demographics", "men"], "Demographics_men"),
    (&["student", "demographics", "women"], "Demographics_women"),
    (&["admissions", "admission_rate", "overall"], "Admission_Rate_Overall"),
    (&["admissions", "admission_rate", "by_ope_id"], "Admission_Rate_by_OPE_ID"),
    (&["admissions", "admission_rate", "consumer_rate"], "Consumer_Admission_Rate"),
    (&["cost", "tuition", "in_state"], "In_State_Tuition"),
    (&["cost", "tuition", "out_of_state"], "Out_of_State_Tuition"),
    (&["aid", "loan_principal"], "Loan_Principal"),
    (&["aid", "pell_grant_rate"], "Pell_Grant_Rate"),
    (&["aid", "federal_loan_rate"], "Federal_Loan_Rate"),
    (&["completion", "consumer_rate"], "Completion_Rate"),
];

/// A variable-shaped nested group expanded into `{prefix}_{key}_{key}...` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedGroup {
    pub path: &'static [&'static str],
    pub prefix: &'static str,
}

pub const NESTED_GROUPS: &[NestedGroup] = &[
    // percentile -> subject -> score
    NestedGroup {
        path: &["admissions", "act_scores"],
        prefix: "ACT",
    },
    // score_type -> subject (or category, for `average`) -> score
    NestedGroup {
        path: &["admissions", "sat_scores"],
        prefix: "SAT",
    },
    // category -> rate_type -> value
    NestedGroup {
        path: &["completion", "transfer_rate"],
        prefix: "Transfer_Rate",
    },
];

fn lookup<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    Some(cur)
}

fn leaf(value: &JsonValue, path: &[&str]) -> Scalar {
    lookup(value, path)
        .and_then(Scalar::from_json)
        .unwrap_or_default()
}

/// Walks every scalar leaf under `value`, joining keys with `_`. Arrays are ignored.
fn expand(value: &JsonValue, name: &str, row: &mut FlatRow) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                expand(child, &format!("{name}_{key}"), row);
            }
        }
        JsonValue::Array(_) => {}
        scalar => {
            if let Some(s) = Scalar::from_json(scalar) {
                row.insert(name, s);
            }
        }
    }
}

/// Last program entry carrying a `school` object decides the type.
fn type_of_school(groups: &JsonValue) -> Option<Scalar> {
    let programs = lookup(groups, &["programs", "cip_4_digit"])?.as_array()?;
    let mut found = None;
    for item in programs {
        if let Some(school) = item.get("school").filter(|s| s.is_object()) {
            found = Some(leaf(school, &["type"]));
        }
    }
    found
}

pub fn flatten(record: &RawInstitutionRecord) -> Result<FlatRow, FlattenError> {
    if !record.value().is_object() {
        return Err(FlattenError::NotAnObject);
    }
    let id = record
        .id()
        .and_then(Scalar::from_json)
        .filter(|s| !s.is_null())
        .ok_or(FlattenError::MissingId)?;

    let groups = record.groups();
    for group in REQUIRED_GROUPS {
        if !groups.get(group).is_some_and(JsonValue::is_object) {
            return Err(FlattenError::MissingGroup(group));
        }
    }

    let mut row = FlatRow::new();
    row.insert("id", id);
    for (path, name) in CORE_FIELDS {
        row.insert(*name, leaf(groups, path));
    }

    for group in NESTED_GROUPS {
        if let Some(nested) = lookup(groups, group.path).filter(|v| v.is_object()) {
            expand(nested, group.prefix, &mut row);
        }
    }

    if let Some(kind) = type_of_school(groups) {
        row.insert("type_of_school", kind);
    }

    Ok(row)
}

/// Flattens a batch. Unusable records are logged and skipped; for a repeated
/// `id` the first row is kept.
pub fn flatten_all(records: &[RawInstitutionRecord]) -> Vec<FlatRow> {
    let mut rows = Vec::with_capacity(records.len());
    let mut seen = HashSet::new();
    let mut skipped = 0usize;
    let mut duplicates = 0usize;

    for (index, record) in records.iter().enumerate() {
        match flatten(record) {
            Ok(row) => {
                let key = row.id().and_then(Scalar::canonical_text).unwrap_or_default();
                if seen.insert(key) {
                    rows.push(row);
                } else {
                    duplicates += 1;
                    debug!(index, "dropping duplicate institution id");
                }
            }
            Err(err) => {
                skipped += 1;
                let id = record.id().map(|v| v.to_string()).unwrap_or_default();
                error!(index, %id, error = %err, "skipping record");
            }
        }
    }

    info!(rows = rows.len(), skipped, duplicates, "flattened records");
    rows
}
