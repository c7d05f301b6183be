//! Per-table coercion and validation.
//!
//! Cleaning only nulls cells or removes rows; it never adds either, and running it
//! twice yields the same tables as running it once.

use std::collections::HashSet;

use scorecard_core::{ColumnKind, NormalizedTables, Row, Scalar, Table};
use thiserror::Error;
use tracing::{info, warn};

const PAIR_SUM_MIN: f64 = 0.99;
const PAIR_SUM_MAX: f64 = 1.01;

#[derive(Debug, Error, PartialEq)]
pub enum CleanError {
    #[error("no school rows to clean")]
    EmptyInput,
}

/// Values above 1 are read as a 0-100 percentage.
pub fn normalize_rate(value: f64) -> f64 {
    if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

fn coerce(kind: ColumnKind, value: &Scalar) -> Scalar {
    match kind {
        ColumnKind::Id | ColumnKind::Text => value.canonical_text().map(Scalar::Text).unwrap_or_default(),
        ColumnKind::Integer => value.as_f64().map(f64::round).into(),
        ColumnKind::Float => value.as_f64().into(),
        ColumnKind::Rate => value.as_f64().map(|v| normalize_rate(v).clamp(0.0, 1.0)).into(),
        ColumnKind::Money => value.as_f64().filter(|v| *v >= 0.0).into(),
    }
}

fn coerce_row(table: &Table, row: &Row) -> Row {
    table
        .schema
        .columns
        .iter()
        .zip(row)
        .map(|(column, value)| coerce(column.kind, value))
        .collect()
}

/// Rebuilds a table from `rows`, coercing every cell and keeping the first row per key.
/// Rows whose key is null are dropped.
fn rebuild<'a>(
    table: &Table,
    rows: impl Iterator<Item = &'a Row>,
    allowed: Option<&HashSet<String>>,
) -> Table {
    let key = table.schema.key_index();
    let mut seen = HashSet::new();
    let mut out = Table::new(table.schema);
    for row in rows {
        let row = coerce_row(table, row);
        let Some(id) = row.get(key).and_then(Scalar::as_str).map(str::to_owned) else {
            continue;
        };
        if allowed.is_some_and(|ids| !ids.contains(&id)) {
            continue;
        }
        if seen.insert(id) {
            out.push(row);
        }
    }
    out
}

fn school_ids(school: &Table) -> HashSet<String> {
    school
        .keys()
        .filter_map(Scalar::as_str)
        .map(str::to_owned)
        .collect()
}

/// Nulls both shares when they do not add up to a whole.
fn check_demographic_pair(table: &mut Table) {
    let (Some(men), Some(women)) = (
        table.schema.column_index("demographics_men_pct"),
        table.schema.column_index("demographics_women_pct"),
    ) else {
        return;
    };
    let mut nulled = 0usize;
    for row in &mut table.rows {
        if let (Some(m), Some(w)) = (row[men].as_f64(), row[women].as_f64()) {
            let sum = m + w;
            if !(PAIR_SUM_MIN..=PAIR_SUM_MAX).contains(&sum) {
                row[men] = Scalar::Null;
                row[women] = Scalar::Null;
                nulled += 1;
            }
        }
    }
    if nulled > 0 {
        warn!(rows = nulled, "nulled inconsistent men/women shares");
    }
}

/// Whole rows leave the admission table when the overall rate is out of range.
/// A missing rate keeps the row.
fn admission_in_range(table: &Table, row: &Row) -> bool {
    table
        .cell(row, "admission_rate_overall")
        .and_then(Scalar::as_f64)
        .map(|rate| (0.0..=1.0).contains(&normalize_rate(rate)))
        .unwrap_or(true)
}

pub fn clean(tables: NormalizedTables) -> Result<NormalizedTables, CleanError> {
    if tables.school.is_empty() {
        return Err(CleanError::EmptyInput);
    }

    let school = rebuild(&tables.school, tables.school.rows.iter(), None);
    let ids = school_ids(&school);

    let mut demographics = rebuild(&tables.demographics, tables.demographics.rows.iter(), Some(&ids));
    check_demographic_pair(&mut demographics);

    let admission_rows: Vec<&Row> = tables
        .admission
        .rows
        .iter()
        .filter(|row| admission_in_range(&tables.admission, row))
        .collect();
    let dropped_admission = tables.admission.len() - admission_rows.len();
    let admission = rebuild(&tables.admission, admission_rows.into_iter(), Some(&ids));
    if dropped_admission > 0 {
        warn!(rows = dropped_admission, "dropped admission rows with out-of-range overall rate");
    }

    let test_scores = rebuild(&tables.test_scores, tables.test_scores.rows.iter(), Some(&ids));
    let transfer_rate = rebuild(&tables.transfer_rate, tables.transfer_rate.rows.iter(), Some(&ids));
    let college_metrics = rebuild(&tables.college_metrics, tables.college_metrics.rows.iter(), Some(&ids));

    let cleaned = NormalizedTables {
        school,
        demographics,
        admission,
        test_scores,
        transfer_rate,
        college_metrics,
    };
    info!(
        schools_in = tables.school.len(),
        schools_out = cleaned.school.len(),
        "cleaned normalized tables"
    );
    Ok(cleaned)
}
