use std::path::Path;

use scorecard_core::{NormalizedTables, RawInstitutionRecord, Scalar, Table};
use scorecard_transform::{clean, flatten_all, rank, split, ScoringMode};
use serde_json::Value;

fn sample_records() -> Vec<RawInstitutionRecord> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/scorecard/sample_page.json");
    let text = std::fs::read_to_string(&path).expect("read sample page");
    let body: Value = serde_json::from_str(&text).expect("parse sample page");
    body["results"]
        .as_array()
        .expect("results array")
        .iter()
        .cloned()
        .map(RawInstitutionRecord::new)
        .collect()
}

fn cell<'a>(table: &'a Table, id: &str, column: &str) -> &'a Scalar {
    let row = table
        .rows
        .iter()
        .find(|r| r[0] == Scalar::from(id))
        .unwrap_or_else(|| panic!("{} has no row for {id}", table.name()));
    table.cell(row, column).expect("known column")
}

fn run() -> NormalizedTables {
    let rows = flatten_all(&sample_records());
    let ranked = rank(rows, &ScoringMode::default()).expect("rank");
    let rows: Vec<_> = ranked.into_iter().map(|r| r.into_flat_row()).collect();
    clean(split(&rows)).expect("clean")
}

#[test]
fn sample_page_flattens_skipping_incomplete_and_duplicate_records() {
    let rows = flatten_all(&sample_records());
    let ids: Vec<_> = rows
        .iter()
        .filter_map(|r| r.id().and_then(Scalar::canonical_text))
        .collect();
    assert_eq!(ids, vec!["100654", "100663", "100706", "100751"]);
    assert_eq!(
        rows[0].get("School_Name"),
        Some(&Scalar::from("Alabama A & M University"))
    );
}

#[test]
fn sample_page_produces_consistent_tables() {
    let tables = run();
    let counts = tables.row_counts();
    assert_eq!(counts["dim_school"], 4);
    for (name, count) in &counts {
        assert_eq!(*count, 4, "{name}");
    }

    let ranks: Vec<_> = tables
        .college_metrics
        .column("rank")
        .into_iter()
        .filter_map(Scalar::as_f64)
        .collect();
    let mut sorted = ranks.clone();
    sorted.sort_by(f64::total_cmp);
    assert_eq!(sorted, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn sample_page_cleaning_rules_apply() {
    let tables = run();

    assert_eq!(
        cell(&tables.admission, "100706", "admission_rate_overall").as_f64(),
        Some(0.81)
    );
    let men = cell(&tables.demographics, "100706", "demographics_men_pct")
        .as_f64()
        .expect("men share");
    assert!((men - 0.576).abs() < 1e-12);
    assert!(cell(&tables.demographics, "100751", "demographics_men_pct").is_null());
    assert!(cell(&tables.demographics, "100751", "demographics_women_pct").is_null());
    assert!(cell(&tables.college_metrics, "100751", "in_state_tuition").is_null());
    assert_eq!(
        cell(&tables.college_metrics, "100751", "out_of_state_tuition").as_f64(),
        Some(31460.0)
    );
}

#[test]
fn sample_page_nested_groups_reach_their_tables() {
    let tables = run();

    assert_eq!(cell(&tables.test_scores, "100654", "act_score").as_f64(), Some(17.0));
    assert_eq!(cell(&tables.test_scores, "100654", "sat_score").as_f64(), Some(939.0));
    assert_eq!(
        cell(&tables.test_scores, "100663", "sat_75th_percentile_math").as_f64(),
        Some(670.0)
    );
    assert_eq!(
        cell(&tables.transfer_rate, "100654", "transfer_rate_cohort_4yr_full_time").as_f64(),
        Some(1296.0)
    );
    assert!(cell(&tables.transfer_rate, "100654", "transfer_rate_less_than_4yr_full_time").is_null());
    assert_eq!(
        cell(&tables.school, "100751", "type_of_school"),
        &Scalar::from("public")
    );
    assert!(cell(&tables.school, "100706", "type_of_school").is_null());
    assert_eq!(cell(&tables.school, "100654", "highest_degree"), &Scalar::from("4"));
}
