use scorecard_core::{FlatRow, NormalizedTables, Row, Scalar, Table, TableSchema};
use tracing::debug;

fn project(row: &FlatRow, schema: &TableSchema) -> Row {
    schema
        .columns
        .iter()
        .map(|column| row.first_of(column.sources).cloned().unwrap_or(Scalar::Null))
        .collect()
}

fn fill(table: &mut Table, rows: &[FlatRow]) {
    for row in rows {
        table.push(project(row, table.schema));
    }
}

/// Fans each flat row out into one row per normalized table, in input order.
/// Columns whose source fields are absent become null.
pub fn split(rows: &[FlatRow]) -> NormalizedTables {
    let mut tables = NormalizedTables::empty();
    fill(&mut tables.school, rows);
    for table in tables.children_mut() {
        fill(table, rows);
    }
    debug!(rows = rows.len(), "split flat rows into normalized tables");
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorecard_core::{DIM_TEST_SCORES, FACT_COLLEGE_METRICS};

    fn row() -> FlatRow {
        let mut row = FlatRow::new();
        row.insert("id", 100654.0);
        row.insert("School_Name", "Alabama A & M University");
        row.insert("State", "AL");
        row.insert("Student_Size", 5196.0);
        row.insert("Admission_Rate_Overall", 0.684);
        row.insert("ACT_midpoint_cumulative", 19.0);
        row.insert("In_State_Tuition", 10024.0);
        row.insert("Score", 0.5);
        row.insert("Rank", 1.0);
        row
    }

    #[test]
    fn every_table_gets_one_row_per_input() {
        let tables = split(&[row(), row()]);
        for table in tables.tables() {
            assert_eq!(table.len(), 2, "{}", table.name());
        }
    }

    #[test]
    fn every_row_carries_the_school_id() {
        let tables = split(&[row()]);
        for table in tables.tables() {
            assert_eq!(table.rows[0][0], Scalar::Number(100654.0), "{}", table.name());
        }
    }

    #[test]
    fn columns_are_resolved_through_aliases() {
        let tables = split(&[row()]);
        let school = &tables.school.rows[0];
        assert_eq!(tables.school.cell(school, "school_name"), Some(&Scalar::from("Alabama A & M University")));
        assert_eq!(tables.school.cell(school, "city"), Some(&Scalar::Null));

        let scores = &tables.test_scores;
        assert_eq!(scores.schema.name, DIM_TEST_SCORES.name);
        // ACT_Score falls back to the cumulative midpoint
        assert_eq!(scores.cell(&scores.rows[0], "act_score"), Some(&Scalar::Number(19.0)));

        let metrics = &tables.college_metrics;
        assert_eq!(metrics.schema.name, FACT_COLLEGE_METRICS.name);
        assert_eq!(metrics.cell(&metrics.rows[0], "ranking_score"), Some(&Scalar::Number(0.5)));
        assert_eq!(metrics.cell(&metrics.rows[0], "rank"), Some(&Scalar::Number(1.0)));
    }

    #[test]
    fn rows_without_score_fields_split_with_null_scores() {
        let mut plain = FlatRow::new();
        plain.insert("id", 7.0);
        let tables = split(&[plain]);
        let metrics = &tables.college_metrics;
        assert_eq!(metrics.cell(&metrics.rows[0], "ranking_score"), Some(&Scalar::Null));
    }
}
