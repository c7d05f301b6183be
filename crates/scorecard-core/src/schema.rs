//! Static shapes of the six destination tables.

use std::collections::BTreeMap;

use crate::Scalar;

/// Semantic column type. Drives cleaning and destination DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Institution identifier, canonical string.
    Id,
    Text,
    Integer,
    Float,
    /// Fraction in `[0, 1]`; values above 1 are read as a 0-100 scale.
    Rate,
    /// Currency amount; negative values are invalid.
    Money,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Accepted flat-row field names, in priority order.
    pub sources: &'static [&'static str],
}

impl ColumnSpec {
    pub const fn new(
        name: &'static str,
        kind: ColumnKind,
        sources: &'static [&'static str],
    ) -> Self {
        Self { name, kind, sources }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    /// `id` for the school table, `school_id` for child tables.
    pub key: &'static str,
    /// Parent table referenced by `key`, if any.
    pub parent: Option<&'static str>,
    pub columns: &'static [ColumnSpec],
}

impl TableSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn key_index(&self) -> usize {
        self.column_index(self.key).unwrap_or(0)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

use self::ColumnKind::{Float, Id, Integer, Money, Rate, Text};

pub static DIM_SCHOOL: TableSchema = TableSchema {
    name: "dim_school",
    key: "id",
    parent: None,
    columns: &[
        ColumnSpec::new("id", Id, &["id", "Id"]),
        ColumnSpec::new("school_name", Text, &["School_Name", "school_name", "name"]),
        ColumnSpec::new("address", Text, &["Address", "address"]),
        ColumnSpec::new("city", Text, &["City", "city"]),
        ColumnSpec::new("state", Text, &["State", "state"]),
        ColumnSpec::new("highest_degree", Text, &["Highest_Degree", "highest_degree"]),
        ColumnSpec::new("predominant_degree", Text, &["Predominant_Degree", "predominant_degree"]),
        ColumnSpec::new("predominant_recoded", Text, &["Predominant_Recoded", "predominant_recoded"]),
        ColumnSpec::new("accreditor_code", Text, &["Accreditor_Code", "accreditor_code"]),
        ColumnSpec::new("institution_level", Text, &["Institution_Level", "institution_level"]),
        ColumnSpec::new(
            "religious_affiliation",
            Text,
            &["Religious_affiliation", "Religious_Affiliation", "religious_affiliation"],
        ),
        ColumnSpec::new("type_of_school", Text, &["type_of_school", "Type_Of_School"]),
    ],
};

pub static DIM_DEMOGRAPHICS: TableSchema = TableSchema {
    name: "dim_demographics",
    key: "school_id",
    parent: Some("dim_school"),
    columns: &[
        ColumnSpec::new("school_id", Id, &["id", "Id"]),
        ColumnSpec::new("student_size", Integer, &["Student_Size", "student_size"]),
        ColumnSpec::new(
            "demographics_men_pct",
            Rate,
            &["Demographics_men", "demographics_men", "men_percentage"],
        ),
        ColumnSpec::new(
            "demographics_women_pct",
            Rate,
            &["Demographics_women", "demographics_women", "women_percentage"],
        ),
    ],
};

pub static DIM_ADMISSION: TableSchema = TableSchema {
    name: "dim_admission",
    key: "school_id",
    parent: Some("dim_school"),
    columns: &[
        ColumnSpec::new("school_id", Id, &["id", "Id"]),
        ColumnSpec::new(
            "admission_rate_overall",
            Rate,
            &["Admission_Rate_Overall", "admission_rate_overall"],
        ),
        ColumnSpec::new(
            "admission_rate_by_ope_id",
            Rate,
            &["Admission_Rate_by_OPE_ID", "admission_rate_by_ope_id"],
        ),
        ColumnSpec::new(
            "consumer_admission_rate",
            Rate,
            &["Consumer_Admission_Rate", "consumer_admission_rate"],
        ),
        ColumnSpec::new("admission_score", Float, &["Admission_Score", "admission_score"]),
    ],
};

pub static DIM_TEST_SCORES: TableSchema = TableSchema {
    name: "dim_test_scores",
    key: "school_id",
    parent: Some("dim_school"),
    columns: &[
        ColumnSpec::new("school_id", Id, &["id", "Id"]),
        ColumnSpec::new("act_25th_percentile_cumulative", Float, &["ACT_25th_percentile_cumulative", "act_25th_percentile_cumulative"]),
        ColumnSpec::new("act_25th_percentile_english", Float, &["ACT_25th_percentile_english", "act_25th_percentile_english"]),
        ColumnSpec::new("act_25th_percentile_math", Float, &["ACT_25th_percentile_math", "act_25th_percentile_math"]),
        ColumnSpec::new("act_25th_percentile_writing", Float, &["ACT_25th_percentile_writing", "act_25th_percentile_writing"]),
        ColumnSpec::new("act_75th_percentile_cumulative", Float, &["ACT_75th_percentile_cumulative", "act_75th_percentile_cumulative"]),
        ColumnSpec::new("act_75th_percentile_english", Float, &["ACT_75th_percentile_english", "act_75th_percentile_english"]),
        ColumnSpec::new("act_75th_percentile_math", Float, &["ACT_75th_percentile_math", "act_75th_percentile_math"]),
        ColumnSpec::new("act_75th_percentile_writing", Float, &["ACT_75th_percentile_writing", "act_75th_percentile_writing"]),
        ColumnSpec::new("act_midpoint_cumulative", Float, &["ACT_midpoint_cumulative", "act_midpoint_cumulative"]),
        ColumnSpec::new("act_midpoint_english", Float, &["ACT_midpoint_english", "act_midpoint_english"]),
        ColumnSpec::new("act_midpoint_math", Float, &["ACT_midpoint_math", "act_midpoint_math"]),
        ColumnSpec::new("act_midpoint_writing", Float, &["ACT_midpoint_writing", "act_midpoint_writing"]),
        ColumnSpec::new("sat_25th_percentile_critical_reading", Float, &["SAT_25th_percentile_critical_reading", "sat_25th_percentile_critical_reading"]),
        ColumnSpec::new("sat_25th_percentile_math", Float, &["SAT_25th_percentile_math", "sat_25th_percentile_math"]),
        ColumnSpec::new("sat_25th_percentile_writing", Float, &["SAT_25th_percentile_writing", "sat_25th_percentile_writing"]),
        ColumnSpec::new("sat_75th_percentile_critical_reading", Float, &["SAT_75th_percentile_critical_reading", "sat_75th_percentile_critical_reading"]),
        ColumnSpec::new("sat_75th_percentile_math", Float, &["SAT_75th_percentile_math", "sat_75th_percentile_math"]),
        ColumnSpec::new("sat_75th_percentile_writing", Float, &["SAT_75th_percentile_writing", "sat_75th_percentile_writing"]),
        ColumnSpec::new("sat_midpoint_critical_reading", Float, &["SAT_midpoint_critical_reading", "sat_midpoint_critical_reading"]),
        ColumnSpec::new("sat_midpoint_math", Float, &["SAT_midpoint_math", "sat_midpoint_math"]),
        ColumnSpec::new("sat_midpoint_writing", Float, &["SAT_midpoint_writing", "sat_midpoint_writing"]),
        ColumnSpec::new("sat_average_overall", Float, &["SAT_average_overall", "sat_average_overall"]),
        ColumnSpec::new("sat_average_by_ope_id", Float, &["SAT_average_by_ope_id", "sat_average_by_ope_id"]),
        ColumnSpec::new("act_score", Float, &["ACT_Score", "act_score", "ACT_midpoint_cumulative"]),
        ColumnSpec::new("sat_score", Float, &["SAT_Score", "sat_score", "SAT_average_overall"]),
    ],
};

pub static DIM_TRANSFER_RATE: TableSchema = TableSchema {
    name: "dim_transfer_rate",
    key: "school_id",
    parent: Some("dim_school"),
    columns: &[
        ColumnSpec::new("school_id", Id, &["id", "Id"]),
        ColumnSpec::new(
            "transfer_rate_4yr_full_time",
            Float,
            &["Transfer_Rate_4yr_full_time", "transfer_rate_4yr_full_time"],
        ),
        ColumnSpec::new(
            "transfer_rate_4yr_full_time_pooled",
            Float,
            &["Transfer_Rate_4yr_full_time_pooled", "transfer_rate_4yr_full_time_pooled"],
        ),
        ColumnSpec::new(
            "transfer_rate_cohort_4yr_full_time",
            Float,
            &["Transfer_Rate_cohort_4yr_full_time", "transfer_rate_cohort_4yr_full_time"],
        ),
        ColumnSpec::new(
            "transfer_rate_less_than_4yr_full_time",
            Float,
            &["Transfer_Rate_less_than_4yr_full_time", "transfer_rate_less_than_4yr_full_time"],
        ),
        ColumnSpec::new(
            "transfer_rate_less_than_4yr_full_time_pooled",
            Float,
            &[
                "Transfer_Rate_less_than_4yr_full_time_pooled",
                "transfer_rate_less_than_4yr_full_time_pooled",
            ],
        ),
    ],
};

pub static FACT_COLLEGE_METRICS: TableSchema = TableSchema {
    name: "fact_college_metrics",
    key: "school_id",
    parent: Some("dim_school"),
    columns: &[
        ColumnSpec::new("school_id", Id, &["id", "Id"]),
        ColumnSpec::new("in_state_tuition", Money, &["In_State_Tuition", "in_state_tuition"]),
        ColumnSpec::new("out_of_state_tuition", Money, &["Out_of_State_Tuition", "out_of_state_tuition"]),
        ColumnSpec::new("loan_principal", Float, &["Loan_Principal", "loan_principal"]),
        ColumnSpec::new("pell_grant_rate", Rate, &["Pell_Grant_Rate", "pell_grant_rate"]),
        ColumnSpec::new("federal_loan_rate", Rate, &["Federal_Loan_Rate", "federal_loan_rate"]),
        ColumnSpec::new("completion_rate", Rate, &["Completion_Rate", "completion_rate"]),
        ColumnSpec::new("completion_score", Float, &["Completion_Score", "completion_score"]),
        ColumnSpec::new("size_score", Float, &["Size_Score", "size_score"]),
        ColumnSpec::new(
            "in_state_tuition_score",
            Float,
            &["In_State_Tuition_Score", "in_state_tuition_score"],
        ),
        ColumnSpec::new("financial_aid_score", Float, &["Financial_Aid_Score", "financial_aid_score"]),
        ColumnSpec::new("ranking_score", Float, &["Score", "ranking_score"]),
        ColumnSpec::new("rank", Integer, &["Rank", "rank"]),
    ],
};

/// Parent first, so loading in this order satisfies foreign keys.
pub static ALL_TABLES: [&TableSchema; 6] = [
    &DIM_SCHOOL,
    &DIM_DEMOGRAPHICS,
    &DIM_ADMISSION,
    &DIM_TEST_SCORES,
    &DIM_TRANSFER_RATE,
    &FACT_COLLEGE_METRICS,
];

/// Cells in schema column order.
pub type Row = Vec<Scalar>;

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: &'static TableSchema,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: &'static TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    pub fn push(&mut self, row: Row) {
        debug_assert_eq!(row.len(), self.schema.columns.len(), "row width for {}", self.schema.name);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell<'a>(&self, row: &'a Row, column: &str) -> Option<&'a Scalar> {
        self.schema.column_index(column).and_then(|i| row.get(i))
    }

    /// Values of one column, in row order.
    pub fn column(&self, column: &str) -> Vec<&Scalar> {
        match self.schema.column_index(column) {
            Some(i) => self.rows.iter().filter_map(|r| r.get(i)).collect(),
            None => Vec::new(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Scalar> + '_ {
        let idx = self.schema.key_index();
        self.rows.iter().filter_map(move |r| r.get(idx))
    }
}

/// The six canonical tables of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTables {
    pub school: Table,
    pub demographics: Table,
    pub admission: Table,
    pub test_scores: Table,
    pub transfer_rate: Table,
    pub college_metrics: Table,
}

impl Default for NormalizedTables {
    fn default() -> Self {
        Self::empty()
    }
}

impl NormalizedTables {
    pub fn empty() -> Self {
        Self {
            school: Table::new(&DIM_SCHOOL),
            demographics: Table::new(&DIM_DEMOGRAPHICS),
            admission: Table::new(&DIM_ADMISSION),
            test_scores: Table::new(&DIM_TEST_SCORES),
            transfer_rate: Table::new(&DIM_TRANSFER_RATE),
            college_metrics: Table::new(&FACT_COLLEGE_METRICS),
        }
    }

    pub fn tables(&self) -> [&Table; 6] {
        [
            &self.school,
            &self.demographics,
            &self.admission,
            &self.test_scores,
            &self.transfer_rate,
            &self.college_metrics,
        ]
    }

    /// Child tables only (everything keyed by `school_id`).
    pub fn children_mut(&mut self) -> [&mut Table; 5] {
        [
            &mut self.demographics,
            &mut self.admission,
            &mut self.test_scores,
            &mut self.transfer_rate,
            &mut self.college_metrics,
        ]
    }

    pub fn row_counts(&self) -> BTreeMap<&'static str, usize> {
        self.tables().iter().map(|t| (t.name(), t.len())).collect()
    }
}
