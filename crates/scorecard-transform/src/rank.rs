//! Composite scoring and total ordering of institutions.

use scorecard_core::FlatRow;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::clean::normalize_rate;

/// Guards min-max normalization when every value in a column is equal.
pub const EPSILON: f64 = 1e-10;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

const ADMISSION: &[&str] = &["Admission_Rate_Overall", "admission_rate_overall"];
const COMPLETION: &[&str] = &["Completion_Rate", "completion_rate"];
const SAT: &[&str] = &["SAT_average_overall", "SAT_Score", "sat_score"];
const ACT: &[&str] = &["ACT_midpoint_cumulative", "ACT_Score", "act_score"];
const STUDENT_SIZE: &[&str] = &["Student_Size", "student_size"];
const IN_STATE_TUITION: &[&str] = &["In_State_Tuition", "in_state_tuition"];
const PELL_GRANT: &[&str] = &["Pell_Grant_Rate", "pell_grant_rate"];

#[derive(Debug, Error, PartialEq)]
pub enum RankError {
    #[error("invalid scoring weights: {0}")]
    InvalidWeights(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringWeights {
    /// Applied to the reversed admission rate.
    pub admission: f64,
    pub completion: f64,
    pub sat: f64,
    pub act: f64,
    pub student_size: f64,
    /// Applied to the reversed in-state tuition.
    pub in_state_tuition: f64,
    pub pell_grant: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            admission: 0.25,
            completion: 0.20,
            sat: 0.15,
            act: 0.10,
            student_size: 0.10,
            in_state_tuition: 0.10,
            pell_grant: 0.10,
        }
    }
}

impl ScoringWeights {
    fn as_array(&self) -> [f64; 7] {
        [
            self.admission,
            self.completion,
            self.sat,
            self.act,
            self.student_size,
            self.in_state_tuition,
            self.pell_grant,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    pub fn validate(&self) -> Result<(), RankError> {
        if let Some(bad) = self.as_array().iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(RankError::InvalidWeights(format!("weight {bad} is not a non-negative number")));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RankError::InvalidWeights(format!("weights sum to {sum}, expected 1.0")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoringMode {
    /// Batch min-max normalization with a weighted sum.
    MinMax(ScoringWeights),
    /// Each metric divided by the batch maximum; fixed weights 0.3/0.2/0.2/0.2/0.1
    /// over size/admission/completion/SAT/ACT.
    MaxRatio,
}

impl Default for ScoringMode {
    fn default() -> Self {
        ScoringMode::MinMax(ScoringWeights::default())
    }
}

/// Oriented per-metric scores in `[0, 1]`; higher is better for every field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComponentScores {
    pub admission: f64,
    pub completion: f64,
    pub sat: f64,
    pub act: f64,
    pub student_size: f64,
    pub in_state_tuition: f64,
    pub financial_aid: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub row: FlatRow,
    pub components: ComponentScores,
    pub score: f64,
    /// 1-based position in the ordering.
    pub rank: usize,
}

impl RankedRow {
    /// The flat row with score fields appended for the table splitter.
    pub fn into_flat_row(self) -> FlatRow {
        let mut row = self.row;
        row.insert("Score", self.score);
        row.insert("Rank", self.rank as f64);
        row.insert("Admission_Score", self.components.admission);
        row.insert("Completion_Score", self.components.completion);
        row.insert("Size_Score", self.components.student_size);
        row.insert("In_State_Tuition_Score", self.components.in_state_tuition);
        row.insert("Financial_Aid_Score", self.components.financial_aid);
        row
    }
}

/// Missing, non-numeric and non-finite values count as 0.
fn metric(rows: &[FlatRow], aliases: &[&str]) -> Vec<f64> {
    rows.iter()
        .map(|row| row.first_of(aliases).and_then(|v| v.as_f64()).unwrap_or(0.0))
        .collect()
}

/// Rate metrics brought onto the 0-1 scale the cleaner stores.
fn rate_metric(rows: &[FlatRow], aliases: &[&str]) -> Vec<f64> {
    metric(rows, aliases)
        .into_iter()
        .map(|v| normalize_rate(v).clamp(0.0, 1.0))
        .collect()
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values
        .iter()
        .map(|v| finite_or_zero((v - min) / (max - min + EPSILON)).clamp(0.0, 1.0))
        .collect()
}

fn max_ratio(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(1.0_f64, f64::max);
    values
        .iter()
        .map(|v| finite_or_zero(v / max).clamp(0.0, 1.0))
        .collect()
}

fn min_max_components(rows: &[FlatRow]) -> Vec<ComponentScores> {
    let admission = min_max(&rate_metric(rows, ADMISSION));
    let completion = min_max(&rate_metric(rows, COMPLETION));
    let sat = min_max(&metric(rows, SAT));
    let act = min_max(&metric(rows, ACT));
    let size = min_max(&metric(rows, STUDENT_SIZE));
    let tuition = min_max(&metric(rows, IN_STATE_TUITION));
    let pell = min_max(&rate_metric(rows, PELL_GRANT));

    (0..rows.len())
        .map(|i| ComponentScores {
            admission: 1.0 - admission[i],
            completion: completion[i],
            sat: sat[i],
            act: act[i],
            student_size: size[i],
            in_state_tuition: 1.0 - tuition[i],
            financial_aid: pell[i],
        })
        .collect()
}

fn max_ratio_components(rows: &[FlatRow]) -> Vec<ComponentScores> {
    // a missing admission rate counts as fully open
    let admission: Vec<f64> = rows
        .iter()
        .map(|row| {
            row.first_of(ADMISSION)
                .and_then(|v| v.as_f64())
                .map(|rate| normalize_rate(rate).clamp(0.0, 1.0))
                .unwrap_or(1.0)
        })
        .collect();
    let completion = max_ratio(&rate_metric(rows, COMPLETION));
    let sat = max_ratio(&metric(rows, SAT));
    let act = max_ratio(&metric(rows, ACT));
    let size = max_ratio(&metric(rows, STUDENT_SIZE));

    (0..rows.len())
        .map(|i| ComponentScores {
            admission: (1.0 - admission[i]).clamp(0.0, 1.0),
            completion: completion[i],
            sat: sat[i],
            act: act[i],
            student_size: size[i],
            in_state_tuition: 0.0,
            financial_aid: 0.0,
        })
        .collect()
}

fn composite(mode: &ScoringMode, c: &ComponentScores) -> f64 {
    let raw = match mode {
        ScoringMode::MinMax(w) => {
            w.admission * c.admission
                + w.completion * c.completion
                + w.sat * c.sat
                + w.act * c.act
                + w.student_size * c.student_size
                + w.in_state_tuition * c.in_state_tuition
                + w.pell_grant * c.financial_aid
        }
        ScoringMode::MaxRatio => {
            0.3 * c.student_size + 0.2 * c.admission + 0.2 * c.completion + 0.2 * c.sat + 0.1 * c.act
        }
    };
    finite_or_zero(raw).clamp(0.0, 1.0)
}

/// Scores a batch and orders it by descending score. Ties keep input order.
pub fn rank(rows: Vec<FlatRow>, mode: &ScoringMode) -> Result<Vec<RankedRow>, RankError> {
    if let ScoringMode::MinMax(weights) = mode {
        weights.validate()?;
    }

    let components = match mode {
        ScoringMode::MinMax(_) => min_max_components(&rows),
        ScoringMode::MaxRatio => max_ratio_components(&rows),
    };

    let mut scored: Vec<RankedRow> = rows
        .into_iter()
        .zip(components)
        .map(|(row, components)| RankedRow {
            score: composite(mode, &components),
            row,
            components,
            rank: 0,
        })
        .collect();

    // stable: equal scores stay in input order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    for (position, item) in scored.iter_mut().enumerate() {
        item.rank = position + 1;
    }

    info!(
        ranked = scored.len(),
        top = scored.first().map(|r| r.score).unwrap_or_default(),
        "ranked institutions"
    );
    Ok(scored)
}
