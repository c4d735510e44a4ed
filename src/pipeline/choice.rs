//! Choice-experiment task grouping and validation
//!
//! A conjoint dataset stores one row per alternative. Rows that share a
//! respondent and task id form a choice task, and exactly one of them must
//! carry the chosen flag.

use std::collections::HashMap;

use anyhow::Result;
use polars::prelude::*;

use super::encoding::{column_as_f64, column_as_strings};
use super::error::ModelError;

/// Tolerance for floating point comparison when checking 0/1 flags
const TOLERANCE: f64 = 1e-9;

/// One choice task: the alternatives shown together and the one picked.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceTask {
    pub respondent: String,
    pub task: String,
    /// Row indices of the alternatives, in file order
    pub rows: Vec<usize>,
    /// Row index of the chosen alternative
    pub chosen: usize,
}

impl ChoiceTask {
    /// Position of the chosen alternative within `rows`.
    pub fn chosen_position(&self) -> usize {
        self.rows
            .iter()
            .position(|&r| r == self.chosen)
            .unwrap_or_default()
    }
}

/// Group alternatives into choice tasks keyed by `(respondent, task)`.
///
/// Tasks are returned in first-seen order. Every task must contain exactly
/// one row with the chosen flag set to 1, and every flag must be 0 or 1.
pub fn group_choice_tasks(
    df: &DataFrame,
    resp_col: &str,
    task_col: &str,
    choice_col: &str,
) -> Result<Vec<ChoiceTask>> {
    let respondents = column_as_strings(df, resp_col)?;
    let tasks = column_as_strings(df, task_col)?;
    let flags = column_as_f64(df, choice_col)?;

    for (row, &flag) in flags.iter().enumerate() {
        let is_zero = flag.abs() < TOLERANCE;
        let is_one = (flag - 1.0).abs() < TOLERANCE;
        if !is_zero && !is_one {
            return Err(ModelError::InvalidIndicator {
                column: choice_col.to_string(),
                row,
                value: flag,
            }
            .into());
        }
    }

    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<(String, String, Vec<usize>)> = Vec::new();

    for row in 0..df.height() {
        let resp = respondents[row].clone().ok_or_else(|| {
            anyhow::anyhow!("Respondent column '{}' is null at row {}", resp_col, row)
        })?;
        let task = tasks[row].clone().ok_or_else(|| {
            anyhow::anyhow!("Task column '{}' is null at row {}", task_col, row)
        })?;

        let key = (resp.clone(), task.clone());
        match index.get(&key) {
            Some(&g) => groups[g].2.push(row),
            None => {
                index.insert(key, groups.len());
                groups.push((resp, task, vec![row]));
            }
        }
    }

    groups
        .into_iter()
        .map(|(respondent, task, rows)| {
            let chosen_rows: Vec<usize> = rows
                .iter()
                .copied()
                .filter(|&r| (flags[r] - 1.0).abs() < TOLERANCE)
                .collect();

            if chosen_rows.len() != 1 {
                return Err(ModelError::InvalidChoiceTask {
                    respondent,
                    task,
                    chosen: chosen_rows.len(),
                }
                .into());
            }

            Ok(ChoiceTask {
                respondent,
                task,
                rows,
                chosen: chosen_rows[0],
            })
        })
        .collect()
}
