//! Error types for model fitting and data validation.

use thiserror::Error;

/// Errors raised by the estimation routines when the input data or the
/// numerical state makes a fit impossible.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A choice task does not have exactly one chosen alternative.
    #[error("Choice task (respondent {respondent}, task {task}) has {chosen} chosen alternatives; expected exactly 1")]
    InvalidChoiceTask {
        respondent: String,
        task: String,
        chosen: usize,
    },

    /// An indicator column holds something other than 0/1.
    #[error("Indicator column '{column}' must contain only 0/1 values, found {value} at row {row}")]
    InvalidIndicator {
        column: String,
        row: usize,
        value: f64,
    },

    /// A class label is not an integer.
    #[error("Label column '{column}' must contain integer class labels, found {value} at row {row}")]
    InvalidLabel {
        column: String,
        row: usize,
        value: f64,
    },

    /// A count outcome is negative, fractional or non-finite.
    #[error("Count outcome must be a non-negative integer, found {value} at row {row}")]
    InvalidCount { row: usize, value: f64 },

    /// The objective is not finite at the starting point.
    #[error("Objective is not finite at the starting values ({value})")]
    NonFiniteObjective { value: f64 },

    /// The optimiser stepped to parameters that are not finite.
    #[error("Optimiser produced non-finite parameters")]
    NonFiniteParameters,

    /// The Hessian at the optimum cannot be inverted.
    #[error("Hessian is not positive definite at the optimum; standard errors are unavailable")]
    SingularHessian,

    /// A cross-product matrix (X'X or X'WX) cannot be inverted.
    #[error("Design matrix is rank deficient; check for collinear or constant columns")]
    SingularDesign,

    /// Dimensions of the inputs do not agree.
    #[error("Dimension mismatch: {what} (expected {expected}, got {actual})")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_choice_task_display() {
        let err = ModelError::InvalidChoiceTask {
            respondent: "7".to_string(),
            task: "3".to_string(),
            chosen: 2,
        };
        assert_eq!(
            err.to_string(),
            "Choice task (respondent 7, task 3) has 2 chosen alternatives; expected exactly 1"
        );
    }

    #[test]
    fn test_invalid_count_display() {
        let err = ModelError::InvalidCount {
            row: 4,
            value: -1.0,
        };
        assert!(err.to_string().contains("row 4"));
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = ModelError::DimensionMismatch {
            what: "outcome length".to_string(),
            expected: 10,
            actual: 9,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: outcome length (expected 10, got 9)"
        );
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = ModelError::SingularHessian.into();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::SingularHessian)
        ));
    }
}
