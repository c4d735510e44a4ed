//! Randomised field-experiment analysis
//!
//! Difference-in-means tests, OLS with classical standard errors, covariate
//! balance checks and a probit model for binary outcomes.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use faer::Mat;
use polars::prelude::*;
use serde::Serialize;
use statrs::distribution::{Continuous, ContinuousCDF, Normal, StudentsT};

use super::encoding::{column_as_strings, DesignMatrix};
use super::error::ModelError;
use super::linalg::{invert_spd, mat_vec};
use super::optim::{fit_mle, BfgsConfig, MleFit, Objective};
use super::stats::{mean, std_dev, variance};

/// Welch two-sample t-test of `mean(a) - mean(b)`
#[derive(Debug, Clone, Serialize)]
pub struct TTestResult {
    pub n_a: usize,
    pub n_b: usize,
    pub mean_a: f64,
    pub mean_b: f64,
    pub difference: f64,
    pub std_error: f64,
    pub t_statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

/// OLS coefficients with classical (homoskedastic) inference
#[derive(Debug, Clone, Serialize)]
pub struct OlsFit {
    pub names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub t_values: Vec<f64>,
    pub p_values: Vec<f64>,
    pub r_squared: f64,
    pub n: usize,
}

impl OlsFit {
    pub fn coefficient(&self, name: &str) -> Option<(f64, f64, f64)> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| (self.coefficients[i], self.std_errors[i], self.p_values[i]))
    }
}

/// Balance of one pre-treatment covariate across arms
#[derive(Debug, Clone, Serialize)]
pub struct BalanceRow {
    pub covariate: String,
    pub control_mean: f64,
    pub treatment_mean: f64,
    pub t_test: TTestResult,
    /// Treatment coefficient from regressing the covariate on the indicator
    pub ols_coefficient: f64,
    pub ols_std_error: f64,
    pub ols_p_value: f64,
}

/// Outcome summary for one group
#[derive(Debug, Clone, Serialize)]
pub struct GroupRate {
    pub group: String,
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
}

fn two_sided_t_p(t: f64, df: f64) -> Result<f64> {
    let dist = StudentsT::new(0.0, 1.0, df)?;
    Ok(2.0 * dist.sf(t.abs()))
}

/// Welch's t-test for a difference in means with unequal variances.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<TTestResult> {
    if a.len() < 2 || b.len() < 2 {
        return Err(ModelError::InvalidConfig(format!(
            "t-test needs at least two observations per group (got {} and {})",
            a.len(),
            b.len()
        ))
        .into());
    }

    let (n_a, n_b) = (a.len() as f64, b.len() as f64);
    let (va, vb) = (variance(a) / n_a, variance(b) / n_b);
    let std_error = (va + vb).sqrt();
    if std_error <= 0.0 {
        return Err(ModelError::InvalidConfig(
            "both groups are constant; the t statistic is undefined".to_string(),
        )
        .into());
    }

    let (mean_a, mean_b) = (mean(a), mean(b));
    let difference = mean_a - mean_b;
    let t_statistic = difference / std_error;
    let df = (va + vb).powi(2) / (va * va / (n_a - 1.0) + vb * vb / (n_b - 1.0));

    Ok(TTestResult {
        n_a: a.len(),
        n_b: b.len(),
        mean_a,
        mean_b,
        difference,
        std_error,
        t_statistic,
        df,
        p_value: two_sided_t_p(t_statistic, df)?,
    })
}

/// Ordinary least squares of `y` on the columns of `x`.
pub fn fit_ols(x: &DesignMatrix, y: &[f64]) -> Result<OlsFit> {
    let (n, p) = (x.nrows(), x.ncols());
    if y.len() != n {
        return Err(ModelError::DimensionMismatch {
            what: "outcome length".to_string(),
            expected: n,
            actual: y.len(),
        }
        .into());
    }
    if n <= p {
        return Err(ModelError::InvalidConfig(format!(
            "OLS needs more observations ({}) than coefficients ({})",
            n, p
        ))
        .into());
    }

    let xtx = x.data.transpose() * &x.data;
    let xtx_inv = invert_spd(&xtx).ok_or(ModelError::SingularDesign)?;
    let y_col = Mat::from_fn(n, 1, |i, _| y[i]);
    let xty = x.data.transpose() * &y_col;
    let beta_col = &xtx_inv * &xty;
    let coefficients: Vec<f64> = (0..p).map(|j| beta_col[(j, 0)]).collect();

    let fitted = mat_vec(&x.data, &coefficients);
    let ssr: f64 = y.iter().zip(&fitted).map(|(yi, fi)| (yi - fi).powi(2)).sum();
    let y_bar = mean(y);
    let sst: f64 = y.iter().map(|yi| (yi - y_bar).powi(2)).sum();
    let df = (n - p) as f64;
    let sigma2 = ssr / df;

    let std_errors: Vec<f64> = (0..p).map(|j| (sigma2 * xtx_inv[(j, j)]).sqrt()).collect();
    let t_values: Vec<f64> = coefficients
        .iter()
        .zip(&std_errors)
        .map(|(b, se)| b / se)
        .collect();
    let p_values = t_values
        .iter()
        .map(|t| two_sided_t_p(*t, df))
        .collect::<Result<Vec<_>>>()?;

    Ok(OlsFit {
        names: x.names.clone(),
        coefficients,
        std_errors,
        t_values,
        p_values,
        r_squared: if sst > 0.0 { 1.0 - ssr / sst } else { 0.0 },
        n,
    })
}

/// Rows where both columns are non-null, as `(a, b)` pairs.
fn paired_values(df: &DataFrame, a: &str, b: &str) -> Result<Vec<(f64, f64)>> {
    let read = |name: &str| -> Result<Vec<Option<f64>>> {
        let column = df
            .column(name)
            .with_context(|| format!("Column '{}' not found", name))?
            .cast(&DataType::Float64)
            .with_context(|| format!("Column '{}' is not numeric", name))?;
        Ok(column.f64()?.into_iter().collect())
    };

    let (left, right) = (read(a)?, read(b)?);
    Ok(left
        .into_iter()
        .zip(right)
        .filter_map(|(l, r)| Some((l?, r?)))
        .collect())
}

fn split_by_indicator(pairs: &[(f64, f64)], indicator: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut control = Vec::new();
    let mut treated = Vec::new();
    for (row, &(flag, value)) in pairs.iter().enumerate() {
        if flag == 1.0 {
            treated.push(value);
        } else if flag == 0.0 {
            control.push(value);
        } else {
            return Err(ModelError::InvalidIndicator {
                column: indicator.to_string(),
                row,
                value: flag,
            }
            .into());
        }
    }
    Ok((control, treated))
}

/// Treatment-effect t-test of `outcome` between the arms of a 0/1
/// `treatment` column, rows with a missing value in either column dropped.
pub fn treatment_t_test(df: &DataFrame, treatment: &str, outcome: &str) -> Result<TTestResult> {
    let pairs = paired_values(df, treatment, outcome)?;
    let (control, treated) = split_by_indicator(&pairs, treatment)?;
    welch_t_test(&treated, &control)
        .with_context(|| format!("t-test of '{}' by '{}'", outcome, treatment))
}

/// Check each covariate for balance across the arms of `treatment`.
///
/// Both the Welch t-test and the OLS regression of the covariate on the
/// treatment indicator are reported; their point estimates coincide.
pub fn balance_test(
    df: &DataFrame,
    treatment: &str,
    covariates: &[String],
) -> Result<Vec<BalanceRow>> {
    covariates
        .iter()
        .map(|covariate| {
            let pairs = paired_values(df, treatment, covariate)?;
            let (control, treated) = split_by_indicator(&pairs, treatment)?;
            let t_test = welch_t_test(&treated, &control)
                .with_context(|| format!("balance test for '{}'", covariate))?;

            let x = DesignMatrix::from_columns(vec![
                ("intercept".to_string(), vec![1.0; pairs.len()]),
                (treatment.to_string(), pairs.iter().map(|p| p.0).collect()),
            ])?;
            let y: Vec<f64> = pairs.iter().map(|p| p.1).collect();
            let ols = fit_ols(&x, &y)?;

            Ok(BalanceRow {
                covariate: covariate.clone(),
                control_mean: t_test.mean_b,
                treatment_mean: t_test.mean_a,
                ols_coefficient: ols.coefficients[1],
                ols_std_error: ols.std_errors[1],
                ols_p_value: ols.p_values[1],
                t_test,
            })
        })
        .collect()
}

/// Values of `value_col` keyed by the level of `group_col`. Rows with a
/// missing group or value are skipped.
pub fn split_by_group(
    df: &DataFrame,
    group_col: &str,
    value_col: &str,
) -> Result<BTreeMap<String, Vec<f64>>> {
    let groups = column_as_strings(df, group_col)?;
    let values: Vec<Option<f64>> = df
        .column(value_col)
        .with_context(|| format!("Column '{}' not found", value_col))?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' is not numeric", value_col))?
        .f64()?
        .into_iter()
        .collect();

    let mut out: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (group, value) in groups.into_iter().zip(values) {
        if let (Some(g), Some(v)) = (group, value) {
            out.entry(g).or_default().push(v);
        }
    }
    Ok(out)
}

/// Size, mean and standard deviation of `outcome` within each group.
pub fn group_rates(df: &DataFrame, group_col: &str, outcome: &str) -> Result<Vec<GroupRate>> {
    Ok(split_by_group(df, group_col, outcome)?
        .into_iter()
        .map(|(group, values)| GroupRate {
            group,
            n: values.len(),
            mean: mean(&values),
            sd: std_dev(&values),
        })
        .collect())
}

const PROB_FLOOR: f64 = 1e-12;

/// Probit negative log-likelihood: `P(y = 1) = Phi(x . beta)`
pub struct ProbitNegLogLik<'a> {
    pub x: &'a DesignMatrix,
    pub y: &'a [f64],
    normal: Normal,
}

impl<'a> ProbitNegLogLik<'a> {
    pub fn new(x: &'a DesignMatrix, y: &'a [f64]) -> Result<Self> {
        if y.len() != x.nrows() {
            return Err(ModelError::DimensionMismatch {
                what: "outcome length".to_string(),
                expected: x.nrows(),
                actual: y.len(),
            }
            .into());
        }
        if let Some((row, value)) = y
            .iter()
            .enumerate()
            .find(|(_, v)| **v != 0.0 && **v != 1.0)
        {
            return Err(ModelError::InvalidIndicator {
                column: "outcome".to_string(),
                row,
                value: *value,
            }
            .into());
        }
        Ok(Self {
            x,
            y,
            normal: Normal::new(0.0, 1.0)?,
        })
    }
}

impl Objective for ProbitNegLogLik<'_> {
    fn dim(&self) -> usize {
        self.x.ncols()
    }

    fn value(&self, beta: &[f64]) -> f64 {
        self.y
            .iter()
            .enumerate()
            .map(|(i, &yi)| {
                let eta = self.x.row_dot(i, beta);
                let p = if yi == 1.0 {
                    self.normal.cdf(eta)
                } else {
                    self.normal.sf(eta)
                };
                -p.max(PROB_FLOOR).ln()
            })
            .sum()
    }

    fn gradient(&self, beta: &[f64]) -> Vec<f64> {
        let mut grad = vec![0.0; self.dim()];
        for (i, &yi) in self.y.iter().enumerate() {
            let eta = self.x.row_dot(i, beta);
            let density = self.normal.pdf(eta);
            // d/d eta of -log P(y | eta)
            let score = if yi == 1.0 {
                -density / self.normal.cdf(eta).max(PROB_FLOOR)
            } else {
                density / self.normal.sf(eta).max(PROB_FLOOR)
            };
            for (j, g) in grad.iter_mut().enumerate() {
                *g += score * self.x.data[(i, j)];
            }
        }
        grad
    }
}

/// Fit a probit model by maximum likelihood, starting from zero.
pub fn fit_probit(x: &DesignMatrix, y: &[f64], config: &BfgsConfig) -> Result<MleFit> {
    let nll = ProbitNegLogLik::new(x, y)?;
    let x0 = vec![0.0; x.ncols()];
    fit_mle(&nll, x.names.clone(), &x0, config)
}

/// Average marginal effect of `column` on `P(y = 1)`.
///
/// For a 0/1 indicator this is the mean change in probability when the
/// indicator switches from 0 to 1; otherwise the mean of `phi(eta) * beta_j`.
pub fn probit_average_marginal_effect(fit: &MleFit, x: &DesignMatrix, column: &str) -> Result<f64> {
    let j = x
        .column_index(column)
        .with_context(|| format!("Column '{}' is not part of the probit design", column))?;
    let normal = Normal::new(0.0, 1.0)?;
    let beta = &fit.estimates;

    let is_indicator = x.column(j).iter().all(|v| *v == 0.0 || *v == 1.0);
    let effects: Vec<f64> = if is_indicator {
        let on = x.with_column_set(j, 1.0).linear_predictor(beta);
        let off = x.with_column_set(j, 0.0).linear_predictor(beta);
        on.iter()
            .zip(&off)
            .map(|(a, b)| normal.cdf(*a) - normal.cdf(*b))
            .collect()
    } else {
        x.linear_predictor(beta)
            .iter()
            .map(|eta| normal.pdf(*eta) * beta[j])
            .collect()
    };

    Ok(mean(&effects))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welch_known_values() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let t = welch_t_test(&a, &b).unwrap();
        assert!((t.difference + 2.5).abs() < 1e-12);
        // se = sqrt(1.6667/4 + 6.6667/4)
        assert!((t.std_error - (10.0f64 / 6.0 / 4.0 + 20.0 / 3.0 / 4.0).sqrt()).abs() < 1e-12);
        assert!(t.df > 3.0 && t.df < 6.0);
        assert!(t.p_value > 0.1 && t.p_value < 0.3);
    }

    #[test]
    fn test_welch_needs_two_observations() {
        assert!(welch_t_test(&[1.0], &[1.0, 2.0]).is_err());
        assert!(welch_t_test(&[1.0, 1.0], &[2.0, 2.0]).is_err());
    }

    #[test]
    fn test_ols_exact_fit() {
        let x = DesignMatrix::from_columns(vec![
            ("intercept".to_string(), vec![1.0; 5]),
            ("x".to_string(), vec![0.0, 1.0, 2.0, 3.0, 4.0]),
        ])
        .unwrap();
        let y = [1.0, 3.1, 4.9, 7.0, 9.0];
        let fit = fit_ols(&x, &y).unwrap();
        assert!((fit.coefficients[1] - 2.0).abs() < 0.05);
        assert!(fit.r_squared > 0.99);
        assert!(fit.p_values[1] < 0.001);
    }

    #[test]
    fn test_balance_matches_difference_in_means() {
        let df = df! {
            "treat" => [0i32, 0, 0, 1, 1, 1],
            "age" => [Some(30.0f64), Some(40.0), Some(35.0), Some(33.0), None, Some(41.0)],
        }
        .unwrap();
        let rows = balance_test(&df, "treat", &["age".to_string()]).unwrap();
        let row = &rows[0];
        assert_eq!(row.t_test.n_a, 2);
        assert!((row.ols_coefficient - row.t_test.difference).abs() < 1e-9);
        assert!((row.control_mean - 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_group_rates() {
        let df = df! {
            "ratio" => ["1:1", "2:1", "1:1", "2:1"],
            "gave" => [1.0f64, 0.0, 0.0, 0.0],
        }
        .unwrap();
        let rates = group_rates(&df, "ratio", "gave").unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].group, "1:1");
        assert!((rates[0].mean - 0.5).abs() < 1e-12);
        assert_eq!(rates[1].mean, 0.0);
    }

    #[test]
    fn test_probit_gradient_matches_numerical() {
        let x = DesignMatrix::from_columns(vec![
            ("intercept".to_string(), vec![1.0; 4]),
            ("d".to_string(), vec![0.0, 1.0, 0.0, 1.0]),
        ])
        .unwrap();
        let y = [0.0, 1.0, 1.0, 1.0];
        let nll = ProbitNegLogLik::new(&x, &y).unwrap();
        let beta = [0.1, 0.4];
        let analytic = nll.gradient(&beta);
        let numeric = crate::pipeline::optim::numerical_gradient(|b| nll.value(b), &beta);
        for (a, n) in analytic.iter().zip(&numeric) {
            assert!((a - n).abs() < 1e-5);
        }
    }

    #[test]
    fn test_probit_rejects_non_binary_outcome() {
        let x = DesignMatrix::from_columns(vec![("intercept".to_string(), vec![1.0; 2])]).unwrap();
        assert!(ProbitNegLogLik::new(&x, &[0.0, 2.0]).is_err());
    }
}
