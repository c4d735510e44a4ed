//! Finite-difference derivatives through finitediff

use finitediff::FiniteDiff;

use super::Objective;

/// Central-difference gradient of `f` at `x`.
pub fn numerical_gradient<F>(f: F, x: &[f64]) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    x.to_vec().central_diff(&|p: &Vec<f64>| f(p))
}

/// Hessian of an objective by central differences of its gradient.
///
/// The result is symmetrised: `(H + H') / 2`.
pub fn numerical_hessian<O: Objective>(objective: &O, x: &[f64]) -> Vec<Vec<f64>> {
    let raw = x
        .to_vec()
        .central_hessian(&|p: &Vec<f64>| objective.gradient(p));
    let p = raw.len();
    (0..p)
        .map(|i| (0..p).map(|j| 0.5 * (raw[i][j] + raw[j][i])).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic;

    impl Objective for Quadratic {
        fn dim(&self) -> usize {
            2
        }

        // f(x, y) = x^2 + 3xy + 2y^2
        fn value(&self, x: &[f64]) -> f64 {
            x[0] * x[0] + 3.0 * x[0] * x[1] + 2.0 * x[1] * x[1]
        }

        fn gradient(&self, x: &[f64]) -> Vec<f64> {
            vec![2.0 * x[0] + 3.0 * x[1], 3.0 * x[0] + 4.0 * x[1]]
        }
    }

    #[test]
    fn test_numerical_gradient() {
        let g = numerical_gradient(|p| Quadratic.value(p), &[1.0, 2.0]);
        // df/dx = 2x + 3y = 8, df/dy = 3x + 4y = 11
        assert!((g[0] - 8.0).abs() < 1e-6);
        assert!((g[1] - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_numerical_hessian_is_symmetric_and_exact_for_quadratic() {
        let h = numerical_hessian(&Quadratic, &[0.5, -1.0]);
        assert!((h[0][0] - 2.0).abs() < 1e-4);
        assert!((h[1][1] - 4.0).abs() < 1e-4);
        assert!((h[0][1] - 3.0).abs() < 1e-4);
        assert_eq!(h[0][1], h[1][0]);
    }
}
