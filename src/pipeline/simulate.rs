//! Sampling demonstrations: law of large numbers and central limit theorem
//! for the difference between two Bernoulli arms.

use anyhow::Result;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use serde::Serialize;

use super::error::ModelError;
use super::stats::{mean, std_dev};

/// Sampling distribution of the average difference for one sample size
#[derive(Debug, Clone, Serialize)]
pub struct CltSummary {
    pub n: usize,
    /// One average per replication
    pub means: Vec<f64>,
    pub mean: f64,
    pub sd: f64,
    /// Share of replications whose average difference is <= 0
    pub share_le_zero: f64,
}

fn arms(p_control: f64, p_treatment: f64) -> Result<(Bernoulli, Bernoulli)> {
    for (name, p) in [("control", p_control), ("treatment", p_treatment)] {
        if !(0.0..=1.0).contains(&p) {
            return Err(ModelError::InvalidConfig(format!(
                "{} probability must be in [0, 1], got {}",
                name, p
            ))
            .into());
        }
    }
    Ok((Bernoulli::new(p_control)?, Bernoulli::new(p_treatment)?))
}

fn paired_difference<R: Rng>(control: &Bernoulli, treatment: &Bernoulli, rng: &mut R) -> f64 {
    f64::from(u8::from(treatment.sample(rng))) - f64::from(u8::from(control.sample(rng)))
}

/// Running average of `draws` paired treatment-minus-control differences.
///
/// Element `i` is the average of the first `i + 1` differences; it settles
/// near `p_treatment - p_control` as `i` grows.
pub fn simulate_lln<R: Rng>(
    p_control: f64,
    p_treatment: f64,
    draws: usize,
    rng: &mut R,
) -> Result<Vec<f64>> {
    let (control, treatment) = arms(p_control, p_treatment)?;

    let mut total = 0.0;
    Ok((1..=draws)
        .map(|i| {
            total += paired_difference(&control, &treatment, rng);
            total / i as f64
        })
        .collect())
}

/// For each sample size, `reps` averages of that many paired differences.
pub fn simulate_clt<R: Rng>(
    p_control: f64,
    p_treatment: f64,
    sample_sizes: &[usize],
    reps: usize,
    rng: &mut R,
) -> Result<Vec<CltSummary>> {
    let (control, treatment) = arms(p_control, p_treatment)?;
    if reps == 0 {
        return Err(ModelError::InvalidConfig("reps must be at least 1".to_string()).into());
    }
    if sample_sizes.contains(&0) {
        return Err(ModelError::InvalidConfig("sample sizes must be positive".to_string()).into());
    }

    Ok(sample_sizes
        .iter()
        .map(|&n| {
            let means: Vec<f64> = (0..reps)
                .map(|_| {
                    (0..n)
                        .map(|_| paired_difference(&control, &treatment, rng))
                        .sum::<f64>()
                        / n as f64
                })
                .collect();
            let share_le_zero =
                means.iter().filter(|m| **m <= 0.0).count() as f64 / reps as f64;
            CltSummary {
                n,
                mean: mean(&means),
                sd: std_dev(&means),
                share_le_zero,
                means,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_lln_converges() {
        let mut rng = StdRng::seed_from_u64(42);
        let path = simulate_lln(0.018, 0.022, 100_000, &mut rng).unwrap();
        assert_eq!(path.len(), 100_000);
        let last = path.last().copied().unwrap();
        assert!((last - 0.004).abs() < 0.003, "last {}", last);
    }

    #[test]
    fn test_lln_degenerate_probabilities() {
        let mut rng = StdRng::seed_from_u64(0);
        let path = simulate_lln(0.0, 1.0, 10, &mut rng).unwrap();
        assert!(path.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_clt_sd_shrinks() {
        let mut rng = StdRng::seed_from_u64(7);
        let summaries = simulate_clt(0.3, 0.5, &[25, 400], 500, &mut rng).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].means.len(), 500);
        assert!(summaries[1].sd < summaries[0].sd);
        assert!(summaries[1].share_le_zero <= summaries[0].share_le_zero);
        assert!((summaries[1].mean - 0.2).abs() < 0.02);
    }

    #[test]
    fn test_invalid_probability() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(simulate_lln(-0.1, 0.5, 10, &mut rng).is_err());
        assert!(simulate_clt(0.5, 1.5, &[10], 10, &mut rng).is_err());
        assert!(simulate_clt(0.5, 0.5, &[0], 10, &mut rng).is_err());
    }
}
