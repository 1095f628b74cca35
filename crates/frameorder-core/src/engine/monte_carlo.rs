//! Monte-Carlo error propagation.
//!
//! Each replica perturbs every observation by a Gaussian of its stated error and is
//! re-optimised from the original solution. Replicas share nothing: each gets its own noise
//! stream and its own Sobol' shift, so they may run in any order or in parallel.

use super::error::EngineError;
use super::problem::{ObservedValues, Problem};
use super::progress::{Progress, ProgressReporter};
use nalgebra::DVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::warn;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Per-parameter statistics over the successful replicas.
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloSummary {
    pub names: Vec<String>,
    pub mean: DVector<f64>,
    /// Sample standard deviation (`n - 1` denominator); zero below two replicas.
    pub std: DVector<f64>,
    pub replicas: Vec<DVector<f64>>,
    pub failed: usize,
    /// One message per failed replica, in replica order.
    pub warnings: Vec<String>,
}

/// Noise stream of replica `replica`.
pub(crate) fn replica_rng(seed: u64, replica: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(replica as u64))
}

/// Digital-shift seed of the Sobol' sequence used by replica `replica`.
pub(crate) fn replica_shift(seed: u64, replica: usize) -> u64 {
    seed ^ replica as u64
}

fn noisy(value: f64, error: f64, rng: &mut StdRng) -> Result<f64, EngineError> {
    let normal = Normal::new(value, error)
        .map_err(|e| EngineError::Internal(format!("invalid noise distribution: {e}")))?;
    Ok(normal.sample(rng))
}

/// A copy of `base` with every present observation perturbed by its error.
pub(crate) fn perturb(
    problem: &Problem,
    base: &ObservedValues,
    rng: &mut StdRng,
) -> Result<ObservedValues, EngineError> {
    let pcs = problem
        .pcs_rows
        .iter()
        .zip(&base.pcs)
        .map(|(row, value)| noisy(*value, row.error, rng))
        .collect::<Result<Vec<_>, _>>()?;
    let rdc = problem
        .rdc_rows
        .iter()
        .zip(&base.rdc)
        .map(|(row, value)| noisy(*value, row.error, rng))
        .collect::<Result<Vec<_>, _>>()?;
    let reduced = problem
        .alignments
        .iter()
        .zip(&base.reduced)
        .map(
            |(alignment, values)| -> Result<Option<[f64; 5]>, EngineError> {
                match (alignment.reduced.as_ref(), values) {
                    (Some(reduced), Some(values)) => {
                        let mut out = [0.0; 5];
                        for (k, slot) in out.iter_mut().enumerate() {
                            *slot = noisy(values[k], reduced.errors[k], rng)?;
                        }
                        Ok(Some(out))
                    }
                    _ => Ok(*values),
                }
            },
        )
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ObservedValues { pcs, rdc, reduced })
}

/// Runs `job` for every replica index, in parallel when the `parallel` feature is enabled.
/// Results come back in replica order.
pub(crate) fn dispatch<F>(
    replicas: usize,
    reporter: &ProgressReporter,
    job: F,
) -> Vec<Result<DVector<f64>, EngineError>>
where
    F: Fn(usize) -> Result<DVector<f64>, EngineError> + Sync,
{
    reporter.report(Progress::TaskStart {
        total_steps: replicas as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = 0..replicas;

    #[cfg(feature = "parallel")]
    let iterator = (0..replicas).into_par_iter();

    let results = iterator
        .map(|replica| {
            let result = job(replica);
            reporter.report(Progress::TaskIncrement);
            result
        })
        .collect();

    reporter.report(Progress::TaskFinish);
    results
}

/// Mean and spread of the successful replicas; failures are logged and counted.
pub(crate) fn summarise(
    names: Vec<String>,
    centre: &DVector<f64>,
    results: Vec<Result<DVector<f64>, EngineError>>,
) -> MonteCarloSummary {
    let mut replicas = Vec::with_capacity(results.len());
    let mut warnings = Vec::new();
    let mut failed = 0;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(params) => replicas.push(params),
            Err(err) => {
                let message = format!("Monte-Carlo replica {index} failed: {err}");
                warn!("{message}");
                warnings.push(message);
                failed += 1;
            }
        }
    }

    let n = replicas.len();
    let mean = if n == 0 {
        centre.clone()
    } else {
        replicas.iter().fold(DVector::zeros(centre.len()), |acc, x| acc + x) / n as f64
    };
    let std = if n < 2 {
        DVector::zeros(centre.len())
    } else {
        let sum_sq = replicas.iter().fold(DVector::zeros(centre.len()), |acc, x| {
            let d = x - &mean;
            acc + d.component_mul(&d)
        });
        (sum_sq / (n - 1) as f64).map(f64::sqrt)
    };
    MonteCarloSummary {
        names,
        mean,
        std,
        replicas,
        failed,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::bundle::DataBundle;
    use crate::core::models::observation::Observation;
    use crate::core::models::spin::{Spin, SpinLabel};
    use crate::engine::problem::tests::alignment;
    use nalgebra::Vector3;

    const TOLERANCE: f64 = 1e-12;

    fn problem() -> Problem {
        let mut bundle = DataBundle::new();
        let align = bundle.add_alignment(alignment());
        for i in 0..40 {
            let x = 10.0 + i as f64;
            bundle.add_spin(
                Spin::new(SpinLabel::new("C", i + 1, "N"))
                    .with_position(Vector3::new(x, 2.0, -3.0))
                    .with_pcs(align, Observation::new(0.5, 0.05)),
            );
        }
        Problem::new(&bundle).unwrap()
    }

    #[test]
    fn perturbation_follows_the_stated_errors() {
        let problem = problem();
        let base = problem.observed();
        let mut rng = replica_rng(7, 0);
        let noisy = perturb(&problem, &base, &mut rng).unwrap();
        assert_eq!(noisy.pcs.len(), base.pcs.len());
        let deviations: Vec<f64> = noisy.pcs.iter().map(|v| (v - 0.5) / 0.05).collect();
        assert!(deviations.iter().all(|d| d.abs() < 6.0));
        assert!(deviations.iter().any(|d| d.abs() > 1e-6));
    }

    #[test]
    fn replica_streams_are_reproducible_and_distinct() {
        let problem = problem();
        let base = problem.observed();
        let a = perturb(&problem, &base, &mut replica_rng(3, 1)).unwrap();
        let b = perturb(&problem, &base, &mut replica_rng(3, 1)).unwrap();
        let c = perturb(&problem, &base, &mut replica_rng(3, 2)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(replica_shift(3, 1), replica_shift(3, 2));
    }

    #[test]
    fn summary_uses_the_sample_standard_deviation() {
        let results = vec![
            Ok(DVector::from_vec(vec![1.0, 10.0])),
            Ok(DVector::from_vec(vec![3.0, 10.0])),
            Err(EngineError::Optimisation("diverged".to_string())),
        ];
        let summary = summarise(vec!["a".into(), "b".into()], &DVector::zeros(2), results);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].starts_with("Monte-Carlo replica 2 failed"));
        assert!(summary.warnings[0].contains("diverged"));
        assert!((summary.mean[0] - 2.0).abs() < TOLERANCE);
        assert!((summary.std[0] - 2f64.sqrt()).abs() < TOLERANCE);
        assert!(summary.std[1].abs() < TOLERANCE);
    }

    #[test]
    fn zero_replicas_give_zero_width_intervals() {
        let centre = DVector::from_vec(vec![0.4, -1.0]);
        let summary = summarise(vec!["a".into(), "b".into()], &centre, Vec::new());
        assert_eq!(summary.mean, centre);
        assert_eq!(summary.std, DVector::zeros(2));
        assert!(summary.replicas.is_empty());
    }

    #[test]
    fn dispatch_returns_results_in_replica_order() {
        let results = dispatch(5, &ProgressReporter::new(), |r| Ok(DVector::from_element(1, r as f64)));
        let values: Vec<f64> = results.into_iter().map(|r| r.unwrap()[0]).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
