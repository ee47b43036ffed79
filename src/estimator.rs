//! Frequency to probability estimators.
//!
//! Both the tree cut engine and the grammar turn raw (possibly fractional)
//! frequencies into probabilities. The [`Estimator`] is bound once to the sample
//! it describes and is then queried for as many frequencies as needed.

use serde::{Deserialize, Serialize};

/// Selects which [`Estimator`] a model builds once its sample size is known
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// Maximum likelihood, `f / n`
    #[default]
    Mle,
    /// Additive smoothing with a pseudocount of 1
    Laplace,
}

/// An estimator bound to the sample it normalizes against
///
/// ```rust
/// use semantic_guesser_rs::estimator::Estimator;
///
/// let mle = Estimator::mle(10.0);
/// assert!(mle.probability(2.0) == 0.2);
///
/// // "eagle" seen twice in a sample of 10 spread over 7 classes
/// let laplace = Estimator::laplace(10.0, 7.0, 1.0);
/// assert!((laplace.probability(2.0) - 3.0 / 17.0).abs() < 1e-12);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    Mle {
        sample_size: f64,
    },
    Laplace {
        sample_size: f64,
        vocabulary_size: f64,
        pseudocount: f64,
    },
}

impl Estimator {
    pub fn mle(sample_size: f64) -> Self {
        Self::Mle { sample_size }
    }

    pub fn laplace(sample_size: f64, vocabulary_size: f64, pseudocount: f64) -> Self {
        Self::Laplace {
            sample_size,
            vocabulary_size,
            pseudocount,
        }
    }

    /// Builds the estimator of the given kind. Laplace smoothing always uses a
    /// pseudocount of 1 here.
    pub fn for_kind(kind: EstimatorKind, sample_size: f64, vocabulary_size: usize) -> Self {
        match kind {
            EstimatorKind::Mle => Self::mle(sample_size),
            EstimatorKind::Laplace => Self::laplace(sample_size, vocabulary_size as f64, 1.0),
        }
    }

    /// Probability of a single outcome seen `frequency` times
    pub fn probability(&self, frequency: f64) -> f64 {
        self.node_probability(frequency, 1)
    }

    /// Probability of a class that stands in for `multiplicity` outcomes.
    ///
    /// The multiplicity only matters for Laplace smoothing, where each member
    /// of the class receives its own pseudocount. A degenerate sample (empty, or
    /// an empty vocabulary with no observations) gives 0.
    pub fn node_probability(&self, frequency: f64, multiplicity: usize) -> f64 {
        match *self {
            Self::Mle { sample_size } => {
                if sample_size <= 0.0 {
                    0.0
                } else {
                    frequency / sample_size
                }
            },
            Self::Laplace {
                sample_size,
                vocabulary_size,
                pseudocount,
            } => {
                let denominator = sample_size + vocabulary_size * pseudocount;
                if denominator <= 0.0 {
                    0.0
                } else {
                    (frequency + multiplicity as f64 * pseudocount) / denominator
                }
            },
        }
    }

    pub fn kind(&self) -> EstimatorKind {
        match self {
            Self::Mle { .. } => EstimatorKind::Mle,
            Self::Laplace { .. } => EstimatorKind::Laplace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Laplace smoothing of a single leaf out of the 7 leaf animal tree
    fn test_laplace_leaf() {
        let estimator = Estimator::laplace(10.0, 7.0, 1.0);
        let p = estimator.node_probability(2.0, 1);
        assert!((p - 3.0 / 17.0).abs() < 1e-12, "expected 3/17, got {p}");
    }

    #[test]
    /// A class covering several leaves gets one pseudocount per leaf
    fn test_laplace_multiplicity() {
        let estimator = Estimator::laplace(10.0, 7.0, 1.0);
        let p = estimator.node_probability(8.0, 4);
        assert!((p - 12.0 / 17.0).abs() < 1e-12);
    }

    #[test]
    /// Maximum likelihood ignores the multiplicity
    fn test_mle_ignores_multiplicity() {
        let estimator = Estimator::mle(10.0);
        assert!(estimator.node_probability(8.0, 4) == 0.8);
    }

    #[test]
    /// Empty samples never divide by zero
    fn test_degenerate_samples() {
        assert!(Estimator::mle(0.0).probability(3.0) == 0.0);
        assert!(Estimator::laplace(0.0, 0.0, 1.0).probability(0.0) == 0.0);
    }

    #[test]
    /// With no observations Laplace falls back to a uniform distribution
    fn test_laplace_uniform_without_data() {
        let estimator = Estimator::for_kind(EstimatorKind::Laplace, 0.0, 4);
        assert!(estimator.probability(0.0) == 0.25);
    }
}
