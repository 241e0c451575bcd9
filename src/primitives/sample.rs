use crate::score::Score;

/// Weighted observations with asymmetric uncertainties
///
/// The input of every robust estimator in this module. All four vectors
/// have the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    /// Observed values
    pub values: Vec<f64>,
    /// Voting rights (non-negative weights)
    pub weights: Vec<f64>,
    /// Left uncertainties
    pub left_uncs: Vec<f64>,
    /// Right uncertainties
    pub right_uncs: Vec<f64>,
}

impl Sample {
    /// Empty sample
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample of certain values with unit weights
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            values: values.to_vec(),
            weights: vec![1.0; values.len()],
            left_uncs: vec![0.0; values.len()],
            right_uncs: vec![0.0; values.len()],
        }
    }

    /// Sample of scores with weights; NaN scores are skipped
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (Score, f64)>,
    {
        let mut sample = Self::new();
        for (score, weight) in scores {
            sample.push(score, weight);
        }
        sample
    }

    /// Append one observation; NaN scores are ignored
    pub fn push(&mut self, score: Score, weight: f64) {
        if score.is_nan() {
            return;
        }
        self.values.push(score.value());
        self.weights.push(weight);
        self.left_uncs.push(score.left_unc());
        self.right_uncs.push(score.right_unc());
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Is the sample empty?
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total weight
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Uncertainty of observation `i` seen from `y`: left when `y` is below
    /// the value, right when above
    pub(crate) fn facing_uncertainty(&self, i: usize, y: f64) -> f64 {
        if y < self.values[i] {
            self.left_uncs[i]
        } else if y > self.values[i] {
            self.right_uncs[i]
        } else {
            0.0
        }
    }
}
