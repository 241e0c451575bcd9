//! Root laws of generalized Bradley-Terry models
//!
//! A root law is the distribution of a normalized comparison when the two
//! compared entities have equal scores. The learner only needs its
//! cumulant-generating function `Ψ` and the first two derivatives.

use serde::{Deserialize, Serialize};

const LN_2: f64 = std::f64::consts::LN_2;

/// Distribution of normalized comparisons under equal scores
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum RootLaw {
    /// Uniform on `[-1, 1]`
    #[default]
    Uniform,
    /// Uniform on `{-1, 1}`; comparisons are reduced to their sign
    BradleyTerry,
    /// Gaussian with standard deviation `std`
    Gaussian {
        /// Standard deviation
        std: f64,
    },
    /// Uniform on `n_values` evenly spaced points of `[-1, 1]`
    Discrete {
        /// Number of admissible values, at least 2
        n_values: u32,
    },
}

impl RootLaw {
    /// Supremum of the admissible normalized comparisons
    pub fn sup(&self) -> f64 {
        match self {
            Self::Gaussian { .. } => f64::INFINITY,
            _ => 1.0,
        }
    }

    /// Normalize a raw comparison value
    pub fn normalize_comparison(&self, value: f64, value_max: f64) -> f64 {
        match self {
            Self::BradleyTerry => sign(value),
            _ => value / value_max,
        }
    }

    /// Normalize a raw rating to `[-1, 1]`
    pub fn normalize_rating(&self, value: f64, min: f64, max: f64) -> f64 {
        let middle = (min + max) / 2.0;
        match self {
            Self::BradleyTerry => sign(value - middle),
            _ => 2.0 * (value - middle) / (max - min),
        }
    }

    /// Cumulant-generating function `Ψ(x)`
    pub fn cgf(&self, x: f64) -> f64 {
        let a = x.abs();
        match *self {
            Self::Uniform => {
                if a <= 0.1 {
                    a * a / 6.0 - a.powi(4) / 180.0
                } else if a < 20.0 {
                    (a.sinh() / a).ln()
                } else {
                    a - LN_2 - a.ln()
                }
            }
            Self::BradleyTerry => {
                if a < 20.0 {
                    a.cosh().ln()
                } else {
                    a - LN_2
                }
            }
            Self::Gaussian { std } => std * std * x * x / 2.0,
            Self::Discrete { n_values } => {
                let k = f64::from(n_values);
                let km1 = k - 1.0;
                if a <= 0.1 {
                    a * a * (k + 1.0) / (6.0 * km1)
                } else if a < 20.0 {
                    ((k * a / km1).sinh() / (a / km1).sinh()).ln() - k.ln()
                } else {
                    a - k.ln()
                }
            }
        }
    }

    /// First derivative `Ψ′(x)`
    pub fn cgf_derivative(&self, x: f64) -> f64 {
        match *self {
            Self::Uniform => {
                if x.abs() < 1e-2 {
                    x / 3.0
                } else {
                    1.0 / x.tanh() - 1.0 / x
                }
            }
            Self::BradleyTerry => x.tanh(),
            Self::Gaussian { std } => std * std * x,
            Self::Discrete { n_values } => {
                let k = f64::from(n_values);
                let km1 = k - 1.0;
                if x.abs() < 1e-2 {
                    x * (k + 1.0) / (3.0 * km1)
                } else {
                    (k / (k * x / km1).tanh() - 1.0 / (x / km1).tanh()) / km1
                }
            }
        }
    }

    /// Second derivative `Ψ″(x)`
    pub fn cgf_second_derivative(&self, x: f64) -> f64 {
        match *self {
            Self::Uniform => {
                if x.abs() < 1e-2 {
                    1.0 / 3.0 - x * x / 15.0
                } else {
                    1.0 / (x * x) - 1.0 / x.tanh().powi(2) + 1.0
                }
            }
            Self::BradleyTerry => 1.0 / x.cosh().powi(2),
            Self::Gaussian { std } => std * std,
            Self::Discrete { n_values } => {
                let k = f64::from(n_values);
                let km1 = k - 1.0;
                if x.abs() < 1e-2 {
                    (k + 1.0) / (3.0 * km1) + (1.0 - k.powi(4)) * x * x / (15.0 * km1.powi(4))
                } else {
                    (k + 1.0) / km1
                        + (1.0 / (x / km1).tanh().powi(2) - k * k / (k * x / km1).tanh().powi(2))
                            / (km1 * km1)
                }
            }
        }
    }

    /// Check the law's parameters
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Gaussian { std } if !(std > 0.0) || !std.is_finite() => {
                Err(format!("Gaussian root law needs std > 0, got {}", std))
            }
            Self::Discrete { n_values } if n_values < 2 => {
                Err(format!("Discrete root law needs n_values >= 2, got {}", n_values))
            }
            _ => Ok(()),
        }
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
