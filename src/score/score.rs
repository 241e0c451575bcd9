//! Scores with asymmetric uncertainties
//!
//! A [`Score`] is an interval-like estimate `(value, left_unc, right_unc)`,
//! read as "most likely `value`, plausibly anywhere in
//! `[value - left_unc, value + right_unc]`". Learned preference models,
//! scales and aggregated results all carry their reliability this way.
//!
//! # Example
//!
//! ```rust
//! use collabscore::score::Score;
//!
//! let a = Score::new(2.0, 0.5, 1.0).unwrap();
//! let b = Score::new(1.0, 0.2, 0.2).unwrap();
//!
//! let diff = a - b;
//! assert_eq!(diff.value(), 1.0);
//! assert_eq!(diff.left_unc(), 0.7);
//! assert_eq!(diff.right_unc(), 1.2);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::error::ScoreError;

/// Score with asymmetric uncertainty
///
/// The `Nan` variant is the canonical form of every undefined score: its
/// value reads as NaN and both uncertainties as `+∞`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Score {
    /// A defined score
    Finite {
        /// Point estimate
        value: f64,
        /// Distance from the value to the lower end of the interval
        left_unc: f64,
        /// Distance from the value to the upper end of the interval
        right_unc: f64,
    },
    /// Undefined score
    Nan,
}

impl Default for Score {
    fn default() -> Self {
        Score::Nan
    }
}

impl Score {
    /// Create a score, rejecting negative uncertainties
    ///
    /// A NaN value yields the canonical [`Score::Nan`] whatever the
    /// uncertainties are.
    pub fn new(value: f64, left_unc: f64, right_unc: f64) -> Result<Self, ScoreError> {
        if value.is_nan() {
            return Ok(Score::Nan);
        }
        if !(left_unc >= 0.0) || !(right_unc >= 0.0) {
            return Err(ScoreError::NegativeUncertainty {
                left: left_unc,
                right: right_unc,
            });
        }
        Ok(Score::Finite {
            value,
            left_unc,
            right_unc,
        })
    }

    /// Score without uncertainty
    pub fn certain(value: f64) -> Self {
        Self::symmetric(value, 0.0)
    }

    /// Score with the same uncertainty on both sides
    ///
    /// The uncertainty is taken in absolute value.
    pub fn symmetric(value: f64, uncertainty: f64) -> Self {
        if value.is_nan() || uncertainty.is_nan() {
            return Score::Nan;
        }
        let u = uncertainty.abs();
        Score::Finite {
            value,
            left_unc: u,
            right_unc: u,
        }
    }

    /// Canonical undefined score
    pub fn nan() -> Self {
        Score::Nan
    }

    /// Build a score from its value and interval endpoints
    ///
    /// Endpoints on the wrong side of the value (rounding noise in interval
    /// arithmetic) are snapped onto the value.
    pub(crate) fn from_bounds(value: f64, min: f64, max: f64) -> Self {
        if value.is_nan() {
            return Score::Nan;
        }
        let left_unc = value - min;
        let right_unc = max - value;
        Score::Finite {
            value,
            left_unc: if left_unc.is_nan() {
                f64::INFINITY
            } else {
                left_unc.max(0.0)
            },
            right_unc: if right_unc.is_nan() {
                f64::INFINITY
            } else {
                right_unc.max(0.0)
            },
        }
    }

    /// Build a score from its value and a set of candidate extreme points
    fn from_extremes(value: f64, extremes: [f64; 4]) -> Self {
        let min = extremes
            .iter()
            .copied()
            .filter(|x| !x.is_nan())
            .fold(f64::INFINITY, f64::min);
        let max = extremes
            .iter()
            .copied()
            .filter(|x| !x.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);
        if min > max {
            return Score::Nan;
        }
        Self::from_bounds(value, min.min(value), max.max(value))
    }

    /// Is this the undefined score?
    pub fn is_nan(&self) -> bool {
        matches!(self, Score::Nan)
    }

    /// Point estimate (NaN for undefined scores)
    pub fn value(&self) -> f64 {
        match self {
            Score::Finite { value, .. } => *value,
            Score::Nan => f64::NAN,
        }
    }

    /// Left uncertainty (`+∞` for undefined scores)
    pub fn left_unc(&self) -> f64 {
        match self {
            Score::Finite { left_unc, .. } => *left_unc,
            Score::Nan => f64::INFINITY,
        }
    }

    /// Right uncertainty (`+∞` for undefined scores)
    pub fn right_unc(&self) -> f64 {
        match self {
            Score::Finite { right_unc, .. } => *right_unc,
            Score::Nan => f64::INFINITY,
        }
    }

    /// Lower end of the interval
    pub fn min(&self) -> f64 {
        self.value() - self.left_unc()
    }

    /// Upper end of the interval
    pub fn max(&self) -> f64 {
        self.value() + self.right_unc()
    }

    /// `(value, left_unc, right_unc)`
    pub fn to_triplet(&self) -> (f64, f64, f64) {
        (self.value(), self.left_unc(), self.right_unc())
    }

    /// Mean of the two uncertainties
    pub fn average_uncertainty(&self) -> f64 {
        (self.left_unc() + self.right_unc()) / 2.0
    }

    /// Does the interval contain `x`?
    pub fn contains(&self, x: f64) -> bool {
        !self.is_nan() && self.min() <= x && x <= self.max()
    }

    /// Absolute value
    ///
    /// When the interval straddles zero, the left uncertainty collapses to
    /// zero and the right one reaches the farthest endpoint.
    pub fn abs(&self) -> Self {
        match *self {
            Score::Nan => Score::Nan,
            Score::Finite {
                value,
                left_unc,
                right_unc,
            } => {
                if self.contains(0.0) {
                    let abs_value = value.abs();
                    let far = self.min().abs().max(self.max());
                    Score::Finite {
                        value: abs_value,
                        left_unc: 0.0,
                        right_unc: (far - abs_value).max(0.0),
                    }
                } else if value > 0.0 {
                    *self
                } else {
                    Score::Finite {
                        value: -value,
                        left_unc: right_unc,
                        right_unc: left_unc,
                    }
                }
            }
        }
    }

    /// Overlap-permissive `≤`: some point of `self` is below some point of `other`
    pub fn loosely_le(&self, other: &Score) -> bool {
        self.min() <= other.max()
    }

    /// Overlap-permissive `≥`
    pub fn loosely_ge(&self, other: &Score) -> bool {
        self.max() >= other.min()
    }
}

/// `a < b` holds iff the interval of `a` lies strictly below that of `b`.
/// Overlapping distinct scores are incomparable.
impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        if self.max() < other.min() {
            Some(Ordering::Less)
        } else if self.min() > other.max() {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Nan => write!(f, "NaN"),
            Score::Finite {
                value,
                left_unc,
                right_unc,
            } => write!(f, "{} ± [-{}, +{}]", value, left_unc, right_unc),
        }
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Score::certain(value)
    }
}

impl Neg for Score {
    type Output = Score;

    fn neg(self) -> Score {
        match self {
            Score::Nan => Score::Nan,
            Score::Finite {
                value,
                left_unc,
                right_unc,
            } => Score::Finite {
                value: -value,
                left_unc: right_unc,
                right_unc: left_unc,
            },
        }
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        if self.is_nan() || rhs.is_nan() {
            return Score::Nan;
        }
        let value = self.value() + rhs.value();
        if value.is_nan() {
            return Score::Nan;
        }
        Score::Finite {
            value,
            left_unc: self.left_unc() + rhs.left_unc(),
            right_unc: self.right_unc() + rhs.right_unc(),
        }
    }
}

impl Sub for Score {
    type Output = Score;

    fn sub(self, rhs: Score) -> Score {
        self + (-rhs)
    }
}

impl Mul for Score {
    type Output = Score;

    fn mul(self, rhs: Score) -> Score {
        if self.is_nan() || rhs.is_nan() {
            return Score::Nan;
        }
        let value = self.value() * rhs.value();
        Score::from_extremes(
            value,
            [
                self.min() * rhs.min(),
                self.min() * rhs.max(),
                self.max() * rhs.min(),
                self.max() * rhs.max(),
            ],
        )
    }
}

impl Div for Score {
    type Output = Score;

    fn div(self, rhs: Score) -> Score {
        if self.is_nan() || rhs.is_nan() || rhs.contains(0.0) {
            return Score::Nan;
        }
        let value = self.value() / rhs.value();
        Score::from_extremes(
            value,
            [
                self.min() / rhs.min(),
                self.min() / rhs.max(),
                self.max() / rhs.min(),
                self.max() / rhs.max(),
            ],
        )
    }
}

macro_rules! impl_scalar_op {
    ($trait:ident, $method:ident) => {
        impl $trait<f64> for Score {
            type Output = Score;

            fn $method(self, rhs: f64) -> Score {
                self.$method(Score::certain(rhs))
            }
        }

        impl $trait<Score> for f64 {
            type Output = Score;

            fn $method(self, rhs: Score) -> Score {
                Score::certain(self).$method(rhs)
            }
        }
    };
}

impl_scalar_op!(Add, add);
impl_scalar_op!(Sub, sub);
impl_scalar_op!(Mul, mul);
impl_scalar_op!(Div, div);

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: f64, l: f64, r: f64) -> Score {
        Score::new(v, l, r).unwrap()
    }

    #[test]
    fn test_nan_is_canonical() {
        let nan = Score::new(f64::NAN, 0.0, 0.0).unwrap();
        assert!(nan.is_nan());
        assert_eq!(nan, Score::Nan);
        assert!(nan.left_unc().is_infinite());
        assert!(nan.right_unc().is_infinite());
        assert!(nan.value().is_nan());
    }

    #[test]
    fn test_negative_uncertainty_rejected() {
        assert!(matches!(
            Score::new(1.0, -0.1, 0.0),
            Err(ScoreError::NegativeUncertainty { .. })
        ));
        assert!(Score::new(1.0, 0.0, -1.0).is_err());
        assert!(Score::new(1.0, f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_min_max() {
        let a = s(2.0, 0.5, 1.0);
        assert_eq!(a.min(), 1.5);
        assert_eq!(a.max(), 3.0);
        assert!(a.contains(1.5));
        assert!(a.contains(3.0));
        assert!(!a.contains(3.1));
    }

    #[test]
    fn test_add_sub() {
        let a = s(2.0, 0.5, 1.0);
        let b = s(1.0, 0.2, 0.3);

        let sum = a + b;
        assert_eq!(sum.value(), 3.0);
        assert!((sum.left_unc() - 0.7).abs() < 1e-12);
        assert!((sum.right_unc() - 1.3).abs() < 1e-12);

        let diff = a - b;
        assert_eq!(diff.value(), 1.0);
        assert!((diff.left_unc() - 0.8).abs() < 1e-12);
        assert!((diff.right_unc() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_neg_swaps_uncertainties() {
        let a = s(2.0, 0.5, 1.0);
        assert_eq!(-a, s(-2.0, 1.0, 0.5));
        assert_eq!(-a, -1.0 * a);
    }

    #[test]
    fn test_mul_corners() {
        let a = s(2.0, 1.0, 1.0);
        let b = s(3.0, 1.0, 1.0);
        let p = a * b;
        assert_eq!(p.value(), 6.0);
        assert_eq!(p.min(), 2.0);
        assert_eq!(p.max(), 12.0);
    }

    #[test]
    fn test_div_by_interval_containing_zero() {
        let a = s(2.0, 1.0, 1.0);
        let b = s(0.5, 1.0, 1.0);
        assert!((a / b).is_nan());
        assert!((a / 0.0).is_nan());
    }

    #[test]
    fn test_div() {
        let a = s(4.0, 2.0, 2.0);
        let b = s(2.0, 0.0, 0.0);
        let q = a / b;
        assert_eq!(q.value(), 2.0);
        assert_eq!(q.min(), 1.0);
        assert_eq!(q.max(), 3.0);
    }

    #[test]
    fn test_abs() {
        let pos = s(2.0, 0.5, 1.0);
        assert_eq!(pos.abs(), pos);

        let neg = s(-2.0, 0.5, 1.0);
        assert_eq!(neg.abs(), s(2.0, 1.0, 0.5));

        let straddle = s(-1.0, 2.0, 1.5);
        let abs = straddle.abs();
        assert_eq!(abs.value(), 1.0);
        assert_eq!(abs.left_unc(), 0.0);
        assert_eq!(abs.max(), 3.0);
    }

    #[test]
    fn test_strict_ordering() {
        let a = s(0.0, 1.0, 1.0);
        let b = s(3.0, 1.0, 1.0);
        let c = s(1.5, 1.0, 1.0);

        assert!(a < b);
        assert!(b > a);
        assert!(!(a < c));
        assert!(!(c < a));
        assert!(a.loosely_le(&c));
        assert!(c.loosely_ge(&a));
    }

    #[test]
    fn test_nan_propagates() {
        let a = s(1.0, 0.0, 0.0);
        assert!((a + Score::Nan).is_nan());
        assert!((Score::Nan * a).is_nan());
        assert!((-Score::Nan).is_nan());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Score::Nan), "NaN");
        assert_eq!(format!("{}", s(1.0, 0.5, 2.0)), "1 ± [-0.5, +2]");
    }
}
