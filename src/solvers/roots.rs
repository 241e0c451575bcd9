//! One-dimensional root finding
//!
//! - [`brentq`]: Brent's method with automatic bracket expansion, used for
//!   coordinate updates and for the quadratically regularized quantiles
//! - [`dichotomy`]: plain bisection for `f(x) = target` on a fixed interval,
//!   used by the NLL-increase uncertainty evaluator and voting rights

use crate::error::SolverError;

/// Options for [`brentq`]
#[derive(Clone, Copy, Debug)]
pub struct BrentOptions {
    /// Absolute tolerance on the root
    pub xtol: f64,
    /// Relative tolerance on the root
    pub rtol: f64,
    /// Maximum number of Brent iterations
    pub max_iter: usize,
    /// Maximum number of bracket expansions
    pub max_expansions: usize,
}

impl Default for BrentOptions {
    fn default() -> Self {
        Self {
            xtol: 2e-12,
            rtol: 4.0 * f64::EPSILON,
            max_iter: 100,
            max_expansions: 64,
        }
    }
}

impl BrentOptions {
    /// Default options with a custom absolute tolerance
    pub fn with_xtol(xtol: f64) -> Self {
        Self {
            xtol,
            ..Self::default()
        }
    }
}

/// Find a root of a non-decreasing function by Brent's method
///
/// The initial bracket `[lower, upper]` is expanded geometrically until
/// `f(lower) ≤ 0 ≤ f(upper)`, so `f` must eventually become negative on the
/// left and positive on the right.
pub fn brentq<F>(
    mut f: F,
    lower: f64,
    upper: f64,
    options: BrentOptions,
) -> Result<f64, SolverError>
where
    F: FnMut(f64) -> f64,
{
    let (mut a, mut b) = (lower, upper);
    let mut fa = f(a);
    let mut expansions = 0;
    while fa > 0.0 {
        a -= 2.0 * (b - a);
        fa = f(a);
        expansions += 1;
        if expansions > options.max_expansions {
            return Err(SolverError::NoBracket {
                lower: a,
                upper: b,
            });
        }
    }
    let mut fb = f(b);
    while fb < 0.0 {
        b += 2.0 * (b - a);
        fb = f(b);
        expansions += 1;
        if expansions > options.max_expansions {
            return Err(SolverError::NoBracket {
                lower: a,
                upper: b,
            });
        }
    }
    if fa.is_nan() || fb.is_nan() {
        return Err(SolverError::NonFinite(format!(
            "root function at bracket [{}, {}]",
            a, b
        )));
    }
    brent_core(f, a, b, fa, fb, options)
}

/// Brent iterations on a bracket with a sign change
fn brent_core<F>(
    mut f: F,
    a: f64,
    b: f64,
    fa: f64,
    fb: f64,
    options: BrentOptions,
) -> Result<f64, SolverError>
where
    F: FnMut(f64) -> f64,
{
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if fa * fb > 0.0 {
        return Err(SolverError::NoBracket { lower: a, upper: b });
    }

    let (mut xpre, mut xcur) = (a, b);
    let (mut fpre, mut fcur) = (fa, fb);
    let (mut xblk, mut fblk) = (0.0, 0.0);
    let (mut spre, mut scur) = (0.0, 0.0);

    for _ in 0..options.max_iter {
        if fpre * fcur < 0.0 {
            xblk = xpre;
            fblk = fpre;
            spre = xcur - xpre;
            scur = spre;
        }
        if fblk.abs() < fcur.abs() {
            xpre = xcur;
            xcur = xblk;
            xblk = xpre;
            fpre = fcur;
            fcur = fblk;
            fblk = fpre;
        }

        let delta = (options.xtol + options.rtol * xcur.abs()) / 2.0;
        let sbis = (xblk - xcur) / 2.0;
        if fcur == 0.0 || sbis.abs() < delta {
            return Ok(xcur);
        }

        if spre.abs() > delta && fcur.abs() < fpre.abs() {
            let stry = if xpre == xblk {
                // interpolate
                -fcur * (xcur - xpre) / (fcur - fpre)
            } else {
                // extrapolate
                let dpre = (fpre - fcur) / (xpre - xcur);
                let dblk = (fblk - fcur) / (xblk - xcur);
                -fcur * (fblk * dblk - fpre * dpre) / (dblk * dpre * (fblk - fpre))
            };
            if 2.0 * stry.abs() < spre.abs().min(3.0 * sbis.abs() - delta) {
                spre = scur;
                scur = stry;
            } else {
                spre = sbis;
                scur = sbis;
            }
        } else {
            spre = sbis;
            scur = sbis;
        }

        xpre = xcur;
        fpre = fcur;
        if scur.abs() > delta {
            xcur += scur;
        } else {
            xcur += if sbis > 0.0 { delta } else { -delta };
        }
        fcur = f(xcur);
        if fcur.is_nan() {
            return Err(SolverError::NonFinite(format!(
                "root function at {}",
                xcur
            )));
        }
    }

    Err(SolverError::MaxIterations {
        iterations: options.max_iter,
        metric: fcur.abs(),
    })
}

/// Solve `f(x) = target` on `[lower, upper]` by bisection
///
/// `f - target` must change sign on the interval; otherwise
/// [`SolverError::NoBracket`] is returned and the caller decides on a
/// fallback. Stops once the interval is narrower than `error`.
pub fn dichotomy<F>(
    mut f: F,
    target: f64,
    lower: f64,
    upper: f64,
    error: f64,
) -> Result<f64, SolverError>
where
    F: FnMut(f64) -> f64,
{
    let (mut lo, mut hi) = (lower, upper);
    let mut f_lo = f(lo) - target;
    let f_hi = f(hi) - target;
    if f_lo.is_nan() || f_hi.is_nan() {
        return Err(SolverError::NonFinite("dichotomy endpoints".to_string()));
    }
    if f_lo == 0.0 {
        return Ok(lo);
    }
    if f_hi == 0.0 {
        return Ok(hi);
    }
    if f_lo * f_hi > 0.0 {
        return Err(SolverError::NoBracket {
            lower: lo,
            upper: hi,
        });
    }

    let max_iter = (((hi - lo) / error).log2().ceil().max(0.0) as usize) + 1;
    for _ in 0..max_iter {
        if hi - lo < error {
            break;
        }
        let mid = (lo + hi) / 2.0;
        let f_mid = f(mid) - target;
        if f_mid == 0.0 {
            return Ok(mid);
        }
        if f_mid * f_lo < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }
    Ok((lo + hi) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brentq_linear() {
        let root = brentq(|x| x - 0.3, -1.0, 1.0, BrentOptions::default()).unwrap();
        assert!((root - 0.3).abs() < 1e-10);
    }

    #[test]
    fn test_brentq_expands_bracket() {
        let root = brentq(|x| x - 50.0, -1.0, 1.0, BrentOptions::default()).unwrap();
        assert!((root - 50.0).abs() < 1e-9);

        let root = brentq(|x| x + 123.0, -1.0, 1.0, BrentOptions::default()).unwrap();
        assert!((root + 123.0).abs() < 1e-9);
    }

    #[test]
    fn test_brentq_nonlinear() {
        let root = brentq(|x: f64| x.powi(3) - 2.0, 0.0, 2.0, BrentOptions::with_xtol(1e-12))
            .unwrap();
        assert!((root - 2f64.cbrt()).abs() < 1e-9);
    }

    #[test]
    fn test_brentq_no_sign_change() {
        let result = brentq(|_| 1.0, -1.0, 1.0, BrentOptions::default());
        assert!(matches!(result, Err(SolverError::NoBracket { .. })));
    }

    #[test]
    fn test_dichotomy() {
        let x = dichotomy(|x| x * x, 4.0, 0.0, 10.0, 1e-9).unwrap();
        assert!((x - 2.0).abs() < 1e-8);

        let x = dichotomy(|x| x * x, 4.0, -10.0, 0.0, 1e-9).unwrap();
        assert!((x + 2.0).abs() < 1e-8);
    }

    #[test]
    fn test_dichotomy_no_root() {
        let result = dichotomy(|x| x, 20.0, 0.0, 10.0, 1e-6);
        assert!(matches!(result, Err(SolverError::NoBracket { .. })));
    }
}
