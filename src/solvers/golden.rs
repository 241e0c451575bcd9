//! Golden-section search for one-dimensional minimization

/// Inverse golden ratio
const INV_PHI: f64 = 0.618_033_988_749_895;

/// Minimize a unimodal function on `[lower, upper]`
///
/// Returns the abscissa of the best point seen once the bracket is narrower
/// than `tolerance` or after `max_iter` shrink steps.
pub fn golden_section_search<F>(
    mut f: F,
    lower: f64,
    upper: f64,
    tolerance: f64,
    max_iter: usize,
) -> f64
where
    F: FnMut(f64) -> f64,
{
    let (mut a, mut b) = (lower, upper);
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..max_iter {
        if (b - a).abs() < tolerance {
            break;
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d);
        }
    }

    if fc < fd {
        c
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_minimum() {
        let x = golden_section_search(|x| (x - 1.5).powi(2), -8.0, 8.0, 1e-9, 200);
        assert!((x - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_minimum_at_boundary() {
        let x = golden_section_search(|x| x, 0.0, 1.0, 1e-9, 200);
        assert!(x < 1e-6);
    }

    #[test]
    fn test_asymmetric_function() {
        let x = golden_section_search(|x: f64| x.exp() - 2.0 * x, -5.0, 5.0, 1e-10, 200);
        assert!((x - 2f64.ln()).abs() < 1e-6);
    }
}
