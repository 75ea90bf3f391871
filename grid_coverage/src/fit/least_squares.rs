// Least squares utilities for polynomial grid fitting.
// Normal equations are solved by LU decomposition with an SVD pseudoinverse
// fallback for rank-deficient systems.

use nalgebra::{DMatrix, DVector, SVD};

/// Result of a least squares computation.
#[derive(Debug)]
pub struct LSResult {
    pub parameters: DVector<f64>,
    pub residuals: DVector<f64>,
}

impl LSResult {
    /// Root mean square of the residuals.
    pub fn rms(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        (self.residuals.norm_squared() / self.residuals.len() as f64).sqrt()
    }
}

fn pseudoinverse(m: &DMatrix<f64>, tol: f64) -> Option<DMatrix<f64>> {
    let svd = SVD::new(m.clone(), true, true);
    let mut s_inv = svd.singular_values.clone();
    for val in s_inv.iter_mut() {
        if *val > tol {
            *val = 1.0 / *val;
        } else {
            *val = 0.0;
        }
    }
    let u = svd.u?;
    let vt = svd.v_t?;
    Some(vt.transpose() * DMatrix::from_diagonal(&s_inv) * u.transpose())
}

/// Performs a parametric least squares adjustment `a * x ≈ l`.
///
/// `a` - design matrix relating parameters to observations
/// `l` - observation vector
/// `w` - optional weight matrix; identity when `None`
pub fn parametric_ls(a: &DMatrix<f64>, l: &DVector<f64>, w: Option<&DMatrix<f64>>) -> Option<LSResult> {
    if a.nrows() != l.len() || a.nrows() < a.ncols() {
        return None;
    }
    let at = a.transpose();
    let (n, u) = match w {
        Some(w) => (&at * w * a, &at * w * l),
        None => (&at * a, &at * l),
    };
    let sol = match n.clone().lu().solve(&u) {
        Some(sol) => sol,
        None => {
            log::debug!("normal matrix is singular, falling back to pseudoinverse");
            pseudoinverse(&n, 1e-12)? * u
        }
    };
    if sol.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let v = a * &sol - l;
    Some(LSResult {
        parameters: sol,
        residuals: v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parametric_basic() {
        // Solve x1 + x2 = 3, x1 - x2 = 1
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, -1.0]);
        let l = DVector::from_vec(vec![3.0, 1.0]);
        let res = parametric_ls(&a, &l, None).unwrap();
        assert!((res.parameters[0] - 2.0).abs() < 1e-9);
        assert!((res.parameters[1] - 1.0).abs() < 1e-9);
        assert!(res.rms() < 1e-9);
    }

    #[test]
    fn overdetermined_line() {
        // y = 1 + 2x observed with symmetric noise
        let a = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let l = DVector::from_vec(vec![1.1, 2.9, 5.1, 6.9]);
        let res = parametric_ls(&a, &l, None).unwrap();
        assert!((res.parameters[0] - 1.06).abs() < 1e-9);
        assert!((res.parameters[1] - 1.96).abs() < 1e-9);
    }

    #[test]
    fn underdetermined_is_rejected() {
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let l = DVector::from_vec(vec![1.0]);
        assert!(parametric_ls(&a, &l, None).is_none());
    }
}
