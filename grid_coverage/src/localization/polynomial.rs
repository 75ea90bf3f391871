//! Polynomial approximation of a localization grid.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Matrix2};

use crate::error::{CoverageError, Result};
use crate::fit::parametric_ls;
use crate::geometry::Point;
use crate::transform::{packed_len, AffineTransform2D, MathTransform, MathTransform2D};

/// Highest supported polynomial degree.
pub const MAX_DEGREE: usize = 3;

/// Exponents `(i, j)` of the monomials `x^i * y^j` of total degree up to
/// `degree`, ordered by total degree.
fn exponents(degree: usize) -> Vec<(i32, i32)> {
    let mut terms = Vec::new();
    for total in 0..=degree as i32 {
        for j in 0..=total {
            terms.push((total - j, j));
        }
    }
    terms
}

/// Grid-to-world transform `x' = Σ a_ij col^i row^j`, `y' = Σ b_ij col^i row^j`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialTransform2D {
    degree: usize,
    x_coeffs: Vec<f64>,
    y_coeffs: Vec<f64>,
    rms: f64,
}

impl PolynomialTransform2D {
    /// Least-squares fit of a polynomial of `degree` mapping `grid` points to
    /// `world` points. Pairs containing NaN are skipped.
    pub fn fit(degree: usize, grid: &[Point], world: &[Point]) -> Result<Self> {
        if degree == 0 || degree > MAX_DEGREE {
            return Err(CoverageError::IllegalArgument(format!(
                "polynomial degree must be within 1..={MAX_DEGREE}, got {degree}"
            )));
        }
        if grid.len() != world.len() {
            return Err(CoverageError::mismatch(grid.len(), world.len()));
        }
        let terms = exponents(degree);
        let samples: Vec<(Point, Point)> = grid
            .iter()
            .zip(world)
            .filter(|(g, w)| !g.is_nan() && !w.is_nan())
            .map(|(g, w)| (*g, *w))
            .collect();
        if samples.len() < terms.len() {
            return Err(CoverageError::IllegalArgument(format!(
                "{} valid points cannot determine {} coefficients",
                samples.len(),
                terms.len()
            )));
        }
        let a = DMatrix::from_fn(samples.len(), terms.len(), |r, c| {
            let (g, _) = samples[r];
            let (i, j) = terms[c];
            g.x.powi(i) * g.y.powi(j)
        });
        let lx = DVector::from_iterator(samples.len(), samples.iter().map(|(_, w)| w.x));
        let ly = DVector::from_iterator(samples.len(), samples.iter().map(|(_, w)| w.y));
        let fx = parametric_ls(&a, &lx, None).ok_or(CoverageError::Noninvertible)?;
        let fy = parametric_ls(&a, &ly, None).ok_or(CoverageError::Noninvertible)?;
        let rms = (0.5 * (fx.rms().powi(2) + fy.rms().powi(2))).sqrt();
        log::debug!("fitted degree {} polynomial, rms residual {}", degree, rms);
        Ok(Self {
            degree,
            x_coeffs: fx.parameters.iter().copied().collect(),
            y_coeffs: fy.parameters.iter().copied().collect(),
            rms,
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Root mean square world distance between the fit and the grid nodes.
    pub fn rms(&self) -> f64 {
        self.rms
    }

    pub fn x_coefficients(&self) -> &[f64] {
        &self.x_coeffs
    }

    pub fn y_coefficients(&self) -> &[f64] {
        &self.y_coeffs
    }

    /// The affine part, exact for degree 1.
    pub fn to_affine(&self) -> AffineTransform2D {
        let (a, b) = (&self.x_coeffs, &self.y_coeffs);
        AffineTransform2D::new(a[1], b[1], a[2], b[2], a[0], b[0])
    }

    fn evaluate(&self, p: Point) -> Point {
        let mut x = 0.0;
        let mut y = 0.0;
        for (k, (i, j)) in exponents(self.degree).into_iter().enumerate() {
            let m = p.x.powi(i) * p.y.powi(j);
            x += self.x_coeffs[k] * m;
            y += self.y_coeffs[k] * m;
        }
        Point::new(x, y)
    }

    fn jacobian(&self, p: Point) -> Matrix2<f64> {
        let mut j = Matrix2::zeros();
        for (k, (ei, ej)) in exponents(self.degree).into_iter().enumerate() {
            let d_col = if ei > 0 {
                ei as f64 * p.x.powi(ei - 1) * p.y.powi(ej)
            } else {
                0.0
            };
            let d_row = if ej > 0 {
                ej as f64 * p.x.powi(ei) * p.y.powi(ej - 1)
            } else {
                0.0
            };
            j[(0, 0)] += self.x_coeffs[k] * d_col;
            j[(0, 1)] += self.x_coeffs[k] * d_row;
            j[(1, 0)] += self.y_coeffs[k] * d_col;
            j[(1, 1)] += self.y_coeffs[k] * d_row;
        }
        j
    }
}

impl MathTransform for PolynomialTransform2D {
    fn source_dimensions(&self) -> usize {
        2
    }

    fn target_dimensions(&self) -> usize {
        2
    }

    fn transform(&self, src: &[f64], dst: &mut [f64]) -> Result<()> {
        packed_len(src, dst, 2, 2)?;
        for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
            let q = self.evaluate(Point::new(s[0], s[1]));
            d[0] = q.x;
            d[1] = q.y;
        }
        Ok(())
    }

    fn derivative(&self, point: Option<&[f64]>) -> Result<DMatrix<f64>> {
        let p = match point {
            Some(&[x, y]) => Point::new(x, y),
            Some(other) => return Err(CoverageError::mismatch(2, other.len())),
            None if self.degree == 1 => Point::new(0.0, 0.0),
            None => {
                return Err(CoverageError::IllegalArgument(
                    "derivative of a non-linear polynomial depends on the position".into(),
                ))
            }
        };
        let j = self.jacobian(p);
        Ok(DMatrix::from_fn(2, 2, |r, c| j[(r, c)]))
    }

    /// Only degree 1 polynomials have a closed-form inverse.
    fn inverse(&self) -> Result<Arc<dyn MathTransform>> {
        if self.degree != 1 {
            return Err(CoverageError::Noninvertible);
        }
        Ok(Arc::new(self.to_affine().invert()?))
    }

    fn into_2d(self: Arc<Self>) -> Option<Arc<dyn MathTransform2D>> {
        Some(self)
    }
}

impl MathTransform2D for PolynomialTransform2D {
    fn transform_point(&self, p: Point) -> Result<Point> {
        Ok(self.evaluate(p))
    }

    fn derivative_at(&self, p: Point) -> Result<Matrix2<f64>> {
        Ok(self.jacobian(p))
    }

    fn inverse_2d(&self) -> Result<Arc<dyn MathTransform2D>> {
        if self.degree != 1 {
            return Err(CoverageError::Noninvertible);
        }
        Ok(Arc::new(self.to_affine().invert()?))
    }
}
