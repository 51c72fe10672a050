//! Poisson regression with a log link, fitted by iteratively reweighted
//! least squares.
//!
//! Covariates that are constant, or linear combinations of covariates
//! appearing before them, are aliased: they are left out of the fit and
//! their coefficient is reported as zero. The intercept is always fitted.
use anyhow::{bail, ensure, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

#[derive(Debug, Clone)]
pub struct PoissonGlm {
    pub max_iter: usize,
    /// Convergence threshold on the relative change of the deviance.
    pub tolerance: f64,
    /// Relative residual norm under which a covariate is considered aliased.
    pub alias_tolerance: f64,
}

impl Default for PoissonGlm {
    fn default() -> Self {
        Self { max_iter: 25, tolerance: 1e-8, alias_tolerance: 1e-7 }
    }
}

#[derive(Debug, Clone)]
pub struct PoissonFit {
    /// Intercept followed by one coefficient per covariate.
    pub coefficients: Vec<f64>,
    pub aliased: Vec<bool>,
    pub deviance: f64,
    pub iterations: usize,
}

/// Expected value `exp(b0 + b1 * x1 + ...)` of every row of `x`, with the
/// intercept first in `coefficients`.
pub(crate) fn predict_with(coefficients: &[f64], x: ArrayView2<'_, f64>) -> Array1<f64> {
    x.axis_iter(Axis(0)).map(|row| {
        let eta = coefficients[0] + row.iter().zip(&coefficients[1..]).map(|(a, b)| a * b).sum::<f64>();
        eta.exp()
    }).collect()
}

impl PoissonGlm {
    /// Fit `log E[y] = b0 + x * b`, where `x` holds one covariate per column.
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<PoissonFit> {
        let (n, p) = x.dim();
        ensure!(n == y.len(), "{} responses but {} covariate rows", y.len(), n);
        ensure!(n > 0, "cannot fit a model without observations");
        ensure!(
            y.iter().all(|v| v.is_finite() && *v >= 0.0),
            "the response must be finite and non-negative",
        );
        ensure!(y.iter().any(|v| *v > 0.0), "the response is zero everywhere");

        let design = with_intercept(x);
        let aliased = find_aliased(&design, self.alias_tolerance);
        let active: Vec<usize> = (0..=p).filter(|j| !aliased[*j]).collect();
        let xa = design.select(Axis(1), &active);
        let k = active.len();

        let mut mu: Array1<f64> = y.mapv(|v| v + 0.1);
        let mut eta = mu.mapv(f64::ln);
        let mut dev_old = deviance(y, mu.view());
        let mut beta = DVector::<f64>::zeros(k);
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iter {
            iterations += 1;
            let mut xtwx = DMatrix::<f64>::zeros(k, k);
            let mut xtwz = DVector::<f64>::zeros(k);
            for (i, row) in xa.axis_iter(Axis(0)).enumerate() {
                let w = mu[i];
                let z = eta[i] + (y[i] - mu[i]) / mu[i];
                for a in 0..k {
                    xtwz[a] += w * row[a] * z;
                    for b in 0..=a {
                        xtwx[(a, b)] += w * row[a] * row[b];
                    }
                }
            }
            for a in 0..k {
                for b in 0..a {
                    xtwx[(b, a)] = xtwx[(a, b)];
                }
            }
            beta = match xtwx.cholesky() {
                Some(chol) => chol.solve(&xtwz),
                None => bail!("the weighted design matrix is singular at iteration {}", iterations),
            };

            eta = xa.dot(&Array1::from_iter(beta.iter().copied()));
            mu = eta.mapv(f64::exp);
            if mu.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                bail!("fitted means are degenerate at iteration {}", iterations);
            }
            let dev = deviance(y, mu.view());
            debug!("IRLS iteration {}: deviance = {}", iterations, dev);
            if (dev - dev_old).abs() / (dev.abs() + 0.1) < self.tolerance {
                dev_old = dev;
                converged = true;
                break;
            }
            dev_old = dev;
        }
        if !converged {
            bail!("Poisson regression did not converge in {} iterations", self.max_iter);
        }

        let mut coefficients = vec![0.0; p + 1];
        active.iter().zip(beta.iter()).for_each(|(j, b)| coefficients[*j] = *b);
        Ok(PoissonFit { coefficients, aliased, deviance: dev_old, iterations })
    }
}

fn with_intercept(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let (n, p) = x.dim();
    let mut design = Array2::ones((n, p + 1));
    design.slice_mut(ndarray::s![.., 1..]).assign(&x);
    design
}

/// Gram-Schmidt pass over the design columns in order.
fn find_aliased(design: &Array2<f64>, tol: f64) -> Vec<bool> {
    let mut basis: Vec<Array1<f64>> = Vec::new();
    design.axis_iter(Axis(1)).map(|col| {
        let norm = col.dot(&col).sqrt();
        let mut v = col.to_owned();
        for q in basis.iter() {
            let proj = q.dot(&v);
            v.scaled_add(-proj, q);
        }
        let residual = v.dot(&v).sqrt();
        if norm == 0.0 || !residual.is_finite() || residual <= tol * norm {
            true
        } else {
            basis.push(v / residual);
            false
        }
    }).collect()
}

/// Poisson deviance, with `y * ln(y / mu)` taken as zero when `y` is zero.
fn deviance(y: ArrayView1<'_, f64>, mu: ArrayView1<'_, f64>) -> f64 {
    2.0 * y.iter().zip(mu.iter()).map(|(&y, &m)| {
        let t = if y > 0.0 { y * (y / m).ln() } else { 0.0 };
        t - (y - m)
    }).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_recover_coefficients() {
        // Noise-free responses lie exactly on the model surface.
        let x = Array2::from_shape_fn((50, 2), |(i, j)| {
            if j == 0 { (i % 10) as f64 / 10.0 } else { ((i * 7) % 13) as f64 / 13.0 }
        });
        let truth = [1.5, 0.8, -0.6];
        let y = predict_with(&truth, x.view());
        let fit = PoissonGlm::default().fit(x.view(), y.view()).unwrap();
        fit.coefficients.iter().zip(truth).for_each(|(a, b)| assert!((a - b).abs() < 1e-5, "{} vs {}", a, b));
        assert!(fit.deviance.abs() < 1e-6);
        assert_eq!(fit.aliased, vec![false, false, false]);
    }

    #[test]
    fn test_intercept_only() {
        let y = array![1.0, 2.0, 3.0, 6.0];
        let x = Array2::<f64>::zeros((4, 0));
        let fit = PoissonGlm::default().fit(x.view(), y.view()).unwrap();
        assert!((fit.coefficients[0] - 3.0f64.ln()).abs() < 1e-6);
        predict_with(&fit.coefficients, x.view()).iter().for_each(|m| assert!((m - 3.0).abs() < 1e-5));
    }

    #[test]
    fn test_constant_covariate_is_aliased() {
        let y = array![1.0, 2.0, 3.0, 6.0];
        let x = array![[1.0, 0.1], [1.0, 0.2], [1.0, 0.3], [1.0, 0.4]];
        let fit = PoissonGlm::default().fit(x.view(), y.view()).unwrap();
        assert_eq!(fit.aliased, vec![false, true, false]);
        assert_eq!(fit.coefficients[1], 0.0);
        // The Poisson score equations preserve the total.
        let total: f64 = predict_with(&fit.coefficients, x.view()).sum();
        assert!((total - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_response() {
        let x = Array2::<f64>::zeros((3, 1));
        assert!(PoissonGlm::default().fit(x.view(), array![0.0, 0.0, 0.0].view()).is_err());
        assert!(PoissonGlm::default().fit(x.view(), array![1.0, -1.0, 0.0].view()).is_err());
        assert!(PoissonGlm::default().fit(x.view(), array![1.0, 1.0].view()).is_err());
    }

    #[test]
    fn test_not_converged() {
        let y = array![1.0, 2.0, 3.0, 6.0];
        let x = array![[0.1], [0.2], [0.3], [0.4]];
        let glm = PoissonGlm { max_iter: 1, tolerance: 0.0, ..PoissonGlm::default() };
        let err = glm.fit(x.view(), y.view()).unwrap_err();
        assert!(err.to_string().contains("did not converge in 1 iterations"), "{}", err);
        assert!(PoissonGlm::default().fit(x.view(), y.view()).is_ok());
    }
}
