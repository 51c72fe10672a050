//! Bias and cross-sample normalization of cis-interaction scores.
use anyhow::{ensure, Context, Result};
use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::filter::ScoreTable;
use crate::glm::{predict_with, PoissonGlm};
use crate::utils::round_to;

const COVARIATES: [&str; 3] = ["F", "GC", "M"];

/// HiCNormCis: remove the effect of fragment count, GC content and
/// mappability from every sample independently.
///
/// Each sample's scores are regressed on the three covariates with a Poisson
/// GLM; the normalized score is the observed score divided by the fitted
/// mean, rounded to 4 decimals. Coefficients are rounded to 8 decimals
/// before computing the fitted means.
pub fn hicnorm_cis(table: &ScoreTable, glm: &PoissonGlm) -> Result<ScoreTable> {
    info!("Normalizing cis-interaction scores with HiCNormCis...");
    let covariates = Array2::from_shape_fn((table.num_bins(), 3), |(i, j)| {
        let b = &table.bins[i];
        match j {
            0 => b.f,
            1 => b.gc,
            _ => b.m,
        }
    });

    let columns = (0..table.num_samples()).into_par_iter().map(|k| {
        let sample = &table.samples[k];
        let y = table.scores.column(k);
        let fit = glm.fit(covariates.view(), y)
            .with_context(|| format!("failed to fit the bias model of sample '{}'", sample))?;
        fit.aliased[1..].iter().zip(COVARIATES).filter(|(a, _)| **a).for_each(|(_, name)|
            warn!("sample '{}': covariate {} is constant or collinear and was dropped from the model", sample, name)
        );
        info!(
            "sample '{}': Poisson fit converged in {} iterations, coefficients = {:?}",
            sample, fit.iterations, fit.coefficients,
        );

        let coefficients: Vec<f64> = fit.coefficients.iter().map(|x| round_to(*x, 8)).collect();
        let mu = predict_with(&coefficients, covariates.view());
        normalize_by_expected(y, mu.view())
            .with_context(|| format!("failed to normalize sample '{}'", sample))
    }).collect::<Result<Vec<_>>>()?;

    let mut scores = Array2::zeros(table.scores.dim());
    columns.into_iter().enumerate().for_each(|(k, col)| scores.column_mut(k).assign(&col));
    ScoreTable::new(table.bins.clone(), table.samples.clone(), scores)
}

fn normalize_by_expected(y: ArrayView1<'_, f64>, mu: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    y.iter().zip(mu.iter()).enumerate().map(|(i, (y, m))| {
        ensure!(m.is_finite() && *m > 0.0, "the fitted mean of row {} is {}", i, m);
        Ok(round_to(y / m, 4))
    }).collect()
}

/// Quantile normalization across samples.
///
/// The values of every sample are replaced, rank by rank, by the mean over
/// samples of the sorted values at that rank. Ties are ranked by their
/// row order. Results are rounded to 4 decimals.
pub fn quantile_normalize(table: &ScoreTable) -> Result<ScoreTable> {
    info!("Quantile normalizing {} samples...", table.num_samples());
    let (n, m) = table.scores.dim();
    ensure!(m > 0, "no sample to normalize");

    let orders: Vec<Vec<usize>> = table.scores.axis_iter(Axis(1))
        .map(|col| {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|a, b| col[*a].total_cmp(&col[*b]));
            order
        }).collect();

    let reference: Vec<f64> = (0..n).map(|r| {
        orders.iter().enumerate().map(|(k, order)| table.scores[[order[r], k]]).sum::<f64>() / m as f64
    }).collect();

    let mut scores = Array2::zeros((n, m));
    orders.iter().enumerate().for_each(|(k, order)| {
        order.iter().zip(reference.iter()).for_each(|(i, v)| scores[[*i, k]] = round_to(*v, 4));
    });
    ScoreTable::new(table.bins.clone(), table.samples.clone(), scores)
}
