//! Windowed cis-interaction scores.
//!
//! For every bin `i` of a chromosome the score is the sum of column `i` of the
//! contact matrix over the rows `[i - bin_num, i]` plus the rows
//! `[i, i + bin_num]`, both clipped at the matrix edges. Row `i` belongs to
//! both halves and is therefore counted twice; the diagonal itself is always
//! treated as zero so self-contacts never contribute.
use anyhow::{ensure, Result};
use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::collections::HashMap;

use crate::bins::BinTable;

/// Per-chromosome contact matrices of one sample, keyed by chromosome name.
pub type ContactMatrices = HashMap<String, Array2<f64>>;

/// Compute the windowed cis-interaction score of every bin of a square
/// contact matrix.
pub fn cis_interaction(mat: ArrayView2<'_, f64>, bin_num: usize) -> Result<Array1<f64>> {
    let (nrows, ncols) = mat.dim();
    ensure!(nrows == ncols, "contact matrix is not square: {} x {}", nrows, ncols);
    let n = nrows;
    let score = (0..n).map(|i| {
        let col = mat.column(i);
        let entry = |j: usize| if j == i { 0.0 } else { col[j] };
        let lo = i.saturating_sub(bin_num);
        let hi = (i + bin_num).min(n - 1);
        let upstream: f64 = (lo..=i).map(entry).sum();
        let downstream: f64 = (i..=hi).map(entry).sum();
        upstream + downstream
    }).collect();
    Ok(score)
}

/// Cis-interaction scores of all samples, one column per sample, aligned
/// row-by-row with the bin annotation. Bins without a score are `NaN`.
#[derive(Debug, Clone)]
pub struct CisScores {
    pub(crate) bins: BinTable,
    pub(crate) samples: Vec<String>,
    pub(crate) scores: Array2<f64>,
}

impl CisScores {
    pub fn new(bins: BinTable) -> Self {
        let n = bins.len();
        Self { bins, samples: Vec::new(), scores: Array2::zeros((n, 0)) }
    }

    pub fn bins(&self) -> &BinTable {
        &self.bins
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Scores as a bins-by-samples matrix.
    pub fn scores(&self) -> &Array2<f64> {
        &self.scores
    }

    /// Aggregate the contact matrices of one sample and append the result as
    /// a new column. Chromosomes are processed in parallel.
    ///
    /// A chromosome without a matrix, or whose matrix has fewer rows than the
    /// chromosome has bins, leaves the uncovered bins missing (`NaN`).
    pub fn add_sample(
        &mut self,
        name: &str,
        matrices: &ContactMatrices,
        bin_num: usize,
    ) -> Result<()> {
        ensure!(!self.samples.iter().any(|x| x == name), "duplicated sample name: {}", name);
        info!("Computing cis-interaction scores for sample '{}'...", name);

        let chroms: Vec<_> = self.bins.chroms().map(|x| x.to_string()).collect();
        let per_chrom = chroms.into_par_iter().map(|chrom| {
            let range = self.bins.chrom_range(&chrom).unwrap_or(0..0);
            let n_bins = range.len();
            let mut values = Array1::from_elem(n_bins, f64::NAN);
            match matrices.get(&chrom) {
                None => warn!("sample '{}' has no contact matrix for {}", name, chrom),
                Some(mat) => {
                    let score = cis_interaction(mat.view(), bin_num)
                        .map_err(|e| e.context(format!("sample '{}', {}", name, chrom)))?;
                    if score.len() != n_bins {
                        warn!(
                            "sample '{}': matrix of {} has {} rows but the annotation has {} bins",
                            name, chrom, score.len(), n_bins,
                        );
                    }
                    let k = score.len().min(n_bins);
                    values.slice_mut(ndarray::s![..k]).assign(&score.slice(ndarray::s![..k]));
                }
            }
            Ok((range, values))
        }).collect::<Result<Vec<_>>>()?;

        let mut column = Array1::from_elem(self.bins.len(), f64::NAN);
        per_chrom.into_iter().for_each(|(range, values)| {
            column.slice_mut(ndarray::s![range]).assign(&values);
        });
        self.scores.push_column(column.view())?;
        self.samples.push(name.to_string());
        Ok(())
    }

    /// Number of bins with a missing score in at least one sample.
    pub fn num_missing(&self) -> usize {
        self.scores.axis_iter(Axis(0)).filter(|row| row.iter().any(|x| !x.is_finite())).count()
    }
}
