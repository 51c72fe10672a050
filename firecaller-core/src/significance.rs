//! Per-bin FIRE calls under a per-sample Gaussian null.
use anyhow::{ensure, Result};
use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::frame::DataFrame;
use polars::prelude::{NamedFrom, Series};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use statrs::function::erf::erfc;
use statrs::statistics::Statistics;
use std::f64::consts::{PI, SQRT_2};

use crate::bins::Bin;
use crate::filter::ScoreTable;
use crate::utils::round_to;

/// Final per-bin table: normalized score, `-ln(p)` and FIRE indicator of
/// every sample. All matrices are bins-by-samples.
#[derive(Debug, Clone, PartialEq)]
pub struct FireTable {
    pub bins: Vec<Bin>,
    pub samples: Vec<String>,
    pub resolution: u64,
    pub scores: Array2<f64>,
    pub neg_ln_p: Array2<f64>,
    pub indicators: Array2<u8>,
}

impl FireTable {
    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Rows of one sample on one chromosome as (bin, `-ln(p)`, indicator).
    pub fn sample_rows<'a>(
        &'a self,
        sample: usize,
        chrom: &'a str,
    ) -> impl Iterator<Item = (&'a Bin, f64, u8)> + 'a {
        self.bins.iter()
            .zip(self.neg_ln_p.index_axis(Axis(1), sample))
            .zip(self.indicators.index_axis(Axis(1), sample))
            .filter(move |((b, _), _)| b.chrom == chrom)
            .map(|((b, p), i)| (b, *p, *i))
    }

    /// Convert to a data frame with columns `chr`, `start`, `end` followed by
    /// `<sample>_norm_cis`, `<sample>_neg_ln_pval` and `<sample>_indicator`
    /// for every sample.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns = vec![
            Series::new("chr", self.bins.iter().map(|b| b.chrom.as_str()).collect::<Vec<_>>()),
            Series::new("start", self.bins.iter().map(|b| b.start).collect::<Vec<_>>()),
            Series::new("end", self.bins.iter().map(|b| b.end).collect::<Vec<_>>()),
        ];
        self.samples.iter().enumerate().for_each(|(k, sample)| {
            columns.push(Series::new(&format!("{}_norm_cis", sample), self.scores.column(k).to_vec()));
            columns.push(Series::new(&format!("{}_neg_ln_pval", sample), self.neg_ln_p.column(k).to_vec()));
            columns.push(Series::new(
                &format!("{}_indicator", sample),
                self.indicators.column(k).iter().map(|x| *x as i32).collect::<Vec<_>>(),
            ));
        });
        Ok(DataFrame::new(columns)?)
    }
}

/// `-ln(alpha)`: bins whose reported `-ln(p)` exceeds this value are FIREs.
pub fn significance_threshold(alpha: f64) -> f64 {
    -alpha.ln()
}

/// Natural log of the standard normal upper tail probability.
fn ln_upper_tail(z: f64) -> f64 {
    let p = 0.5 * erfc(z / SQRT_2);
    if p > 0.0 {
        p.ln()
    } else {
        // Asymptotic expansion once the tail underflows.
        -0.5 * z * z - z.ln() - 0.5 * (2.0 * PI).ln()
    }
}

/// `-ln(p)` of every score under a Gaussian with the sample mean and
/// standard deviation of the column, rounded to 4 decimals.
///
/// A column with zero (or undefined) variance carries no signal: every bin
/// gets z = 0, i.e. `-ln(p) = ln 2`.
pub fn neg_ln_pvalues(scores: ArrayView1<'_, f64>) -> (Array1<f64>, bool) {
    let mean = scores.iter().mean();
    let sd = scores.iter().std_dev();
    let degenerate = !(sd.is_finite() && sd > 0.0);
    let p = scores.iter().map(|x| {
        let z = if degenerate { 0.0 } else { (x - mean) / sd };
        round_to(-ln_upper_tail(z), 4)
    }).collect();
    (p, degenerate)
}

/// Call FIREs on normalized scores.
pub fn call_fires(table: &ScoreTable, resolution: u64, alpha: f64) -> Result<FireTable> {
    ensure!(alpha > 0.0 && alpha < 1.0, "the significance level must be in (0, 1), got {}", alpha);
    info!("Calling FIREs...");
    let threshold = significance_threshold(alpha);

    let columns: Vec<(Array1<f64>, Array1<u8>)> = (0..table.num_samples()).into_par_iter().map(|k| {
        let (p, degenerate) = neg_ln_pvalues(table.scores.column(k));
        if degenerate {
            warn!("sample '{}' has zero score variance; no FIRE is called", table.samples[k]);
        }
        let indicator = p.mapv(|x| (x > threshold) as u8);
        info!(
            "sample '{}': {} FIREs out of {} bins",
            table.samples[k], indicator.iter().filter(|x| **x == 1).count(), indicator.len(),
        );
        (p, indicator)
    }).collect();

    let (n, m) = table.scores.dim();
    let mut neg_ln_p = Array2::zeros((n, m));
    let mut indicators = Array2::zeros((n, m));
    columns.into_iter().enumerate().for_each(|(k, (p, ind))| {
        neg_ln_p.column_mut(k).assign(&p);
        indicators.column_mut(k).assign(&ind);
    });
    Ok(FireTable {
        bins: table.bins.clone(),
        samples: table.samples.clone(),
        resolution,
        scores: table.scores.clone(),
        neg_ln_p,
        indicators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn table(scores: Array2<f64>) -> ScoreTable {
        let bins = (0..scores.nrows() as u64).map(|i| Bin::new("chr1", i * 10, (i + 1) * 10, 1.0, 1.0, 1.0)).collect();
        let samples = (0..scores.ncols()).map(|i| format!("s{}", i)).collect();
        ScoreTable::new(bins, samples, scores).unwrap()
    }

    #[test]
    fn test_ln_upper_tail() {
        assert!((ln_upper_tail(0.0) - 0.5f64.ln()).abs() < 1e-12);
        assert!((ln_upper_tail(1.6448536269514722) - 0.05f64.ln()).abs() < 1e-9);
        let far = ln_upper_tail(50.0);
        assert!(far.is_finite() && far < -1000.0);
    }

    #[test]
    fn test_neg_ln_pvalues() {
        let (p, degenerate) = neg_ln_pvalues(array![1.0, 2.0, 3.0].view());
        assert!(!degenerate);
        // z = -1, 0, 1
        assert_eq!(p.to_vec(), vec![0.1728, 0.6931, 1.841]);

        let (p, degenerate) = neg_ln_pvalues(array![2.0, 2.0, 2.0].view());
        assert!(degenerate);
        assert_eq!(p.to_vec(), vec![0.6931; 3]);
    }

    #[test]
    fn test_threshold_boundary() {
        // The last two scores sit at -ln(p) = 2.9957006 and 2.9957997, which
        // round to 2.9957 and 2.9958 around -ln(0.05) = 2.9957323.
        let mut scores: Vec<f64> = (0..38).map(|i| (i % 5) as f64).collect();
        scores.extend([4.515203, 4.515275]);
        let n = scores.len();
        let fires = call_fires(&table(Array2::from_shape_vec((n, 1), scores).unwrap()), 10, 0.05).unwrap();
        assert_eq!(fires.neg_ln_p[[n - 2, 0]], 2.9957);
        assert_eq!(fires.neg_ln_p[[n - 1, 0]], 2.9958);
        assert_eq!(fires.indicators[[n - 2, 0]], 0);
        assert_eq!(fires.indicators[[n - 1, 0]], 1);
        assert_eq!(fires.indicators.iter().filter(|x| **x == 1).count(), 1);
    }

    #[test]
    fn test_call_fires() {
        let mut scores = Array2::from_elem((30, 2), 1.0);
        scores[[3, 0]] = 10.0;
        scores[[4, 0]] = 12.0;
        scores[[10, 1]] = 5.0;
        scores[[0, 1]] = 0.5;
        let fires = call_fires(&table(scores), 10, 0.05).unwrap();
        let called = |k: usize| fires.indicators.column(k).iter().enumerate()
            .filter(|(_, x)| **x == 1).map(|(i, _)| i).collect::<Vec<_>>();
        assert_eq!(called(0), vec![3, 4]);
        assert_eq!(called(1), vec![10]);
        let threshold = significance_threshold(0.05);
        fires.neg_ln_p.iter().zip(fires.indicators.iter())
            .for_each(|(p, i)| assert_eq!(*i == 1, *p > threshold));

        let df = fires.to_dataframe().unwrap();
        assert_eq!(df.shape(), (30, 9));
        assert_eq!(
            df.get_column_names(),
            vec!["chr", "start", "end", "s0_norm_cis", "s0_neg_ln_pval", "s0_indicator",
                 "s1_norm_cis", "s1_neg_ln_pval", "s1_indicator"],
        );
        assert_eq!(fires.sample_rows(1, "chr1").filter(|x| x.2 == 1).count(), 1);
    }

    #[test]
    fn test_invalid_alpha() {
        assert!(call_fires(&table(Array2::from_elem((3, 1), 1.0)), 10, 1.5).is_err());
    }
}
