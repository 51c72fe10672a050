//! Genome-wide removal of bins that cannot be normalized reliably.
//!
//! The row set produced here is shared by every sample.
use anyhow::{ensure, Result};
use itertools::Itertools;
use log::{info, warn};
use ndarray::{Array2, Axis};

use crate::bins::Bin;
use crate::cis::CisScores;
use crate::genome::GenomeBuild;

/// Scores of all samples over a subset of bins. Rows follow `bins`,
/// columns follow `samples`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    pub bins: Vec<Bin>,
    pub samples: Vec<String>,
    pub scores: Array2<f64>,
}

impl ScoreTable {
    pub fn new(bins: Vec<Bin>, samples: Vec<String>, scores: Array2<f64>) -> Result<Self> {
        ensure!(
            scores.dim() == (bins.len(), samples.len()),
            "score matrix of shape {:?} does not match {} bins and {} samples",
            scores.dim(), bins.len(), samples.len(),
        );
        Ok(Self { bins, samples, scores })
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }
}

#[derive(Debug, Clone)]
pub struct BiasFilter {
    pub bin_num: usize,
    pub min_mappability: f64,
    /// Genome build whose blacklist is removed, if any.
    pub blacklist: Option<GenomeBuild>,
}

impl BiasFilter {
    /// Compute the mask of bins to keep, in table order.
    pub fn mask(&self, bins: &[Bin], res: u64) -> Vec<bool> {
        let n = bins.len();
        let mut keep = vec![true; n];

        // Bins with a zero annotation take their neighbourhood with them.
        let flagged: Vec<usize> = bins.iter().positions(|b| b.has_zero_annotation()).collect();
        flagged.iter().for_each(|&i| {
            let lo = i.saturating_sub(self.bin_num);
            let hi = (i + self.bin_num).min(n - 1);
            keep[lo..=hi].iter_mut().for_each(|x| *x = false);
        });
        let n_zero = keep.iter().filter(|x| !**x).count();
        info!(
            "{} bins have a zero annotation; {} bins removed with their +/-{} bin neighbourhood",
            flagged.len(), n_zero, self.bin_num,
        );

        let mut n_low_map = 0;
        bins.iter().zip(keep.iter_mut()).filter(|(_, k)| **k).for_each(|(b, k)| {
            if b.m <= self.min_mappability {
                *k = false;
                n_low_map += 1;
            }
        });
        info!("{} bins removed with mappability <= {}", n_low_map, self.min_mappability);

        if let Some(build) = self.blacklist {
            let mut n_black = 0;
            bins.iter().zip(keep.iter_mut()).filter(|(_, k)| **k).for_each(|(b, k)| {
                if build.is_blacklisted(&b.chrom, b.start, b.end, res) {
                    *k = false;
                    n_black += 1;
                }
            });
            info!("{} bins removed in the {} blacklist region", n_black, build);
        }
        keep
    }

    /// Apply the filter to the cis-interaction scores of all samples.
    /// Bins with a missing score in any sample are removed as well.
    pub fn apply(&self, data: &CisScores) -> Result<ScoreTable> {
        info!("Filtering bins...");
        let bins = data.bins.bins();
        let mut keep = self.mask(bins, data.bins.resolution());

        let n_missing = data.num_missing();
        if n_missing > 0 {
            warn!("{} bins removed because at least one sample has no score for them", n_missing);
        }
        data.scores.axis_iter(Axis(0)).zip(keep.iter_mut()).for_each(|(row, k)| {
            if row.iter().any(|x| !x.is_finite()) {
                *k = false;
            }
        });

        let rows: Vec<usize> = keep.iter().positions(|k| *k).collect();
        ensure!(!rows.is_empty(), "no bin passed the filter");
        info!("{} out of {} bins retained", rows.len(), bins.len());

        let scores = data.scores.select(Axis(0), &rows);
        ScoreTable::new(data.bins.retain_rows(&keep), data.samples.clone(), scores)
    }
}
