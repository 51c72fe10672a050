use anyhow::{ensure, Context, Result};
use log::info;
use std::collections::HashSet;

use crate::bins::BinTable;
use crate::cis::{CisScores, ContactMatrices};
use crate::filter::BiasFilter;
use crate::genome::GenomeBuild;
use crate::glm::PoissonGlm;
use crate::normalize::{hicnorm_cis, quantile_normalize};
use crate::significance::{call_fires, FireTable};
use crate::super_fire::{call_super_fires, SuperFire};

#[derive(Debug, Clone)]
pub struct FireOptions {
    /// Size of the cis window in base pairs. The window spans
    /// `upper_cis / resolution` bins on each side.
    pub upper_cis: u64,
    /// Remove bins in the MHC region of the genome build.
    pub rm_mhc: bool,
    /// Significance level of the per-bin test.
    pub alpha: f64,
    /// Bins with a mappability at or below this value are removed.
    pub min_mappability: f64,
    /// Quantile normalize across samples. Has no effect with one sample.
    pub quantile_normalize: bool,
    pub glm: PoissonGlm,
}

impl Default for FireOptions {
    fn default() -> Self {
        Self {
            upper_cis: 200_000,
            rm_mhc: true,
            alpha: 0.05,
            min_mappability: 0.9,
            quantile_normalize: true,
            glm: PoissonGlm::default(),
        }
    }
}

impl FireOptions {
    /// Half-width of the cis window in bins.
    pub fn bin_num(&self, resolution: u64) -> Result<usize> {
        ensure!(resolution > 0, "the bin resolution must be positive");
        let bin_num = self.upper_cis / resolution;
        ensure!(
            bin_num >= 1,
            "the bin resolution ({}) is larger than the cis window ({})", resolution, self.upper_cis,
        );
        Ok(bin_num as usize)
    }

    /// Check the options against the bin resolution and return the
    /// half-width of the cis window. Does not touch contact data.
    pub fn validate(&self, resolution: u64) -> Result<usize> {
        let bin_num = self.bin_num(resolution)?;
        ensure!(
            self.alpha > 0.0 && self.alpha < 1.0,
            "the significance level must be in (0, 1), got {}", self.alpha,
        );
        ensure!(self.min_mappability.is_finite(), "invalid mappability threshold: {}", self.min_mappability);
        Ok(bin_num)
    }
}

/// Per-bin FIRE calls and per-sample super-FIREs.
#[derive(Debug, Clone)]
pub struct FireResult {
    pub fire_table: FireTable,
    pub super_fires: Vec<(String, Vec<SuperFire>)>,
}

fn validate(bins: &BinTable, samples: &[(String, ContactMatrices)], options: &FireOptions) -> Result<usize> {
    ensure!(!bins.is_empty(), "the bin annotation is empty");
    let bin_num = options.validate(bins.resolution())?;
    ensure!(!samples.is_empty(), "no sample provided");

    let mut names = HashSet::new();
    for (name, matrices) in samples {
        ensure!(!name.is_empty(), "sample names must not be empty");
        ensure!(names.insert(name.as_str()), "duplicated sample name: {}", name);
        for (chrom, mat) in matrices {
            let (r, c) = mat.dim();
            ensure!(r == c, "contact matrix of sample '{}' on {} is not square: {} x {}", name, chrom, r, c);
        }
    }
    Ok(bin_num)
}

/// Run the FIRE pipeline: cis-interaction scores, bin filtering, bias
/// normalization, optional quantile normalization, FIRE calling and
/// super-FIRE calling. All inputs are validated before any stage runs.
pub fn fire_caller(
    bins: BinTable,
    samples: &[(String, ContactMatrices)],
    build: GenomeBuild,
    options: &FireOptions,
) -> Result<FireResult> {
    let bin_num = validate(&bins, samples, options).context("invalid input")?;
    let resolution = bins.resolution();
    info!(
        "Running FIRE analysis on {} samples, {} bins at {} bp resolution, window = {} bins, genome = {}",
        samples.len(), bins.len(), resolution, bin_num, build,
    );

    let mut cis = CisScores::new(bins);
    for (name, matrices) in samples {
        cis.add_sample(name, matrices, bin_num)?;
    }

    let filter = BiasFilter {
        bin_num,
        min_mappability: options.min_mappability,
        blacklist: if options.rm_mhc { Some(build) } else { None },
    };
    let mut table = filter.apply(&cis)?;
    table = hicnorm_cis(&table, &options.glm)?;
    if options.quantile_normalize && table.num_samples() > 1 {
        table = quantile_normalize(&table)?;
    }

    let fire_table = call_fires(&table, resolution, options.alpha)?;
    let super_fires = call_super_fires(&fire_table, &build.chromosomes());
    Ok(FireResult { fire_table, super_fires })
}
