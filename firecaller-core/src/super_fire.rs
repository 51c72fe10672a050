//! Super-FIREs: domains of contiguous FIRE bins.
//!
//! Within one sample and one chromosome, FIRE bins are merged greedily into
//! segments whose cumulative score is the sum of the bins' `-ln(p)`. Only
//! segments at or above a knee-point cutoff are kept. The cutoff is found on
//! the curve of sorted cumulative scores: ranks and scores are scaled to
//! [0, 1], the curve is rotated by 45 degrees, and the point with the lowest
//! rotated y-coordinate gives the cutoff.
use log::{debug, info};
use polars::frame::DataFrame;
use polars::prelude::{NamedFrom, Series};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::f64::consts::{LN_10, SQRT_2};

use crate::bins::Bin;
use crate::significance::FireTable;

#[derive(Debug, Clone, PartialEq)]
pub struct SuperFire {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    /// Sum of `-ln(p)` over the merged bins.
    pub cum_score: f64,
}

impl SuperFire {
    /// Significance of the domain on the `-log10(p)` scale.
    pub fn neg_log10_p(&self) -> f64 {
        self.cum_score / LN_10
    }
}

/// Merge bins, given in genomic order on one chromosome, into segments.
/// A bin extends the current segment when its start is at most `res` past the
/// segment's end.
pub fn merge_segments<'a, I>(bins: I, res: u64) -> Vec<SuperFire>
where
    I: IntoIterator<Item = (&'a Bin, f64)>,
{
    let mut segments: Vec<SuperFire> = Vec::new();
    for (bin, score) in bins {
        match segments.last_mut() {
            Some(seg) if seg.chrom == bin.chrom && bin.start <= seg.end + res => {
                seg.end = seg.end.max(bin.end);
                seg.cum_score += score;
            }
            _ => segments.push(SuperFire {
                chrom: bin.chrom.clone(),
                start: bin.start,
                end: bin.end,
                cum_score: score,
            }),
        }
    }
    segments
}

/// Rotate a point by 45 degrees clockwise.
fn rotate45(x: f64, y: f64) -> (f64, f64) {
    ((x + y) / SQRT_2, (y - x) / SQRT_2)
}

/// Knee-point cutoff of a set of segment scores.
///
/// Returns `None` for an empty set. A single score is its own cutoff, so a
/// lone segment is always retained. When the maximum score is not positive
/// the scaled scores are all taken as zero, which places the knee at the
/// highest rank.
pub fn knee_cutoff(scores: &[f64]) -> Option<f64> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let k = sorted.len();
    let max = *sorted.last()?;
    if k == 1 {
        return Some(max);
    }
    let mut best = (f64::INFINITY, sorted[k - 1]);
    sorted.iter().enumerate().for_each(|(i, s)| {
        let x = (i + 1) as f64 / k as f64;
        let y = if max > 0.0 { s / max } else { 0.0 };
        let (_, y_rot) = rotate45(x, y);
        if y_rot < best.0 {
            best = (y_rot, *s);
        }
    });
    Some(best.1)
}

/// Super-FIREs of one sample on one chromosome.
pub fn call_chrom_super_fires(table: &FireTable, sample: usize, chrom: &str) -> Vec<SuperFire> {
    let selected = table.sample_rows(sample, chrom)
        .filter(|(_, _, ind)| *ind == 1)
        .map(|(bin, p, _)| (bin, p));
    let segments = merge_segments(selected, table.resolution);
    let scores: Vec<f64> = segments.iter().map(|x| x.cum_score).collect();
    match knee_cutoff(&scores) {
        None => {
            debug!("sample '{}': no FIRE on {}", table.samples[sample], chrom);
            Vec::new()
        }
        Some(cutoff) => {
            if segments.len() == 1 {
                debug!("sample '{}': single FIRE segment on {} retained", table.samples[sample], chrom);
            }
            segments.into_iter().filter(|x| x.cum_score >= cutoff).collect()
        }
    }
}

/// Super-FIREs of every sample over the given chromosomes, in sample order.
pub fn call_super_fires(table: &FireTable, chroms: &[String]) -> Vec<(String, Vec<SuperFire>)> {
    info!("Calling super-FIREs...");
    (0..table.num_samples()).into_par_iter().map(|k| {
        let result: Vec<SuperFire> = chroms.iter()
            .flat_map(|chrom| call_chrom_super_fires(table, k, chrom))
            .collect();
        info!("sample '{}': {} super-FIREs", table.samples[k], result.len());
        (table.samples[k].clone(), result)
    }).collect()
}

/// Convert super-FIREs to a data frame with columns `chr`, `start`, `end`
/// and `neg_log10_p`.
pub fn super_fires_to_dataframe(super_fires: &[SuperFire]) -> anyhow::Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("chr", super_fires.iter().map(|x| x.chrom.as_str()).collect::<Vec<_>>()),
        Series::new("start", super_fires.iter().map(|x| x.start).collect::<Vec<_>>()),
        Series::new("end", super_fires.iter().map(|x| x.end).collect::<Vec<_>>()),
        Series::new("neg_log10_p", super_fires.iter().map(|x| x.neg_log10_p()).collect::<Vec<_>>()),
    ])?;
    Ok(df)
}
