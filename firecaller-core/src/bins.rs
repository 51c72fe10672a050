use anyhow::{bail, ensure, Result};
use indexmap::IndexMap;
use std::ops::Range;

/// A fixed-size genomic bin together with its bias covariates:
/// restriction-fragment count (`f`), GC content (`gc`) and mappability (`m`).
/// Positions are 0-based, half-open.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub f: f64,
    pub gc: f64,
    pub m: f64,
}

impl Bin {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64, f: f64, gc: f64, m: f64) -> Self {
        Self { chrom: chrom.into(), start, end, f, gc, m }
    }

    /// True if any of the bias covariates is zero.
    pub fn has_zero_annotation(&self) -> bool {
        self.f == 0.0 || self.gc == 0.0 || self.m == 0.0
    }
}

/// Genome-wide bin annotation, ordered by chromosome and start position.
#[derive(Debug, Clone)]
pub struct BinTable {
    bins: Vec<Bin>,
    chrom_ranges: IndexMap<String, Range<usize>>,
    resolution: u64,
}

impl BinTable {
    /// Build a table from bins already sorted by (chromosome, start).
    ///
    /// Every chromosome must start at position 0, bins must be contiguous and
    /// non-overlapping, and all bins must share the same width.
    pub fn new(bins: Vec<Bin>) -> Result<Self> {
        ensure!(!bins.is_empty(), "the bin annotation is empty");
        let resolution = bins[0].end.saturating_sub(bins[0].start);
        ensure!(resolution > 0, "invalid bin: {}:{}-{}", bins[0].chrom, bins[0].start, bins[0].end);

        let mut chrom_ranges: IndexMap<String, Range<usize>> = IndexMap::new();
        for (i, bin) in bins.iter().enumerate() {
            ensure!(
                [bin.f, bin.gc, bin.m].iter().all(|x| x.is_finite() && *x >= 0.0),
                "bin {}:{}-{} has a negative or non-finite annotation", bin.chrom, bin.start, bin.end,
            );
            match chrom_ranges.get_mut(&bin.chrom) {
                None => {
                    if bin.start != 0 {
                        bail!("the first bin of {} does not start at 0 (found {})", bin.chrom, bin.start);
                    }
                    chrom_ranges.insert(bin.chrom.clone(), i..i + 1);
                }
                Some(range) => {
                    if range.end != i {
                        bail!("bins of {} are not stored contiguously", bin.chrom);
                    }
                    let prev = &bins[i - 1];
                    ensure!(
                        bin.start == prev.end,
                        "bins {}:{}-{} and {}:{}-{} are not contiguous",
                        prev.chrom, prev.start, prev.end, bin.chrom, bin.start, bin.end,
                    );
                    range.end = i + 1;
                }
            }
            // The last bin of a chromosome may be truncated at the chromosome end.
            let width = bin.end.saturating_sub(bin.start);
            let is_last = bins.get(i + 1).map_or(true, |x| x.chrom != bin.chrom);
            ensure!(
                width == resolution || (is_last && width > 0 && width < resolution),
                "bin {}:{}-{} does not match the resolution {}", bin.chrom, bin.start, bin.end, resolution,
            );
        }
        Ok(Self { bins, chrom_ranges, resolution })
    }

    pub fn resolution(&self) -> u64 {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Chromosomes in table order.
    pub fn chroms(&self) -> impl Iterator<Item = &str> {
        self.chrom_ranges.keys().map(|x| x.as_str())
    }

    /// Row range of a chromosome in the genome-wide table.
    pub fn chrom_range(&self, chrom: &str) -> Option<Range<usize>> {
        self.chrom_ranges.get(chrom).cloned()
    }

    /// Keep the rows whose mask entry is `true`. Chromosomes with no
    /// remaining bins disappear from the table.
    pub(crate) fn retain_rows(&self, keep: &[bool]) -> Vec<Bin> {
        self.bins.iter().zip(keep).filter(|(_, k)| **k).map(|(b, _)| b.clone()).collect()
    }
}
