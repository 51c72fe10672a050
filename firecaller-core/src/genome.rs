//! Genome builds supported by the FIRE caller.
//!
//! Each build carries the number of autosomes that are analysed and the
//! blacklisted MHC interval(s) that can optionally be removed before
//! normalization. Coordinates are 0-based, half-open on the left:
//! a blacklist interval `(start, end]` covers the bases `start + 1 ..= end`.
use anyhow::{bail, Result};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenomeBuild {
    Hg19,
    GRCh38,
    Mm9,
    Mm10,
}

/// A fixed genomic interval excluded from the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blacklist {
    pub chrom: &'static str,
    pub start: u64,
    pub end: u64,
}

impl Blacklist {
    /// Round the interval outward to bin boundaries at the given resolution.
    pub fn to_bin_bounds(&self, res: u64) -> (u64, u64) {
        let lo = (self.start / res) * res;
        let hi = self.end.div_ceil(res) * res;
        (lo, hi)
    }

    /// Whether a bin `[start, end)` on `chrom` lies inside the rounded interval.
    pub fn contains(&self, chrom: &str, start: u64, end: u64, res: u64) -> bool {
        let (lo, hi) = self.to_bin_bounds(res);
        chrom == self.chrom && start >= lo && end <= hi
    }
}

struct BuildConfig {
    autosomes: usize,
    blacklist: &'static [Blacklist],
}

const HG19: BuildConfig = BuildConfig {
    autosomes: 22,
    blacklist: &[Blacklist { chrom: "chr6", start: 28_477_797, end: 33_448_354 }],
};

const GRCH38: BuildConfig = BuildConfig {
    autosomes: 22,
    blacklist: &[Blacklist { chrom: "chr6", start: 28_510_120, end: 33_480_577 }],
};

const MM9: BuildConfig = BuildConfig {
    autosomes: 19,
    blacklist: &[
        Blacklist { chrom: "chr17", start: 33_888_191, end: 35_744_546 },
        Blacklist { chrom: "chr17", start: 36_230_820, end: 38_050_373 },
    ],
};

const MM10: BuildConfig = BuildConfig {
    autosomes: 19,
    blacklist: &[Blacklist { chrom: "chr17", start: 33_681_276, end: 38_548_659 }],
};

impl GenomeBuild {
    fn config(&self) -> &'static BuildConfig {
        match self {
            GenomeBuild::Hg19 => &HG19,
            GenomeBuild::GRCh38 => &GRCH38,
            GenomeBuild::Mm9 => &MM9,
            GenomeBuild::Mm10 => &MM10,
        }
    }

    pub fn autosomes(&self) -> usize {
        self.config().autosomes
    }

    /// Chromosome names analysed for this build, in genomic order.
    pub fn chromosomes(&self) -> Vec<String> {
        (1..=self.autosomes()).map(|i| format!("chr{}", i)).collect()
    }

    pub fn blacklist(&self) -> &'static [Blacklist] {
        self.config().blacklist
    }

    pub fn is_blacklisted(&self, chrom: &str, start: u64, end: u64, res: u64) -> bool {
        self.blacklist().iter().any(|b| b.contains(chrom, start, end, res))
    }
}

impl FromStr for GenomeBuild {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hg19" | "grch37" => Ok(GenomeBuild::Hg19),
            "grch38" | "hg38" => Ok(GenomeBuild::GRCh38),
            "mm9" => Ok(GenomeBuild::Mm9),
            "mm10" => Ok(GenomeBuild::Mm10),
            _ => bail!("unrecognized genome build: '{}' (expected one of hg19, GRCh38, mm9, mm10)", s),
        }
    }
}

impl fmt::Display for GenomeBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenomeBuild::Hg19 => "hg19",
            GenomeBuild::GRCh38 => "GRCh38",
            GenomeBuild::Mm9 => "mm9",
            GenomeBuild::Mm10 => "mm10",
        };
        write!(f, "{}", name)
    }
}

/// Parse the textual flag controlling blacklist removal.
pub fn parse_flag(s: &str) -> Result<bool> {
    match s.trim() {
        "TRUE" | "True" | "true" | "T" | "1" => Ok(true),
        "FALSE" | "False" | "false" | "F" | "0" => Ok(false),
        _ => bail!("invalid value for the blacklist removal flag: '{}'", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_lookup() {
        [
            ("hg19", GenomeBuild::Hg19, 22),
            ("GRCh38", GenomeBuild::GRCh38, 22),
            ("hg38", GenomeBuild::GRCh38, 22),
            ("mm9", GenomeBuild::Mm9, 19),
            ("MM10", GenomeBuild::Mm10, 19),
        ].into_iter().for_each(|(name, build, n)| {
            let parsed: GenomeBuild = name.parse().unwrap();
            assert_eq!(parsed, build);
            assert_eq!(parsed.autosomes(), n);
            assert_eq!(parsed.chromosomes().len(), n);
        });
        assert!("hg17".parse::<GenomeBuild>().is_err());
        assert_eq!(GenomeBuild::Mm10.chromosomes().last().unwrap(), "chr19");
    }

    #[test]
    fn test_blacklist_rounding() {
        let res = 40_000;
        let mhc = GenomeBuild::Hg19.blacklist()[0];
        assert_eq!(mhc.to_bin_bounds(res), (28_440_000, 33_480_000));
        assert!(GenomeBuild::Hg19.is_blacklisted("chr6", 28_440_000, 28_480_000, res));
        assert!(GenomeBuild::Hg19.is_blacklisted("chr6", 33_440_000, 33_480_000, res));
        assert!(!GenomeBuild::Hg19.is_blacklisted("chr6", 33_480_000, 33_520_000, res));
        assert!(!GenomeBuild::Hg19.is_blacklisted("chr6", 28_400_000, 28_440_000, res));
        assert!(!GenomeBuild::Hg19.is_blacklisted("chr5", 30_000_000, 30_040_000, res));

        assert_eq!(GenomeBuild::Mm9.blacklist().len(), 2);
        assert!(GenomeBuild::Mm9.is_blacklisted("chr17", 36_240_000, 36_280_000, res));
        assert!(!GenomeBuild::Mm9.is_blacklisted("chr17", 35_760_000, 35_800_000, res));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(parse_flag("T").unwrap());
        assert!(!parse_flag("false").unwrap());
        assert!(parse_flag("yes").is_err());
    }
}
