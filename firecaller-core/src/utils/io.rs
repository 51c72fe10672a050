//! Reading bin annotations and contact matrices, writing FIRE results.
use anyhow::{bail, ensure, Context, Result};
use log::{info, warn};
use ndarray::Array2;
use polars::prelude::{CsvWriter, SerWriter};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::bins::{Bin, BinTable};
use crate::cis::ContactMatrices;
use crate::significance::FireTable;
use crate::super_fire::{super_fires_to_dataframe, SuperFire};
use super::{open_file_for_read, open_file_for_write, Compression};

fn parse_field<T: lexical::FromLexical>(field: &str, name: &str, line: usize) -> Result<T> {
    lexical::parse(field).map_err(|e| anyhow::anyhow!("line {}: invalid {} '{}': {}", line, name, field, e))
}

/// Read the bin annotation: six whitespace-separated columns
/// `chr start end F GC M`, with an optional header line. When `chroms` is
/// given, rows of other chromosomes are skipped.
pub fn read_bin_table<R: BufRead>(reader: R, chroms: Option<&[String]>) -> Result<BinTable> {
    let mut bins = Vec::new();
    let mut seen_data = false;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().map(|x| x.trim_matches('"')).collect();
        ensure!(
            fields.len() == 6,
            "line {}: expected 6 columns (chr, start, end, F, GC, M), found {}", line_no, fields.len(),
        );
        if !seen_data && lexical::parse::<u64, _>(fields[1]).is_err() {
            // header
            seen_data = true;
            continue;
        }
        seen_data = true;
        if chroms.map_or(false, |c| !c.iter().any(|x| x == fields[0])) {
            continue;
        }
        bins.push(Bin {
            chrom: fields[0].to_string(),
            start: parse_field(fields[1], "start", line_no)?,
            end: parse_field(fields[2], "end", line_no)?,
            f: parse_field(fields[3], "F", line_no)?,
            gc: parse_field(fields[4], "GC", line_no)?,
            m: parse_field(fields[5], "M", line_no)?,
        });
    }
    BinTable::new(bins)
}

pub fn read_bin_table_from_file<P: AsRef<Path>>(file: P, chroms: Option<&[String]>) -> Result<BinTable> {
    let reader = BufReader::new(open_file_for_read(&file)?);
    read_bin_table(reader, chroms)
        .with_context(|| format!("failed to read bin annotation: {}", file.as_ref().display()))
}

/// Read a dense contact matrix. Each line holds one row, either N values or
/// three bin-coordinate columns followed by N values.
pub fn read_contact_matrix<R: BufRead>(reader: R) -> Result<Array2<f64>> {
    let mut rows: Vec<(usize, String)> = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.trim().is_empty() {
            rows.push((i + 1, line));
        }
    }
    let n = rows.len();
    let width = rows.first().map_or(0, |(_, x)| x.split_whitespace().count());
    let offset = if width == n {
        0
    } else if width == n + 3 {
        3
    } else {
        bail!("contact matrix has {} rows and {} columns", n, width);
    };

    let mut mat = Array2::zeros((n, n));
    for (i, (line_no, line)) in rows.iter().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        ensure!(fields.len() == width, "line {}: expected {} columns, found {}", line_no, width, fields.len());
        for (j, field) in fields[offset..].iter().enumerate() {
            let v: f64 = parse_field(field, "contact count", *line_no)?;
            ensure!(v.is_finite() && v >= 0.0, "line {}: invalid contact count {}", line_no, v);
            mat[[i, j]] = v;
        }
    }
    Ok(mat)
}

/// Locate the matrix file of a sample and chromosome: `<prefix>_<chrom>`
/// with an optional `.gz`, `.zst` or `.txt` extension.
pub fn find_matrix_file<P: AsRef<Path>>(dir: P, prefix: &str, chrom: &str) -> Option<PathBuf> {
    ["", ".gz", ".zst", ".txt", ".txt.gz"].iter()
        .map(|ext| dir.as_ref().join(format!("{}_{}{}", prefix, chrom, ext)))
        .find(|path| path.is_file())
}

/// Load the contact matrices of one sample for all given chromosomes.
/// Chromosomes without a file are left out.
pub fn read_sample_matrices<P: AsRef<Path> + Sync>(
    dir: P,
    prefix: &str,
    chroms: &[String],
) -> Result<ContactMatrices> {
    info!("Reading contact matrices of sample '{}'...", prefix);
    let matrices = chroms.into_par_iter().filter_map(|chrom| {
        match find_matrix_file(&dir, prefix, chrom) {
            None => {
                warn!("no contact matrix found for sample '{}' on {}", prefix, chrom);
                None
            }
            Some(path) => Some(
                open_file_for_read(&path)
                    .and_then(|r| read_contact_matrix(BufReader::new(r)))
                    .with_context(|| format!("failed to read contact matrix: {}", path.display()))
                    .map(|mat| (chrom.clone(), mat))
            ),
        }
    }).collect::<Result<ContactMatrices>>()?;
    ensure!(!matrices.is_empty(), "no contact matrix found for sample '{}' in {}", prefix, dir.as_ref().display());
    Ok(matrices)
}

/// Output formatting of the result tables.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Number of decimals written for floating point columns.
    pub float_precision: Option<usize>,
    pub compression: Option<Compression>,
    pub compression_level: Option<u32>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self { float_precision: Some(4), compression: None, compression_level: None }
    }
}

impl OutputOptions {
    /// Append the compression extension, if any, to a file name.
    fn file_name(&self, name: String) -> String {
        match self.compression {
            None => name,
            Some(c) => format!("{}.{}", name, c.extension()),
        }
    }
}

fn write_tsv(df: &mut polars::frame::DataFrame, path: &Path, options: &OutputOptions) -> Result<()> {
    let mut writer = open_file_for_write(path, options.compression, options.compression_level)?;
    CsvWriter::new(&mut writer)
        .include_header(true)
        .with_separator(b'\t')
        .with_float_precision(options.float_precision)
        .finish(df)
        .with_context(|| format!("failed to write: {}", path.display()))?;
    Ok(())
}

/// File name of the FIRE analysis table at a given resolution.
pub fn fire_table_filename(resolution: u64) -> String {
    if resolution % 1000 == 0 {
        format!("FIRE_ANALYSIS_{}KB.txt", resolution / 1000)
    } else {
        format!("FIRE_ANALYSIS_{}bp.txt", resolution)
    }
}

pub fn write_fire_table<P: AsRef<Path>>(table: &FireTable, dir: P, options: &OutputOptions) -> Result<PathBuf> {
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create directory: {}", dir.as_ref().display()))?;
    let path = dir.as_ref().join(options.file_name(fire_table_filename(table.resolution)));
    write_tsv(&mut table.to_dataframe()?, &path, options)?;
    info!("FIRE table written to {}", path.display());
    Ok(path)
}

/// Write one super-FIRE file per sample, `super_FIRE_call_<sample>.txt`.
pub fn write_super_fires<P: AsRef<Path>>(
    super_fires: &[(String, Vec<SuperFire>)],
    dir: P,
    options: &OutputOptions,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create directory: {}", dir.as_ref().display()))?;
    super_fires.iter().map(|(sample, sf)| {
        let name = format!("super_FIRE_call_{}.txt", sample.replace('/', "+"));
        let path = dir.as_ref().join(options.file_name(name));
        write_tsv(&mut super_fires_to_dataframe(sf)?, &path, options)?;
        Ok(path)
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_read_bin_table() {
        let input = "chr\tstart\tend\tF\tGC\tM\n\
                     chr1\t0\t40000\t12\t0.41\t0.95\n\
                     chr1\t40000\t80000\t0\t0.40\t0.97\n\
                     chrX\t0\t40000\t3\t0.39\t0.90\n\
                     chr2\t0\t40000\t8\t0.44\t1\n";
        let chroms = vec!["chr1".to_string(), "chr2".to_string()];
        let table = read_bin_table(input.as_bytes(), Some(chroms.as_slice())).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolution(), 40000);
        assert_eq!(table.bins()[0], Bin::new("chr1", 0, 40000, 12.0, 0.41, 0.95));
        assert_eq!(table.chroms().collect::<Vec<_>>(), vec!["chr1", "chr2"]);

        assert_eq!(read_bin_table(input.as_bytes(), None).unwrap().len(), 4);
    }

    #[test]
    fn test_read_bin_table_errors() {
        assert!(read_bin_table("chr1\t0\t40000\t12\t0.41\n".as_bytes(), None).is_err());
        assert!(read_bin_table("chr1\t40000\t80000\t12\t0.41\t0.9\n".as_bytes(), None).is_err());
        assert!(read_bin_table("chr1\t0\t40000\tx\t0.41\t0.9\n".as_bytes(), None).is_err());
        assert!(read_bin_table("".as_bytes(), None).is_err());
    }

    #[test]
    fn test_read_contact_matrix() {
        let square = "0 1 2\n1 0 3\n2 3 0\n";
        let mat = read_contact_matrix(square.as_bytes()).unwrap();
        assert_eq!(mat.dim(), (3, 3));
        assert_eq!(mat[[1, 2]], 3.0);

        let with_coords = "chr1\t0\t10\t0\t1\n\
                           chr1\t10\t20\t1\t0\n";
        let mat = read_contact_matrix(with_coords.as_bytes()).unwrap();
        assert_eq!(mat.dim(), (2, 2));
        assert_eq!(mat[[0, 1]], 1.0);

        assert!(read_contact_matrix("0 1\n1 0\n2 3\n".as_bytes()).is_err());
        assert!(read_contact_matrix("0 1\n1\n".as_bytes()).is_err());
        assert!(read_contact_matrix("0 -1\n1 0\n".as_bytes()).is_err());
    }

    #[test]
    fn test_sample_matrices_from_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut fl = open_file_for_write(dir.path().join("s1_chr1.gz"), Some(Compression::Gzip), None).unwrap();
            fl.write_all(b"0 2\n2 0\n").unwrap();
        }
        std::fs::write(dir.path().join("s1_chr2"), "0 1 1\n1 0 1\n1 1 0\n").unwrap();
        let chroms = vec!["chr1".to_string(), "chr2".to_string(), "chr3".to_string()];
        let matrices = read_sample_matrices(dir.path(), "s1", &chroms).unwrap();
        assert_eq!(matrices.len(), 2);
        assert_eq!(matrices["chr1"][[0, 1]], 2.0);
        assert_eq!(matrices["chr2"].dim(), (3, 3));
        assert!(read_sample_matrices(dir.path(), "s2", &chroms).is_err());
    }

    #[test]
    fn test_write_outputs() {
        let bins: Vec<Bin> = (0..3u64).map(|i| Bin::new("chr1", i * 10, (i + 1) * 10, 1.0, 1.0, 1.0)).collect();
        let table = FireTable {
            bins,
            samples: vec!["s".to_string()],
            resolution: 10_000,
            scores: ndarray::array![[0.5], [1.25], [3.0]],
            neg_ln_p: ndarray::array![[0.2], [0.9], [3.5]],
            indicators: ndarray::array![[0u8], [0], [1]],
        };
        let super_fires = vec![("s".to_string(), vec![SuperFire { chrom: "chr1".to_string(), start: 20, end: 30, cum_score: 3.5 }])];
        let dir = tempfile::tempdir().unwrap();
        fn read(path: &Path) -> String {
            let mut content = String::new();
            open_file_for_read(path).unwrap().read_to_string(&mut content).unwrap();
            content
        }

        let plain = OutputOptions::default();
        let fire_file = write_fire_table(&table, dir.path(), &plain).unwrap();
        assert!(fire_file.ends_with("FIRE_ANALYSIS_10KB.txt"));
        let content = read(&fire_file);
        assert_eq!(content.lines().next().unwrap(), "chr\tstart\tend\ts_norm_cis\ts_neg_ln_pval\ts_indicator");
        assert_eq!(content.lines().count(), 4);
        let sf_files = write_super_fires(&super_fires, dir.path(), &plain).unwrap();
        assert!(sf_files[0].ends_with("super_FIRE_call_s.txt"));
        assert_eq!(read(&sf_files[0]).lines().next().unwrap(), "chr\tstart\tend\tneg_log10_p");

        [Compression::Gzip, Compression::Zstd].into_iter().for_each(|c| {
            let options = OutputOptions { compression: Some(c), ..OutputOptions::default() };
            let out = dir.path().join(c.extension());
            let compressed = write_fire_table(&table, &out, &options).unwrap();
            assert_eq!(compressed.extension().unwrap(), c.extension());
            assert_eq!(read(&compressed), content);
            let files = write_super_fires(&super_fires, &out, &options).unwrap();
            assert_eq!(read(&files[0]), read(&sf_files[0]));
        });
    }

    #[test]
    fn test_output_names() {
        assert_eq!(fire_table_filename(40000), "FIRE_ANALYSIS_40KB.txt");
        assert_eq!(fire_table_filename(2500), "FIRE_ANALYSIS_2500bp.txt");
    }
}
