use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

use firecaller_core::utils::io::{
    read_bin_table_from_file, read_sample_matrices, write_fire_table, write_super_fires, OutputOptions,
};
use firecaller_core::utils::Compression;
use firecaller_core::{fire_caller, parse_flag, FireOptions, GenomeBuild};

/// Call frequently interacting regions (FIREs) and super-FIREs from Hi-C
/// contact matrices.
#[derive(Debug, Parser)]
#[command(name = "firecaller", version, about)]
struct Args {
    #[arg(
        short = 'b',
        long = "bins",
        value_name = "PATH",
        help = "Bin annotation with columns chr, start, end, F, GC, M"
    )]
    bins: PathBuf,

    #[arg(
        short = 'g',
        long = "genome",
        value_name = "BUILD",
        help = "Genome build: hg19, GRCh38, mm9 or mm10"
    )]
    genome: GenomeBuild,

    #[arg(
        short = 'm',
        long = "matrix-dir",
        value_name = "DIR",
        default_value = ".",
        help = "Directory holding the contact matrices, named <sample>_<chr>[.gz|.zst|.txt]"
    )]
    matrix_dir: PathBuf,

    #[arg(
        short = 's',
        long = "samples",
        required = true,
        value_name = "NAMES",
        value_delimiter = ',',
        num_args = 1..,
        help = "Sample name prefixes delimited by comma"
    )]
    samples: Vec<String>,

    #[arg(
        long = "rm-mhc",
        value_name = "FLAG",
        default_value = "TRUE",
        help = "Remove bins in the MHC region (TRUE or FALSE)"
    )]
    rm_mhc: String,

    #[arg(long = "upper-cis", value_name = "BP", default_value_t = 200_000, help = "Size of the cis window")]
    upper_cis: u64,

    #[arg(long = "alpha", value_name = "FLOAT", default_value_t = 0.05, help = "Significance level")]
    alpha: f64,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "THREADS",
        default_value_t = 0,
        help = "Number of threads, 0 uses all cores"
    )]
    threads: usize,

    #[arg(
        long = "compression",
        value_name = "TYPE",
        help = "Compress the output files: gzip or zstd"
    )]
    compression: Option<Compression>,

    #[arg(long = "compression-level", value_name = "LEVEL", help = "Compression level of the output files")]
    compression_level: Option<u32>,

    #[arg(short = 'o', long = "outdir", value_name = "DIR", default_value = ".", help = "Output directory")]
    outdir: PathBuf,
}

fn run(args: Args) -> Result<()> {
    let options = FireOptions {
        upper_cis: args.upper_cis,
        rm_mhc: parse_flag(&args.rm_mhc)?,
        alpha: args.alpha,
        ..FireOptions::default()
    };
    let chroms = args.genome.chromosomes();
    let bins = read_bin_table_from_file(&args.bins, Some(chroms.as_slice()))?;
    info!("{} bins read at {} bp resolution", bins.len(), bins.resolution());
    options.validate(bins.resolution())?;

    let samples = args.samples.iter()
        .map(|name| Ok((name.clone(), read_sample_matrices(&args.matrix_dir, name, &chroms)?)))
        .collect::<Result<Vec<_>>>()?;

    let result = fire_caller(bins, &samples, args.genome, &options)?;

    let output = OutputOptions {
        compression: args.compression,
        compression_level: args.compression_level,
        ..OutputOptions::default()
    };
    write_fire_table(&result.fire_table, &args.outdir, &output)?;
    let files = write_super_fires(&result.super_fires, &args.outdir, &output)?;
    info!("Super-FIREs written to {} files in {}", files.len(), args.outdir.display());
    Ok(())
}

fn main() {
    let start = std::time::Instant::now();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("failed to build the thread pool")
    {
        error!("{:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
    info!("Elapsed time: {:?}", start.elapsed());
}
