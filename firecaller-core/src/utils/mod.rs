pub mod io;

use std::path::Path;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::str::FromStr;
use anyhow::{Result, Context};

/// Round half away from zero to the given number of decimal places.
pub fn round_to(x: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (x * scale).round() / scale
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

impl Compression {
    /// File name extension of the compressed output.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => "gz",
            Compression::Zstd => "zst",
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gzip" => Ok(Compression::Gzip),
            "zstd" | "zstandard" => Ok(Compression::Zstd),
            _ => Err(format!("unsupported compression: {}", s)),
        }
    }
}

pub fn open_file_for_write<P: AsRef<Path>>(
    filename: P,
    compression: Option<Compression>,
    compression_level: Option<u32>,
) -> Result<Box<dyn Write + Send>> {
    let buffer = BufWriter::new(
        File::create(&filename).with_context(|| format!("cannot create file: {}", filename.as_ref().display()))?
    );
    let writer: Box<dyn Write + Send> = match compression {
        None => Box::new(buffer),
        Some(Compression::Gzip) => Box::new(flate2::write::GzEncoder::new(buffer, flate2::Compression::new(compression_level.unwrap_or(6)))),
        Some(Compression::Zstd) => {
            let mut zstd = zstd::stream::Encoder::new(buffer, compression_level.unwrap_or(3) as i32)?;
            zstd.multithread(4)?;
            Box::new(zstd.auto_finish())
        },
    };
    Ok(writer)
}

/// Open a file, possibly compressed. Supports gzip and zstd.
pub fn open_file_for_read<P: AsRef<Path>>(file: P) -> Result<Box<dyn std::io::Read>> {
    let path = file.as_ref();
    let open = || File::open(path).with_context(|| format!("cannot open file: {}", path.display()));
    let reader: Box<dyn std::io::Read> = match detect_compression(path)? {
        Some(Compression::Gzip) => Box::new(flate2::read::MultiGzDecoder::new(open()?)),
        Some(Compression::Zstd) => Box::new(zstd::stream::read::Decoder::new(open()?)?),
        None => Box::new(open()?),
    };
    Ok(reader)
}

/// Determine the file compression type. Supports gzip and zstd.
fn detect_compression<P: AsRef<Path>>(file: P) -> Result<Option<Compression>> {
    let path = file.as_ref();
    let fl = File::open(path).with_context(|| format!("cannot open file: {}", path.display()))?;
    if flate2::read::MultiGzDecoder::new(fl).header().is_some() {
        Ok(Some(Compression::Gzip))
    } else if path.extension().map_or(false, |ext| ext == "zst") {
        Ok(Some(Compression::Zstd))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(-1.23455001, 4), -1.2346);
        assert_eq!(round_to(2.0, 4), 2.0);
        assert_eq!(round_to(0.123456789, 8), 0.12345679);
    }

    #[test]
    fn test_compressed_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        [
            ("plain.txt", None),
            ("data.txt.gz", Some(Compression::Gzip)),
            ("data.txt.zst", Some(Compression::Zstd)),
        ].into_iter().for_each(|(name, compression)| {
            let path = dir.path().join(name);
            {
                let mut writer = open_file_for_write(&path, compression, None).unwrap();
                writer.write_all(b"1 2 3\n").unwrap();
            }
            let mut content = String::new();
            open_file_for_read(&path).unwrap().read_to_string(&mut content).unwrap();
            assert_eq!(content, "1 2 3\n");
        });
    }

    #[test]
    fn test_parse_compression() {
        assert_eq!("gzip".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!("ZSTD".parse::<Compression>().unwrap(), Compression::Zstd);
        assert_eq!("zstandard".parse::<Compression>().unwrap().extension(), "zst");
        assert!("bzip2".parse::<Compression>().is_err());
    }
}
