use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use noodles::fasta;
use tracing::info;

use crate::errors::PangeblocksError;
use crate::msa::Msa;

/// Open a file for reading, decompressing it on the fly if its name ends with `.gz`.
pub fn open_maybe_gzipped(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>, PangeblocksError> {
    let p = path.as_ref();
    let is_gzipped = p
        .file_name()
        .map(|v| v.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false);

    let file = File::open(p).map_err(|source| PangeblocksError::FileReadError { source })?;
    let reader: Box<dyn BufRead> = if is_gzipped {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(reader)
}

/// Read an alignment from a FASTA reader. All records must have the same length.
pub fn read_msa<R: BufRead>(reader: R) -> Result<Msa, PangeblocksError> {
    let mut reader = fasta::io::Reader::new(reader);

    let mut names = Vec::new();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;

        names.push(String::from_utf8_lossy(record.name()).into_owned());
        rows.push(record.sequence().as_ref().to_vec());
    }

    if rows.is_empty() {
        return Err(PangeblocksError::InvalidMsa("no sequences found".to_string()));
    }

    Msa::from_rows(names, rows)
}

/// Load an alignment from a (possibly gzipped) FASTA file.
pub fn load_msa(path: impl AsRef<Path>) -> Result<Msa, PangeblocksError> {
    let msa = read_msa(open_maybe_gzipped(&path)?)?;
    info!("Loaded alignment {:?}: {} sequences, {} columns.", path.as_ref(), msa.n_seqs(), msa.n_cols());

    Ok(msa)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    const MSA: &str = ">s1\nACGTA\n>s2\nAC\nCTA\n>s3\nacgtt\n";

    #[test]
    fn test_read_msa() {
        let msa = read_msa(MSA.as_bytes()).unwrap();

        assert_eq!(msa.names(), &["s1", "s2", "s3"]);
        assert_eq!(msa.row(1), b"ACCTA");
        assert_eq!(msa.row(2), b"ACGTT");
    }

    #[test]
    fn test_read_invalid_msa() {
        assert!(matches!(read_msa(&b""[..]), Err(PangeblocksError::InvalidMsa(_))));
        assert!(matches!(read_msa(&b">a\nACG\n>b\nAC\n"[..]), Err(PangeblocksError::InvalidMsa(_))));
    }

    #[test]
    fn test_load_gzipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msa.fa.gz");

        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(MSA.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let msa = load_msa(&path).unwrap();
        assert_eq!(msa.n_seqs(), 3);
        assert_eq!(msa.n_cols(), 5);

        assert!(matches!(
            load_msa(dir.path().join("missing.fa")),
            Err(PangeblocksError::FileReadError { .. })
        ));
    }
}
