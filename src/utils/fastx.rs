use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use anyhow::anyhow;
use log::warn;
use seq_io::fastq::{Reader as FastqReader, Record};
use crate::config::defs::PipelineError;
use crate::utils::file::{open_reader, part_path};


pub fn write_fasta_record<W: Write>(
    writer: &mut W,
    head: &[u8],
    seq: &[u8],
) -> io::Result<()> {
    writer.write_all(b">")?;
    writer.write_all(head)?;
    writer.write_all(b"\n")?;
    writer.write_all(seq)?;
    writer.write_all(b"\n")?;
    Ok(())
}


/// Converts a FASTQ (plain or gzipped) to FASTA, dropping qualities.
/// Output is written to a sibling `.part` file and renamed once complete;
/// a failed conversion removes the `.part` file.
///
/// # Arguments
///
/// * `fastq_path` - Long read FASTQ.
/// * `fasta_path` - Destination FASTA.
///
/// # Returns
/// u64: number of records written.
pub fn fastq_to_fasta(fastq_path: &Path, fasta_path: &Path) -> Result<u64, PipelineError> {
    let part = part_path(fasta_path);
    match convert_records(fastq_path, &part) {
        Ok(count) => {
            fs::rename(&part, fasta_path)?;
            Ok(count)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&part) {
                if rm.kind() != io::ErrorKind::NotFound {
                    warn!("Could not remove {}: {}", part.display(), rm);
                }
            }
            Err(e)
        }
    }
}

fn convert_records(fastq_path: &Path, fasta_path: &Path) -> Result<u64, PipelineError> {
    let mut reader = FastqReader::new(open_reader(fastq_path)?);
    let mut writer = BufWriter::new(File::create(fasta_path)?);

    let mut count = 0u64;
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| {
            PipelineError::Other(anyhow!("Invalid FASTQ record in {}: {}", fastq_path.display(), e))
        })?;
        write_fasta_record(&mut writer, record.head(), record.seq())?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}


#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    const FASTQ: &[u8] = b"@read1 ch=7\nACGT\n+\nIIII\n@read2\nGGCCAA\n+\n!!!!!!\n";

    #[test]
    fn test_fastq_to_fasta_gz() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let fastq = dir.path().join("filtered_s1.fastq.gz");
        let mut enc = GzEncoder::new(File::create(&fastq)?, Compression::default());
        enc.write_all(FASTQ)?;
        enc.finish()?;

        let fasta = dir.path().join("filtered_s1.fasta");
        let count = fastq_to_fasta(&fastq, &fasta)?;
        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(&fasta)?, ">read1 ch=7\nACGT\n>read2\nGGCCAA\n");
        assert!(!dir.path().join("filtered_s1.fasta.part").exists());
        Ok(())
    }

    #[test]
    fn test_fastq_to_fasta_rejects_garbage() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let fastq = dir.path().join("bad.fastq");
        fs::write(&fastq, b">not a fastq\nACGT\n")?;
        let result = fastq_to_fasta(&fastq, &dir.path().join("bad.fasta"));
        assert!(result.is_err());
        assert!(!dir.path().join("bad.fasta").exists());
        assert!(!dir.path().join("bad.fasta.part").exists());
        Ok(())
    }
}
