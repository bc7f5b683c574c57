use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use flate2::read::MultiGzDecoder;
use log::{debug, warn};
use crate::config::defs::{FASTA_EXTS, FASTQ_EXTS, PipelineError};

/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens a file, transparently decompressing gzip (including concatenated members).
pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let file = File::open(path)?;
    if is_gzipped(path)? {
        Ok(FileReader::Gzipped(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Ok(FileReader::Uncompressed(BufReader::new(file)))
    }
}

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Makes a user supplied path absolute against the launch directory.
///
/// # Arguments
/// * `path` - Path as given on the command line.
/// * `cwd` - Directory the run was launched from.
///
/// # Returns
/// PathBuf: absolute path.
pub fn resolve_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Splits a file name into its stem and the trailing extensions.
/// `sampleA.fastq.gz` -> (`sampleA`, [`fastq`, `gz`]).
pub fn extension_remover(file_name: &str) -> (String, Vec<String>) {
    let mut parts = file_name.split('.');
    let stem = parts.next().unwrap_or_default().to_string();
    let extensions = parts.map(|s| s.to_string()).collect();
    (stem, extensions)
}

/// File name with any `.gz` and sequence extension removed.
/// `filtered_sampleA.fastq.gz` -> `filtered_sampleA`.
pub fn sequence_stem(file_name: &str) -> String {
    let mut name = file_name.strip_suffix(".gz").unwrap_or(file_name);
    for ext in FASTQ_EXTS.iter().chain(FASTA_EXTS.iter()) {
        if let Some(stripped) = name.strip_suffix(&format!(".{}", ext)) {
            name = stripped;
            break;
        }
    }
    name.to_string()
}

pub fn is_fastq_name(file_name: &str) -> bool {
    let (_, extensions) = extension_remover(file_name);
    extensions
        .iter()
        .any(|ext| FASTQ_EXTS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

pub fn is_fasta_name(file_name: &str) -> bool {
    let (_, extensions) = extension_remover(file_name);
    extensions
        .iter()
        .any(|ext| FASTA_EXTS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Sibling path an artifact is written to before it is complete.
/// `filtered_s1.fastq.gz` -> `filtered_s1.fastq.gz.part`.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Moves a finished `.part` file into place, or removes it when the writer failed.
pub async fn finish_part_file<T>(
    part: &Path,
    target: &Path,
    result: Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    match result {
        Ok(value) => {
            tokio::fs::rename(part, target).await?;
            Ok(value)
        }
        Err(e) => {
            match tokio::fs::remove_file(part).await {
                Ok(()) => debug!("Removed incomplete {}", part.display()),
                Err(rm) if rm.kind() == io::ErrorKind::NotFound => {}
                Err(rm) => warn!("Could not remove {}: {}", part.display(), rm),
            }
            Err(e)
        }
    }
}

pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Lists the regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    list_entries(dir, |p| p.is_file())
}

/// Lists the subdirectories directly inside `dir`, sorted by name.
pub fn list_subdirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    list_entries(dir, |p| p.is_dir())
}

fn list_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if keep(&path) {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Fails with a MissingArtifact error unless `path` exists.
pub fn require_artifact(path: &Path) -> Result<(), PipelineError> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingArtifact(path.to_path_buf()))
    }
}

/// Removes scratch files left behind by a finished tool. Absent files are ignored.
pub async fn remove_scratch_files(paths: &[PathBuf]) -> Result<(), PipelineError> {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Could not remove {}: {}", path.display(), e);
                return Err(e.into());
            }
        }
    }
    Ok(())
}
