// src/utils/reorganize.rs: renaming and concatenating tool output between stages
use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use tokio::fs::{File as TokioFile, OpenOptions};
use tokio::io::AsyncWriteExt;
use crate::config::defs::PipelineError;
use crate::utils::discovery::{DirectoryShape, FileGroup};
use crate::utils::file::{file_name_str, list_subdirs};


/// Two-column label -> sample name mapping, keyed by lowercase label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameTable {
    entries: HashMap<String, String>,
}

impl RenameTable {
    /// Parses comma or tab separated rows with no header. Blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let mut entries = HashMap::new();
        let mut targets = HashSet::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let delimiter = if line.contains('\t') { '\t' } else { ',' };
            let columns: Vec<&str> = line.split(delimiter).map(str::trim).collect();
            if columns.len() != 2 || columns[0].is_empty() || columns[1].is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "rename table line {} must have exactly two columns: {:?}",
                    line_no + 1,
                    line
                )));
            }
            let label = columns[0].to_lowercase();
            let target = columns[1].to_string();
            if entries.contains_key(&label) || !targets.insert(target.clone()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "rename table entries must be unique in both columns, line {} repeats one: {:?}",
                    line_no + 1,
                    line
                )));
            }
            entries.insert(label, target);
        }
        Ok(RenameTable { entries })
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read rename table {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn lookup(&self, label: &str) -> Option<&str> {
        self.entries.get(&label.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}


#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameReport {
    pub renamed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

/// Renames the subdirectories of `dir` whose name appears in `table`.
/// Directories without an entry are left alone, so applying the same table
/// twice is a no-op the second time.
pub fn apply_rename_table(dir: &Path, table: &RenameTable) -> Result<RenameReport, PipelineError> {
    let mut report = RenameReport::default();

    for sub in list_subdirs(dir)? {
        let label = match file_name_str(&sub) {
            Some(label) => label.to_string(),
            None => continue,
        };
        let Some(target) = table.lookup(&label) else {
            info!("{} could not be renamed. No replacement found in the rename table.", label);
            report.skipped.push(label);
            continue;
        };

        let destination = dir.join(target);
        if destination.exists() {
            warn!("{} not renamed: {} already exists", label, destination.display());
            report.skipped.push(label);
            continue;
        }
        fs::rename(&sub, &destination)?;
        debug!("Renamed {} -> {}", sub.display(), destination.display());
        report.renamed.push((label, target.to_string()));
    }
    Ok(report)
}


#[derive(Debug, Clone, PartialEq)]
pub enum ConcatOutcome {
    Written { output: PathBuf, sources: usize, bytes: u64 },
    NoSources { dir: PathBuf },
    /// Result was zero bytes: it was removed and the sources kept
    Empty { dir: PathBuf },
}

/// Where a group's concatenated reads go. Nested groups get
/// `<dir>/<sub>/<dirname>_<sub>.fastq[.gz]`, flat ones `<dir>/<dirname>.fastq[.gz]`.
pub fn concat_target(group: &FileGroup, shape: DirectoryShape, dir_name: &str, gzipped: bool) -> PathBuf {
    let ext = if gzipped { "fastq.gz" } else { "fastq" };
    match shape {
        DirectoryShape::Nested => group.dir.join(format!("{}_{}.{}", dir_name, group.label(), ext)),
        DirectoryShape::Flat => group.dir.join(format!("{}.{}", dir_name, ext)),
    }
}

/// Concatenates a group's files starting with `prefix`, in name order, then
/// deletes them. The sources are only deleted once the result is known to be
/// non-empty.
///
/// # Arguments
///
/// * `group` - Files of one directory.
/// * `shape` - Layout the group came from.
/// * `dir_name` - Name of the directory being reorganized (`pass`, `fail`).
/// * `prefix` - Prefix selecting the files to merge.
///
/// # Returns
/// ConcatOutcome
pub async fn concatenate_group(
    group: &FileGroup,
    shape: DirectoryShape,
    dir_name: &str,
    prefix: &str,
) -> Result<ConcatOutcome, PipelineError> {
    let mut sources: Vec<&PathBuf> = group
        .files
        .iter()
        .filter(|p| file_name_str(p).is_some_and(|n| n.starts_with(prefix)))
        .collect();
    if sources.is_empty() {
        debug!("No {}* files in {}", prefix, group.dir.display());
        return Ok(ConcatOutcome::NoSources { dir: group.dir.clone() });
    }
    sources.sort();

    let gzipped = sources.iter().all(|p| file_name_str(p).is_some_and(|n| n.ends_with(".gz")));
    let output = concat_target(group, shape, dir_name, gzipped);

    let mut writer = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&output)
        .await?;
    for source in &sources {
        let mut reader = TokioFile::open(source).await?;
        tokio::io::copy(&mut reader, &mut writer).await?;
    }
    writer.flush().await?;
    drop(writer);

    let bytes = tokio::fs::metadata(&output).await?.len();
    if bytes == 0 {
        warn!(
            "The concatenated file {} is empty. Keeping the files in {}",
            output.display(),
            group.dir.display()
        );
        tokio::fs::remove_file(&output).await?;
        return Ok(ConcatOutcome::Empty { dir: group.dir.clone() });
    }

    for source in &sources {
        tokio::fs::remove_file(source).await?;
    }
    info!("Concatenated {} file(s) into {}", sources.len(), output.display());
    Ok(ConcatOutcome::Written { output, sources: sources.len(), bytes })
}
