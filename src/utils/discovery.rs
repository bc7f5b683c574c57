// src/utils/discovery.rs: sample discovery by file naming convention
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use crate::config::defs::{PipelineError, FILTERED_PREFIX, STAGE_PREFIXES};
use crate::utils::file::{file_name_str, is_fasta_name, is_fastq_name, list_files, list_subdirs, sequence_stem};
use crate::utils::sample::ReadPair;

/// Forward/reverse markers, most specific first.
const READ_MARKERS: &[(&str, &str)] = &[
    ("R1", "R2"),
    ("r1", "r2"),
    ("READ1", "READ2"),
    ("read1", "read2"),
    ("PE1", "PE2"),
    ("pe1", "pe2"),
    ("FWD", "REV"),
    ("fwd", "rev"),
    ("1", "2"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    Forward,
    Reverse,
}

/// Derives the sample name from a file or directory name: stage prefixes such
/// as `filtered_` are dropped, then everything from the first `_` or `.` on.
///
/// # Arguments
///
/// * `file_name` - Bare file name, no directories.
///
/// # Returns
/// Option<String>: None when nothing is left to name the sample by.
pub fn sample_name(file_name: &str) -> Option<String> {
    let mut name = file_name;
    for prefix in STAGE_PREFIXES {
        if let Some(stripped) = name.strip_prefix(prefix) {
            name = stripped;
            break;
        }
    }
    let name = name
        .split(|c: char| c == '_' || c == '.')
        .next()
        .unwrap_or_default();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Finds a forward/reverse marker among the `_`, `.` or `-` separated tokens
/// following the sample name.
pub fn read_direction(file_name: &str) -> Option<ReadDirection> {
    let stem = sequence_stem(file_name);
    let tokens: Vec<&str> = stem.split(['_', '.', '-']).skip(1).collect();
    for (forward, reverse) in READ_MARKERS.iter() {
        if tokens.contains(forward) {
            return Some(ReadDirection::Forward);
        }
        if tokens.contains(reverse) {
            return Some(ReadDirection::Reverse);
        }
    }
    None
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryShape {
    Flat,
    Nested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

impl FileGroup {
    pub fn label(&self) -> &str {
        file_name_str(&self.dir).unwrap_or_default()
    }
}

/// How files are laid out below an input directory.
pub trait LayoutStrategy: Send + Sync {
    fn shape(&self) -> DirectoryShape;

    /// Groups of files to process, one group per directory that holds them.
    fn groups(&self, root: &Path) -> io::Result<Vec<FileGroup>>;

    /// Files this layout does not process.
    fn stray_files(&self, _root: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// All files sit directly in the root.
pub struct FlatLayout;

impl LayoutStrategy for FlatLayout {
    fn shape(&self) -> DirectoryShape {
        DirectoryShape::Flat
    }

    fn groups(&self, root: &Path) -> io::Result<Vec<FileGroup>> {
        Ok(vec![FileGroup { dir: root.to_path_buf(), files: list_files(root)? }])
    }
}

/// One subdirectory per group; loose files in the root are not processed.
pub struct NestedLayout;

impl LayoutStrategy for NestedLayout {
    fn shape(&self) -> DirectoryShape {
        DirectoryShape::Nested
    }

    fn groups(&self, root: &Path) -> io::Result<Vec<FileGroup>> {
        list_subdirs(root)?
            .into_iter()
            .map(|dir| {
                let files = list_files(&dir)?;
                Ok(FileGroup { dir, files })
            })
            .collect()
    }

    fn stray_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        list_files(root)
    }
}

/// Picks the layout for `root`: nested as soon as it has any subdirectory.
pub fn select_layout(root: &Path) -> io::Result<Box<dyn LayoutStrategy>> {
    if list_subdirs(root)?.is_empty() {
        debug!("{} has a flat layout", root.display());
        Ok(Box::new(FlatLayout))
    } else {
        debug!("{} has a nested layout", root.display());
        Ok(Box::new(NestedLayout))
    }
}


/// Result of scanning one directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovered<T> {
    pub samples: BTreeMap<String, T>,
    pub unmatched: Vec<PathBuf>,
}

impl<T> Discovered<T> {
    pub fn new() -> Self {
        Discovered { samples: BTreeMap::new(), unmatched: Vec::new() }
    }

    /// Logs every file whose category could not be resolved.
    pub fn warn_unmatched(&self, what: &str) {
        if self.unmatched.is_empty() {
            return;
        }
        warn!("{} file(s) not recognised as {}:", self.unmatched.len(), what);
        for path in &self.unmatched {
            warn!("  unmatched: {}", path.display());
        }
    }
}

impl<T> Default for Discovered<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_unique(
    slot: &mut Option<PathBuf>,
    name: &str,
    path: PathBuf,
) -> Result<(), PipelineError> {
    if let Some(first) = slot {
        return Err(PipelineError::SampleCollision {
            name: name.to_string(),
            first: first.clone(),
            second: path,
        });
    }
    *slot = Some(path);
    Ok(())
}

/// Pairs forward and reverse short read files found directly in `dir`.
/// Files that are not FASTQ, carry no direction marker or lack a mate are
/// reported as unmatched.
///
/// # Arguments
///
/// * `dir` - Directory of paired short reads.
///
/// # Returns
/// Discovered<ReadPair> keyed by sample name.
pub fn discover_short_reads(dir: &Path) -> Result<Discovered<ReadPair>, PipelineError> {
    let mut found = Discovered::new();
    let mut halves: BTreeMap<String, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();

    for group in FlatLayout.groups(dir)? {
        for path in group.files {
            let Some(file_name) = file_name_str(&path) else {
                found.unmatched.push(path);
                continue;
            };
            if !is_fastq_name(file_name) {
                found.unmatched.push(path);
                continue;
            }
            let (Some(name), Some(direction)) = (sample_name(file_name), read_direction(file_name)) else {
                found.unmatched.push(path);
                continue;
            };
            let entry = halves.entry(name.clone()).or_default();
            match direction {
                ReadDirection::Forward => insert_unique(&mut entry.0, &name, path)?,
                ReadDirection::Reverse => insert_unique(&mut entry.1, &name, path)?,
            }
        }
    }

    for (name, halves) in halves {
        match halves {
            (Some(r1), Some(r2)) => {
                found.samples.insert(name, ReadPair { r1, r2 });
            }
            (Some(lone), None) | (None, Some(lone)) => {
                warn!("{}: no mate found for {}", name, lone.display());
                found.unmatched.push(lone);
            }
            (None, None) => {}
        }
    }
    Ok(found)
}

/// Collects one long read FASTQ per sample below `dir`.
///
/// # Arguments
///
/// * `dir` - Long read directory.
/// * `layout` - Directory shape chosen for `dir`.
/// * `skip_prefixes` - File prefixes marking this pipeline's own artifacts; such files are skipped silently.
///
/// A `filtered_` file and the read file it shares a name with do not collide:
/// the filtered one is kept.
///
/// # Returns
/// Discovered<PathBuf> keyed by sample name.
pub fn discover_long_reads(
    dir: &Path,
    layout: &dyn LayoutStrategy,
    skip_prefixes: &[&str],
) -> Result<Discovered<PathBuf>, PipelineError> {
    let mut found = Discovered::new();
    found.unmatched.extend(layout.stray_files(dir)?);

    for group in layout.groups(dir)? {
        for path in group.files {
            let Some(file_name) = file_name_str(&path) else {
                found.unmatched.push(path);
                continue;
            };
            if skip_prefixes.iter().any(|p| file_name.starts_with(p)) {
                debug!("Skipping pipeline artifact {}", path.display());
                continue;
            }
            if !is_fastq_name(file_name) {
                if !is_fasta_name(file_name) {
                    found.unmatched.push(path);
                }
                continue;
            }
            let Some(name) = sample_name(file_name) else {
                found.unmatched.push(path);
                continue;
            };
            match found.samples.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(path);
                }
                Entry::Occupied(mut slot) => {
                    let held_filtered = file_name_str(slot.get()).is_some_and(|n| n.starts_with(FILTERED_PREFIX));
                    if held_filtered != file_name.starts_with(FILTERED_PREFIX) {
                        // filtered reads supersede the file they were made from
                        if !held_filtered {
                            slot.insert(path);
                        }
                        continue;
                    }
                    return Err(PipelineError::SampleCollision {
                        name: slot.key().clone(),
                        first: slot.get().clone(),
                        second: path,
                    });
                }
            }
        }
    }
    Ok(found)
}
