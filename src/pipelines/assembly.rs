use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::anyhow;
use log::{debug, info, warn};
use crate::cli::{AssembleArgs, AssemblyMode};
use crate::config::defs::{
    PipelineError, RunConfig, DEFAULT_ASSEMBLIES_DIR, PORE_CHOPPED_PREFIX, SHASTA_ASSEMBLY, SHASTA_DIR,
    SHASTA_TAG, SKESA_CONTIGS, SKESA_DIR, SKESA_TAG, SPADES_CONTIGS, SPADES_DIR, SPADES_TAG,
};
use crate::pipelines::{run_samples, RunSummary};
use crate::utils::command::{shasta, skesa, spades};
use crate::utils::discovery::{discover_long_reads, discover_short_reads, select_layout, DirectoryShape};
use crate::utils::fastx::fastq_to_fasta;
use crate::utils::file::{file_name_str, list_subdirs, remove_scratch_files, require_artifact, sequence_stem};
use crate::utils::sample::{Assembly, AssemblyKind, ReadPair, Reads, Sample, SampleStage};
use crate::utils::streams::{run_tool, ToolCommand};


/// Assembler settings shared by every sample of a run.
#[derive(Debug, Clone)]
pub struct AssemblySettings {
    pub mode: AssemblyMode,
    pub min_read_length: u64,
    pub shasta: PathBuf,
    pub spades: PathBuf,
    pub skesa: PathBuf,
    pub threads: usize,
}


pub fn required_tools(args: &AssembleArgs) -> Vec<(&'static str, OsString)> {
    let shasta = (SHASTA_TAG, args.shasta.clone().into_os_string());
    let spades = (SPADES_TAG, args.spades.clone().into_os_string());
    match args.mode {
        AssemblyMode::Long => vec![shasta],
        AssemblyMode::Hybrid => vec![shasta, spades],
        AssemblyMode::Short => vec![(SKESA_TAG, OsString::from(SKESA_TAG))],
    }
}


/// Finds SPAdes' contigs for the largest k-mer size, `spades/K<max>/final_contigs.fasta`.
pub fn find_spades_contigs(spades_dir: &Path) -> Option<PathBuf> {
    let subdirs = list_subdirs(spades_dir).ok()?;
    subdirs
        .iter()
        .filter_map(|dir| {
            let k: u32 = file_name_str(dir)?.strip_prefix('K')?.parse().ok()?;
            Some((k, dir))
        })
        .max_by_key(|(k, _)| *k)
        .map(|(_, dir)| dir.join(SPADES_CONTIGS))
}


/// Directory a long read file's assembly lives in: flat layouts give each
/// file its own `<stem>/` directory, nested layouts use the file's directory.
pub fn long_read_sample_dir(fastq: &Path, shape: DirectoryShape) -> PathBuf {
    let parent = fastq.parent().unwrap_or_else(|| Path::new(""));
    match shape {
        DirectoryShape::Flat => parent.join(file_name_str(fastq).map(sequence_stem).unwrap_or_default()),
        DirectoryShape::Nested => parent.to_path_buf(),
    }
}

/// Moves a long read file into its sample directory unless it is already there.
///
/// # Arguments
///
/// * `fastq` - Long read FASTQ, plain or gzipped.
/// * `sample_dir` - Directory the assembly is written to.
///
/// # Returns
/// PathBuf: FASTQ path inside `sample_dir`.
pub async fn place_long_reads(fastq: &Path, sample_dir: &Path) -> Result<PathBuf, PipelineError> {
    if fastq.parent() == Some(sample_dir) {
        return Ok(fastq.to_path_buf());
    }
    let file_name = file_name_str(fastq)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("unusable read file name {:?}", fastq)))?;
    tokio::fs::create_dir_all(sample_dir).await?;
    let moved = sample_dir.join(file_name);
    tokio::fs::rename(fastq, &moved).await?;
    debug!("Moved {} into {}", file_name, sample_dir.display());
    Ok(moved)
}

/// FASTA copy of a long read FASTQ, written beside it. An existing FASTA is reused.
pub async fn long_read_fasta(fastq: &Path) -> Result<PathBuf, PipelineError> {
    let fasta = fasta_beside(fastq);
    if fasta.exists() {
        info!("Reusing {}", fasta.display());
        return Ok(fasta);
    }
    let (src, dst) = (fastq.to_path_buf(), fasta.clone());
    let records = tokio::task::spawn_blocking(move || fastq_to_fasta(&src, &dst))
        .await
        .map_err(|e| PipelineError::Other(anyhow!("FASTA conversion task failed: {}", e)))??;
    info!("Converted {} reads to {}", records, fasta.display());
    Ok(fasta)
}


/// Builds the samples for a mode without touching any file. Long and hybrid
/// samples are keyed by the long read directory; short read pairs are
/// attached by exact name.
pub fn collect_samples(args: &AssembleArgs) -> Result<Vec<Sample>, PipelineError> {
    let short = match &args.short_reads {
        Some(dir) => {
            let found = discover_short_reads(dir)?;
            found.warn_unmatched("paired short reads");
            found.samples
        }
        None => Default::default(),
    };

    let mut samples = Vec::new();
    if args.mode == AssemblyMode::Short {
        let short_dir = args.short_reads.as_deref().unwrap_or_else(|| Path::new(""));
        let out_dir = args.out_dir.clone().unwrap_or_else(|| short_dir.join(DEFAULT_ASSEMBLIES_DIR));
        for (name, pair) in short {
            let work_dir = out_dir.join(&name);
            samples.push(Sample::new(name, work_dir, SampleStage::Unassembled(Reads::Short(pair))));
        }
        return Ok(samples);
    }

    let long_dir = args
        .long_reads
        .as_deref()
        .ok_or_else(|| PipelineError::InvalidConfig(format!("--long-reads is required for {:?} assembly", args.mode)))?;
    let layout = select_layout(long_dir)?;
    let found = discover_long_reads(long_dir, layout.as_ref(), &[PORE_CHOPPED_PREFIX])?;
    found.warn_unmatched("long reads");

    let mut short = short;
    for (name, fastq) in found.samples {
        let work_dir = long_read_sample_dir(&fastq, layout.shape());
        let pair = short.remove(&name);
        if args.mode == AssemblyMode::Long && pair.is_some() {
            debug!("{}: short reads ignored for long read assembly", name);
        }
        let reads = match (args.mode, pair) {
            (AssemblyMode::Hybrid, Some(short)) => Reads::Hybrid { long: fastq, short },
            _ => Reads::Long(fastq),
        };
        samples.push(Sample::new(name, work_dir, SampleStage::Unassembled(reads)));
    }
    for name in short.keys() {
        if args.mode == AssemblyMode::Hybrid {
            warn!("{}: short reads found but no long reads", name);
        }
    }
    Ok(samples)
}


pub async fn run(run_config: Arc<RunConfig>, args: &AssembleArgs) -> Result<(), PipelineError> {
    println!("\n-------------\n Assembly\n-------------\n");
    args.validate()?;

    let samples = collect_samples(args)?;
    info!("Found {} sample(s) for {:?} assembly", samples.len(), args.mode);

    let settings = Arc::new(AssemblySettings {
        mode: args.mode,
        min_read_length: args.min_read_length.unwrap_or(0),
        shasta: args.shasta.clone(),
        spades: args.spades.clone(),
        skesa: PathBuf::from(SKESA_TAG),
        threads: run_config.threads,
    });
    let summary: RunSummary = run_samples("Assembly", run_config.jobs, samples, |sample| {
        let settings = settings.clone();
        async move { assemble_sample(sample, &settings).await }
    })
    .await;
    summary.log();
    summary.into_result().map(|_| ())
}


/// Moves the long reads into the sample directory, then runs the assembler
/// chain the mode calls for.
pub async fn assemble_sample(mut sample: Sample, settings: &AssemblySettings) -> Result<Sample, PipelineError> {
    let mut reads = match &sample.stage {
        SampleStage::Unassembled(reads) => reads.clone(),
        other => {
            return Err(PipelineError::InvalidConfig(format!(
                "{} cannot be assembled from the {} stage",
                sample.name,
                other.label()
            )));
        }
    };

    if settings.mode == AssemblyMode::Hybrid && reads.short().is_none() {
        return Err(missing_short(&sample.name));
    }
    if settings.mode != AssemblyMode::Short {
        let long = require_long(&sample.name, &reads)?;
        let placed = place_long_reads(long, &sample.work_dir).await?;
        reads = reads.with_long(placed);
    }

    let assembly = match settings.mode {
        AssemblyMode::Long => {
            let long = require_long(&sample.name, &reads)?;
            run_shasta(&sample.work_dir, long, settings).await?
        }
        AssemblyMode::Hybrid => {
            let long = require_long(&sample.name, &reads)?;
            let short = reads.short().ok_or_else(|| missing_short(&sample.name))?;
            let scaffold = run_shasta(&sample.work_dir, long, settings).await?;
            run_spades(&sample.work_dir, short, Some(&scaffold.fasta), settings).await?
        }
        AssemblyMode::Short => {
            let short = reads.short().ok_or_else(|| missing_short(&sample.name))?;
            run_skesa(&sample.work_dir, short, settings).await?
        }
    };

    info!("{}: {} assembly at {}", sample.name, assembly.kind, assembly.fasta.display());
    sample.advance(SampleStage::Assembled { assembly, reads });
    Ok(sample)
}

fn require_long<'a>(name: &str, reads: &'a Reads) -> Result<&'a Path, PipelineError> {
    reads.long().ok_or_else(|| PipelineError::MissingInput {
        sample: name.to_string(),
        what: "long reads".to_string(),
    })
}

fn missing_short(name: &str) -> PipelineError {
    PipelineError::MissingInput {
        sample: name.to_string(),
        what: "paired short reads".to_string(),
    }
}

fn fasta_beside(fastq: &Path) -> PathBuf {
    let stem = file_name_str(fastq).map(sequence_stem).unwrap_or_default();
    fastq.with_file_name(format!("{}.fasta", stem))
}


async fn run_shasta(work_dir: &Path, long: &Path, settings: &AssemblySettings) -> Result<Assembly, PipelineError> {
    let output_dir = work_dir.join(SHASTA_DIR);
    let assembly = output_dir.join(SHASTA_ASSEMBLY);
    if assembly.exists() {
        info!("Shasta assembly {} already present, skipping", assembly.display());
        return Ok(Assembly { kind: AssemblyKind::Shasta, fasta: assembly });
    }

    let fasta = long_read_fasta(long).await?;
    let args = shasta::arg_generator(&fasta, &output_dir, settings.min_read_length, settings.threads);
    run_tool(&ToolCommand::new(SHASTA_TAG, args).with_program(settings.shasta.clone())).await?;
    require_artifact(&assembly)?;

    remove_scratch_files(&[fasta]).await?;
    Ok(Assembly { kind: AssemblyKind::Shasta, fasta: assembly })
}

async fn run_spades(
    work_dir: &Path,
    short: &ReadPair,
    trusted_contigs: Option<&Path>,
    settings: &AssemblySettings,
) -> Result<Assembly, PipelineError> {
    let output_dir = work_dir.join(SPADES_DIR);
    tokio::fs::create_dir_all(&output_dir).await?;

    let args = spades::arg_generator(short, &output_dir, trusted_contigs, settings.threads);
    run_tool(&ToolCommand::new(SPADES_TAG, args).with_program(settings.spades.clone())).await?;

    let contigs = find_spades_contigs(&output_dir)
        .ok_or_else(|| PipelineError::MissingArtifact(output_dir.join("K*").join(SPADES_CONTIGS)))?;
    require_artifact(&contigs)?;
    Ok(Assembly { kind: AssemblyKind::Spades, fasta: contigs })
}

async fn run_skesa(work_dir: &Path, short: &ReadPair, settings: &AssemblySettings) -> Result<Assembly, PipelineError> {
    let output_dir = work_dir.join(SKESA_DIR);
    tokio::fs::create_dir_all(&output_dir).await?;
    let contigs = output_dir.join(SKESA_CONTIGS);

    let args = skesa::arg_generator(short, &contigs, settings.threads);
    run_tool(&ToolCommand::new(SKESA_TAG, args).with_program(settings.skesa.clone())).await?;
    require_artifact(&contigs)?;
    Ok(Assembly { kind: AssemblyKind::Skesa, fasta: contigs })
}
