use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info};
use crate::cli::FilterArgs;
use crate::config::defs::{
    PipelineError, RunConfig, BBDUK_TAG, FILTERED_PREFIX, FILTLONG_TAG, GZIP_TAG, PORECHOP_TAG,
    PORE_CHOPPED_PREFIX, TRIMMED_PREFIX, TRIMMED_READS_DIR,
};
use crate::pipelines::{run_samples, RunSummary};
use crate::utils::command::{bbduk, filtlong, gzip, porechop};
use crate::utils::discovery::{discover_long_reads, discover_short_reads, select_layout};
use crate::utils::file::{file_name_str, remove_scratch_files, require_artifact};
use crate::utils::sample::{ReadPair, Reads, Sample, SampleStage};
use crate::utils::streams::{run_tool, PipelineSink, ProcessPipeline, ToolCommand};


/// Filtering parameters shared by every sample of a run.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub min_length: Option<u64>,
    pub target_bases: Option<u64>,
    pub keep_percent: u32,
    pub bbduk: PathBuf,
    pub porechop: PathBuf,
    pub filtlong: PathBuf,
    pub adapters: PathBuf,
    pub keep_intermediate: bool,
    pub threads: usize,
}

impl FilterSettings {
    pub fn from_args(args: &FilterArgs, threads: usize) -> Self {
        FilterSettings {
            min_length: args.min_length,
            target_bases: args
                .genome_size
                .map(|size| size.saturating_mul(args.target_bases_multiplier)),
            keep_percent: args.keep_percent,
            bbduk: args.bbduk.clone(),
            porechop: PathBuf::from(PORECHOP_TAG),
            filtlong: PathBuf::from(FILTLONG_TAG),
            adapters: args.adapters.clone(),
            keep_intermediate: args.keep_intermediate,
            threads,
        }
    }
}


pub fn required_tools(args: &FilterArgs) -> Vec<(&'static str, OsString)> {
    let mut tools = Vec::new();
    if args.short_reads.is_some() {
        tools.push((BBDUK_TAG, args.bbduk.clone().into_os_string()));
    }
    if args.long_reads.is_some() {
        tools.push((PORECHOP_TAG, OsString::from(PORECHOP_TAG)));
        tools.push((FILTLONG_TAG, OsString::from(FILTLONG_TAG)));
        tools.push((GZIP_TAG, OsString::from(GZIP_TAG)));
    }
    tools
}


/// Builds one sample per name found in either read directory.
///
/// # Arguments
///
/// * `long_dir` - Long read directory, flat or nested.
/// * `short_dir` - Paired short read directory.
///
/// # Returns
/// Samples in name order, each in the Unassembled stage.
pub fn collect_samples(long_dir: Option<&Path>, short_dir: Option<&Path>) -> Result<Vec<Sample>, PipelineError> {
    let mut long = BTreeMap::new();
    if let Some(dir) = long_dir {
        let layout = select_layout(dir)?;
        let found = discover_long_reads(dir, layout.as_ref(), &[FILTERED_PREFIX, PORE_CHOPPED_PREFIX])?;
        found.warn_unmatched("long reads");
        long = found.samples;
    }
    let mut short = BTreeMap::new();
    if let Some(dir) = short_dir {
        let found = discover_short_reads(dir)?;
        found.warn_unmatched("paired short reads");
        short = found.samples;
    }

    let mut names: Vec<String> = long.keys().chain(short.keys()).cloned().collect();
    names.sort();
    names.dedup();

    let mut samples = Vec::with_capacity(names.len());
    for name in names {
        let long_read = long.remove(&name);
        let pair = short.remove(&name);
        let work_dir = match (&long_read, &pair) {
            (Some(path), _) => path.parent().map(Path::to_path_buf).unwrap_or_default(),
            (None, Some(pair)) => pair.r1.parent().map(Path::to_path_buf).unwrap_or_default(),
            (None, None) => continue,
        };
        if let Some(reads) = Reads::from_parts(long_read, pair) {
            samples.push(Sample::new(name, work_dir, SampleStage::Unassembled(reads)));
        }
    }
    Ok(samples)
}


pub async fn run(run_config: Arc<RunConfig>, args: &FilterArgs) -> Result<(), PipelineError> {
    println!("\n-------------\n Read filtering\n-------------\n");

    if args.long_reads.is_some() && args.min_length.is_none() {
        return Err(PipelineError::InvalidConfig("--min-length is required for long read filtering".to_string()));
    }
    let samples = collect_samples(args.long_reads.as_deref(), args.short_reads.as_deref())?;
    info!("Found {} sample(s) to filter", samples.len());

    let settings = Arc::new(FilterSettings::from_args(args, run_config.threads));
    let summary: RunSummary = run_samples("Filtering", run_config.jobs, samples, |sample| {
        let settings = settings.clone();
        async move { filter_sample(sample, &settings).await }
    })
    .await;
    summary.log();
    summary.into_result().map(|_| ())
}


/// Trims short reads when present, then filters long reads when present,
/// using the trimmed short reads as reference.
pub async fn filter_sample(mut sample: Sample, settings: &FilterSettings) -> Result<Sample, PipelineError> {
    let reads = match &sample.stage {
        SampleStage::Unassembled(reads) => reads.clone(),
        other => {
            return Err(PipelineError::InvalidConfig(format!(
                "{} cannot be filtered from the {} stage",
                sample.name,
                other.label()
            )));
        }
    };

    let trimmed = match reads.short() {
        Some(pair) => {
            let trimmed = trim_short_reads(pair, settings).await?;
            sample.advance(SampleStage::ShortTrimmed {
                trimmed: trimmed.clone(),
                long: reads.long().map(Path::to_path_buf),
            });
            Some(trimmed)
        }
        None => None,
    };

    if let Some(long) = reads.long() {
        let filtered = filter_long_reads(&sample.name, long, trimmed.as_ref(), settings).await?;
        sample.advance(SampleStage::LongFiltered { filtered, trimmed });
    }
    Ok(sample)
}


fn trimmed_path(read: &Path) -> Result<PathBuf, PipelineError> {
    let dir = read.parent().unwrap_or_else(|| Path::new(""));
    let name = file_name_str(read)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("unusable read file name {:?}", read)))?;
    Ok(dir.join(TRIMMED_READS_DIR).join(format!("{}{}", TRIMMED_PREFIX, name)))
}

/// Adapter and quality trimming of a read pair into `trimmed_reads/`.
pub async fn trim_short_reads(pair: &ReadPair, settings: &FilterSettings) -> Result<ReadPair, PipelineError> {
    let output = ReadPair { r1: trimmed_path(&pair.r1)?, r2: trimmed_path(&pair.r2)? };
    if let Some(dir) = output.r1.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let cmd = ToolCommand::new(BBDUK_TAG, bbduk::arg_generator(pair, &output, &settings.adapters, settings.threads))
        .with_program(settings.bbduk.clone());
    run_tool(&cmd).await?;

    require_artifact(&output.r1)?;
    require_artifact(&output.r2)?;
    Ok(output)
}

/// Adapter chopping then length/quality filtering of one long read file.
/// Writes `filtered_<sample>.fastq.gz` beside the input.
pub async fn filter_long_reads(
    name: &str,
    long: &Path,
    reference: Option<&ReadPair>,
    settings: &FilterSettings,
) -> Result<PathBuf, PipelineError> {
    let min_length = settings.min_length.ok_or_else(|| PipelineError::MissingInput {
        sample: name.to_string(),
        what: "a minimum read length for long read filtering".to_string(),
    })?;
    let dir = long.parent().unwrap_or_else(|| Path::new(""));
    let chopped = dir.join(format!("{}{}.fastq", PORE_CHOPPED_PREFIX, name));
    let filtered = dir.join(format!("{}{}.fastq.gz", FILTERED_PREFIX, name));

    let chop_cmd = ToolCommand::new(PORECHOP_TAG, porechop::arg_generator(long, &chopped, settings.threads))
        .with_program(settings.porechop.clone());
    run_tool(&chop_cmd).await?;
    require_artifact(&chopped)?;

    let config = filtlong::FiltlongConfig {
        input: chopped.clone(),
        min_length,
        keep_percent: settings.keep_percent,
        target_bases: settings.target_bases,
        reference: reference.cloned(),
    };
    ProcessPipeline::new()
        .stage(ToolCommand::new(FILTLONG_TAG, filtlong::arg_generator(&config)).with_program(settings.filtlong.clone()))
        .stage(ToolCommand::new(GZIP_TAG, gzip::arg_generator()))
        .run(PipelineSink::File(filtered.clone()))
        .await?;
    require_artifact(&filtered)?;

    if settings.keep_intermediate {
        debug!("Keeping {}", chopped.display());
    } else {
        remove_scratch_files(&[chopped]).await?;
    }
    Ok(filtered)
}
