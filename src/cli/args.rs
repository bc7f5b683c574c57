use std::path::PathBuf;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use crate::config::defs::{
    DEFAULT_ADAPTERS, DEFAULT_BBDUK, DEFAULT_GUPPY_MODEL_DIR, DEFAULT_JAVA_HEAP_FRACTION,
    DEFAULT_KEEP_PERCENT, DEFAULT_MAX_POLISH_ITERATIONS, DEFAULT_MEDAKA_MODEL, DEFAULT_PILON_JAR,
    DEFAULT_SHASTA, DEFAULT_SPADES, DEFAULT_TARGET_BASES_MULTIPLIER, PipelineError,
};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum AssemblyMode {
    /// Shasta on long reads only
    #[default]
    Long,
    /// Shasta scaffold passed to SPAdes as trusted contigs
    Hybrid,
    /// SKESA on short reads only
    Short,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "hybrid-asm-pipelines", version, about = "Base calling, read filtering, assembly and polishing over external tools")]
pub struct Arguments {

    #[arg(short = 'v', long = "verbose", action, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, help = "Threads handed to external tools. Defaults to, and is capped at, the detected core count.")]
    pub threads: Option<usize>,

    #[arg(long, global = true, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..), help = "Number of samples processed concurrently")]
    pub jobs: u16,

    #[arg(long, global = true, default_value_t = false, help = "Do not check that external tools are on PATH before starting")]
    pub skip_tool_check: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Base call raw signal with guppy and tidy its output per barcode
    Basecall(BasecallArgs),
    /// Trim short reads and length/quality filter long reads
    Filter(FilterArgs),
    /// Assemble each sample with Shasta, SPAdes or SKESA
    Assemble(AssembleArgs),
    /// Polish assemblies with medaka or iterative Pilon
    Polish(PolishArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Basecall(_) => "basecall",
            Command::Filter(_) => "filter",
            Command::Assemble(_) => "assemble",
            Command::Polish(_) => "polish",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BasecallArgs {
    #[arg(long = "fast5", help = "Input directory for guppy_basecaller")]
    pub fast5: PathBuf,

    #[arg(long = "output", help = "Directory for guppy_basecaller output")]
    pub output: PathBuf,

    #[arg(long)]
    pub flowcell: String,

    #[arg(long)]
    pub kit: String,

    #[arg(long)]
    pub barcode_kit: Option<String>,

    #[arg(long, help = "Two-column table (barcode, sample name), no header, used to rename barcode directories")]
    pub rename_table: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_GUPPY_MODEL_DIR)]
    pub model_dir: PathBuf,

    #[arg(long, help = "Skip the workflow lookup and use this model file")]
    pub model_file: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    pub chunk_size: u32,

    #[arg(long, default_value_t = 1000)]
    pub chunks_per_runner: u32,

    #[arg(long, default_value_t = 2)]
    pub gpu_runners_per_device: u32,

    #[arg(long, default_value_t = 0)]
    pub records_per_fastq: u32,

    #[arg(long, default_value_t = 4)]
    pub num_callers: u32,

    #[arg(long, default_value_t = 1)]
    pub hp_correct: u32,

    #[arg(long, default_value = "lambda_3.6kb.fasta")]
    pub calib_reference: String,

    #[arg(long, default_value = "cuda:0")]
    pub device: String,

    #[arg(long, default_value_t = false)]
    pub no_qscore_filtering: bool,

    #[arg(long, default_value_t = false)]
    pub no_compress: bool,

    #[arg(long, default_value_t = false)]
    pub no_recursive: bool,

    #[arg(long, default_value_t = false)]
    pub no_trim_barcodes: bool,

    #[arg(long, default_value_t = false)]
    pub no_calib_detect: bool,
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("reads").required(true).multiple(true).args(["long_reads", "short_reads"])))]
pub struct FilterArgs {
    #[arg(long, requires = "min_length")]
    pub long_reads: Option<PathBuf>,

    #[arg(long)]
    pub short_reads: Option<PathBuf>,

    #[arg(long, help = "filtlong --min_length")]
    pub min_length: Option<u64>,

    #[arg(long, help = "Expected genome size in bases; sets filtlong --target_bases")]
    pub genome_size: Option<u64>,

    #[arg(long, default_value_t = DEFAULT_TARGET_BASES_MULTIPLIER)]
    pub target_bases_multiplier: u64,

    #[arg(long, default_value_t = DEFAULT_KEEP_PERCENT)]
    pub keep_percent: u32,

    #[arg(long, default_value = DEFAULT_BBDUK)]
    pub bbduk: PathBuf,

    #[arg(long, default_value = DEFAULT_ADAPTERS)]
    pub adapters: PathBuf,

    #[arg(long, default_value_t = false, help = "Keep porechop output after filtering")]
    pub keep_intermediate: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AssembleArgs {
    #[arg(long, value_enum)]
    pub mode: AssemblyMode,

    #[arg(long)]
    pub long_reads: Option<PathBuf>,

    #[arg(long)]
    pub short_reads: Option<PathBuf>,

    #[arg(long, help = "Shasta --Reads.minReadLength")]
    pub min_read_length: Option<u64>,

    #[arg(long, help = "Parent directory for short-only sample directories. Defaults to <short-reads>/assemblies.")]
    pub out_dir: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_SHASTA)]
    pub shasta: PathBuf,

    #[arg(long, default_value = DEFAULT_SPADES)]
    pub spades: PathBuf,
}

impl AssembleArgs {
    /// Checks that the reads and parameters the selected mode needs were given.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let needs_long = matches!(self.mode, AssemblyMode::Long | AssemblyMode::Hybrid);
        let needs_short = matches!(self.mode, AssemblyMode::Hybrid | AssemblyMode::Short);

        if needs_long && self.long_reads.is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "--long-reads is required for --mode {:?}", self.mode
            )));
        }
        if needs_long && self.min_read_length.is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "--min-read-length is required for --mode {:?}", self.mode
            )));
        }
        if needs_short && self.short_reads.is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "--short-reads is required for --mode {:?}", self.mode
            )));
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct PolishArgs {
    #[arg(long, help = "Directory holding one subdirectory per assembled sample")]
    pub assemblies: PathBuf,

    #[arg(long, help = "Directory with paired short reads; required for Pilon polishing")]
    pub short_reads: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_MAX_POLISH_ITERATIONS, value_parser = parse_iterations)]
    pub max_iterations: usize,

    #[arg(long, default_value = DEFAULT_MEDAKA_MODEL)]
    pub medaka_model: String,

    #[arg(long, default_value = DEFAULT_PILON_JAR)]
    pub pilon_jar: PathBuf,

    #[arg(long, default_value_t = DEFAULT_JAVA_HEAP_FRACTION)]
    pub java_heap_fraction: f64,
}

fn parse_iterations(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{}", e))?;
    if n == 0 {
        return Err("at least one polishing iteration is required".to_string());
    }
    Ok(n)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_requires_a_read_directory() {
        let parsed = Arguments::try_parse_from(["hybrid-asm-pipelines", "filter"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_filter_long_reads_need_min_length() {
        let parsed = Arguments::try_parse_from(["hybrid-asm-pipelines", "filter", "--long-reads", "lr"]);
        assert!(parsed.is_err());

        let parsed = Arguments::try_parse_from([
            "hybrid-asm-pipelines", "filter", "--long-reads", "lr", "--min-length", "1000",
        ]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = Arguments::try_parse_from([
            "hybrid-asm-pipelines", "polish", "--assemblies", "asm", "--jobs", "4", "-v",
        ])
        .unwrap();
        assert_eq!(args.jobs, 4);
        assert!(args.verbose);
        match args.command {
            Command::Polish(p) => assert_eq!(p.max_iterations, DEFAULT_MAX_POLISH_ITERATIONS),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let parsed = Arguments::try_parse_from([
            "hybrid-asm-pipelines", "polish", "--assemblies", "asm", "--max-iterations", "0",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_assemble_mode_validation() {
        let args = Arguments::try_parse_from([
            "hybrid-asm-pipelines", "assemble", "--mode", "hybrid", "--long-reads", "lr", "--min-read-length", "500",
        ])
        .unwrap();
        let Command::Assemble(assemble) = args.command else { panic!("expected assemble") };
        assert!(matches!(assemble.validate(), Err(PipelineError::InvalidConfig(_))));

        let args = Arguments::try_parse_from([
            "hybrid-asm-pipelines", "assemble", "--mode", "short", "--short-reads", "sr",
        ])
        .unwrap();
        let Command::Assemble(assemble) = args.command else { panic!("expected assemble") };
        assert!(assemble.validate().is_ok());
    }
}
