use std::path::PathBuf;
use thiserror::Error;

// External software
pub const GUPPY_TAG: &str = "guppy_basecaller";
pub const PORECHOP_TAG: &str = "porechop";
pub const FILTLONG_TAG: &str = "filtlong";
pub const GZIP_TAG: &str = "gzip";
pub const BBDUK_TAG: &str = "bbduk.sh";
pub const SHASTA_TAG: &str = "shasta";
pub const SPADES_TAG: &str = "spades.py";
pub const SKESA_TAG: &str = "skesa";
pub const MEDAKA_TAG: &str = "medaka_consensus";
pub const BWA_TAG: &str = "bwa";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const JAVA_TAG: &str = "java";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    View,
    Sort,
    Rmdup,
    Index,
}

impl SamtoolsSubcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamtoolsSubcommand::View => "view",
            SamtoolsSubcommand::Sort => "sort",
            SamtoolsSubcommand::Rmdup => "rmdup",
            SamtoolsSubcommand::Index => "index",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BwaSubcommand {
    Index,
    Mem,
}

// Stage prefixes
pub const GUPPY_RUN_PREFIX: &str = "fastq_runid";
pub const FILTERED_PREFIX: &str = "filtered_";
pub const TRIMMED_PREFIX: &str = "trimmed_";
pub const PORE_CHOPPED_PREFIX: &str = "pore_chopped_";
pub const STAGE_PREFIXES: &[&str] = &[FILTERED_PREFIX, TRIMMED_PREFIX, PORE_CHOPPED_PREFIX];

// Static Filenames
pub const GUPPY_PASS_DIR: &str = "pass";
pub const GUPPY_FAIL_DIR: &str = "fail";
pub const TRIMMED_READS_DIR: &str = "trimmed_reads";
pub const SHASTA_DIR: &str = "ShastaRun";
pub const SHASTA_ASSEMBLY: &str = "Assembly.fasta";
pub const SPADES_DIR: &str = "spades";
pub const SPADES_CONTIGS: &str = "final_contigs.fasta";
pub const SKESA_DIR: &str = "skesa";
pub const SKESA_CONTIGS: &str = "skesa.fasta";
pub const MEDAKA_DIR: &str = "medaka_consensus";
pub const MEDAKA_CONSENSUS: &str = "consensus.fasta";
pub const MEDAKA_SCRATCH: &[&str] = &["calls_to_draft.bam", "calls_to_draft.bam.bai", "consensus_probs.hdf"];
pub const PILON_DIR: &str = "pilon";
pub const BWA_INDEX_EXTS: &[&str] = &["amb", "ann", "pac", "bwt", "sa"];
pub const DEFAULT_ASSEMBLIES_DIR: &str = "assemblies";

// Static Parameters
pub const DEFAULT_MAX_POLISH_ITERATIONS: usize = 6;
pub const DEFAULT_TARGET_BASES_MULTIPLIER: u64 = 100;
pub const DEFAULT_KEEP_PERCENT: u32 = 90;
pub const DEFAULT_JAVA_HEAP_FRACTION: f64 = 0.65;
pub const DEFAULT_MEDAKA_MODEL: &str = "r941_min_high_g344";
pub const DEFAULT_PILON_JAR: &str = "pilon-1.23.jar";
pub const DEFAULT_BBDUK: &str = "/home/bioinfo/bbmap/bbduk.sh";
pub const DEFAULT_ADAPTERS: &str = "/home/bioinfo/bbmap/resources/adapters.fa";
pub const DEFAULT_SPADES: &str = "/home/bioinfo/SPAdes-3.12.0-Linux/bin/spades.py";
pub const DEFAULT_SHASTA: &str = "shasta-Linux-0.1.0";
pub const DEFAULT_GUPPY_MODEL_DIR: &str = "/home/bioinfo/prog/ont-guppy/data";

pub const FASTA_EXTS: &[&'static str] = &["fasta", "fa", "fna"];
pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sample name '{name}' derived from both {first:?} and {second:?}")]
    SampleCollision {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to spawn {tool}: {error}")]
    ToolSpawn { tool: String, error: String },

    #[error("external tool failed: {tool}, exit={}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ToolFailed { tool: String, code: Option<i32> },

    #[error("Expected artifact is missing: {0:?}")]
    MissingArtifact(PathBuf),

    #[error("Sample {sample} is missing {what}")]
    MissingInput { sample: String, what: String },

    #[error("Polishing failed at iteration {iteration}: {error}")]
    PolishingFailed { iteration: usize, error: String },

    #[error("{failed} of {total} samples failed")]
    SamplesFailed { failed: usize, total: usize },

    #[error("IO error: {0}")]
    IOError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}


/// Run-wide state shared by every stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub cwd: PathBuf,
    pub threads: usize,
    pub jobs: usize,
    pub total_ram: u64,
    pub skip_tool_check: bool,
}

impl RunConfig {
    /// Minimal config for library callers and tests, no system probing.
    pub fn new(cwd: PathBuf, threads: usize) -> Self {
        RunConfig {
            cwd,
            threads: threads.max(1),
            jobs: 1,
            total_ram: 0,
            skip_tool_check: true,
        }
    }
}
