// src/utils/sample.rs: per-sample records and the stage each one has reached
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    pub r1: PathBuf,
    pub r2: PathBuf,
}

/// Reads available for a sample. Only combinations that can actually be
/// processed are representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reads {
    Long(PathBuf),
    Short(ReadPair),
    Hybrid { long: PathBuf, short: ReadPair },
}

impl Reads {
    pub fn from_parts(long: Option<PathBuf>, short: Option<ReadPair>) -> Option<Reads> {
        match (long, short) {
            (Some(long), Some(short)) => Some(Reads::Hybrid { long, short }),
            (Some(long), None) => Some(Reads::Long(long)),
            (None, Some(short)) => Some(Reads::Short(short)),
            (None, None) => None,
        }
    }

    pub fn long(&self) -> Option<&Path> {
        match self {
            Reads::Long(long) | Reads::Hybrid { long, .. } => Some(long),
            Reads::Short(_) => None,
        }
    }

    pub fn short(&self) -> Option<&ReadPair> {
        match self {
            Reads::Short(short) | Reads::Hybrid { short, .. } => Some(short),
            Reads::Long(_) => None,
        }
    }

    /// Same reads with the long read file at a new location.
    pub fn with_long(self, moved: PathBuf) -> Reads {
        match self {
            Reads::Long(_) => Reads::Long(moved),
            Reads::Hybrid { short, .. } => Reads::Hybrid { long: moved, short },
            Reads::Short(short) => Reads::Short(short),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyKind {
    Shasta,
    Spades,
    Skesa,
    MedakaConsensus,
}

impl fmt::Display for AssemblyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssemblyKind::Shasta => "shasta",
            AssemblyKind::Spades => "spades",
            AssemblyKind::Skesa => "skesa",
            AssemblyKind::MedakaConsensus => "medaka",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub kind: AssemblyKind,
    pub fasta: PathBuf,
}

/// How a polishing run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolishOutcome {
    /// Single medaka consensus pass
    Consensus,
    /// The change report of the last round was empty
    Converged { rounds: usize },
    /// Every allowed round still produced changes
    IterationCapReached { rounds: usize },
}

impl fmt::Display for PolishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolishOutcome::Consensus => write!(f, "medaka consensus"),
            PolishOutcome::Converged { rounds } => write!(f, "converged after {} round(s)", rounds),
            PolishOutcome::IterationCapReached { rounds } => {
                write!(f, "not converged, stopped at the {}-round cap", rounds)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleStage {
    Unassembled(Reads),
    ShortTrimmed { trimmed: ReadPair, long: Option<PathBuf> },
    LongFiltered { filtered: PathBuf, trimmed: Option<ReadPair> },
    Assembled { assembly: Assembly, reads: Reads },
    Polishing { assembly: Assembly, reads: Reads, iteration: usize },
    Polished { consensus: PathBuf, outcome: PolishOutcome },
}

impl SampleStage {
    pub fn label(&self) -> &'static str {
        match self {
            SampleStage::Unassembled(_) => "unassembled",
            SampleStage::ShortTrimmed { .. } => "short-trimmed",
            SampleStage::LongFiltered { .. } => "long-filtered",
            SampleStage::Assembled { .. } => "assembled",
            SampleStage::Polishing { .. } => "polishing",
            SampleStage::Polished { .. } => "polished",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub work_dir: PathBuf,
    pub stage: SampleStage,
}

impl Sample {
    pub fn new(name: impl Into<String>, work_dir: impl Into<PathBuf>, stage: SampleStage) -> Self {
        Sample { name: name.into(), work_dir: work_dir.into(), stage }
    }

    pub fn advance(&mut self, stage: SampleStage) {
        log::debug!("{}: {} -> {}", self.name, self.stage.label(), stage.label());
        self.stage = stage;
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            SampleStage::Polished { consensus, outcome } => {
                write!(f, "{} polished ({}): {}", self.name, outcome, consensus.display())
            }
            SampleStage::Assembled { assembly, .. } => {
                write!(f, "{} assembled with {}: {}", self.name, assembly.kind, assembly.fasta.display())
            }
            SampleStage::LongFiltered { filtered, .. } => {
                write!(f, "{} long reads filtered: {}", self.name, filtered.display())
            }
            stage => write!(f, "{} {}", self.name, stage.label()),
        }
    }
}
