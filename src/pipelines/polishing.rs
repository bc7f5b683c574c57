use std::collections::BTreeMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info, warn};
use crate::cli::PolishArgs;
use crate::config::defs::{
    BwaSubcommand, PipelineError, RunConfig, SamtoolsSubcommand, BWA_INDEX_EXTS, BWA_TAG, JAVA_TAG,
    MEDAKA_CONSENSUS, MEDAKA_DIR, MEDAKA_SCRATCH, MEDAKA_TAG, PILON_DIR, SAMTOOLS_TAG, SHASTA_ASSEMBLY,
    SHASTA_DIR, SKESA_CONTIGS, SKESA_DIR, SPADES_DIR,
};
use crate::pipelines::assembly::find_spades_contigs;
use crate::pipelines::{run_samples, SampleReport};
use crate::utils::command::{bwa, medaka, pilon, samtools};
use crate::utils::discovery::{discover_short_reads, sample_name};
use crate::utils::file::{file_name_str, is_fastq_name, list_files, list_subdirs, remove_scratch_files, require_artifact};
use crate::utils::sample::{Assembly, AssemblyKind, PolishOutcome, ReadPair, Reads, Sample, SampleStage};
use crate::utils::streams::{run_tool, PipelineSink, ProcessPipeline, ToolCommand};
use crate::utils::system::java_heap_gb;


/// Files one polishing round leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutput {
    pub polished: PathBuf,
    /// Change report; empty once polishing has converged
    pub changes: PathBuf,
}

/// One round of assembly correction.
pub trait PolishRound {
    fn polish(&mut self, iteration: usize, assembly: &Path) -> impl Future<Output = Result<RoundOutput, PipelineError>>;
}


/// Polishes repeatedly, feeding each round's output into the next, until a
/// round reports no changes or `max_rounds` rounds have run.
///
/// # Arguments
///
/// * `polisher` - Round implementation.
/// * `initial` - Assembly to start from.
/// * `max_rounds` - Iteration cap, at least 1.
///
/// # Returns
/// (final assembly, how the loop ended)
pub async fn iterate_polishing<P: PolishRound>(
    polisher: &mut P,
    initial: &Path,
    max_rounds: usize,
) -> Result<(PathBuf, PolishOutcome), PipelineError> {
    let mut current = initial.to_path_buf();

    for iteration in 0..max_rounds {
        let output = polisher.polish(iteration, &current).await.map_err(|e| match e {
            PipelineError::PolishingFailed { .. } => e,
            other => PipelineError::PolishingFailed { iteration, error: other.to_string() },
        })?;

        let changes = tokio::fs::metadata(&output.changes).await.map_err(|_| PipelineError::PolishingFailed {
            iteration,
            error: format!("change report {} was not written", output.changes.display()),
        })?;
        if !output.polished.exists() {
            return Err(PipelineError::PolishingFailed {
                iteration,
                error: format!("polished assembly {} was not written", output.polished.display()),
            });
        }
        current = output.polished;

        if changes.len() == 0 {
            info!("Polishing converged at iteration {}", iteration);
            return Ok((current, PolishOutcome::Converged { rounds: iteration + 1 }));
        }
        debug!("Iteration {} changed the assembly", iteration);
    }

    warn!("Polishing did not converge within {} round(s)", max_rounds);
    Ok((current, PolishOutcome::IterationCapReached { rounds: max_rounds }))
}


/// bwa + samtools + Pilon, one round per call.
#[derive(Debug, Clone)]
pub struct PilonRound {
    pub name: String,
    pub work_dir: PathBuf,
    pub reads: ReadPair,
    pub jar: PathBuf,
    pub heap_gb: u64,
    pub threads: usize,
    pub bwa: PathBuf,
    pub samtools: PathBuf,
    pub java: PathBuf,
}

impl PilonRound {
    fn samtools(&self, subcommand: SamtoolsSubcommand, fields: Vec<(String, Option<String>)>) -> ToolCommand {
        let config = samtools::SamtoolsConfig { subcommand, subcommand_fields: fields };
        ToolCommand::new(SAMTOOLS_TAG, samtools::arg_generator(&config)).with_program(self.samtools.clone())
    }

    fn bwa(&self, args: Vec<String>) -> ToolCommand {
        ToolCommand::new(BWA_TAG, args).with_program(self.bwa.clone())
    }
}

fn path_field(path: &Path) -> (String, Option<String>) {
    (path.to_string_lossy().to_string(), None)
}

impl PolishRound for PilonRound {
    async fn polish(&mut self, iteration: usize, assembly: &Path) -> Result<RoundOutput, PipelineError> {
        let pilon_dir = self.work_dir.join(PILON_DIR);
        let nd_bam = self.work_dir.join(format!("{}_nd_{}.bam", self.name, iteration));
        let final_bam = self.work_dir.join(format!("{}_final_{}.bam", self.name, iteration));
        let output_name = format!("{}_polished_{}", self.name, iteration);

        let index_args = bwa::arg_generator(BwaSubcommand::Index, assembly, None, self.threads);
        run_tool(&self.bwa(index_args)).await?;

        let mem_args = bwa::arg_generator(BwaSubcommand::Mem, assembly, Some(&self.reads), self.threads);
        ProcessPipeline::new()
            .stage(self.bwa(mem_args))
            .stage(self.samtools(
                SamtoolsSubcommand::View,
                vec![
                    ("-h".to_string(), None),
                    ("-b".to_string(), None),
                    ("-F".to_string(), Some("4".to_string())),
                    ("-".to_string(), None),
                ],
            ))
            .stage(self.samtools(
                SamtoolsSubcommand::Sort,
                vec![("-o".to_string(), Some(nd_bam.to_string_lossy().to_string())), ("-".to_string(), None)],
            ))
            .run(PipelineSink::Discard)
            .await?;
        require_artifact(&nd_bam)?;

        run_tool(&self.samtools(SamtoolsSubcommand::Rmdup, vec![path_field(&nd_bam), path_field(&final_bam)])).await?;
        require_artifact(&final_bam)?;
        run_tool(&self.samtools(SamtoolsSubcommand::Index, vec![path_field(&final_bam)])).await?;

        let config = pilon::PilonConfig {
            jar: self.jar.clone(),
            heap_gb: self.heap_gb,
            genome: assembly.to_path_buf(),
            frags: final_bam.clone(),
            outdir: pilon_dir.clone(),
            output: output_name.clone(),
            threads: self.threads,
        };
        run_tool(&ToolCommand::new(JAVA_TAG, pilon::arg_generator(&config)).with_program(self.java.clone())).await?;

        let mut scratch = vec![nd_bam, final_bam.clone(), PathBuf::from(format!("{}.bai", final_bam.display()))];
        scratch.extend(BWA_INDEX_EXTS.iter().map(|ext| PathBuf::from(format!("{}.{}", assembly.display(), ext))));
        remove_scratch_files(&scratch).await?;

        Ok(RoundOutput {
            polished: pilon_dir.join(format!("{}.fasta", output_name)),
            changes: pilon_dir.join(format!("{}.changes", output_name)),
        })
    }
}


/// Picks the assembly to polish from a sample directory, in priority order:
/// SPAdes (largest k), medaka consensus, Shasta, SKESA.
pub fn find_assembly(sample_dir: &Path) -> Option<Assembly> {
    if let Some(contigs) = find_spades_contigs(&sample_dir.join(SPADES_DIR)) {
        if contigs.exists() {
            return Some(Assembly { kind: AssemblyKind::Spades, fasta: contigs });
        }
    }
    let candidates = [
        (AssemblyKind::MedakaConsensus, sample_dir.join(MEDAKA_DIR).join(MEDAKA_CONSENSUS)),
        (AssemblyKind::Shasta, sample_dir.join(SHASTA_DIR).join(SHASTA_ASSEMBLY)),
        (AssemblyKind::Skesa, sample_dir.join(SKESA_DIR).join(SKESA_CONTIGS)),
    ];
    candidates
        .into_iter()
        .find(|(_, fasta)| fasta.exists())
        .map(|(kind, fasta)| Assembly { kind, fasta })
}


/// Samples ready for polishing plus directories rejected up front.
#[derive(Debug, Default)]
pub struct PolishTargets {
    pub samples: Vec<Sample>,
    pub rejected: Vec<SampleReport>,
}

/// Scans `assemblies` for one sample per subdirectory and attaches its reads:
/// long reads are the FASTQ inside the sample directory, short reads are
/// matched by exact sample name.
pub fn collect_samples(assemblies: &Path, short_dir: Option<&Path>) -> Result<PolishTargets, PipelineError> {
    let mut short: BTreeMap<String, ReadPair> = match short_dir {
        Some(dir) => {
            let found = discover_short_reads(dir)?;
            found.warn_unmatched("paired short reads");
            found.samples
        }
        None => BTreeMap::new(),
    };

    let mut targets = PolishTargets::default();
    for sample_dir in list_subdirs(assemblies)? {
        let Some(name) = file_name_str(&sample_dir).and_then(sample_name) else {
            continue;
        };
        let Some(assembly) = find_assembly(&sample_dir) else {
            warn!("No assembly found in {}, skipping", sample_dir.display());
            continue;
        };
        let long = list_files(&sample_dir)?
            .into_iter()
            .find(|p| file_name_str(p).is_some_and(is_fastq_name));

        match Reads::from_parts(long, short.remove(&name)) {
            Some(reads) => targets.samples.push(Sample::new(name, sample_dir, SampleStage::Assembled { assembly, reads })),
            None => targets.rejected.push(SampleReport {
                result: Err(PipelineError::MissingInput {
                    sample: name.clone(),
                    what: "reads to polish with".to_string(),
                }),
                name,
            }),
        }
    }
    Ok(targets)
}


/// Polishing parameters shared by every sample of a run.
#[derive(Debug, Clone)]
pub struct PolishSettings {
    pub max_iterations: usize,
    pub medaka_model: String,
    pub pilon_jar: PathBuf,
    pub heap_gb: u64,
    pub threads: usize,
    pub medaka: PathBuf,
    pub bwa: PathBuf,
    pub samtools: PathBuf,
    pub java: PathBuf,
}


pub fn required_tools(args: &PolishArgs) -> Vec<(&'static str, OsString)> {
    let mut tools = vec![(MEDAKA_TAG, OsString::from(MEDAKA_TAG))];
    if args.short_reads.is_some() {
        tools.push((BWA_TAG, OsString::from(BWA_TAG)));
        tools.push((SAMTOOLS_TAG, OsString::from(SAMTOOLS_TAG)));
        tools.push((JAVA_TAG, OsString::from(JAVA_TAG)));
    }
    tools
}


pub async fn run(run_config: Arc<RunConfig>, args: &PolishArgs) -> Result<(), PipelineError> {
    println!("\n-------------\n Polishing\n-------------\n");

    if !(args.java_heap_fraction > 0.0 && args.java_heap_fraction <= 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "--java-heap-fraction must be in (0, 1], got {}",
            args.java_heap_fraction
        )));
    }
    let targets = collect_samples(&args.assemblies, args.short_reads.as_deref())?;
    info!("Found {} sample(s) to polish", targets.samples.len());

    let settings = Arc::new(PolishSettings {
        max_iterations: args.max_iterations,
        medaka_model: args.medaka_model.clone(),
        pilon_jar: args.pilon_jar.clone(),
        heap_gb: java_heap_gb(run_config.total_ram, args.java_heap_fraction),
        threads: run_config.threads,
        medaka: PathBuf::from(MEDAKA_TAG),
        bwa: PathBuf::from(BWA_TAG),
        samtools: PathBuf::from(SAMTOOLS_TAG),
        java: PathBuf::from(JAVA_TAG),
    });
    debug!("Pilon java heap: {}G", settings.heap_gb);

    let mut summary = run_samples("Polishing", run_config.jobs, targets.samples, |sample| {
        let settings = settings.clone();
        async move { polish_sample(sample, &settings).await }
    })
    .await;
    summary.reports.extend(targets.rejected);
    summary.reports.sort_by(|a, b| a.name.cmp(&b.name));
    summary.log();
    summary.into_result().map(|_| ())
}


/// Shasta assemblies get one medaka consensus pass; SPAdes, SKESA and medaka
/// assemblies get iterative Pilon polishing with short reads.
pub async fn polish_sample(mut sample: Sample, settings: &PolishSettings) -> Result<Sample, PipelineError> {
    let (assembly, reads) = match &sample.stage {
        SampleStage::Assembled { assembly, reads } => (assembly.clone(), reads.clone()),
        other => {
            return Err(PipelineError::InvalidConfig(format!(
                "{} cannot be polished from the {} stage",
                sample.name,
                other.label()
            )));
        }
    };

    match (assembly.kind, reads.short()) {
        (AssemblyKind::Shasta, _) => {
            let long = reads.long().ok_or_else(|| PipelineError::MissingInput {
                sample: sample.name.clone(),
                what: "long reads for medaka".to_string(),
            })?;
            let consensus = run_medaka(&sample.work_dir, long, &assembly.fasta, settings).await?;
            sample.advance(SampleStage::Polished { consensus, outcome: PolishOutcome::Consensus });
        }
        (AssemblyKind::MedakaConsensus, None) => {
            info!("{}: medaka consensus present and no short reads, nothing to do", sample.name);
            sample.advance(SampleStage::Polished { consensus: assembly.fasta, outcome: PolishOutcome::Consensus });
        }
        (_, None) => {
            return Err(PipelineError::MissingInput {
                sample: sample.name.clone(),
                what: format!("paired short reads to polish the {} assembly", assembly.kind),
            });
        }
        (_, Some(pair)) => {
            tokio::fs::create_dir_all(sample.work_dir.join(PILON_DIR)).await?;
            let mut round = PilonRound {
                name: sample.name.clone(),
                work_dir: sample.work_dir.clone(),
                reads: pair.clone(),
                jar: settings.pilon_jar.clone(),
                heap_gb: settings.heap_gb,
                threads: settings.threads,
                bwa: settings.bwa.clone(),
                samtools: settings.samtools.clone(),
                java: settings.java.clone(),
            };
            sample.advance(SampleStage::Polishing { assembly: assembly.clone(), reads: reads.clone(), iteration: 0 });
            let (consensus, outcome) = iterate_polishing(&mut round, &assembly.fasta, settings.max_iterations).await?;
            sample.advance(SampleStage::Polished { consensus, outcome });
        }
    }
    Ok(sample)
}

async fn run_medaka(work_dir: &Path, long: &Path, assembly: &Path, settings: &PolishSettings) -> Result<PathBuf, PipelineError> {
    let output_dir = work_dir.join(MEDAKA_DIR);
    let args = medaka::arg_generator(long, assembly, &output_dir, &settings.medaka_model, settings.threads);
    run_tool(&ToolCommand::new(MEDAKA_TAG, args).with_program(settings.medaka.clone())).await?;

    let consensus = output_dir.join(MEDAKA_CONSENSUS);
    require_artifact(&consensus)?;
    let scratch: Vec<PathBuf> = MEDAKA_SCRATCH.iter().map(|f| output_dir.join(f)).collect();
    remove_scratch_files(&scratch).await?;
    Ok(consensus)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use crate::utils::test_tools::write_stand_in;

    /// Writes a polished assembly every round; the change report becomes
    /// empty at `empty_at`.
    struct MockRound {
        dir: TempDir,
        calls: Vec<usize>,
        empty_at: Option<usize>,
        skip_changes_at: Option<usize>,
    }

    impl MockRound {
        fn new(empty_at: Option<usize>) -> anyhow::Result<Self> {
            Ok(MockRound { dir: tempdir()?, calls: Vec::new(), empty_at, skip_changes_at: None })
        }
    }

    impl PolishRound for MockRound {
        async fn polish(&mut self, iteration: usize, assembly: &Path) -> Result<RoundOutput, PipelineError> {
            self.calls.push(iteration);
            let polished = self.dir.path().join(format!("s_polished_{}.fasta", iteration));
            let changes = self.dir.path().join(format!("s_polished_{}.changes", iteration));
            fs::write(&polished, format!(">from {}\nACGT\n", assembly.display()))?;
            if self.skip_changes_at != Some(iteration) {
                let body = if self.empty_at == Some(iteration) { "" } else { "ctg:10 ctg:10 A T\n" };
                fs::write(&changes, body)?;
            }
            Ok(RoundOutput { polished, changes })
        }
    }

    #[tokio::test]
    async fn test_stops_after_empty_change_report() -> anyhow::Result<()> {
        let mut round = MockRound::new(Some(2))?;
        let (polished, outcome) = iterate_polishing(&mut round, Path::new("draft.fasta"), 6).await?;
        assert_eq!(round.calls, vec![0, 1, 2]);
        assert_eq!(outcome, PolishOutcome::Converged { rounds: 3 });
        assert_eq!(polished, round.dir.path().join("s_polished_2.fasta"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cap_reached_is_reported() -> anyhow::Result<()> {
        let mut round = MockRound::new(None)?;
        let (_, outcome) = iterate_polishing(&mut round, Path::new("draft.fasta"), 6).await?;
        assert_eq!(round.calls.len(), 6);
        assert_eq!(outcome, PolishOutcome::IterationCapReached { rounds: 6 });

        let mut round = MockRound::new(None)?;
        let (_, outcome) = iterate_polishing(&mut round, Path::new("draft.fasta"), 2).await?;
        assert_eq!(round.calls, vec![0, 1]);
        assert_eq!(outcome, PolishOutcome::IterationCapReached { rounds: 2 });
        Ok(())
    }

    #[tokio::test]
    async fn test_each_round_polishes_previous_output() -> anyhow::Result<()> {
        let mut round = MockRound::new(Some(1))?;
        let (polished, _) = iterate_polishing(&mut round, Path::new("draft.fasta"), 6).await?;
        let first = round.dir.path().join("s_polished_0.fasta");
        assert_eq!(fs::read_to_string(polished)?, format!(">from {}\nACGT\n", first.display()));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_change_report_fails_that_iteration() -> anyhow::Result<()> {
        let mut round = MockRound::new(None)?;
        round.skip_changes_at = Some(1);
        let err = iterate_polishing(&mut round, Path::new("draft.fasta"), 6).await.unwrap_err();
        assert!(matches!(err, PipelineError::PolishingFailed { iteration: 1, .. }));
        assert_eq!(round.calls, vec![0, 1]);
        Ok(())
    }

    #[test]
    fn test_find_assembly_priority() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let shasta = dir.path().join(SHASTA_DIR);
        fs::create_dir_all(&shasta)?;
        fs::write(shasta.join(SHASTA_ASSEMBLY), b">a\nA\n")?;
        assert_eq!(find_assembly(dir.path()).map(|a| a.kind), Some(AssemblyKind::Shasta));

        let medaka = dir.path().join(MEDAKA_DIR);
        fs::create_dir_all(&medaka)?;
        fs::write(medaka.join(MEDAKA_CONSENSUS), b">a\nA\n")?;
        assert_eq!(find_assembly(dir.path()).map(|a| a.kind), Some(AssemblyKind::MedakaConsensus));

        let k55 = dir.path().join(SPADES_DIR).join("K55");
        fs::create_dir_all(&k55)?;
        assert_eq!(find_assembly(dir.path()).map(|a| a.kind), Some(AssemblyKind::MedakaConsensus));
        fs::write(k55.join("final_contigs.fasta"), b">a\nA\n")?;
        let found = find_assembly(dir.path()).ok_or_else(|| anyhow::anyhow!("no assembly"))?;
        assert_eq!(found.kind, AssemblyKind::Spades);
        assert_eq!(found.fasta, k55.join("final_contigs.fasta"));
        Ok(())
    }

    #[tokio::test]
    async fn test_collect_and_reject() -> anyhow::Result<()> {
        let assemblies = tempdir()?;
        let short = tempdir()?;

        let s1 = assemblies.path().join("filtered_s1");
        fs::create_dir_all(s1.join(SHASTA_DIR))?;
        fs::write(s1.join(SHASTA_DIR).join(SHASTA_ASSEMBLY), b">a\nA\n")?;
        fs::write(s1.join("filtered_s1.fastq.gz"), b"")?;

        let s2 = assemblies.path().join("s2");
        fs::create_dir_all(s2.join(SKESA_DIR))?;
        fs::write(s2.join(SKESA_DIR).join(SKESA_CONTIGS), b">a\nA\n")?;

        fs::create_dir_all(assemblies.path().join("empty"))?;

        let targets = collect_samples(assemblies.path(), Some(short.path()))?;
        assert_eq!(targets.samples.len(), 1);
        assert_eq!(targets.samples[0].name, "s1");
        assert_eq!(targets.rejected.len(), 1);
        assert_eq!(targets.rejected[0].name, "s2");

        // skesa needs short reads for Pilon
        let sample = Sample::new(
            "s2",
            s2.clone(),
            SampleStage::Assembled {
                assembly: Assembly { kind: AssemblyKind::Skesa, fasta: s2.join(SKESA_DIR).join(SKESA_CONTIGS) },
                reads: Reads::Long(s2.join("s2.fastq")),
            },
        );
        let err = polish_sample(sample, &settings()).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
        Ok(())
    }

    fn settings() -> PolishSettings {
        PolishSettings {
            max_iterations: 6,
            medaka_model: "m".to_string(),
            pilon_jar: PathBuf::from("pilon.jar"),
            heap_gb: 1,
            threads: 1,
            medaka: PathBuf::from(MEDAKA_TAG),
            bwa: PathBuf::from(BWA_TAG),
            samtools: PathBuf::from(SAMTOOLS_TAG),
            java: PathBuf::from(JAVA_TAG),
        }
    }

    const BWA_STAND_IN: &str = r#"if [ "$1" = "index" ]; then
  for ext in amb ann pac bwt sa; do : > "$2.$ext"; done
else
  printf 'aligned\n'
fi"#;

    const SAMTOOLS_STAND_IN: &str = r#"cmd="$1"; shift
case "$cmd" in
  view) cat ;;
  sort) cat > "$2" ;;
  rmdup) cp "$1" "$2" ;;
  index) : > "$1.bai" ;;
esac"#;

    const PILON_STAND_IN: &str = r#"while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2" ;;
    --output) output="$2" ;;
  esac
  shift
done
mkdir -p "$outdir"
printf '>c\nACGT\n' > "$outdir/$output.fasta"
: > "$outdir/$output.changes""#;

    fn pilon_round(tools: &Path, work_dir: &Path, java_body: &str) -> anyhow::Result<PilonRound> {
        Ok(PilonRound {
            name: "s1".to_string(),
            work_dir: work_dir.to_path_buf(),
            reads: ReadPair { r1: work_dir.join("s1_R1.fq"), r2: work_dir.join("s1_R2.fq") },
            jar: PathBuf::from("pilon.jar"),
            heap_gb: 1,
            threads: 1,
            bwa: write_stand_in(tools, "bwa", BWA_STAND_IN)?,
            samtools: write_stand_in(tools, "samtools", SAMTOOLS_STAND_IN)?,
            java: write_stand_in(tools, "java", java_body)?,
        })
    }

    fn round_scratch(work_dir: &Path, assembly: &Path) -> Vec<PathBuf> {
        let mut scratch = vec![
            work_dir.join("s1_nd_0.bam"),
            work_dir.join("s1_final_0.bam"),
            work_dir.join("s1_final_0.bam.bai"),
        ];
        scratch.extend(BWA_INDEX_EXTS.iter().map(|ext| PathBuf::from(format!("{}.{}", assembly.display(), ext))));
        scratch
    }

    #[tokio::test]
    async fn test_pilon_round_removes_alignments_after_success() -> anyhow::Result<()> {
        let tools = tempdir()?;
        let dir = tempdir()?;
        let assembly = dir.path().join("skesa.fasta");
        fs::write(&assembly, b">c\nACGT\n")?;

        let mut round = pilon_round(tools.path(), dir.path(), PILON_STAND_IN)?;
        let output = round.polish(0, &assembly).await?;
        assert_eq!(output.polished, dir.path().join(PILON_DIR).join("s1_polished_0.fasta"));
        assert!(output.polished.exists());
        assert_eq!(fs::metadata(&output.changes)?.len(), 0);
        for path in round_scratch(dir.path(), &assembly) {
            assert!(!path.exists(), "{} should be removed", path.display());
        }
        assert!(assembly.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_pilon_keeps_alignments() -> anyhow::Result<()> {
        let tools = tempdir()?;
        let dir = tempdir()?;
        let assembly = dir.path().join("skesa.fasta");
        fs::write(&assembly, b">c\nACGT\n")?;

        let mut round = pilon_round(tools.path(), dir.path(), "exit 1")?;
        let err = round.polish(0, &assembly).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailed { ref tool, code: Some(1) } if tool == JAVA_TAG));
        for path in round_scratch(dir.path(), &assembly) {
            assert!(path.exists(), "{} should be kept", path.display());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_medaka_consensus_drops_scratch() -> anyhow::Result<()> {
        let tools = tempdir()?;
        let dir = tempdir()?;
        let shasta = dir.path().join(SHASTA_DIR);
        fs::create_dir_all(&shasta)?;
        fs::write(shasta.join(SHASTA_ASSEMBLY), b">c\nACGT\n")?;
        fs::write(dir.path().join("s1.fastq"), b"@r\nACGT\n+\nIIII\n")?;

        let mut settings = settings();
        settings.medaka = write_stand_in(
            tools.path(),
            "medaka_consensus",
            r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
mkdir -p "$out"
printf '>c\nACGT\n' > "$out/consensus.fasta"
: > "$out/calls_to_draft.bam"
: > "$out/consensus_probs.hdf""#,
        )?;
        let sample = Sample::new(
            "s1",
            dir.path(),
            SampleStage::Assembled {
                assembly: Assembly { kind: AssemblyKind::Shasta, fasta: shasta.join(SHASTA_ASSEMBLY) },
                reads: Reads::Long(dir.path().join("s1.fastq")),
            },
        );
        let polished = polish_sample(sample, &settings).await?;
        let medaka_dir = dir.path().join(MEDAKA_DIR);
        assert!(matches!(
            polished.stage,
            SampleStage::Polished { ref consensus, outcome: PolishOutcome::Consensus } if *consensus == medaka_dir.join(MEDAKA_CONSENSUS)
        ));
        for scratch in MEDAKA_SCRATCH {
            assert!(!medaka_dir.join(scratch).exists());
        }
        Ok(())
    }
}
