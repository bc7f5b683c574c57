use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Result;
use tempfile::tempdir;

use hybrid_asm_pipelines::cli::PolishArgs;
use hybrid_asm_pipelines::config::defs::{PipelineError, RunConfig, GUPPY_RUN_PREFIX};
use hybrid_asm_pipelines::pipelines::basecall::reorganize_output;
use hybrid_asm_pipelines::pipelines::filtering::collect_samples;
use hybrid_asm_pipelines::pipelines::polishing;
use hybrid_asm_pipelines::utils::discovery::{discover_short_reads, DirectoryShape, FileGroup};
use hybrid_asm_pipelines::utils::file::list_files;
use hybrid_asm_pipelines::utils::reorganize::{apply_rename_table, concatenate_group, ConcatOutcome, RenameTable};
use hybrid_asm_pipelines::utils::sample::{Reads, SampleStage};
use hybrid_asm_pipelines::utils::streams::{capture_tool_stdout, PipelineSink, ProcessPipeline, ToolCommand};


fn sh(script: &str) -> ToolCommand {
    ToolCommand::new("sh", vec!["-c".to_string(), script.to_string()])
}

fn subdir_names(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}


#[test]
fn test_short_read_discovery_single_sample() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("sampleA_R1.fastq.gz"), b"")?;
    fs::write(dir.path().join("sampleA_R2.fastq.gz"), b"")?;

    let found = discover_short_reads(dir.path())?;
    assert_eq!(found.samples.len(), 1);
    assert!(found.unmatched.is_empty());
    let pair = &found.samples["sampleA"];
    assert_eq!(pair.r1, dir.path().join("sampleA_R1.fastq.gz"));
    assert_eq!(pair.r2, dir.path().join("sampleA_R2.fastq.gz"));

    let samples = collect_samples(None, Some(dir.path()))?;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].name, "sampleA");
    match &samples[0].stage {
        SampleStage::Unassembled(reads) => {
            assert!(matches!(reads, Reads::Short(_)));
            assert_eq!(reads.long(), None);
        }
        other => panic!("unexpected stage {:?}", other),
    }
    Ok(())
}


#[test]
fn test_rename_table_applied_twice() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir(dir.path().join("barcode01"))?;
    fs::create_dir(dir.path().join("barcode02"))?;
    let table_path = dir.path().join("names.csv");
    fs::write(&table_path, "barcode01,patient5\nbarcode02,patient6\n")?;
    let table = RenameTable::from_file(&table_path)?;

    let first = apply_rename_table(dir.path(), &table)?;
    assert_eq!(first.renamed.len(), 2);
    assert_eq!(subdir_names(dir.path())?, vec!["patient5", "patient6"]);

    let second = apply_rename_table(dir.path(), &table)?;
    assert!(second.renamed.is_empty());
    assert_eq!(second.skipped, vec!["patient5", "patient6"]);
    assert_eq!(subdir_names(dir.path())?, vec!["patient5", "patient6"]);
    Ok(())
}


#[tokio::test]
async fn test_empty_concatenation_keeps_sources() -> Result<()> {
    let dir = tempdir()?;
    let sub = dir.path().join("barcode03");
    fs::create_dir(&sub)?;
    fs::write(sub.join("fastq_runid_0.fastq.gz"), b"")?;
    fs::write(sub.join("fastq_runid_1.fastq.gz"), b"")?;

    let group = FileGroup { dir: sub.clone(), files: list_files(&sub)? };
    let outcome = concatenate_group(&group, DirectoryShape::Nested, "pass", GUPPY_RUN_PREFIX).await?;
    assert_eq!(outcome, ConcatOutcome::Empty { dir: sub.clone() });
    assert!(!sub.join("pass_barcode03.fastq.gz").exists());
    assert!(sub.join("fastq_runid_0.fastq.gz").exists());
    assert!(sub.join("fastq_runid_1.fastq.gz").exists());
    Ok(())
}


#[tokio::test]
async fn test_basecall_reorganization_is_repeatable() -> Result<()> {
    let dir = tempdir()?;
    let pass = dir.path().join("pass");
    for barcode in ["barcode01", "barcode02"] {
        fs::create_dir_all(pass.join(barcode))?;
        fs::write(pass.join(barcode).join("fastq_runid_x_0.fastq"), format!("@{}\nA\n+\nI\n", barcode))?;
    }
    let table = RenameTable::parse("barcode01\tpatient5\nbarcode02\tpatient6\n")?;

    let outcomes = reorganize_output(dir.path(), Some(&table)).await?;
    assert_eq!(outcomes.iter().filter(|o| matches!(o, ConcatOutcome::Written { .. })).count(), 2);
    assert_eq!(fs::read_to_string(pass.join("patient6").join("pass_patient6.fastq"))?, "@barcode02\nA\n+\nI\n");

    let again = reorganize_output(dir.path(), Some(&table)).await?;
    assert!(again.iter().all(|o| matches!(o, ConcatOutcome::NoSources { .. })));
    assert_eq!(fs::read_to_string(pass.join("patient6").join("pass_patient6.fastq"))?, "@barcode02\nA\n+\nI\n");
    Ok(())
}


#[tokio::test]
async fn test_piped_stages_match_manual_composition() -> Result<()> {
    let producer = sh("printf 'keep 1\\ndrop 2\\nkeep 3\\n'");
    let filter = ToolCommand::new("grep", vec!["keep".to_string()]);
    let compress = ToolCommand::new("gzip", vec!["-c".to_string(), "-n".to_string()]);

    let dir = tempdir()?;
    let piped = dir.path().join("piped.gz");
    ProcessPipeline::new()
        .stage(producer.clone())
        .stage(filter.clone())
        .stage(compress.clone())
        .run(PipelineSink::File(piped.clone()))
        .await?;

    let produced = capture_tool_stdout(&producer, None).await?;
    let filtered = capture_tool_stdout(&filter, Some(produced)).await?;
    assert_eq!(filtered, b"keep 1\nkeep 3\n");
    let compressed = capture_tool_stdout(&compress, Some(filtered)).await?;

    assert_eq!(fs::read(&piped)?, compressed);
    Ok(())
}


#[tokio::test]
async fn test_failing_middle_stage_is_named() -> Result<()> {
    let result = ProcessPipeline::new()
        .stage(sh("printf 'a\\nb\\n'"))
        .stage(ToolCommand::new("grep", vec!["zzz".to_string()]))
        .stage(ToolCommand::new("cat", vec![]))
        .run(PipelineSink::Capture)
        .await;
    match result {
        Err(PipelineError::ToolFailed { tool, code }) => {
            assert_eq!(tool, "grep");
            assert_eq!(code, Some(1));
        }
        other => panic!("expected grep to fail, got {:?}", other),
    }
    Ok(())
}


#[tokio::test]
async fn test_polish_run_collects_sample_failures() -> Result<()> {
    let assemblies = tempdir()?;
    let skesa = assemblies.path().join("s7").join("skesa");
    fs::create_dir_all(&skesa)?;
    fs::write(skesa.join("skesa.fasta"), b">c\nACGT\n")?;

    let args = PolishArgs {
        assemblies: assemblies.path().to_path_buf(),
        short_reads: None,
        max_iterations: 6,
        medaka_model: "r941_min_high_g344".to_string(),
        pilon_jar: PathBuf::from("pilon-1.23.jar"),
        java_heap_fraction: 0.65,
    };
    let run_config = Arc::new(RunConfig::new(assemblies.path().to_path_buf(), 1));
    let result = polishing::run(run_config, &args).await;
    assert!(matches!(result, Err(PipelineError::SamplesFailed { failed: 1, total: 1 })));
    Ok(())
}
