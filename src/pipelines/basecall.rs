use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{info, warn};
use crate::cli::BasecallArgs;
use crate::config::defs::{PipelineError, RunConfig, GUPPY_FAIL_DIR, GUPPY_PASS_DIR, GUPPY_RUN_PREFIX, GUPPY_TAG};
use crate::utils::command::guppy;
use crate::utils::discovery::select_layout;
use crate::utils::reorganize::{apply_rename_table, concatenate_group, ConcatOutcome, RenameTable};
use crate::utils::streams::{capture_tool_stdout, run_tool, ToolCommand};


pub async fn run(run_config: Arc<RunConfig>, args: &BasecallArgs) -> Result<(), PipelineError> {
    println!("\n-------------\n Base calling\n-------------\n");

    let rename_table = match &args.rename_table {
        Some(path) => {
            let table = RenameTable::from_file(path)?;
            info!("Loaded {} rename entries from {}", table.len(), path.display());
            Some(table)
        }
        None => None,
    };

    let model_file = match &args.model_file {
        Some(model_file) => model_file.clone(),
        None => lookup_model_file(args).await?,
    };
    info!("Using model file {}", model_file.display());

    tokio::fs::create_dir_all(&args.output).await?;
    let guppy_cmd = ToolCommand::new(GUPPY_TAG, guppy::arg_generator(args, &model_file, run_config.threads))
        .in_dir(&run_config.cwd);
    run_tool(&guppy_cmd).await?;

    let outcomes = reorganize_output(&args.output, rename_table.as_ref()).await?;
    let written = outcomes.iter().filter(|o| matches!(o, ConcatOutcome::Written { .. })).count();
    info!("Base calling finished: {} concatenated read file(s)", written);
    Ok(())
}


async fn lookup_model_file(args: &BasecallArgs) -> Result<PathBuf, PipelineError> {
    let cmd = ToolCommand::new(GUPPY_TAG, guppy::print_workflows_args());
    let stdout = capture_tool_stdout(&cmd, None).await?;
    let workflows = String::from_utf8_lossy(&stdout);
    guppy::model_file_from_workflows(&workflows, &args.flowcell, &args.kit, &args.model_dir).ok_or_else(|| {
        PipelineError::InvalidConfig(format!(
            "no guppy workflow for flowcell {} and kit {}",
            args.flowcell, args.kit
        ))
    })
}


/// Renames and concatenates the `pass` and `fail` directories of a base-calling run.
///
/// # Arguments
///
/// * `output_dir` - Base caller output directory.
/// * `rename_table` - Optional barcode -> sample name mapping.
///
/// # Returns
/// Outcome of every concatenated group.
pub async fn reorganize_output(
    output_dir: &Path,
    rename_table: Option<&RenameTable>,
) -> Result<Vec<ConcatOutcome>, PipelineError> {
    let mut outcomes = Vec::new();

    for dir_name in [GUPPY_PASS_DIR, GUPPY_FAIL_DIR] {
        let dir = output_dir.join(dir_name);
        if !dir.is_dir() {
            warn!("{} not found, nothing to reorganize there", dir.display());
            continue;
        }
        if let Some(table) = rename_table {
            let report = apply_rename_table(&dir, table)?;
            info!("{}: renamed {} barcode director(ies)", dir.display(), report.renamed.len());
        }

        let layout = select_layout(&dir)?;
        for group in layout.groups(&dir)? {
            outcomes.push(concatenate_group(&group, layout.shape(), dir_name, GUPPY_RUN_PREFIX).await?);
        }
    }
    Ok(outcomes)
}
