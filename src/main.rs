use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{debug, error, info, warn, LevelFilter};

use hybrid_asm_pipelines::cli::{parse, Command};
use hybrid_asm_pipelines::config::defs::{PipelineError, RunConfig, GUPPY_TAG};
use hybrid_asm_pipelines::pipelines::{assembly, basecall, filtering, polishing};
use hybrid_asm_pipelines::utils::command::check_tools;
use hybrid_asm_pipelines::utils::file::resolve_path;
use hybrid_asm_pipelines::utils::system::{detect_cores, detect_total_ram, effective_threads};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let mut args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n Hybrid assembly pipelines\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);
    resolve_command_paths(&mut args.command, &dir);

    let cores = detect_cores();
    let threads = effective_threads(args.threads, cores);
    debug!("Detected {} cores; using {} threads per tool", cores, threads);

    let total_ram = match detect_total_ram() {
        Ok(ram) => ram,
        Err(e) => {
            warn!("{}; Java heap falls back to the minimum", e);
            0
        }
    };
    debug!("Total RAM: {} bytes (~{} GiB)", total_ram, total_ram / 1_073_741_824);

    let run_config = Arc::new(RunConfig {
        cwd: dir,
        threads,
        jobs: args.jobs as usize,
        total_ram,
        skip_tool_check: args.skip_tool_check,
    });

    let stage = args.command.name();
    if let Err(e) = run_stage(run_config, &args.command).await {
        error!("Pipeline failed: {} ({}) at {} milliseconds.", e, stage, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn run_stage(run_config: Arc<RunConfig>, command: &Command) -> Result<(), PipelineError> {
    if run_config.skip_tool_check {
        debug!("Skipping external tool check");
    } else {
        let tools = required_tools(command);
        let tools: Vec<(&str, &std::ffi::OsStr)> = tools.iter().map(|(tag, p)| (*tag, p.as_os_str())).collect();
        check_tools(&tools)?;
    }

    match command {
        Command::Basecall(args) => basecall::run(run_config, args).await,
        Command::Filter(args) => filtering::run(run_config, args).await,
        Command::Assemble(args) => assembly::run(run_config, args).await,
        Command::Polish(args) => polishing::run(run_config, args).await,
    }
}


fn required_tools(command: &Command) -> Vec<(&'static str, OsString)> {
    match command {
        Command::Basecall(_) => vec![(GUPPY_TAG, OsString::from(GUPPY_TAG))],
        Command::Filter(args) => filtering::required_tools(args),
        Command::Assemble(args) => assembly::required_tools(args),
        Command::Polish(args) => polishing::required_tools(args),
    }
}


/// Anchors every user path to the launch directory. Program names without a
/// directory part are left for PATH lookup.
fn resolve_command_paths(command: &mut Command, cwd: &Path) {
    let resolve = |p: &mut PathBuf| *p = resolve_path(p, cwd);
    let resolve_program = |p: &mut PathBuf| {
        if p.components().count() > 1 {
            *p = resolve_path(p, cwd);
        }
    };

    match command {
        Command::Basecall(args) => {
            resolve(&mut args.fast5);
            resolve(&mut args.output);
            resolve(&mut args.model_dir);
            args.rename_table.iter_mut().for_each(resolve);
            args.model_file.iter_mut().for_each(resolve);
        }
        Command::Filter(args) => {
            args.long_reads.iter_mut().for_each(resolve);
            args.short_reads.iter_mut().for_each(resolve);
            resolve(&mut args.adapters);
            resolve_program(&mut args.bbduk);
        }
        Command::Assemble(args) => {
            args.long_reads.iter_mut().for_each(resolve);
            args.short_reads.iter_mut().for_each(resolve);
            args.out_dir.iter_mut().for_each(resolve);
            resolve_program(&mut args.shasta);
            resolve_program(&mut args.spades);
        }
        Command::Polish(args) => {
            resolve(&mut args.assemblies);
            args.short_reads.iter_mut().for_each(resolve);
            resolve(&mut args.pilon_jar);
        }
    }
}
