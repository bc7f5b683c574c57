/// Functions and structs for creating command-line arguments of the external tools

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use log::debug;
use crate::config::defs::PipelineError;


pub mod guppy {
    use std::path::{Path, PathBuf};
    use crate::cli::BasecallArgs;

    pub fn print_workflows_args() -> Vec<String> {
        vec!["--print_workflows".to_string()]
    }

    /// Finds the model for a flowcell/kit pair in `--print_workflows` output.
    /// The row's last column is e.g. `dna_r9.4.1_450bps_hac`, giving
    /// `<model_dir>/template_r9.4.1_450bps_hac.jsn`.
    pub fn model_file_from_workflows(
        workflows: &str,
        flowcell: &str,
        kit: &str,
        model_dir: &Path,
    ) -> Option<PathBuf> {
        workflows.lines().find_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 3 || columns[0] != flowcell || columns[1] != kit {
                return None;
            }
            let config = columns[columns.len() - 1];
            let suffix = config.rsplit("dna").next()?;
            Some(model_dir.join(format!("template{}.jsn", suffix)))
        })
    }

    pub fn arg_generator(args: &BasecallArgs, model_file: &Path, threads: usize) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-i".to_string());
        args_vec.push(args.fast5.to_string_lossy().to_string());
        args_vec.push("-s".to_string());
        args_vec.push(args.output.to_string_lossy().to_string());
        args_vec.push("--flowcell".to_string());
        args_vec.push(args.flowcell.clone());
        args_vec.push("--kit".to_string());
        args_vec.push(args.kit.clone());
        args_vec.push("--records_per_fastq".to_string());
        args_vec.push(args.records_per_fastq.to_string());
        args_vec.push("--num_barcode_threads".to_string());
        args_vec.push(threads.to_string());
        args_vec.push("--calib_reference".to_string());
        args_vec.push(args.calib_reference.clone());
        args_vec.push("--model_file".to_string());
        args_vec.push(model_file.to_string_lossy().to_string());
        args_vec.push("--hp_correct".to_string());
        args_vec.push(args.hp_correct.to_string());
        args_vec.push("--num_caller".to_string());
        args_vec.push(args.num_callers.to_string());
        args_vec.push("--gpu_runners_per_device".to_string());
        args_vec.push(args.gpu_runners_per_device.to_string());
        args_vec.push("--chunk_size".to_string());
        args_vec.push(args.chunk_size.to_string());
        args_vec.push("--chunks_per_runner".to_string());
        args_vec.push(args.chunks_per_runner.to_string());
        args_vec.push("--device".to_string());
        args_vec.push(args.device.clone());

        if let Some(barcode_kit) = &args.barcode_kit {
            args_vec.push("--barcode_kits".to_string());
            args_vec.push(barcode_kit.clone());
        }
        if !args.no_qscore_filtering {
            args_vec.push("--qscore_filtering".to_string());
        }
        if !args.no_compress {
            args_vec.push("--compress_fastq".to_string());
        }
        if !args.no_recursive {
            args_vec.push("--recursive".to_string());
        }
        if !args.no_trim_barcodes {
            args_vec.push("--trim_barcode".to_string());
        }
        if !args.no_calib_detect {
            args_vec.push("--calib_detect".to_string());
        }
        args_vec
    }
}

pub mod porechop {
    use std::path::Path;

    pub fn arg_generator(input: &Path, output: &Path, threads: usize) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
            "--threads".to_string(),
            threads.to_string(),
        ]
    }
}

pub mod filtlong {
    use std::path::PathBuf;
    use crate::utils::sample::ReadPair;

    #[derive(Debug, Clone)]
    pub struct FiltlongConfig {
        pub input: PathBuf,
        pub min_length: u64,
        pub keep_percent: u32,
        pub target_bases: Option<u64>,
        pub reference: Option<ReadPair>,
    }

    pub fn arg_generator(config: &FiltlongConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--min_length".to_string());
        args_vec.push(config.min_length.to_string());
        args_vec.push("--keep_percent".to_string());
        args_vec.push(config.keep_percent.to_string());

        if let Some(pair) = &config.reference {
            args_vec.push("-1".to_string());
            args_vec.push(pair.r1.to_string_lossy().to_string());
            args_vec.push("-2".to_string());
            args_vec.push(pair.r2.to_string_lossy().to_string());
        }
        if let Some(target_bases) = config.target_bases {
            args_vec.push("--target_bases".to_string());
            args_vec.push(target_bases.to_string());
        }
        args_vec.push(config.input.to_string_lossy().to_string());
        args_vec
    }
}

pub mod gzip {
    pub fn arg_generator() -> Vec<String> {
        vec!["-c".to_string()]
    }
}

pub mod bbduk {
    use std::path::Path;
    use crate::utils::sample::ReadPair;

    pub fn arg_generator(input: &ReadPair, output: &ReadPair, adapters: &Path, threads: usize) -> Vec<String> {
        vec![
            format!("in={}", input.r1.display()),
            format!("in2={}", input.r2.display()),
            format!("ref={}", adapters.display()),
            "ktrim=r".to_string(),
            "k=23".to_string(),
            "mink=11".to_string(),
            "qtrim=lr".to_string(),
            "trimq=10".to_string(),
            "hdist=1".to_string(),
            "tbo".to_string(),
            "tpe".to_string(),
            format!("threads={}", threads),
            format!("out={}", output.r1.display()),
            format!("out2={}", output.r2.display()),
        ]
    }
}

pub mod shasta {
    use std::path::Path;

    pub fn arg_generator(input: &Path, output_dir: &Path, min_read_length: u64, threads: usize) -> Vec<String> {
        vec![
            "--input".to_string(),
            input.to_string_lossy().to_string(),
            "--memoryMode".to_string(),
            "filesystem".to_string(),
            "--memoryBacking".to_string(),
            "2M".to_string(),
            "--Reads.minReadLength".to_string(),
            min_read_length.to_string(),
            "--output".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--threads".to_string(),
            threads.to_string(),
        ]
    }
}

pub mod spades {
    use std::path::Path;
    use crate::utils::sample::ReadPair;

    pub fn arg_generator(reads: &ReadPair, output_dir: &Path, trusted_contigs: Option<&Path>, threads: usize) -> Vec<String> {
        let mut args_vec = vec![
            "-1".to_string(),
            reads.r1.to_string_lossy().to_string(),
            "-2".to_string(),
            reads.r2.to_string_lossy().to_string(),
            "-o".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--only-assembler".to_string(),
            "-t".to_string(),
            threads.to_string(),
        ];
        if let Some(contigs) = trusted_contigs {
            args_vec.push("--trusted-contigs".to_string());
            args_vec.push(contigs.to_string_lossy().to_string());
        }
        args_vec
    }
}

pub mod skesa {
    use std::path::Path;
    use crate::utils::sample::ReadPair;

    pub fn arg_generator(reads: &ReadPair, contigs_out: &Path, threads: usize) -> Vec<String> {
        vec![
            "--fastq".to_string(),
            format!("{},{}", reads.r1.display(), reads.r2.display()),
            "--contigs_out".to_string(),
            contigs_out.to_string_lossy().to_string(),
            "--cores".to_string(),
            threads.to_string(),
        ]
    }
}

pub mod medaka {
    use std::path::Path;

    pub fn arg_generator(reads: &Path, assembly: &Path, output_dir: &Path, model: &str, threads: usize) -> Vec<String> {
        vec![
            "-i".to_string(),
            reads.to_string_lossy().to_string(),
            "-d".to_string(),
            assembly.to_string_lossy().to_string(),
            "-o".to_string(),
            output_dir.to_string_lossy().to_string(),
            "-m".to_string(),
            model.to_string(),
            "-t".to_string(),
            threads.to_string(),
        ]
    }
}

pub mod bwa {
    use std::path::Path;
    use crate::config::defs::BwaSubcommand;
    use crate::utils::sample::ReadPair;

    pub fn arg_generator(subcommand: BwaSubcommand, assembly: &Path, reads: Option<&ReadPair>, threads: usize) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        match subcommand {
            BwaSubcommand::Index => {
                args_vec.push("index".to_string());
                args_vec.push(assembly.to_string_lossy().to_string());
            }
            BwaSubcommand::Mem => {
                args_vec.push("mem".to_string());
                args_vec.push("-M".to_string());
                args_vec.push("-t".to_string());
                args_vec.push(threads.to_string());
                args_vec.push(assembly.to_string_lossy().to_string());
                if let Some(pair) = reads {
                    args_vec.push(pair.r1.to_string_lossy().to_string());
                    args_vec.push(pair.r2.to_string_lossy().to_string());
                }
            }
        }
        args_vec
    }
}

pub mod samtools {
    use crate::config::defs::SamtoolsSubcommand;

    #[derive(Debug, Clone)]
    pub struct SamtoolsConfig {
        pub subcommand: SamtoolsSubcommand,
        /// Flags in command-line order, each with an optional value
        pub subcommand_fields: Vec<(String, Option<String>)>,
    }

    pub fn arg_generator(config: &SamtoolsConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = vec![config.subcommand.as_str().to_string()];
        for (flag, value) in &config.subcommand_fields {
            args_vec.push(flag.clone());
            if let Some(value) = value {
                args_vec.push(value.clone());
            }
        }
        args_vec
    }
}

pub mod pilon {
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct PilonConfig {
        pub jar: PathBuf,
        pub heap_gb: u64,
        pub genome: PathBuf,
        pub frags: PathBuf,
        pub outdir: PathBuf,
        pub output: String,
        pub threads: usize,
    }

    /// Pilon runs through `java`, so these are java's arguments.
    pub fn arg_generator(config: &PilonConfig) -> Vec<String> {
        vec![
            format!("-Xmx{}G", config.heap_gb),
            "-jar".to_string(),
            config.jar.to_string_lossy().to_string(),
            "--genome".to_string(),
            config.genome.to_string_lossy().to_string(),
            "--frags".to_string(),
            config.frags.to_string_lossy().to_string(),
            "--vcf".to_string(),
            "--outdir".to_string(),
            config.outdir.to_string_lossy().to_string(),
            "--output".to_string(),
            config.output.clone(),
            "--threads".to_string(),
            config.threads.to_string(),
            "--changes".to_string(),
        ]
    }
}


/// Locates an executable: paths are checked directly, bare names are searched on PATH.
pub fn find_executable(program: &OsStr) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

/// Confirms every external tool a stage needs can be started before any
/// sample work begins.
///
/// # Arguments
///
/// * `tools` - (tag, program) pairs.
///
/// # Returns
/// Err(ToolSpawn) naming every missing tool.
pub fn check_tools(tools: &[(&str, &OsStr)]) -> Result<(), PipelineError> {
    let mut missing = Vec::new();
    for (tool, program) in tools {
        match find_executable(program) {
            Some(path) => debug!("{} found at {}", tool, path.display()),
            None => missing.push(tool.to_string()),
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::ToolSpawn {
            tool: missing.join(", "),
            error: "not found on PATH".to_string(),
        })
    }
}
