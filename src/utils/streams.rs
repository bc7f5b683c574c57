// src/utils/streams.rs: external processes and byte-stream pipelines between them
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use anyhow::anyhow;
use futures::future::join_all;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use crate::config::defs::PipelineError;
use crate::utils::file::{finish_part_file, part_path};

/// One external tool invocation: a tag used in logs and errors, the program
/// to execute and its argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub tool: String,
    pub program: OsString,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(tool: &str, args: Vec<String>) -> Self {
        ToolCommand {
            tool: tool.to_string(),
            program: OsString::from(tool),
            args,
            current_dir: None,
        }
    }

    /// Runs `program` instead of the tag, e.g. an absolute path to a wrapper script.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

fn spawn_error(tool: &str, e: io::Error) -> PipelineError {
    PipelineError::ToolSpawn {
        tool: tool.to_string(),
        error: e.to_string(),
    }
}

fn check_status(tool: &str, status: ExitStatus) -> Result<(), PipelineError> {
    if status.success() {
        debug!("{} exited successfully", tool);
        Ok(())
    } else {
        Err(PipelineError::ToolFailed {
            tool: tool.to_string(),
            code: status.code(),
        })
    }
}

/// Forwards a child's output, line by line, to the debug log.
async fn log_lines<R: AsyncRead + Unpin>(tool: String, stream: R) {
    let mut lines = LinesStream::new(BufReader::new(stream).lines());
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => debug!("[{}] {}", tool, line),
            Err(e) => {
                debug!("[{}] output not readable: {}", tool, e);
                break;
            }
        }
    }
}

/// Runs a tool to completion. Output is logged at debug level.
///
/// # Arguments
///
/// * `cmd` - Tool invocation.
///
/// # Returns
/// Err(ToolFailed) on a non-zero exit, Err(ToolSpawn) if it could not start.
pub async fn run_tool(cmd: &ToolCommand) -> Result<(), PipelineError> {
    info!("Running {}", cmd.command_line());
    let mut child = cmd
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(&cmd.tool, e))?;

    let out_task = child.stdout.take().map(|s| tokio::spawn(log_lines(cmd.tool.clone(), s)));
    let err_task = child.stderr.take().map(|s| tokio::spawn(log_lines(cmd.tool.clone(), s)));

    let status = child.wait().await?;
    for task in [out_task, err_task].into_iter().flatten() {
        let _ = task.await;
    }
    check_status(&cmd.tool, status)
}

/// Runs a tool and returns everything it wrote to stdout, optionally feeding
/// `input` to its stdin.
pub async fn capture_tool_stdout(
    cmd: &ToolCommand,
    input: Option<Vec<u8>>,
) -> Result<Vec<u8>, PipelineError> {
    debug!("Capturing {}", cmd.command_line());
    let mut child = cmd
        .to_command()
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(&cmd.tool, e))?;

    let writer = match (input, child.stdin.take()) {
        (Some(data), Some(mut stdin)) => Some(tokio::spawn(async move {
            stdin.write_all(&data).await?;
            stdin.shutdown().await
        })),
        _ => None,
    };
    let err_task = child.stderr.take().map(|s| tokio::spawn(log_lines(cmd.tool.clone(), s)));

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| PipelineError::Other(anyhow!("Failed to get stdout from {}", cmd.tool)))?;
    let mut captured = Vec::new();
    stdout.read_to_end(&mut captured).await?;
    let status = child.wait().await?;

    if let Some(writer) = writer {
        match writer.await.map_err(|e| PipelineError::Other(anyhow!(e)))? {
            Ok(()) => {}
            // tools that finish without draining stdin
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(e.into()),
        }
    }
    if let Some(task) = err_task {
        let _ = task.await;
    }
    check_status(&cmd.tool, status)?;
    Ok(captured)
}


/// Where the last stage of a pipeline writes.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineSink {
    File(PathBuf),
    Capture,
    Discard,
}

/// A chain of external processes, each stage's stdout wired to the next
/// stage's stdin.
#[derive(Debug, Clone, Default)]
pub struct ProcessPipeline {
    stages: Vec<ToolCommand>,
}

impl ProcessPipeline {
    pub fn new() -> Self {
        ProcessPipeline { stages: Vec::new() }
    }

    pub fn stage(mut self, cmd: ToolCommand) -> Self {
        self.stages.push(cmd);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn describe(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.command_line())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Spawns every stage, waits for all of them and checks each exit status
    /// in pipeline order, so the first failing stage is the one reported.
    /// A file sink is written as `<file>.part` and only moved to its final
    /// name once every stage has succeeded.
    ///
    /// # Arguments
    ///
    /// * `sink` - Destination of the final stage's stdout.
    ///
    /// # Returns
    /// The final stage's stdout for PipelineSink::Capture, otherwise empty.
    pub async fn run(&self, sink: PipelineSink) -> Result<Vec<u8>, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::InvalidConfig("empty process pipeline".to_string()));
        }
        info!("Running {}", self.describe());

        match sink {
            PipelineSink::File(target) => {
                let part = part_path(&target);
                let result = self.run_stages(PipelineSink::File(part.clone())).await;
                finish_part_file(&part, &target, result).await
            }
            other => self.run_stages(other).await,
        }
    }

    async fn run_stages(&self, sink: PipelineSink) -> Result<Vec<u8>, PipelineError> {
        let last = self.stages.len() - 1;
        let mut children: Vec<(String, Child)> = Vec::with_capacity(self.stages.len());
        let mut log_tasks = Vec::new();
        let mut upstream: Option<Stdio> = None;

        for (i, stage) in self.stages.iter().enumerate() {
            let mut command = stage.to_command();
            command.stdin(upstream.take().unwrap_or_else(Stdio::null));
            command.stderr(Stdio::piped());
            if i < last {
                command.stdout(Stdio::piped());
            } else {
                match &sink {
                    PipelineSink::File(path) => {
                        let file = std::fs::File::create(path)?;
                        command.stdout(Stdio::from(file));
                    }
                    PipelineSink::Capture => {
                        command.stdout(Stdio::piped());
                    }
                    PipelineSink::Discard => {
                        command.stdout(Stdio::null());
                    }
                }
            }

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    kill_all(&mut children).await;
                    return Err(spawn_error(&stage.tool, e));
                }
            };
            if let Some(stderr) = child.stderr.take() {
                log_tasks.push(tokio::spawn(log_lines(stage.tool.clone(), stderr)));
            }
            if i < last {
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| PipelineError::Other(anyhow!("Failed to get stdout from {}", stage.tool)))?;
                // the read end moves into the next stage; the parent keeps no handle
                upstream = Some(stdout.try_into()?);
            }
            children.push((stage.tool.clone(), child));
        }

        let capture_task = match sink {
            PipelineSink::Capture => children
                .last_mut()
                .and_then(|(_, child)| child.stdout.take())
                .map(|mut out| {
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        out.read_to_end(&mut buf).await.map(|_| buf)
                    })
                }),
            _ => None,
        };

        let statuses = join_all(children.iter_mut().map(|(_, child)| child.wait())).await;
        for task in log_tasks {
            let _ = task.await;
        }
        let captured = match capture_task {
            Some(task) => task.await.map_err(|e| PipelineError::Other(anyhow!(e)))??,
            None => Vec::new(),
        };

        for ((tool, _), status) in children.iter().zip(statuses) {
            check_status(tool, status?)?;
        }
        Ok(captured)
    }
}

async fn kill_all(children: &mut [(String, Child)]) {
    for (tool, child) in children.iter_mut() {
        debug!("Killing {}", tool);
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_run_tool_reports_exit_code() {
        assert!(run_tool(&ToolCommand::new("true", vec![])).await.is_ok());

        let err = run_tool(&sh("exit 3")).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailed { ref tool, code: Some(3) } if tool == "sh"));
        assert_eq!(err.to_string(), "external tool failed: sh, exit=3");
    }

    #[tokio::test]
    async fn test_run_tool_missing_binary() {
        let err = run_tool(&ToolCommand::new("definitely-not-a-real-tool-xyz", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ToolSpawn { .. }));
    }

    #[tokio::test]
    async fn test_capture_with_input() -> anyhow::Result<()> {
        let out = capture_tool_stdout(&ToolCommand::new("cat", vec![]), Some(b"abc\n".to_vec())).await?;
        assert_eq!(out, b"abc\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_pipeline_capture_and_file_sink() -> anyhow::Result<()> {
        let pipeline = ProcessPipeline::new()
            .stage(sh("printf 'keep 1\\ndrop 2\\nkeep 3\\n'"))
            .stage(ToolCommand::new("grep", vec!["keep".to_string()]));
        assert_eq!(pipeline.len(), 2);
        let out = pipeline.run(PipelineSink::Capture).await?;
        assert_eq!(out, b"keep 1\nkeep 3\n");

        let dir = tempfile::tempdir()?;
        let target = dir.path().join("out.txt");
        let out = pipeline.run(PipelineSink::File(target.clone())).await?;
        assert!(out.is_empty());
        assert_eq!(std::fs::read(&target)?, b"keep 1\nkeep 3\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_pipeline_leaves_no_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("filtered_s1.fastq.gz");
        let err = ProcessPipeline::new()
            .stage(sh("printf '@r\\nAC'; exit 2"))
            .stage(ToolCommand::new("gzip", vec!["-c".to_string()]))
            .run(PipelineSink::File(target.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailed { ref tool, code: Some(2) } if tool == "sh"));
        assert!(!target.exists());
        assert!(!dir.path().join("filtered_s1.fastq.gz.part").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_pipeline_reports_first_failed_stage() {
        let pipeline = ProcessPipeline::new()
            .stage(ToolCommand::new("true", vec![]))
            .stage(ToolCommand::new("false", vec![]))
            .stage(ToolCommand::new("cat", vec![]));
        let err = pipeline.run(PipelineSink::Discard).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailed { ref tool, code: Some(1) } if tool == "false"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_rejected() {
        let err = ProcessPipeline::new().run(PipelineSink::Discard).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
