// src/lib.rs
pub mod cli;
pub mod config;
pub mod pipelines;
pub mod utils;

pub use cli::{Arguments, AssemblyMode, Command};
pub use config::defs::{PipelineError, RunConfig};
