pub mod args;

use clap::Parser;
pub use args::{Arguments, AssembleArgs, AssemblyMode, BasecallArgs, Command, FilterArgs, PolishArgs};

pub fn parse() -> Arguments {
    Arguments::parse()
}
