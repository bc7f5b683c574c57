pub mod command;
pub mod discovery;
pub mod fastx;
pub mod file;
pub mod reorganize;
pub mod sample;
pub mod streams;
pub mod system;
#[cfg(test)]
pub(crate) mod test_tools;
