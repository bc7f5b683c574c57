// src/utils/system.rs: System functions

use log::warn;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use anyhow::{anyhow, Result};


/// Determines number of cores that can be used for the external tools
///
/// # Returns
///
/// usize: physical cores, falling back to logical cores, then 1
pub fn detect_cores() -> usize {
    System::physical_core_count()
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
}


/// Clamps a requested thread count to what the host has.
///
/// # Arguments
///
/// * `requested` - `--threads`, if given
/// * `cores` - Detected cores
///
/// # Returns
///
/// usize thread count passed to every tool
pub fn effective_threads(requested: Option<usize>, cores: usize) -> usize {
    let cores = cores.max(1);
    match requested {
        None => cores,
        Some(0) => {
            warn!("--threads 0 is not usable; using {} detected cores", cores);
            cores
        }
        Some(n) if n > cores => {
            warn!("--threads {} exceeds the {} detected cores; using {}", n, cores, cores);
            cores
        }
        Some(n) => n,
    }
}


/// Finds the amount of total RAM
///
/// # Returns
///
/// Result<u64> total ram in bytes
pub fn detect_total_ram() -> Result<u64> {
    let refresh_kind = RefreshKind::nothing().with_memory(Default::default());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_memory_specifics(MemoryRefreshKind::everything());
    let total_ram = system.total_memory();

    if total_ram == 0 {
        return Err(anyhow!("Failed to detect valid RAM values"));
    }
    Ok(total_ram)
}


/// Java heap for Pilon, in whole GB: ceil(total GB * fraction), at least 1.
pub fn java_heap_gb(total_ram: u64, fraction: f64) -> u64 {
    let gb = total_ram as f64 / 1_000_000_000.0;
    ((gb * fraction).ceil() as u64).max(1)
}
