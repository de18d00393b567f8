use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub fn out_geometry(work_dir: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join("geometry/geometry.json")
}

pub fn out_csx(work_dir: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join("geometry/geometry.xml")
}

pub fn out_raster(work_dir: impl AsRef<Path>, stem: &str) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("images/{stem}.png"))
}

pub fn out_trace_mesh(work_dir: impl AsRef<Path>, stem: &str) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("geometry/{stem}_mesh.json"))
}

/// Directory in which the solver runs for one excitation.
pub fn out_solver_dir(work_dir: impl AsRef<Path>, port: usize) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("simulation/port_{port}"))
}

pub fn out_raw_result(work_dir: impl AsRef<Path>, port: usize) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("simulation/port_{port}.dat"))
}

pub fn out_port_csv(work_dir: impl AsRef<Path>, port: usize) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("results/port_{port}.csv"))
}

pub fn out_diffpair_csv(work_dir: impl AsRef<Path>, index: usize, name: &str) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("results/diffpair_{index}_{name}.csv"))
}

pub fn out_trace_csv(work_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("results/trace_{name}.csv"))
}

pub fn out_touchstone(work_dir: impl AsRef<Path>, ports: usize) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("results/sparams.s{ports}p"))
}

/// Writes `contents` to a sibling staging file and renames it into place, so
/// readers never observe a partially written artifact.
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    let staging = PathBuf::from(staging);
    fs::write(&staging, contents)?;
    fs::rename(&staging, path)?;
    Ok(())
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a of `bytes`. Recorded in artifacts on disk, so the value
/// must never depend on the toolchain or the process.
pub const fn stable_digest(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}
