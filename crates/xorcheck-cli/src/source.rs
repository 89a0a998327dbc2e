//! Kernel source loading.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Directory holding the kernel sources shipped with the CLI.
pub const KERNEL_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/kernels");

/// Kernel source file for a backend: WGSL for wgpu, OpenCL C otherwise.
pub fn kernel_path(backend: &str) -> PathBuf {
    let file = match backend {
        "wgpu" => "xor.wgsl",
        _ => "xor.cl",
    };
    Path::new(KERNEL_DIR).join(file)
}

/// Reads the kernel source at `path`.
///
/// A missing or unreadable file yields an empty string, which the runtime
/// rejects before building anything. The read error itself is logged.
pub fn load_kernel_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read kernel source");
            String::new()
        }
    }
}
