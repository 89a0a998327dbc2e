//! Kernel program compilation and entry-point extraction.
//!
//! The build log is always fetched and surfaced before the build status is
//! checked, so compiler diagnostics are visible on success (warnings) and on
//! failure alike.

use crate::context::ExecutionContext;
use crate::driver::Driver;
use crate::error::{CheckStatus, Result, RuntimeError, codes};
use tracing::{debug, warn};

/// A built program and the kernel extracted from it.
///
/// Dropping it releases the kernel, then the program.
pub struct CompiledProgram<D: Driver> {
    // Field order is drop order. The program only has to outlive the kernel.
    kernel: D::Kernel,
    _program: D::Program,
    log: Option<String>,
}

impl<D: Driver> CompiledProgram<D> {
    pub fn kernel(&self) -> &D::Kernel {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut D::Kernel {
        &mut self.kernel
    }

    /// Diagnostics emitted by a successful build, if any.
    pub fn log(&self) -> Option<&str> {
        self.log.as_deref()
    }
}

/// Prints a build log to stdout under a `Log:` header.
pub fn print_log(log: &str) {
    println!("Log:");
    println!("{log}");
}

/// Strips the terminator drivers append; `None` if nothing else is left.
fn meaningful_log(raw: &str) -> Option<String> {
    let log = raw.trim_end_matches('\0').trim_end();
    if log.trim().is_empty() {
        None
    } else {
        Some(log.to_string())
    }
}

/// Compiles `source` for `device` and extracts `entry_point`.
///
/// `on_log` receives the build log whenever it has content, before the build
/// status is acted on.
///
/// # Errors
/// - [`RuntimeError::EmptySource`] if `source` is empty; no driver call is made
/// - [`RuntimeError::ProgramBuild`] if the build reports failure
/// - [`RuntimeError::KernelNotFound`] if the program has no such entry point
/// - [`RuntimeError::AcceleratorCall`] for any other driver failure
#[tracing::instrument(skip_all, fields(entry_point = %entry_point))]
pub fn build_program<D: Driver>(
    driver: &D,
    ctx: &ExecutionContext<D>,
    device: &D::Device,
    source: &str,
    entry_point: &str,
    on_log: &mut dyn FnMut(&str),
) -> Result<CompiledProgram<D>> {
    if source.is_empty() {
        return Err(RuntimeError::EmptySource);
    }

    let mut program = driver
        .create_program(ctx.context(), source)
        .check("create_program")?;

    // Captured, not raised: the log comes first.
    let build_status = driver.build_program(&mut program, device);

    let raw_log = driver.build_log(&program, device).check("build_log")?;
    let log = meaningful_log(&raw_log);
    if let Some(log) = &log {
        if build_status.is_ok() {
            debug!(bytes = log.len(), "build produced diagnostics");
        } else {
            warn!(bytes = log.len(), "build failed with diagnostics");
        }
        on_log(log.as_str());
    }

    if let Err(status) = build_status {
        return Err(RuntimeError::ProgramBuild {
            status,
            log: log.unwrap_or_default(),
        });
    }

    let kernel = match driver.create_kernel(&program, entry_point) {
        Err(status) if status.code == codes::INVALID_KERNEL_NAME => {
            return Err(RuntimeError::KernelNotFound {
                name: entry_point.to_string(),
            });
        }
        other => other.check("create_kernel")?,
    };
    debug!(entry_point, "extracted kernel");

    Ok(CompiledProgram {
        kernel,
        _program: program,
        log,
    })
}
