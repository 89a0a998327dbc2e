//! Host-side orchestration of a boolean XOR over two large arrays on an
//! accelerator, with verification against a host reference.
//!
//! # Architecture
//!
//! A run goes through these stages, each in its own module:
//! 1. **Selection** ([`selector`]) - enumerate platforms/devices, prefer the first GPU
//! 2. **Context** ([`context`]) - create the context and in-order queue
//! 3. **Memory** ([`memory`]) - two read-only inputs, one write-only output
//! 4. **Program** ([`program`]) - build the kernel source, surface the log, extract `xor`
//! 5. **Dispatch** ([`dispatch`]) - bind arguments, 20 timed dispatches, 20 timed readbacks
//! 6. **Verification** ([`verify`]) - compare against `a XOR b` on the host
//!
//! All accelerator access goes through the [`driver::Driver`] trait; every call
//! result is checked by [`error::CheckStatus`], which records the call site.
//!
//! # Example
//!
//! ```no_run
//! use xorcheck_runtime::driver::emulated::EmulatedDriver;
//! use xorcheck_runtime::{RunConfig, run};
//!
//! let driver = EmulatedDriver::host();
//! let config = RunConfig::with_problem_size(4);
//! let source = "__kernel void xor(__global const uchar* a, __global const uchar* b, \
//!               __global uchar* c, unsigned int n) {}";
//! let report = run(&driver, &config, source, &[0, 1, 0, 1], &[0, 0, 1, 1])?;
//! assert_eq!(report.output, vec![0, 1, 1, 0]);
//! # Ok::<(), xorcheck_runtime::RuntimeError>(())
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod program;
pub mod selector;
pub mod verify;

pub use config::RunConfig;
pub use error::{Result, RuntimeError};
pub use pipeline::{RunReport, run, run_with_log_sink};
