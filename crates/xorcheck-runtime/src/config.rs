//! Run configuration.

use crate::error::{Result, RuntimeError};

/// Number of boolean elements processed per run.
pub const DEFAULT_PROBLEM_SIZE: usize = 100 * 1000 * 1000;

/// Local work-group size `L`.
pub const DEFAULT_LOCAL_SIZE: usize = 128;

/// Repetitions of the dispatch loop.
pub const DEFAULT_DISPATCH_ITERATIONS: u32 = 20;

/// Repetitions of the readback loop.
pub const DEFAULT_READBACK_ITERATIONS: u32 = 20;

/// Kernel entry point extracted from the built program.
pub const ENTRY_POINT: &str = "xor";

/// Fixed parameters of one dispatch-and-verify run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Elements per input array (one byte each).
    pub problem_size: usize,

    /// Local work-group size; the global size is padded to a multiple of it.
    pub local_size: usize,

    pub dispatch_iterations: u32,

    pub readback_iterations: u32,

    pub entry_point: String,

    /// Seed for input generation; `None` draws a fresh one.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            problem_size: DEFAULT_PROBLEM_SIZE,
            local_size: DEFAULT_LOCAL_SIZE,
            dispatch_iterations: DEFAULT_DISPATCH_ITERATIONS,
            readback_iterations: DEFAULT_READBACK_ITERATIONS,
            entry_point: ENTRY_POINT.to_string(),
            seed: None,
        }
    }
}

impl RunConfig {
    /// Default configuration with a different problem size.
    pub fn with_problem_size(problem_size: usize) -> Self {
        Self {
            problem_size,
            ..Self::default()
        }
    }

    /// Rejects values the pipeline can't run with.
    ///
    /// The element count travels to the kernel as a 32-bit scalar, and at least one
    /// readback is needed to verify anything.
    pub fn validate(&self) -> Result<()> {
        if self.problem_size == 0 {
            return Err(RuntimeError::InvalidConfig("problem size must be positive".into()));
        }
        if u32::try_from(self.problem_size).is_err() {
            return Err(RuntimeError::InvalidConfig(format!(
                "problem size {} does not fit the 32-bit element count argument",
                self.problem_size
            )));
        }
        if self.local_size == 0 {
            return Err(RuntimeError::InvalidConfig("local size must be positive".into()));
        }
        if self.readback_iterations == 0 {
            return Err(RuntimeError::InvalidConfig(
                "at least one readback is required for verification".into(),
            ));
        }
        if self.entry_point.is_empty() {
            return Err(RuntimeError::InvalidConfig("entry point name is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.problem_size, 100_000_000);
        assert_eq!(config.local_size, 128);
        assert_eq!(config.dispatch_iterations, 20);
        assert_eq!(config.readback_iterations, 20);
        assert_eq!(config.entry_point, "xor");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let cases = [
            RunConfig::with_problem_size(0),
            RunConfig {
                local_size: 0,
                ..RunConfig::default()
            },
            RunConfig {
                readback_iterations: 0,
                ..RunConfig::default()
            },
            RunConfig {
                entry_point: String::new(),
                ..RunConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(RuntimeError::InvalidConfig(_))),
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_zero_dispatches_allowed() {
        let config = RunConfig {
            dispatch_iterations: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
