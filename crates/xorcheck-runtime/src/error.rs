//! Error types and call-site checking for accelerator calls.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Status codes shared by every backend.
///
/// The numbering follows OpenCL: zero is success, negative values are errors.
/// Backends that have no native codes (wgpu, the emulated driver) map their
/// failures onto this table.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const DEVICE_NOT_FOUND: i32 = -1;
    pub const DEVICE_NOT_AVAILABLE: i32 = -2;
    pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
    pub const OUT_OF_RESOURCES: i32 = -5;
    pub const OUT_OF_HOST_MEMORY: i32 = -6;
    pub const BUILD_PROGRAM_FAILURE: i32 = -11;
    pub const INVALID_VALUE: i32 = -30;
    pub const INVALID_PLATFORM: i32 = -32;
    pub const INVALID_DEVICE: i32 = -33;
    pub const INVALID_CONTEXT: i32 = -34;
    pub const INVALID_COMMAND_QUEUE: i32 = -36;
    pub const INVALID_MEM_OBJECT: i32 = -38;
    pub const INVALID_PROGRAM: i32 = -44;
    pub const INVALID_PROGRAM_EXECUTABLE: i32 = -45;
    pub const INVALID_KERNEL_NAME: i32 = -46;
    pub const INVALID_KERNEL: i32 = -48;
    pub const INVALID_ARG_INDEX: i32 = -49;
    pub const INVALID_ARG_VALUE: i32 = -50;
    pub const INVALID_KERNEL_ARGS: i32 = -52;
    pub const INVALID_WORK_DIMENSION: i32 = -53;
    pub const INVALID_WORK_GROUP_SIZE: i32 = -54;
    pub const INVALID_EVENT: i32 = -58;
    pub const INVALID_BUFFER_SIZE: i32 = -61;
    pub const INVALID_GLOBAL_WORK_SIZE: i32 = -63;
    pub const PLATFORM_NOT_FOUND_KHR: i32 = -1001;

    /// Symbolic name of a known status code.
    pub fn name(code: i32) -> Option<&'static str> {
        let name = match code {
            SUCCESS => "SUCCESS",
            DEVICE_NOT_FOUND => "DEVICE_NOT_FOUND",
            DEVICE_NOT_AVAILABLE => "DEVICE_NOT_AVAILABLE",
            MEM_OBJECT_ALLOCATION_FAILURE => "MEM_OBJECT_ALLOCATION_FAILURE",
            OUT_OF_RESOURCES => "OUT_OF_RESOURCES",
            OUT_OF_HOST_MEMORY => "OUT_OF_HOST_MEMORY",
            BUILD_PROGRAM_FAILURE => "BUILD_PROGRAM_FAILURE",
            INVALID_VALUE => "INVALID_VALUE",
            INVALID_PLATFORM => "INVALID_PLATFORM",
            INVALID_DEVICE => "INVALID_DEVICE",
            INVALID_CONTEXT => "INVALID_CONTEXT",
            INVALID_COMMAND_QUEUE => "INVALID_COMMAND_QUEUE",
            INVALID_MEM_OBJECT => "INVALID_MEM_OBJECT",
            INVALID_PROGRAM => "INVALID_PROGRAM",
            INVALID_PROGRAM_EXECUTABLE => "INVALID_PROGRAM_EXECUTABLE",
            INVALID_KERNEL_NAME => "INVALID_KERNEL_NAME",
            INVALID_KERNEL => "INVALID_KERNEL",
            INVALID_ARG_INDEX => "INVALID_ARG_INDEX",
            INVALID_ARG_VALUE => "INVALID_ARG_VALUE",
            INVALID_KERNEL_ARGS => "INVALID_KERNEL_ARGS",
            INVALID_WORK_DIMENSION => "INVALID_WORK_DIMENSION",
            INVALID_WORK_GROUP_SIZE => "INVALID_WORK_GROUP_SIZE",
            INVALID_EVENT => "INVALID_EVENT",
            INVALID_BUFFER_SIZE => "INVALID_BUFFER_SIZE",
            INVALID_GLOBAL_WORK_SIZE => "INVALID_GLOBAL_WORK_SIZE",
            PLATFORM_NOT_FOUND_KHR => "PLATFORM_NOT_FOUND_KHR",
            _ => return None,
        };
        Some(name)
    }
}

/// A non-success status returned by a driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Numeric status code (see [`codes`]).
    pub code: i32,

    /// Backend-specific detail, if the driver produced any.
    pub detail: Option<String>,
}

impl Status {
    pub fn new(code: i32) -> Self {
        Self { code, detail: None }
    }

    pub fn with_detail(code: i32, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == codes::SUCCESS
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(name) = codes::name(self.code) {
            write!(f, " ({name})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// A failed driver call together with the place it was issued from.
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub status: Status,

    /// Driver operation that failed, e.g. `create_buffer`.
    pub call: &'static str,

    pub location: &'static Location<'static>,
}

impl CallFailure {
    pub fn code(&self) -> i32 {
        self.status.code
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accelerator error code {} in {} at {}:{}",
            self.status,
            self.call,
            self.location.file(),
            self.location.line()
        )
    }
}

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A driver call returned a non-success status.
    #[error("{0}")]
    AcceleratorCall(CallFailure),

    #[error("Context creation failed: {0}")]
    ContextCreation(CallFailure),

    #[error("Command queue creation failed: {0}")]
    QueueCreation(CallFailure),

    #[error("Buffer allocation failed: {0}")]
    BufferAllocation(CallFailure),

    /// No GPU- or CPU-class device on any platform.
    #[error("No device found")]
    NoDeviceFound,

    /// Kernel source text was empty; no build was attempted.
    #[error("Empty source file! Maybe you forgot to configure the working directory properly?")]
    EmptySource,

    #[error("Program build failed with status {status}{}", log_suffix(.log))]
    ProgramBuild { status: Status, log: String },

    #[error("Kernel '{name}' not found in program")]
    KernelNotFound { name: String },

    /// Device output disagrees with the host reference.
    #[error("CPU and device results differ at index {index}: expected {expected}, got byte {actual}")]
    ResultMismatch {
        index: usize,
        expected: bool,
        actual: u8,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn log_suffix(log: &str) -> String {
    if log.is_empty() {
        String::new()
    } else {
        format!("\n{log}")
    }
}

impl RuntimeError {
    /// Status code of the underlying driver call, if this error came from one.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::AcceleratorCall(f)
            | Self::ContextCreation(f)
            | Self::QueueCreation(f)
            | Self::BufferAllocation(f) => Some(f.code()),
            Self::ProgramBuild { status, .. } => Some(status.code),
            _ => None,
        }
    }
}

/// Specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Checks a raw status code at the caller's location.
///
/// Returns normally for [`codes::SUCCESS`], otherwise an
/// [`RuntimeError::AcceleratorCall`] naming `call` and the caller's file and line.
#[track_caller]
pub fn report_status(code: i32, call: &'static str) -> Result<()> {
    if code == codes::SUCCESS {
        return Ok(());
    }
    Err(RuntimeError::AcceleratorCall(CallFailure {
        status: Status::new(code),
        call,
        location: Location::caller(),
    }))
}

/// Routes a driver result through error signaling.
pub trait CheckStatus<T> {
    /// Converts a failed status into [`RuntimeError::AcceleratorCall`] located at the caller.
    #[track_caller]
    fn check(self, call: &'static str) -> Result<T>;

    /// Like [`check`](Self::check) but lets the caller pick the error variant.
    #[track_caller]
    fn check_as(self, call: &'static str, wrap: fn(CallFailure) -> RuntimeError) -> Result<T>;
}

impl<T> CheckStatus<T> for std::result::Result<T, Status> {
    #[track_caller]
    fn check(self, call: &'static str) -> Result<T> {
        self.check_as(call, RuntimeError::AcceleratorCall)
    }

    #[track_caller]
    fn check_as(self, call: &'static str, wrap: fn(CallFailure) -> RuntimeError) -> Result<T> {
        let location = Location::caller();
        self.map_err(|status| {
            wrap(CallFailure {
                status,
                call,
                location,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_passes_through() {
        assert!(report_status(codes::SUCCESS, "noop").is_ok());
        let ok: std::result::Result<u8, Status> = Ok(7);
        assert_eq!(ok.check("noop").unwrap(), 7);
    }

    #[test]
    fn test_failure_carries_code_and_call_site() {
        let line = line!() + 1;
        let err = report_status(codes::OUT_OF_RESOURCES, "enqueue_kernel").unwrap_err();
        let RuntimeError::AcceleratorCall(failure) = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(failure.code(), -5);
        assert_eq!(failure.call, "enqueue_kernel");
        assert!(failure.location.file().ends_with("error.rs"));
        assert_eq!(failure.location.line(), line);

        let message = err.to_string();
        assert!(message.contains("-5 (OUT_OF_RESOURCES)"), "{message}");
        assert!(message.contains("enqueue_kernel"), "{message}");
        assert!(message.contains(&format!("error.rs:{line}")), "{message}");
    }

    #[test]
    fn test_check_as_wraps_variant() {
        let failed: std::result::Result<(), Status> =
            Err(Status::with_detail(codes::MEM_OBJECT_ALLOCATION_FAILURE, "too big"));
        let err = failed
            .check_as("create_buffer", RuntimeError::BufferAllocation)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::BufferAllocation(_)));
        assert_eq!(err.status_code(), Some(-4));
        assert!(err.to_string().contains("too big"));
    }

    #[test]
    fn test_unknown_code_has_no_name() {
        assert_eq!(codes::name(-9999), None);
        assert_eq!(Status::new(-9999).to_string(), "-9999");
    }
}
