//! Device buffers for the two inputs and the output.

use crate::context::ExecutionContext;
use crate::driver::{BufferAccess, Driver};
use crate::error::{CheckStatus, Result, RuntimeError};
use tracing::debug;

/// Input buffers `a`, `b` (read-only, copied from the host) and output `c`
/// (write-only, uninitialized), all `len` bytes.
pub struct DeviceBuffers<D: Driver> {
    a: D::Buffer,
    b: D::Buffer,
    c: D::Buffer,
    len: usize,
}

impl<D: Driver> DeviceBuffers<D> {
    /// Allocates the three buffers in `ctx`, seeding `a` and `b` from the host.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidConfig`] when the inputs are empty or differ in
    /// length; [`RuntimeError::BufferAllocation`] when the driver refuses an
    /// allocation. Buffers created before the failure are released.
    pub fn allocate(
        driver: &D,
        ctx: &ExecutionContext<D>,
        host_a: &[u8],
        host_b: &[u8],
    ) -> Result<Self> {
        if host_a.len() != host_b.len() {
            return Err(RuntimeError::InvalidConfig(format!(
                "input lengths differ: {} vs {}",
                host_a.len(),
                host_b.len()
            )));
        }
        if host_a.is_empty() {
            return Err(RuntimeError::InvalidConfig("inputs are empty".into()));
        }
        let len = host_a.len();

        let a = driver
            .create_buffer(ctx.context(), BufferAccess::ReadOnly, len, Some(host_a))
            .check_as("create_buffer", RuntimeError::BufferAllocation)?;
        let b = driver
            .create_buffer(ctx.context(), BufferAccess::ReadOnly, len, Some(host_b))
            .check_as("create_buffer", RuntimeError::BufferAllocation)?;
        let c = driver
            .create_buffer(ctx.context(), BufferAccess::WriteOnly, len, None)
            .check_as("create_buffer", RuntimeError::BufferAllocation)?;
        debug!(bytes = len, "allocated device buffers");

        Ok(Self { a, b, c, len })
    }

    pub fn a(&self) -> &D::Buffer {
        &self.a
    }

    pub fn b(&self) -> &D::Buffer {
        &self.b
    }

    pub fn c(&self) -> &D::Buffer {
        &self.c
    }

    /// Byte length of each buffer, equal to the element count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
