//! Execution context and command queue ownership.

use crate::driver::Driver;
use crate::error::{CheckStatus, Result, RuntimeError};
use crate::selector::SelectedDevice;
use tracing::debug;

/// The context and in-order queue bound to the selected device.
///
/// Dropping it releases the queue, then the context.
pub struct ExecutionContext<D: Driver> {
    // Field order is drop order.
    queue: D::Queue,
    context: D::Context,
}

impl<D: Driver> ExecutionContext<D> {
    /// Creates the context for `selected` and then its command queue.
    ///
    /// # Errors
    /// [`RuntimeError::ContextCreation`] or [`RuntimeError::QueueCreation`]. If
    /// queue creation fails the context is released before returning.
    pub fn create(driver: &D, selected: &SelectedDevice<D>) -> Result<Self> {
        let context = driver
            .create_context(&selected.platform, &selected.device)
            .check_as("create_context", RuntimeError::ContextCreation)?;
        let queue = driver
            .create_queue(&context, &selected.device)
            .check_as("create_queue", RuntimeError::QueueCreation)?;
        debug!(device = %selected.name, "created context and queue");

        Ok(Self { queue, context })
    }

    pub fn context(&self) -> &D::Context {
        &self.context
    }

    pub fn queue(&self) -> &D::Queue {
        &self.queue
    }
}
