//! Kernel argument binding, grid sizing and the dispatch/readback loops.
//!
//! Both loops are plain bounded loops with one submit-and-wait round trip per
//! iteration. Nothing is batched and the two loops never overlap, so every
//! iteration can be timed in isolation.

use crate::driver::{Driver, KernelArg};
use crate::error::{CheckStatus, Result, RuntimeError};
use crate::memory::DeviceBuffers;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::debug;

/// Positional argument indices of the `xor` entry point.
pub const ARG_A: u32 = 0;
pub const ARG_B: u32 = 1;
pub const ARG_C: u32 = 2;
pub const ARG_N: u32 = 3;

/// Smallest multiple of `local` that is `>= n`.
///
/// Work items past `n` are over-provisioned so that every work-group is full;
/// the kernel must ignore them.
pub fn global_work_size(n: usize, local: usize) -> usize {
    n.div_ceil(local) * local
}

/// A kernel with all four arguments bound. Only this type can be dispatched.
pub struct BoundKernel<'a, D: Driver> {
    kernel: &'a D::Kernel,
    elements: u32,
    _buffers: PhantomData<&'a DeviceBuffers<D>>,
}

impl<D: Driver> BoundKernel<'_, D> {
    pub fn elements(&self) -> u32 {
        self.elements
    }
}

/// Binds `a`, `b`, `c` and the element count, in that order.
///
/// Every binding goes through error signaling; a rejected argument is fatal.
pub fn bind_arguments<'a, D: Driver>(
    driver: &D,
    kernel: &'a mut D::Kernel,
    buffers: &'a DeviceBuffers<D>,
) -> Result<BoundKernel<'a, D>> {
    let elements = u32::try_from(buffers.len()).map_err(|_| {
        RuntimeError::InvalidConfig(format!(
            "{} elements do not fit the 32-bit count argument",
            buffers.len()
        ))
    })?;

    driver
        .set_kernel_arg(kernel, ARG_A, KernelArg::Buffer(buffers.a()))
        .check("set_kernel_arg")?;
    driver
        .set_kernel_arg(kernel, ARG_B, KernelArg::Buffer(buffers.b()))
        .check("set_kernel_arg")?;
    driver
        .set_kernel_arg(kernel, ARG_C, KernelArg::Buffer(buffers.c()))
        .check("set_kernel_arg")?;
    driver
        .set_kernel_arg(kernel, ARG_N, KernelArg::Uint(elements))
        .check("set_kernel_arg")?;

    Ok(BoundKernel {
        kernel,
        elements,
        _buffers: PhantomData,
    })
}

/// Grid of one 1-D launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    pub elements: usize,
    pub local_size: usize,
    pub global_size: usize,
}

impl DispatchPlan {
    pub fn new(elements: usize, local_size: usize) -> Self {
        Self {
            elements,
            local_size,
            global_size: global_work_size(elements, local_size),
        }
    }

    /// Work items launched beyond the element count.
    pub fn padding(&self) -> usize {
        self.global_size - self.elements
    }
}

/// Wall-clock durations of the iterations of one loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopTimings {
    pub samples: Vec<Duration>,
}

impl LoopTimings {
    pub fn iterations(&self) -> usize {
        self.samples.len()
    }

    pub fn total(&self) -> Duration {
        self.samples.iter().sum()
    }

    pub fn min(&self) -> Option<Duration> {
        self.samples.iter().min().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        let count = u32::try_from(self.samples.len()).ok().filter(|&c| c > 0)?;
        Some(self.total() / count)
    }
}

/// Issues the two loops against one queue.
pub struct DispatchEngine<'d, D: Driver> {
    driver: &'d D,
    queue: &'d D::Queue,
    plan: DispatchPlan,
}

impl<'d, D: Driver> DispatchEngine<'d, D> {
    pub fn new(driver: &'d D, queue: &'d D::Queue, plan: DispatchPlan) -> Self {
        Self {
            driver,
            queue,
            plan,
        }
    }

    pub fn plan(&self) -> &DispatchPlan {
        &self.plan
    }

    /// Enqueues the kernel `iterations` times, waiting on each launch's event
    /// before issuing the next.
    #[tracing::instrument(skip_all, fields(iterations = iterations, global = self.plan.global_size))]
    pub fn dispatch_loop(&self, kernel: &BoundKernel<'_, D>, iterations: u32) -> Result<LoopTimings> {
        let mut timings = LoopTimings::default();
        for iteration in 0..iterations {
            let start = Instant::now();
            let event = self
                .driver
                .enqueue_kernel(
                    self.queue,
                    kernel.kernel,
                    self.plan.global_size,
                    self.plan.local_size,
                )
                .check("enqueue_kernel")?;
            self.driver.wait(&event).check("wait")?;
            let elapsed = start.elapsed();
            debug!(iteration, ?elapsed, "dispatch complete");
            timings.samples.push(elapsed);
        }
        Ok(timings)
    }

    /// Reads `buffer` into `out` `iterations` times with a blocking read, then
    /// waits on the read's event as well.
    #[tracing::instrument(skip_all, fields(iterations = iterations, bytes = out.len()))]
    pub fn readback_loop(
        &self,
        buffer: &D::Buffer,
        out: &mut [u8],
        iterations: u32,
    ) -> Result<LoopTimings> {
        let mut timings = LoopTimings::default();
        for iteration in 0..iterations {
            let start = Instant::now();
            let event = self
                .driver
                .enqueue_read(self.queue, buffer, out)
                .check("enqueue_read")?;
            self.driver.wait(&event).check("wait")?;
            let elapsed = start.elapsed();
            debug!(iteration, ?elapsed, "readback complete");
            timings.samples.push(elapsed);
        }
        Ok(timings)
    }
}
