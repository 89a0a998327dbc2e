//! Accelerator driver abstraction.
//!
//! A [`Driver`] exposes the handful of accelerator-API calls the pipeline
//! needs: platform and device enumeration, context and queue creation,
//! buffer allocation, program build, kernel argument binding, dispatch,
//! readback and event waits. Every call returns a raw [`Status`] on failure;
//! callers route it through [`crate::error::CheckStatus`] so the failing call
//! site is recorded.
//!
//! Handles are plain owned values. Dropping one releases the underlying
//! accelerator resource, so scope order decides release order.
//!
//! Backends:
//! - [`emulated`]: host emulation, always available
//! - [`wgpu_backend`] (feature `wgpu`): Vulkan/Metal/DX12/GL through wgpu
//! - `opencl` (feature `opencl`): OpenCL through `opencl3`

use crate::error::Status;
use std::fmt;

pub mod emulated;
#[cfg(feature = "opencl")]
pub mod opencl;
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

/// Device-type classification used by the selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Gpu,
    Cpu,
    /// Accelerators, custom devices, or anything the backend can't classify.
    Other,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => f.write_str("GPU"),
            Self::Cpu => f.write_str("CPU"),
            Self::Other => f.write_str("other"),
        }
    }
}

/// Access mode fixed at buffer creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
}

/// A positional kernel argument.
#[derive(Debug)]
pub enum KernelArg<'a, B> {
    Buffer(&'a B),
    Uint(u32),
}

/// The accelerator API used by the pipeline.
pub trait Driver {
    type Platform;
    type Device;
    type Context;
    type Queue;
    type Buffer;
    type Program;
    type Kernel;
    type Event;

    /// Short backend name for logs and reports.
    fn backend_name(&self) -> &'static str;

    fn platforms(&self) -> Result<Vec<Self::Platform>, Status>;

    /// All devices of `platform`, in the platform's enumeration order.
    fn devices(&self, platform: &Self::Platform) -> Result<Vec<Self::Device>, Status>;

    fn device_class(&self, device: &Self::Device) -> Result<DeviceClass, Status>;

    fn device_name(&self, device: &Self::Device) -> Result<String, Status>;

    /// Creates a context bound to the single `device` of `platform`.
    fn create_context(
        &self,
        platform: &Self::Platform,
        device: &Self::Device,
    ) -> Result<Self::Context, Status>;

    /// Creates an in-order queue without profiling.
    fn create_queue(
        &self,
        context: &Self::Context,
        device: &Self::Device,
    ) -> Result<Self::Queue, Status>;

    /// Allocates `len` bytes; `init` (exactly `len` bytes) is copied in at creation.
    fn create_buffer(
        &self,
        context: &Self::Context,
        access: BufferAccess,
        len: usize,
        init: Option<&[u8]>,
    ) -> Result<Self::Buffer, Status>;

    fn create_program(
        &self,
        context: &Self::Context,
        source: &str,
    ) -> Result<Self::Program, Status>;

    /// Builds `program` for `device`. The outcome is recorded in the program so the
    /// build log stays retrievable after a failed build.
    fn build_program(
        &self,
        program: &mut Self::Program,
        device: &Self::Device,
    ) -> Result<(), Status>;

    fn build_log(&self, program: &Self::Program, device: &Self::Device)
    -> Result<String, Status>;

    /// Extracts entry point `name`; fails with `INVALID_KERNEL_NAME` if absent.
    fn create_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel, Status>;

    fn set_kernel_arg(
        &self,
        kernel: &mut Self::Kernel,
        index: u32,
        arg: KernelArg<'_, Self::Buffer>,
    ) -> Result<(), Status>;

    /// Enqueues a 1-D launch of `global` work items in groups of `local`.
    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global: usize,
        local: usize,
    ) -> Result<Self::Event, Status>;

    /// Reads the first `dst.len()` bytes of `buffer` into `dst`.
    ///
    /// The read is blocking: `dst` holds the data when this returns, and the
    /// event only reports completion.
    fn enqueue_read(
        &self,
        queue: &Self::Queue,
        buffer: &Self::Buffer,
        dst: &mut [u8],
    ) -> Result<Self::Event, Status>;

    /// Blocks until `event` has completed. No timeout.
    fn wait(&self, event: &Self::Event) -> Result<(), Status>;
}
