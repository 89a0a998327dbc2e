//! OpenCL backend over `opencl3`.
//!
//! Handles own their OpenCL objects and release them on drop. Status codes
//! come straight from the ICD loader, so they already use the numbering in
//! [`crate::error::codes`].

use super::{BufferAccess, DeviceClass, Driver, KernelArg};
use crate::error::{Status, codes};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU, Device};
use opencl3::error_codes::ClError;
use opencl3::event::Event;
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, CL_MEM_COPY_HOST_PTR, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY, ClMem};
use opencl3::platform::{Platform, get_platforms};
use opencl3::program::Program;
use opencl3::types::{
    CL_BLOCKING, cl_context_properties, cl_device_id, cl_platform_id, cl_uchar, cl_uint,
};
use std::ptr;

/// `CL_CONTEXT_PLATFORM` context property key.
const CL_CONTEXT_PLATFORM: cl_context_properties = 0x1084;

/// Zero-terminated property list binding a context to `platform`.
fn context_properties(platform: cl_platform_id) -> [cl_context_properties; 3] {
    [CL_CONTEXT_PLATFORM, platform as cl_context_properties, 0]
}

impl From<ClError> for Status {
    fn from(e: ClError) -> Self {
        Status::new(e.0)
    }
}

pub struct ClPlatform {
    platform: Platform,
    pub name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ClDevice {
    id: cl_device_id,
}

pub struct ClBuffer {
    buffer: Buffer<cl_uchar>,
    len: usize,
}

/// Driver over the system's installed OpenCL platforms.
#[derive(Debug, Default)]
pub struct OpenClDriver;

impl OpenClDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for OpenClDriver {
    type Platform = ClPlatform;
    type Device = ClDevice;
    type Context = Context;
    type Queue = CommandQueue;
    type Buffer = ClBuffer;
    type Program = Program;
    type Kernel = Kernel;
    type Event = Event;

    fn backend_name(&self) -> &'static str {
        "opencl"
    }

    fn platforms(&self) -> Result<Vec<ClPlatform>, Status> {
        let platforms = match get_platforms() {
            Ok(platforms) => platforms,
            // No ICD installed.
            Err(ClError(codes::PLATFORM_NOT_FOUND_KHR)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        platforms
            .into_iter()
            .map(|platform| -> Result<ClPlatform, Status> {
                Ok(ClPlatform {
                    name: platform.name()?,
                    platform,
                })
            })
            .collect()
    }

    fn devices(&self, platform: &ClPlatform) -> Result<Vec<ClDevice>, Status> {
        match platform.platform.get_devices(CL_DEVICE_TYPE_ALL) {
            Ok(ids) => Ok(ids.into_iter().map(|id| ClDevice { id }).collect()),
            Err(ClError(codes::DEVICE_NOT_FOUND)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn device_class(&self, device: &ClDevice) -> Result<DeviceClass, Status> {
        let device_type = Device::new(device.id).dev_type()?;
        Ok(if device_type & CL_DEVICE_TYPE_GPU != 0 {
            DeviceClass::Gpu
        } else if device_type & CL_DEVICE_TYPE_CPU != 0 {
            DeviceClass::Cpu
        } else {
            DeviceClass::Other
        })
    }

    fn device_name(&self, device: &ClDevice) -> Result<String, Status> {
        Ok(Device::new(device.id).name()?)
    }

    fn create_context(&self, platform: &ClPlatform, device: &ClDevice) -> Result<Context, Status> {
        let owned = platform.platform.get_devices(CL_DEVICE_TYPE_ALL)?;
        if !owned.contains(&device.id) {
            return Err(Status::with_detail(
                codes::INVALID_DEVICE,
                format!("device is not part of platform '{}'", platform.name),
            ));
        }
        let properties = context_properties(platform.platform.id());
        Ok(Context::from_devices(
            &[device.id],
            &properties,
            None,
            ptr::null_mut(),
        )?)
    }

    fn create_queue(&self, context: &Context, _device: &ClDevice) -> Result<CommandQueue, Status> {
        // In-order, no profiling. The context holds exactly one device.
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(context, 0)?;
        Ok(queue)
    }

    fn create_buffer(
        &self,
        context: &Context,
        access: BufferAccess,
        len: usize,
        init: Option<&[u8]>,
    ) -> Result<ClBuffer, Status> {
        let buffer = match (access, init) {
            (_, Some(data)) if data.len() != len => {
                return Err(Status::with_detail(
                    codes::INVALID_VALUE,
                    format!("initial data is {} bytes, buffer is {len}", data.len()),
                ));
            }
            // The driver copies `data` during the call and never writes through the pointer.
            (BufferAccess::ReadOnly, Some(data)) => unsafe {
                Buffer::<cl_uchar>::create(
                    context,
                    CL_MEM_READ_ONLY | CL_MEM_COPY_HOST_PTR,
                    len,
                    data.as_ptr() as *mut _,
                )?
            },
            (BufferAccess::ReadOnly, None) => unsafe {
                Buffer::<cl_uchar>::create(context, CL_MEM_READ_ONLY, len, ptr::null_mut())?
            },
            (BufferAccess::WriteOnly, _) => unsafe {
                Buffer::<cl_uchar>::create(context, CL_MEM_WRITE_ONLY, len, ptr::null_mut())?
            },
        };
        Ok(ClBuffer { buffer, len })
    }

    fn create_program(&self, context: &Context, source: &str) -> Result<Program, Status> {
        Ok(Program::create_from_source(context, source)?)
    }

    fn build_program(&self, program: &mut Program, device: &ClDevice) -> Result<(), Status> {
        Ok(program.build(&[device.id], "")?)
    }

    fn build_log(&self, program: &Program, device: &ClDevice) -> Result<String, Status> {
        Ok(program.get_build_log(device.id)?)
    }

    fn create_kernel(&self, program: &Program, name: &str) -> Result<Kernel, Status> {
        Ok(Kernel::create(program, name)?)
    }

    fn set_kernel_arg(
        &self,
        kernel: &mut Kernel,
        index: u32,
        arg: KernelArg<'_, ClBuffer>,
    ) -> Result<(), Status> {
        // Argument sizes match the kernel signature: cl_mem for buffers, cl_uint for `n`.
        unsafe {
            match arg {
                KernelArg::Buffer(buffer) => kernel.set_arg(index, &buffer.buffer.get())?,
                KernelArg::Uint(value) => kernel.set_arg(index, &(value as cl_uint))?,
            }
        }
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        queue: &CommandQueue,
        kernel: &Kernel,
        global: usize,
        local: usize,
    ) -> Result<Event, Status> {
        let global_work_size = [global];
        let local_work_size = [local];
        // All arguments were bound through set_kernel_arg.
        let event = unsafe {
            queue.enqueue_nd_range_kernel(
                kernel.get(),
                1,
                ptr::null(),
                global_work_size.as_ptr(),
                local_work_size.as_ptr(),
                &[],
            )?
        };
        Ok(event)
    }

    fn enqueue_read(
        &self,
        queue: &CommandQueue,
        buffer: &ClBuffer,
        dst: &mut [u8],
    ) -> Result<Event, Status> {
        if dst.len() > buffer.len {
            return Err(Status::with_detail(
                codes::INVALID_VALUE,
                format!("read of {} bytes from a {}-byte buffer", dst.len(), buffer.len),
            ));
        }
        // Blocking: the copy into `dst` is complete before the borrow ends.
        let event = unsafe { queue.enqueue_read_buffer(&buffer.buffer, CL_BLOCKING, 0, dst, &[])? };
        Ok(event)
    }

    fn wait(&self, event: &Event) -> Result<(), Status> {
        Ok(event.wait()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_properties_name_the_platform() {
        let platform = 0x5000 as cl_platform_id;
        let properties = context_properties(platform);
        assert_eq!(properties[0], 0x1084);
        assert_eq!(properties[1], 0x5000);
        assert_eq!(properties[2], 0);
    }
}
