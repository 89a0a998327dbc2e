//! wgpu backend.
//!
//! Maps the driver model onto wgpu:
//! - platform: one wgpu backend (Vulkan, Metal, DX12, GL) with its adapters
//! - device: an adapter, classified by `wgpu::DeviceType`
//! - context and queue: the `wgpu::Device`/`wgpu::Queue` pair from one request
//! - program: WGSL parsed and validated with naga; the build log is naga's
//!   diagnostic output plus the shader module's compilation messages
//! - kernel: a compute pipeline with an automatic bind group layout
//! - event: a queue submission index, waited on with `PollType::Wait`
//!
//! Storage buffers are padded to `wgpu::COPY_BUFFER_ALIGNMENT`; kernels see
//! bytes packed four to a `u32`. Launches wider than the per-dimension
//! workgroup limit fold into a 2-D grid, and the kernel flattens the id
//! again using `num_workgroups`.

use super::{BufferAccess, DeviceClass, Driver, KernelArg};
use crate::error::{Status, codes};
use std::borrow::Cow;
use std::cell::Cell;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Rounds `len` up to the copy alignment (at least one word).
fn padded_size(len: usize) -> u64 {
    (len as u64)
        .div_ceil(wgpu::COPY_BUFFER_ALIGNMENT)
        .max(1)
        * wgpu::COPY_BUFFER_ALIGNMENT
}

/// All adapters exposed through one wgpu backend.
#[derive(Debug, Clone)]
pub struct WgpuPlatform {
    pub backend: wgpu::Backend,
    adapters: Vec<Arc<wgpu::Adapter>>,
}

#[derive(Debug, Clone)]
pub struct WgpuDevice {
    adapter: Arc<wgpu::Adapter>,
    pub info: wgpu::AdapterInfo,
}

pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    /// Handed out once by `create_queue`.
    queue: Cell<Option<wgpu::Queue>>,
    limits: wgpu::Limits,
}

pub struct WgpuQueue {
    device: Arc<wgpu::Device>,
    queue: wgpu::Queue,
}

pub struct WgpuBuffer {
    buffer: Arc<wgpu::Buffer>,
    len: usize,
}

pub struct WgpuProgram {
    device: Arc<wgpu::Device>,
    source: String,
    log: String,
    built: Option<BuiltShader>,
}

struct BuiltShader {
    shader: wgpu::ShaderModule,
    entry_points: Vec<ComputeEntry>,
    /// Bindings declared in group 0.
    arity: usize,
}

#[derive(Debug, Clone)]
struct ComputeEntry {
    name: String,
    workgroup_size: [u32; 3],
}

enum BoundArg {
    Storage(Arc<wgpu::Buffer>),
    Uniform(wgpu::Buffer),
}

impl BoundArg {
    fn buffer(&self) -> &wgpu::Buffer {
        match self {
            Self::Storage(buffer) => buffer,
            Self::Uniform(buffer) => buffer,
        }
    }
}

pub struct WgpuKernel {
    device: Arc<wgpu::Device>,
    pipeline: wgpu::ComputePipeline,
    workgroup_size: u32,
    max_groups_per_dimension: u32,
    args: Vec<Option<BoundArg>>,
}

/// Submission to wait on.
pub struct WgpuEvent {
    device: Arc<wgpu::Device>,
    submission: wgpu::SubmissionIndex,
}

/// Driver over every backend wgpu can reach.
pub struct WgpuDriver {
    instance: wgpu::Instance,
}

impl Default for WgpuDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl WgpuDriver {
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        Self { instance }
    }
}

fn poll_wait(device: &wgpu::Device, submission: wgpu::SubmissionIndex) -> Result<(), Status> {
    device
        .poll(wgpu::PollType::Wait {
            submission_index: Some(submission),
            timeout: None,
        })
        .map(|_| ())
        .map_err(|e| Status::with_detail(codes::OUT_OF_RESOURCES, format!("GPU poll failed: {e:?}")))
}

fn build_shader(device: &wgpu::Device, source: &str, log: &mut String) -> Result<BuiltShader, Status> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        log.push_str(&e.emit_to_string(source));
        Status::new(codes::BUILD_PROGRAM_FAILURE)
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    );
    validator.validate(&module).map_err(|e| {
        log.push_str(&e.emit_to_string(source));
        Status::new(codes::BUILD_PROGRAM_FAILURE)
    })?;

    let entry_points = module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == naga::ShaderStage::Compute)
        .map(|ep| ComputeEntry {
            name: ep.name.clone(),
            workgroup_size: ep.workgroup_size,
        })
        .collect();
    let arity = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| var.binding.as_ref())
        .filter(|binding| binding.group == 0)
        .map(|binding| binding.binding as usize + 1)
        .max()
        .unwrap_or(0);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("xorcheck kernel"),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    });
    let info = pollster::block_on(shader.get_compilation_info());
    for message in &info.messages {
        log.push_str(&format!("{:?}: {}\n", message.message_type, message.message));
    }

    Ok(BuiltShader {
        shader,
        entry_points,
        arity,
    })
}

impl Driver for WgpuDriver {
    type Platform = WgpuPlatform;
    type Device = WgpuDevice;
    type Context = WgpuContext;
    type Queue = WgpuQueue;
    type Buffer = WgpuBuffer;
    type Program = WgpuProgram;
    type Kernel = WgpuKernel;
    type Event = WgpuEvent;

    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn platforms(&self) -> Result<Vec<WgpuPlatform>, Status> {
        let adapters = pollster::block_on(self.instance.enumerate_adapters(wgpu::Backends::all()));

        let mut platforms: Vec<WgpuPlatform> = Vec::new();
        for adapter in adapters {
            let backend = adapter.get_info().backend;
            let adapter = Arc::new(adapter);
            match platforms.iter_mut().find(|p| p.backend == backend) {
                Some(platform) => platform.adapters.push(adapter),
                None => platforms.push(WgpuPlatform {
                    backend,
                    adapters: vec![adapter],
                }),
            }
        }
        Ok(platforms)
    }

    fn devices(&self, platform: &WgpuPlatform) -> Result<Vec<WgpuDevice>, Status> {
        Ok(platform
            .adapters
            .iter()
            .map(|adapter| WgpuDevice {
                adapter: Arc::clone(adapter),
                info: adapter.get_info(),
            })
            .collect())
    }

    fn device_class(&self, device: &WgpuDevice) -> Result<DeviceClass, Status> {
        Ok(match device.info.device_type {
            wgpu::DeviceType::DiscreteGpu
            | wgpu::DeviceType::IntegratedGpu
            | wgpu::DeviceType::VirtualGpu => DeviceClass::Gpu,
            wgpu::DeviceType::Cpu => DeviceClass::Cpu,
            wgpu::DeviceType::Other => DeviceClass::Other,
        })
    }

    fn device_name(&self, device: &WgpuDevice) -> Result<String, Status> {
        Ok(format!("{} ({:?})", device.info.name, device.info.backend))
    }

    fn create_context(
        &self,
        platform: &WgpuPlatform,
        device: &WgpuDevice,
    ) -> Result<WgpuContext, Status> {
        if device.info.backend != platform.backend {
            return Err(Status::with_detail(
                codes::INVALID_DEVICE,
                "adapter does not belong to this backend",
            ));
        }

        let limits = device.adapter.limits();
        let device_desc = wgpu::DeviceDescriptor {
            label: Some("xorcheck"),
            required_limits: limits.clone(),
            ..Default::default()
        };
        let (gpu, queue) = pollster::block_on(device.adapter.request_device(&device_desc))
            .map_err(|e| {
                Status::with_detail(
                    codes::DEVICE_NOT_AVAILABLE,
                    format!("Failed to create device: {e}"),
                )
            })?;

        Ok(WgpuContext {
            device: Arc::new(gpu),
            queue: Cell::new(Some(queue)),
            limits,
        })
    }

    fn create_queue(&self, context: &WgpuContext, _device: &WgpuDevice) -> Result<WgpuQueue, Status> {
        let queue = context.queue.take().ok_or_else(|| {
            Status::with_detail(codes::INVALID_COMMAND_QUEUE, "queue already created")
        })?;
        Ok(WgpuQueue {
            device: Arc::clone(&context.device),
            queue,
        })
    }

    fn create_buffer(
        &self,
        context: &WgpuContext,
        access: BufferAccess,
        len: usize,
        init: Option<&[u8]>,
    ) -> Result<WgpuBuffer, Status> {
        let size = padded_size(len);
        if size > context.limits.max_buffer_size
            || size > u64::from(context.limits.max_storage_buffer_binding_size)
        {
            return Err(Status::with_detail(
                codes::MEM_OBJECT_ALLOCATION_FAILURE,
                format!("{size} bytes exceeds the device's storage buffer limits"),
            ));
        }

        // Only the kernel's output is ever copied back to the host.
        let usage = match access {
            BufferAccess::ReadOnly => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            BufferAccess::WriteOnly => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        };
        let buffer = match init {
            Some(data) if data.len() != len => {
                return Err(Status::with_detail(
                    codes::INVALID_VALUE,
                    format!("initial data is {} bytes, buffer is {len}", data.len()),
                ));
            }
            // Pads the contents up to the copy alignment.
            Some(data) => context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("xorcheck input"),
                    contents: data,
                    usage,
                }),
            None => context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("xorcheck output"),
                size,
                usage,
                mapped_at_creation: false,
            }),
        };

        Ok(WgpuBuffer {
            buffer: Arc::new(buffer),
            len,
        })
    }

    fn create_program(&self, context: &WgpuContext, source: &str) -> Result<WgpuProgram, Status> {
        Ok(WgpuProgram {
            device: Arc::clone(&context.device),
            source: source.to_string(),
            log: String::new(),
            built: None,
        })
    }

    fn build_program(&self, program: &mut WgpuProgram, _device: &WgpuDevice) -> Result<(), Status> {
        let mut log = String::new();
        let built = build_shader(&program.device, &program.source, &mut log);
        program.log = log;
        program.built = Some(built?);
        Ok(())
    }

    fn build_log(&self, program: &WgpuProgram, _device: &WgpuDevice) -> Result<String, Status> {
        Ok(program.log.clone())
    }

    fn create_kernel(&self, program: &WgpuProgram, name: &str) -> Result<WgpuKernel, Status> {
        let built = program
            .built
            .as_ref()
            .ok_or_else(|| Status::new(codes::INVALID_PROGRAM_EXECUTABLE))?;
        let entry = built
            .entry_points
            .iter()
            .find(|ep| ep.name == name)
            .ok_or_else(|| Status::with_detail(codes::INVALID_KERNEL_NAME, name.to_string()))?;
        if entry.workgroup_size[1] != 1 || entry.workgroup_size[2] != 1 {
            return Err(Status::with_detail(
                codes::INVALID_WORK_GROUP_SIZE,
                format!("entry point '{name}' is not one-dimensional"),
            ));
        }

        let pipeline = program
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(name),
                layout: None,
                module: &built.shader,
                entry_point: Some(name),
                compilation_options: Default::default(),
                cache: None,
            });

        let mut args = Vec::with_capacity(built.arity);
        args.resize_with(built.arity, || None);
        Ok(WgpuKernel {
            device: Arc::clone(&program.device),
            pipeline,
            workgroup_size: entry.workgroup_size[0],
            max_groups_per_dimension: program.device.limits().max_compute_workgroups_per_dimension,
            args,
        })
    }

    fn set_kernel_arg(
        &self,
        kernel: &mut WgpuKernel,
        index: u32,
        arg: KernelArg<'_, WgpuBuffer>,
    ) -> Result<(), Status> {
        let bound = match arg {
            KernelArg::Buffer(buffer) => BoundArg::Storage(Arc::clone(&buffer.buffer)),
            KernelArg::Uint(value) => {
                BoundArg::Uniform(kernel.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("xorcheck scalar"),
                    contents: bytemuck::cast_slice(&[value, 0, 0, 0]),
                    usage: wgpu::BufferUsages::UNIFORM,
                }))
            }
        };
        let slot = kernel
            .args
            .get_mut(index as usize)
            .ok_or_else(|| Status::new(codes::INVALID_ARG_INDEX))?;
        *slot = Some(bound);
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        queue: &WgpuQueue,
        kernel: &WgpuKernel,
        global: usize,
        local: usize,
    ) -> Result<WgpuEvent, Status> {
        if local != kernel.workgroup_size as usize {
            return Err(Status::with_detail(
                codes::INVALID_WORK_GROUP_SIZE,
                format!(
                    "local size {local} does not match the kernel's @workgroup_size({})",
                    kernel.workgroup_size
                ),
            ));
        }
        if global == 0 || global % local != 0 {
            return Err(Status::new(codes::INVALID_GLOBAL_WORK_SIZE));
        }

        let groups = u32::try_from(global / local)
            .map_err(|_| Status::new(codes::INVALID_GLOBAL_WORK_SIZE))?;
        let x = groups.min(kernel.max_groups_per_dimension);
        let y = groups.div_ceil(x);
        if y > kernel.max_groups_per_dimension {
            return Err(Status::with_detail(
                codes::INVALID_GLOBAL_WORK_SIZE,
                format!("{groups} workgroups exceed the device's 2-D dispatch limit"),
            ));
        }

        let entries = kernel
            .args
            .iter()
            .enumerate()
            .map(|(binding, arg)| {
                arg.as_ref().map(|arg| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: arg.buffer().as_entire_binding(),
                })
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Status::with_detail(codes::INVALID_KERNEL_ARGS, "unbound kernel arguments"))?;
        let bind_group = kernel.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("xorcheck bindings"),
            layout: &kernel.pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let mut encoder = kernel
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("xorcheck dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("xorcheck dispatch"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(x, y, 1);
        }
        let submission = queue.queue.submit(std::iter::once(encoder.finish()));

        Ok(WgpuEvent {
            device: Arc::clone(&queue.device),
            submission,
        })
    }

    // Mapping the staging buffer waits for the copy.
    fn enqueue_read(
        &self,
        queue: &WgpuQueue,
        buffer: &WgpuBuffer,
        dst: &mut [u8],
    ) -> Result<WgpuEvent, Status> {
        if dst.len() > buffer.len {
            return Err(Status::with_detail(
                codes::INVALID_VALUE,
                format!("read of {} bytes from a {}-byte buffer", dst.len(), buffer.len),
            ));
        }
        let copy_size = padded_size(dst.len());

        let staging = queue.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("download_staging"),
            size: copy_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = queue
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("download_copy"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, copy_size);
        let submission = queue.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        poll_wait(&queue.device, submission.clone())?;

        receiver
            .recv()
            .map_err(|e| Status::with_detail(codes::OUT_OF_RESOURCES, format!("Map recv failed: {e}")))?
            .map_err(|e| Status::with_detail(codes::OUT_OF_RESOURCES, format!("Map failed: {e}")))?;
        {
            let mapped = slice.get_mapped_range();
            dst.copy_from_slice(&mapped[..dst.len()]);
        }
        staging.unmap();

        Ok(WgpuEvent {
            device: Arc::clone(&queue.device),
            submission,
        })
    }

    fn wait(&self, event: &WgpuEvent) -> Result<(), Status> {
        poll_wait(&event.device, event.submission.clone())
    }
}
