//! Host-emulated accelerator.
//!
//! Runs kernels as host functions over scripted platforms and devices. Used by
//! the test suite and as the fallback backend when no accelerator feature is
//! enabled. Every driver call and every resource release is appended to a
//! [`Journal`], and any call can be made to fail with a chosen status.
//!
//! "Compiling" a program scans the source for `kernel void <name>(...)`
//! declarations and binds each name to a registered [`HostKernel`].

use super::{BufferAccess, DeviceClass, Driver, KernelArg};
use crate::error::{Status, codes};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

/// A kernel body executed on the host for one whole launch.
pub type HostKernel = fn(&HostLaunch<'_>) -> Result<(), Status>;

/// Log of every driver call and release, in order.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Number of entries equal to `call`.
    pub fn count(&self, call: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == call).count()
    }

    /// Release entries (`release_*`) in the order they happened.
    pub fn releases(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.starts_with("release_"))
            .cloned()
            .collect()
    }
}

/// Records `release_<what>` when dropped.
#[derive(Debug)]
struct Release {
    journal: Journal,
    what: &'static str,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.journal.record(format!("release_{}", self.what));
    }
}

#[derive(Debug, Clone)]
struct PlatformSpec {
    name: String,
    devices: Vec<DeviceClass>,
}

/// Platform handle.
#[derive(Debug, Clone)]
pub struct EmulatedPlatform {
    index: usize,
    name: String,
}

impl EmulatedPlatform {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Device handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatedDevice {
    pub platform: usize,
    pub index: usize,
    pub class: DeviceClass,
}

#[derive(Debug)]
pub struct EmulatedContext {
    device: EmulatedDevice,
    _release: Release,
}

#[derive(Debug)]
pub struct EmulatedQueue {
    _release: Release,
}

/// Device memory shared between a buffer handle and the kernel arguments
/// bound to it.
#[derive(Debug)]
pub struct Memory {
    access: BufferAccess,
    bytes: RefCell<Vec<u8>>,
}

#[derive(Debug)]
pub struct EmulatedBuffer {
    memory: Rc<Memory>,
    _release: Release,
}

impl EmulatedBuffer {
    pub fn access(&self) -> BufferAccess {
        self.memory.access
    }

    pub fn len(&self) -> usize {
        self.memory.bytes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct EmulatedProgram {
    source: String,
    log: String,
    /// `None` until built; then the declared kernels or the build status.
    built: Option<Result<Vec<Declaration>, Status>>,
    _release: Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    name: String,
    arity: usize,
}

#[derive(Debug)]
pub struct EmulatedKernel {
    name: String,
    body: HostKernel,
    args: Vec<Option<HostArg>>,
    _release: Release,
}

/// Completion handle; host execution finishes before the enqueue returns.
#[derive(Debug)]
pub struct EmulatedEvent {
    pub command: &'static str,
}

#[derive(Debug, Clone)]
enum HostArg {
    Buffer(Rc<Memory>),
    Uint(u32),
}

/// Arguments and grid of one host kernel launch.
pub struct HostLaunch<'a> {
    args: &'a [HostArg],
    global_size: usize,
}

impl HostLaunch<'_> {
    pub fn global_size(&self) -> usize {
        self.global_size
    }

    fn memory(&self, index: usize) -> Result<&Memory, Status> {
        match self.args.get(index) {
            Some(HostArg::Buffer(memory)) => Ok(memory),
            _ => Err(Status::with_detail(
                codes::INVALID_ARG_VALUE,
                format!("argument {index} is not a buffer"),
            )),
        }
    }

    /// Borrows a read-only buffer argument.
    pub fn read(&self, index: usize) -> Result<Ref<'_, Vec<u8>>, Status> {
        let memory = self.memory(index)?;
        if memory.access != BufferAccess::ReadOnly {
            return Err(Status::with_detail(
                codes::INVALID_MEM_OBJECT,
                format!("argument {index} is not readable from a kernel"),
            ));
        }
        Ok(memory.bytes.borrow())
    }

    /// Borrows a write-only buffer argument.
    pub fn write(&self, index: usize) -> Result<RefMut<'_, Vec<u8>>, Status> {
        let memory = self.memory(index)?;
        if memory.access != BufferAccess::WriteOnly {
            return Err(Status::with_detail(
                codes::INVALID_MEM_OBJECT,
                format!("argument {index} is not writable from a kernel"),
            ));
        }
        Ok(memory.bytes.borrow_mut())
    }

    pub fn uint(&self, index: usize) -> Result<u32, Status> {
        match self.args.get(index) {
            Some(HostArg::Uint(value)) => Ok(*value),
            _ => Err(Status::with_detail(
                codes::INVALID_ARG_VALUE,
                format!("argument {index} is not a scalar"),
            )),
        }
    }
}

/// Host implementation of the `xor` entry point.
///
/// Same contract as the device kernels: `(a, b, c, n)`, one byte per element,
/// non-zero is true, work items at or past `n` do nothing.
pub fn xor_kernel(launch: &HostLaunch<'_>) -> Result<(), Status> {
    let a = launch.read(0)?;
    let b = launch.read(1)?;
    let mut c = launch.write(2)?;
    let n = launch.uint(3)? as usize;
    if n > a.len() || n > b.len() || n > c.len() {
        return Err(Status::with_detail(
            codes::OUT_OF_RESOURCES,
            "element count exceeds buffer length",
        ));
    }

    for gid in 0..launch.global_size().min(n) {
        c[gid] = u8::from((a[gid] != 0) ^ (b[gid] != 0));
    }
    Ok(())
}

/// Host-emulated driver.
pub struct EmulatedDriver {
    platforms: Vec<PlatformSpec>,
    kernels: HashMap<String, HostKernel>,
    build_log: String,
    build_failure: Option<Status>,
    failures: HashMap<&'static str, Status>,
    journal: Journal,
}

impl Default for EmulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedDriver {
    /// A driver with no platforms and the `xor` host kernel registered.
    pub fn new() -> Self {
        let mut kernels: HashMap<String, HostKernel> = HashMap::new();
        kernels.insert("xor".to_string(), xor_kernel);
        Self {
            platforms: Vec::new(),
            kernels,
            build_log: String::new(),
            build_failure: None,
            failures: HashMap::new(),
            journal: Journal::default(),
        }
    }

    /// One platform with a single CPU-class device.
    pub fn host() -> Self {
        Self::new().with_platform("Emulated Host", &[DeviceClass::Cpu])
    }

    /// Appends a platform whose devices have the given classes, in order.
    pub fn with_platform(mut self, name: impl Into<String>, devices: &[DeviceClass]) -> Self {
        self.platforms.push(PlatformSpec {
            name: name.into(),
            devices: devices.to_vec(),
        });
        self
    }

    /// Registers (or replaces) the host body for kernel `name`.
    pub fn with_kernel(mut self, name: impl Into<String>, body: HostKernel) -> Self {
        self.kernels.insert(name.into(), body);
        self
    }

    /// Log text returned after a build.
    pub fn with_build_log(mut self, log: impl Into<String>) -> Self {
        self.build_log = log.into();
        self
    }

    /// Makes every build fail with `status`, after producing the build log.
    pub fn with_build_failure(mut self, status: Status) -> Self {
        self.build_failure = Some(status);
        self
    }

    /// Makes every invocation of `call` fail with `status`.
    pub fn fail_on(mut self, call: &'static str, status: Status) -> Self {
        self.failures.insert(call, status);
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Records the call, then applies any injected failure.
    fn enter(&self, call: &'static str) -> Result<(), Status> {
        self.journal.record(call);
        match self.failures.get(call) {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    fn release(&self, what: &'static str) -> Release {
        Release {
            journal: self.journal.clone(),
            what,
        }
    }

    fn platform_spec(&self, index: usize) -> Result<&PlatformSpec, Status> {
        self.platforms
            .get(index)
            .ok_or_else(|| Status::new(codes::INVALID_PLATFORM))
    }
}

impl Driver for EmulatedDriver {
    type Platform = EmulatedPlatform;
    type Device = EmulatedDevice;
    type Context = EmulatedContext;
    type Queue = EmulatedQueue;
    type Buffer = EmulatedBuffer;
    type Program = EmulatedProgram;
    type Kernel = EmulatedKernel;
    type Event = EmulatedEvent;

    fn backend_name(&self) -> &'static str {
        "emulated"
    }

    fn platforms(&self) -> Result<Vec<EmulatedPlatform>, Status> {
        self.enter("platforms")?;
        Ok(self
            .platforms
            .iter()
            .enumerate()
            .map(|(index, spec)| EmulatedPlatform {
                index,
                name: spec.name.clone(),
            })
            .collect())
    }

    fn devices(&self, platform: &EmulatedPlatform) -> Result<Vec<EmulatedDevice>, Status> {
        self.enter("devices")?;
        let spec = self.platform_spec(platform.index)?;
        Ok(spec
            .devices
            .iter()
            .enumerate()
            .map(|(index, &class)| EmulatedDevice {
                platform: platform.index,
                index,
                class,
            })
            .collect())
    }

    fn device_class(&self, device: &EmulatedDevice) -> Result<DeviceClass, Status> {
        self.enter("device_class")?;
        Ok(device.class)
    }

    fn device_name(&self, device: &EmulatedDevice) -> Result<String, Status> {
        self.enter("device_name")?;
        let spec = self.platform_spec(device.platform)?;
        Ok(format!("{} {} #{}", spec.name, device.class, device.index))
    }

    fn create_context(
        &self,
        platform: &EmulatedPlatform,
        device: &EmulatedDevice,
    ) -> Result<EmulatedContext, Status> {
        self.enter("create_context")?;
        if device.platform != platform.index {
            return Err(Status::with_detail(
                codes::INVALID_DEVICE,
                "device does not belong to platform",
            ));
        }
        Ok(EmulatedContext {
            device: device.clone(),
            _release: self.release("context"),
        })
    }

    fn create_queue(
        &self,
        context: &EmulatedContext,
        device: &EmulatedDevice,
    ) -> Result<EmulatedQueue, Status> {
        self.enter("create_queue")?;
        if context.device != *device {
            return Err(Status::new(codes::INVALID_DEVICE));
        }
        Ok(EmulatedQueue {
            _release: self.release("queue"),
        })
    }

    fn create_buffer(
        &self,
        _context: &EmulatedContext,
        access: BufferAccess,
        len: usize,
        init: Option<&[u8]>,
    ) -> Result<EmulatedBuffer, Status> {
        self.enter("create_buffer")?;
        if len == 0 {
            return Err(Status::new(codes::INVALID_BUFFER_SIZE));
        }
        let bytes = match init {
            Some(data) if data.len() != len => {
                return Err(Status::with_detail(
                    codes::INVALID_VALUE,
                    format!("initial data is {} bytes, buffer is {len}", data.len()),
                ));
            }
            Some(data) => data.to_vec(),
            None => vec![0; len],
        };
        Ok(EmulatedBuffer {
            memory: Rc::new(Memory {
                access,
                bytes: RefCell::new(bytes),
            }),
            _release: self.release("buffer"),
        })
    }

    fn create_program(
        &self,
        _context: &EmulatedContext,
        source: &str,
    ) -> Result<EmulatedProgram, Status> {
        self.enter("create_program")?;
        Ok(EmulatedProgram {
            source: source.to_string(),
            log: String::new(),
            built: None,
            _release: self.release("program"),
        })
    }

    fn build_program(
        &self,
        program: &mut EmulatedProgram,
        _device: &EmulatedDevice,
    ) -> Result<(), Status> {
        self.enter("build_program")?;
        program.log = self.build_log.clone();

        let outcome = match &self.build_failure {
            Some(status) => Err(status.clone()),
            None => {
                let declared = declared_kernels(&program.source);
                match declared.iter().find(|d| !self.kernels.contains_key(&d.name)) {
                    Some(missing) => {
                        program.log.push_str(&format!(
                            "error: no host implementation for kernel '{}'\n",
                            missing.name
                        ));
                        Err(Status::new(codes::BUILD_PROGRAM_FAILURE))
                    }
                    None => Ok(declared),
                }
            }
        };

        let result = outcome.as_ref().map(|_| ()).map_err(Clone::clone);
        program.built = Some(outcome);
        result
    }

    fn build_log(
        &self,
        program: &EmulatedProgram,
        _device: &EmulatedDevice,
    ) -> Result<String, Status> {
        self.enter("build_log")?;
        Ok(program.log.clone())
    }

    fn create_kernel(&self, program: &EmulatedProgram, name: &str) -> Result<EmulatedKernel, Status> {
        self.enter("create_kernel")?;
        let declared = match &program.built {
            Some(Ok(declared)) => declared,
            _ => return Err(Status::new(codes::INVALID_PROGRAM_EXECUTABLE)),
        };
        let declaration = declared
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Status::with_detail(codes::INVALID_KERNEL_NAME, name.to_string()))?;
        let body = self
            .kernels
            .get(name)
            .copied()
            .ok_or_else(|| Status::new(codes::INVALID_KERNEL_NAME))?;

        Ok(EmulatedKernel {
            name: name.to_string(),
            body,
            args: vec![None; declaration.arity],
            _release: self.release("kernel"),
        })
    }

    fn set_kernel_arg(
        &self,
        kernel: &mut EmulatedKernel,
        index: u32,
        arg: KernelArg<'_, EmulatedBuffer>,
    ) -> Result<(), Status> {
        self.enter("set_kernel_arg")?;
        let slot = kernel
            .args
            .get_mut(index as usize)
            .ok_or_else(|| Status::new(codes::INVALID_ARG_INDEX))?;
        *slot = Some(match arg {
            KernelArg::Buffer(buffer) => HostArg::Buffer(Rc::clone(&buffer.memory)),
            KernelArg::Uint(value) => HostArg::Uint(value),
        });
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        _queue: &EmulatedQueue,
        kernel: &EmulatedKernel,
        global: usize,
        local: usize,
    ) -> Result<EmulatedEvent, Status> {
        self.enter("enqueue_kernel")?;
        if global == 0 {
            return Err(Status::new(codes::INVALID_GLOBAL_WORK_SIZE));
        }
        if local == 0 || global % local != 0 {
            return Err(Status::new(codes::INVALID_WORK_GROUP_SIZE));
        }
        let args = kernel
            .args
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                Status::with_detail(
                    codes::INVALID_KERNEL_ARGS,
                    format!("kernel '{}' has unbound arguments", kernel.name),
                )
            })?;

        (kernel.body)(&HostLaunch {
            args: &args,
            global_size: global,
        })?;
        Ok(EmulatedEvent {
            command: "enqueue_kernel",
        })
    }

    fn enqueue_read(
        &self,
        _queue: &EmulatedQueue,
        buffer: &EmulatedBuffer,
        dst: &mut [u8],
    ) -> Result<EmulatedEvent, Status> {
        self.enter("enqueue_read")?;
        let bytes = buffer.memory.bytes.borrow();
        if dst.len() > bytes.len() {
            return Err(Status::with_detail(
                codes::INVALID_VALUE,
                format!("read of {} bytes from a {}-byte buffer", dst.len(), bytes.len()),
            ));
        }
        dst.copy_from_slice(&bytes[..dst.len()]);
        Ok(EmulatedEvent {
            command: "enqueue_read",
        })
    }

    fn wait(&self, _event: &EmulatedEvent) -> Result<(), Status> {
        self.enter("wait")
    }
}

/// Finds `kernel void name(params)` declarations and their parameter counts.
fn declared_kernels(source: &str) -> Vec<Declaration> {
    const MARKER: &str = "kernel void ";
    let mut found = Vec::new();
    let mut rest = source;

    while let Some(pos) = rest.find(MARKER) {
        rest = &rest[pos + MARKER.len()..];
        let name: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        let params = rest
            .find('(')
            .and_then(|open| rest[open + 1..].find(')').map(|close| &rest[open + 1..open + 1 + close]));
        if name.is_empty() {
            continue;
        }
        let arity = match params {
            Some(p) if p.trim().is_empty() => 0,
            Some(p) => p.split(',').count(),
            None => 0,
        };
        found.push(Declaration { name, arity });
    }
    found
}
