//! One complete dispatch-and-verify run.

use crate::config::RunConfig;
use crate::context::ExecutionContext;
use crate::dispatch::{DispatchEngine, DispatchPlan, LoopTimings, bind_arguments};
use crate::driver::{DeviceClass, Driver};
use crate::error::{Result, RuntimeError};
use crate::memory::DeviceBuffers;
use crate::program::{build_program, print_log};
use crate::selector::select_device;
use crate::verify::verify_xor;
use std::time::Duration;
use tracing::info;

/// What a successful run did and how long each iteration took.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub backend: &'static str,
    pub device_name: String,
    pub device_class: DeviceClass,
    pub plan: DispatchPlan,
    pub dispatch: LoopTimings,
    pub readback: LoopTimings,
    /// Diagnostics from a build that succeeded anyway.
    pub build_log: Option<String>,
    /// Final readback contents, already verified.
    pub output: Vec<u8>,
}

impl RunReport {
    /// Bytes moved by one dispatch: two inputs read, one output written.
    pub fn bytes_per_dispatch(&self) -> usize {
        3 * self.plan.elements
    }

    /// Effective dispatch bandwidth in GB/s from the mean iteration time.
    pub fn dispatch_bandwidth_gbps(&self) -> Option<f64> {
        bandwidth_gbps(self.bytes_per_dispatch(), self.dispatch.mean()?)
    }

    /// Effective readback bandwidth in GB/s from the mean iteration time.
    pub fn readback_bandwidth_gbps(&self) -> Option<f64> {
        bandwidth_gbps(self.plan.elements, self.readback.mean()?)
    }
}

fn bandwidth_gbps(bytes: usize, per_iteration: Duration) -> Option<f64> {
    let seconds = per_iteration.as_secs_f64();
    (seconds > 0.0).then(|| bytes as f64 / seconds / 1e9)
}

/// Runs the whole cycle on `driver`, printing any build log to stdout.
pub fn run<D: Driver>(
    driver: &D,
    config: &RunConfig,
    source: &str,
    a: &[u8],
    b: &[u8],
) -> Result<RunReport> {
    run_with_log_sink(driver, config, source, a, b, &mut print_log)
}

/// Runs the whole cycle on `driver`, handing any build log to `on_log`.
///
/// Resources are released in reverse acquisition order (kernel, program,
/// buffers, queue, context) whether the run succeeds or fails.
#[tracing::instrument(skip_all, fields(backend = driver.backend_name(), n = a.len()))]
pub fn run_with_log_sink<D: Driver>(
    driver: &D,
    config: &RunConfig,
    source: &str,
    a: &[u8],
    b: &[u8],
    on_log: &mut dyn FnMut(&str),
) -> Result<RunReport> {
    config.validate()?;
    if a.len() != config.problem_size || b.len() != config.problem_size {
        return Err(RuntimeError::InvalidConfig(format!(
            "inputs hold {} and {} elements, configured problem size is {}",
            a.len(),
            b.len(),
            config.problem_size
        )));
    }

    let selected = select_device(driver)?;
    let ctx = ExecutionContext::create(driver, &selected)?;
    let buffers = DeviceBuffers::allocate(driver, &ctx, a, b)?;
    let mut compiled = build_program(
        driver,
        &ctx,
        &selected.device,
        source,
        &config.entry_point,
        on_log,
    )?;
    let build_log = compiled.log().map(str::to_string);

    let plan = DispatchPlan::new(buffers.len(), config.local_size);
    info!(
        global = plan.global_size,
        local = plan.local_size,
        padding = plan.padding(),
        "dispatch grid"
    );

    let bound = bind_arguments(driver, compiled.kernel_mut(), &buffers)?;
    let engine = DispatchEngine::new(driver, ctx.queue(), plan);
    let dispatch = engine.dispatch_loop(&bound, config.dispatch_iterations)?;

    let mut output = vec![0u8; buffers.len()];
    let readback = engine.readback_loop(buffers.c(), &mut output, config.readback_iterations)?;

    verify_xor(a, b, &output)?;

    let report = RunReport {
        backend: driver.backend_name(),
        device_name: selected.name.clone(),
        device_class: selected.class,
        plan,
        dispatch,
        readback,
        build_log,
        output,
    };
    info!(
        dispatch_mean = ?report.dispatch.mean(),
        readback_mean = ?report.readback.mean(),
        "results verified"
    );
    Ok(report)
}
