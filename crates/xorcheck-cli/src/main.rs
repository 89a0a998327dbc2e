//! xorcheck - runs a boolean XOR over two large arrays on the preferred
//! accelerator, times the dispatch and readback loops, and verifies the result.

use anyhow::{Context, Result};
use clap::Parser;
use xorcheck_cli::inputs::generate_inputs;
use xorcheck_cli::report::format_report;
use xorcheck_cli::source::{kernel_path, load_kernel_source};
use xorcheck_runtime::driver::Driver;
use xorcheck_runtime::{RunConfig, RunReport, run};

#[derive(Parser)]
#[command(name = "xorcheck")]
#[command(about = "Dispatch-and-verify XOR run on the preferred accelerator", long_about = None)]
#[command(version)]
struct Cli {}

fn main() -> Result<()> {
    let _cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let config = RunConfig::default();
    let report = run_backend(&config)?;
    println!("{}", format_report(&report));
    Ok(())
}

#[cfg(feature = "opencl")]
fn run_backend(config: &RunConfig) -> Result<RunReport> {
    execute(&xorcheck_runtime::driver::opencl::OpenClDriver::new(), config)
}

#[cfg(all(feature = "wgpu", not(feature = "opencl")))]
fn run_backend(config: &RunConfig) -> Result<RunReport> {
    execute(&xorcheck_runtime::driver::wgpu_backend::WgpuDriver::new(), config)
}

#[cfg(not(any(feature = "wgpu", feature = "opencl")))]
fn run_backend(config: &RunConfig) -> Result<RunReport> {
    execute(&xorcheck_runtime::driver::emulated::EmulatedDriver::host(), config)
}

fn execute<D: Driver>(driver: &D, config: &RunConfig) -> Result<RunReport> {
    let path = kernel_path(driver.backend_name());
    let source = load_kernel_source(&path);
    tracing::info!(
        backend = driver.backend_name(),
        kernel = %path.display(),
        n = config.problem_size,
        "starting run"
    );

    let (a, b) = generate_inputs(config.problem_size, config.seed);
    run(driver, config, &source, &a, &b)
        .with_context(|| format!("XOR run on the {} backend failed", driver.backend_name()))
}
