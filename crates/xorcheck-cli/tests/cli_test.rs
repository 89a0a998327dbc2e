//! Kernel loading and the shipped kernels on the emulated driver.

use std::io::Write;
use tempfile::NamedTempFile;
use xorcheck_cli::inputs::generate_inputs;
use xorcheck_cli::report::format_report;
use xorcheck_cli::source::{kernel_path, load_kernel_source};
use xorcheck_runtime::driver::emulated::EmulatedDriver;
use xorcheck_runtime::{RunConfig, RuntimeError, run};

fn config(n: usize) -> RunConfig {
    RunConfig {
        problem_size: n,
        seed: Some(1234),
        ..RunConfig::default()
    }
}

#[test]
fn test_load_kernel_source_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "__kernel void xor() {{}}").unwrap();

    assert_eq!(load_kernel_source(file.path()), "__kernel void xor() {}");
}

#[test]
fn test_missing_source_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let source = load_kernel_source(&dir.path().join("nope.cl"));
    assert!(source.is_empty());
}

#[test]
fn test_missing_source_fails_run_with_hint() {
    let dir = tempfile::tempdir().unwrap();
    let source = load_kernel_source(&dir.path().join("nope.cl"));
    let driver = EmulatedDriver::host();
    let (a, b) = generate_inputs(8, Some(1));

    let err = run(&driver, &config(8), &source, &a, &b).unwrap_err();
    assert!(matches!(err, RuntimeError::EmptySource));
    assert!(err.to_string().contains("working directory"));
    assert_eq!(driver.journal().count("build_program"), 0);
}

#[test]
fn test_kernel_paths() {
    assert!(kernel_path("wgpu").ends_with("kernels/xor.wgsl"));
    assert!(kernel_path("opencl").ends_with("kernels/xor.cl"));
    assert!(kernel_path("emulated").ends_with("kernels/xor.cl"));
    assert!(kernel_path("wgpu").exists());
    assert!(kernel_path("opencl").exists());
}

#[test]
fn test_shipped_kernel_runs_on_emulated_driver() {
    let source = load_kernel_source(&kernel_path("emulated"));
    let driver = EmulatedDriver::host();
    let config = config(10_000);
    let (a, b) = generate_inputs(config.problem_size, config.seed);

    let report = run(&driver, &config, &source, &a, &b).unwrap();
    assert_eq!(report.plan.global_size, 10_112);

    let text = format_report(&report);
    assert!(text.starts_with("Device: Emulated Host CPU #0 (CPU) via emulated"));
    assert!(text.contains("global 10112, local 128 (112 padding)"));
    assert!(text.contains("Dispatch: 20 iterations"));
    assert!(text.contains("Readback: 20 iterations"));
    assert!(text.ends_with("Results verified: 10000 elements match"));
}
