//! Program build, log surfacing and kernel extraction.

mod common;

use common::{LogCapture, XOR_CL};
use xorcheck_runtime::RuntimeError;
use xorcheck_runtime::context::ExecutionContext;
use xorcheck_runtime::driver::emulated::{EmulatedDriver, HostLaunch};
use xorcheck_runtime::error::{Status, codes};
use xorcheck_runtime::program::build_program;
use xorcheck_runtime::selector::select_device;

fn build(
    driver: &EmulatedDriver,
    source: &str,
    entry_point: &str,
    capture: &mut LogCapture,
) -> xorcheck_runtime::Result<Option<String>> {
    let selected = select_device(driver)?;
    let ctx = ExecutionContext::create(driver, &selected)?;
    let compiled = build_program(
        driver,
        &ctx,
        &selected.device,
        source,
        entry_point,
        &mut capture.sink(),
    )?;
    Ok(compiled.log().map(str::to_string))
}

fn noop_kernel(_: &HostLaunch<'_>) -> Result<(), Status> {
    Ok(())
}

#[test]
fn test_empty_source_fails_before_any_build() {
    let driver = EmulatedDriver::host();
    let mut capture = LogCapture::default();

    let err = build(&driver, "", "xor", &mut capture).unwrap_err();
    assert!(matches!(err, RuntimeError::EmptySource));
    assert!(err.to_string().contains("working directory"));

    let journal = driver.journal();
    assert_eq!(journal.count("create_program"), 0);
    assert_eq!(journal.count("build_program"), 0);
    assert!(capture.logs.is_empty());
}

#[test]
fn test_clean_build_prints_nothing() {
    let driver = EmulatedDriver::host();
    let mut capture = LogCapture::default();

    let log = build(&driver, XOR_CL, "xor", &mut capture).unwrap();
    assert_eq!(log, None);
    assert!(capture.logs.is_empty());
    assert_eq!(driver.journal().count("create_kernel"), 1);
}

#[test]
fn test_warning_log_is_surfaced_on_success() {
    let driver = EmulatedDriver::host().with_build_log("warning: unused variable 'tmp'\n\0");
    let mut capture = LogCapture::default();

    let log = build(&driver, XOR_CL, "xor", &mut capture).unwrap();
    assert_eq!(log.as_deref(), Some("warning: unused variable 'tmp'"));
    assert_eq!(capture.logs, vec!["warning: unused variable 'tmp'".to_string()]);
}

#[test]
fn test_build_failure_surfaces_log_then_fails() {
    let driver = EmulatedDriver::host()
        .with_build_log("error: expected ';' at line 3")
        .with_build_failure(Status::new(codes::BUILD_PROGRAM_FAILURE));
    let mut capture = LogCapture::default();

    let err = build(&driver, XOR_CL, "xor", &mut capture).unwrap_err();
    assert_eq!(capture.logs, vec!["error: expected ';' at line 3".to_string()]);
    match &err {
        RuntimeError::ProgramBuild { status, log } => {
            assert_eq!(status.code, codes::BUILD_PROGRAM_FAILURE);
            assert_eq!(log, "error: expected ';' at line 3");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.status_code(), Some(codes::BUILD_PROGRAM_FAILURE));
    assert_eq!(driver.journal().count("create_kernel"), 0);
}

#[test]
fn test_build_failure_without_log() {
    let driver =
        EmulatedDriver::host().with_build_failure(Status::new(codes::BUILD_PROGRAM_FAILURE));
    let mut capture = LogCapture::default();

    let err = build(&driver, XOR_CL, "xor", &mut capture).unwrap_err();
    assert!(matches!(err, RuntimeError::ProgramBuild { ref log, .. } if log.is_empty()));
    assert!(capture.logs.is_empty());
}

#[test]
fn test_missing_entry_point() {
    let driver = EmulatedDriver::host().with_kernel("nand", noop_kernel);
    let mut capture = LogCapture::default();
    let source = "__kernel void nand(__global const uchar* a) { }";

    let err = build(&driver, source, "xor", &mut capture).unwrap_err();
    assert!(matches!(err, RuntimeError::KernelNotFound { ref name } if name == "xor"));
}

#[test]
fn test_build_log_query_failure_is_fatal() {
    let driver = EmulatedDriver::host().fail_on("build_log", Status::new(codes::INVALID_PROGRAM));
    let mut capture = LogCapture::default();

    let err = build(&driver, XOR_CL, "xor", &mut capture).unwrap_err();
    match err {
        RuntimeError::AcceleratorCall(failure) => assert_eq!(failure.call, "build_log"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_program_released_after_failed_build() {
    let driver = EmulatedDriver::host().with_build_failure(Status::new(codes::BUILD_PROGRAM_FAILURE));
    let mut capture = LogCapture::default();

    build(&driver, XOR_CL, "xor", &mut capture).unwrap_err();
    assert_eq!(
        driver.journal().releases(),
        vec!["release_program", "release_queue", "release_context"]
    );
}
