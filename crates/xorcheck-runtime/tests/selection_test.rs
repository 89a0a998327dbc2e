//! Device selection over scripted platform layouts.

use proptest::prelude::*;
use xorcheck_runtime::RuntimeError;
use xorcheck_runtime::driver::DeviceClass;
use xorcheck_runtime::driver::emulated::EmulatedDriver;
use xorcheck_runtime::error::{Status, codes};
use xorcheck_runtime::selector::select_device;

fn driver_with(layout: &[Vec<DeviceClass>]) -> EmulatedDriver {
    layout
        .iter()
        .enumerate()
        .fold(EmulatedDriver::new(), |driver, (i, devices)| {
            driver.with_platform(format!("P{i}"), devices)
        })
}

fn device_class() -> impl Strategy<Value = DeviceClass> {
    prop_oneof![
        Just(DeviceClass::Gpu),
        Just(DeviceClass::Cpu),
        Just(DeviceClass::Other),
    ]
}

/// Expected (platform, device) under the policy: first GPU, else last CPU.
fn expected_choice(layout: &[Vec<DeviceClass>]) -> Option<(usize, usize, DeviceClass)> {
    let flat: Vec<_> = layout
        .iter()
        .enumerate()
        .flat_map(|(p, devices)| devices.iter().enumerate().map(move |(d, &c)| (p, d, c)))
        .collect();
    flat.iter()
        .find(|(_, _, c)| *c == DeviceClass::Gpu)
        .or_else(|| flat.iter().rev().find(|(_, _, c)| *c == DeviceClass::Cpu))
        .copied()
}

proptest! {
    #[test]
    fn selection_follows_gpu_then_last_cpu_policy(
        layout in prop::collection::vec(prop::collection::vec(device_class(), 0..4), 0..4)
    ) {
        let driver = driver_with(&layout);
        match (select_device(&driver), expected_choice(&layout)) {
            (Ok(selected), Some((p, d, class))) => {
                prop_assert_eq!(selected.class, class);
                prop_assert_eq!(selected.device.platform, p);
                prop_assert_eq!(selected.device.index, d);
                prop_assert_eq!(selected.platform.name(), format!("P{p}"));
                prop_assert_eq!(selected.name, format!("P{p} {class} #{d}"));
            }
            (Err(RuntimeError::NoDeviceFound), None) => {}
            (outcome, expected) => {
                prop_assert!(false, "got {:?}, expected {:?}", outcome.map(|s| s.name), expected);
            }
        }
    }
}

#[test]
fn test_gpu_on_later_platform_beats_earlier_cpu() {
    let driver = EmulatedDriver::new()
        .with_platform("P0", &[DeviceClass::Cpu])
        .with_platform("P1", &[DeviceClass::Other, DeviceClass::Gpu]);

    let selected = select_device(&driver).unwrap();
    assert_eq!(selected.class, DeviceClass::Gpu);
    assert_eq!(selected.name, "P1 GPU #1");
}

#[test]
fn test_last_cpu_is_selected_without_gpu() {
    let driver = EmulatedDriver::new()
        .with_platform("P0", &[DeviceClass::Cpu, DeviceClass::Cpu])
        .with_platform("P1", &[DeviceClass::Cpu, DeviceClass::Other]);

    let selected = select_device(&driver).unwrap();
    assert_eq!(selected.class, DeviceClass::Cpu);
    assert_eq!(selected.name, "P1 CPU #0");
}

#[test]
fn test_no_platforms() {
    let driver = EmulatedDriver::new();
    assert!(matches!(
        select_device(&driver),
        Err(RuntimeError::NoDeviceFound)
    ));
}

#[test]
fn test_platforms_without_usable_devices() {
    let driver = EmulatedDriver::new()
        .with_platform("empty", &[])
        .with_platform("accelerators", &[DeviceClass::Other, DeviceClass::Other]);
    assert!(matches!(
        select_device(&driver),
        Err(RuntimeError::NoDeviceFound)
    ));
}

#[test]
fn test_enumeration_stops_at_first_gpu() {
    let driver = EmulatedDriver::new()
        .with_platform("P0", &[DeviceClass::Gpu, DeviceClass::Cpu])
        .with_platform("P1", &[DeviceClass::Gpu]);

    select_device(&driver).unwrap();
    let journal = driver.journal();
    assert_eq!(journal.count("devices"), 1);
    assert_eq!(journal.count("device_class"), 1);
    assert_eq!(journal.count("device_name"), 1);
}

#[test]
fn test_enumeration_failure_is_reported() {
    let driver = EmulatedDriver::host().fail_on("devices", Status::new(codes::OUT_OF_HOST_MEMORY));

    let err = select_device(&driver).err().unwrap();
    match err {
        RuntimeError::AcceleratorCall(failure) => {
            assert_eq!(failure.call, "devices");
            assert_eq!(failure.code(), codes::OUT_OF_HOST_MEMORY);
            assert!(failure.location.file().ends_with("selector.rs"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
