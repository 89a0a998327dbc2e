//! Platform and device selection.
//!
//! Policy, in platform-then-device enumeration order:
//! 1. the first GPU-class device on any platform wins and enumeration stops;
//! 2. otherwise the last CPU-class device seen wins;
//! 3. otherwise there is no device.
//!
//! GPUs are never compared against each other.

use crate::driver::{DeviceClass, Driver};
use crate::error::{CheckStatus, Result, RuntimeError};
use tracing::{debug, info};

/// Selection state threaded through the enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    NotFound,
    FoundCpu(T),
    FoundGpu(T),
}

impl<T> Selection<T> {
    /// Folds one enumerated device into the selection.
    pub fn observe(self, class: DeviceClass, candidate: T) -> Self {
        match (self, class) {
            (found @ Selection::FoundGpu(_), _) => found,
            (_, DeviceClass::Gpu) => Selection::FoundGpu(candidate),
            (_, DeviceClass::Cpu) => Selection::FoundCpu(candidate),
            (current, DeviceClass::Other) => current,
        }
    }

    /// True once a GPU has been found; nothing can change the outcome after that.
    pub fn is_settled(&self) -> bool {
        matches!(self, Selection::FoundGpu(_))
    }

    pub fn into_inner(self) -> Option<T> {
        match self {
            Selection::NotFound => None,
            Selection::FoundCpu(value) | Selection::FoundGpu(value) => Some(value),
        }
    }
}

/// Applies the policy to an already-enumerated sequence, stopping at the first GPU.
pub fn select_from<T>(enumeration: impl IntoIterator<Item = (DeviceClass, T)>) -> Selection<T> {
    let mut selection = Selection::NotFound;
    for (class, candidate) in enumeration {
        selection = selection.observe(class, candidate);
        if selection.is_settled() {
            break;
        }
    }
    selection
}

/// The platform and device chosen for the run.
pub struct SelectedDevice<D: Driver> {
    pub platform: D::Platform,
    pub device: D::Device,
    pub class: DeviceClass,
    pub name: String,
}

/// Enumerates every platform and device of `driver` and applies the policy.
///
/// # Errors
/// [`RuntimeError::NoDeviceFound`] if no GPU- or CPU-class device exists, or an
/// accelerator call failure from any enumeration or query.
#[tracing::instrument(skip_all, fields(backend = driver.backend_name()))]
pub fn select_device<D: Driver>(driver: &D) -> Result<SelectedDevice<D>> {
    let mut platforms = driver.platforms().check("platforms")?;
    debug!(count = platforms.len(), "enumerated platforms");

    let mut selection = Selection::NotFound;
    'platforms: for (platform_index, platform) in platforms.iter().enumerate() {
        let devices = driver.devices(platform).check("devices")?;
        for (device_index, device) in devices.into_iter().enumerate() {
            let class = driver.device_class(&device).check("device_class")?;
            debug!(platform_index, device_index, %class, "enumerated device");

            selection = selection.observe(class, (platform_index, device, class));
            if selection.is_settled() {
                break 'platforms;
            }
        }
    }

    let (platform_index, device, class) =
        selection.into_inner().ok_or(RuntimeError::NoDeviceFound)?;
    let platform = platforms.swap_remove(platform_index);
    let name = driver.device_name(&device).check("device_name")?;
    info!(device = %name, %class, platform_index, "selected device");

    Ok(SelectedDevice {
        platform,
        device,
        class,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeviceClass::{Cpu, Gpu, Other};

    #[test]
    fn test_first_gpu_wins() {
        let selection = select_from([(Cpu, 0), (Gpu, 1), (Gpu, 2), (Cpu, 3)]);
        assert_eq!(selection, Selection::FoundGpu(1));
    }

    #[test]
    fn test_last_cpu_wins_without_gpu() {
        let selection = select_from([(Cpu, 0), (Other, 1), (Cpu, 2), (Other, 3)]);
        assert_eq!(selection, Selection::FoundCpu(2));
    }

    #[test]
    fn test_nothing_usable() {
        assert_eq!(select_from([(Other, 0)]), Selection::NotFound);
        assert_eq!(select_from(Vec::<(DeviceClass, u8)>::new()), Selection::NotFound);
    }

    #[test]
    fn test_gpu_is_sticky() {
        let selection = Selection::FoundGpu("gpu").observe(Cpu, "cpu");
        assert_eq!(selection, Selection::FoundGpu("gpu"));
        assert!(selection.is_settled());
        assert!(!Selection::FoundCpu(()).is_settled());
    }
}
