//! Device catalog
//!
//! Holds the result of the last enumeration: the descriptors shown to the user
//! and the driver handle for each id. A refresh replaces both wholesale, so a
//! handle from an older enumeration is never used to open a device.

use crate::backend::host_trait::{DriverHandle, UsbHost};
use crate::error::Result;
use crate::types::{DeviceDescriptor, DeviceId};
use std::collections::HashMap;

/// Enumerated devices and their driver handles
#[derive(Debug, Default)]
pub struct DeviceCatalog {
    devices: Vec<DeviceDescriptor>,
    handles: HashMap<DeviceId, DriverHandle>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enumerate and rebuild the id → handle map
    ///
    /// On enumeration failure the previous contents are kept.
    pub fn refresh(&mut self, host: &mut dyn UsbHost) -> Result<&[DeviceDescriptor]> {
        let enumerated = host.enumerate()?;

        self.devices.clear();
        self.handles.clear();
        for device in enumerated {
            let id = device.descriptor.id;
            if self.handles.contains_key(&id) {
                tracing::warn!("Duplicate device id {} in enumeration, keeping first", id);
                continue;
            }
            self.handles.insert(id, device.handle);
            self.devices.push(device.descriptor);
        }

        tracing::debug!("Catalog refreshed: {} device(s)", self.devices.len());
        Ok(&self.devices)
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Driver handle for a device from the last refresh
    pub fn handle(&self, id: DeviceId) -> Option<&DriverHandle> {
        self.handles.get(&id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.handles.contains_key(&id)
    }
}

/// Keep the previous selection if it is still listed, else pick the first device
pub fn resolve_selection(
    devices: &[DeviceDescriptor],
    previous: Option<DeviceId>,
) -> Option<DeviceId> {
    match previous {
        Some(id) if devices.iter().any(|d| d.id == id) => Some(id),
        _ => devices.first().map(|d| d.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockUsbHost;

    fn descriptors(ids: &[u32]) -> Vec<DeviceDescriptor> {
        ids.iter()
            .map(|&id| DeviceDescriptor::new(DeviceId(id), format!("dev{}", id), 0x1234, id as u16))
            .collect()
    }

    #[test]
    fn test_selection_kept_when_present() {
        let devices = descriptors(&[1, 2, 3]);
        assert_eq!(resolve_selection(&devices, Some(DeviceId(2))), Some(DeviceId(2)));
    }

    #[test]
    fn test_selection_falls_back_to_first() {
        let devices = descriptors(&[1]);
        assert_eq!(resolve_selection(&devices, Some(DeviceId(2))), Some(DeviceId(1)));
        assert_eq!(resolve_selection(&devices, None), Some(DeviceId(1)));
    }

    #[test]
    fn test_selection_empty_catalog() {
        assert_eq!(resolve_selection(&[], Some(DeviceId(2))), None);
    }

    #[test]
    fn test_refresh_replaces_handles() {
        let mock = MockUsbHost::new()
            .with_device(DeviceId(1), "first")
            .with_device(DeviceId(2), "second");
        let mut host = mock.clone();
        let mut catalog = DeviceCatalog::new();

        let ids: Vec<DeviceId> = catalog.refresh(&mut host).unwrap().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![DeviceId(1), DeviceId(2)]);
        assert!(catalog.handle(DeviceId(2)).is_some());

        mock.remove_device(DeviceId(2));
        catalog.refresh(&mut host).unwrap();
        assert_eq!(catalog.devices().len(), 1);
        assert!(catalog.handle(DeviceId(2)).is_none());
        assert_eq!(catalog.devices()[0].title, "first");
    }

    #[test]
    fn test_refresh_failure_keeps_previous_contents() {
        let mock = MockUsbHost::new().with_device(DeviceId(1), "first");
        let mut host = mock.clone();
        let mut catalog = DeviceCatalog::new();
        catalog.refresh(&mut host).unwrap();

        mock.fail_enumeration(Some("usb stack busy"));
        assert!(catalog.refresh(&mut host).is_err());
        assert!(catalog.contains(DeviceId(1)));
    }
}
