//! Device registry interface.
//!
//! The durable store of known devices lives outside this crate (the app
//! persists it however it likes). The core only needs three operations,
//! captured by [`DeviceRegistry`]; [`MemoryRegistry`] is the in-process
//! implementation used by tests and by callers without persistence.

use dashmap::DashMap;

use crate::model::Device;

/// Keyed store of known devices, deduplicated by normalized hostname.
pub trait DeviceRegistry: Send + Sync {
    /// All known devices, in no particular order.
    fn list(&self) -> Vec<Device>;

    /// Insert or replace the device with the same hostname key.
    fn upsert(&self, device: Device);

    /// Remove the device with the same hostname key, if present.
    fn delete(&self, device: &Device);
}

/// In-memory [`DeviceRegistry`] backed by a concurrent map.
#[derive(Default)]
pub struct MemoryRegistry {
    devices: DashMap<String, Device>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRegistry for MemoryRegistry {
    fn list(&self) -> Vec<Device> {
        self.devices.iter().map(|e| e.value().clone()).collect()
    }

    fn upsert(&self, device: Device) {
        self.devices.insert(device.hostname_key(), device);
    }

    fn delete(&self, device: &Device) {
        self.devices.remove(&device.hostname_key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_dedups_by_hostname_key() {
        let registry = MemoryRegistry::new();
        registry.upsert(Device::new(1, "Nursery", "Nursery-Pi"));
        registry.upsert(Device::new(2, "Nursery again", " nursery-pi "));

        let devices = registry.list();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, 2);
    }

    #[test]
    fn delete_matches_by_identity_not_fields() {
        let registry = MemoryRegistry::new();
        registry.upsert(Device::new(1, "Nursery", "nursery-pi"));

        // Different id/name, same hostname identity.
        registry.delete(&Device::new(99, "whatever", "NURSERY-PI"));
        assert!(registry.list().is_empty());
    }
}
