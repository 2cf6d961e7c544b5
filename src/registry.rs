// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Device registry fed by raw HID arrival and removal notifications.

use crate::controller::Controller;
use crate::report::Family;
use fnv::FnvHashMap;
use std::io;
use uuid::Uuid;
use vec_map::VecMap;

/// USB bus type in the GUID encoding.
const BUS_USB: u16 = 0x03;

/// Opaque OS handle for a raw HID device, as delivered with arrival and
/// removal notifications.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeviceHandle(pub u64);

/// Descriptive data read from the HID stack at arrival.
#[derive(Clone, Debug)]
pub struct HidDeviceInfo {
    /// Device interface path. XInput-capable devices carry an `IG_`
    /// segment; everything else is ignored.
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
}

/// Write access to the underlying HID device, used for rumble packets.
pub trait HidTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

pub(crate) struct Device {
    pub handle: DeviceHandle,
    pub info: HidDeviceInfo,
    pub name: String,
    pub guid: Uuid,
    pub family: Family,
    pub transport: Box<dyn HidTransport>,
    pub controller: Option<Controller>,
}

pub(crate) struct Registry {
    devices: VecMap<Device>,
    by_handle: FnvHashMap<DeviceHandle, usize>,
    next_instance_id: usize,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            devices: VecMap::new(),
            by_handle: FnvHashMap::default(),
            next_instance_id: 0,
        }
    }

    /// Registers an arrived device. Non-XInput-capable paths, unsupported
    /// products and duplicate handles are declined.
    pub fn add(
        &mut self,
        handle: DeviceHandle,
        info: HidDeviceInfo,
        transport: Box<dyn HidTransport>,
    ) -> Option<usize> {
        if !info.path.contains("IG_") {
            return None;
        }
        if self.by_handle.contains_key(&handle) {
            warn!("duplicate arrival notification for handle {:?}", handle);
            return None;
        }
        let Some(family) = Family::detect(info.vendor_id, info.product_id, info.version) else {
            debug!(
                "no driver for device 0x{:04x}/0x{:04x}, ignoring",
                info.vendor_id, info.product_id
            );
            return None;
        };

        let id = self.next_instance_id;
        self.next_instance_id += 1;
        let name = Family::product_name(info.vendor_id, info.product_id)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("0x{:04x}/0x{:04x}", info.vendor_id, info.product_id));
        let guid = raw_device_guid(info.vendor_id, info.product_id, info.version);
        debug!(
            "adding raw HID device '{}' VID 0x{:04x}, PID 0x{:04x}, version {}",
            name, info.vendor_id, info.product_id, info.version
        );

        self.by_handle.insert(handle, id);
        self.devices.insert(
            id,
            Device {
                handle,
                info,
                name,
                guid,
                family,
                transport,
                controller: None,
            },
        );
        Some(id)
    }

    pub fn remove_by_handle(&mut self, handle: DeviceHandle) -> Option<(usize, Device)> {
        let id = self.by_handle.remove(&handle)?;
        let device = self.devices.remove(id)?;
        debug!(
            "removing raw HID device '{}', handle {:?}",
            device.name, device.handle
        );
        Some((id, device))
    }

    pub fn get(&self, id: usize) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }

    /// Devices in instance-id order, which is arrival order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Device)> + '_ {
        self.devices.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }
}

/// 16-byte device identity in the SDL joystick GUID layout; byte 14 marks
/// the raw-input origin.
pub(crate) fn raw_device_guid(vendor: u16, product: u16, version: u16) -> Uuid {
    let mut bytes = [0; 16];
    bytes[0..2].copy_from_slice(&BUS_USB.to_le_bytes());
    bytes[4..6].copy_from_slice(&vendor.to_le_bytes());
    bytes[8..10].copy_from_slice(&product.to_le_bytes());
    bytes[12..14].copy_from_slice(&version.to_le_bytes());
    bytes[14] = b'r';
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTransport;

    impl HidTransport for NullTransport {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            Ok(data.len())
        }
    }

    fn info(path: &str, vendor_id: u16, product_id: u16, version: u16) -> HidDeviceInfo {
        HidDeviceInfo {
            path: path.to_owned(),
            vendor_id,
            product_id,
            version,
        }
    }

    #[test]
    fn guid_layout() {
        let guid = raw_device_guid(0x045e, 0x028e, 0x0114);
        let bytes = guid.as_bytes();
        assert_eq!(&bytes[0..2], &[0x03, 0x00]);
        assert_eq!(&bytes[4..6], &[0x5e, 0x04]);
        assert_eq!(&bytes[8..10], &[0x8e, 0x02]);
        assert_eq!(&bytes[12..14], &[0x14, 0x01]);
        assert_eq!(bytes[14], b'r');
        assert_eq!(bytes[15], 0);
    }

    #[test]
    fn ignores_devices_without_xinput_marker() {
        let mut registry = Registry::new();
        let id = registry.add(
            DeviceHandle(1),
            info(r"\\?\HID#VID_045E&PID_028E#8&1a2b", 0x045e, 0x028e, 0x0114),
            Box::new(NullTransport),
        );
        assert_eq!(id, None);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn instance_ids_are_monotonic() {
        let mut registry = Registry::new();
        let a = registry
            .add(
                DeviceHandle(1),
                info(r"\\?\HID#VID_045E&PID_028E&IG_00#8", 0x045e, 0x028e, 0x0114),
                Box::new(NullTransport),
            )
            .unwrap();
        let b = registry
            .add(
                DeviceHandle(2),
                info(r"\\?\HID#VID_045E&PID_02FD&IG_00#9", 0x045e, 0x02fd, 0x0001),
                Box::new(NullTransport),
            )
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(registry.get(a).unwrap().family, Family::Xbox360);
        assert_eq!(registry.get(b).unwrap().family, Family::XboxOneS);

        registry.remove_by_handle(DeviceHandle(1)).unwrap();
        let c = registry
            .add(
                DeviceHandle(3),
                info(r"\\?\HID#VID_046D&PID_C21D&IG_00#a", 0x046d, 0xc21d, 0x0001),
                Box::new(NullTransport),
            )
            .unwrap();
        // Ids are never reused.
        assert_eq!(c, 2);
    }

    #[test]
    fn fallback_name_for_unknown_products() {
        let mut registry = Registry::new();
        let id = registry
            .add(
                DeviceHandle(7),
                info(r"\\?\HID#VID_046D&PID_C21D&IG_00#a", 0x046d, 0xc21d, 0x0001),
                Box::new(NullTransport),
            )
            .unwrap();
        assert_eq!(registry.get(id).unwrap().name, "0x046d/0xc21d");
    }
}
