// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The fusion context: device registry, API caches and the frame loop.

use crate::controller::{Controller, ControllerSnapshot};
use crate::correlate::{self, WgiBinding, XInputPhase};
use crate::ev::EventBus;
use crate::guide::GuideArbiter;
use crate::registry::{Device, DeviceHandle, HidDeviceInfo, HidTransport, Registry};
use crate::report::Family;
use crate::rumble;
use crate::wgi::{WgiApi, WgiRegistry};
use crate::xinput::{XInputApi, XInputCache};
use crate::Error;
use uuid::Uuid;

/// Fuses raw HID reports with XInput and WGI state for every registered
/// controller.
///
/// All methods must be called from one thread. The host drives the engine:
/// device notifications and HID reports go in as they arrive, and once per
/// frame [`update`](Fusion::update) runs correlation, rumble expiry and the
/// guide arbiter for all controllers.
pub struct Fusion {
    registry: Registry,
    xinput: XInputCache,
    wgi: WgiRegistry,
    guide: GuideArbiter,
    bus: Box<dyn EventBus>,
    now: u32,
}

impl Fusion {
    pub fn new(
        xinput: Box<dyn XInputApi>,
        wgi: Box<dyn WgiApi>,
        bus: Box<dyn EventBus>,
    ) -> Self {
        Fusion {
            registry: Registry::new(),
            xinput: XInputCache::new(xinput),
            wgi: WgiRegistry::new(wgi),
            guide: GuideArbiter::new(),
            bus,
            now: 0,
        }
    }

    /// Ingests a device-arrival notification. Devices that are not
    /// XInput-capable (no `IG_` in the path) or not an Xbox-family product
    /// are declined with `None`; accepted devices get an instance id and an
    /// `added` event on the bus.
    pub fn device_arrived(
        &mut self,
        handle: DeviceHandle,
        info: HidDeviceInfo,
        transport: Box<dyn HidTransport>,
    ) -> Option<usize> {
        let id = self.registry.add(handle, info, transport)?;
        self.bus.added(id);
        Some(id)
    }

    /// Ingests a device-removal notification. A correlated controller frees
    /// its XInput slot before the `removed` event fires.
    pub fn device_removed(&mut self, handle: DeviceHandle) {
        let Some((id, mut device)) = self.registry.remove_by_handle(handle) else {
            return;
        };
        if let Some(ctrl) = device.controller.take() {
            self.release_controller(&ctrl);
        }
        self.bus.removed(id);
    }

    /// Opens the controller for a registered device.
    pub fn open(&mut self, id: usize) -> Result<(), Error> {
        let device = self.registry.get_mut(id).ok_or(Error::UnknownDevice(id))?;
        if device.controller.is_some() {
            return Err(Error::AlreadyOpened(id));
        }
        device.controller = Some(Controller::new(id, device.family));
        Ok(())
    }

    /// Closes the controller, freeing any correlated slot.
    pub fn close(&mut self, id: usize) -> Result<(), Error> {
        let device = self.registry.get_mut(id).ok_or(Error::UnknownDevice(id))?;
        let ctrl = device.controller.take().ok_or(Error::NotOpened(id))?;
        self.release_controller(&ctrl);
        Ok(())
    }

    fn release_controller(&mut self, ctrl: &Controller) {
        if let XInputPhase::Confirmed { slot, .. } = ctrl.xinput.phase {
            self.xinput.slot_mut(slot).used = false;
        }
        self.guide.forget(ctrl.instance_id);
    }

    /// Feeds one raw HID report to an open controller. Unrecognized or
    /// truncated packets are dropped.
    pub fn deliver_report(&mut self, id: usize, data: &[u8]) {
        let Some(device) = self.registry.get_mut(id) else {
            return;
        };
        let Some(ctrl) = device.controller.as_mut() else {
            return;
        };
        if let Err(err) =
            ctrl.apply_report(data, &mut self.xinput, &mut self.wgi, &mut *self.bus, self.now)
        {
            debug!("dropping packet for controller {}: {}", id, err);
        }
    }

    /// Runs one host frame at tick `now` (milliseconds, wrapping):
    /// correlation and rumble expiry for every open controller in arrival
    /// order, then the guide arbiter, then slot-cache invalidation.
    pub fn update(&mut self, now: u32) {
        self.now = now;
        for (id, device) in self.registry.iter_mut() {
            let Device {
                controller,
                transport,
                ..
            } = device;
            let Some(ctrl) = controller.as_mut() else {
                continue;
            };
            let confirmed = correlate::update_xinput(
                ctrl,
                &mut self.xinput,
                &mut self.wgi,
                &mut self.guide,
                &mut *self.bus,
            );
            rumble::check_expiration(
                ctrl,
                transport.as_mut(),
                &mut self.xinput,
                &mut self.wgi,
                now,
            );
            if !confirmed && !ctrl.family.reports_guide() {
                self.guide.offer(id, ctrl.last_state_packet);
            }
        }
        self.guide
            .finish_frame(&mut self.xinput, &mut self.registry, &mut *self.bus);
    }

    /// Routes a rumble command to the best available sink: WGI, then a
    /// confirmed XInput slot, then a raw HID packet. Zero magnitudes or a
    /// zero duration cancel any pending expiry.
    pub fn rumble(
        &mut self,
        id: usize,
        low: u16,
        high: u16,
        duration_ms: u32,
    ) -> Result<(), Error> {
        let device = self.registry.get_mut(id).ok_or(Error::UnknownDevice(id))?;
        let Device {
            controller,
            transport,
            ..
        } = device;
        let ctrl = controller.as_mut().ok_or(Error::NotOpened(id))?;
        rumble::dispatch(
            ctrl,
            transport.as_mut(),
            &mut self.xinput,
            &mut self.wgi,
            low,
            high,
            duration_ms,
            self.now,
        )
    }

    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.registry.get(id).map(|device| device.name.as_str())
    }

    pub fn device_info(&self, id: usize) -> Option<&HidDeviceInfo> {
        self.registry.get(id).map(|device| &device.info)
    }

    pub fn guid(&self, id: usize) -> Option<Uuid> {
        self.registry.get(id).map(|device| device.guid)
    }

    pub fn family(&self, id: usize) -> Option<Family> {
        self.registry.get(id).map(|device| device.family)
    }

    /// The last state emitted for an open controller.
    pub fn snapshot(&self, id: usize) -> Option<&ControllerSnapshot> {
        self.registry
            .get(id)
            .and_then(|device| device.controller.as_ref())
            .map(|ctrl| &ctrl.snapshot)
    }

    /// The confirmed XInput slot, if the controller is correlated.
    pub fn xinput_slot(&self, id: usize) -> Option<u8> {
        let ctrl = self.registry.get(id)?.controller.as_ref()?;
        match ctrl.xinput.phase {
            XInputPhase::Confirmed { slot, .. } => Some(slot),
            _ => None,
        }
    }

    pub fn is_wgi_bound(&self, id: usize) -> bool {
        self.registry
            .get(id)
            .and_then(|device| device.controller.as_ref())
            .is_some_and(|ctrl| matches!(ctrl.wgi, WgiBinding::Bound(_)))
    }
}
