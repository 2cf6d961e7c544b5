// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-controller state: the emitted snapshot, the stored raw report and
//! the correlation bindings.

use crate::correlate::{WgiBinding, XInputBinding, XInputPhase};
use crate::ev::{Axis, Button, EventBus};
use crate::fingerprint::MatchState;
use crate::report::{self, DecodeError, Family, Report, StateReport};
use crate::wgi::{self, WgiRegistry};
use crate::xinput::{self, XInputCache};

/// Largest HID packet the engine accepts.
pub(crate) const MAX_REPORT: usize = 64;

/// Buttons whose state every decoded state packet carries.
const REPORT_BUTTONS: [Button; 14] = [
    Button::A,
    Button::B,
    Button::X,
    Button::Y,
    Button::LeftShoulder,
    Button::RightShoulder,
    Button::Back,
    Button::Start,
    Button::LeftStick,
    Button::RightStick,
    Button::DPadDown,
    Button::DPadUp,
    Button::DPadRight,
    Button::DPadLeft,
];

/// The last state emitted to the host for one controller.
#[derive(Clone, Debug)]
pub struct ControllerSnapshot {
    /// Pressed buttons, one bit per [`Button`] discriminant.
    pub buttons: u16,
    /// Axis values, one slot per [`Axis`] discriminant.
    pub axes: [i16; 6],
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        ControllerSnapshot {
            buttons: 0,
            axes: [0, 0, 0, 0, i16::MIN, i16::MIN],
        }
    }
}

impl ControllerSnapshot {
    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons & button.bit() != 0
    }

    pub fn axis(&self, axis: Axis) -> i16 {
        self.axes[axis as usize]
    }
}

pub(crate) struct Controller {
    pub instance_id: usize,
    pub family: Family,
    pub snapshot: ControllerSnapshot,
    pub match_state: MatchState,
    pub last_report: [u8; MAX_REPORT],
    pub last_report_len: usize,
    /// Tick of the most recent state packet, used by the guide arbiter to
    /// pick "the device the user just touched".
    pub last_state_packet: Option<u32>,
    pub rumble_expiration: Option<u32>,
    pub xinput: XInputBinding,
    pub wgi: WgiBinding,
}

impl Controller {
    pub fn new(instance_id: usize, family: Family) -> Self {
        let snapshot = ControllerSnapshot::default();
        Controller {
            instance_id,
            family,
            // The fingerprint of the resting state, not all-zero bits; a
            // zeroed digest would read as a stick held hard left.
            match_state: MatchState::from_snapshot(&snapshot),
            snapshot,
            last_report: [0; MAX_REPORT],
            last_report_len: 0,
            last_state_packet: None,
            rumble_expiration: None,
            xinput: XInputBinding::new(),
            wgi: WgiBinding::Unbound,
        }
    }

    /// Applies one raw report: updates the snapshot, emits changes, refreshes
    /// the fingerprint and attempts the WGI face-button bind.
    pub fn apply_report(
        &mut self,
        data: &[u8],
        cache: &mut XInputCache,
        wgi: &mut WgiRegistry,
        bus: &mut dyn EventBus,
        now: u32,
    ) -> Result<(), DecodeError> {
        let decoded = report::decode(self.family, data)?;
        let is_state = matches!(decoded, Report::State(_));
        self.apply_decoded(decoded, cache, wgi, bus, false);
        // Only state packets become the stored snapshot: the correlation
        // replay must re-run the trigger cascade, which a guide-only packet
        // cannot carry, and guide packets say nothing about recency of
        // stick activity.
        if is_state {
            self.last_state_packet = Some(now);
            let len = data.len().min(MAX_REPORT);
            self.last_report[..len].copy_from_slice(&data[..len]);
            self.last_report_len = len;
        }
        Ok(())
    }

    /// Re-applies the stored report after a correlation change. The fields
    /// sourced from peers are emitted even when their values did not move,
    /// so the host sees the switch of provenance immediately.
    pub fn reapply_last(
        &mut self,
        cache: &mut XInputCache,
        wgi: &mut WgiRegistry,
        bus: &mut dyn EventBus,
    ) {
        if self.last_report_len == 0 {
            return;
        }
        let data = self.last_report;
        if let Ok(decoded) = report::decode(self.family, &data[..self.last_report_len]) {
            self.apply_decoded(decoded, cache, wgi, bus, true);
        }
    }

    fn apply_decoded(
        &mut self,
        decoded: Report,
        cache: &mut XInputCache,
        wgi: &mut WgiRegistry,
        bus: &mut dyn EventBus,
        force_peer: bool,
    ) {
        match decoded {
            Report::Guide(pressed) => self.set_button(bus, Button::Guide, pressed),
            Report::State(state) => self.apply_state(state, cache, wgi, bus, force_peer),
        }
        self.match_state = MatchState::from_snapshot(&self.snapshot);
    }

    fn apply_state(
        &mut self,
        state: StateReport,
        cache: &mut XInputCache,
        wgi: &mut WgiRegistry,
        bus: &mut dyn EventBus,
        force_peer: bool,
    ) {
        for button in REPORT_BUTTONS {
            self.set_button(bus, button, state.buttons & button.bit() != 0);
        }
        for (nth, axis) in [Axis::LeftX, Axis::LeftY, Axis::RightX, Axis::RightY]
            .into_iter()
            .enumerate()
        {
            self.set_axis(bus, axis, state.axes[nth], false);
        }

        if self.wgi == WgiBinding::Unbound {
            let face = (state.buttons & 0x000F) as u8;
            if face != 0 {
                if let Some(id) = wgi.guess(face) {
                    debug!(
                        "bound controller {} to WGI gamepad {:?}",
                        self.instance_id, id
                    );
                    self.wgi = WgiBinding::Bound(id);
                }
            }
        }

        let mut has_trigger_data = false;

        // Triggers carried by the report itself beat every peer.
        if let Some((left, right)) = state.triggers {
            self.set_axis(bus, Axis::TriggerLeft, left, force_peer);
            self.set_axis(bus, Axis::TriggerRight, right, force_peer);
            has_trigger_data = true;
        }

        if !has_trigger_data {
            if let WgiBinding::Bound(id) = self.wgi {
                if let Some(reading) = wgi.read(id) {
                    self.set_button_forced(
                        bus,
                        Button::Guide,
                        reading.buttons & wgi::BUTTON_GUIDE != 0,
                        force_peer,
                    );
                    self.set_axis(
                        bus,
                        Axis::TriggerLeft,
                        wgi_trigger(reading.left_trigger),
                        force_peer,
                    );
                    self.set_axis(
                        bus,
                        Axis::TriggerRight,
                        wgi_trigger(reading.right_trigger),
                        force_peer,
                    );
                    has_trigger_data = true;
                }
            }
        }

        if !has_trigger_data {
            if let XInputPhase::Confirmed { slot, .. } = self.xinput.phase {
                cache.refresh();
                let snapshot = cache.slot(slot);
                if snapshot.connected {
                    let reading = snapshot.reading;
                    self.set_button_forced(
                        bus,
                        Button::Guide,
                        reading.buttons & xinput::BUTTON_GUIDE != 0,
                        force_peer,
                    );
                    self.set_axis(
                        bus,
                        Axis::TriggerLeft,
                        xinput_trigger(reading.left_trigger),
                        force_peer,
                    );
                    self.set_axis(
                        bus,
                        Axis::TriggerRight,
                        xinput_trigger(reading.right_trigger),
                        force_peer,
                    );
                    has_trigger_data = true;
                }
            }
        }

        if !has_trigger_data {
            if let Some(byte) = state.merged_trigger {
                let (left, right) = report::merged_triggers(byte);
                self.set_axis(bus, Axis::TriggerLeft, left, force_peer);
                self.set_axis(bus, Axis::TriggerRight, right, force_peer);
            }
        }
    }

    /// Emits a guide release regardless of the stored state. Used when a
    /// correlation breaks and the peer's true guide state is unknowable.
    pub fn force_release_guide(&mut self, bus: &mut dyn EventBus) {
        self.snapshot.buttons &= !Button::Guide.bit();
        self.match_state = MatchState::from_snapshot(&self.snapshot);
        bus.button(self.instance_id, Button::Guide, false);
    }

    /// Guide attribution from the arbiter goes through the snapshot so the
    /// fingerprint and later reads stay consistent.
    pub fn set_guide(&mut self, bus: &mut dyn EventBus, pressed: bool) {
        self.set_button(bus, Button::Guide, pressed);
        self.match_state = MatchState::from_snapshot(&self.snapshot);
    }

    fn set_button(&mut self, bus: &mut dyn EventBus, button: Button, pressed: bool) {
        let was = self.snapshot.buttons & button.bit() != 0;
        if was == pressed {
            return;
        }
        if pressed {
            self.snapshot.buttons |= button.bit();
        } else {
            self.snapshot.buttons &= !button.bit();
        }
        bus.button(self.instance_id, button, pressed);
    }

    fn set_button_forced(
        &mut self,
        bus: &mut dyn EventBus,
        button: Button,
        pressed: bool,
        force: bool,
    ) {
        if !force {
            return self.set_button(bus, button, pressed);
        }
        if pressed {
            self.snapshot.buttons |= button.bit();
        } else {
            self.snapshot.buttons &= !button.bit();
        }
        bus.button(self.instance_id, button, pressed);
    }

    fn set_axis(&mut self, bus: &mut dyn EventBus, axis: Axis, value: i16, force: bool) {
        if !force && self.snapshot.axes[axis as usize] == value {
            return;
        }
        self.snapshot.axes[axis as usize] = value;
        bus.axis(self.instance_id, axis, value);
    }
}

fn xinput_trigger(value: u8) -> i16 {
    (value as i32 * 257 - 32768) as i16
}

fn wgi_trigger(value: f64) -> i16 {
    ((value * 65535.0) as i32 - 32768) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_scaling() {
        assert_eq!(xinput_trigger(0), i16::MIN);
        assert_eq!(xinput_trigger(255), i16::MAX);
        assert_eq!(wgi_trigger(0.0), i16::MIN);
        assert_eq!(wgi_trigger(1.0), i16::MAX);
        assert_eq!(wgi_trigger(0.5), -1);
    }
}
