// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Rumble routing across the three sinks, in fidelity order.

use crate::controller::Controller;
use crate::correlate::{WgiBinding, XInputPhase};
use crate::registry::HidTransport;
use crate::utils::ticks_passed;
use crate::wgi::WgiRegistry;
use crate::xinput::XInputCache;
use crate::Error;

/// Routes one rumble command: WGI when bound, else a confirmed XInput slot,
/// else a raw HID packet. Also arms or clears the expiry deadline.
pub(crate) fn dispatch(
    ctrl: &mut Controller,
    transport: &mut dyn HidTransport,
    cache: &mut XInputCache,
    wgi: &mut WgiRegistry,
    low: u16,
    high: u16,
    duration_ms: u32,
    now: u32,
) -> Result<(), Error> {
    let mut rumbled = false;

    if let WgiBinding::Bound(id) = ctrl.wgi {
        let left = low as f64 / u16::MAX as f64;
        let right = high as f64 / u16::MAX as f64;
        match wgi.vibrate(id, left, right) {
            Ok(()) => rumbled = true,
            Err(_) => error!(
                "WGI vibration write failed for controller {}, falling back",
                ctrl.instance_id
            ),
        }
    }

    if !rumbled {
        if let XInputPhase::Confirmed { slot, .. } = ctrl.xinput.phase {
            cache
                .rumble(slot, low, high)
                .map_err(|_| Error::XInputWrite(slot))?;
            rumbled = true;
        }
    }

    if !rumbled {
        let mut packet = [0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        packet[3] = (low >> 8) as u8;
        packet[4] = (high >> 8) as u8;
        let written = transport.write(&packet).map_err(Error::Transport)?;
        if written != packet.len() {
            return Err(Error::HidWrite {
                written,
                expected: packet.len(),
            });
        }
    }

    ctrl.rumble_expiration = if (low != 0 || high != 0) && duration_ms != 0 {
        Some(now.wrapping_add(duration_ms))
    } else {
        None
    };
    Ok(())
}

/// Re-issues a zero rumble once the deadline passes.
pub(crate) fn check_expiration(
    ctrl: &mut Controller,
    transport: &mut dyn HidTransport,
    cache: &mut XInputCache,
    wgi: &mut WgiRegistry,
    now: u32,
) {
    if let Some(deadline) = ctrl.rumble_expiration {
        if ticks_passed(now, deadline) {
            if let Err(err) = dispatch(ctrl, transport, cache, wgi, 0, 0, 0, now) {
                warn!(
                    "failed to stop rumble on controller {}: {}",
                    ctrl.instance_id, err
                );
                ctrl.rumble_expiration = None;
            }
        }
    }
}
