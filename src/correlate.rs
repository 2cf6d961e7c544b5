// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The cross-API correlation state machine.
//!
//! Raw HID gives no identity that XInput or WGI could be joined on, so the
//! engine matches live state instead: a controller whose buttons and stick
//! digests agree with exactly one slot across consecutive frames is assumed
//! to be that slot. Two mis-correlation hazards shape the machine:
//!
//! * HID delivers no initial state. A slot can hold a button we never saw,
//!   and a single frame of agreement may be coincidence. Hence the
//!   multi-frame confirmation and the divergence check after confirmation.
//! * Two controllers can present identical fingerprints. Every match bumps
//!   the slot's `correlation_id`; a candidate only advances when the id
//!   moved by exactly one since its previous frame, which fails as soon as
//!   anyone else matched the same slot in between.

use crate::controller::Controller;
use crate::ev::EventBus;
use crate::fingerprint::{digest_close, XInputMatch, XINPUT_MATCH_MASK};
use crate::guide::GuideArbiter;
use crate::wgi::{WgiGamepadId, WgiRegistry};
use crate::xinput::{SlotSnapshot, XInputCache, SLOT_COUNT};

/// Consecutive uncontested frames required before a candidate is confirmed.
const CONFIRM_FRAMES: u8 = 2;

/// Consecutive frames of divergence tolerated before a confirmed binding is
/// dropped. Polling and report delivery race, so one stale frame is normal.
const UNCORRELATE_FRAMES: u8 = 3;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum XInputPhase {
    Unbound,
    Candidate { slot: u8, count: u8 },
    Confirmed { slot: u8, missed: u8 },
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct XInputBinding {
    pub phase: XInputPhase,
    /// Slot correlation id observed at the most recent match attempt.
    pub correlation_id: u8,
}

impl XInputBinding {
    pub fn new() -> Self {
        XInputBinding {
            phase: XInputPhase::Unbound,
            correlation_id: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum WgiBinding {
    Unbound,
    Bound(WgiGamepadId),
}

/// True when the slot's reading agrees with the fingerprint: same
/// fingerprinted buttons, every stick within one digest digit.
pub(crate) fn slot_matches(slot: &SlotSnapshot, m: &XInputMatch) -> bool {
    if !slot.connected {
        return false;
    }
    let reading = &slot.reading;
    reading.buttons & XINPUT_MATCH_MASK == m.buttons
        && digest_close(reading.thumb_lx, m.axes[0])
        && digest_close(!reading.thumb_ly, m.axes[1])
        && digest_close(reading.thumb_rx, m.axes[2])
        && digest_close(!reading.thumb_ry, m.axes[3])
}

/// Scans the unmapped slots for matches. Every matching slot gets its
/// `correlation_id` bumped, which doubles as negative evidence against any
/// other controller confirming on it this frame. Returns the slot and its
/// new id only for an unambiguous match with evidence.
fn guess_slot(cache: &mut XInputCache, m: &XInputMatch) -> Option<(u8, u8)> {
    let mut matches = 0;
    let mut found = (0, 0);
    for idx in 0..SLOT_COUNT as u8 {
        if cache.slot(idx).used || !slot_matches(cache.slot(idx), m) {
            continue;
        }
        let slot = cache.slot_mut(idx);
        slot.correlation_id = slot.correlation_id.wrapping_add(1);
        matches += 1;
        found = (idx, slot.correlation_id);
    }
    (matches == 1 && m.any_data).then_some(found)
}

/// Runs one frame of the XInput state machine for `ctrl`. Returns true when
/// the controller ends the frame confirmed, which makes it ineligible for
/// guide-button attribution.
pub(crate) fn update_xinput(
    ctrl: &mut Controller,
    cache: &mut XInputCache,
    wgi: &mut WgiRegistry,
    guide: &mut GuideArbiter,
    bus: &mut dyn EventBus,
) -> bool {
    cache.refresh();
    let m = XInputMatch::new(ctrl.match_state);

    if let XInputPhase::Confirmed { slot, missed } = ctrl.xinput.phase {
        if slot_matches(cache.slot(slot), &m) {
            ctrl.xinput.phase = XInputPhase::Confirmed { slot, missed: 0 };
        } else {
            let missed = missed + 1;
            if missed >= UNCORRELATE_FRAMES {
                debug!(
                    "un-correlated controller {} from XInput slot {}",
                    ctrl.instance_id, slot
                );
                cache.slot_mut(slot).used = false;
                ctrl.xinput.phase = XInputPhase::Unbound;
                // Triggers fall back to the merged byte right away; the
                // peer's guide state is unknowable now, so release it.
                ctrl.reapply_last(cache, wgi, bus);
                if !ctrl.family.reports_guide() {
                    ctrl.force_release_guide(bus);
                }
            } else {
                ctrl.xinput.phase = XInputPhase::Confirmed { slot, missed };
            }
        }
    }

    if let XInputPhase::Confirmed { .. } = ctrl.xinput.phase {
        return true;
    }

    // Unbound or candidate; a freshly dropped binding also lands here and
    // may start a new candidacy in the same frame.
    let mut confirmed = false;
    let mut next = XInputPhase::Unbound;
    if cache.has_unused_slot() {
        if let Some((slot, correlation_id)) = guess_slot(cache, &m) {
            let count = match ctrl.xinput.phase {
                XInputPhase::Candidate {
                    slot: prev_slot,
                    count,
                } if prev_slot == slot
                    && ctrl.xinput.correlation_id.wrapping_add(1) == correlation_id =>
                {
                    // Same slot, and nobody else matched it in between.
                    count + 1
                }
                _ => 1,
            };
            ctrl.xinput.correlation_id = correlation_id;
            if count >= CONFIRM_FRAMES {
                debug!(
                    "correlated controller {} to XInput slot {}",
                    ctrl.instance_id, slot
                );
                cache.slot_mut(slot).used = true;
                next = XInputPhase::Confirmed { slot, missed: 0 };
                confirmed = true;
            } else {
                next = XInputPhase::Candidate { slot, count };
            }
        }
    }
    ctrl.xinput.phase = next;
    if confirmed {
        // The arbiter no longer speaks for this controller; the peer does.
        guide.forget(ctrl.instance_id);
        // Replay the stored report so guide and trigger state from the slot
        // reach the host in the same frame the binding was made.
        ctrl.reapply_last(cache, wgi, bus);
    }
    confirmed
}
