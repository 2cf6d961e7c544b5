// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Attribution of guide presses seen on unmapped XInput slots.
//!
//! A guide press on a slot nobody is correlated to still belongs to *some*
//! physical controller. The arbiter hands it to the uncorrelated controller
//! that delivered a state packet most recently, on the theory that the hand
//! pressing the guide button is the hand that just moved a stick.

use crate::ev::EventBus;
use crate::registry::Registry;
use crate::utils::ticks_passed;
use crate::xinput::{self, XInputCache, SLOT_COUNT};

pub(crate) struct GuideArbiter {
    /// This frame's attribution target.
    candidate: Option<usize>,
    /// `last_state_packet` of the candidate, for the recency comparison.
    candidate_packet: Option<u32>,
    /// Controller currently holding an attributed press.
    holder: Option<usize>,
}

impl GuideArbiter {
    pub fn new() -> Self {
        GuideArbiter {
            candidate: None,
            candidate_packet: None,
            holder: None,
        }
    }

    /// Offers `id` as this frame's attribution target. The most recently
    /// active controller wins; a tie goes to the later offer.
    pub fn offer(&mut self, id: usize, last_state_packet: Option<u32>) {
        let newer = match (last_state_packet, self.candidate_packet) {
            (Some(packet), Some(current)) => ticks_passed(packet, current),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if self.candidate.is_none() || newer {
            self.candidate = Some(id);
            self.candidate_packet = last_state_packet;
        }
    }

    /// Drops all references to a controller that correlated or went away.
    /// No release is emitted here; a correlated controller's guide state
    /// comes from its peer from now on.
    pub fn forget(&mut self, id: usize) {
        if self.candidate == Some(id) {
            self.candidate = None;
        }
        if self.holder == Some(id) {
            self.holder = None;
        }
    }

    /// End-of-frame pass: attribute or release the unmapped guide press,
    /// then invalidate the slot cache for the next frame.
    pub fn finish_frame(
        &mut self,
        cache: &mut XInputCache,
        registry: &mut Registry,
        bus: &mut dyn EventBus,
    ) {
        let mut unmapped_guide = false;
        if !cache.is_dirty() {
            for idx in 0..SLOT_COUNT as u8 {
                let slot = cache.slot(idx);
                if slot.connected && !slot.used && slot.reading.buttons & xinput::BUTTON_GUIDE != 0
                {
                    unmapped_guide = true;
                    break;
                }
            }
        }

        if unmapped_guide {
            if self.holder.is_none() {
                if let Some(id) = self.candidate {
                    Self::emit(registry, bus, id, true);
                    self.holder = Some(id);
                }
            }
        } else if let Some(id) = self.holder.take() {
            Self::emit(registry, bus, id, false);
        }

        self.candidate = None;
        cache.mark_dirty();
    }

    fn emit(registry: &mut Registry, bus: &mut dyn EventBus, id: usize, pressed: bool) {
        if let Some(ctrl) = registry.get_mut(id).and_then(|dev| dev.controller.as_mut()) {
            ctrl.set_guide(bus, pressed);
        }
    }
}
