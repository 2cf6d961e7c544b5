// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cross-API fusion of Xbox-family controller input.
//!
//! No single Windows input API tells the whole story. XInput is capped at
//! four devices and loses background input on newer pads. Windows.Gaming.Input
//! drops background events on some paths. Raw HID reaches every device in any
//! window state, but its reports lack the guide button, merge both triggers
//! into one byte, and cannot rumble with full precision. This crate treats
//! raw HID as the primary stream and *correlates* each controller with the
//! XInput slot or WGI gamepad describing the same physical device, by
//! matching live button and stick state across the APIs. Once a correlation
//! is confirmed, the peer supplies the fields HID cannot: independent
//! triggers, the guide button and vibration.
//!
//! The engine itself is platform-neutral. The OS surfaces are reached
//! through four traits the host implements: [`XInputApi`], [`WgiApi`],
//! [`HidTransport`] and [`EventBus`]. Everything runs single-threaded on the
//! host's frame tick:
//!
//! ```no_run
//! use xpad_fusion::{Fusion, XInputUnavailable, WgiUnavailable};
//! # struct Bus;
//! # impl xpad_fusion::EventBus for Bus {
//! #     fn button(&mut self, _: usize, _: xpad_fusion::Button, _: bool) {}
//! #     fn axis(&mut self, _: usize, _: xpad_fusion::Axis, _: i16) {}
//! #     fn added(&mut self, _: usize) {}
//! #     fn removed(&mut self, _: usize) {}
//! # }
//!
//! let mut fusion = Fusion::new(
//!     Box::new(XInputUnavailable),
//!     Box::new(WgiUnavailable),
//!     Box::new(Bus),
//! );
//! loop {
//!     // ... feed arrival notifications and HID reports ...
//!     fusion.update(/* now_ms */ 0);
//! #   break;
//! }
//! ```

#[macro_use]
extern crate log;

mod controller;
mod correlate;
mod fingerprint;
mod fusion;
mod guide;
mod registry;
mod report;
mod rumble;
mod utils;

pub mod ev;
pub mod wgi;
pub mod xinput;

pub use crate::controller::ControllerSnapshot;
pub use crate::ev::{Axis, Button, EventBus};
pub use crate::fusion::Fusion;
pub use crate::registry::{DeviceHandle, HidDeviceInfo, HidTransport};
pub use crate::report::Family;
pub use crate::wgi::{WgiApi, WgiGamepadId, WgiReading, WgiUnavailable};
pub use crate::xinput::{XInputApi, XInputReading, XInputUnavailable};

use std::error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;

/// A write to a peer API (XInput rumble, WGI vibration) failed. Carries no
/// detail; the router only needs success or failure to pick a fallback, and
/// the implementation is expected to log specifics itself.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PeerWriteError;

impl Display for PeerWriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("peer API write failed")
    }
}

impl error::Error for PeerWriteError {}

/// Errors surfaced to callers of the public API.
#[derive(Debug)]
pub enum Error {
    /// No device with this instance id is registered.
    UnknownDevice(usize),
    /// `open` was called twice without a `close` in between.
    AlreadyOpened(usize),
    /// The operation needs an open controller.
    NotOpened(usize),
    /// Setting the rumble state of a correlated XInput slot failed.
    XInputWrite(u8),
    /// The HID rumble packet was written only partially.
    HidWrite { written: usize, expected: usize },
    /// The HID transport reported an error.
    Transport(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::UnknownDevice(id) => write!(f, "no device with instance id {}", id),
            Error::AlreadyOpened(id) => write!(f, "controller {} is already open", id),
            Error::NotOpened(id) => write!(f, "controller {} is not open", id),
            Error::XInputWrite(slot) => write!(f, "XInput rumble failed for slot {}", slot),
            Error::HidWrite { written, expected } => write!(
                f,
                "short write of rumble packet, {} of {} bytes",
                written, expected
            ),
            Error::Transport(err) => write!(f, "HID transport error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Transport(err) => Some(err),
            _ => None,
        }
    }
}
