// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! HID report decoding for the supported controller families.

use crate::ev::Button;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Controller family, which selects the report decoder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Family {
    /// Xbox 360 and wired Xbox One pads: the XUSB report with a single
    /// merged trigger byte and no guide button.
    Xbox360,
    /// Xbox One S pads on the Bluetooth protocol: discriminated reports
    /// with independent triggers and a dedicated guide packet.
    XboxOneS,
    /// Third-party pads speaking the XUSB protocol.
    Generic,
}

impl Family {
    /// Recognizes a device from its USB ids. Devices this engine cannot
    /// drive return `None` and stay out of the registry.
    pub fn detect(vendor_id: u16, product_id: u16, version: u16) -> Option<Family> {
        if vendor_id == 0x045e && product_id == 0x028e && version == 1 {
            // Steam Virtual Gamepad. It shows up in raw enumeration but
            // never delivers input there; XInput has to be used instead.
            return None;
        }
        match (vendor_id, product_id) {
            (0x045e, 0x02e0) | (0x045e, 0x02fd) => Some(Family::XboxOneS),
            (0x045e, _) => Some(Family::Xbox360),
            // Xbox-licensed vendors: Logitech, Thrustmaster, Mad Catz,
            // HORI, PDP, Razer, PowerA.
            (0x046d, _) | (0x044f, _) | (0x1bad, _) | (0x0f0d, _) | (0x0e6f, _)
            | (0x1532, _) | (0x24c6, _) => Some(Family::Generic),
            _ => None,
        }
    }

    /// Whether the family's own reports carry the guide button. When they
    /// do, the engine never synthesizes guide state from peer APIs.
    pub(crate) fn reports_guide(self) -> bool {
        matches!(self, Family::XboxOneS)
    }

    pub(crate) fn product_name(vendor_id: u16, product_id: u16) -> Option<&'static str> {
        let name = match (vendor_id, product_id) {
            (0x045e, 0x028e) => "Xbox 360 Controller",
            (0x045e, 0x028f) => "Xbox 360 Wireless Controller",
            (0x045e, 0x0719) => "Xbox 360 Wireless Adapter",
            (0x045e, 0x02d1) | (0x045e, 0x02dd) => "Xbox One Controller",
            (0x045e, 0x02e3) => "Xbox One Elite Controller",
            (0x045e, 0x02ea) | (0x045e, 0x02e0) | (0x045e, 0x02fd) => "Xbox One S Controller",
            _ => return None,
        };
        Some(name)
    }
}

/// Why a packet was dropped.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum DecodeError {
    /// Shorter than the family's minimum layout.
    Malformed { len: usize },
    /// First byte is not a discriminator this family produces.
    UnknownReport { discriminator: u8 },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DecodeError::Malformed { len } => write!(f, "report too short ({} bytes)", len),
            DecodeError::UnknownReport { discriminator } => {
                write!(f, "unknown report discriminator 0x{:02x}", discriminator)
            }
        }
    }
}

/// A decoded state packet, in the engine's conventions: axes signed and
/// centered, Y sticks up-positive, buttons as [`Button`] bits.
#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct StateReport {
    /// Pressed buttons; the guide bit is never set here.
    pub buttons: u16,
    /// LX, LY, RX, RY.
    pub axes: [i16; 4],
    /// Independent trigger values, when the report carries them.
    pub triggers: Option<(i16, i16)>,
    /// The merged trigger byte, when the report only carries that.
    pub merged_trigger: Option<u8>,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Report {
    State(StateReport),
    /// Guide button state delivered out of band (Xbox One S).
    Guide(bool),
}

pub(crate) fn decode(family: Family, data: &[u8]) -> Result<Report, DecodeError> {
    match family {
        Family::Xbox360 | Family::Generic => decode_xusb(data),
        Family::XboxOneS => decode_one_s(data),
    }
}

fn axis_at(data: &[u8], offset: usize) -> i16 {
    (u16::from_le_bytes([data[offset], data[offset + 1]]) ^ 0x8000) as i16
}

/// The XUSB layout delivered over raw input on Windows: sticks at 0..8, the
/// merged trigger byte at 9, buttons at 10 and stick clicks plus an 8-way
/// hat at 11.
fn decode_xusb(data: &[u8]) -> Result<Report, DecodeError> {
    if data.len() < 12 {
        return Err(DecodeError::Malformed { len: data.len() });
    }

    let mut buttons = 0;
    for (bit, button) in [
        (0x01, Button::A),
        (0x02, Button::B),
        (0x04, Button::X),
        (0x08, Button::Y),
        (0x10, Button::LeftShoulder),
        (0x20, Button::RightShoulder),
        (0x40, Button::Back),
        (0x80, Button::Start),
    ] {
        if data[10] & bit != 0 {
            buttons |= button.bit();
        }
    }
    if data[11] & 0x01 != 0 {
        buttons |= Button::LeftStick.bit();
    }
    if data[11] & 0x02 != 0 {
        buttons |= Button::RightStick.bit();
    }
    buttons |= xusb_hat(data[11] & 0x3C);

    Ok(Report::State(StateReport {
        buttons,
        axes: [
            axis_at(data, 0),
            axis_at(data, 2),
            axis_at(data, 4),
            axis_at(data, 6),
        ],
        triggers: None,
        merged_trigger: Some(data[9]),
    }))
}

fn xusb_hat(bits: u8) -> u16 {
    let up = Button::DPadUp.bit();
    let down = Button::DPadDown.bit();
    let left = Button::DPadLeft.bit();
    let right = Button::DPadRight.bit();
    match bits {
        4 => up,
        8 => up | right,
        12 => right,
        16 => right | down,
        20 => down,
        24 => down | left,
        28 => left,
        32 => up | left,
        _ => 0,
    }
}

/// The Bluetooth layout of Xbox One S pads: report 0x01 is a state packet
/// with 10-bit independent triggers, report 0x02 carries the guide button.
fn decode_one_s(data: &[u8]) -> Result<Report, DecodeError> {
    match data.first().copied() {
        Some(0x01) => {
            if data.len() < 17 {
                return Err(DecodeError::Malformed { len: data.len() });
            }

            let mut buttons = 0;
            for (bit, button) in [
                (0x01, Button::A),
                (0x02, Button::B),
                (0x08, Button::X),
                (0x10, Button::Y),
                (0x40, Button::LeftShoulder),
                (0x80, Button::RightShoulder),
            ] {
                if data[14] & bit != 0 {
                    buttons |= button.bit();
                }
            }
            if data[15] & 0x08 != 0 {
                buttons |= Button::Start.bit();
            }
            if data[15] & 0x20 != 0 {
                buttons |= Button::LeftStick.bit();
            }
            if data[15] & 0x40 != 0 {
                buttons |= Button::RightStick.bit();
            }
            if data[16] & 0x01 != 0 {
                buttons |= Button::Back.bit();
            }
            buttons |= one_s_hat(data[13]);

            Ok(Report::State(StateReport {
                buttons,
                axes: [
                    axis_at(data, 1),
                    axis_at(data, 3),
                    axis_at(data, 5),
                    axis_at(data, 7),
                ],
                triggers: Some((one_s_trigger(data, 9), one_s_trigger(data, 11))),
                merged_trigger: None,
            }))
        }
        Some(0x02) => {
            if data.len() < 2 {
                return Err(DecodeError::Malformed { len: data.len() });
            }
            Ok(Report::Guide(data[1] & 0x01 != 0))
        }
        Some(discriminator) => Err(DecodeError::UnknownReport { discriminator }),
        None => Err(DecodeError::Malformed { len: 0 }),
    }
}

fn one_s_hat(value: u8) -> u16 {
    let up = Button::DPadUp.bit();
    let down = Button::DPadDown.bit();
    let left = Button::DPadLeft.bit();
    let right = Button::DPadRight.bit();
    match value {
        1 => up,
        2 => up | right,
        3 => right,
        4 => right | down,
        5 => down,
        6 => down | left,
        7 => left,
        8 => up | left,
        _ => 0,
    }
}

/// 10-bit trigger scaled to the full axis range, with the top step snapped
/// to `i16::MAX` so a fully pressed trigger saturates.
fn one_s_trigger(data: &[u8], offset: usize) -> i16 {
    let raw = u16::from_le_bytes([data[offset], data[offset + 1]]) as i32;
    let axis = raw * 64 - 32768;
    if axis == 32704 {
        i16::MAX
    } else {
        axis as i16
    }
}

/// Decomposes the XUSB merged trigger byte when no peer API can provide the
/// real values: below 0x80 only the right trigger is pressed, above it only
/// the left.
pub(crate) fn merged_triggers(byte: u8) -> (i16, i16) {
    let axis = byte as i32 * 257 - 32768;
    if byte < 0x80 {
        (i16::MIN, (-axis * 2 - 32769) as i16)
    } else if byte > 0x80 {
        ((axis * 2 - 32767) as i16, i16::MIN)
    } else {
        (i16::MIN, i16::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xusb(buttons: u8, extra: u8, trigger: u8, sticks: [u16; 4]) -> [u8; 12] {
        let mut data = [0; 12];
        for (nth, stick) in sticks.into_iter().enumerate() {
            data[nth * 2..nth * 2 + 2].copy_from_slice(&stick.to_le_bytes());
        }
        data[9] = trigger;
        data[10] = buttons;
        data[11] = extra;
        data
    }

    #[test]
    fn xusb_buttons_and_axes() {
        let data = xusb(0x41, 0x01, 0x80, [0x6000, 0x8000, 0x8000, 0xFFFF]);
        let report = decode(Family::Xbox360, &data).unwrap();
        match report {
            Report::State(state) => {
                assert_eq!(
                    state.buttons,
                    Button::A.bit() | Button::Back.bit() | Button::LeftStick.bit()
                );
                assert_eq!(state.axes[0], -0x2000);
                assert_eq!(state.axes[1], 0);
                assert_eq!(state.axes[3], 0x7FFF);
                assert_eq!(state.merged_trigger, Some(0x80));
                assert_eq!(state.triggers, None);
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn xusb_hat_directions() {
        assert_eq!(xusb_hat(4), Button::DPadUp.bit());
        assert_eq!(xusb_hat(8), Button::DPadUp.bit() | Button::DPadRight.bit());
        assert_eq!(xusb_hat(20), Button::DPadDown.bit());
        assert_eq!(xusb_hat(32), Button::DPadUp.bit() | Button::DPadLeft.bit());
        assert_eq!(xusb_hat(0), 0);
    }

    #[test]
    fn xusb_too_short() {
        assert_eq!(
            decode(Family::Generic, &[0; 11]),
            Err(DecodeError::Malformed { len: 11 })
        );
    }

    #[test]
    fn one_s_state_packet() {
        let mut data = [0u8; 17];
        data[0] = 0x01;
        data[1..3].copy_from_slice(&0x8000u16.to_le_bytes());
        data[3..5].copy_from_slice(&0x8000u16.to_le_bytes());
        data[5..7].copy_from_slice(&0x8000u16.to_le_bytes());
        data[7..9].copy_from_slice(&0x8000u16.to_le_bytes());
        data[9..11].copy_from_slice(&1023u16.to_le_bytes());
        data[13] = 3;
        data[14] = 0x09; // A + X
        data[16] = 0x01; // Back

        match decode(Family::XboxOneS, &data).unwrap() {
            Report::State(state) => {
                assert_eq!(
                    state.buttons,
                    Button::A.bit() | Button::X.bit() | Button::Back.bit() | Button::DPadRight.bit()
                );
                assert_eq!(state.axes, [0; 4]);
                // Full press saturates despite the 10-bit resolution.
                assert_eq!(state.triggers, Some((i16::MAX, i16::MIN)));
                assert_eq!(state.merged_trigger, None);
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn one_s_guide_packet() {
        assert_eq!(
            decode(Family::XboxOneS, &[0x02, 0x01]),
            Ok(Report::Guide(true))
        );
        assert_eq!(
            decode(Family::XboxOneS, &[0x02, 0x00]),
            Ok(Report::Guide(false))
        );
    }

    #[test]
    fn one_s_unknown_discriminator() {
        assert_eq!(
            decode(Family::XboxOneS, &[0x04, 0, 0]),
            Err(DecodeError::UnknownReport { discriminator: 4 })
        );
    }

    #[test]
    fn merged_trigger_decomposition() {
        assert_eq!(merged_triggers(0x80), (i16::MIN, i16::MIN));
        // Byte 0 is the right trigger fully pressed.
        assert_eq!(merged_triggers(0x00), (i16::MIN, i16::MAX));
        assert_eq!(merged_triggers(0xFF), (i16::MAX, i16::MIN));
        let (left, right) = merged_triggers(0x81);
        assert!(left > i16::MIN && left < 0);
        assert_eq!(right, i16::MIN);
    }

    #[test]
    fn family_detection() {
        assert_eq!(Family::detect(0x045e, 0x028e, 0x0114), Some(Family::Xbox360));
        assert_eq!(Family::detect(0x045e, 0x02fd, 0x0001), Some(Family::XboxOneS));
        assert_eq!(Family::detect(0x046d, 0xc21d, 0x0001), Some(Family::Generic));
        // Steam Virtual Gamepad is rejected outright.
        assert_eq!(Family::detect(0x045e, 0x028e, 1), None);
        assert_eq!(Family::detect(0x054c, 0x05c4, 0x0100), None);
    }
}
