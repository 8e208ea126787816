// SPDX-License-Identifier: GPL-3.0-only
//! Apple HID brightness control protocol
//!
//! The Studio Display exposes its backlight as a single vendor-defined value
//! usage on USB interface 7. The report layout is read from the device's
//! report descriptor ([`capabilities`]); reads decode the value from an input
//! report, writes probe a fixed list of report encodings ([`encoding`]) until
//! the device accepts one ([`channel`]).

pub mod capabilities;
pub mod channel;
pub mod encoding;

pub use capabilities::{negotiate, DeviceCapabilities, Negotiated};
pub use channel::{BrightnessChannel, BrightnessValue};
pub use encoding::{Encoding, ReportKind, WRITE_ENCODINGS};
