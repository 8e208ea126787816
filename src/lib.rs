// SPDX-License-Identifier: GPL-3.0-only
//! Brightness control for the Apple Studio Display over USB HID

#[macro_use]
extern crate tracing;

pub mod brightness;
pub mod config;
pub mod daemon;
pub mod devices;
pub mod error;
pub mod hid;
pub mod monitor;
pub mod preview;
pub mod protocols;
