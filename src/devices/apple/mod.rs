// SPDX-License-Identifier: GPL-3.0-only
//! Apple display device specifications

pub mod studio_display;

/// Apple USB Vendor ID
pub const VENDOR_ID: u16 = 0x05ac;
