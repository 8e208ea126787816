// SPDX-License-Identifier: GPL-3.0-only
//! Apple Studio Display specifications

use crate::devices::{DeviceSpec, HardwareMatch};

/// USB Product ID for Apple Studio Display
pub const PRODUCT_ID: u16 = 0x1114;

/// USB interface number of the brightness HID endpoint
pub const INTERFACE_NUMBER: i32 = 0x7;

/// Hardware identifier tokens of the brightness interface.
///
/// These strings are matched verbatim against the hardware identifier and
/// must not change.
pub const HARDWARE_MATCH: HardwareMatch = HardwareMatch {
    vendor: "VID_05AC",
    product: "PID_1114",
    interface: "MI_07",
    excluded: "Col",
};

/// Device specification for Apple Studio Display
pub const SPEC: DeviceSpec = DeviceSpec {
    vendor_id: super::VENDOR_ID,
    product_id: PRODUCT_ID,
    interface_number: INTERFACE_NUMBER,
    name: "Apple Studio Display",
    hardware_match: HARDWARE_MATCH,
    min_brightness_value: 400,
    max_brightness_value: 60000,
};
