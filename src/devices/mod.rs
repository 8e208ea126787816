// SPDX-License-Identifier: GPL-3.0-only
//! Device-specific configurations organized by manufacturer

pub mod apple;

/// Hardware identifier substrings that select one HID interface
///
/// A candidate matches when its hardware identifier contains the vendor,
/// product and interface tokens and does not contain the excluded token.
/// The exclusion filters out sibling logical collections (`&Col01`, ...)
/// that Windows exposes for the same physical interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareMatch {
    pub vendor: &'static str,
    pub product: &'static str,
    pub interface: &'static str,
    pub excluded: &'static str,
}

impl HardwareMatch {
    pub fn matches(&self, hardware_id: &str) -> bool {
        hardware_id.contains(self.vendor)
            && hardware_id.contains(self.product)
            && hardware_id.contains(self.interface)
            && !hardware_id.contains(self.excluded)
    }
}

/// Device specification for a display
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// USB Vendor ID
    pub vendor_id: u16,

    /// USB Product ID
    pub product_id: u16,

    /// USB interface carrying the brightness control
    pub interface_number: i32,

    /// Human-readable device name
    pub name: &'static str,

    /// Hardware identifier filter for the brightness interface
    pub hardware_match: HardwareMatch,

    /// Minimum brightness protocol value (not physical nits)
    pub min_brightness_value: u32,

    /// Maximum brightness protocol value the device honours
    pub max_brightness_value: u32,
}

impl DeviceSpec {
    /// Get the brightness protocol value range (max - min)
    pub fn brightness_range(&self) -> u32 {
        self.max_brightness_value - self.min_brightness_value
    }
}
