// SPDX-License-Identifier: GPL-3.0-only
//! Locate the brightness interface among all HID interfaces

use crate::devices::HardwareMatch;
use crate::error::EnumerateError;
use crate::protocols::{DevicePath, HidBackend};

/// Build a Windows-style hardware identifier for an interface
///
/// `HID\VID_05AC&PID_1114&MI_07`, with `&ColNN` appended when the OS path
/// names a logical collection (Windows interface paths carry `&col01`).
pub fn hardware_id(vendor_id: u16, product_id: u16, interface_number: i32, os_path: &str) -> String {
    let mut id = format!("HID\\VID_{:04X}&PID_{:04X}", vendor_id, product_id);
    if interface_number >= 0 {
        id.push_str(&format!("&MI_{:02X}", interface_number));
    }
    if let Some(collection) = collection_suffix(os_path) {
        id.push_str("&Col");
        id.push_str(&collection);
    }
    id
}

fn collection_suffix(os_path: &str) -> Option<String> {
    let lower = os_path.to_ascii_lowercase();
    let start = lower.find("&col")? + "&col".len();
    Some(
        lower[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect::<String>()
            .to_ascii_uppercase(),
    )
}

/// Return the path of the first interface matching `criteria`
///
/// `Ok(None)` means enumeration worked but nothing matched.
pub fn find_device(
    backend: &dyn HidBackend,
    criteria: &HardwareMatch,
) -> Result<Option<DevicePath>, EnumerateError> {
    let entries = backend.enumerate()?;
    debug!("Enumerated {} HID interface(s)", entries.len());

    for entry in entries {
        if criteria.matches(&entry.hardware_id) {
            info!("Found brightness interface {} at {}", entry.hardware_id, entry.path);
            return Ok(Some(entry.path));
        }
        trace!("Skipping HID interface {}", entry.hardware_id);
    }

    debug!("No HID interface matches {:?}", criteria);
    Ok(None)
}
