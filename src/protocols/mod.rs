// SPDX-License-Identifier: GPL-3.0-only
//! HID transport seam and the display brightness protocol
//!
//! [`HidBackend`] and [`HidHandle`] are the only places the crate touches the
//! operating system. Everything above them (enumeration filtering, capability
//! negotiation, report encoding) is plain Rust and runs the same against the
//! simulated device used in tests.

pub mod apple_hid;

#[cfg(feature = "hidapi-backend")]
pub mod hidapi_backend;

#[cfg(test)]
pub(crate) mod sim;

use std::ffi::{CStr, CString};
use std::fmt;

use crate::error::{EnumerateError, OpenError, TransportError};

/// OS path of one HID interface
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DevicePath(CString);

impl DevicePath {
    pub fn as_c_str(&self) -> &CStr {
        &self.0
    }
}

impl From<&CStr> for DevicePath {
    fn from(path: &CStr) -> Self {
        Self(path.to_owned())
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

/// One enumerated HID interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub path: DevicePath,
    /// Windows-style hardware identifier, e.g. `HID\VID_05AC&PID_1114&MI_07`
    pub hardware_id: String,
}

/// Access to the HID device class
pub trait HidBackend: Send + Sync {
    /// List every HID interface currently present
    fn enumerate(&self) -> Result<Vec<DeviceEntry>, EnumerateError>;

    /// Open an existing interface for shared read/write access
    fn open(&self, path: &DevicePath) -> Result<Box<dyn HidHandle>, OpenError>;
}

/// An open HID interface; dropping it closes the handle
pub trait HidHandle: fmt::Debug + Send {
    /// Raw report descriptor of the interface
    fn report_descriptor(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Fetch the current input report whose id is in `buf[0]`
    fn get_input_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn send_feature_report(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    fn send_output_report(&mut self, buf: &[u8]) -> Result<(), TransportError>;
}
