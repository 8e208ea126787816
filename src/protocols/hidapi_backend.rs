// SPDX-License-Identifier: GPL-3.0-only
//! hidapi-backed HID transport

use hidapi::{HidApi, HidDevice, HidError};

use super::{DeviceEntry, DevicePath, HidBackend, HidHandle};
use crate::error::{EnumerateError, OpenError, TransportError};
use crate::monitor::enumeration::hardware_id;

/// Largest report descriptor the HID specification allows
const MAX_REPORT_DESCRIPTOR_SIZE: usize = 4096;

/// HID backend using the platform hidapi library
///
/// hidapi opens interfaces with shared read/write access on every platform,
/// so other clients (e.g. the OS display stack) keep working while a session
/// is open.
#[derive(Debug, Default)]
pub struct HidapiBackend;

impl HidapiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl HidBackend for HidapiBackend {
    fn enumerate(&self) -> Result<Vec<DeviceEntry>, EnumerateError> {
        let api = HidApi::new().map_err(|e| EnumerateError::Api(e.to_string()))?;

        Ok(api
            .device_list()
            .map(|info| {
                let path = info.path();
                DeviceEntry {
                    path: DevicePath::from(path),
                    hardware_id: hardware_id(
                        info.vendor_id(),
                        info.product_id(),
                        info.interface_number(),
                        &path.to_string_lossy(),
                    ),
                }
            })
            .collect())
    }

    fn open(&self, path: &DevicePath) -> Result<Box<dyn HidHandle>, OpenError> {
        let api = HidApi::new().map_err(open_error)?;
        let device = api.open_path(path.as_c_str()).map_err(open_error)?;
        Ok(Box::new(HidapiHandle { device }))
    }
}

#[derive(Debug)]
struct HidapiHandle {
    device: HidDevice,
}

impl HidHandle for HidapiHandle {
    fn report_descriptor(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; MAX_REPORT_DESCRIPTOR_SIZE];
        let len = self
            .device
            .get_report_descriptor(&mut buf)
            .map_err(transport_error)?;
        buf.truncate(len);
        Ok(buf)
    }

    fn get_input_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.device.get_input_report(buf).map_err(transport_error)
    }

    fn send_feature_report(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.device.send_feature_report(buf).map_err(transport_error)
    }

    fn send_output_report(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        // hidapi writes go out as output reports on the interrupt or control pipe
        self.device
            .write(buf)
            .map(|_| ())
            .map_err(transport_error)
    }
}

fn transport_error(err: HidError) -> TransportError {
    match err {
        HidError::IoError { error } => TransportError {
            os_code: error.raw_os_error(),
            message: error.to_string(),
        },
        other => TransportError::new(other.to_string()),
    }
}

fn open_error(err: HidError) -> OpenError {
    match err {
        HidError::IoError { error } => OpenError::Io {
            code: error.raw_os_error(),
            message: error.to_string(),
        },
        HidError::HidApiError { message } => OpenError::Io {
            code: None,
            message,
        },
        other => {
            tracing::debug!("hidapi open failed without an OS error: {}", other);
            OpenError::InvalidHandle
        }
    }
}
