// SPDX-License-Identifier: GPL-3.0-only
//! An open, negotiated connection to the brightness interface

use std::panic::{self, AssertUnwindSafe};

use crate::error::{AcquireError, OpenError};
use crate::hid::{Caps, PreparsedData};
use crate::protocols::apple_hid::{negotiate, BrightnessChannel, DeviceCapabilities};
use crate::protocols::{DevicePath, HidBackend, HidHandle};

/// Open an existing interface for shared read/write access
pub fn open(backend: &dyn HidBackend, path: &DevicePath) -> Result<Box<dyn HidHandle>, OpenError> {
    backend.open(path).inspect_err(|e| {
        debug!("Failed to open {}: {}", path, e);
    })
}

/// Owns the handle and the parsed report layout for its whole lifetime
///
/// Teardown releases the layout, then closes the handle. It runs at most
/// once, either from [`Session::close`] or on drop.
pub struct Session {
    path: DevicePath,
    handle: Option<Box<dyn HidHandle>>,
    preparsed: Option<PreparsedData>,
    input_caps: DeviceCapabilities,
    feature_caps: DeviceCapabilities,
}

impl Session {
    /// Open `path` and negotiate its capabilities
    ///
    /// A negotiation failure closes the handle before returning.
    pub fn establish(backend: &dyn HidBackend, path: DevicePath) -> Result<Self, AcquireError> {
        let mut handle = open(backend, &path)?;
        let negotiated = negotiate(handle.as_mut()).inspect_err(|e| {
            debug!("Capability negotiation failed for {}: {}", path, e);
        })?;

        info!(
            "Session established on {} (input report id {}, feature report id {})",
            path, negotiated.input_caps.report_id, negotiated.feature_caps.report_id
        );

        Ok(Self {
            path,
            handle: Some(handle),
            preparsed: Some(negotiated.preparsed),
            input_caps: negotiated.input_caps,
            feature_caps: negotiated.feature_caps,
        })
    }

    pub fn path(&self) -> &DevicePath {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn input_caps(&self) -> DeviceCapabilities {
        self.input_caps
    }

    pub fn feature_caps(&self) -> DeviceCapabilities {
        self.feature_caps
    }

    /// Top-level capabilities, while the session is open
    pub fn caps(&self) -> Option<Caps> {
        self.preparsed.as_ref().map(PreparsedData::caps)
    }

    /// Brightness channel over this session; `None` once closed
    pub fn channel(&mut self) -> Option<BrightnessChannel<'_>> {
        match (self.handle.as_deref_mut(), self.preparsed.as_ref()) {
            (Some(handle), Some(preparsed)) => Some(BrightnessChannel::new(
                handle,
                preparsed,
                self.input_caps,
                self.feature_caps,
            )),
            _ => None,
        }
    }

    /// Release all resources; later calls do nothing
    pub fn close(&mut self) {
        let preparsed = self.preparsed.take();
        let handle = self.handle.take();
        if preparsed.is_none() && handle.is_none() {
            return;
        }

        let released = panic::catch_unwind(AssertUnwindSafe(move || {
            drop(preparsed);
            drop(handle);
        }));

        match released {
            Ok(()) => debug!("Closed session on {}", self.path),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("TeardownFailed: releasing session on {} panicked: {}", self.path, reason);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("input_caps", &self.input_caps)
            .field("feature_caps", &self.feature_caps)
            .finish()
    }
}
