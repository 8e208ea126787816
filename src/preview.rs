// SPDX-License-Identifier: GPL-3.0-only
//! Temporary brightness previews
//!
//! A preview changes the display brightness until it is either committed or
//! abandoned. Abandoning (dropping the guard) writes the original value back
//! once, synchronously, before the guard goes away.

use crate::error::{ReadError, WriteError};
use crate::monitor::{lock, SharedManager};
use crate::protocols::apple_hid::BrightnessValue;

pub struct PreviewGuard {
    manager: SharedManager,
    original: BrightnessValue,
    committed: bool,
}

impl PreviewGuard {
    /// Remember the current brightness so it can be restored later
    pub fn begin(manager: SharedManager) -> Result<Self, ReadError> {
        let original = lock(&manager).get()?;
        tracing::debug!("Preview started from brightness {}", original);
        Ok(Self {
            manager,
            original,
            committed: false,
        })
    }

    pub fn original(&self) -> BrightnessValue {
        self.original
    }

    /// Show `value` without committing to it
    pub fn show(&self, value: BrightnessValue) -> Result<(), WriteError> {
        lock(&self.manager).set(value).map(|_| ())
    }

    /// Keep the previewed brightness
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PreviewGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        match lock(&self.manager).set(self.original) {
            Ok(_) => tracing::debug!("Preview abandoned, restored brightness {}", self.original),
            Err(e) => tracing::warn!(
                "Failed to restore brightness {} after preview: {}",
                self.original,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::fixtures::STUDIO_DISPLAY;
    use crate::monitor::ConnectionManager;
    use crate::protocols::sim::{SimBackend, SimDevice};
    use std::sync::{Arc, Mutex};

    fn connected(initial: u32) -> (SharedManager, SimDevice) {
        let backend = SimBackend::new();
        let device = SimDevice::new(STUDIO_DISPLAY);
        let bytes = initial.to_le_bytes();
        device.set_input_report(&[2, bytes[0], bytes[1], bytes[2]]);
        backend.plug("studio", "HID\\VID_05AC&PID_1114&MI_07", device.clone());

        let mut manager = ConnectionManager::new(Box::new(backend));
        manager.acquire().unwrap();
        (Arc::new(Mutex::new(manager)), device)
    }

    #[test]
    fn test_abandoned_preview_restores() {
        let (manager, _device) = connected(30000);

        let guard = PreviewGuard::begin(manager.clone()).unwrap();
        guard.show(50000).unwrap();
        assert_eq!(lock(&manager).get(), Ok(50000));
        drop(guard);

        assert_eq!(lock(&manager).get(), Ok(30000));
    }

    #[test]
    fn test_committed_preview_is_kept() {
        let (manager, device) = connected(30000);

        let guard = PreviewGuard::begin(manager.clone()).unwrap();
        assert_eq!(guard.original(), 30000);
        guard.show(10000).unwrap();
        guard.commit();

        assert_eq!(lock(&manager).get(), Ok(10000));
        assert_eq!(device.writes().len(), 1);
    }

    #[test]
    fn test_begin_requires_connection() {
        let manager = Arc::new(Mutex::new(ConnectionManager::new(Box::new(SimBackend::new()))));
        assert!(matches!(
            PreviewGuard::begin(manager),
            Err(ReadError::NotConnected)
        ));
    }
}
