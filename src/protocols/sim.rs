// SPDX-License-Identifier: GPL-3.0-only
//! Simulated HID backend for tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::apple_hid::ReportKind;
use super::{DeviceEntry, DevicePath, HidBackend, HidHandle};
use crate::error::{EnumerateError, OpenError, TransportError};

/// Which sent reports the simulated firmware accepts
#[derive(Clone)]
pub enum Accept {
    All,
    Never,
    /// Only the n-th report sent (1-based), counted over the device lifetime
    Nth(usize),
    With(Arc<dyn Fn(ReportKind, &[u8]) -> bool + Send + Sync>),
}

struct State {
    descriptor: Vec<u8>,
    input_report: Vec<u8>,
    writes: Vec<(ReportKind, Vec<u8>)>,
    accept: Accept,
    fail_reads: bool,
    panic_on_read: bool,
    fail_descriptor: bool,
    panic_on_close: bool,
    opened: usize,
    closed: usize,
}

/// Shared state of one simulated interface; clones observe the same device
#[derive(Clone)]
pub struct SimDevice {
    state: Arc<Mutex<State>>,
}

impl SimDevice {
    pub fn new(descriptor: &[u8]) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                descriptor: descriptor.to_vec(),
                input_report: Vec::new(),
                writes: Vec::new(),
                accept: Accept::All,
                fail_reads: false,
                panic_on_read: false,
                fail_descriptor: false,
                panic_on_close: false,
                opened: 0,
                closed: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn handle(&self) -> SimHandle {
        self.state().opened += 1;
        SimHandle {
            device: self.clone(),
        }
    }

    pub fn set_input_report(&self, report: &[u8]) {
        self.state().input_report = report.to_vec();
    }

    pub fn set_accept(&self, accept: Accept) {
        self.state().accept = accept;
    }

    pub fn fail_reads(&self) {
        self.state().fail_reads = true;
    }

    pub fn panic_on_read(&self, panic: bool) {
        self.state().panic_on_read = panic;
    }

    pub fn fail_descriptor(&self) {
        self.state().fail_descriptor = true;
    }

    pub fn panic_on_close(&self) {
        self.state().panic_on_close = true;
    }

    /// Every report sent, accepted or not
    pub fn writes(&self) -> Vec<(ReportKind, Vec<u8>)> {
        self.state().writes.clone()
    }

    pub fn opened(&self) -> usize {
        self.state().opened
    }

    pub fn closed(&self) -> usize {
        self.state().closed
    }

    fn send(&self, kind: ReportKind, buf: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();
        state.writes.push((kind, buf.to_vec()));
        let accepted = match &state.accept {
            Accept::All => true,
            Accept::Never => false,
            Accept::Nth(n) => state.writes.len() == *n,
            Accept::With(f) => f(kind, buf),
        };
        if !accepted {
            return Err(TransportError {
                os_code: Some(31),
                message: "A device attached to the system is not functioning.".into(),
            });
        }
        if kind == ReportKind::Feature {
            state.input_report = buf.to_vec();
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimHandle {
    device: SimDevice,
}

impl std::fmt::Debug for SimDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDevice").finish_non_exhaustive()
    }
}

impl HidHandle for SimHandle {
    fn report_descriptor(&mut self) -> Result<Vec<u8>, TransportError> {
        let state = self.device.state();
        if state.fail_descriptor {
            return Err(TransportError::new("descriptor unavailable"));
        }
        Ok(state.descriptor.clone())
    }

    fn get_input_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.device.state().panic_on_read {
            panic!("simulated driver fault");
        }
        let state = self.device.state();
        if state.fail_reads {
            return Err(TransportError {
                os_code: Some(1167),
                message: "The device is not connected.".into(),
            });
        }
        if state.input_report.first() != buf.first() {
            return Err(TransportError::new("unknown report id"));
        }
        let n = state.input_report.len().min(buf.len());
        buf[..n].copy_from_slice(&state.input_report[..n]);
        Ok(n)
    }

    fn send_feature_report(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.device.send(ReportKind::Feature, buf)
    }

    fn send_output_report(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.device.send(ReportKind::Output, buf)
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        let panic = {
            let mut state = self.device.state();
            state.closed += 1;
            state.panic_on_close
        };
        if panic {
            panic!("simulated close failure");
        }
    }
}

/// Simulated device class; interfaces can be plugged and unplugged at runtime
#[derive(Clone, Default)]
pub struct SimBackend {
    entries: Arc<Mutex<Vec<(DeviceEntry, SimDevice)>>>,
    enumerations: Arc<AtomicUsize>,
    fail_enumerate: Arc<AtomicBool>,
    fail_open: Arc<AtomicBool>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(DeviceEntry, SimDevice)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an interface with the given hardware identifier
    pub fn plug(&self, path: &str, hardware_id: &str, device: SimDevice) {
        let path = std::ffi::CString::new(path).unwrap_or_default();
        self.entries().push((
            DeviceEntry {
                path: DevicePath::from(path.as_c_str()),
                hardware_id: hardware_id.to_string(),
            },
            device,
        ));
    }

    pub fn unplug_all(&self) {
        self.entries().clear();
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn set_fail_enumerate(&self, fail: bool) {
        self.fail_enumerate.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

impl HidBackend for SimBackend {
    fn enumerate(&self) -> Result<Vec<DeviceEntry>, EnumerateError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumerate.load(Ordering::SeqCst) {
            return Err(EnumerateError::Api("device class unavailable".into()));
        }
        Ok(self.entries().iter().map(|(entry, _)| entry.clone()).collect())
    }

    fn open(&self, path: &DevicePath) -> Result<Box<dyn HidHandle>, OpenError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(OpenError::Io {
                code: Some(5),
                message: "Access is denied.".into(),
            });
        }
        self.entries()
            .iter()
            .find(|(entry, _)| &entry.path == path)
            .map(|(_, device)| Box::new(device.handle()) as Box<dyn HidHandle>)
            .ok_or(OpenError::Io {
                code: Some(2),
                message: "The system cannot find the file specified.".into(),
            })
    }
}
