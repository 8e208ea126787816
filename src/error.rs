// SPDX-License-Identifier: GPL-3.0-only
//! Error types for the brightness core
//!
//! Every stage of session acquisition and every channel operation has its own
//! error type. [`ErrorKind`] folds them into the coarse taxonomy the
//! connection lifecycle reasons about, and [`Status`] is the small signed code
//! handed to collaborators.

use std::fmt;

use thiserror::Error;

use crate::hid::{DescriptorError, UsageError};

/// Coarse failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Enumeration found no matching hardware
    NotFound,
    /// HID enumeration itself failed
    EnumerationFailed,
    /// Handle acquisition failed
    OpenFailed,
    /// Preparsed data, top-level or value capability query failed
    CapabilityFailed,
    /// Input report fetch or usage value decode failed
    ReadFailed,
    /// Every write encoding was rejected
    WriteExhausted,
    /// Releasing session resources failed (logged, never surfaced)
    TeardownFailed,
}

/// Failure reported by the underlying HID transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// OS error code, when the transport exposes one
    pub os_code: Option<i32>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            os_code: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnumerateError {
    #[error("HID enumeration failed: {0}")]
    Api(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OpenError {
    #[error("failed to open HID device (os error {code:?}): {message}")]
    Io { code: Option<i32>, message: String },

    #[error("HID backend returned an invalid device handle")]
    InvalidHandle,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiateError {
    #[error("failed to retrieve preparsed data: {0}")]
    PreparsedData(#[source] TransportError),

    #[error("capability query failed: {0}")]
    CapsQueryFailed(#[from] DescriptorError),

    #[error("device exposes no value capabilities in its feature or input reports")]
    NoUsableReport,
}

/// Failure to establish a session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("no matching brightness device found")]
    NotFound,

    #[error(transparent)]
    Enumerate(#[from] EnumerateError),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Negotiate(#[from] NegotiateError),
}

impl AcquireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcquireError::NotFound => ErrorKind::NotFound,
            AcquireError::Enumerate(_) => ErrorKind::EnumerationFailed,
            AcquireError::Open(_) => ErrorKind::OpenFailed,
            AcquireError::Negotiate(_) => ErrorKind::CapabilityFailed,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("no brightness device connected")]
    NotConnected,

    #[error("failed to fetch input report: {0}")]
    ReportFetch(#[source] TransportError),

    #[error("failed to decode brightness from input report: {0}")]
    Decode(#[from] UsageError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("no brightness device connected")]
    NotConnected,

    #[error("device rejected all {attempts} brightness encodings for value {value}")]
    EncodingExhausted { value: u32, attempts: usize },
}

/// Bounded startup acquisition failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartupError {
    #[error("brightness device absent after {attempts} attempts")]
    DeviceAbsent { attempts: u32 },

    #[error("brightness device initialisation failed: {0}")]
    Fatal(#[source] AcquireError),
}

/// Reconnection watcher stopped without a session
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("no brightness device connected after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("waiting for the brightness device was cancelled")]
    Cancelled,
}

/// Status code returned to collaborators; 0 is success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    NotConnected = -1,
    EnumerationFailed = -2,
    ReadFailed = -3,
    WriteExhausted = -4,
    DeviceNotFound = -11,
    OpenFailed = -12,
    Exception = -13,
    CapabilityFailed = -14,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Success => "success",
            Status::NotConnected => "brightness device not connected",
            Status::EnumerationFailed => "HID enumeration failed",
            Status::ReadFailed => "failed to read brightness",
            Status::WriteExhausted => "device rejected every brightness encoding",
            Status::DeviceNotFound => "Apple Studio Display not found",
            Status::OpenFailed => "failed to open the brightness interface",
            Status::Exception => "brightness operation crashed",
            Status::CapabilityFailed => "failed to query device capabilities",
        };
        write!(f, "{} (status {})", text, self.code())
    }
}

impl From<&AcquireError> for Status {
    fn from(err: &AcquireError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Status::DeviceNotFound,
            ErrorKind::EnumerationFailed => Status::EnumerationFailed,
            ErrorKind::OpenFailed => Status::OpenFailed,
            _ => Status::CapabilityFailed,
        }
    }
}

impl From<&StartupError> for Status {
    fn from(err: &StartupError) -> Self {
        match err {
            StartupError::DeviceAbsent { .. } => Status::DeviceNotFound,
            StartupError::Fatal(e) => e.into(),
        }
    }
}

impl From<&ReadError> for Status {
    fn from(err: &ReadError) -> Self {
        match err {
            ReadError::NotConnected => Status::NotConnected,
            ReadError::ReportFetch(_) | ReadError::Decode(_) => Status::ReadFailed,
        }
    }
}

impl From<&WriteError> for Status {
    fn from(err: &WriteError) -> Self {
        match err {
            WriteError::NotConnected => Status::NotConnected,
            WriteError::EncodingExhausted { .. } => Status::WriteExhausted,
        }
    }
}

impl From<&WaitError> for Status {
    fn from(_: &WaitError) -> Self {
        Status::DeviceNotFound
    }
}
