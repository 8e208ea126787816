// SPDX-License-Identifier: GPL-3.0-only
//! Brightness read/write against a negotiated device

use super::capabilities::DeviceCapabilities;
use super::encoding::{Encoding, ReportKind, UsageTarget, WRITE_ENCODINGS};
use crate::error::{ReadError, WriteError};
use crate::hid::{PreparsedData, ReportType};
use crate::protocols::HidHandle;

/// Brightness in device-native units
pub type BrightnessValue = u32;

/// Minimum size of the input report buffer
pub const INPUT_BUFFER_LEN: usize = 100;

/// Read/write access to the brightness usage of an open session
pub struct BrightnessChannel<'a> {
    handle: &'a mut dyn HidHandle,
    preparsed: &'a PreparsedData,
    input_caps: DeviceCapabilities,
    feature_caps: DeviceCapabilities,
}

impl<'a> BrightnessChannel<'a> {
    pub fn new(
        handle: &'a mut dyn HidHandle,
        preparsed: &'a PreparsedData,
        input_caps: DeviceCapabilities,
        feature_caps: DeviceCapabilities,
    ) -> Self {
        Self {
            handle,
            preparsed,
            input_caps,
            feature_caps,
        }
    }

    /// Read the current brightness from the input report
    pub fn get(&mut self) -> Result<BrightnessValue, ReadError> {
        let len = INPUT_BUFFER_LEN.max(usize::from(self.input_caps.report_length));
        let mut buf = vec![0u8; len];
        buf[0] = self.input_caps.report_id;

        self.handle
            .get_input_report(&mut buf)
            .map_err(ReadError::ReportFetch)?;

        let value = self.preparsed.get_usage_value(
            ReportType::Input,
            self.input_caps.usage_page,
            0,
            self.input_caps.usage,
            &buf,
        )?;
        tracing::debug!("Read brightness {}", value);
        Ok(value)
    }

    /// Write a brightness value, trying each encoding until one is accepted
    ///
    /// Returns the encoding the device accepted. Acceptance only means the
    /// transport delivered the report; the value is not read back.
    pub fn set(&mut self, value: BrightnessValue) -> Result<&'static Encoding, WriteError> {
        let report_id = self.feature_caps.report_id;
        let mut buf = vec![0u8; usize::from(self.feature_caps.report_length) + 1];
        let target = UsageTarget {
            preparsed: self.preparsed,
            caps: &self.feature_caps,
        };

        for encoding in &WRITE_ENCODINGS {
            buf.fill(0);
            buf[0] = report_id;

            if let Err(e) = encoding.encode(value, target, &mut buf) {
                tracing::debug!("Skipping {}: {}", encoding.name, e);
                continue;
            }

            let sent = match encoding.kind {
                ReportKind::Feature => self.handle.send_feature_report(&buf),
                ReportKind::Output => self.handle.send_output_report(&buf),
            };
            match sent {
                Ok(()) => {
                    tracing::debug!("Brightness {} accepted using {}", value, encoding.name);
                    return Ok(encoding);
                }
                Err(e) => tracing::debug!("Device rejected {}: {}", encoding.name, e),
            }
        }

        Err(WriteError::EncodingExhausted {
            value,
            attempts: WRITE_ENCODINGS.len(),
        })
    }
}
