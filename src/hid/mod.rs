// SPDX-License-Identifier: GPL-3.0-only
//! HID report geometry and usage value access
//!
//! [`PreparsedData`] plays the role of the operating system's preparsed data
//! blob: a device's report descriptor is parsed once per session into
//! top-level capabilities and per-report-type value capability tables, which
//! are then used to read and write usage values inside raw report buffers.
//!
//! Report buffers follow the Windows HID parser convention:
//! - byte 0 is always the report id (0 when the device has no report ids)
//! - report byte lengths include that leading byte
//! - a value field's bit offset counts from byte 1

mod descriptor;

pub use descriptor::DescriptorError;

use thiserror::Error;

/// Kind of HID report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportType {
    Input,
    Output,
    Feature,
}

/// Top-level collection capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caps {
    pub usage_page: u16,
    pub usage: u16,
    pub input_report_byte_length: u16,
    pub output_report_byte_length: u16,
    pub feature_report_byte_length: u16,
}

/// One value field inside a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueCaps {
    pub report_id: u8,
    pub usage_page: u16,
    pub usage: u16,
    pub link_collection: u16,
    /// Offset in bits from the first byte after the report id
    pub bit_offset: u32,
    pub bit_size: u16,
    pub logical_min: i32,
    pub logical_max: i32,
}

/// Failure to locate, decode or encode a usage value
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    #[error("usage {usage_page:#06x}:{usage:#06x} is not part of any {report_type:?} report")]
    UsageNotFound {
        report_type: ReportType,
        usage_page: u16,
        usage: u16,
    },

    #[error("report id {report_id} does not carry usage {usage_page:#06x}:{usage:#06x}")]
    IncompatibleReportId {
        report_id: u8,
        usage_page: u16,
        usage: u16,
    },

    #[error("{report_type:?} report buffer holds {len} bytes, descriptor requires {expected}")]
    InvalidReportLength {
        report_type: ReportType,
        len: usize,
        expected: usize,
    },

    #[error("value {value} does not fit a {bits}-bit field")]
    ValueOutOfRange { value: u32, bits: u16 },
}

/// Parsed report descriptor of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparsedData {
    caps: Caps,
    input: Vec<ValueCaps>,
    output: Vec<ValueCaps>,
    feature: Vec<ValueCaps>,
}

impl PreparsedData {
    /// Parse a raw HID report descriptor
    pub fn from_descriptor(descriptor: &[u8]) -> Result<Self, DescriptorError> {
        descriptor::parse(descriptor)
    }

    pub fn caps(&self) -> Caps {
        self.caps
    }

    /// Value capabilities of one report type, in descriptor order
    pub fn value_caps(&self, report_type: ReportType) -> &[ValueCaps] {
        match report_type {
            ReportType::Input => &self.input,
            ReportType::Output => &self.output,
            ReportType::Feature => &self.feature,
        }
    }

    pub fn report_byte_length(&self, report_type: ReportType) -> u16 {
        match report_type {
            ReportType::Input => self.caps.input_report_byte_length,
            ReportType::Output => self.caps.output_report_byte_length,
            ReportType::Feature => self.caps.feature_report_byte_length,
        }
    }

    /// Extract the raw value of a usage from a report buffer
    ///
    /// A `link_collection` of 0 matches the usage in any collection.
    pub fn get_usage_value(
        &self,
        report_type: ReportType,
        usage_page: u16,
        link_collection: u16,
        usage: u16,
        report: &[u8],
    ) -> Result<u32, UsageError> {
        let field = self.locate(report_type, usage_page, link_collection, usage, report)?;
        Ok(read_bits(report, 8 + field.bit_offset, field.bit_size))
    }

    /// Store a raw usage value into a report buffer, leaving other bits untouched
    pub fn set_usage_value(
        &self,
        report_type: ReportType,
        usage_page: u16,
        link_collection: u16,
        usage: u16,
        value: u32,
        report: &mut [u8],
    ) -> Result<(), UsageError> {
        let field = *self.locate(report_type, usage_page, link_collection, usage, report)?;
        if field.bit_size < 32 && value >> field.bit_size != 0 {
            return Err(UsageError::ValueOutOfRange {
                value,
                bits: field.bit_size,
            });
        }
        write_bits(report, 8 + field.bit_offset, field.bit_size, value);
        Ok(())
    }

    fn locate(
        &self,
        report_type: ReportType,
        usage_page: u16,
        link_collection: u16,
        usage: u16,
        report: &[u8],
    ) -> Result<&ValueCaps, UsageError> {
        let expected = self.report_byte_length(report_type) as usize;
        if report.is_empty() || report.len() < expected {
            return Err(UsageError::InvalidReportLength {
                report_type,
                len: report.len(),
                expected,
            });
        }

        let mut candidates = self.value_caps(report_type).iter().filter(|c| {
            c.usage_page == usage_page
                && c.usage == usage
                && (link_collection == 0 || c.link_collection == link_collection)
        });

        let Some(first) = candidates.next() else {
            return Err(UsageError::UsageNotFound {
                report_type,
                usage_page,
                usage,
            });
        };

        let report_id = report[0];
        std::iter::once(first)
            .chain(candidates)
            .find(|c| c.report_id == report_id)
            .ok_or(UsageError::IncompatibleReportId {
                report_id,
                usage_page,
                usage,
            })
    }
}

fn read_bits(buf: &[u8], start: u32, size: u16) -> u32 {
    let mut value = 0u32;
    for i in 0..u32::from(size) {
        let bit = start + i;
        if buf[(bit / 8) as usize] >> (bit % 8) & 1 == 1 {
            value |= 1 << i;
        }
    }
    value
}

fn write_bits(buf: &mut [u8], start: u32, size: u16, value: u32) {
    for i in 0..u32::from(size) {
        let bit = start + i;
        let byte = &mut buf[(bit / 8) as usize];
        let mask = 1u8 << (bit % 8);
        if value >> i & 1 == 1 {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_value_round_trips_through_feature_report() {
        let data = PreparsedData::from_descriptor(STUDIO_DISPLAY).unwrap();
        let mut report = vec![0u8; 4];
        report[0] = 2;

        data.set_usage_value(ReportType::Feature, 0xFF00, 0, 0x01, 35000, &mut report)
            .unwrap();
        assert_eq!(report, [2, 0xB8, 0x88, 0x00]);

        let value = data
            .get_usage_value(ReportType::Feature, 0xFF00, 0, 0x01, &report)
            .unwrap();
        assert_eq!(value, 35000);
    }

    #[test]
    fn test_longer_buffer_is_accepted() {
        let data = PreparsedData::from_descriptor(STUDIO_DISPLAY).unwrap();
        let mut report = vec![0u8; 100];
        report[0] = 2;
        report[1] = 0x60;
        report[2] = 0xEA;
        let value = data
            .get_usage_value(ReportType::Input, 0xFF00, 0, 0x01, &report)
            .unwrap();
        assert_eq!(value, 60000);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let data = PreparsedData::from_descriptor(STUDIO_DISPLAY).unwrap();
        let report = [2u8, 0];
        assert_eq!(
            data.get_usage_value(ReportType::Input, 0xFF00, 0, 0x01, &report),
            Err(UsageError::InvalidReportLength {
                report_type: ReportType::Input,
                len: 2,
                expected: 4,
            })
        );
    }

    #[test]
    fn test_wrong_report_id_is_rejected() {
        let data = PreparsedData::from_descriptor(STUDIO_DISPLAY).unwrap();
        let report = [3u8, 0, 0, 0];
        assert!(matches!(
            data.get_usage_value(ReportType::Input, 0xFF00, 0, 0x01, &report),
            Err(UsageError::IncompatibleReportId { report_id: 3, .. })
        ));
    }

    #[test]
    fn test_unknown_usage_is_rejected() {
        let data = PreparsedData::from_descriptor(STUDIO_DISPLAY).unwrap();
        let report = [2u8, 0, 0, 0];
        assert!(matches!(
            data.get_usage_value(ReportType::Input, 0xFF00, 0, 0x02, &report),
            Err(UsageError::UsageNotFound { .. })
        ));
    }

    #[test]
    fn test_value_wider_than_field_is_rejected() {
        let data = PreparsedData::from_descriptor(INPUT_ONLY).unwrap();
        let mut report = [5u8, 0, 0, 0];
        assert_eq!(
            data.set_usage_value(ReportType::Input, 0xFF00, 0, 0x10, 70000, &mut report),
            Err(UsageError::ValueOutOfRange {
                value: 70000,
                bits: 16
            })
        );
    }

    #[test]
    fn test_padding_shifts_value_offset() {
        let data = PreparsedData::from_descriptor(INPUT_ONLY).unwrap();
        let report = [5u8, 0xAA, 0x34, 0x12];
        let value = data
            .get_usage_value(ReportType::Input, 0xFF00, 0, 0x10, &report)
            .unwrap();
        assert_eq!(value, 0x1234);
    }

    #[test]
    fn test_set_preserves_neighbouring_bits() {
        let data = PreparsedData::from_descriptor(INPUT_ONLY).unwrap();
        let mut report = [5u8, 0xAA, 0xFF, 0xFF];
        data.set_usage_value(ReportType::Input, 0xFF00, 0, 0x10, 1, &mut report)
            .unwrap();
        assert_eq!(report, [5, 0xAA, 0x01, 0x00]);
    }
}
