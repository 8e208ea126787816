// SPDX-License-Identifier: GPL-3.0-only
//! Capability negotiation
//!
//! Vendors expose the brightness usage either as a feature or as an input
//! report value. Feature value caps are preferred; a device without any is
//! driven through its input report layout instead.

use crate::error::NegotiateError;
use crate::hid::{Caps, PreparsedData, ReportType, ValueCaps};
use crate::protocols::HidHandle;

/// Number of value caps inspected per report type
pub const VALUE_CAPS_CAPACITY: usize = 20;

/// Report geometry used to address the brightness usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub report_id: u8,
    pub usage_page: u16,
    pub usage: u16,
    /// Report length in bytes, including the report id byte
    pub report_length: u16,
}

impl DeviceCapabilities {
    fn from_value_caps(caps: &ValueCaps, report_length: u16) -> Self {
        Self {
            report_id: caps.report_id,
            usage_page: caps.usage_page,
            usage: caps.usage,
            report_length,
        }
    }
}

/// Result of a successful negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub preparsed: PreparsedData,
    pub input_caps: DeviceCapabilities,
    pub feature_caps: DeviceCapabilities,
}

/// Query an open device for the report layout of its brightness usage
pub fn negotiate(handle: &mut dyn HidHandle) -> Result<Negotiated, NegotiateError> {
    let descriptor = handle
        .report_descriptor()
        .map_err(NegotiateError::PreparsedData)?;
    let preparsed = PreparsedData::from_descriptor(&descriptor)?;

    let caps = preparsed.caps();
    tracing::info!(
        "Device capabilities: input report {} bytes, feature report {} bytes, usage page {:#06x}, usage {:#06x}",
        caps.input_report_byte_length,
        caps.feature_report_byte_length,
        caps.usage_page,
        caps.usage
    );

    let (input_caps, feature_caps) = select_capabilities(&preparsed)?;

    Ok(Negotiated {
        preparsed,
        input_caps,
        feature_caps,
    })
}

/// Pick input and feature capabilities from the parsed value caps tables
///
/// Exactly one path is taken: the feature table when it is non-empty,
/// otherwise the input table, which then backs both capabilities.
pub fn select_capabilities(
    preparsed: &PreparsedData,
) -> Result<(DeviceCapabilities, DeviceCapabilities), NegotiateError> {
    let caps = preparsed.caps();
    let feature = bounded(preparsed, ReportType::Feature);
    let input = bounded(preparsed, ReportType::Input);

    if let Some(first) = feature.first() {
        log_value_caps("feature", feature);
        let feature_caps = DeviceCapabilities::from_value_caps(first, caps.feature_report_byte_length);
        let input_caps = input_for_feature(input, &feature_caps, &caps);
        tracing::info!(
            "Using feature report id {} usage {:#06x}:{:#06x}",
            feature_caps.report_id,
            feature_caps.usage_page,
            feature_caps.usage
        );
        return Ok((input_caps, feature_caps));
    }

    tracing::info!("No feature value capabilities found, trying input report");

    let first = input.first().ok_or(NegotiateError::NoUsableReport)?;
    log_value_caps("input", input);
    let input_caps = DeviceCapabilities::from_value_caps(first, caps.input_report_byte_length);
    tracing::info!(
        "Using input report id {} usage {:#06x}:{:#06x} for both directions",
        input_caps.report_id,
        input_caps.usage_page,
        input_caps.usage
    );
    Ok((input_caps, input_caps))
}

fn bounded(preparsed: &PreparsedData, report_type: ReportType) -> &[ValueCaps] {
    let caps = preparsed.value_caps(report_type);
    &caps[..caps.len().min(VALUE_CAPS_CAPACITY)]
}

/// Input report geometry matching a feature-controlled usage
fn input_for_feature(
    input: &[ValueCaps],
    feature_caps: &DeviceCapabilities,
    caps: &Caps,
) -> DeviceCapabilities {
    let report_length = caps.input_report_byte_length;
    input
        .iter()
        .find(|c| c.usage_page == feature_caps.usage_page && c.usage == feature_caps.usage)
        .or_else(|| input.first())
        .map(|c| DeviceCapabilities::from_value_caps(c, report_length))
        .unwrap_or(DeviceCapabilities {
            report_length,
            ..*feature_caps
        })
}

fn log_value_caps(kind: &str, caps: &[ValueCaps]) {
    tracing::debug!("Found {} {} value capabilities", caps.len(), kind);
    for (i, c) in caps.iter().enumerate() {
        tracing::debug!(
            "  [{}] report id {}, usage page {:#06x}, usage {:#06x}, logical {}..={}",
            i,
            c.report_id,
            c.usage_page,
            c.usage,
            c.logical_min,
            c.logical_max
        );
    }
}
