// SPDX-License-Identifier: GPL-3.0-only
//! HID report descriptor item parser

use std::collections::HashMap;

use thiserror::Error;

use super::{Caps, PreparsedData, ReportType, ValueCaps};

const MAIN_INPUT: u8 = 0x8;
const MAIN_OUTPUT: u8 = 0x9;
const MAIN_COLLECTION: u8 = 0xA;
const MAIN_FEATURE: u8 = 0xB;
const MAIN_END_COLLECTION: u8 = 0xC;

const GLOBAL_USAGE_PAGE: u8 = 0x0;
const GLOBAL_LOGICAL_MIN: u8 = 0x1;
const GLOBAL_LOGICAL_MAX: u8 = 0x2;
const GLOBAL_REPORT_SIZE: u8 = 0x7;
const GLOBAL_REPORT_ID: u8 = 0x8;
const GLOBAL_REPORT_COUNT: u8 = 0x9;
const GLOBAL_PUSH: u8 = 0xA;
const GLOBAL_POP: u8 = 0xB;

const LOCAL_USAGE: u8 = 0x0;
const LOCAL_USAGE_MIN: u8 = 0x1;
const LOCAL_USAGE_MAX: u8 = 0x2;

const LONG_ITEM_PREFIX: u8 = 0xFE;

/// Largest report body whose byte length, plus the id byte, fits a u16
const MAX_REPORT_BITS: u32 = (u16::MAX as u32 - 1) * 8;

/// Value caps kept per report type
const MAX_VALUE_CAPS: usize = 1024;

/// Main item data flags
const FLAG_CONSTANT: u32 = 0x01;
const FLAG_VARIABLE: u32 = 0x02;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("report descriptor is empty")]
    Empty,

    #[error("item at offset {offset} runs past the end of the descriptor")]
    Truncated { offset: usize },

    #[error("end collection at offset {offset} without an open collection")]
    UnbalancedCollection { offset: usize },

    #[error("pop at offset {offset} without a matching push")]
    UnbalancedPop { offset: usize },

    #[error("descriptor declares no top-level collection")]
    NoCollection,

    #[error("main item at offset {offset} grows a report past the largest report size")]
    ReportTooLong { offset: usize },
}

#[derive(Debug, Clone, Copy, Default)]
struct Globals {
    usage_page: u16,
    logical_min: i32,
    logical_max: i32,
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

#[derive(Debug, Default)]
struct Locals {
    usages: Vec<u32>,
    usage_min: Option<u32>,
    usage_max: Option<u32>,
}

impl Locals {
    /// Usage assigned to the `index`-th field of a main item
    fn usage_at(&self, index: u32) -> Option<u32> {
        if !self.usages.is_empty() {
            let i = (index as usize).min(self.usages.len() - 1);
            return Some(self.usages[i]);
        }
        let min = self.usage_min?;
        let max = self.usage_max.unwrap_or(min).max(min);
        Some(min.saturating_add(index).min(max))
    }
}

#[derive(Default)]
struct Parser {
    globals: Globals,
    global_stack: Vec<Globals>,
    locals: Locals,
    collections: Vec<u16>,
    next_link_collection: u16,
    top_level: Option<(u16, u16)>,
    report_bits: HashMap<(ReportType, u8), u32>,
    input: Vec<ValueCaps>,
    output: Vec<ValueCaps>,
    feature: Vec<ValueCaps>,
}

pub(super) fn parse(bytes: &[u8]) -> Result<PreparsedData, DescriptorError> {
    if bytes.is_empty() {
        return Err(DescriptorError::Empty);
    }

    let mut parser = Parser::default();
    let mut pos = 0;

    while pos < bytes.len() {
        let prefix = bytes[pos];

        if prefix == LONG_ITEM_PREFIX {
            let size = *bytes
                .get(pos + 1)
                .ok_or(DescriptorError::Truncated { offset: pos })? as usize;
            let end = pos + 3 + size;
            if end > bytes.len() {
                return Err(DescriptorError::Truncated { offset: pos });
            }
            pos = end;
            continue;
        }

        let size = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let data = bytes
            .get(pos + 1..pos + 1 + size)
            .ok_or(DescriptorError::Truncated { offset: pos })?;
        let tag = prefix >> 4;

        match (prefix >> 2) & 0x03 {
            0 => parser.main_item(tag, unsigned(data), pos)?,
            1 => parser.global_item(tag, data, pos)?,
            2 => parser.local_item(tag, data),
            _ => {}
        }

        pos += 1 + size;
    }

    parser.finish()
}

impl Parser {
    fn main_item(&mut self, tag: u8, value: u32, offset: usize) -> Result<(), DescriptorError> {
        match tag {
            MAIN_INPUT => self.add_fields(ReportType::Input, value, offset)?,
            MAIN_OUTPUT => self.add_fields(ReportType::Output, value, offset)?,
            MAIN_FEATURE => self.add_fields(ReportType::Feature, value, offset)?,
            MAIN_COLLECTION => {
                if self.collections.is_empty() {
                    if self.top_level.is_none() {
                        let usage = self.locals.usage_at(0).unwrap_or(0);
                        self.top_level = Some(self.split_usage(usage));
                    }
                    self.collections.push(0);
                } else {
                    self.next_link_collection += 1;
                    self.collections.push(self.next_link_collection);
                }
            }
            MAIN_END_COLLECTION => {
                if self.collections.pop().is_none() {
                    return Err(DescriptorError::UnbalancedCollection { offset });
                }
            }
            _ => {}
        }
        self.locals = Locals::default();
        Ok(())
    }

    fn global_item(&mut self, tag: u8, data: &[u8], offset: usize) -> Result<(), DescriptorError> {
        let g = &mut self.globals;
        match tag {
            GLOBAL_USAGE_PAGE => g.usage_page = unsigned(data) as u16,
            GLOBAL_LOGICAL_MIN => g.logical_min = signed(data),
            GLOBAL_LOGICAL_MAX => {
                // A non-negative minimum means the maximum was written unsigned.
                g.logical_max = if g.logical_min >= 0 {
                    unsigned(data) as i32
                } else {
                    signed(data)
                };
            }
            GLOBAL_REPORT_SIZE => g.report_size = unsigned(data),
            GLOBAL_REPORT_ID => g.report_id = unsigned(data) as u8,
            GLOBAL_REPORT_COUNT => g.report_count = unsigned(data),
            GLOBAL_PUSH => self.global_stack.push(*g),
            GLOBAL_POP => {
                *g = self
                    .global_stack
                    .pop()
                    .ok_or(DescriptorError::UnbalancedPop { offset })?;
            }
            _ => {}
        }
        Ok(())
    }

    fn local_item(&mut self, tag: u8, data: &[u8]) {
        let value = unsigned(data);
        // Four-byte usages carry their own usage page in the high word.
        let value = if data.len() == 4 {
            value
        } else {
            u32::from(self.globals.usage_page) << 16 | value
        };
        match tag {
            LOCAL_USAGE => self.locals.usages.push(value),
            LOCAL_USAGE_MIN => self.locals.usage_min = Some(value),
            LOCAL_USAGE_MAX => self.locals.usage_max = Some(value),
            _ => {}
        }
    }

    fn split_usage(&self, usage: u32) -> (u16, u16) {
        let page = (usage >> 16) as u16;
        let page = if page == 0 { self.globals.usage_page } else { page };
        (page, usage as u16)
    }

    fn add_fields(&mut self, report_type: ReportType, flags: u32, item_offset: usize) -> Result<(), DescriptorError> {
        let g = self.globals;
        let offset = *self.report_bits.entry((report_type, g.report_id)).or_insert(0);
        let end = g
            .report_size
            .checked_mul(g.report_count)
            .and_then(|total| offset.checked_add(total))
            .filter(|&end| end <= MAX_REPORT_BITS)
            .ok_or(DescriptorError::ReportTooLong {
                offset: item_offset,
            })?;

        let is_value = flags & FLAG_CONSTANT == 0
            && flags & FLAG_VARIABLE != 0
            && (2..=32).contains(&g.report_size);

        if is_value {
            let link_collection = self.collections.last().copied().unwrap_or(0);
            for i in 0..g.report_count {
                if self.value_caps_len(report_type) >= MAX_VALUE_CAPS {
                    break;
                }
                let Some(usage) = self.locals.usage_at(i) else {
                    continue;
                };
                let (usage_page, usage) = self.split_usage(usage);
                let caps = ValueCaps {
                    report_id: g.report_id,
                    usage_page,
                    usage,
                    link_collection,
                    bit_offset: offset + i * g.report_size,
                    bit_size: g.report_size as u16,
                    logical_min: g.logical_min,
                    logical_max: g.logical_max,
                };
                match report_type {
                    ReportType::Input => self.input.push(caps),
                    ReportType::Output => self.output.push(caps),
                    ReportType::Feature => self.feature.push(caps),
                }
            }
        }

        self.report_bits.insert((report_type, g.report_id), end);
        Ok(())
    }

    fn value_caps_len(&self, report_type: ReportType) -> usize {
        match report_type {
            ReportType::Input => self.input.len(),
            ReportType::Output => self.output.len(),
            ReportType::Feature => self.feature.len(),
        }
    }

    fn byte_length(&self, report_type: ReportType) -> u16 {
        // Every report is bounded by MAX_REPORT_BITS, so this fits.
        self.report_bits
            .iter()
            .filter(|((kind, _), _)| *kind == report_type)
            .map(|(_, bits)| (bits.div_ceil(8) + 1) as u16)
            .max()
            .unwrap_or(0)
    }

    fn finish(self) -> Result<PreparsedData, DescriptorError> {
        let (usage_page, usage) = self.top_level.ok_or(DescriptorError::NoCollection)?;
        let caps = Caps {
            usage_page,
            usage,
            input_report_byte_length: self.byte_length(ReportType::Input),
            output_report_byte_length: self.byte_length(ReportType::Output),
            feature_report_byte_length: self.byte_length(ReportType::Feature),
        };
        Ok(PreparsedData {
            caps,
            input: self.input,
            output: self.output,
            feature: self.feature,
        })
    }
}

fn unsigned(data: &[u8]) -> u32 {
    data.iter()
        .rev()
        .fold(0u32, |acc, &b| acc << 8 | u32::from(b))
}

fn signed(data: &[u8]) -> i32 {
    match data.len() {
        1 => i32::from(data[0] as i8),
        2 => i32::from(i16::from_le_bytes([data[0], data[1]])),
        4 => i32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    #[test]
    fn test_studio_display_geometry() {
        let data = parse(STUDIO_DISPLAY).unwrap();
        let caps = data.caps();
        assert_eq!(caps.usage_page, 0xFF00);
        assert_eq!(caps.usage, 0x01);
        assert_eq!(caps.input_report_byte_length, 4);
        assert_eq!(caps.feature_report_byte_length, 4);
        assert_eq!(caps.output_report_byte_length, 0);

        let feature = data.value_caps(ReportType::Feature);
        assert_eq!(feature.len(), 1);
        assert_eq!(feature[0].report_id, 2);
        assert_eq!(feature[0].usage_page, 0xFF00);
        assert_eq!(feature[0].usage, 0x01);
        assert_eq!(feature[0].bit_offset, 0);
        assert_eq!(feature[0].bit_size, 24);
        assert_eq!(feature[0].logical_max, 0x00FF_FFFF);
    }

    #[test]
    fn test_constant_padding_is_not_a_value() {
        let data = parse(INPUT_ONLY).unwrap();
        let input = data.value_caps(ReportType::Input);
        assert_eq!(input.len(), 1);
        assert_eq!(input[0].bit_offset, 8);
        assert_eq!(input[0].logical_max, 65535);
        assert!(data.value_caps(ReportType::Feature).is_empty());
        assert_eq!(data.caps().input_report_byte_length, 4);
    }

    #[test]
    fn test_one_bit_variables_are_buttons() {
        let data = parse(BUTTONS_ONLY).unwrap();
        assert!(data.value_caps(ReportType::Input).is_empty());
        assert_eq!(data.caps().input_report_byte_length, 2);
        assert_eq!(data.caps().usage_page, 0x09);
    }

    #[test]
    fn test_nested_collections_get_link_indices() {
        let descriptor = [
            0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, // application
            0x09, 0x02, 0xA1, 0x02, // logical
            0x09, 0x03, 0x75, 0x08, 0x95, 0x01, 0xB1, 0x02, //
            0xC0, 0xC0,
        ];
        let data = parse(&descriptor).unwrap();
        let feature = data.value_caps(ReportType::Feature);
        assert_eq!(feature[0].link_collection, 1);
        assert_eq!(feature[0].usage, 0x03);
        assert_eq!(data.caps().feature_report_byte_length, 2);
    }

    #[test]
    fn test_extended_usage_overrides_page() {
        let descriptor = [
            0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, //
            0x0B, 0x10, 0x00, 0x0C, 0x00, // usage 0x000C:0x0010
            0x75, 0x10, 0x95, 0x01, 0x81, 0x02, 0xC0,
        ];
        let data = parse(&descriptor).unwrap();
        let input = data.value_caps(ReportType::Input);
        assert_eq!(input[0].usage_page, 0x000C);
        assert_eq!(input[0].usage, 0x0010);
    }

    #[test]
    fn test_push_pop_restores_globals() {
        let descriptor = [
            0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, //
            0x75, 0x08, 0x95, 0x01, 0xA4, // push
            0x75, 0x10, 0xB4, // size 16, pop
            0x09, 0x01, 0xB1, 0x02, 0xC0,
        ];
        let data = parse(&descriptor).unwrap();
        assert_eq!(data.value_caps(ReportType::Feature)[0].bit_size, 8);
    }

    #[test]
    fn test_malformed_descriptors() {
        assert_eq!(parse(&[]), Err(DescriptorError::Empty));
        assert_eq!(
            parse(&[0x06, 0x00]),
            Err(DescriptorError::Truncated { offset: 0 })
        );
        assert_eq!(
            parse(&[0x09, 0x01, 0xC0]),
            Err(DescriptorError::UnbalancedCollection { offset: 2 })
        );
        assert_eq!(
            parse(&[0xB4]),
            Err(DescriptorError::UnbalancedPop { offset: 0 })
        );
        assert_eq!(
            parse(&[0x75, 0x08, 0x95, 0x01]),
            Err(DescriptorError::NoCollection)
        );
    }

    #[test]
    fn test_oversized_report_is_rejected() {
        // 20000 x 32-bit constant padding, then a 16-bit value
        let descriptor = [
            0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, //
            0x75, 0x20, 0x96, 0x20, 0x4E, 0x81, 0x01, //
            0x09, 0x10, 0x75, 0x10, 0x95, 0x01, 0x81, 0x02, //
            0xC0,
        ];
        assert_eq!(
            parse(&descriptor),
            Err(DescriptorError::ReportTooLong { offset: 12 })
        );
    }

    #[test]
    fn test_report_count_overflow_is_rejected() {
        let descriptor = [
            0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, //
            0x09, 0x01, 0x77, 0xFF, 0xFF, 0xFF, 0xFF, // size u32::MAX
            0x97, 0xFF, 0xFF, 0xFF, 0xFF, 0x81, 0x02, // count u32::MAX
            0xC0,
        ];
        assert_eq!(
            parse(&descriptor),
            Err(DescriptorError::ReportTooLong { offset: 19 })
        );
    }

    #[test]
    fn test_value_caps_are_capped() {
        // 30000 8-bit values: within the report limit but far past the caps limit
        let descriptor = [
            0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, //
            0x19, 0x01, 0x2A, 0xFF, 0x7F, // usages 1..=0x7FFF
            0x75, 0x08, 0x96, 0x30, 0x75, 0x81, 0x02, //
            0xC0,
        ];
        let data = parse(&descriptor).unwrap();
        assert_eq!(data.value_caps(ReportType::Input).len(), MAX_VALUE_CAPS);
        assert_eq!(data.caps().input_report_byte_length, 30001);
    }

    #[test]
    fn test_largest_report_is_accepted() {
        let descriptor = [
            0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, //
            0x75, 0x08, 0x96, 0xFE, 0xFF, 0x81, 0x01, // 65534 bytes of padding
            0xC0,
        ];
        let data = parse(&descriptor).unwrap();
        assert_eq!(data.caps().input_report_byte_length, u16::MAX);
    }

    #[test]
    fn test_signed_logical_range() {
        let descriptor = [
            0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, //
            0x15, 0x81, 0x25, 0x7F, // -127..127
            0x09, 0x01, 0x75, 0x08, 0x95, 0x01, 0x81, 0x02, 0xC0,
        ];
        let data = parse(&descriptor).unwrap();
        let input = data.value_caps(ReportType::Input);
        assert_eq!(input[0].logical_min, -127);
        assert_eq!(input[0].logical_max, 127);
    }
}
