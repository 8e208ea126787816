// SPDX-License-Identifier: GPL-3.0-only
//! Brightness write encodings
//!
//! Not every firmware accepts the value at the position its report
//! descriptor advertises, so a write walks [`WRITE_ENCODINGS`] in order and
//! stops at the first report the device accepts.

use thiserror::Error;

use super::capabilities::DeviceCapabilities;
use crate::hid::{PreparsedData, ReportType, UsageError};

/// Full scale of the single-byte encoding
pub const SCALED_MAX_INPUT: u32 = 60000;

/// Report type an encoded buffer is sent as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Feature,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Where and how the value lands in the report buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Placed by the report descriptor at the feature usage
    Structured,
    /// Raw integer of `width` bytes starting at `offset`; wider values are
    /// truncated to the low bytes
    Raw {
        offset: usize,
        width: usize,
        endian: Endian,
    },
    /// One byte at `offset`, scaled from `0..=max_input` to `0..=255`
    Scaled { offset: usize, max_input: u32 },
}

/// One entry of the write fallback table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub name: &'static str,
    pub layout: Layout,
    pub kind: ReportKind,
}

/// Write encodings in the order they are attempted
pub const WRITE_ENCODINGS: [Encoding; 7] = [
    Encoding {
        name: "structured usage value",
        layout: Layout::Structured,
        kind: ReportKind::Feature,
    },
    Encoding {
        name: "u32 little endian at byte 1",
        layout: Layout::Raw {
            offset: 1,
            width: 4,
            endian: Endian::Little,
        },
        kind: ReportKind::Feature,
    },
    Encoding {
        name: "u32 big endian at byte 1",
        layout: Layout::Raw {
            offset: 1,
            width: 4,
            endian: Endian::Big,
        },
        kind: ReportKind::Feature,
    },
    Encoding {
        name: "u32 little endian at byte 2",
        layout: Layout::Raw {
            offset: 2,
            width: 4,
            endian: Endian::Little,
        },
        kind: ReportKind::Feature,
    },
    Encoding {
        name: "u16 little endian at byte 1",
        layout: Layout::Raw {
            offset: 1,
            width: 2,
            endian: Endian::Little,
        },
        kind: ReportKind::Feature,
    },
    Encoding {
        name: "scaled byte at byte 1",
        layout: Layout::Scaled {
            offset: 1,
            max_input: SCALED_MAX_INPUT,
        },
        kind: ReportKind::Feature,
    },
    Encoding {
        name: "u32 little endian output report",
        layout: Layout::Raw {
            offset: 1,
            width: 4,
            endian: Endian::Little,
        },
        kind: ReportKind::Output,
    },
];

/// The usage a structured encoding writes to
#[derive(Debug, Clone, Copy)]
pub struct UsageTarget<'a> {
    pub preparsed: &'a PreparsedData,
    pub caps: &'a DeviceCapabilities,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{needed} byte report required, buffer holds {len}")]
    BufferTooShort { needed: usize, len: usize },

    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl Encoding {
    /// Write `value` into `buf`; byte 0 (the report id) is left untouched
    pub fn encode(&self, value: u32, target: UsageTarget<'_>, buf: &mut [u8]) -> Result<(), EncodeError> {
        match self.layout {
            Layout::Structured => {
                target.preparsed.set_usage_value(
                    ReportType::Feature,
                    target.caps.usage_page,
                    0,
                    target.caps.usage,
                    value,
                    buf,
                )?;
            }
            Layout::Raw {
                offset,
                width,
                endian,
            } => {
                let field = slot_mut(buf, offset, width)?;
                match endian {
                    Endian::Little => field.copy_from_slice(&value.to_le_bytes()[..width]),
                    Endian::Big => field.copy_from_slice(&value.to_be_bytes()[4 - width..]),
                }
            }
            Layout::Scaled { offset, max_input } => {
                let field = slot_mut(buf, offset, 1)?;
                field[0] = scale_down(value, max_input);
            }
        }
        Ok(())
    }

    /// Recover the value an accepted report carries
    ///
    /// Truncating layouts only recover the low bytes; the scaled byte maps
    /// back to the smallest input that encodes to it.
    pub fn decode(&self, target: UsageTarget<'_>, buf: &[u8]) -> Result<u32, EncodeError> {
        match self.layout {
            Layout::Structured => Ok(target.preparsed.get_usage_value(
                ReportType::Feature,
                target.caps.usage_page,
                0,
                target.caps.usage,
                buf,
            )?),
            Layout::Raw {
                offset,
                width,
                endian,
            } => {
                let field = slot(buf, offset, width)?;
                let mut bytes = [0u8; 4];
                Ok(match endian {
                    Endian::Little => {
                        bytes[..width].copy_from_slice(field);
                        u32::from_le_bytes(bytes)
                    }
                    Endian::Big => {
                        bytes[4 - width..].copy_from_slice(field);
                        u32::from_be_bytes(bytes)
                    }
                })
            }
            Layout::Scaled { offset, max_input } => {
                let byte = slot(buf, offset, 1)?[0];
                Ok(scale_up(byte, max_input))
            }
        }
    }
}

fn scale_down(value: u32, max_input: u32) -> u8 {
    let clamped = u64::from(value.min(max_input));
    (clamped * 255 / u64::from(max_input.max(1))) as u8
}

fn scale_up(byte: u8, max_input: u32) -> u32 {
    (u64::from(byte) * u64::from(max_input)).div_ceil(255) as u32
}

fn slot(buf: &[u8], offset: usize, width: usize) -> Result<&[u8], EncodeError> {
    let len = buf.len();
    buf.get(offset..offset + width)
        .ok_or(EncodeError::BufferTooShort {
            needed: offset + width,
            len,
        })
}

fn slot_mut(buf: &mut [u8], offset: usize, width: usize) -> Result<&mut [u8], EncodeError> {
    let len = buf.len();
    buf.get_mut(offset..offset + width)
        .ok_or(EncodeError::BufferTooShort {
            needed: offset + width,
            len,
        })
}
