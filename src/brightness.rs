// SPDX-License-Identifier: GPL-3.0-only
//! Brightness level ladder
//!
//! The device takes raw values; users step through a fixed ladder of
//! levels instead. This module maps between the two.

use std::fmt;

/// Raw brightness of each level, dimmest first
pub const DEFAULT_LEVELS: [u32; 15] = [
    400, 2400, 4400, 7200, 10000, 15000, 20000, 25000, 30000, 35000, 40000, 45000, 50000, 55000,
    60000,
];

/// Level used when nothing better is known (30000)
pub const DEFAULT_LEVEL: usize = 8;

/// A ladder must be non-empty and strictly ascending
pub fn is_valid_ladder(levels: &[u32]) -> bool {
    !levels.is_empty() && levels.windows(2).all(|w| w[0] < w[1])
}

/// Discrete brightness levels over raw device values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Levels {
    steps: Vec<u32>,
}

impl Default for Levels {
    fn default() -> Self {
        Self {
            steps: DEFAULT_LEVELS.to_vec(),
        }
    }
}

impl Levels {
    /// Build a ladder, falling back to the default one if `steps` is invalid
    pub fn new(steps: &[u32]) -> Self {
        if is_valid_ladder(steps) {
            Self {
                steps: steps.to_vec(),
            }
        } else {
            Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn max_index(&self) -> usize {
        self.steps.len() - 1
    }

    /// Default level, clamped to the ladder
    pub fn default_index(&self) -> usize {
        DEFAULT_LEVEL.min(self.max_index())
    }

    /// Raw value of a level, clamped to the ladder
    pub fn value(&self, index: usize) -> u32 {
        self.steps[index.min(self.max_index())]
    }

    /// Highest level whose value does not exceed `raw`; 0 below the first
    pub fn level_for(&self, raw: u32) -> usize {
        self.steps
            .iter()
            .rposition(|&step| step <= raw)
            .unwrap_or(0)
    }

    pub fn step_up(&self, index: usize) -> usize {
        (index + 1).min(self.max_index())
    }

    pub fn step_down(&self, index: usize) -> usize {
        index.saturating_sub(1).min(self.max_index())
    }

    pub fn percentage(&self, index: usize) -> u32 {
        match self.max_index() {
            0 => 100,
            max => (index.min(max) * 100 / max) as u32,
        }
    }

    pub fn label(&self, index: usize) -> LevelLabel {
        let index = index.min(self.max_index());
        LevelLabel {
            level: index + 1,
            count: self.len(),
            percentage: self.percentage(index),
        }
    }
}

/// Human readable level, e.g. `level 9/15 (57%)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLabel {
    pub level: usize,
    pub count: usize,
    pub percentage: u32,
}

impl fmt::Display for LevelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level {}/{} ({}%)",
            self.level, self.count, self.percentage
        )
    }
}
