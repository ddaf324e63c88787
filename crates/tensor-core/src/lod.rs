// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Level-of-detail (sequence length) metadata.
//!
//! A LoD is a stack of offset tables. Level 0 partitions the batch into
//! top-level sequences; every deeper level partitions the entries of the
//! level above; the last level indexes rows of the tensor's outer dimension.
//!
//! ```text
//! levels = [[0, 2, 3], [0, 1, 4, 6]]
//!   sequence 0 → sub-sequences 0..2 → rows 0..4
//!   sequence 1 → sub-sequence  2..3 → rows 4..6
//! ```

use crate::TensorError;

/// Sequence offsets attached to a batched tensor. Empty means "no
/// sequences": every row is its own sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Lod {
    levels: Vec<Vec<usize>>,
}

impl Lod {
    /// A LoD with no levels.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a LoD from offset tables, checking that every level starts at
    /// zero, is non-decreasing and indexes the level below it.
    pub fn from_levels(levels: Vec<Vec<usize>>) -> Result<Self, TensorError> {
        for (i, level) in levels.iter().enumerate() {
            if level.len() < 2 || level[0] != 0 {
                return Err(TensorError::InvalidLod(format!(
                    "level {i} must start at 0 and contain at least one sequence"
                )));
            }
            if level.windows(2).any(|w| w[0] > w[1]) {
                return Err(TensorError::InvalidLod(format!(
                    "level {i} offsets are not non-decreasing"
                )));
            }
            if let Some(next) = levels.get(i + 1) {
                let end = *level.last().unwrap_or(&0);
                if end != next.len() - 1 {
                    return Err(TensorError::InvalidLod(format!(
                        "level {i} ends at {end} but level {} has {} entries",
                        i + 1,
                        next.len() - 1
                    )));
                }
            }
        }
        Ok(Self { levels })
    }

    /// Returns `true` when no sequence information is attached.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Returns the raw offset tables.
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    /// Number of top-level sequences, or `None` when the LoD is empty.
    pub fn num_sequences(&self) -> Option<usize> {
        self.levels.first().map(|l| l.len() - 1)
    }

    /// Number of rows the innermost level refers to.
    pub fn num_rows(&self) -> Option<usize> {
        self.levels.last().and_then(|l| l.last().copied())
    }

    /// Extracts top-level sequences `start..end`.
    ///
    /// Returns the rebased LoD together with the row range the slice covers.
    pub fn slice(&self, start: usize, end: usize) -> (Lod, usize, usize) {
        let mut lo = start;
        let mut hi = end;
        let mut levels = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            let base = level[lo];
            levels.push(level[lo..=hi].iter().map(|o| o - base).collect());
            lo = level[lo];
            hi = level[hi];
        }
        (Lod { levels }, lo, hi)
    }

    /// Appends `other` after `self`, shifting its offsets.
    pub fn append(&mut self, other: &Lod) -> Result<(), TensorError> {
        if self.levels.is_empty() {
            self.levels = other.levels.clone();
            return Ok(());
        }
        if self.levels.len() != other.levels.len() {
            return Err(TensorError::InvalidLod(format!(
                "cannot merge LoD with {} levels into LoD with {} levels",
                other.levels.len(),
                self.levels.len()
            )));
        }
        for (mine, theirs) in self.levels.iter_mut().zip(&other.levels) {
            let shift = *mine.last().unwrap_or(&0);
            mine.extend(theirs.iter().skip(1).map(|o| o + shift));
        }
        Ok(())
    }
}

impl From<Vec<Vec<usize>>> for Lod {
    /// Unchecked conversion; prefer [`Lod::from_levels`] for external input.
    fn from(levels: Vec<Vec<usize>>) -> Self {
        Self { levels }
    }
}
