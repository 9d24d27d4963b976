// Copyright 2025 Rowdex Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core type definitions for Rowdex
//!
//! This module defines the fundamental types: DataType, RecordId,
//! RecordVersion, RowState, RowStateFilter, SortDirection

use std::fmt;

use smallvec::SmallVec;

use super::error::{Error, Result};

/// Identifier of one physical value-snapshot of a row inside a
/// [`RecordStore`](crate::storage::RecordStore).
///
/// Handles are small non-negative integers; [`NO_RECORD`] marks an
/// absent slot.
pub type RecordId = i32;

/// Sentinel record handle meaning "no record".
pub const NO_RECORD: RecordId = -1;

/// Column data types supported by the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DataType {
    /// NULL data type, used for unknown/unspecified types
    #[default]
    Null = 0,

    /// 64-bit signed integer
    Integer = 1,

    /// 64-bit floating point number
    Float = 2,

    /// UTF-8 text string
    Text = 3,

    /// Boolean true/false
    Boolean = 4,

    /// Timestamp with timezone (stored as UTC)
    Timestamp = 5,
}

impl DataType {
    /// Returns true if this type is numeric (INTEGER or FLOAT)
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "NULL"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// Which physical snapshot of a row a record handle refers to
///
/// A row owns up to three slots. `Original` is the last accepted value
/// set, `Current` the committed one, `Proposed` an in-progress edit.
/// `Default` is a read-side convenience that resolves to `Proposed`
/// while an edit is open and to `Current` otherwise; it never names a
/// storable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordVersion {
    /// Last accepted value set
    Original,
    /// Currently committed value set
    Current,
    /// In-progress edit snapshot
    Proposed,
    /// Proposed if editing, otherwise current
    Default,
}

impl RecordVersion {
    /// Stable ordinal used as the final duplicate tiebreak when one row
    /// contributes more than one entry to the same index.
    pub(crate) fn ordinal(&self) -> u8 {
        match self {
            RecordVersion::Original => 0,
            RecordVersion::Current => 1,
            RecordVersion::Proposed => 2,
            RecordVersion::Default => 3,
        }
    }
}

impl fmt::Display for RecordVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordVersion::Original => write!(f, "original"),
            RecordVersion::Current => write!(f, "current"),
            RecordVersion::Proposed => write!(f, "proposed"),
            RecordVersion::Default => write!(f, "default"),
        }
    }
}

/// Lifecycle state of a row, derived from its (original, current) slots
///
/// The state is never stored; it is recomputed from which slots are
/// populated. The proposed slot is orthogonal and does not affect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowState {
    /// Not attached to any table (original == current == none)
    Detached,
    /// Accepted and unmodified (original == current)
    Unchanged,
    /// Inserted but not yet accepted (no original)
    Added,
    /// Deleted but not yet accepted (no current)
    Deleted,
    /// Accepted with uncommitted changes (original != current, both set)
    Modified,
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowState::Detached => write!(f, "detached"),
            RowState::Unchanged => write!(f, "unchanged"),
            RowState::Added => write!(f, "added"),
            RowState::Deleted => write!(f, "deleted"),
            RowState::Modified => write!(f, "modified"),
        }
    }
}

/// Bitmask selecting which row states an index covers, and through
/// which version slot
///
/// A `Modified` row governed by a mask containing both
/// [`MODIFIED_CURRENT`](RowStateFilter::MODIFIED_CURRENT) and
/// [`MODIFIED_ORIGINAL`](RowStateFilter::MODIFIED_ORIGINAL) contributes
/// two entries to the same index, one per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowStateFilter(u8);

impl RowStateFilter {
    /// Matches nothing (invalid for index construction)
    pub const NONE: RowStateFilter = RowStateFilter(0);
    /// Unchanged rows, through their current slot
    pub const UNCHANGED: RowStateFilter = RowStateFilter(0b0_0001);
    /// Added rows, through their current slot
    pub const ADDED: RowStateFilter = RowStateFilter(0b0_0010);
    /// Deleted rows, through their original slot
    pub const DELETED: RowStateFilter = RowStateFilter(0b0_0100);
    /// Modified rows, through their current slot
    pub const MODIFIED_CURRENT: RowStateFilter = RowStateFilter(0b0_1000);
    /// Modified rows, through their original slot
    pub const MODIFIED_ORIGINAL: RowStateFilter = RowStateFilter(0b1_0000);

    /// The live face of the table: unchanged, added and modified rows
    /// as they currently read
    pub const CURRENT_ROWS: RowStateFilter = RowStateFilter(0b0_1011);
    /// The last accepted face: unchanged, deleted and modified rows as
    /// they last read
    pub const ORIGINAL_ROWS: RowStateFilter = RowStateFilter(0b1_0101);
    /// Every valid bit
    pub const ALL: RowStateFilter = RowStateFilter(0b1_1111);

    /// Raw bit pattern
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`
    pub fn contains(&self, other: RowStateFilter) -> bool {
        self.0 & other.0 == other.0
    }

    /// Validates the mask for index construction
    ///
    /// An empty mask or one carrying bits outside [`ALL`](Self::ALL)
    /// fails fast here rather than producing an index that silently
    /// covers nothing.
    pub fn validate(&self) -> Result<()> {
        if self.0 == 0 || self.0 & !Self::ALL.0 != 0 {
            return Err(Error::InvalidRowStateFilter(self.0));
        }
        Ok(())
    }

    /// The version slots a row in `state` contributes under this mask.
    ///
    /// Original is listed before Current, matching the version-ordinal
    /// tiebreak so that a two-entry row iterates deterministically.
    pub(crate) fn versions_for(&self, state: RowState) -> SmallVec<[RecordVersion; 2]> {
        let mut out = SmallVec::new();
        match state {
            RowState::Detached => {}
            RowState::Unchanged => {
                if self.contains(Self::UNCHANGED) {
                    out.push(RecordVersion::Current);
                }
            }
            RowState::Added => {
                if self.contains(Self::ADDED) {
                    out.push(RecordVersion::Current);
                }
            }
            RowState::Deleted => {
                if self.contains(Self::DELETED) {
                    out.push(RecordVersion::Original);
                }
            }
            RowState::Modified => {
                if self.contains(Self::MODIFIED_ORIGINAL) {
                    out.push(RecordVersion::Original);
                }
                if self.contains(Self::MODIFIED_CURRENT) {
                    out.push(RecordVersion::Current);
                }
            }
        }
        out
    }
}

impl std::ops::BitOr for RowStateFilter {
    type Output = RowStateFilter;

    fn bitor(self, rhs: RowStateFilter) -> RowStateFilter {
        RowStateFilter(self.0 | rhs.0)
    }
}

impl fmt::Display for RowStateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#07b}", self.0)
    }
}

/// Direction of one sort field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Smallest key first
    #[default]
    Ascending,
    /// Largest key first
    Descending,
}

impl SortDirection {
    /// Returns true for descending order
    pub fn is_descending(&self) -> bool {
        matches!(self, SortDirection::Descending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_display() {
        assert_eq!(DataType::Null.to_string(), "NULL");
        assert_eq!(DataType::Integer.to_string(), "INTEGER");
        assert_eq!(DataType::Float.to_string(), "FLOAT");
        assert_eq!(DataType::Text.to_string(), "TEXT");
        assert_eq!(DataType::Boolean.to_string(), "BOOLEAN");
        assert_eq!(DataType::Timestamp.to_string(), "TIMESTAMP");
    }

    #[test]
    fn test_datatype_is_numeric() {
        assert!(DataType::Integer.is_numeric());
        assert!(DataType::Float.is_numeric());
        assert!(!DataType::Text.is_numeric());
        assert!(!DataType::Null.is_numeric());
    }

    #[test]
    fn test_filter_validate() {
        assert!(RowStateFilter::CURRENT_ROWS.validate().is_ok());
        assert!(RowStateFilter::ORIGINAL_ROWS.validate().is_ok());
        assert!(RowStateFilter::ALL.validate().is_ok());
        assert!(RowStateFilter::NONE.validate().is_err());
        assert!(RowStateFilter(0b0100_0000).validate().is_err());
    }

    #[test]
    fn test_filter_contains() {
        assert!(RowStateFilter::CURRENT_ROWS.contains(RowStateFilter::ADDED));
        assert!(RowStateFilter::CURRENT_ROWS.contains(RowStateFilter::MODIFIED_CURRENT));
        assert!(!RowStateFilter::CURRENT_ROWS.contains(RowStateFilter::DELETED));
        assert!(RowStateFilter::ALL.contains(RowStateFilter::CURRENT_ROWS));
    }

    #[test]
    fn test_filter_versions_for() {
        let current = RowStateFilter::CURRENT_ROWS;
        assert_eq!(
            current.versions_for(RowState::Unchanged).as_slice(),
            &[RecordVersion::Current]
        );
        assert_eq!(
            current.versions_for(RowState::Added).as_slice(),
            &[RecordVersion::Current]
        );
        assert!(current.versions_for(RowState::Deleted).is_empty());
        assert!(current.versions_for(RowState::Detached).is_empty());

        let original = RowStateFilter::ORIGINAL_ROWS;
        assert_eq!(
            original.versions_for(RowState::Deleted).as_slice(),
            &[RecordVersion::Original]
        );
        assert_eq!(
            original.versions_for(RowState::Modified).as_slice(),
            &[RecordVersion::Original]
        );

        // A mixed mask hands out both slots of a modified row, original first.
        let both = RowStateFilter::MODIFIED_ORIGINAL | RowStateFilter::MODIFIED_CURRENT;
        assert_eq!(
            both.versions_for(RowState::Modified).as_slice(),
            &[RecordVersion::Original, RecordVersion::Current]
        );
    }

    #[test]
    fn test_version_ordinal_order() {
        assert!(RecordVersion::Original.ordinal() < RecordVersion::Current.ordinal());
        assert!(RecordVersion::Current.ordinal() < RecordVersion::Proposed.ordinal());
    }

    #[test]
    fn test_sort_direction() {
        assert!(!SortDirection::Ascending.is_descending());
        assert!(SortDirection::Descending.is_descending());
        assert_eq!(SortDirection::default(), SortDirection::Ascending);
    }
}
