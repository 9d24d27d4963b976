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

//! Multi-version row: three record slots and a derived state
//!
//! A row never stores its lifecycle state; [`DataRow::state`] derives it
//! from which slots are populated. Slots are `Cell`s because index
//! comparators read through them at compare time and delete-by-value
//! briefly writes a stale handle back (see [`DataRow::backdate`]) so a
//! search can see the pre-mutation shape of the row.

use std::cell::Cell;
use std::fmt;

use crate::core::{Error, RecordId, RecordVersion, Result, RowState, NO_RECORD};

/// A logical row with up to three physical record slots
pub struct DataRow {
    id: u64,
    original: Cell<RecordId>,
    current: Cell<RecordId>,
    proposed: Cell<RecordId>,
}

impl DataRow {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            original: Cell::new(NO_RECORD),
            current: Cell::new(NO_RECORD),
            proposed: Cell::new(NO_RECORD),
        }
    }

    /// Stable identity for the row's lifetime; assigned in insertion
    /// order, which makes it the natural duplicate tiebreak.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Lifecycle state derived from the (original, current) pair
    pub fn state(&self) -> RowState {
        let original = self.original.get();
        let current = self.current.get();
        match (original != NO_RECORD, current != NO_RECORD) {
            (false, false) => RowState::Detached,
            (false, true) => RowState::Added,
            (true, false) => RowState::Deleted,
            (true, true) => {
                if original == current {
                    RowState::Unchanged
                } else {
                    RowState::Modified
                }
            }
        }
    }

    /// Last accepted record, or [`NO_RECORD`]
    pub fn original_record(&self) -> RecordId {
        self.original.get()
    }

    /// Committed record, or [`NO_RECORD`]
    pub fn current_record(&self) -> RecordId {
        self.current.get()
    }

    /// In-progress edit record, or [`NO_RECORD`]
    pub fn proposed_record(&self) -> RecordId {
        self.proposed.get()
    }

    /// Returns true while an edit is open
    pub fn has_proposed(&self) -> bool {
        self.proposed.get() != NO_RECORD
    }

    /// Resolve a version to its record handle, failing when absent
    ///
    /// `Default` resolves to proposed while an edit is open, otherwise
    /// to current.
    pub fn record_for_version(&self, version: RecordVersion) -> Result<RecordId> {
        let record = match version {
            RecordVersion::Original => self.original.get(),
            RecordVersion::Current => self.current.get(),
            RecordVersion::Proposed => self.proposed.get(),
            RecordVersion::Default => {
                let p = self.proposed.get();
                if p != NO_RECORD {
                    p
                } else {
                    self.current.get()
                }
            }
        };
        if record == NO_RECORD {
            return Err(Error::VersionNotAvailable { version });
        }
        Ok(record)
    }

    /// Raw slot read; unlike [`record_for_version`](Self::record_for_version)
    /// an absent slot is just [`NO_RECORD`]. `Default` is not a slot.
    pub(crate) fn slot(&self, version: RecordVersion) -> RecordId {
        match version {
            RecordVersion::Original => self.original.get(),
            RecordVersion::Current => self.current.get(),
            RecordVersion::Proposed => self.proposed.get(),
            RecordVersion::Default => {
                debug_assert!(false, "default is not a storable slot");
                NO_RECORD
            }
        }
    }

    pub(crate) fn set_slot(&self, version: RecordVersion, record: RecordId) {
        match version {
            RecordVersion::Original => self.original.set(record),
            RecordVersion::Current => self.current.set(record),
            RecordVersion::Proposed => self.proposed.set(record),
            RecordVersion::Default => debug_assert!(false, "default is not a storable slot"),
        }
    }

    /// Temporarily substitute a slot value for the duration of a search
    ///
    /// The returned guard restores the slot when dropped, on every exit
    /// path including early `?` returns. Used when the row mutation has
    /// already happened by the time an index learns about it: the
    /// comparator must see the pre-mutation shape.
    pub(crate) fn backdate(&self, version: RecordVersion, record: RecordId) -> SlotBackdate<'_> {
        let saved = self.slot(version);
        self.set_slot(version, record);
        SlotBackdate {
            row: self,
            version,
            saved,
        }
    }
}

impl fmt::Debug for DataRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRow")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("original", &self.original.get())
            .field("current", &self.current.get())
            .field("proposed", &self.proposed.get())
            .finish()
    }
}

/// Scoped slot substitution; restores the saved handle on drop
pub(crate) struct SlotBackdate<'a> {
    row: &'a DataRow,
    version: RecordVersion,
    saved: RecordId,
}

impl Drop for SlotBackdate<'_> {
    fn drop(&mut self) {
        self.row.set_slot(self.version, self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_derivation() {
        let row = DataRow::new(1);
        assert_eq!(row.state(), RowState::Detached);

        row.set_slot(RecordVersion::Current, 5);
        assert_eq!(row.state(), RowState::Added);

        row.set_slot(RecordVersion::Original, 5);
        assert_eq!(row.state(), RowState::Unchanged);

        row.set_slot(RecordVersion::Current, 6);
        assert_eq!(row.state(), RowState::Modified);

        row.set_slot(RecordVersion::Current, NO_RECORD);
        assert_eq!(row.state(), RowState::Deleted);
    }

    #[test]
    fn test_proposed_is_orthogonal() {
        let row = DataRow::new(1);
        row.set_slot(RecordVersion::Original, 2);
        row.set_slot(RecordVersion::Current, 2);
        assert_eq!(row.state(), RowState::Unchanged);

        row.set_slot(RecordVersion::Proposed, 9);
        assert_eq!(row.state(), RowState::Unchanged);
        assert!(row.has_proposed());
    }

    #[test]
    fn test_record_for_version() {
        let row = DataRow::new(1);
        row.set_slot(RecordVersion::Current, 4);

        assert_eq!(row.record_for_version(RecordVersion::Current).unwrap(), 4);
        assert_eq!(row.record_for_version(RecordVersion::Default).unwrap(), 4);
        assert!(row.record_for_version(RecordVersion::Original).is_err());

        row.set_slot(RecordVersion::Proposed, 9);
        assert_eq!(row.record_for_version(RecordVersion::Default).unwrap(), 9);
        assert_eq!(row.record_for_version(RecordVersion::Proposed).unwrap(), 9);
    }

    #[test]
    fn test_backdate_restores_on_drop() {
        let row = DataRow::new(1);
        row.set_slot(RecordVersion::Current, 10);

        {
            let _guard = row.backdate(RecordVersion::Current, 3);
            assert_eq!(row.current_record(), 3);
        }
        assert_eq!(row.current_record(), 10);
    }

    #[test]
    fn test_backdate_restores_on_early_return() {
        fn failing(row: &DataRow) -> Result<()> {
            let _guard = row.backdate(RecordVersion::Current, 99);
            Err(Error::RowDeleted)
        }

        let row = DataRow::new(1);
        row.set_slot(RecordVersion::Current, 7);
        assert!(failing(&row).is_err());
        assert_eq!(row.current_record(), 7);
    }
}
