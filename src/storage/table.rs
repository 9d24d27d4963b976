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

//! Table: versioned rows over a record store, with live indexes
//!
//! The table is the single writer. Every row transition follows the
//! same discipline: mutate the row's slots first, tell the live indexes
//! about the transition second (while the outgoing record's values are
//! still readable from the store, which the backdated delete search
//! depends on), and free orphaned records last.
//!
//! Edits are explicit: `begin_edit` allocates the proposed snapshot,
//! column writes land there, and `end_edit`/`cancel_edit` resolve it.
//! `delete_row` and `reject_changes` cancel an open edit;
//! `accept_changes` commits one first.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::core::{
    Error, RecordId, RecordVersion, Result, RowState, RowStateFilter, Schema, Value, NO_RECORD,
};
use crate::storage::config::TableOptions;
use crate::storage::index::{IndexRegistry, RowComparer, RowPredicate, SortSpec, SortedIndex};
use crate::storage::record_store::RecordStore;
use crate::storage::row::DataRow;

/// An in-memory table of versioned rows
pub struct Table {
    name: String,
    store: RecordStore,
    rows: Vec<Rc<DataRow>>,
    /// row id -> position in `rows`
    row_pos: FxHashMap<u64, usize>,
    next_row_id: u64,
    registry: IndexRegistry,
}

impl Table {
    /// Create an empty table
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self::with_options(name, schema, TableOptions::default())
    }

    /// Create an empty table with sizing hints
    pub fn with_options(name: impl Into<String>, schema: Schema, options: TableOptions) -> Self {
        Self {
            name: name.into(),
            store: RecordStore::with_capacity(schema, options.record_capacity),
            rows: Vec::with_capacity(options.expected_rows),
            row_pos: FxHashMap::default(),
            next_row_id: 0,
            registry: IndexRegistry::new(),
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table schema
    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }

    /// The record store backing this table
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Attached rows, in attachment order (not sorted)
    pub fn rows(&self) -> &[Rc<DataRow>] {
        &self.rows
    }

    /// Number of attached rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    // =========================================================================
    // Row creation
    // =========================================================================

    /// Create a detached row with a fresh proposed payload
    ///
    /// Fill it with [`set_value`](Self::set_value), then attach it with
    /// [`add_row`](Self::add_row) or drop it via
    /// [`discard_row`](Self::discard_row).
    pub fn new_row(&mut self) -> Rc<DataRow> {
        let row = Rc::new(DataRow::new(self.next_row_id));
        self.next_row_id += 1;
        row.set_slot(RecordVersion::Proposed, self.store.allocate());
        row
    }

    /// Free the payload of a never-attached row
    pub fn discard_row(&mut self, row: &Rc<DataRow>) -> Result<()> {
        if self.row_pos.contains_key(&row.id()) {
            return Err(Error::ForeignRow);
        }
        let proposed = row.proposed_record();
        if proposed == NO_RECORD {
            return Err(Error::NoEditInProgress);
        }
        row.set_slot(RecordVersion::Proposed, NO_RECORD);
        self.store.free(proposed)
    }

    /// Attach a filled row; it becomes `Added` and enters every index
    /// whose mask covers added rows
    pub fn add_row(&mut self, row: &Rc<DataRow>) -> Result<()> {
        if self.row_pos.contains_key(&row.id()) {
            return Err(Error::ForeignRow);
        }
        if row.state() != RowState::Detached {
            return Err(Error::ForeignRow);
        }
        let proposed = row.proposed_record();
        if proposed == NO_RECORD {
            return Err(Error::NoEditInProgress);
        }
        if !self.store.is_allocated(proposed) {
            return Err(Error::ForeignRow);
        }

        row.set_slot(RecordVersion::Proposed, NO_RECORD);
        row.set_slot(RecordVersion::Current, proposed);

        self.row_pos.insert(row.id(), self.rows.len());
        self.rows.push(row.clone());

        self.notify_state_changed(row, RowState::Detached, NO_RECORD, NO_RECORD)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a column value from a row version
    pub fn value(&self, row: &Rc<DataRow>, column: usize, version: RecordVersion) -> Result<&Value> {
        let record = row.record_for_version(version)?;
        self.store.get(record, column)
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Open an edit: allocate the proposed snapshot as a copy of current
    pub fn begin_edit(&mut self, row: &Rc<DataRow>) -> Result<()> {
        self.check_attached(row)?;
        if row.has_proposed() {
            return Err(Error::EditInProgress);
        }
        match row.state() {
            RowState::Detached => return Err(Error::RowDetached),
            RowState::Deleted => return Err(Error::RowDeleted),
            _ => {}
        }
        let proposed = self.store.allocate_copy(row.current_record())?;
        row.set_slot(RecordVersion::Proposed, proposed);
        Ok(())
    }

    /// Write a column of the proposed snapshot
    ///
    /// Requires an open edit (or a freshly created row). Indexes never
    /// see proposed records, so no notification fires here.
    pub fn set_value(&mut self, row: &Rc<DataRow>, column: usize, value: Value) -> Result<()> {
        let proposed = row.proposed_record();
        if proposed == NO_RECORD {
            return Err(Error::NoEditInProgress);
        }
        self.store.set(proposed, column, value)
    }

    /// Commit the open edit: proposed becomes current
    ///
    /// A commit that left the sort key untouched shows up in an index as
    /// an in-place `ItemChanged`, never a delete-and-reinsert.
    pub fn end_edit(&mut self, row: &Rc<DataRow>) -> Result<()> {
        self.check_attached(row)?;
        let proposed = row.proposed_record();
        if proposed == NO_RECORD {
            return Err(Error::NoEditInProgress);
        }

        let old_state = row.state();
        let old_current = row.current_record();
        let old_original = row.original_record();

        row.set_slot(RecordVersion::Proposed, NO_RECORD);
        row.set_slot(RecordVersion::Current, proposed);

        self.notify_state_changed(row, old_state, old_current, old_original)?;

        // The outgoing current stays alive while it doubles as original.
        if old_current != NO_RECORD && old_current != old_original {
            self.store.free(old_current)?;
        }
        Ok(())
    }

    /// Abandon the open edit; no state change, no notification
    pub fn cancel_edit(&mut self, row: &Rc<DataRow>) -> Result<()> {
        let proposed = row.proposed_record();
        if proposed == NO_RECORD {
            return Err(Error::NoEditInProgress);
        }
        row.set_slot(RecordVersion::Proposed, NO_RECORD);
        self.store.free(proposed)
    }

    // =========================================================================
    // Delete / accept / reject
    // =========================================================================

    /// Delete a row
    ///
    /// An open edit is cancelled first. A row that was never accepted
    /// (`Added`) detaches outright; otherwise the row turns `Deleted`
    /// and keeps its original record until accepted.
    pub fn delete_row(&mut self, row: &Rc<DataRow>) -> Result<()> {
        self.check_attached(row)?;
        if row.has_proposed() {
            self.cancel_edit(row)?;
        }
        let old_state = row.state();
        match old_state {
            RowState::Deleted => return Err(Error::RowDeleted),
            RowState::Detached => return Err(Error::RowDetached),
            _ => {}
        }

        let old_current = row.current_record();
        let old_original = row.original_record();
        row.set_slot(RecordVersion::Current, NO_RECORD);

        self.notify_state_changed(row, old_state, old_current, old_original)?;

        if old_original == NO_RECORD {
            // Added rows have nothing to fall back to
            self.detach(row);
            self.store.free(old_current)?;
        } else if old_current != old_original {
            self.store.free(old_current)?;
        }
        Ok(())
    }

    /// Accept a row's pending changes: original catches up with current
    ///
    /// An open edit is committed first. Accepting a deleted row purges
    /// it from the table.
    pub fn accept_changes(&mut self, row: &Rc<DataRow>) -> Result<()> {
        self.check_attached(row)?;
        if row.has_proposed() {
            self.end_edit(row)?;
        }

        let old_state = row.state();
        let old_current = row.current_record();
        let old_original = row.original_record();

        match old_state {
            RowState::Unchanged => Ok(()),
            RowState::Detached => Err(Error::RowDetached),
            RowState::Added => {
                row.set_slot(RecordVersion::Original, old_current);
                self.notify_state_changed(row, old_state, old_current, old_original)
            }
            RowState::Modified => {
                row.set_slot(RecordVersion::Original, old_current);
                self.notify_state_changed(row, old_state, old_current, old_original)?;
                self.store.free(old_original)
            }
            RowState::Deleted => {
                row.set_slot(RecordVersion::Original, NO_RECORD);
                self.notify_state_changed(row, old_state, old_current, old_original)?;
                self.detach(row);
                self.store.free(old_original)
            }
        }
    }

    /// Revert a row to its last accepted shape
    ///
    /// An open edit is cancelled first. Rejecting an `Added` row
    /// detaches it.
    pub fn reject_changes(&mut self, row: &Rc<DataRow>) -> Result<()> {
        self.check_attached(row)?;
        if row.has_proposed() {
            self.cancel_edit(row)?;
        }

        let old_state = row.state();
        let old_current = row.current_record();
        let old_original = row.original_record();

        match old_state {
            RowState::Unchanged => Ok(()),
            RowState::Detached => Err(Error::RowDetached),
            RowState::Added => {
                row.set_slot(RecordVersion::Current, NO_RECORD);
                self.notify_state_changed(row, old_state, old_current, old_original)?;
                self.detach(row);
                self.store.free(old_current)
            }
            RowState::Modified => {
                row.set_slot(RecordVersion::Current, old_original);
                self.notify_state_changed(row, old_state, old_current, old_original)?;
                self.store.free(old_current)
            }
            RowState::Deleted => {
                row.set_slot(RecordVersion::Current, old_original);
                self.notify_state_changed(row, old_state, old_current, old_original)
            }
        }
    }

    /// Accept every attached row's pending changes
    pub fn accept_all(&mut self) -> Result<()> {
        let rows: Vec<Rc<DataRow>> = self.rows.clone();
        for row in rows {
            if row.state() != RowState::Unchanged || row.has_proposed() {
                self.accept_changes(&row)?;
            }
        }
        Ok(())
    }

    /// Revert every attached row to its last accepted shape
    pub fn reject_all(&mut self) -> Result<()> {
        let rows: Vec<Rc<DataRow>> = self.rows.clone();
        for row in rows {
            if row.state() != RowState::Unchanged || row.has_proposed() {
                self.reject_changes(&row)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    /// Acquire an index over this table (shared when possible)
    pub fn acquire_index(
        &self,
        sort: SortSpec,
        filter: RowStateFilter,
        predicate: Option<RowPredicate>,
        comparer: Option<RowComparer>,
    ) -> Result<Rc<SortedIndex>> {
        self.registry
            .acquire(sort, filter, predicate, comparer, &self.rows, &self.store)
    }

    /// Drop one reference to an acquired index
    pub fn release_index(&self, index: &Rc<SortedIndex>) -> usize {
        self.registry.release(index)
    }

    /// The sharing registry (snapshots, counts)
    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Rows matching a key, materialized through an index's duplicate run
    pub fn find_rows(
        &self,
        index: &SortedIndex,
        key: &[Value],
    ) -> Result<Vec<Rc<DataRow>>> {
        match index.find_range(key, &self.store)? {
            None => Ok(Vec::new()),
            Some((min, max)) => {
                let mut out = Vec::with_capacity(max - min + 1);
                for pos in min..=max {
                    if let Some(row) = index.row_at(pos) {
                        out.push(row);
                    }
                }
                Ok(out)
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_attached(&self, row: &Rc<DataRow>) -> Result<()> {
        match self.row_pos.get(&row.id()) {
            None => Err(Error::RowDetached),
            Some(&pos) => {
                if Rc::ptr_eq(&self.rows[pos], row) {
                    Ok(())
                } else {
                    Err(Error::ForeignRow)
                }
            }
        }
    }

    fn detach(&mut self, row: &Rc<DataRow>) {
        if let Some(pos) = self.row_pos.remove(&row.id()) {
            self.rows.swap_remove(pos);
            if pos < self.rows.len() {
                self.row_pos.insert(self.rows[pos].id(), pos);
            }
        }
    }

    fn notify_state_changed(
        &self,
        row: &Rc<DataRow>,
        old_state: RowState,
        old_current: RecordId,
        old_original: RecordId,
    ) -> Result<()> {
        let snapshot = self.registry.snapshot();
        for index in snapshot.iter() {
            index.record_state_changed(row, old_state, old_current, old_original, &self.store)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, SchemaBuilder};
    use crate::storage::index::SortField;

    fn people() -> Table {
        let schema = SchemaBuilder::new("people")
            .add("name", DataType::Text)
            .add("age", DataType::Integer)
            .build();
        Table::new("people", schema)
    }

    fn add_person(table: &mut Table, name: &str, age: i64) -> Rc<DataRow> {
        let row = table.new_row();
        table.set_value(&row, 0, Value::text(name)).unwrap();
        table.set_value(&row, 1, Value::integer(age)).unwrap();
        table.add_row(&row).unwrap();
        row
    }

    #[test]
    fn test_add_row_lifecycle() {
        let mut table = people();
        let row = add_person(&mut table, "alice", 30);

        assert_eq!(row.state(), RowState::Added);
        assert_eq!(table.row_count(), 1);
        assert_eq!(
            table.value(&row, 0, RecordVersion::Current).unwrap().as_str(),
            Some("alice")
        );

        table.accept_changes(&row).unwrap();
        assert_eq!(row.state(), RowState::Unchanged);
    }

    #[test]
    fn test_edit_cycle() {
        let mut table = people();
        let row = add_person(&mut table, "bob", 25);
        table.accept_changes(&row).unwrap();

        table.begin_edit(&row).unwrap();
        assert!(table.begin_edit(&row).is_err());
        table.set_value(&row, 1, Value::integer(26)).unwrap();

        // Current face unchanged until commit
        assert_eq!(
            table.value(&row, 1, RecordVersion::Current).unwrap(),
            &Value::integer(25)
        );
        assert_eq!(
            table.value(&row, 1, RecordVersion::Default).unwrap(),
            &Value::integer(26)
        );

        table.end_edit(&row).unwrap();
        assert_eq!(row.state(), RowState::Modified);
        assert_eq!(
            table.value(&row, 1, RecordVersion::Current).unwrap(),
            &Value::integer(26)
        );
        assert_eq!(
            table.value(&row, 1, RecordVersion::Original).unwrap(),
            &Value::integer(25)
        );
    }

    #[test]
    fn test_cancel_edit_is_silent() {
        let mut table = people();
        let row = add_person(&mut table, "carol", 40);
        table.accept_changes(&row).unwrap();

        table.begin_edit(&row).unwrap();
        table.set_value(&row, 1, Value::integer(41)).unwrap();
        table.cancel_edit(&row).unwrap();

        assert_eq!(row.state(), RowState::Unchanged);
        assert_eq!(
            table.value(&row, 1, RecordVersion::Current).unwrap(),
            &Value::integer(40)
        );
        assert!(table.cancel_edit(&row).is_err());
    }

    #[test]
    fn test_delete_added_row_detaches() {
        let mut table = people();
        let row = add_person(&mut table, "dave", 20);

        table.delete_row(&row).unwrap();
        assert_eq!(row.state(), RowState::Detached);
        assert_eq!(table.row_count(), 0);
        assert!(table.delete_row(&row).is_err());
    }

    #[test]
    fn test_delete_accepted_row_keeps_original() {
        let mut table = people();
        let row = add_person(&mut table, "erin", 33);
        table.accept_changes(&row).unwrap();

        table.delete_row(&row).unwrap();
        assert_eq!(row.state(), RowState::Deleted);
        assert_eq!(table.row_count(), 1);
        assert_eq!(
            table.value(&row, 0, RecordVersion::Original).unwrap().as_str(),
            Some("erin")
        );
        // The current face is gone
        assert!(table.value(&row, 0, RecordVersion::Current).is_err());

        // Double delete is a usage error
        assert_eq!(table.delete_row(&row).unwrap_err(), Error::RowDeleted);

        // Accepting the delete purges the row
        table.accept_changes(&row).unwrap();
        assert_eq!(row.state(), RowState::Detached);
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_reject_changes() {
        let mut table = people();
        let row = add_person(&mut table, "fred", 50);
        table.accept_changes(&row).unwrap();

        table.begin_edit(&row).unwrap();
        table.set_value(&row, 1, Value::integer(51)).unwrap();
        table.end_edit(&row).unwrap();
        assert_eq!(row.state(), RowState::Modified);

        table.reject_changes(&row).unwrap();
        assert_eq!(row.state(), RowState::Unchanged);
        assert_eq!(
            table.value(&row, 1, RecordVersion::Current).unwrap(),
            &Value::integer(50)
        );

        // Rejecting a delete resurrects the row
        table.delete_row(&row).unwrap();
        table.reject_changes(&row).unwrap();
        assert_eq!(row.state(), RowState::Unchanged);

        // Rejecting an added row detaches it
        let added = add_person(&mut table, "gina", 60);
        table.reject_changes(&added).unwrap();
        assert_eq!(added.state(), RowState::Detached);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_editing_rules() {
        let mut table = people();
        let row = add_person(&mut table, "hank", 70);
        table.accept_changes(&row).unwrap();
        table.delete_row(&row).unwrap();

        // Deleted rows cannot be edited
        assert_eq!(table.begin_edit(&row).unwrap_err(), Error::RowDeleted);

        // Detached rows cannot be edited through the table
        let detached = table.new_row();
        assert_eq!(table.begin_edit(&detached).unwrap_err(), Error::RowDetached);

        // Writes without an open edit fail
        let accepted = add_person(&mut table, "iris", 80);
        table.accept_changes(&accepted).unwrap();
        assert_eq!(
            table
                .set_value(&accepted, 1, Value::integer(81))
                .unwrap_err(),
            Error::NoEditInProgress
        );
    }

    #[test]
    fn test_foreign_row_rejected() {
        let mut table_a = people();
        let mut table_b = people();
        let row = add_person(&mut table_a, "jane", 1);

        assert!(table_b.delete_row(&row).is_err());
        assert!(table_b.begin_edit(&row).is_err());
    }

    #[test]
    fn test_accept_all_and_reject_all() {
        let mut table = people();
        let a = add_person(&mut table, "a", 1);
        let b = add_person(&mut table, "b", 2);
        table.accept_all().unwrap();
        assert_eq!(a.state(), RowState::Unchanged);
        assert_eq!(b.state(), RowState::Unchanged);

        table.begin_edit(&a).unwrap();
        table.set_value(&a, 1, Value::integer(9)).unwrap();
        table.end_edit(&a).unwrap();
        table.delete_row(&b).unwrap();
        let c = add_person(&mut table, "c", 3);

        table.reject_all().unwrap();
        assert_eq!(a.state(), RowState::Unchanged);
        assert_eq!(
            table.value(&a, 1, RecordVersion::Current).unwrap(),
            &Value::integer(1)
        );
        assert_eq!(b.state(), RowState::Unchanged);
        assert_eq!(c.state(), RowState::Detached);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_discard_row_frees_payload() {
        let mut table = people();
        let live_before = table.store().live_count();
        let row = table.new_row();
        assert_eq!(table.store().live_count(), live_before + 1);
        table.discard_row(&row).unwrap();
        assert_eq!(table.store().live_count(), live_before);
        assert!(table.discard_row(&row).is_err());
    }

    #[test]
    fn test_record_reclamation_across_lifecycle() {
        let mut table = people();
        let row = add_person(&mut table, "kate", 5);
        table.accept_changes(&row).unwrap();
        assert_eq!(table.store().live_count(), 1);

        table.begin_edit(&row).unwrap();
        table.set_value(&row, 1, Value::integer(6)).unwrap();
        table.end_edit(&row).unwrap();
        // Original + current
        assert_eq!(table.store().live_count(), 2);

        table.accept_changes(&row).unwrap();
        assert_eq!(table.store().live_count(), 1);

        table.delete_row(&row).unwrap();
        assert_eq!(table.store().live_count(), 1);
        table.accept_changes(&row).unwrap();
        assert_eq!(table.store().live_count(), 0);
    }

    #[test]
    fn test_find_rows_over_shared_index() {
        let mut table = people();
        add_person(&mut table, "a", 10);
        add_person(&mut table, "b", 20);
        add_person(&mut table, "c", 10);

        let index = table
            .acquire_index(
                SortSpec::new(vec![SortField::ascending(1)]),
                RowStateFilter::CURRENT_ROWS,
                None,
                None,
            )
            .unwrap();

        let matches = table.find_rows(&index, &[Value::integer(10)]).unwrap();
        assert_eq!(matches.len(), 2);
        let empty = table.find_rows(&index, &[Value::integer(99)]).unwrap();
        assert!(empty.is_empty());

        table.release_index(&index);
    }
}
