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

//! Sorted live view over a table's versioned rows
//!
//! A [`SortedIndex`] keeps one tree node per record handle the row-state
//! mask (and optional predicate) lets through. Ordering runs through the
//! row's live slot, not the cached handle, so a comparison always sees
//! the row's present shape; because the row mutation has already
//! happened by the time an index is notified, stale handles are
//! backdated into the slots for the whole search-and-remove pass and
//! restored by guards on every exit path.
//!
//! Duplicate primary keys are legal. Every node is still strictly
//! ordered by the mandatory tiebreak (row id, then version ordinal), so
//! iteration over a duplicate run is deterministic and stable. The
//! count of adjacent equal-key pairs is maintained on every insert and
//! delete, which makes [`check_unique`](SortedIndex::check_unique) O(1).

use std::cell::{Cell, Ref, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::debug;

use crate::core::{
    Error, RecordId, RecordVersion, Result, RowState, RowStateFilter, SortDirection, Value,
    NO_RECORD,
};
use crate::storage::listener::{IndexEvent, IndexListener, ListenerList};
use crate::storage::record_store::RecordStore;
use crate::storage::row::DataRow;

use super::tree::{IndexEntry, RecordTree, NIL};

/// One (column, direction) pair of a sort specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortField {
    /// Column position in the schema
    pub column: usize,
    /// Sort direction
    pub direction: SortDirection,
}

impl SortField {
    /// Ascending sort on a column
    pub fn ascending(column: usize) -> Self {
        Self {
            column,
            direction: SortDirection::Ascending,
        }
    }

    /// Descending sort on a column
    pub fn descending(column: usize) -> Self {
        Self {
            column,
            direction: SortDirection::Descending,
        }
    }
}

/// Ordered list of sort fields; empty means table insertion order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    fields: Vec<SortField>,
}

impl SortSpec {
    /// Sort by the given fields, first non-equal field wins
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    /// Row insertion order (no key columns)
    pub fn natural() -> Self {
        Self { fields: Vec::new() }
    }

    /// The sort fields
    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Number of key columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true when no key columns are configured
    pub fn is_natural(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Row-accept predicate: (row, version slot under consideration) -> keep
pub type RowPredicate = Rc<dyn Fn(&DataRow, RecordVersion) -> bool>;

/// Caller-supplied total order over rows, bypassing column comparison
pub type RowComparer = Rc<dyn Fn(&DataRow, &DataRow) -> Ordering>;

/// Ordered, incrementally maintained index over a table's records
pub struct SortedIndex {
    sort: SortSpec,
    filter: RowStateFilter,
    predicate: Option<RowPredicate>,
    comparer: Option<RowComparer>,
    tree: RefCell<RecordTree>,
    /// Adjacent pairs of entries whose primary keys compare equal
    adjacent_dups: Cell<usize>,
    listeners: ListenerList,
    refs: Cell<usize>,
}

impl SortedIndex {
    /// Create an empty index; populate with [`rebuild`](Self::rebuild)
    ///
    /// Fails fast on an invalid row-state mask.
    pub fn new(
        sort: SortSpec,
        filter: RowStateFilter,
        predicate: Option<RowPredicate>,
        comparer: Option<RowComparer>,
    ) -> Result<Self> {
        filter.validate()?;
        Ok(Self {
            sort,
            filter,
            predicate,
            comparer,
            tree: RefCell::new(RecordTree::new()),
            adjacent_dups: Cell::new(0),
            listeners: ListenerList::new(),
            refs: Cell::new(0),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The sort specification
    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    /// The row-state mask
    pub fn filter(&self) -> RowStateFilter {
        self.filter
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.tree.borrow().len()
    }

    /// Returns true when no entries are indexed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if at least two entries share a primary key
    pub fn has_duplicates(&self) -> bool {
        self.adjacent_dups.get() > 0
    }

    /// Cheap uniqueness check from the incrementally maintained
    /// duplicate count; never walks the tree
    pub fn check_unique(&self) -> bool {
        self.adjacent_dups.get() == 0
    }

    /// A filter predicate or custom comparer pins the index to its
    /// creator; only bare (sort, mask) indexes are shared
    pub fn is_shareable(&self) -> bool {
        self.predicate.is_none() && self.comparer.is_none()
    }

    /// Structural equality used by the sharing layer
    pub fn matches(&self, sort: &SortSpec, filter: RowStateFilter) -> bool {
        self.is_shareable() && self.sort == *sort && self.filter == filter
    }

    // =========================================================================
    // Reference counting (driven by the registry)
    // =========================================================================

    /// Current reference count
    pub fn ref_count(&self) -> usize {
        self.refs.get()
    }

    pub(crate) fn add_ref(&self) -> usize {
        let refs = self.refs.get() + 1;
        self.refs.set(refs);
        refs
    }

    pub(crate) fn release_ref(&self) -> usize {
        let refs = self.refs.get().saturating_sub(1);
        self.refs.set(refs);
        refs
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Attach an observer
    pub fn add_listener(&self, listener: Rc<dyn IndexListener>) {
        self.listeners.add(listener);
    }

    /// Detach an observer (safe from inside a handler)
    pub fn remove_listener(&self, listener: &Rc<dyn IndexListener>) {
        self.listeners.remove(listener);
    }

    // =========================================================================
    // Comparators
    // =========================================================================

    /// The record a comparison should read for an entry: the row's live
    /// slot when populated (it is, except mid-transition), else the
    /// handle cached at insert time
    fn resolve_record(&self, entry: &IndexEntry) -> RecordId {
        let slot = entry.row.slot(entry.version);
        if slot != NO_RECORD {
            slot
        } else {
            entry.record
        }
    }

    /// Primary ordering: configured columns, custom comparer, or row
    /// insertion order when no key columns are given
    fn primary_cmp(&self, store: &RecordStore, a: &IndexEntry, b: &IndexEntry) -> Ordering {
        if let Some(comparer) = &self.comparer {
            return comparer(&a.row, &b.row);
        }
        let ra = self.resolve_record(a);
        let rb = self.resolve_record(b);
        for field in self.sort.fields() {
            let mut ord = store.compare_records(field.column, ra, rb);
            if field.direction.is_descending() {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        if self.sort.is_natural() {
            a.row.id().cmp(&b.row.id())
        } else {
            Ordering::Equal
        }
    }

    /// Full strict order: primary key, then row id, then version
    /// ordinal. Never equal for two distinct entries.
    fn full_cmp(&self, store: &RecordStore, a: &IndexEntry, b: &IndexEntry) -> Ordering {
        self.primary_cmp(store, a, b)
            .then_with(|| a.row.id().cmp(&b.row.id()))
            .then_with(|| a.version.ordinal().cmp(&b.version.ordinal()))
    }

    /// Prefix comparison of an entry against coerced key values
    fn compare_entry_to_key(&self, store: &RecordStore, e: &IndexEntry, key: &[Value]) -> Ordering {
        let record = self.resolve_record(e);
        for (field, value) in self.sort.fields().iter().zip(key) {
            let mut ord = store.compare_to_value(field.column, record, value);
            if field.direction.is_descending() {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Raw record-vs-record key comparison, used to detect the
    /// same-key-update case. A custom comparer cannot answer this (it
    /// only sees rows), so it conservatively reports a change.
    fn records_key_equal(&self, store: &RecordStore, a: RecordId, b: RecordId) -> bool {
        if self.comparer.is_some() {
            return false;
        }
        if self.sort.is_natural() {
            // Key is row identity, which never changes
            return true;
        }
        self.sort
            .fields()
            .iter()
            .all(|f| store.compare_records(f.column, a, b) == Ordering::Equal)
    }

    // =========================================================================
    // Tree mutation with duplicate accounting
    // =========================================================================

    fn ranks_key_equal(&self, tree: &RecordTree, store: &RecordStore, i: usize, j: usize) -> bool {
        match (tree.get(i), tree.get(j)) {
            (Some(a), Some(b)) => self.primary_cmp(store, a, b) == Ordering::Equal,
            _ => false,
        }
    }

    fn shift_dups(&self, delta: isize) {
        let next = self.adjacent_dups.get() as isize + delta;
        debug_assert!(next >= 0, "duplicate pair count underflow");
        self.adjacent_dups.set(next.max(0) as usize);
    }

    fn tree_insert(
        &self,
        tree: &mut RecordTree,
        store: &RecordStore,
        entry: IndexEntry,
    ) -> Result<usize> {
        let pos = tree.insert(entry, |a, b| self.full_cmp(store, a, b))?;
        let n = tree.len();
        let prev_new = pos > 0 && self.ranks_key_equal(tree, store, pos - 1, pos);
        let next_new = pos + 1 < n && self.ranks_key_equal(tree, store, pos, pos + 1);
        let bridged = pos > 0 && pos + 1 < n && self.ranks_key_equal(tree, store, pos - 1, pos + 1);
        self.shift_dups(prev_new as isize + next_new as isize - bridged as isize);
        Ok(pos)
    }

    fn remove_at(
        &self,
        tree: &mut RecordTree,
        store: &RecordStore,
        pos: usize,
    ) -> Option<IndexEntry> {
        let n = tree.len();
        let prev_eq = pos > 0 && self.ranks_key_equal(tree, store, pos - 1, pos);
        let next_eq = pos + 1 < n && self.ranks_key_equal(tree, store, pos, pos + 1);
        let bridge = pos > 0 && pos + 1 < n && self.ranks_key_equal(tree, store, pos - 1, pos + 1);
        let entry = tree.delete_at(pos)?;
        self.shift_dups(bridge as isize - prev_eq as isize - next_eq as isize);
        Some(entry)
    }

    // =========================================================================
    // Population
    // =========================================================================

    /// Repopulate from a full scan of the table's rows; fires `Reset`
    pub fn rebuild(&self, rows: &[Rc<DataRow>], store: &RecordStore) -> Result<()> {
        let mut tree = RecordTree::new();
        self.adjacent_dups.set(0);
        for row in rows {
            for version in self.filter.versions_for(row.state()) {
                let record = row.slot(version);
                if record == NO_RECORD {
                    continue;
                }
                if let Some(predicate) = &self.predicate {
                    if !predicate(row, version) {
                        continue;
                    }
                }
                self.tree_insert(&mut tree, store, IndexEntry::new(record, row.clone(), version))?;
            }
        }
        debug!(entries = tree.len(), "index rebuilt from full scan");
        *self.tree.borrow_mut() = tree;
        self.listeners.notify(&IndexEvent::Reset);
        Ok(())
    }

    // =========================================================================
    // Incremental maintenance
    // =========================================================================

    /// The record each version slot contributes for a given state under
    /// the mask: `[original-slot record, current-slot record]`
    fn mask_slots(
        &self,
        state: RowState,
        current: RecordId,
        original: RecordId,
    ) -> [Option<RecordId>; 2] {
        let mut out = [None, None];
        for version in self.filter.versions_for(state) {
            match version {
                RecordVersion::Original if original != NO_RECORD => out[0] = Some(original),
                RecordVersion::Current if current != NO_RECORD => out[1] = Some(current),
                _ => {}
            }
        }
        out
    }

    /// Apply one row state transition
    ///
    /// The caller reports the pre-transition state and slot handles; the
    /// row itself already carries the post-transition shape. Per version
    /// slot the index removes, inserts, repositions or key-updates its
    /// entry and fires exactly one positional event per structural
    /// change. Events fire after all tree borrows are released, so a
    /// handler may re-enter the index for reads.
    pub fn record_state_changed(
        &self,
        row: &Rc<DataRow>,
        old_state: RowState,
        old_current: RecordId,
        old_original: RecordId,
        store: &RecordStore,
    ) -> Result<()> {
        let old_slots = self.mask_slots(old_state, old_current, old_original);

        let mut new_slots =
            self.mask_slots(row.state(), row.current_record(), row.original_record());
        if let Some(predicate) = &self.predicate {
            if new_slots[0].is_some() && !predicate(row, RecordVersion::Original) {
                new_slots[0] = None;
            }
            if new_slots[1].is_some() && !predicate(row, RecordVersion::Current) {
                new_slots[1] = None;
            }
        }

        let mut events: SmallVec<[IndexEvent; 4]> = SmallVec::new();
        {
            let mut tree = self.tree.borrow_mut();
            let versions = [RecordVersion::Original, RecordVersion::Current];

            // An insert carried over from the removal pass; `removed_at`
            // is set when it is the second half of a reposition.
            let mut inserts: SmallVec<[(RecordVersion, RecordId, Option<usize>); 2]> =
                SmallVec::new();
            {
                // Backdate the row to its pre-transition shape for the
                // whole removal pass. Stale entries must be searched out
                // and removed (with their duplicate accounting) while
                // every node's resolved key still agrees with its
                // position; the guards restore the live slots on every
                // exit path.
                let _original = row.backdate(RecordVersion::Original, old_original);
                let _current = row.backdate(RecordVersion::Current, old_current);

                for (i, &version) in versions.iter().enumerate() {
                    match (old_slots[i], new_slots[i]) {
                        (None, None) => {}
                        (Some(old_record), None) => {
                            // The entry may be absent when the predicate
                            // had rejected it; nothing to remove then.
                            let target = IndexEntry::new(old_record, row.clone(), version);
                            if let Some(pos) =
                                tree.position_of(|e| self.full_cmp(store, e, &target))
                            {
                                self.remove_at(&mut tree, store, pos);
                                events.push(IndexEvent::ItemDeleted { position: pos });
                            }
                        }
                        (None, Some(new_record)) => inserts.push((version, new_record, None)),
                        (Some(old_record), Some(new_record)) => {
                            if old_record == new_record {
                                // Same handle, same key; membership and
                                // rank are unchanged.
                                continue;
                            }
                            let target = IndexEntry::new(old_record, row.clone(), version);
                            match tree.position_of(|e| self.full_cmp(store, e, &target)) {
                                None => inserts.push((version, new_record, None)),
                                Some(pos) => {
                                    if self.records_key_equal(store, old_record, new_record) {
                                        // Key-preserving update: swap the
                                        // handle in place, no reordering.
                                        tree.replace_record_at(pos, new_record);
                                        events.push(IndexEvent::ItemChanged { position: pos });
                                    } else {
                                        self.remove_at(&mut tree, store, pos);
                                        inserts.push((version, new_record, Some(pos)));
                                    }
                                }
                            }
                        }
                    }
                }
            }

            // Repositioned entries re-enter first: their removal was the
            // last structural change of the pass above, so the paired
            // Moved event stays adjacent to it in the stream.
            inserts.sort_by_key(|(_, _, removed_at)| removed_at.is_none());
            for (version, record, removed_at) in inserts {
                let pos = self.tree_insert(
                    &mut tree,
                    store,
                    IndexEntry::new(record, row.clone(), version),
                )?;
                events.push(match removed_at {
                    Some(from) if from == pos => IndexEvent::ItemChanged { position: pos },
                    Some(from) => IndexEvent::ItemMoved { from, to: pos },
                    None => IndexEvent::ItemAdded { position: pos },
                });
            }
        }

        for event in &events {
            self.listeners.notify(event);
        }
        Ok(())
    }

    // =========================================================================
    // Direct mutation
    // =========================================================================

    /// Insert one (row, version) entry and fire `ItemAdded`
    ///
    /// Registry-acquired indexes are normally driven through
    /// [`record_state_changed`](Self::record_state_changed); this is the
    /// raw operation underneath it.
    pub fn insert_record(
        &self,
        row: &Rc<DataRow>,
        version: RecordVersion,
        store: &RecordStore,
    ) -> Result<usize> {
        let record = row.record_for_version(version)?;
        let position = {
            let mut tree = self.tree.borrow_mut();
            self.tree_insert(&mut tree, store, IndexEntry::new(record, row.clone(), version))?
        };
        self.listeners.notify(&IndexEvent::ItemAdded { position });
        Ok(position)
    }

    /// Remove the entry at `position`, returning its record handle, and
    /// fire `ItemDeleted`
    pub fn delete_by_position(&self, position: usize, store: &RecordStore) -> Result<RecordId> {
        let record = {
            let mut tree = self.tree.borrow_mut();
            let entry = self
                .remove_at(&mut tree, store, position)
                .ok_or(Error::PositionOutOfRange { position })?;
            entry.record
        };
        self.listeners.notify(&IndexEvent::ItemDeleted { position });
        Ok(record)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Record handle at `position`
    pub fn get_record(&self, position: usize) -> Option<RecordId> {
        self.tree.borrow().get(position).map(|e| e.record)
    }

    /// Owning row at `position`
    pub fn row_at(&self, position: usize) -> Option<Rc<DataRow>> {
        self.tree.borrow().get(position).map(|e| e.row.clone())
    }

    /// Full entry at `position`
    pub fn entry_at(&self, position: usize) -> Option<IndexEntry> {
        self.tree.borrow().get(position).cloned()
    }

    /// Rank of a record, searching by its key values
    ///
    /// Re-derives the comparison from the record's stored values, walks
    /// to the duplicate run and scans it for the exact handle. Custom
    /// comparers and natural order fall back to a linear scan (the
    /// record's key cannot be reconstructed without its row).
    pub fn position_of_record(&self, record: RecordId, store: &RecordStore) -> Option<usize> {
        let tree = self.tree.borrow();
        if self.comparer.is_none() && !self.sort.is_natural() {
            let cmp = |e: &IndexEntry| {
                let er = self.resolve_record(e);
                for field in self.sort.fields() {
                    let mut ord = store.compare_records(field.column, er, record);
                    if field.direction.is_descending() {
                        ord = ord.reverse();
                    }
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            };
            let mut pos = tree.lower_bound(cmp);
            while pos < tree.len() {
                let e = tree.get(pos)?;
                if cmp(e) != Ordering::Equal {
                    break;
                }
                if e.record == record {
                    return Some(pos);
                }
                pos += 1;
            }
            None
        } else {
            tree.cursor_from(0).position(|e| e.record == record)
        }
    }

    fn coerced_key(&self, key: &[Value], store: &RecordStore, exact: bool) -> Result<Vec<Value>> {
        if self.comparer.is_some() || self.sort.is_natural() {
            return Err(Error::NoSortKey);
        }
        let arity = self.sort.len();
        if key.is_empty() || key.len() > arity || (exact && key.len() != arity) {
            return Err(Error::KeyLengthMismatch {
                expected: arity,
                got: key.len(),
            });
        }
        if key.iter().all(|v| v.is_null()) {
            return Err(Error::NullSearchKey);
        }
        key.iter()
            .zip(self.sort.fields())
            .map(|(value, field)| store.coerce_key(field.column, value))
            .collect()
    }

    /// Rank of the first entry matching the full key, or `Ok(None)`
    ///
    /// Key values pass through the column-assignment coercion before the
    /// walk. Arity mismatch and all-NULL keys are usage errors; a miss
    /// is a plain `None`.
    pub fn find_by_key(&self, key: &[Value], store: &RecordStore) -> Result<Option<usize>> {
        let key = self.coerced_key(key, store, true)?;
        let tree = self.tree.borrow();
        let lb = tree.lower_bound(|e| self.compare_entry_to_key(store, e, &key));
        if lb < tree.len() {
            let hit = tree
                .get(lb)
                .is_some_and(|e| self.compare_entry_to_key(store, e, &key) == Ordering::Equal);
            if hit {
                return Ok(Some(lb));
            }
        }
        Ok(None)
    }

    /// Inclusive `[min, max]` position pair spanning the duplicate run
    /// matching a full or prefix key, or `Ok(None)`
    pub fn find_range(&self, key: &[Value], store: &RecordStore) -> Result<Option<(usize, usize)>> {
        let key = self.coerced_key(key, store, false)?;
        let tree = self.tree.borrow();
        let lb = tree.lower_bound(|e| self.compare_entry_to_key(store, e, &key));
        let ub = tree.upper_bound(|e| self.compare_entry_to_key(store, e, &key));
        if lb < ub {
            Ok(Some((lb, ub - 1)))
        } else {
            Ok(None)
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Restartable forward cursor from `position`
    ///
    /// The cursor holds a read borrow on the tree: structurally mutating
    /// the index while one is outstanding fails loudly instead of
    /// yielding a silently inconsistent traversal.
    pub fn cursor(&self, position: usize) -> IndexCursor<'_> {
        let tree = self.tree.borrow();
        let node = tree.node_at_rank(position);
        IndexCursor { tree, node }
    }

    /// All record handles in index order (convenience for small scans)
    pub fn records(&self) -> Vec<RecordId> {
        self.cursor(0).map(|e| e.record).collect()
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Structural verification of the underlying tree
    pub fn verify(&self) -> Result<()> {
        self.tree.borrow().verify()
    }

    /// Full-walk duplicate count, checked against the incremental
    /// counter; both must always agree
    pub fn verify_duplicates(&self, store: &RecordStore) -> bool {
        let tree = self.tree.borrow();
        let mut pairs = 0usize;
        let mut prev: Option<&IndexEntry> = None;
        for entry in tree.cursor_from(0) {
            if let Some(prev) = prev {
                if self.primary_cmp(store, prev, entry) == Ordering::Equal {
                    pairs += 1;
                }
            }
            prev = Some(entry);
        }
        pairs == self.adjacent_dups.get()
    }
}

/// Forward cursor over an index; see [`SortedIndex::cursor`]
pub struct IndexCursor<'a> {
    tree: Ref<'a, RecordTree>,
    node: u32,
}

impl Iterator for IndexCursor<'_> {
    type Item = IndexEntry;

    fn next(&mut self) -> Option<IndexEntry> {
        if self.node == NIL {
            return None;
        }
        let entry = self.tree.entry_ref(self.node).clone();
        self.node = self.tree.successor(self.node);
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, SchemaBuilder};

    fn store() -> RecordStore {
        let schema = SchemaBuilder::new("people")
            .add("name", DataType::Text)
            .add("age", DataType::Integer)
            .build();
        RecordStore::new(schema)
    }

    /// One unchanged row per (name, age) pair
    fn seed(store: &mut RecordStore, rows: &[(&str, i64)]) -> Vec<Rc<DataRow>> {
        rows.iter()
            .enumerate()
            .map(|(i, (name, age))| {
                let record = store.allocate();
                store.set(record, 0, Value::text(*name)).unwrap();
                store.set(record, 1, Value::integer(*age)).unwrap();
                let row = Rc::new(DataRow::new(i as u64));
                row.set_slot(RecordVersion::Original, record);
                row.set_slot(RecordVersion::Current, record);
                row
            })
            .collect()
    }

    fn age_index() -> SortedIndex {
        SortedIndex::new(
            SortSpec::new(vec![SortField::ascending(1)]),
            RowStateFilter::CURRENT_ROWS,
            None,
            None,
        )
        .unwrap()
    }

    fn ages(index: &SortedIndex, store: &RecordStore) -> Vec<i64> {
        index
            .cursor(0)
            .map(|e| store.get(e.record, 1).unwrap().as_int64().unwrap())
            .collect()
    }

    #[test]
    fn test_rebuild_sorts_with_stable_duplicates() {
        let mut store = store();
        let rows = seed(
            &mut store,
            &[("a", 30), ("b", 10), ("c", 20), ("d", 10), ("e", 40)],
        );
        let index = age_index();
        index.rebuild(&rows, &store).unwrap();

        assert_eq!(index.len(), 5);
        assert_eq!(ages(&index, &store), vec![10, 10, 20, 30, 40]);
        assert!(index.has_duplicates());
        assert!(!index.check_unique());
        assert!(index.verify_duplicates(&store));
        index.verify().unwrap();

        // The two age-10 rows order by insertion id: row "b" before "d"
        assert_eq!(index.row_at(0).unwrap().id(), rows[1].id());
        assert_eq!(index.row_at(1).unwrap().id(), rows[3].id());
    }

    #[test]
    fn test_find_by_key_and_range() {
        let mut store = store();
        let rows = seed(
            &mut store,
            &[("a", 30), ("b", 10), ("c", 20), ("d", 10), ("e", 40)],
        );
        let index = age_index();
        index.rebuild(&rows, &store).unwrap();

        assert_eq!(index.find_by_key(&[Value::integer(10)], &store).unwrap(), Some(0));
        assert_eq!(index.find_by_key(&[Value::integer(30)], &store).unwrap(), Some(3));
        assert_eq!(index.find_by_key(&[Value::integer(99)], &store).unwrap(), None);

        // Key coercion follows the assignment path
        assert_eq!(index.find_by_key(&[Value::text("20")], &store).unwrap(), Some(2));

        assert_eq!(
            index.find_range(&[Value::integer(10)], &store).unwrap(),
            Some((0, 1))
        );
        assert_eq!(index.find_range(&[Value::integer(99)], &store).unwrap(), None);
    }

    #[test]
    fn test_key_lookup_usage_errors() {
        let mut store = store();
        let rows = seed(&mut store, &[("a", 1)]);
        let index = age_index();
        index.rebuild(&rows, &store).unwrap();

        assert!(matches!(
            index.find_by_key(&[], &store),
            Err(Error::KeyLengthMismatch { .. })
        ));
        assert!(matches!(
            index.find_by_key(&[Value::integer(1), Value::integer(2)], &store),
            Err(Error::KeyLengthMismatch { .. })
        ));
        assert!(matches!(
            index.find_by_key(&[Value::null(DataType::Integer)], &store),
            Err(Error::NullSearchKey)
        ));

        let natural = SortedIndex::new(
            SortSpec::natural(),
            RowStateFilter::CURRENT_ROWS,
            None,
            None,
        )
        .unwrap();
        natural.rebuild(&rows, &store).unwrap();
        assert!(matches!(
            natural.find_by_key(&[Value::integer(1)], &store),
            Err(Error::NoSortKey)
        ));
    }

    #[test]
    fn test_position_of_record_roundtrip() {
        let mut store = store();
        let rows = seed(
            &mut store,
            &[("a", 30), ("b", 10), ("c", 20), ("d", 10), ("e", 40)],
        );
        let index = age_index();
        index.rebuild(&rows, &store).unwrap();

        for pos in 0..index.len() {
            let record = index.get_record(pos).unwrap();
            assert_eq!(index.position_of_record(record, &store), Some(pos));
        }
    }

    #[test]
    fn test_descending_direction() {
        let mut store = store();
        let rows = seed(&mut store, &[("a", 1), ("b", 3), ("c", 2)]);
        let index = SortedIndex::new(
            SortSpec::new(vec![SortField::descending(1)]),
            RowStateFilter::CURRENT_ROWS,
            None,
            None,
        )
        .unwrap();
        index.rebuild(&rows, &store).unwrap();
        assert_eq!(ages(&index, &store), vec![3, 2, 1]);
    }

    #[test]
    fn test_natural_order_is_insertion_order() {
        let mut store = store();
        let rows = seed(&mut store, &[("z", 9), ("a", 1), ("m", 5)]);
        let index = SortedIndex::new(
            SortSpec::natural(),
            RowStateFilter::CURRENT_ROWS,
            None,
            None,
        )
        .unwrap();
        index.rebuild(&rows, &store).unwrap();
        assert_eq!(ages(&index, &store), vec![9, 1, 5]);
        assert!(index.check_unique());
    }

    #[test]
    fn test_predicate_filters_rows() {
        let mut store = store();
        let rows = seed(&mut store, &[("a", 10), ("b", 20), ("c", 30)]);
        // The predicate compares through the row's live slot, same as
        // the comparators do.
        let index = SortedIndex::new(
            SortSpec::new(vec![SortField::ascending(1)]),
            RowStateFilter::CURRENT_ROWS,
            Some(Rc::new(|row: &DataRow, _version: RecordVersion| {
                row.id() != 1
            })),
            None,
        )
        .unwrap();
        index.rebuild(&rows, &store).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(ages(&index, &store), vec![10, 30]);
        assert!(!index.is_shareable());
    }

    #[test]
    fn test_custom_comparer() {
        let mut store = store();
        let rows = seed(&mut store, &[("a", 1), ("b", 2), ("c", 3)]);
        // Reverse insertion order through a caller-supplied total order
        let index = SortedIndex::new(
            SortSpec::natural(),
            RowStateFilter::CURRENT_ROWS,
            None,
            Some(Rc::new(|a: &DataRow, b: &DataRow| b.id().cmp(&a.id()))),
        )
        .unwrap();
        index.rebuild(&rows, &store).unwrap();
        assert_eq!(ages(&index, &store), vec![3, 2, 1]);
        assert!(!index.is_shareable());
        assert!(matches!(
            index.find_by_key(&[Value::integer(1)], &store),
            Err(Error::NoSortKey)
        ));
    }

    #[test]
    fn test_invalid_filter_fails_at_construction() {
        assert!(matches!(
            SortedIndex::new(SortSpec::natural(), RowStateFilter::NONE, None, None),
            Err(Error::InvalidRowStateFilter(0))
        ));
    }

    #[test]
    fn test_duplicate_counter_tracks_deletes() {
        let mut store = store();
        let rows = seed(&mut store, &[("a", 10), ("b", 10), ("c", 10), ("d", 20)]);
        let index = age_index();
        index.rebuild(&rows, &store).unwrap();
        assert!(index.has_duplicates());
        assert!(index.verify_duplicates(&store));

        // Shrink the duplicate run one entry at a time
        index.delete_by_position(0, &store).unwrap();
        assert!(index.has_duplicates());
        assert!(index.verify_duplicates(&store));

        index.delete_by_position(0, &store).unwrap();
        assert!(!index.has_duplicates());
        assert!(index.check_unique());
        assert!(index.verify_duplicates(&store));
    }

    #[test]
    fn test_mutation_with_outstanding_cursor_panics() {
        let mut store = store();
        let rows = seed(&mut store, &[("a", 1), ("b", 2)]);
        let index = age_index();
        index.rebuild(&rows, &store).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut cursor = index.cursor(0);
            cursor.next();
            // Structural mutation while the cursor borrow is live
            let _ = index.delete_by_position(0, &store);
        }));
        assert!(result.is_err());
    }
}
