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

//! Index sharing and lifecycle for one table
//!
//! Consumers whose (sort spec, row-state mask) tuples are structurally
//! equal share one physical index; a predicate or custom comparer makes
//! an index private to its creator, unconditionally. Lifetime is
//! explicit reference counting: `release` of the last reference evicts
//! the index, and the next acquisition rebuilds from a full scan.
//!
//! The live set sits behind a read/write lock and is replaced
//! copy-on-write on every structural change, so a reader iterating an
//! older snapshot finishes against stale-but-consistent data and is
//! never disturbed by a register or evict.

use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::core::{Error, Result, RowStateFilter};
use crate::storage::record_store::RecordStore;
use crate::storage::row::DataRow;

use super::sorted::{RowComparer, RowPredicate, SortSpec, SortedIndex};

/// Immutable snapshot of the live index set
pub type IndexSet = Arc<Vec<Rc<SortedIndex>>>;

/// Reference-counted cache of live indexes for one table
pub struct IndexRegistry {
    live: RwLock<IndexSet>,
}

impl IndexRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            live: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Snapshot of the current live set
    ///
    /// The snapshot stays valid (and stale) across later structural
    /// changes; notification dispatch iterates it without holding the
    /// lock.
    pub fn snapshot(&self) -> IndexSet {
        self.live.read().clone()
    }

    /// Number of live indexes
    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    /// Returns true when no indexes are live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return a live structurally-equal index, or build and register a
    /// new one populated from a full scan
    ///
    /// The returned index carries one reference for the caller; pair
    /// every `acquire`/[`add_ref`](Self::add_ref) with a
    /// [`release`](Self::release).
    pub fn acquire(
        &self,
        sort: SortSpec,
        filter: RowStateFilter,
        predicate: Option<RowPredicate>,
        comparer: Option<RowComparer>,
        rows: &[Rc<DataRow>],
        store: &RecordStore,
    ) -> Result<Rc<SortedIndex>> {
        filter.validate()?;
        for field in sort.fields() {
            if field.column >= store.schema().len() {
                return Err(Error::SortColumnOutOfRange {
                    column: field.column,
                });
            }
        }

        let shareable = predicate.is_none() && comparer.is_none();
        if shareable {
            let snapshot = self.snapshot();
            for index in snapshot.iter() {
                if index.matches(&sort, filter) && index.ref_count() >= 1 {
                    index.add_ref();
                    debug!(refs = index.ref_count(), "sharing live index");
                    return Ok(index.clone());
                }
            }
        }

        let index = Rc::new(SortedIndex::new(sort, filter, predicate, comparer)?);
        index.rebuild(rows, store)?;
        index.add_ref();

        let mut live = self.live.write();
        let mut set: Vec<Rc<SortedIndex>> = (**live).clone();
        set.push(index.clone());
        *live = Arc::new(set);
        debug!(live = live.len(), shareable, "registered new index");

        Ok(index)
    }

    /// Take an extra reference on an already-acquired index
    pub fn add_ref(&self, index: &Rc<SortedIndex>) -> usize {
        index.add_ref()
    }

    /// Drop one reference; the last one evicts the index
    ///
    /// After eviction the tree is gone with the index; a later
    /// acquisition with the same shape rebuilds from scratch.
    pub fn release(&self, index: &Rc<SortedIndex>) -> usize {
        if index.ref_count() == 0 {
            warn!("release of an index with no outstanding references");
            return 0;
        }
        let refs = index.release_ref();
        if refs == 0 {
            let mut live = self.live.write();
            let set: Vec<Rc<SortedIndex>> = live
                .iter()
                .filter(|i| !Rc::ptr_eq(i, index))
                .cloned()
                .collect();
            *live = Arc::new(set);
            debug!(live = live.len(), "evicted unreferenced index");
        }
        refs
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::new()
    }
}
