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

//! # Rowdex - versioned-row tabular core
//!
//! Rowdex is the indexing and versioned-row engine of an in-memory
//! tabular data store: rows carry up to three physical value snapshots
//! (original, current, proposed), and any number of live sorted views
//! are maintained incrementally over them.
//!
//! ## Key features
//!
//! - **Multi-version rows** - original/current/proposed record slots with
//!   a derived lifecycle state and explicit edit, accept and reject
//!   transitions
//! - **Order-statistics indexes** - red-black trees with subtree sizes:
//!   O(log n) insert, delete, key search and rank, stable duplicate
//!   ordering, O(1) uniqueness checks
//! - **Index sharing** - structurally equal sort/mask requests share one
//!   physical index through a reference-counted, copy-on-write registry
//! - **Live change events** - ItemAdded/ItemDeleted/ItemChanged/
//!   ItemMoved/Reset notifications with safe mutation-during-dispatch
//!   listener semantics
//!
//! ## Quick start
//!
//! ```rust
//! use rowdex::core::{DataType, RowStateFilter, SchemaBuilder, Value};
//! use rowdex::storage::{SortField, SortSpec, Table};
//!
//! let schema = SchemaBuilder::new("people")
//!     .add("name", DataType::Text)
//!     .add("age", DataType::Integer)
//!     .build();
//! let mut table = Table::new("people", schema);
//!
//! for (name, age) in [("carol", 30), ("alice", 10), ("bob", 20)] {
//!     let row = table.new_row();
//!     table.set_value(&row, 0, Value::text(name)).unwrap();
//!     table.set_value(&row, 1, Value::integer(age)).unwrap();
//!     table.add_row(&row).unwrap();
//! }
//!
//! let by_age = table
//!     .acquire_index(
//!         SortSpec::new(vec![SortField::ascending(1)]),
//!         RowStateFilter::CURRENT_ROWS,
//!         None,
//!         None,
//!     )
//!     .unwrap();
//!
//! let ages: Vec<i64> = by_age
//!     .cursor(0)
//!     .map(|e| table.store().get(e.record, 1).unwrap().as_int64().unwrap())
//!     .collect();
//! assert_eq!(ages, vec![10, 20, 30]);
//! table.release_index(&by_age);
//! ```
//!
//! ## Modules
//!
//! - [`core`] - fundamental types ([`core::Value`], [`core::Schema`],
//!   [`core::RowState`], [`core::Error`])
//! - [`storage`] - the engine ([`storage::Table`],
//!   [`storage::SortedIndex`], [`storage::IndexRegistry`],
//!   [`storage::RecordStore`])

pub mod core;
pub mod storage;

// Flat re-exports of the types most callers touch
pub use crate::core::{
    DataType, Error, RecordId, RecordVersion, Result, RowState, RowStateFilter, Schema,
    SchemaBuilder, SchemaColumn, SortDirection, Value, NO_RECORD,
};
pub use crate::storage::{
    DataRow, IndexEvent, IndexListener, IndexRegistry, RecordStore, SortField, SortSpec,
    SortedIndex, Table, TableOptions,
};
