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

//! Storage layer for Rowdex
//!
//! This module contains the engine components:
//! - Record store (dense handle-addressed value snapshots)
//! - Versioned rows and their lifecycle
//! - Index structures and the per-table sharing registry
//! - Change notification bus
//! - Table configuration

pub mod config;
pub mod index;
pub mod listener;
pub mod record_store;
pub mod row;
pub mod table;

// Re-export main types at storage level for convenience
pub use config::TableOptions;
pub use index::{
    IndexCursor, IndexEntry, IndexRegistry, IndexSet, RecordTree, RowComparer, RowPredicate,
    SortField, SortSpec, SortedIndex, TreeCursor,
};
pub use listener::{IndexEvent, IndexListener, ListenerList};
pub use record_store::RecordStore;
pub use row::DataRow;
pub use table::Table;
