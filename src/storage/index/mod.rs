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

//! Index structures for Rowdex
//!
//! - [`RecordTree`] - order-statistics red-black tree over record entries
//! - [`SortedIndex`] - incrementally maintained sorted view with row-state
//!   mask, optional predicate and duplicate tracking
//! - [`IndexRegistry`] - per-table sharing and lifecycle of live indexes

pub mod registry;
pub mod sorted;
pub mod tree;

// Re-export main types
pub use registry::{IndexRegistry, IndexSet};
pub use sorted::{IndexCursor, RowComparer, RowPredicate, SortField, SortSpec, SortedIndex};
pub use tree::{IndexEntry, RecordTree, TreeCursor};
