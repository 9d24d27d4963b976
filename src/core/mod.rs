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

//! Core types and definitions for Rowdex
//!
//! This module contains the fundamental types used throughout the engine:
//!
//! - [`DataType`] - column data types
//! - [`Value`] - runtime values with type information and coercion
//! - [`RecordId`] / [`RecordVersion`] - record handles and version slots
//! - [`RowState`] / [`RowStateFilter`] - derived row lifecycle and masks
//! - [`Schema`] / [`SchemaColumn`] - column definitions
//! - [`Error`] - error types for all operations

pub mod error;
pub mod schema;
pub mod types;
pub mod value;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use schema::{Schema, SchemaBuilder, SchemaColumn};
pub use types::{
    DataType, RecordId, RecordVersion, RowState, RowStateFilter, SortDirection, NO_RECORD,
};
pub use value::{parse_timestamp, Value};
