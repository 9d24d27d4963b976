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

//! Table configuration
//!

/// Sizing hints for a table
///
/// All hints are optional; zero means "grow as needed".
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Records to pre-allocate in the store
    /// Default: 0
    pub record_capacity: usize,

    /// Expected row count, used to size the row collection
    /// Default: 0
    pub expected_rows: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            record_capacity: 0,
            expected_rows: 0,
        }
    }
}

impl TableOptions {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record store pre-allocation
    pub fn with_record_capacity(mut self, capacity: usize) -> Self {
        self.record_capacity = capacity;
        self
    }

    /// Sets the expected row count
    pub fn with_expected_rows(mut self, rows: usize) -> Self {
        self.expected_rows = rows;
        self
    }
}
