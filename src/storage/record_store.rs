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

//! Dense record storage addressed by integer handle
//!
//! Column values live column-major in flat vectors; a record handle is
//! an index into every column at once. Freed handles go on a free list
//! and are reused by the next allocation. The index layer never touches
//! raw values directly - it compares through [`compare_records`] and
//! [`compare_to_value`], which is what makes handle-based tree nodes
//! possible.
//!
//! [`compare_records`]: RecordStore::compare_records
//! [`compare_to_value`]: RecordStore::compare_to_value

use std::cmp::Ordering;

use crate::core::{DataType, Error, RecordId, Result, Schema, Value, NO_RECORD};

/// Column-major storage of record value snapshots
#[derive(Debug)]
pub struct RecordStore {
    schema: Schema,
    /// columns[c][r] = value of column c at record r
    columns: Vec<Vec<Value>>,
    in_use: Vec<bool>,
    free: Vec<RecordId>,
    live: usize,
}

impl RecordStore {
    /// Create an empty store for the given schema
    pub fn new(schema: Schema) -> Self {
        Self::with_capacity(schema, 0)
    }

    /// Create a store with pre-allocated capacity for `capacity` records
    pub fn with_capacity(schema: Schema, capacity: usize) -> Self {
        let columns = (0..schema.len())
            .map(|_| Vec::with_capacity(capacity))
            .collect();
        Self {
            schema,
            columns,
            in_use: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// The schema this store was built against
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of live (allocated, not freed) records
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Returns true if the handle names a live record
    pub fn is_allocated(&self, record: RecordId) -> bool {
        record >= 0 && (record as usize) < self.in_use.len() && self.in_use[record as usize]
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a fresh record with every column NULL
    pub fn allocate(&mut self) -> RecordId {
        let record = match self.free.pop() {
            Some(r) => {
                self.in_use[r as usize] = true;
                for (c, column) in self.columns.iter_mut().enumerate() {
                    column[r as usize] = Value::null(self.schema.columns()[c].data_type);
                }
                r
            }
            None => {
                let r = self.in_use.len() as RecordId;
                self.in_use.push(true);
                for (c, column) in self.columns.iter_mut().enumerate() {
                    column.push(Value::null(self.schema.columns()[c].data_type));
                }
                r
            }
        };
        self.live += 1;
        record
    }

    /// Allocate a record as a copy of an existing one
    pub fn allocate_copy(&mut self, from: RecordId) -> Result<RecordId> {
        if !self.is_allocated(from) {
            return Err(Error::RecordNotAllocated(from));
        }
        let record = self.allocate();
        for column in self.columns.iter_mut() {
            let v = column[from as usize].clone();
            column[record as usize] = v;
        }
        Ok(record)
    }

    /// Return a record to the free list
    ///
    /// The slot's values stay in place until the handle is reused, so a
    /// comparison against a just-freed record (during a delete search
    /// that was notified after the fact) still sees the old shape.
    pub fn free(&mut self, record: RecordId) -> Result<()> {
        if !self.is_allocated(record) {
            return Err(Error::RecordNotAllocated(record));
        }
        self.in_use[record as usize] = false;
        self.free.push(record);
        self.live -= 1;
        Ok(())
    }

    // =========================================================================
    // Value access
    // =========================================================================

    /// Read a column value
    pub fn get(&self, record: RecordId, column: usize) -> Result<&Value> {
        self.check_record(record)?;
        self.columns
            .get(column)
            .map(|c| &c[record as usize])
            .ok_or(Error::ColumnIndexOutOfBounds { index: column })
    }

    /// Write a column value, coercing to the column's declared type
    pub fn set(&mut self, record: RecordId, column: usize, value: Value) -> Result<()> {
        self.check_record(record)?;
        let col = self.schema.column(column)?;
        if value.is_null() && !col.nullable {
            return Err(Error::not_null_constraint(col.name.clone()));
        }
        let coerced = value.coerce(col.data_type)?;
        self.columns[column][record as usize] = coerced;
        Ok(())
    }

    /// Returns true if the column value at `record` is NULL
    pub fn is_null(&self, record: RecordId, column: usize) -> bool {
        self.get(record, column).map(|v| v.is_null()).unwrap_or(true)
    }

    // =========================================================================
    // Comparison primitives
    // =========================================================================

    /// Compare one column of two records
    ///
    /// Both records hold values already coerced to the column type, so
    /// this is a total order (NULL first).
    pub fn compare_records(&self, column: usize, a: RecordId, b: RecordId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        debug_assert!(a >= 0 && b >= 0, "comparing an absent record handle");
        let col = &self.columns[column];
        col[a as usize].total_cmp(&col[b as usize])
    }

    /// Compare one column of a record against a caller-supplied value
    ///
    /// The value must already be coerced (see [`coerce_key`](Self::coerce_key)).
    pub fn compare_to_value(&self, column: usize, record: RecordId, value: &Value) -> Ordering {
        self.columns[column][record as usize].total_cmp(value)
    }

    /// Coerce a search-key value to a column's comparable representation
    ///
    /// Identical to the assignment path, so key lookups and stored
    /// values meet in the same representation.
    pub fn coerce_key(&self, column: usize, value: &Value) -> Result<Value> {
        let col = self.schema.column(column)?;
        value.coerce(col.data_type)
    }

    fn check_record(&self, record: RecordId) -> Result<()> {
        if record == NO_RECORD || !self.is_allocated(record) {
            return Err(Error::RecordNotAllocated(record));
        }
        Ok(())
    }
}
