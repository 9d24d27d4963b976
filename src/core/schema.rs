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

//! Schema definition for Rowdex tables
//!
//! The index engine consumes the schema only for column arity, data
//! types (key coercion) and nullability; constraint declarations live
//! with the caller.

use super::error::{Error, Result};
use super::types::DataType;

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    /// Column name
    pub name: String,
    /// Column data type
    pub data_type: DataType,
    /// Whether NULL is a legal stored value
    pub nullable: bool,
}

impl SchemaColumn {
    /// Create a new non-nullable column
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }

    /// Create a new nullable column
    pub fn nullable(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// Table schema: an ordered list of columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    columns: Vec<SchemaColumn>,
}

impl Schema {
    /// Create a schema from a column list
    pub fn new(name: impl Into<String>, columns: Vec<SchemaColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// All columns in declaration order
    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    /// Column by position
    pub fn column(&self, index: usize) -> Result<&SchemaColumn> {
        self.columns
            .get(index)
            .ok_or(Error::ColumnIndexOutOfBounds { index })
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }
}

/// Builder for constructing schemas fluently
pub struct SchemaBuilder {
    name: String,
    columns: Vec<SchemaColumn>,
}

impl SchemaBuilder {
    /// Start a schema for the named table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a non-nullable column
    pub fn add(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(SchemaColumn::new(name, data_type));
        self
    }

    /// Add a nullable column
    pub fn add_nullable(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(SchemaColumn::nullable(name, data_type));
        self
    }

    /// Finish the schema
    pub fn build(self) -> Schema {
        Schema::new(self.name, self.columns)
    }
}
