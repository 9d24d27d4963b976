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

//! Error types for Rowdex
//!
//! This module defines all error types used throughout the engine.
//! Usage errors (caller contract violations) surface synchronously and
//! loudly; invariant violations are [`Error::Internal`] and mean the
//! affected index must be rebuilt, never patched in place. A key lookup
//! with no match is `Ok(None)` at the call site, never an error.

use thiserror::Error;

use super::types::{RecordId, RecordVersion};

/// Result type alias for Rowdex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Rowdex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // =========================================================================
    // Column errors
    // =========================================================================
    /// Column not found in schema
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    /// Column index out of bounds
    #[error("column index {index} out of bounds")]
    ColumnIndexOutOfBounds { index: usize },

    /// NOT NULL constraint violation
    #[error("not null constraint failed for column {column}")]
    NotNullConstraint { column: String },

    // =========================================================================
    // Value errors
    // =========================================================================
    /// Type conversion error
    #[error("type conversion error: cannot convert {from} to {to}")]
    TypeConversion { from: String, to: String },

    // =========================================================================
    // Row errors
    // =========================================================================
    /// Operation on a row that is not attached to the table
    #[error("row is detached from the table")]
    RowDetached,

    /// Operation on a row that was already deleted
    #[error("row already deleted")]
    RowDeleted,

    /// Row belongs to a different table
    #[error("row belongs to a different table")]
    ForeignRow,

    /// BeginEdit while an edit is already open
    #[error("edit already in progress")]
    EditInProgress,

    /// EndEdit/CancelEdit or column assignment without an open edit
    #[error("no edit in progress")]
    NoEditInProgress,

    /// Requested row version has no record
    #[error("row has no {version} version")]
    VersionNotAvailable { version: RecordVersion },

    // =========================================================================
    // Index errors
    // =========================================================================
    /// Row-state mask is empty or carries unknown bits
    #[error("invalid row state filter: {0:#07b}")]
    InvalidRowStateFilter(u8),

    /// Key search against an index with no sort columns
    #[error("index has no sort key configured")]
    NoSortKey,

    /// Search key arity does not match the index key arity
    #[error("search key has {got} values, index expects {expected}")]
    KeyLengthMismatch { expected: usize, got: usize },

    /// Search key contains only NULL values
    #[error("search key contains only NULL values")]
    NullSearchKey,

    /// Sort column outside the schema
    #[error("sort column {column} out of range")]
    SortColumnOutOfRange { column: usize },

    /// Position outside [0, len)
    #[error("position {position} out of range")]
    PositionOutOfRange { position: usize },

    // =========================================================================
    // Record store errors
    // =========================================================================
    /// Record handle does not name an allocated record
    #[error("record {0} is not allocated")]
    RecordNotAllocated(RecordId),

    // =========================================================================
    // Internal errors
    // =========================================================================
    /// Internal invariant violation; the affected index is unusable and
    /// must be rebuilt from a full scan
    #[error("{message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new TypeConversion error
    pub fn type_conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        Error::TypeConversion {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a new NotNullConstraint error
    pub fn not_null_constraint(column: impl Into<String>) -> Self {
        Error::NotNullConstraint {
            column: column.into(),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Check if this is a caller contract violation
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, Error::Internal { .. })
    }

    /// Check if this is an internal invariant violation
    ///
    /// Such an index must not be "healed"; rebuild from a full scan.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::Internal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::ColumnNotFound("age".to_string()).to_string(),
            "column 'age' not found"
        );
        assert_eq!(Error::RowDeleted.to_string(), "row already deleted");
        assert_eq!(Error::EditInProgress.to_string(), "edit already in progress");
        assert_eq!(
            Error::KeyLengthMismatch { expected: 2, got: 1 }.to_string(),
            "search key has 1 values, index expects 2"
        );
        assert_eq!(
            Error::VersionNotAvailable {
                version: RecordVersion::Proposed
            }
            .to_string(),
            "row has no proposed version"
        );
        assert_eq!(
            Error::RecordNotAllocated(7).to_string(),
            "record 7 is not allocated"
        );
    }

    #[test]
    fn test_filter_display_is_binary() {
        let err = Error::InvalidRowStateFilter(0b10101);
        assert_eq!(err.to_string(), "invalid row state filter: 0b10101");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::RowDeleted.is_usage_error());
        assert!(Error::NoSortKey.is_usage_error());
        assert!(!Error::internal("tiebreak collision").is_usage_error());
        assert!(Error::internal("tiebreak collision").is_invariant_violation());
        assert!(!Error::RowDetached.is_invariant_violation());
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(
            Error::ColumnNotFound("a".to_string()),
            Error::ColumnNotFound("a".to_string())
        );
        assert_ne!(Error::RowDeleted, Error::RowDetached);
    }
}
