// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations recorded in the write-ahead log

use serde::{Deserialize, Serialize};
use std::fmt;

/// The intent of a WAL entry against its target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalOperation {
    /// A new document was created
    Insert,
    /// An existing document was replaced
    Update,
    /// The document was removed
    Delete,
}

impl WalOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalOperation::Insert => "INSERT",
            WalOperation::Update => "UPDATE",
            WalOperation::Delete => "DELETE",
        }
    }

    /// Whether replaying this operation writes the payload as file content
    pub fn writes_content(&self) -> bool {
        matches!(self, WalOperation::Insert | WalOperation::Update)
    }
}

impl fmt::Display for WalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
