use std::fmt;

use serde::{Deserialize, Serialize};

/// A single unusable data row. Collected during parsing and surfaced as
/// preview warnings; the row itself is left out of the preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowParseError {
    /// 1-based line number in the source payload (the header is line 1).
    pub line: u64,
    pub reason: String,
}

impl fmt::Display for RowParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    /// Header row unusable (missing required column, unreadable payload).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// One or more rows failed to parse. Only raised by strict parsing;
    /// preview reports these as warnings instead.
    #[error("{} row(s) failed to parse: {}", .0.len(), join_rows(.0))]
    RowParse(Vec<RowParseError>),

    /// Confirm called for a batch whose history already exists.
    #[error("batch {batch_id} has already been confirmed")]
    DuplicateBatch { batch_id: String },

    /// Data store failure during confirm. Nothing was applied.
    #[error("transaction failed for batch {batch_id}: {message}")]
    TransactionFailure { batch_id: String, message: String },

    #[error("batch {batch_id} has no line items to confirm")]
    EmptyBatch { batch_id: String },

    /// A confirm line failed validation (index is 0-based within the request).
    #[error("line {index}: {reason}")]
    InvalidLine { index: usize, reason: String },

    #[error("illegal batch transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("config parse error: {0}")]
    ConfigParse(String),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("rules parse error: {0}")]
    RulesParse(String),

    #[error("rules validation error: {0}")]
    RulesValidation(String),
}

fn join_rows(rows: &[RowParseError]) -> String {
    rows.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_errors_are_listed_together() {
        let err = ReceiptError::RowParse(vec![
            RowParseError { line: 3, reason: "quantity must be > 0".into() },
            RowParseError { line: 5, reason: "price 'abc' is not a number".into() },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 row(s) failed to parse"));
        assert!(msg.contains("line 3: quantity must be > 0"));
        assert!(msg.contains("line 5"));
    }

    #[test]
    fn duplicate_batch_names_the_batch() {
        let err = ReceiptError::DuplicateBatch { batch_id: "b-1".into() };
        assert_eq!(err.to_string(), "batch b-1 has already been confirmed");
    }
}
