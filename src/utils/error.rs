// src/utils/error.rs
use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("PDF decoding failed: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid token dump: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Page {0} is out of range")]
    PageOutOfRange(usize),
}

/// A row carried a date (or a balance) but its numeric bands could not be read.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed row {row_index} on page {}: {reason} (raw: '{raw_text}')", .page_index + 1)]
pub struct MalformedRowError {
    pub page_index: usize,
    pub row_index: usize,
    pub raw_text: String,
    pub reason: String,
}

/// The printed balance disagrees with previous balance + credit - debit.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Balance mismatch at row {row_index} on page {}: expected {expected}, statement shows {actual}", .page_index + 1)]
pub struct BalanceMismatchWarning {
    pub row_index: usize,
    pub page_index: usize,
    pub expected: Decimal,
    pub actual: Decimal,
}

/// Non-fatal findings attached to a document's result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentWarning {
    #[error(transparent)]
    MalformedRow(#[from] MalformedRowError),

    #[error(transparent)]
    BalanceMismatch(#[from] BalanceMismatchWarning),

    #[error("Row {row_index} on page {} prints no balance and no earlier balance exists; carried from zero", .page_index + 1)]
    UnseededBalance { row_index: usize, page_index: usize },

    #[error("Page {} could not be read: {reason}", .page_index + 1)]
    PageUnreadable { page_index: usize, reason: String },

    #[error("Description '{text}' from row {row_index} on page {} has no transaction to attach to", .page_index + 1)]
    OrphanedDescription { row_index: usize, page_index: usize, text: String },

    #[error("No transactions found in document")]
    NoTransactionsFound,
}

impl DocumentWarning {
    /// Short machine-readable tag used in debug metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentWarning::MalformedRow(_) => "malformed_row",
            DocumentWarning::BalanceMismatch(_) => "balance_mismatch",
            DocumentWarning::UnseededBalance { .. } => "unseeded_balance",
            DocumentWarning::PageUnreadable { .. } => "page_unreadable",
            DocumentWarning::OrphanedDescription { .. } => "orphaned_description",
            DocumentWarning::NoTransactionsFound => "no_transactions_found",
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Unreadable input {}: {reason}", .path.display())]
    UnreadableInput { path: PathBuf, reason: String },

    #[error("No readable statement documents found in {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("Token source failed: {0}")]
    Source(#[from] SourceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
