// src/extractors/mod.rs
pub mod balance;
pub mod document;
pub mod fields;
pub mod layout;
pub mod rows;

// Re-export key extraction types for convenience
pub use balance::{MismatchPolicy, ValidatorConfig};
pub use document::{extract_document, DocumentResult};
pub use layout::StatementLayout;
