// src/source/mod.rs
pub mod pdf;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::extractors::layout::ColumnBands;
use crate::utils::error::SourceError;

pub use pdf::PdfTokenSource;

// --- Geometry ---

/// A positioned unit of text. Top-left origin, `y` grows downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub page_index: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, x: f64, y: f64, width: f64, height: f64, page_index: usize) -> Self {
        Self { text: text.into(), x, y, width, height, page_index }
    }

    pub fn x_center(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn y_center(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Zero-area or blank tokens are rendering noise.
    pub fn has_geometry(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && !self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

/// What a source knows about the transaction table on one page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRegion {
    /// The source does not detect tables; the layout's fixed box applies.
    #[default]
    Unknown,
    /// The page carries no transaction table (cover pages, summaries).
    Absent,
    Present {
        bbox: Rect,
        #[serde(default)]
        bands: Option<ColumnBands>,
    },
}

// --- Source Boundary ---

/// Supplies positioned tokens for the pages of one document.
pub trait TokenSource {
    fn page_count(&self) -> usize;

    /// Tokens in document-native order.
    fn page_tokens(&self, page_index: usize) -> Result<Vec<Token>, SourceError>;

    fn table_region(&self, _page_index: usize) -> Result<TableRegion, SourceError> {
        Ok(TableRegion::Unknown)
    }
}

/// Serialized form of a token dump file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenDump {
    pub pages: Vec<DumpPage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DumpPage {
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub table: TableRegion,
}

/// Pages of tokens held in memory, loaded from a JSON token dump or built in code.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenSource {
    pages: Vec<DumpPage>,
}

impl MemoryTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page; token page indices are rewritten to the page's position.
    pub fn push_page(&mut self, tokens: Vec<Token>, table: TableRegion) {
        let page_index = self.pages.len();
        let tokens = tokens
            .into_iter()
            .map(|t| Token { page_index, ..t })
            .collect();
        self.pages.push(DumpPage { tokens, table });
    }

    pub fn from_dump(dump: TokenDump) -> Self {
        let mut source = Self::new();
        for page in dump.pages {
            source.push_page(page.tokens, page.table);
        }
        source
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SourceError> {
        let raw = fs::read_to_string(path)?;
        let dump: TokenDump = serde_json::from_str(&raw)?;
        tracing::debug!("Loaded token dump {} with {} pages", path.display(), dump.pages.len());
        Ok(Self::from_dump(dump))
    }

    fn page(&self, page_index: usize) -> Result<&DumpPage, SourceError> {
        self.pages.get(page_index).ok_or(SourceError::PageOutOfRange(page_index))
    }
}

impl TokenSource for MemoryTokenSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_tokens(&self, page_index: usize) -> Result<Vec<Token>, SourceError> {
        Ok(self.page(page_index)?.tokens.clone())
    }

    fn table_region(&self, page_index: usize) -> Result<TableRegion, SourceError> {
        Ok(self.page(page_index)?.table.clone())
    }
}

// --- Format Dispatch ---

/// Document formats the extractor can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    TokenDump,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "json" => Some(DocumentFormat::TokenDump),
            _ => None,
        }
    }
}

/// Opens a document with the source matching its extension.
pub fn open_document(path: &Path) -> Result<Box<dyn TokenSource>, SourceError> {
    match DocumentFormat::from_path(path) {
        Some(DocumentFormat::Pdf) => Ok(Box::new(PdfTokenSource::open(path)?)),
        Some(DocumentFormat::TokenDump) => Ok(Box::new(MemoryTokenSource::from_json_file(path)?)),
        None => Err(SourceError::UnsupportedFormat(path.display().to_string())),
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_detection_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_path(&PathBuf::from("a/Statement.PDF")), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_path(&PathBuf::from("dump.json")), Some(DocumentFormat::TokenDump));
        assert_eq!(DocumentFormat::from_path(&PathBuf::from("notes.txt")), None);
        assert_eq!(DocumentFormat::from_path(&PathBuf::from("no_extension")), None);
    }

    #[test]
    fn test_token_dump_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statement.json");
        let json = r#"{
            "pages": [
                { "tokens": [ { "text": "12", "x": 30.0, "y": 320.0, "width": 10.0, "height": 8.0 } ] },
                { "tokens": [], "table": "absent" },
                { "tokens": [], "table": { "present": { "bbox": { "x0": 0.0, "y0": 0.0, "x1": 100.0, "y1": 100.0 } } } }
            ]
        }"#;
        std::fs::write(&path, json).unwrap();

        let source = MemoryTokenSource::from_json_file(&path).unwrap();
        assert_eq!(source.page_count(), 3);
        let tokens = source.page_tokens(0).unwrap();
        assert_eq!(tokens[0].text, "12");
        assert_eq!(tokens[0].page_index, 0);
        assert_eq!(source.table_region(0).unwrap(), TableRegion::Unknown);
        assert_eq!(source.table_region(1).unwrap(), TableRegion::Absent);
        assert!(matches!(source.table_region(2).unwrap(), TableRegion::Present { bands: None, .. }));
        assert!(matches!(source.page_tokens(3), Err(SourceError::PageOutOfRange(3))));
    }

    #[test]
    fn test_push_page_rewrites_page_index() {
        let mut source = MemoryTokenSource::new();
        source.push_page(vec![Token::new("a", 0.0, 0.0, 1.0, 1.0, 7)], TableRegion::Unknown);
        source.push_page(vec![Token::new("b", 0.0, 0.0, 1.0, 1.0, 7)], TableRegion::Unknown);
        assert_eq!(source.page_tokens(1).unwrap()[0].page_index, 1);
    }

    #[test]
    fn test_open_document_rejects_unknown_extension() {
        let result = open_document(Path::new("statement.docx"));
        assert!(matches!(result, Err(SourceError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_token_geometry_checks() {
        assert!(Token::new("x", 0.0, 0.0, 2.0, 2.0, 0).has_geometry());
        assert!(!Token::new("x", 0.0, 0.0, 0.0, 2.0, 0).has_geometry());
        assert!(!Token::new("  ", 0.0, 0.0, 2.0, 2.0, 0).has_geometry());
    }
}
