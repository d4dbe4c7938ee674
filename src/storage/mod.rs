// src/storage/mod.rs
pub mod emitter;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::extractors::balance::Transaction;
use crate::extractors::document::DocumentResult;
use crate::utils::error::StorageError;

const CSV_EXTENSION: &str = "csv";
const COMBINED_SUFFIX: &str = "_combined";

/// Ordered CSV writer: one header, then blocks of rows appended whole.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    debug: bool,
    rows: usize,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W, debug: bool) -> Result<Self, StorageError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(emitter::header(debug))?;
        Ok(Self { writer, debug, rows: 0 })
    }

    /// Appends one document's transactions as a contiguous block.
    pub fn append_block(&mut self, transactions: &[Transaction]) -> Result<(), StorageError> {
        for tx in transactions {
            self.writer.write_record(emitter::record(tx, self.debug))?;
        }
        self.rows += transactions.len();
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes and hands back the underlying writer.
    pub fn finish(self) -> Result<W, StorageError> {
        self.writer
            .into_inner()
            .map_err(|e| StorageError::IoError(std::io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

pub struct StorageManager {
    output_dir: Option<PathBuf>,
}

impl StorageManager {
    /// Creates a new StorageManager; outputs land next to their inputs unless `output_dir` is set.
    pub fn new(output_dir: Option<&Path>) -> Result<Self, StorageError> {
        if let Some(dir) = output_dir {
            // Create the output directory if it doesn't exist
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(StorageError::IoError)?;
            }
        }
        Ok(Self { output_dir: output_dir.map(Path::to_path_buf) })
    }

    fn relocate(&self, default: PathBuf) -> PathBuf {
        match (&self.output_dir, default.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => default,
        }
    }

    /// `statement.pdf` -> `statement.csv`
    pub fn document_output_path(&self, document: &Path) -> PathBuf {
        self.relocate(document.with_extension(CSV_EXTENSION))
    }

    /// `statements/` -> `statements/statements_combined.csv`
    pub fn combined_output_path(&self, dir: &Path) -> PathBuf {
        let name = dir
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "statements".to_string());
        self.relocate(dir.join(format!("{}{}.{}", name, COMBINED_SUFFIX, CSV_EXTENSION)))
    }

    pub fn create_csv(&self, path: &Path, debug: bool) -> Result<CsvSink<fs::File>, StorageError> {
        let file = fs::File::create(path).map_err(StorageError::IoError)?;
        CsvSink::new(file, debug)
    }

    /// Writes one CSV holding the given blocks in order. Returns the number of rows written.
    pub fn write_csv(&self, path: &Path, blocks: &[&[Transaction]], debug: bool) -> Result<usize, StorageError> {
        let mut sink = self.create_csv(path, debug)?;
        for block in blocks {
            sink.append_block(block)?;
        }
        let rows = sink.rows();
        sink.finish()?;
        tracing::info!("Wrote {} transactions to {}", rows, path.display());
        Ok(rows)
    }

    /// Saves metadata about a run next to its CSV in JSON format.
    pub fn save_run_metadata(
        &self,
        csv_path: &Path,
        layout_name: &str,
        documents: &[(&Path, &DocumentResult)],
    ) -> Result<PathBuf, StorageError> {
        let stem = csv_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "statement".to_string());
        let file_path = csv_path.with_file_name(format!("{}_meta.json", stem));

        let documents: Vec<serde_json::Value> = documents
            .iter()
            .map(|(path, result)| {
                let warnings: Vec<serde_json::Value> = result
                    .warnings
                    .iter()
                    .map(|w| serde_json::json!({ "kind": w.kind(), "message": w.to_string() }))
                    .collect();
                serde_json::json!({
                    "document": path.display().to_string(),
                    "page_count": result.page_count,
                    "row_candidates": result.row_candidates,
                    "transactions": result.transactions.len(),
                    "warnings": warnings,
                })
            })
            .collect();

        let metadata = serde_json::json!({
            "tool": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "layout": layout_name,
            "output": csv_path.display().to_string(),
            "documents": documents,
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, metadata_str).map_err(StorageError::IoError)?;

        tracing::info!("Saved metadata to {}", file_path.display());
        Ok(file_path)
    }
}
