// src/runner.rs
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::extractors::{extract_document, DocumentResult, StatementLayout, ValidatorConfig};
use crate::source::{open_document, DocumentFormat};
use crate::storage::StorageManager;
use crate::utils::AppError;

/// How outputs are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputMode {
    /// One input file, one CSV next to it.
    Single,
    /// Every document in a directory appended to one CSV.
    Combined,
    /// One CSV per document in a directory.
    Separate,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub mode: Option<OutputMode>,
    pub debug: bool,
    pub layout: StatementLayout,
    pub validator: ValidatorConfig,
    pub jobs: usize,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub documents: usize,
    pub skipped: usize,
    pub transactions: usize,
    pub warnings: usize,
    pub outputs: Vec<PathBuf>,
}

// --- Input Handling ---

/// Picks the effective output mode for an input path.
pub fn resolve_mode(input: &Path, requested: Option<OutputMode>) -> Result<OutputMode, AppError> {
    if input.is_file() {
        if let Some(mode @ (OutputMode::Combined | OutputMode::Separate)) = requested {
            tracing::info!("Input is a single file; {:?} mode behaves like single mode", mode);
        }
        return Ok(OutputMode::Single);
    }
    if input.is_dir() {
        return match requested {
            Some(OutputMode::Single) => Err(AppError::Config(format!(
                "single mode needs a file, but {} is a directory",
                input.display()
            ))),
            Some(mode) => Ok(mode),
            None => Ok(OutputMode::Combined),
        };
    }
    Err(AppError::UnreadableInput {
        path: input.to_path_buf(),
        reason: "path is neither a file nor a directory".to_string(),
    })
}

/// Statement documents directly inside `dir`, sorted by file name.
pub fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir).map_err(|e| AppError::UnreadableInput {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut documents = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || DocumentFormat::from_path(&path).is_none() {
            continue;
        }
        // Debug metadata written by earlier runs
        if path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with("_meta.json")) {
            continue;
        }
        documents.push(path);
    }
    documents.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    tracing::info!("Found {} statement documents in {}", documents.len(), dir.display());
    Ok(documents)
}

/// Opens and extracts one document. Failing to open it is a path-level error.
pub fn extract_path(
    path: &Path,
    layout: &StatementLayout,
    validator: &ValidatorConfig,
) -> Result<DocumentResult, AppError> {
    tracing::info!("Processing {}", path.display());
    let source = open_document(path).map_err(|e| AppError::UnreadableInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(extract_document(source.as_ref(), layout, validator))
}

/// Extracts documents on blocking workers, at most `jobs` at a time.
/// Results come back in input order.
pub async fn extract_all(
    paths: Vec<PathBuf>,
    layout: Arc<StatementLayout>,
    validator: ValidatorConfig,
    jobs: usize,
) -> Vec<(PathBuf, Result<DocumentResult, AppError>)> {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let mut handles = Vec::with_capacity(paths.len());

    for path in paths {
        let layout = Arc::clone(&layout);
        let semaphore = Arc::clone(&semaphore);
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| AppError::Processing(e.to_string()))?;
            tokio::task::spawn_blocking(move || extract_path(&task_path, &layout, &validator))
                .await
                .map_err(|e| AppError::Processing(format!("extraction worker failed: {}", e)))?
        });
        handles.push((path, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (path, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(AppError::Processing(format!("extraction task failed: {}", e))),
        };
        results.push((path, result));
    }
    results
}

// --- Run ---

/// Extracts every input document and writes outputs for the chosen mode.
pub async fn run(config: RunConfig) -> Result<RunSummary, AppError> {
    let mode = resolve_mode(&config.input, config.mode)?;
    let storage = StorageManager::new(config.output_dir.as_deref())?;

    let paths = match mode {
        OutputMode::Single => vec![config.input.clone()],
        OutputMode::Combined | OutputMode::Separate => discover_documents(&config.input)?,
    };
    if paths.is_empty() {
        return Err(AppError::NoDocuments(config.input.clone()));
    }

    let layout = Arc::new(config.layout.clone());
    let results = extract_all(paths, Arc::clone(&layout), config.validator, config.jobs).await;

    let mut summary = RunSummary::default();
    let mut documents: Vec<(PathBuf, DocumentResult)> = Vec::new();
    for (path, result) in results {
        match result {
            Ok(document) => {
                tracing::info!(
                    "{}: {} pages, {} row candidates, {} transactions, {} warnings",
                    path.display(),
                    document.page_count,
                    document.row_candidates,
                    document.transactions.len(),
                    document.warnings.len()
                );
                summary.transactions += document.transactions.len();
                summary.warnings += document.warnings.len();
                documents.push((path, document));
            }
            Err(e) if mode == OutputMode::Single => return Err(e),
            Err(e) => {
                tracing::error!("Skipping {}: {}", path.display(), e);
                summary.skipped += 1;
            }
        }
    }
    summary.documents = documents.len();
    if documents.is_empty() {
        return Err(AppError::NoDocuments(config.input.clone()));
    }

    match mode {
        OutputMode::Single | OutputMode::Separate => {
            let mut claimed: HashSet<PathBuf> = HashSet::new();
            for (path, document) in &documents {
                if !document.has_transactions() {
                    tracing::warn!("No transactions to export for {}", path.display());
                    continue;
                }
                let out = storage.document_output_path(path);
                // `stmt.pdf` and `stmt.json` both map to `stmt.csv`; first in file-name order wins
                if !claimed.insert(out.clone()) {
                    tracing::error!(
                        "Skipping {}: its output {} is already taken by another document",
                        path.display(),
                        out.display()
                    );
                    summary.skipped += 1;
                    continue;
                }
                let written = storage
                    .write_csv(&out, &[document.transactions.as_slice()], config.debug)
                    .and_then(|_| {
                        if config.debug {
                            storage.save_run_metadata(&out, &layout.name, &[(path.as_path(), document)])?;
                        }
                        Ok(())
                    });
                match written {
                    Ok(()) => summary.outputs.push(out),
                    Err(e) if mode == OutputMode::Single => return Err(e.into()),
                    Err(e) => {
                        tracing::error!("Failed to write {}: {}", out.display(), e);
                        summary.skipped += 1;
                    }
                }
            }
        }
        OutputMode::Combined => {
            let out = storage.combined_output_path(&config.input);
            if summary.transactions == 0 {
                tracing::warn!("No transactions to export for {}", out.display());
            } else {
                let blocks: Vec<&[_]> = documents.iter().map(|(_, d)| d.transactions.as_slice()).collect();
                storage.write_csv(&out, &blocks, config.debug)?;
                if config.debug {
                    let described: Vec<(&Path, &DocumentResult)> =
                        documents.iter().map(|(p, d)| (p.as_path(), d)).collect();
                    storage.save_run_metadata(&out, &layout.name, &described)?;
                }
                summary.outputs.push(out);
            }
        }
    }

    Ok(summary)
}
