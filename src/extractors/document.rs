// src/extractors/document.rs

// --- Imports ---
use chrono::NaiveDate;

use crate::extractors::balance::{validate_row, RunningBalanceState, Transaction, ValidatorConfig};
use crate::extractors::fields::{classify_row, parse_date, Classification};
use crate::extractors::layout::StatementLayout;
use crate::extractors::rows::{assemble_rows, cluster_lines};
use crate::source::{TableRegion, Token, TokenSource};
use crate::utils::error::DocumentWarning;

// --- Data Structures ---

/// Everything extracted from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentResult {
    pub page_count: usize,
    pub row_candidates: usize,
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<DocumentWarning>,
}

impl DocumentResult {
    pub fn has_transactions(&self) -> bool {
        !self.transactions.is_empty()
    }
}

// --- Pipeline ---

/// Description text from a dated line without amounts, waiting for the amount line below it.
#[derive(Debug)]
struct PendingDescription {
    text: String,
    row_index: usize,
    page_index: usize,
}

impl PendingDescription {
    fn orphaned(self) -> DocumentWarning {
        let warning = DocumentWarning::OrphanedDescription {
            row_index: self.row_index,
            page_index: self.page_index,
            text: self.text,
        };
        tracing::warn!("{}", warning);
        warning
    }
}

/// First date printed anywhere on the page, reading lines top to bottom.
fn page_date(tokens: &[Token], layout: &StatementLayout) -> Option<NaiveDate> {
    let width = layout.date_format.split_whitespace().count().max(1);
    cluster_lines(tokens.to_vec(), layout.row_tolerance)
        .iter()
        .flat_map(|line| line.windows(width))
        .find_map(|window| {
            let text = window.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
            parse_date(&text, &layout.date_format)
        })
}

/// Runs row assembly, classification and balance validation over every page in order.
///
/// The running balance and the carried date thread across pages. Page and row problems
/// become warnings; nothing here aborts the document. `row_index` counts row candidates
/// across the whole document and identifies rows in every warning.
pub fn extract_document(
    source: &dyn TokenSource,
    layout: &StatementLayout,
    config: &ValidatorConfig,
) -> DocumentResult {
    let page_count = source.page_count();
    let mut state = RunningBalanceState::default();
    let mut carried_date: Option<NaiveDate> = None;
    let mut pending: Option<PendingDescription> = None;
    let mut row_candidates = 0;
    let mut transactions = Vec::new();
    let mut warnings = Vec::new();

    for page_index in 0..page_count {
        let tokens = match source.page_tokens(page_index) {
            Ok(tokens) => tokens,
            Err(e) => {
                let warning = DocumentWarning::PageUnreadable { page_index, reason: e.to_string() };
                tracing::warn!("{}", warning);
                warnings.push(warning);
                continue;
            }
        };
        let region = match source.table_region(page_index) {
            Ok(region) => region,
            Err(e) => {
                tracing::warn!("Page {}: table detection failed ({}), using layout geometry", page_index + 1, e);
                TableRegion::Unknown
            }
        };

        let (bbox, bands) = match &region {
            TableRegion::Absent => {
                tracing::debug!("Page {}: no table region", page_index + 1);
                continue;
            }
            TableRegion::Unknown => (layout.table_bbox, &layout.bands),
            TableRegion::Present { bbox, bands } => (Some(*bbox), bands.as_ref().unwrap_or(&layout.bands)),
        };

        // Rows above the first dated table row fall back to a date printed elsewhere on the page
        if carried_date.is_none() && layout.carry_dates {
            carried_date = page_date(&tokens, layout);
            if let Some(date) = carried_date {
                tracing::debug!("Page {}: no date carried yet, using page date {}", page_index + 1, date);
            }
        }

        let rows = assemble_rows(tokens, bbox.as_ref(), bands, layout.row_tolerance);

        for row in &rows {
            let row_index = row_candidates;
            row_candidates += 1;

            let mut classified = match classify_row(row, bands, layout, carried_date, row_index) {
                Ok(Classification::Transaction(classified)) => classified,
                Ok(Classification::DateMarker { date, description }) => {
                    carried_date = Some(date);
                    warnings.extend(pending.take().map(PendingDescription::orphaned));
                    if !description.is_empty() {
                        pending = Some(PendingDescription { text: description, row_index, page_index });
                    }
                    continue;
                }
                Ok(Classification::Discarded) => continue,
                Err(e) => {
                    tracing::warn!("{}", e);
                    warnings.push(DocumentWarning::MalformedRow(e));
                    continue;
                }
            };

            if let Some(head) = pending.take() {
                if classified.date_inherited {
                    classified.description = if classified.description.is_empty() {
                        head.text
                    } else {
                        format!("{} {}", head.text, classified.description)
                    };
                } else {
                    warnings.push(head.orphaned());
                }
            }

            carried_date = Some(classified.date);
            if classified.date_inherited {
                tracing::trace!("Row {} inherits date {}", row_index, classified.date);
            }
            tracing::debug!("Parsed row {}: {:?}", row_index, classified);
            let (next, validated) = validate_row(state, classified, row_index, config);
            state = next;
            transactions.extend(validated.transaction);
            warnings.extend(validated.warning);
        }
        tracing::info!("Page {}: {} rows, {} transactions so far", page_index + 1, rows.len(), transactions.len());
    }

    warnings.extend(pending.take().map(PendingDescription::orphaned));

    if transactions.is_empty() {
        tracing::warn!("No transactions found across {} pages", page_count);
        warnings.push(DocumentWarning::NoTransactionsFound);
    }

    DocumentResult { page_count, row_candidates, transactions, warnings }
}
