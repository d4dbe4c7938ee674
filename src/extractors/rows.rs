// src/extractors/rows.rs

// --- Imports ---
use crate::extractors::layout::ColumnBands;
use crate::source::{Rect, Token};

// --- Data Structures ---

/// Tokens believed to form one logical table row, possibly spanning several visual lines.
///
/// Each visual line is sorted left to right and lines are kept top to bottom,
/// so walking `lines` in order is reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCandidate {
    pub lines: Vec<Vec<Token>>,
    pub y_band: (f64, f64),
    pub page_index: usize,
}

impl RowCandidate {
    fn from_line(line: Vec<Token>, page_index: usize) -> Self {
        let y_band = vertical_extent(&line);
        Self { lines: vec![line], y_band, page_index }
    }

    fn append_line(&mut self, line: Vec<Token>) {
        let (y_min, y_max) = vertical_extent(&line);
        self.y_band = (self.y_band.0.min(y_min), self.y_band.1.max(y_max));
        self.lines.push(line);
    }

    /// Tokens in reading order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.lines.iter().flatten()
    }

    pub fn raw_text(&self) -> String {
        self.tokens().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ")
    }
}

fn vertical_extent(line: &[Token]) -> (f64, f64) {
    line.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
        (lo.min(t.y), hi.max(t.y + t.height))
    })
}

// --- Visual Line Clustering ---

/// Groups tokens into visual lines by vertical centre.
///
/// A token joins the current line while its centre lies less than `tolerance`
/// below the centre of the line's first token. Lines come back top to bottom,
/// each sorted by x with ties kept in their original order.
pub fn cluster_lines(tokens: Vec<Token>, tolerance: f64) -> Vec<Vec<Token>> {
    let mut indexed: Vec<(usize, Token)> = tokens.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| {
        a.y_center()
            .total_cmp(&b.y_center())
            .then(a.x.total_cmp(&b.x))
            .then(ia.cmp(ib))
    });

    let mut lines: Vec<Vec<(usize, Token)>> = Vec::new();
    let mut line_anchor = f64::NEG_INFINITY;
    for (index, token) in indexed {
        let center = token.y_center();
        match lines.last_mut() {
            Some(line) if center - line_anchor < tolerance => line.push((index, token)),
            _ => {
                line_anchor = center;
                lines.push(vec![(index, token)]);
            }
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|(ia, a), (ib, b)| a.x.total_cmp(&b.x).then(ia.cmp(ib)));
            line.into_iter().map(|(_, token)| token).collect()
        })
        .collect()
}

// --- Row Assembly ---

/// Builds row candidates for one page.
///
/// Tokens without usable geometry, and tokens whose centre falls outside
/// `region` (when given), are dropped. A visual line with a token in the
/// date, debit, credit or balance band opens a new row; any other line
/// continues the row above it.
pub fn assemble_rows(
    tokens: Vec<Token>,
    region: Option<&Rect>,
    bands: &ColumnBands,
    tolerance: f64,
) -> Vec<RowCandidate> {
    let total = tokens.len();
    let kept: Vec<Token> = tokens
        .into_iter()
        .filter(|t| {
            if !t.has_geometry() {
                tracing::trace!("Skipping token without geometry: {:?}", t);
                return false;
            }
            region.map_or(true, |r| r.contains_point(t.x_center(), t.y_center()))
        })
        .collect();

    let Some(page_index) = kept.first().map(|t| t.page_index) else {
        tracing::debug!("No table tokens on page ({} tokens outside the table region)", total);
        return Vec::new();
    };

    let mut rows: Vec<RowCandidate> = Vec::new();
    for line in cluster_lines(kept, tolerance) {
        let anchored = line
            .iter()
            .any(|t| bands.field_at(t.x_center()).is_some_and(|f| f.anchors_row()));

        match rows.last_mut() {
            Some(row) if !anchored => row.append_line(line),
            _ => rows.push(RowCandidate::from_line(line, page_index)),
        }
    }

    tracing::debug!("Page {}: {} row candidates from {} tokens", page_index + 1, rows.len(), total);
    rows
}
