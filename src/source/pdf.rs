// src/source/pdf.rs
use std::path::Path;

use pdf_extract::{Document, MediaBox, OutputDev, OutputError, Transform};

use crate::source::{Token, TokenSource};
use crate::utils::error::SourceError;

// --- Constants ---
// Horizontal gap (in multiples of the glyph size) that splits two glyphs into separate words.
const WORD_GAP_RATIO: f64 = 0.25;
// Baseline drift (in multiples of the glyph size) tolerated inside one word.
const BASELINE_DRIFT_RATIO: f64 = 0.5;

/// One rendered glyph, already flipped into top-left page space.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Glyph<'a> {
    text: &'a str,
    x: f64,
    baseline: f64,
    advance: f64,
    size: f64,
}

#[derive(Debug, Default)]
struct PendingWord {
    text: String,
    x0: f64,
    x1: f64,
    baseline: f64,
    size: f64,
}

/// Collects glyphs from `pdf_extract::output_doc` into word tokens per page.
#[derive(Debug, Default)]
struct TokenCollector {
    pages: Vec<Vec<Token>>,
    current_page: usize,
    page_top: f64,
    page_left: f64,
    word: Option<PendingWord>,
}

impl TokenCollector {
    fn with_page_count(page_count: usize) -> Self {
        Self {
            pages: vec![Vec::new(); page_count],
            ..Self::default()
        }
    }

    fn push_glyph(&mut self, glyph: Glyph<'_>) {
        if glyph.text.chars().all(char::is_whitespace) {
            self.flush_word();
            return;
        }

        if let Some(word) = &self.word {
            let gap = glyph.x - word.x1;
            let drift = (glyph.baseline - word.baseline).abs();
            let size = word.size.max(glyph.size);
            if gap > size * WORD_GAP_RATIO || gap < -size || drift > size * BASELINE_DRIFT_RATIO {
                self.flush_word();
            }
        }

        let word = self.word.get_or_insert_with(|| PendingWord {
            x0: glyph.x,
            x1: glyph.x,
            baseline: glyph.baseline,
            size: glyph.size,
            ..PendingWord::default()
        });
        word.text.push_str(glyph.text);
        word.x1 = glyph.x + glyph.advance;
        word.size = word.size.max(glyph.size);
    }

    fn flush_word(&mut self) {
        let Some(word) = self.word.take() else { return };
        let text = word.text.trim();
        if text.is_empty() {
            return;
        }
        if self.pages.len() <= self.current_page {
            self.pages.resize(self.current_page + 1, Vec::new());
        }
        self.pages[self.current_page].push(Token::new(
            text,
            word.x0,
            word.baseline - word.size,
            (word.x1 - word.x0).max(0.0),
            word.size,
            self.current_page,
        ));
    }
}

impl OutputDev for TokenCollector {
    fn begin_page(
        &mut self,
        page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.flush_word();
        self.current_page = page_num.saturating_sub(1) as usize;
        self.page_top = media_box.ury;
        self.page_left = media_box.llx;
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        self.flush_word();
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        spacing: f64,
        font_size: f64,
        char: &str,
    ) -> Result<(), OutputError> {
        // Uniform scale of the text rendering matrix
        let scale = (trm.m11 * trm.m22 - trm.m12 * trm.m21).abs().sqrt();
        let size = font_size * scale;
        self.push_glyph(Glyph {
            text: char,
            x: trm.m31 - self.page_left,
            baseline: self.page_top - trm.m32,
            advance: (width * font_size + spacing) * scale,
            size,
        });
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    // Text-showing operators may split one visual word (kerning arrays), so words are
    // delimited by geometry rather than by operator boundaries.
    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        self.flush_word();
        Ok(())
    }
}

/// Token source backed by a decoded PDF document.
#[derive(Debug)]
pub struct PdfTokenSource {
    pages: Vec<Vec<Token>>,
}

impl PdfTokenSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let doc = Document::load(path).map_err(|e| SourceError::Pdf(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(SourceError::Pdf("encrypted documents are not supported".to_string()));
        }
        let page_count = doc.get_pages().len();
        tracing::info!("Opened {} with {} pages", path.display(), page_count);

        let mut collector = TokenCollector::with_page_count(page_count);
        pdf_extract::output_doc(&doc, &mut collector).map_err(|e| SourceError::Pdf(e.to_string()))?;
        collector.flush_word();

        for (index, tokens) in collector.pages.iter().enumerate() {
            tracing::trace!("Page {}: {} tokens", index + 1, tokens.len());
        }
        Ok(Self { pages: collector.pages })
    }
}

impl TokenSource for PdfTokenSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_tokens(&self, page_index: usize) -> Result<Vec<Token>, SourceError> {
        self.pages
            .get(page_index)
            .cloned()
            .ok_or(SourceError::PageOutOfRange(page_index))
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(text: &str, x: f64, baseline: f64) -> Glyph<'_> {
        Glyph { text, x, baseline, advance: 5.0, size: 10.0 }
    }

    fn feed(collector: &mut TokenCollector, text: &str, x: f64, baseline: f64) {
        let mut cursor = x;
        for (i, ch) in text.char_indices() {
            collector.push_glyph(glyph(&text[i..i + ch.len_utf8()], cursor, baseline));
            cursor += 5.0;
        }
    }

    #[test]
    fn test_glyphs_split_on_spaces() {
        let mut collector = TokenCollector::with_page_count(1);
        feed(&mut collector, "12 Jan", 30.0, 330.0);
        collector.flush_word();

        let tokens = &collector.pages[0];
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "12");
        assert_eq!(tokens[0].x, 30.0);
        assert_eq!(tokens[0].width, 10.0);
        assert_eq!(tokens[0].y, 320.0);
        assert_eq!(tokens[0].height, 10.0);
        assert_eq!(tokens[1].text, "Jan");
        assert_eq!(tokens[1].x, 45.0);
    }

    #[test]
    fn test_glyphs_split_on_horizontal_gap() {
        let mut collector = TokenCollector::with_page_count(1);
        feed(&mut collector, "AB", 100.0, 400.0);
        feed(&mut collector, "CD", 200.0, 400.0);
        collector.flush_word();

        let texts: Vec<_> = collector.pages[0].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["AB", "CD"]);
    }

    #[test]
    fn test_glyphs_split_on_new_baseline() {
        let mut collector = TokenCollector::with_page_count(1);
        feed(&mut collector, "AB", 100.0, 400.0);
        feed(&mut collector, "CD", 110.0, 420.0);
        collector.flush_word();

        assert_eq!(collector.pages[0].len(), 2);
        assert_eq!(collector.pages[0][1].y, 410.0);
    }

    #[test]
    fn test_tokens_land_on_current_page() {
        let mut collector = TokenCollector::with_page_count(2);
        collector.current_page = 1;
        feed(&mut collector, "99.00", 400.0, 500.0);
        collector.flush_word();

        assert!(collector.pages[0].is_empty());
        assert_eq!(collector.pages[1][0].page_index, 1);
        assert_eq!(collector.pages[1][0].text, "99.00");
    }
}
