// src/extractors/fields.rs

// --- Imports ---
use std::str::FromStr;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::extractors::layout::{ColumnBands, DecimalConvention, Field, StatementLayout};
use crate::extractors::rows::RowCandidate;
use crate::utils::error::MalformedRowError;

// --- Regex Patterns (Lazy Static) ---
// Canonical amount after separators and currency symbols are gone: optional sign, digits, optional decimals.
static PLAIN_AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d+(?:\.\d+)?$").expect("Failed to compile PLAIN_AMOUNT_RE")
});

// Trailing debit/credit markers, e.g. "1,234.56DR" or "12.00 cr"
static SIGN_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?P<marker>dr|cr)\.?$").expect("Failed to compile SIGN_MARKER_RE")
});

const CURRENCY_SYMBOLS: &[char] = &['€', '£', '$'];

// --- Data Structures ---

/// Top-left position of the first token placed in each band.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldCoordinates {
    pub date: Option<(f64, f64)>,
    pub description: Option<(f64, f64)>,
    pub debit: Option<(f64, f64)>,
    pub credit: Option<(f64, f64)>,
    pub balance: Option<(f64, f64)>,
}

impl FieldCoordinates {
    pub fn get(&self, field: Field) -> Option<(f64, f64)> {
        match field {
            Field::Date => self.date,
            Field::Description => self.description,
            Field::Debit => self.debit,
            Field::Credit => self.credit,
            Field::Balance => self.balance,
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<(f64, f64)> {
        match field {
            Field::Date => &mut self.date,
            Field::Description => &mut self.description,
            Field::Debit => &mut self.debit,
            Field::Credit => &mut self.credit,
            Field::Balance => &mut self.balance,
        }
    }
}

/// Typed fields of one transaction row, before running-balance validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRow {
    pub date: NaiveDate,
    pub date_inherited: bool,
    pub description: String,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    /// Balance as printed on the statement, if the row prints one.
    pub balance: Option<Decimal>,
    pub page_index: usize,
    pub coordinates: FieldCoordinates,
    pub raw_text: String,
}

impl ClassifiedRow {
    pub fn is_movement(&self) -> bool {
        self.debit.is_some() || self.credit.is_some()
    }
}

/// Result of classifying one row candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Transaction(ClassifiedRow),
    /// A dated row without amounts; later undated rows take this date. Any description
    /// text on it belongs to the first transaction that inherits the date.
    DateMarker { date: NaiveDate, description: String },
    /// Headers, footers and other page text.
    Discarded,
}

/// Raw text of each band for one row.
#[derive(Debug, Default)]
struct BandTexts {
    date: Vec<String>,
    description: Vec<String>,
    debit: Vec<String>,
    credit: Vec<String>,
    balance: Vec<String>,
    coordinates: FieldCoordinates,
}

impl BandTexts {
    fn collect(row: &RowCandidate, bands: &ColumnBands) -> Self {
        let mut texts = BandTexts::default();
        for token in row.tokens() {
            let Some(field) = bands.field_at(token.x_center()) else {
                tracing::trace!("Token '{}' at x={:.1} falls outside every column band", token.text, token.x);
                continue;
            };
            let slot = texts.coordinates.slot(field);
            if slot.is_none() {
                *slot = Some((token.x, token.y));
            }
            let parts = match field {
                Field::Date => &mut texts.date,
                Field::Description => &mut texts.description,
                Field::Debit => &mut texts.debit,
                Field::Credit => &mut texts.credit,
                Field::Balance => &mut texts.balance,
            };
            parts.push(token.text.clone());
        }
        texts
    }
}

// --- Value Parsing ---

/// Parses the date band with the layout's fixed format. Empty or unparsable text yields `None`.
pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(&cleaned, format).ok()
}

/// Parses a numeric band.
///
/// Empty text is `Ok(None)`; anything that is not an amount is an error message.
/// Sign conventions: leading `-`, surrounding parentheses or a trailing `DR` make the
/// value negative; a trailing `CR` keeps it positive.
pub fn parse_amount(raw: &str, convention: DecimalConvention) -> Result<Option<Decimal>, String> {
    let mut s: String = raw
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c))
        .collect::<String>()
        .trim()
        .to_string();
    if s.is_empty() {
        return Ok(None);
    }

    let mut negative = false;
    if let Some(caps) = SIGN_MARKER_RE.captures(&s) {
        negative = caps["marker"].eq_ignore_ascii_case("dr");
        let end = caps.get(0).map_or(s.len(), |m| m.start());
        s.truncate(end);
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = !negative;
        s = inner.to_string();
    }

    let (group, decimal) = match convention {
        DecimalConvention::Point => (',', '.'),
        DecimalConvention::Comma => ('.', ','),
    };
    let canonical: String = s
        .chars()
        .filter(|c| *c != group && !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == decimal { '.' } else { c })
        .collect();

    if !PLAIN_AMOUNT_RE.is_match(&canonical) {
        return Err(format!("'{}' is not an amount", raw.trim()));
    }
    let value = Decimal::from_str(&canonical).map_err(|e| format!("'{}': {}", raw.trim(), e))?;
    Ok(Some(if negative { -value } else { value }))
}

// --- Classification ---

/// Classifies one row candidate against the column bands.
///
/// `carried_date` is the last date seen earlier in the document; it dates rows that
/// print amounts but no date when the layout carries dates. The outcome depends only on
/// token positions, the bands and the carried date, never on the description text.
pub fn classify_row(
    row: &RowCandidate,
    bands: &ColumnBands,
    layout: &StatementLayout,
    carried_date: Option<NaiveDate>,
    row_index: usize,
) -> Result<Classification, MalformedRowError> {
    let texts = BandTexts::collect(row, bands);
    let date_text = texts.date.join(" ");
    let own_date = parse_date(&date_text, &layout.date_format);
    let balance = parse_amount(&texts.balance.join(" "), layout.decimal);
    let debit = parse_amount(&texts.debit.join(" "), layout.decimal);
    let credit = parse_amount(&texts.credit.join(" "), layout.decimal);

    let malformed = |reason: String| MalformedRowError {
        page_index: row.page_index,
        row_index,
        raw_text: row.raw_text(),
        reason,
    };

    let has_balance = matches!(balance, Ok(Some(_)));
    let inherited = layout.carry_dates.then_some(carried_date).flatten();

    let (date, date_inherited) = match (own_date, has_balance, inherited) {
        (Some(date), _, _) => (date, false),
        (None, true, Some(date)) => (date, true),
        (None, true, None) => {
            return Err(malformed("balance printed but no date is known yet".to_string()));
        }
        (None, false, Some(date)) if matches!(debit, Ok(Some(_))) || matches!(credit, Ok(Some(_))) => {
            (date, true)
        }
        (None, false, None) if matches!(debit, Ok(Some(_))) || matches!(credit, Ok(Some(_))) => {
            tracing::debug!("Discarding row {} with amounts but no known date: '{}'", row_index, row.raw_text());
            return Ok(Classification::Discarded);
        }
        (None, false, _) => {
            tracing::trace!("Discarding non-transaction row {}: '{}'", row_index, row.raw_text());
            return Ok(Classification::Discarded);
        }
    };

    let balance = balance.map_err(|e| malformed(format!("balance {}", e)))?;
    let debit = debit.map_err(|e| malformed(format!("debit {}", e)))?;
    let credit = credit.map_err(|e| malformed(format!("credit {}", e)))?;

    if debit.is_none() && credit.is_none() && balance.is_none() {
        tracing::trace!("Row {} carries only the date {}", row_index, date);
        return Ok(Classification::DateMarker { date, description: texts.description.join(" ") });
    }

    // The column says which way the money moved; a negative value flips it
    let (debit, credit) = match (debit, credit) {
        (Some(_), Some(_)) => {
            return Err(malformed("both debit and credit columns hold amounts".to_string()));
        }
        (Some(d), None) if d.is_sign_negative() => (None, Some(d.abs())),
        (None, Some(c)) if c.is_sign_negative() => (Some(c.abs()), None),
        other => other,
    };

    Ok(Classification::Transaction(ClassifiedRow {
        date,
        date_inherited,
        description: texts.description.join(" "),
        debit,
        credit,
        balance,
        page_index: row.page_index,
        coordinates: texts.coordinates,
        raw_text: row.raw_text(),
    }))
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::rows::assemble_rows;
    use crate::source::Token;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row_of(tokens: &[(&str, f64, f64)]) -> RowCandidate {
        let layout = StatementLayout::aib();
        let tokens = tokens
            .iter()
            .map(|(text, x, y)| Token::new(*text, *x, *y, 20.0, 8.0, 0))
            .collect();
        let mut rows = assemble_rows(tokens, None, &layout.bands, 3.0);
        assert_eq!(rows.len(), 1, "fixture should assemble into a single row");
        rows.remove(0)
    }

    fn classify(row: &RowCandidate, carried: Option<NaiveDate>) -> Result<Classification, MalformedRowError> {
        let layout = StatementLayout::aib();
        classify_row(row, &layout.bands, &layout, carried, 0)
    }

    #[test]
    fn test_parse_amount_conventions() {
        let point = DecimalConvention::Point;
        assert_eq!(parse_amount("1,234.56", point), Ok(Some(dec("1234.56"))));
        assert_eq!(parse_amount("€ 12.00", point), Ok(Some(dec("12.00"))));
        assert_eq!(parse_amount("-5.10", point), Ok(Some(dec("-5.10"))));
        assert_eq!(parse_amount("(7.25)", point), Ok(Some(dec("-7.25"))));
        assert_eq!(parse_amount("250.00DR", point), Ok(Some(dec("-250.00"))));
        assert_eq!(parse_amount("250.00 dr", point), Ok(Some(dec("-250.00"))));
        assert_eq!(parse_amount("80.00CR", point), Ok(Some(dec("80.00"))));
        assert_eq!(parse_amount("   ", point), Ok(None));
        assert_eq!(parse_amount("", point), Ok(None));
        assert!(parse_amount("Balance", point).is_err());
        assert!(parse_amount("12.3.4", point).is_err());

        let comma = DecimalConvention::Comma;
        assert_eq!(parse_amount("1.234,56", comma), Ok(Some(dec("1234.56"))));
        assert_eq!(parse_amount("1 234,56 €", comma), Ok(Some(dec("1234.56"))));
    }

    #[test]
    fn test_parse_date_fixed_format() {
        assert_eq!(parse_date("12 Jan 2024", "%d %b %Y"), Some(date(2024, 1, 12)));
        assert_eq!(parse_date(" 3  Feb   2023 ", "%d %b %Y"), Some(date(2023, 2, 3)));
        assert_eq!(parse_date("Date", "%d %b %Y"), None);
        assert_eq!(parse_date("", "%d %b %Y"), None);
        assert_eq!(parse_date("31 Feb 2024", "%d %b %Y"), None);
    }

    #[test]
    fn test_classifies_full_row_by_position() {
        let row = row_of(&[
            ("12", 30.0, 400.0),
            ("Jan", 45.0, 400.0),
            ("2024", 60.0, 400.0),
            ("CARD", 100.0, 400.0),
            ("PAYMENT", 125.0, 400.0),
            ("1,010.00", 290.0, 400.0),
            ("490.00", 450.0, 400.0),
        ]);

        let Classification::Transaction(tx) = classify(&row, None).unwrap() else {
            panic!("expected a transaction");
        };
        assert_eq!(tx.date, date(2024, 1, 12));
        assert!(!tx.date_inherited);
        assert_eq!(tx.description, "CARD PAYMENT");
        assert_eq!(tx.debit, Some(dec("1010.00")));
        assert_eq!(tx.credit, None);
        assert_eq!(tx.balance, Some(dec("490.00")));
        assert_eq!(tx.coordinates.date, Some((30.0, 400.0)));
        assert_eq!(tx.coordinates.debit, Some((290.0, 400.0)));
        assert_eq!(tx.coordinates.credit, None);
    }

    #[test]
    fn test_header_row_is_discarded() {
        let row = row_of(&[
            ("Date", 30.0, 320.0),
            ("Details", 100.0, 320.0),
            ("Debit", 270.0, 320.0),
            ("Credit", 350.0, 320.0),
            ("Balance", 450.0, 320.0),
        ]);
        assert_eq!(classify(&row, Some(date(2024, 1, 1))).unwrap(), Classification::Discarded);
    }

    #[test]
    fn test_undated_amount_row_takes_carried_date() {
        let row = row_of(&[("ATM", 100.0, 400.0), ("20.00", 290.0, 400.0)]);

        let Classification::Transaction(tx) = classify(&row, Some(date(2024, 3, 5))).unwrap() else {
            panic!("expected a transaction");
        };
        assert_eq!(tx.date, date(2024, 3, 5));
        assert!(tx.date_inherited);
        assert_eq!(tx.balance, None);

        // Without a carried date the same row is page noise
        assert_eq!(classify(&row, None).unwrap(), Classification::Discarded);
    }

    #[test]
    fn test_dated_row_without_amounts_is_a_date_marker() {
        let row = row_of(&[("5", 30.0, 400.0), ("Mar", 45.0, 400.0), ("2024", 60.0, 400.0)]);
        assert_eq!(
            classify(&row, None).unwrap(),
            Classification::DateMarker { date: date(2024, 3, 5), description: String::new() }
        );

        let row = row_of(&[
            ("5", 30.0, 400.0),
            ("Mar", 45.0, 400.0),
            ("2024", 60.0, 400.0),
            ("VDP-TESCO", 100.0, 400.0),
            ("STORES", 150.0, 400.0),
        ]);
        assert_eq!(
            classify(&row, None).unwrap(),
            Classification::DateMarker { date: date(2024, 3, 5), description: "VDP-TESCO STORES".to_string() }
        );
    }

    #[test]
    fn test_dated_row_with_garbage_amount_is_malformed() {
        let row = row_of(&[
            ("5", 30.0, 400.0),
            ("Mar", 45.0, 400.0),
            ("2024", 60.0, 400.0),
            ("LODGEMENT", 100.0, 400.0),
            ("12.x0", 350.0, 400.0),
        ]);
        let err = classify(&row, None).unwrap_err();
        assert_eq!(err.page_index, 0);
        assert!(err.reason.starts_with("credit"));
        assert!(err.raw_text.contains("LODGEMENT"));
    }

    #[test]
    fn test_both_movement_columns_is_malformed() {
        let row = row_of(&[
            ("5", 30.0, 400.0),
            ("Mar", 45.0, 400.0),
            ("2024", 60.0, 400.0),
            ("1.00", 290.0, 400.0),
            ("2.00", 350.0, 400.0),
        ]);
        assert!(classify(&row, None).is_err());
    }

    #[test]
    fn test_balance_without_any_date_is_malformed() {
        let row = row_of(&[("BALANCE", 100.0, 400.0), ("100.00", 450.0, 400.0)]);
        assert!(classify(&row, None).is_err());
    }

    #[test]
    fn test_negative_movement_flips_column() {
        let row = row_of(&[
            ("5", 30.0, 400.0),
            ("Mar", 45.0, 400.0),
            ("2024", 60.0, 400.0),
            ("-3.50", 290.0, 400.0),
        ]);
        let Classification::Transaction(tx) = classify(&row, None).unwrap() else {
            panic!("expected a transaction");
        };
        assert_eq!(tx.debit, None);
        assert_eq!(tx.credit, Some(dec("3.50")));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let row = row_of(&[("ATM", 100.0, 400.0), ("20.00", 290.0, 400.0), ("80.00", 450.0, 400.0)]);
        let carried = Some(date(2024, 3, 5));
        assert_eq!(classify(&row, carried), classify(&row, carried));
    }
}
