// src/extractors/layout.rs

// --- Imports ---
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::source::Rect;
use crate::utils::error::AppError;

// --- Constants ---
pub const DEFAULT_LAYOUT: &str = "aib";
pub const DEFAULT_ROW_TOLERANCE: f64 = 3.0;

// A4 portrait in points; the statement table sits between the account header and the footer.
const AIB_PAGE_HEIGHT: f64 = 842.0;
const AIB_TABLE_BBOX: Rect = Rect::new(25.0, AIB_PAGE_HEIGHT - 535.0, 561.0, AIB_PAGE_HEIGHT - 87.0);

// --- Data Structures ---

/// Semantic field a column band carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Date,
    Description,
    Debit,
    Credit,
    Balance,
}

impl Field {
    pub const ALL: [Field; 5] = [Field::Date, Field::Description, Field::Debit, Field::Credit, Field::Balance];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Description => "description",
            Field::Debit => "debit",
            Field::Credit => "credit",
            Field::Balance => "balance",
        }
    }

    /// Bands whose presence on a visual line marks the start of a new row.
    pub fn anchors_row(&self) -> bool {
        !matches!(self, Field::Description)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Half-open horizontal range `[x_min, x_max)` assigned to one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnBand {
    pub field: Field,
    pub x_min: f64,
    pub x_max: f64,
}

impl ColumnBand {
    pub fn new(field: Field, x_min: f64, x_max: f64) -> Self {
        Self { field, x_min, x_max }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.x_min && x < self.x_max
    }
}

/// One band per field, non-overlapping. Built through `ColumnBands::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColumnBand>", into = "Vec<ColumnBand>")]
pub struct ColumnBands {
    bands: Vec<ColumnBand>,
}

impl ColumnBands {
    pub fn new(mut bands: Vec<ColumnBand>) -> Result<Self, String> {
        for band in &bands {
            if !(band.x_min < band.x_max) {
                return Err(format!("band '{}' has an empty range {}..{}", band.field, band.x_min, band.x_max));
            }
        }
        for field in Field::ALL {
            let count = bands.iter().filter(|b| b.field == field).count();
            if count != 1 {
                return Err(format!("expected exactly one '{}' band, found {}", field, count));
            }
        }
        bands.sort_by(|a, b| a.x_min.total_cmp(&b.x_min));
        for pair in bands.windows(2) {
            if pair[1].x_min < pair[0].x_max {
                return Err(format!("bands '{}' and '{}' overlap", pair[0].field, pair[1].field));
            }
        }
        Ok(Self { bands })
    }

    /// Field whose band contains `x`, if any.
    pub fn field_at(&self, x: f64) -> Option<Field> {
        self.bands.iter().find(|b| b.contains(x)).map(|b| b.field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnBand> {
        self.bands.iter()
    }
}

impl TryFrom<Vec<ColumnBand>> for ColumnBands {
    type Error = String;

    fn try_from(bands: Vec<ColumnBand>) -> Result<Self, Self::Error> {
        ColumnBands::new(bands)
    }
}

impl From<ColumnBands> for Vec<ColumnBand> {
    fn from(bands: ColumnBands) -> Self {
        bands.bands
    }
}

/// Which character groups digits and which one marks the decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalConvention {
    /// `1,234.56`
    #[default]
    Point,
    /// `1.234,56`
    Comma,
}

/// Fixed geometry and parsing rules for one statement layout family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLayout {
    pub name: String,
    /// Region holding the transaction table when the source cannot detect one.
    #[serde(default)]
    pub table_bbox: Option<Rect>,
    pub bands: ColumnBands,
    #[serde(default = "default_row_tolerance")]
    pub row_tolerance: f64,
    pub date_format: String,
    #[serde(default)]
    pub decimal: DecimalConvention,
    /// Rows printing amounts without a date take the last date seen.
    #[serde(default)]
    pub carry_dates: bool,
}

fn default_row_tolerance() -> f64 {
    DEFAULT_ROW_TOLERANCE
}

impl StatementLayout {
    /// AIB current account statements.
    pub fn aib() -> Self {
        let bands = vec![
            ColumnBand::new(Field::Date, 25.0, 90.0),
            ColumnBand::new(Field::Description, 90.0, 250.0),
            ColumnBand::new(Field::Debit, 250.0, 335.0),
            ColumnBand::new(Field::Credit, 335.0, 400.0),
            ColumnBand::new(Field::Balance, 400.0, 561.0),
        ];
        Self {
            name: "aib".to_string(),
            table_bbox: Some(AIB_TABLE_BBOX),
            // The band set above is valid by construction
            bands: ColumnBands { bands },
            row_tolerance: DEFAULT_ROW_TOLERANCE,
            date_format: "%d %b %Y".to_string(),
            decimal: DecimalConvention::Point,
            carry_dates: true,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.row_tolerance > 0.0) {
            return Err(AppError::Config(format!(
                "layout '{}': row tolerance must be positive, got {}",
                self.name, self.row_tolerance
            )));
        }
        if self.date_format.trim().is_empty() {
            return Err(AppError::Config(format!("layout '{}': empty date format", self.name)));
        }
        Ok(())
    }
}

// --- Layout Registry ---

/// Names of the layouts shipped with the extractor.
pub const BUILTIN_LAYOUTS: &[&str] = &["aib"];

pub fn builtin_layout(name: &str) -> Option<StatementLayout> {
    match name.to_ascii_lowercase().as_str() {
        "aib" => Some(StatementLayout::aib()),
        _ => None,
    }
}

/// Loads and validates a layout description from a JSON file.
pub fn load_layout_file(path: &Path) -> Result<StatementLayout, AppError> {
    let raw = fs::read_to_string(path)?;
    let layout: StatementLayout = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("invalid layout file {}: {}", path.display(), e)))?;
    layout.validate()?;
    tracing::info!("Loaded layout '{}' from {}", layout.name, path.display());
    Ok(layout)
}
