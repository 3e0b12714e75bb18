//! Cell styling for the audit sheet
//!
//! Borders depend only on where a cell sits inside its section template;
//! fills and fonts depend only on what kind of cell it is. Neither ever sees
//! an absolute sheet row.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::formula::column_index;
use crate::layout::CellKind;

/// Built-in border table for the canonical section template
const BUILTIN_BORDERS: &str = include_str!("../assets/section_borders.toml");

/// Accent fill for header cells (dark blue)
const ACCENT_FILL: u32 = 0x1F4E78;

/// Text color on accent fills
const LIGHT_TEXT: u32 = 0xFFFFFF;

/// Highlight fill for cost labels (light grey)
const NEUTRAL_FILL: u32 = 0xD9D9D9;

/// Number format for amounts and derived metrics
pub const AMOUNT_FORMAT: &str = "#,##0.00";

#[derive(Debug, Error)]
pub enum StyleError {
    #[error("Failed to read border table {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse border table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {what} range '{value}' in border table")]
    Range { what: &'static str, value: String },
}

// =============================================================================
// Borders
// =============================================================================

/// Line weight of one cell edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderWeight {
    None,
    #[default]
    Thin,
    Thick,
}

/// Weights of the four edges of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BorderDirective {
    pub left: BorderWeight,
    pub right: BorderWeight,
    pub top: BorderWeight,
    pub bottom: BorderWeight,
}

impl BorderDirective {
    pub fn uniform(weight: BorderWeight) -> Self {
        Self {
            left: weight,
            right: weight,
            top: weight,
            bottom: weight,
        }
    }

    pub fn is_blank(&self) -> bool {
        *self == Self::uniform(BorderWeight::None)
    }
}

#[derive(Debug, Deserialize)]
struct BorderFile {
    #[serde(default)]
    cell: Vec<BorderEntry>,
}

#[derive(Debug, Deserialize)]
struct BorderEntry {
    rows: String,
    columns: String,
    left: Option<BorderWeight>,
    right: Option<BorderWeight>,
    top: Option<BorderWeight>,
    bottom: Option<BorderWeight>,
}

/// Lookup of (template row, column) -> border directive
#[derive(Debug, Clone, Default)]
pub struct BorderTable {
    cells: HashMap<(u32, u16), BorderDirective>,
}

impl BorderTable {
    /// The table compiled into the binary
    pub fn builtin() -> Result<Self, StyleError> {
        Self::from_toml(BUILTIN_BORDERS)
    }

    /// Load a replacement table from disk
    pub fn load(path: &Path) -> Result<Self, StyleError> {
        let content = std::fs::read_to_string(path).map_err(|source| StyleError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, StyleError> {
        let file: BorderFile = toml::from_str(content)?;
        let mut cells: HashMap<(u32, u16), BorderDirective> = HashMap::new();

        for entry in &file.cell {
            let (first_row, last_row) = parse_rows(&entry.rows)?;
            let (first_col, last_col) = parse_columns(&entry.columns)?;

            for row in first_row..=last_row {
                for col in first_col..=last_col {
                    let directive = cells.entry((row, col)).or_default();
                    if let Some(w) = entry.left {
                        directive.left = w;
                    }
                    if let Some(w) = entry.right {
                        directive.right = w;
                    }
                    if let Some(w) = entry.top {
                        directive.top = w;
                    }
                    if let Some(w) = entry.bottom {
                        directive.bottom = w;
                    }
                }
            }
        }

        Ok(Self { cells })
    }

    /// Border for a cell of the section template; thin all round if unlisted
    pub fn resolve(&self, template_row: u32, col: u16) -> BorderDirective {
        self.cells
            .get(&(template_row, col))
            .copied()
            .unwrap_or_else(|| BorderDirective::uniform(BorderWeight::Thin))
    }
}

fn parse_rows(value: &str) -> Result<(u32, u32), StyleError> {
    let invalid = || StyleError::Range {
        what: "row",
        value: value.to_string(),
    };
    let (first, last) = split_range(value);
    let first: u32 = first.trim().parse().map_err(|_| invalid())?;
    let last: u32 = last.trim().parse().map_err(|_| invalid())?;
    if first > last {
        return Err(invalid());
    }
    Ok((first, last))
}

fn parse_columns(value: &str) -> Result<(u16, u16), StyleError> {
    let invalid = || StyleError::Range {
        what: "column",
        value: value.to_string(),
    };
    let (first, last) = split_range(value);
    let first = column_index(first).ok_or_else(invalid)?;
    let last = column_index(last).ok_or_else(invalid)?;
    if first > last {
        return Err(invalid());
    }
    Ok((first, last))
}

/// "3:9" -> ("3", "9"); "3" -> ("3", "3")
fn split_range(value: &str) -> (&str, &str) {
    value.split_once(':').unwrap_or((value, value))
}

// =============================================================================
// Fills and fonts
// =============================================================================

/// Fill, font and number format for a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fill {
    pub background: Option<u32>,
    pub font_color: Option<u32>,
    pub bold: bool,
    pub num_format: Option<&'static str>,
}

/// Kind-driven styling, independent of position
pub fn fill_for(kind: CellKind) -> Fill {
    match kind {
        CellKind::Header => Fill {
            background: Some(ACCENT_FILL),
            font_color: Some(LIGHT_TEXT),
            bold: true,
            num_format: None,
        },
        CellKind::CostLabel => Fill {
            background: Some(NEUTRAL_FILL),
            ..Fill::default()
        },
        CellKind::Data | CellKind::CostValue | CellKind::DerivedMetric => Fill {
            num_format: Some(AMOUNT_FORMAT),
            ..Fill::default()
        },
    }
}

/// Everything the sink needs to format one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellStyle {
    pub border: BorderDirective,
    pub fill: Fill,
}
