//! Spreadsheet sink: the only place that knows about the xlsx format
//!
//! The synthesizer decides what goes in each cell; a sink writes it. The
//! xlsx sink collects everything on one worksheet and persists it on `save`.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::styles::{BorderWeight, CellStyle};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Spreadsheet write failed: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("Amount {0} cannot be written as a spreadsheet number")]
    Amount(Decimal),
}

/// A fully resolved cell value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Number(Decimal),
    /// Formula string, including the leading `=`
    Formula(String),
    /// Styled cell without content
    Blank,
}

/// Destination for the synthesized grid
pub trait SpreadsheetSink {
    fn write_cell(&mut self, row: u32, col: u16, value: &CellValue, style: &CellStyle) -> Result<(), SinkError>;

    fn merge_cells(
        &mut self,
        row: u32,
        first_col: u16,
        last_col: u16,
        value: &CellValue,
        style: &CellStyle,
    ) -> Result<(), SinkError>;

    fn set_row_height(&mut self, row: u32, height: f64) -> Result<(), SinkError>;

    fn set_column_width(&mut self, col: u16, width: f64) -> Result<(), SinkError>;
}

/// Sink writing a single-sheet xlsx workbook
pub struct XlsxSink {
    worksheet: Worksheet,
    formats: HashMap<CellStyle, Format>,
}

impl XlsxSink {
    pub fn new(sheet_name: &str) -> Result<Self, SinkError> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(sheet_name)?;
        Ok(Self {
            worksheet,
            formats: HashMap::new(),
        })
    }

    /// Write the workbook to `path`
    pub fn save(self, path: &Path) -> Result<(), SinkError> {
        let mut workbook = Workbook::new();
        workbook.push_worksheet(self.worksheet);
        workbook.save(path)?;
        Ok(())
    }

    fn format(&mut self, style: &CellStyle) -> Format {
        self.formats.entry(*style).or_insert_with(|| build_format(style)).clone()
    }
}

impl SpreadsheetSink for XlsxSink {
    fn write_cell(&mut self, row: u32, col: u16, value: &CellValue, style: &CellStyle) -> Result<(), SinkError> {
        let format = self.format(style);
        match value {
            CellValue::Text(s) => {
                self.worksheet.write_string_with_format(row, col, s, &format)?;
            }
            CellValue::Number(n) => {
                let number = n.to_f64().ok_or(SinkError::Amount(*n))?;
                self.worksheet.write_number_with_format(row, col, number, &format)?;
            }
            CellValue::Formula(f) => {
                self.worksheet.write_formula_with_format(row, col, f.as_str(), &format)?;
            }
            CellValue::Blank => {
                self.worksheet.write_blank(row, col, &format)?;
            }
        }
        Ok(())
    }

    fn merge_cells(
        &mut self,
        row: u32,
        first_col: u16,
        last_col: u16,
        value: &CellValue,
        style: &CellStyle,
    ) -> Result<(), SinkError> {
        let format = self.format(style).set_align(FormatAlign::Center);
        let text = match value {
            CellValue::Text(s) => s.as_str(),
            _ => "",
        };
        self.worksheet.merge_range(row, first_col, row, last_col, text, &format)?;
        Ok(())
    }

    fn set_row_height(&mut self, row: u32, height: f64) -> Result<(), SinkError> {
        self.worksheet.set_row_height(row, height)?;
        Ok(())
    }

    fn set_column_width(&mut self, col: u16, width: f64) -> Result<(), SinkError> {
        self.worksheet.set_column_width(col, width)?;
        Ok(())
    }
}

fn border(weight: BorderWeight) -> FormatBorder {
    match weight {
        BorderWeight::None => FormatBorder::None,
        BorderWeight::Thin => FormatBorder::Thin,
        BorderWeight::Thick => FormatBorder::Thick,
    }
}

fn build_format(style: &CellStyle) -> Format {
    let mut format = Format::new()
        .set_border_left(border(style.border.left))
        .set_border_right(border(style.border.right))
        .set_border_top(border(style.border.top))
        .set_border_bottom(border(style.border.bottom));

    if let Some(color) = style.fill.background {
        format = format.set_background_color(color);
    }
    if let Some(color) = style.fill.font_color {
        format = format.set_font_color(color);
    }
    if style.fill.bold {
        format = format.set_bold();
    }
    if let Some(num_format) = style.fill.num_format {
        format = format.set_num_format(num_format);
    }
    format
}
