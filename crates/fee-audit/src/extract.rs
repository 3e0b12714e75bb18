//! Row extraction from local STE report workbooks

use calamine::{Data, Range, Reader, open_workbook_auto};
use chrono::NaiveDate;
use std::path::Path;
use thiserror::Error;

use crate::constants;
use crate::discovery::Document;
use crate::records::{RawFee, RawValue};

/// Why a whole document was skipped
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not open workbook: {0}")]
    Open(#[source] calamine::Error),

    #[error("sheet '{0}' not found")]
    MissingSheet(String),

    #[error("could not read sheet '{sheet}': {source}")]
    ReadSheet {
        sheet: String,
        #[source]
        source: calamine::Error,
    },

    #[error("required column '{0}' not found in header row")]
    MissingColumn(&'static str),

    #[error("no D-M-YYYY date in path")]
    MissingDate,
}

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    run: usize,
    amount: usize,
    contract: Option<usize>,
}

impl Columns {
    fn locate(header: &[Data]) -> Result<Self, SourceError> {
        let find = |name: &str| {
            header.iter().position(|cell| match cell {
                Data::String(s) => s.trim().eq_ignore_ascii_case(name),
                _ => false,
            })
        };

        Ok(Self {
            run: find(constants::RUN_COLUMN).ok_or(SourceError::MissingColumn(constants::RUN_COLUMN))?,
            amount: find(constants::AMOUNT_COLUMN).ok_or(SourceError::MissingColumn(constants::AMOUNT_COLUMN))?,
            contract: constants::CONTRACT_COLUMNS.iter().find_map(|name| find(name)),
        })
    }
}

/// Read every fee row of one document
///
/// The document date is applied to every row. Rows with nothing in either
/// the run or the fee column are left out here; everything else is passed
/// on for normalization to accept or drop.
pub fn extract(document: &Document, sheet_name: &str) -> Result<Vec<RawFee>, SourceError> {
    let date = document.date.ok_or(SourceError::MissingDate)?;
    let range = read_sheet(&document.path, sheet_name)?;
    rows_from_range(&range, date)
}

fn read_sheet(path: &Path, sheet_name: &str) -> Result<Range<Data>, SourceError> {
    let mut workbook = open_workbook_auto(path).map_err(SourceError::Open)?;

    if !workbook.sheet_names().iter().any(|name| name == sheet_name) {
        return Err(SourceError::MissingSheet(sheet_name.to_string()));
    }

    workbook
        .worksheet_range(sheet_name)
        .map_err(|source| SourceError::ReadSheet {
            sheet: sheet_name.to_string(),
            source,
        })
}

fn rows_from_range(range: &Range<Data>, date: NaiveDate) -> Result<Vec<RawFee>, SourceError> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Err(SourceError::MissingColumn(constants::RUN_COLUMN));
    };
    let columns = Columns::locate(header)?;

    let fees = rows
        .filter_map(|row| {
            let run = row.get(columns.run).map(raw_value).unwrap_or(RawValue::Empty);
            let amount = row.get(columns.amount).map(raw_value).unwrap_or(RawValue::Empty);
            if run == RawValue::Empty && amount == RawValue::Empty {
                return None;
            }
            let contract = columns.contract.and_then(|i| row.get(i)).and_then(contract_text);
            Some(RawFee {
                run,
                contract,
                amount,
                date: Some(date),
            })
        })
        .collect();

    Ok(fees)
}

fn raw_value(cell: &Data) -> RawValue {
    match cell {
        Data::Int(n) => RawValue::Int(*n),
        Data::Float(f) => RawValue::Float(*f),
        Data::String(s) if s.trim().is_empty() => RawValue::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::Text(s.clone()),
        Data::Empty | Data::Bool(_) | Data::Error(_) | Data::DateTime(_) => RawValue::Empty,
    }
}

fn contract_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Data::Int(n) => Some(n.to_string()),
        Data::Float(f) => Some(f.to_string()),
        _ => None,
    }
}
