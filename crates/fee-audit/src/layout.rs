//! Layout of the audit sheet
//!
//! Each run gets one section:
//!
//! ```text
//! offset  A               B..F            G       H          I          J        K
//! 0       Run 5 Audit (merged A:K)
//! 1       20/06/2025 - 24/06/2025 (merged A:K)
//! 2       Contract Name   Monday..Friday  Totals  Rev/Day    Week Total Cost     Cost/Day
//! 3       BEX             day amounts     SUM     =I/5       =SUM(G..)  =I-cost  =cost/5
//! 3+n     ...             day amounts     SUM
//! ..      Wage            value           SUM
//! ..      Super           value           SUM
//! ..      Running Costs   value           SUM
//! ..      Fuel Liters     value           SUM
//! ..      Fuel Cost/Liter value           SUM
//! ..      Fuel Total      =cpl*liters     SUM
//! ..      (spacer)
//! ```
//!
//! Day columns are the first five dates of the whole dataset, not of the
//! run, so every section shares the same columns and caption. Later dates
//! are not rendered. The summary metrics sit on the first contract row only.

use rust_decimal::Decimal;

use crate::constants::{self, WEEKDAYS, WEEKDAY_NAMES};
use crate::costs::{CostBook, CostSetting, CostSheet};
use crate::formula::{Formula, Span};
use crate::records::RunId;
use crate::store::Snapshot;

// =============================================================================
// Section geometry
// =============================================================================

const HEADER_ROW: u32 = 0;
const CAPTION_ROW: u32 = 1;
const COLUMNS_ROW: u32 = 2;
const FIRST_CONTRACT_ROW: u32 = 3;

/// Rows in the fixed cost block
pub const COST_ROWS: u32 = 6;

/// Empty rows after each section
const SPACER_ROWS: u32 = 1;

pub const COL_NAME: u16 = 0;
pub const COL_FIRST_DAY: u16 = 1;
pub const COL_LAST_DAY: u16 = COL_FIRST_DAY + WEEKDAYS as u16 - 1;
pub const COL_TOTAL: u16 = COL_LAST_DAY + 1;
pub const COL_REVENUE_DAY_RATE: u16 = COL_TOTAL + 1;
pub const COL_WEEK_TOTAL: u16 = COL_TOTAL + 2;
pub const COL_REVENUE: u16 = COL_TOTAL + 3;
pub const COL_COST_DAY_RATE: u16 = COL_TOTAL + 4;
pub const LAST_COL: u16 = COL_COST_DAY_RATE;

/// Cost values sit in the first day column
const COL_COST_VALUE: u16 = COL_FIRST_DAY;

const METRIC_HEADERS: [(u16, &str); 5] = [
    (COL_TOTAL, "Totals"),
    (COL_REVENUE_DAY_RATE, "Revenue Day Rate"),
    (COL_WEEK_TOTAL, "Week Total"),
    (COL_REVENUE, "Cost"),
    (COL_COST_DAY_RATE, "Cost Day Rate"),
];

const HEADER_HEIGHT: f64 = 24.0;
const CAPTION_HEIGHT: f64 = 18.0;

const NAME_WIDTH: f64 = 20.0;
const DAY_WIDTH: f64 = 12.0;
const METRIC_WIDTH: f64 = 16.0;

// =============================================================================
// Plan types
// =============================================================================

/// What a cell is, for kind-driven styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Header,
    Data,
    CostLabel,
    CostValue,
    DerivedMetric,
}

/// Value of a planned cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacedValue {
    Text(String),
    Amount(Decimal),
    Formula(Formula),
}

/// One planned cell, addressed relative to its section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub offset: u32,
    pub col: u16,
    pub value: PlacedValue,
    pub kind: CellKind,
}

/// Cells merged across one section row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub offset: u32,
    pub first_col: u16,
    pub last_col: u16,
}

/// The planned cells of one run
#[derive(Debug, Clone, PartialEq)]
pub struct SectionPlan {
    pub run: RunId,
    /// Zero-based sheet row of the header
    pub origin: u32,
    pub contracts: u32,
    pub placements: Vec<Placement>,
    pub merges: Vec<Merge>,
    pub row_heights: Vec<(u32, f64)>,
}

impl SectionPlan {
    /// Rows holding content (header through fuel total)
    pub fn content_rows(&self) -> u32 {
        FIRST_CONTRACT_ROW + self.contracts + COST_ROWS
    }

    /// Rows occupied including the trailing spacer
    pub fn height(&self) -> u32 {
        self.content_rows() + SPACER_ROWS
    }

    /// Row of the canonical section template an offset corresponds to
    ///
    /// Contract rows all fold onto the single template contract row; the
    /// cost block and spacer shift back by the extra contract rows.
    pub fn template_row(&self, offset: u32) -> u32 {
        if offset < FIRST_CONTRACT_ROW {
            offset
        } else if offset < FIRST_CONTRACT_ROW + self.contracts {
            FIRST_CONTRACT_ROW
        } else {
            offset + 1 - self.contracts
        }
    }

    pub fn first_cost_row(&self) -> u32 {
        FIRST_CONTRACT_ROW + self.contracts
    }

    #[cfg(test)]
    pub fn placement_at(&self, offset: u32, col: u16) -> Option<&Placement> {
        self.placements.iter().find(|p| p.offset == offset && p.col == col)
    }
}

/// The whole sheet: sections in run order plus column widths
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPlan {
    pub sections: Vec<SectionPlan>,
    pub column_widths: Vec<(u16, f64)>,
}

impl ReportPlan {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    #[cfg(test)]
    pub fn placement_count(&self) -> usize {
        self.sections.iter().map(|s| s.placements.len()).sum()
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Plan every section of the report; pure function of the snapshot
pub fn plan(snapshot: &Snapshot, costs: &CostBook) -> ReportPlan {
    let Some((first, last)) = snapshot.date_window() else {
        return ReportPlan::default();
    };
    let caption = format!(
        "{} - {}",
        first.format(constants::CAPTION_DATE_FORMAT),
        last.format(constants::CAPTION_DATE_FORMAT)
    );
    let dates = snapshot.dates();

    let mut sections = Vec::with_capacity(snapshot.run_count());
    let mut origin = 0;
    for run in snapshot.runs() {
        let section = plan_section(snapshot, run, origin, &caption, &dates, &costs.for_run(run));
        origin += section.height();
        sections.push(section);
    }

    ReportPlan {
        sections,
        column_widths: column_widths(),
    }
}

fn plan_section(
    snapshot: &Snapshot,
    run: &RunId,
    origin: u32,
    caption: &str,
    dates: &[chrono::NaiveDate],
    costs: &CostSheet,
) -> SectionPlan {
    let contracts = snapshot.contracts(run);
    let mut section = SectionPlan {
        run: run.clone(),
        origin,
        contracts: contracts.len() as u32,
        placements: Vec::new(),
        merges: Vec::new(),
        row_heights: vec![(HEADER_ROW, HEADER_HEIGHT), (CAPTION_ROW, CAPTION_HEIGHT)],
    };

    // Header band
    section.placements.push(text(HEADER_ROW, COL_NAME, format!("Run {run} Audit"), CellKind::Header));
    section.placements.push(text(CAPTION_ROW, COL_NAME, caption.to_string(), CellKind::Header));
    for offset in [HEADER_ROW, CAPTION_ROW] {
        section.merges.push(Merge {
            offset,
            first_col: COL_NAME,
            last_col: LAST_COL,
        });
    }

    // Column headers
    section.placements.push(text(COLUMNS_ROW, COL_NAME, "Contract Name".into(), CellKind::Header));
    for (i, day) in WEEKDAY_NAMES.iter().enumerate() {
        section
            .placements
            .push(text(COLUMNS_ROW, COL_FIRST_DAY + i as u16, day.to_string(), CellKind::Header));
    }
    for (col, label) in METRIC_HEADERS {
        section.placements.push(text(COLUMNS_ROW, col, label.to_string(), CellKind::Header));
    }

    // Contract rows
    for (i, contract) in contracts.iter().enumerate() {
        let offset = FIRST_CONTRACT_ROW + i as u32;
        section
            .placements
            .push(text(offset, COL_NAME, contract.to_string(), CellKind::Data));

        for (day, date) in dates.iter().take(WEEKDAYS).enumerate() {
            if let Some(amount) = snapshot.amount(run, contract, *date) {
                section.placements.push(Placement {
                    offset,
                    col: COL_FIRST_DAY + day as u16,
                    value: PlacedValue::Amount(amount),
                    kind: CellKind::Data,
                });
            }
        }
        section.placements.push(row_total(offset));
    }

    // Cost block
    let first_cost = section.first_cost_row();
    let last_cost = first_cost + COST_ROWS - 1;
    let fuel_liters_row = first_cost + 3;
    let fuel_cpl_row = first_cost + 4;

    let fuel_total = Formula::cell(fuel_cpl_row, COL_COST_VALUE).times(Formula::cell(fuel_liters_row, COL_COST_VALUE));
    let cost_rows: [(&str, PlacedValue); COST_ROWS as usize] = [
        ("Wage", cost_value(&costs.wage)),
        ("Super", cost_value(&costs.superannuation)),
        ("Running Costs", cost_value(&costs.running_costs)),
        ("Fuel Liters", cost_value(&costs.fuel_liters)),
        ("Fuel Cost / Liter", cost_value(&costs.fuel_cost_per_liter)),
        ("Fuel Total", PlacedValue::Formula(fuel_total)),
    ];
    for (i, (label, value)) in cost_rows.into_iter().enumerate() {
        let offset = first_cost + i as u32;
        section
            .placements
            .push(text(offset, COL_NAME, label.to_string(), CellKind::CostLabel));
        section.placements.push(Placement {
            offset,
            col: COL_COST_VALUE,
            value,
            kind: CellKind::CostValue,
        });
        section.placements.push(row_total(offset));
    }

    // Summary metrics on the first contract row
    if section.contracts > 0 {
        let last_contract = first_cost - 1;
        let week_total = Formula::sum(vec![
            Span::down(COL_TOTAL, FIRST_CONTRACT_ROW, last_contract),
            Span::down(COL_TOTAL, first_cost, last_cost),
        ]);
        let cost_sum = || Formula::sum(vec![Span::down(COL_COST_VALUE, first_cost, last_cost)]);
        let week_cell = || Formula::cell(FIRST_CONTRACT_ROW, COL_WEEK_TOTAL);
        let weekdays = || Formula::number(WEEKDAYS as i64);

        let metrics = [
            (COL_REVENUE_DAY_RATE, week_cell().over(weekdays())),
            (COL_WEEK_TOTAL, week_total),
            (COL_REVENUE, week_cell().minus(cost_sum())),
            (COL_COST_DAY_RATE, cost_sum().over(weekdays())),
        ];
        for (col, formula) in metrics {
            section.placements.push(Placement {
                offset: FIRST_CONTRACT_ROW,
                col,
                value: PlacedValue::Formula(formula),
                kind: CellKind::DerivedMetric,
            });
        }
    }

    debug_assert!(section.placements.iter().all(|p| match &p.value {
        PlacedValue::Formula(f) => f.references().iter().all(|c| c.offset < section.content_rows()),
        _ => true,
    }));

    section
}

fn text(offset: u32, col: u16, value: String, kind: CellKind) -> Placement {
    Placement {
        offset,
        col,
        value: PlacedValue::Text(value),
        kind,
    }
}

/// `=SUM(B:F)` of one row, placed in the totals column
fn row_total(offset: u32) -> Placement {
    Placement {
        offset,
        col: COL_TOTAL,
        value: PlacedValue::Formula(Formula::sum(vec![Span::across(offset, COL_FIRST_DAY, COL_LAST_DAY)])),
        kind: CellKind::DerivedMetric,
    }
}

fn cost_value(setting: &CostSetting) -> PlacedValue {
    match setting {
        CostSetting::Amount(amount) => PlacedValue::Amount(*amount),
        weekly => match weekly.formula() {
            Some(formula) => PlacedValue::Formula(formula),
            None => PlacedValue::Amount(Decimal::ZERO),
        },
    }
}

fn column_widths() -> Vec<(u16, f64)> {
    let mut widths = vec![(COL_NAME, NAME_WIDTH)];
    widths.extend((COL_FIRST_DAY..=COL_LAST_DAY).map(|col| (col, DAY_WIDTH)));
    widths.extend((COL_TOTAL..=LAST_COL).map(|col| (col, METRIC_WIDTH)));
    widths
}
