//! Report output: workbook synthesis, fee ledger CSV and console summary

use anyhow::Result;
use csv::Writer;
use std::collections::HashMap;
use std::path::Path;

use crate::constants;
use crate::ingest::IngestOutcome;
use crate::layout::{LAST_COL, PlacedValue, Placement, ReportPlan, SectionPlan};
use crate::sink::{CellValue, SinkError, SpreadsheetSink};
use crate::store::Snapshot;
use crate::styles::{BorderTable, CellStyle, fill_for};

/// One cell ready for the sink, in absolute sheet coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedCell {
    pub row: u32,
    pub col: u16,
    pub value: CellValue,
    pub style: CellStyle,
}

/// A merged header band ready for the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedMerge {
    pub row: u32,
    pub first_col: u16,
    pub last_col: u16,
    pub value: CellValue,
    pub style: CellStyle,
}

/// Counts of what was handed to the sink
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisStats {
    pub sections: usize,
    pub cells: usize,
    pub merges: usize,
}

/// Resolve a placed value against its section origin
fn resolve_value(value: &PlacedValue, origin: u32) -> CellValue {
    match value {
        PlacedValue::Text(s) => CellValue::Text(s.clone()),
        PlacedValue::Amount(n) => CellValue::Number(*n),
        PlacedValue::Formula(f) => CellValue::Formula(f.render(origin)),
    }
}

fn style_for(borders: &BorderTable, section: &SectionPlan, placement: Option<&Placement>, offset: u32, col: u16) -> CellStyle {
    CellStyle {
        border: borders.resolve(section.template_row(offset), col),
        fill: placement.map(|p| fill_for(p.kind)).unwrap_or_default(),
    }
}

/// Every styled cell and merge of one section
///
/// All grid cells of the section are emitted so the frame is drawn even
/// where nothing was placed; cells whose template entry has no borders are
/// skipped unless they hold a value.
pub fn emit_section(section: &SectionPlan, borders: &BorderTable) -> (Vec<EmittedCell>, Vec<EmittedMerge>) {
    let placed: HashMap<(u32, u16), &Placement> = section
        .placements
        .iter()
        .map(|p| ((p.offset, p.col), p))
        .collect();

    let mut merges = Vec::with_capacity(section.merges.len());
    let mut covered: Vec<(u32, u16)> = Vec::new();
    for merge in &section.merges {
        let placement = placed.get(&(merge.offset, merge.first_col)).copied();
        let first = style_for(borders, section, placement, merge.offset, merge.first_col);
        let last = borders.resolve(section.template_row(merge.offset), merge.last_col);

        let mut style = first;
        style.border.right = last.right;

        merges.push(EmittedMerge {
            row: section.origin + merge.offset,
            first_col: merge.first_col,
            last_col: merge.last_col,
            value: placement
                .map(|p| resolve_value(&p.value, section.origin))
                .unwrap_or(CellValue::Blank),
            style,
        });
        covered.extend((merge.first_col..=merge.last_col).map(|col| (merge.offset, col)));
    }

    let mut cells = Vec::new();
    for offset in 0..section.height() {
        for col in 0..=LAST_COL {
            if covered.contains(&(offset, col)) {
                continue;
            }
            let placement = placed.get(&(offset, col)).copied();
            let style = style_for(borders, section, placement, offset, col);
            if placement.is_none() && style.border.is_blank() {
                continue;
            }
            cells.push(EmittedCell {
                row: section.origin + offset,
                col,
                value: placement
                    .map(|p| resolve_value(&p.value, section.origin))
                    .unwrap_or(CellValue::Blank),
                style,
            });
        }
    }

    (cells, merges)
}

/// Hand the whole plan to a sink
pub fn synthesize(plan: &ReportPlan, borders: &BorderTable, sink: &mut impl SpreadsheetSink) -> Result<SynthesisStats, SinkError> {
    let mut stats = SynthesisStats::default();

    for section in &plan.sections {
        log::debug!("Run {}: section at row {}", section.run, section.origin + 1);
        let (cells, merges) = emit_section(section, borders);
        for cell in &cells {
            sink.write_cell(cell.row, cell.col, &cell.value, &cell.style)?;
        }
        for merge in &merges {
            sink.merge_cells(merge.row, merge.first_col, merge.last_col, &merge.value, &merge.style)?;
        }
        for (offset, height) in &section.row_heights {
            sink.set_row_height(section.origin + offset, *height)?;
        }
        stats.sections += 1;
        stats.cells += cells.len();
        stats.merges += merges.len();
    }

    for (col, width) in &plan.column_widths {
        sink.set_column_width(*col, *width)?;
    }

    Ok(stats)
}

/// Write the flattened snapshot to fee_ledger.csv
pub fn write_fee_ledger(output_dir: &Path, snapshot: &Snapshot) -> Result<()> {
    let path = output_dir.join(constants::FEE_LEDGER_FILENAME);
    let mut wtr = Writer::from_path(&path)?;

    wtr.write_record(["Run", "Contract", "Date", "Agent_Fee"])?;
    for (run, contract, date, amount) in snapshot.entries() {
        wtr.write_record([
            run.as_str(),
            contract.as_str(),
            date.format("%Y-%m-%d").to_string().as_str(),
            format!("{:.2}", amount).as_str(),
        ])?;
    }

    wtr.flush()?;
    println!("  Generated: {}", path.display());

    Ok(())
}

/// Print run totals and source health to the console
pub fn print_summary(snapshot: &Snapshot, outcomes: &[IngestOutcome]) {
    println!("\n============================================================");
    println!("AGENT FEE SUMMARY");
    println!("============================================================");

    if let Some((first, last)) = snapshot.date_window() {
        println!("Period: {} to {}\n", first, last);
    }

    println!("RUNS:");
    for run in snapshot.runs() {
        println!(
            "  Run {}: {} contracts, {} dates, {:.2} total",
            run,
            snapshot.contracts(run).len(),
            snapshot.run_dates(run),
            snapshot.run_total(run)
        );
    }
    println!("  ─────────────────────────────────────────────");
    println!("  Total: {:.2}", snapshot.grand_total());

    println!("\nSOURCES:");
    for outcome in outcomes {
        println!(
            "  {:<8} {:>6} accepted {:>6} dropped {:>4} skipped",
            outcome.kind.to_string(),
            outcome.accepted,
            outcome.dropped,
            outcome.failures.len()
        );
    }

    let failures: Vec<_> = outcomes.iter().flat_map(|o| &o.failures).collect();
    if !failures.is_empty() {
        println!("\nSKIPPED SOURCES:");
        for failure in failures {
            println!("  {}: {}", failure.source, failure.reason);
        }
    }

    println!("============================================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::CostBook;
    use crate::layout::{self, COL_WEEK_TOTAL};
    use crate::records::{RawFee, RawValue, Sentinels, SourceKind, normalize};
    use crate::store::AggregationStore;
    use crate::styles::BorderWeight;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    /// Sink that records every call
    #[derive(Default)]
    struct RecordingSink {
        cells: Vec<EmittedCell>,
        merges: Vec<EmittedMerge>,
        row_heights: Vec<(u32, f64)>,
        column_widths: Vec<(u16, f64)>,
    }

    impl RecordingSink {
        fn cell(&self, row: u32, col: u16) -> Option<&EmittedCell> {
            self.cells.iter().find(|c| c.row == row && c.col == col)
        }
    }

    impl SpreadsheetSink for RecordingSink {
        fn write_cell(&mut self, row: u32, col: u16, value: &CellValue, style: &CellStyle) -> Result<(), SinkError> {
            self.cells.push(EmittedCell {
                row,
                col,
                value: value.clone(),
                style: *style,
            });
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
            self.merges.push(EmittedMerge {
                row,
                first_col,
                last_col,
                value: value.clone(),
                style: *style,
            });
            Ok(())
        }

        fn set_row_height(&mut self, row: u32, height: f64) -> Result<(), SinkError> {
            self.row_heights.push((row, height));
            Ok(())
        }

        fn set_column_width(&mut self, col: u16, width: f64) -> Result<(), SinkError> {
            self.column_widths.push((col, width));
            Ok(())
        }
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn fee(run: RawValue, contract: &str, day: u32, amount: RawValue) -> RawFee {
        RawFee {
            run,
            contract: Some(contract.to_string()),
            amount,
            date: Some(june(day)),
        }
    }

    fn two_source_snapshot() -> Snapshot {
        let sentinels = Sentinels::default();
        let local = fee(RawValue::Float(5.0), "STE", 20, RawValue::Float(100.0));
        let remote = fee(RawValue::Text("5".into()), "BEX", 20, RawValue::Int(50));

        let mut local_store = AggregationStore::new();
        local_store.extend(normalize(&local, SourceKind::Local, &sentinels));
        let mut remote_store = AggregationStore::new();
        remote_store.extend(normalize(&remote, SourceKind::Portal, &sentinels));

        assert!(local_store.merge(remote_store).is_empty());
        local_store.snapshot()
    }

    #[test]
    fn test_end_to_end_two_sources() {
        let snapshot = two_source_snapshot();

        let run = crate::records::RunId::parse("5").unwrap();
        let contracts: Vec<&str> = snapshot.contracts(&run).iter().map(|c| c.as_str()).collect();
        assert_eq!(contracts, vec!["BEX", "STE"]);
        let ste = crate::records::ContractId::parse("STE").unwrap();
        let bex = crate::records::ContractId::parse("BEX").unwrap();
        assert_eq!(snapshot.amount(&run, &ste, june(20)), Some(dec!(100)));
        assert_eq!(snapshot.amount(&run, &bex, june(20)), Some(dec!(50)));

        let plan = layout::plan(&snapshot, &CostBook::default());
        let borders = BorderTable::builtin().unwrap();
        let mut sink = RecordingSink::default();
        let stats = synthesize(&plan, &borders, &mut sink).unwrap();

        assert_eq!(stats.sections, 1);
        assert_eq!(sink.merges[0].value, CellValue::Text("Run 5 Audit".into()));
        assert_eq!(sink.merges[0].row, 0);
        assert_eq!(sink.cell(3, 0).unwrap().value, CellValue::Text("BEX".into()));
        assert_eq!(sink.cell(4, 0).unwrap().value, CellValue::Text("STE".into()));
        assert_eq!(sink.cell(3, 1).unwrap().value, CellValue::Number(dec!(50)));
        assert_eq!(sink.cell(4, 1).unwrap().value, CellValue::Number(dec!(100)));

        // One shared week total over both contract rows and the cost block
        assert_eq!(
            sink.cell(3, COL_WEEK_TOTAL).unwrap().value,
            CellValue::Formula("=SUM(G4:G5,G6:G11)".into())
        );
        assert_eq!(sink.cell(4, COL_WEEK_TOTAL).unwrap().value, CellValue::Blank);
        assert_eq!(sink.column_widths.len(), usize::from(LAST_COL) + 1);
        assert_eq!(sink.row_heights, vec![(0, 24.0), (1, 18.0)]);
    }

    #[test]
    fn test_styles_ignore_section_origin() {
        let plan = layout::plan(&two_source_snapshot(), &CostBook::default());
        let borders = BorderTable::builtin().unwrap();

        let mut at_one = plan.sections[0].clone();
        at_one.origin = 1;
        let mut at_fifty = plan.sections[0].clone();
        at_fifty.origin = 50;

        let (cells_one, merges_one) = emit_section(&at_one, &borders);
        let (cells_fifty, merges_fifty) = emit_section(&at_fifty, &borders);

        assert_eq!(cells_one.len(), cells_fifty.len());
        for (a, b) in cells_one.iter().zip(&cells_fifty) {
            assert_eq!(a.row - 1, b.row - 50);
            assert_eq!(a.col, b.col);
            assert_eq!(a.style, b.style);
        }
        assert_eq!(merges_one[0].style, merges_fifty[0].style);

        // Caption band: offset 1, column A
        let caption_one = &merges_one[1];
        assert_eq!(caption_one.row, 2);
        assert_eq!(caption_one.style.border.left, BorderWeight::Thick);
        assert_eq!(caption_one.style.border.right, BorderWeight::Thick);
        assert_eq!(caption_one.style.border.bottom, BorderWeight::Thick);
        assert_eq!(merges_fifty[1].row, 51);
    }

    #[test]
    fn test_formulas_follow_section_origin() {
        let plan = layout::plan(&two_source_snapshot(), &CostBook::default());
        let borders = BorderTable::builtin().unwrap();

        let mut moved = plan.sections[0].clone();
        moved.origin = 49;
        let (cells, _) = emit_section(&moved, &borders);
        let week_total = cells
            .iter()
            .find(|c| c.row == 52 && c.col == COL_WEEK_TOTAL)
            .unwrap();
        assert_eq!(week_total.value, CellValue::Formula("=SUM(G53:G54,G55:G60)".into()));
    }

    #[test]
    fn test_spacer_row_is_not_written() {
        let plan = layout::plan(&two_source_snapshot(), &CostBook::default());
        let borders = BorderTable::builtin().unwrap();
        let section = &plan.sections[0];
        let (cells, _) = emit_section(section, &borders);

        let spacer = section.origin + section.height() - 1;
        assert!(cells.iter().all(|c| c.row != spacer));
        // Rest of the grid is fully framed: 11 columns per row, header bands merged
        let content_cells = (section.content_rows() - 2) as usize * (usize::from(LAST_COL) + 1);
        assert_eq!(cells.len(), content_cells);
    }

    #[test]
    fn test_empty_plan_writes_nothing() {
        let plan = layout::plan(&AggregationStore::new().snapshot(), &CostBook::default());
        let mut sink = RecordingSink::default();
        let stats = synthesize(&plan, &BorderTable::builtin().unwrap(), &mut sink).unwrap();

        assert_eq!(stats, SynthesisStats::default());
        assert!(sink.cells.is_empty());
        assert!(sink.column_widths.is_empty());
    }

    #[test]
    fn test_fee_ledger_csv() {
        let dir = tempfile::tempdir().unwrap();
        write_fee_ledger(dir.path(), &two_source_snapshot()).unwrap();

        let content = std::fs::read_to_string(dir.path().join(constants::FEE_LEDGER_FILENAME)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Run,Contract,Date,Agent_Fee",
                "5,BEX,2025-06-20,50.00",
                "5,STE,2025-06-20,100.00",
            ]
        );
    }
}
