//! Accumulating fee store and the frozen snapshot handed to the layout
//!
//! The store is a sum, not a set: accumulating the same record twice counts
//! it twice. Each ingestion pass fills its own store; the stores are merged
//! once every pass has finished.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

use crate::records::{ContractId, FeeRecord, RunId};

/// A sum that no longer fits in a decimal; the total is left as it was
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fee total for run {run}, contract {contract} on {date} overflowed")]
pub struct AmountOverflow {
    pub run: RunId,
    pub contract: ContractId,
    pub date: NaiveDate,
}

type DateAmounts = BTreeMap<NaiveDate, Decimal>;
type ContractAmounts = BTreeMap<ContractId, DateAmounts>;
type RunAmounts = BTreeMap<RunId, ContractAmounts>;

/// run -> contract -> date -> amount
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationStore {
    runs: RunAmounts,
    records: usize,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record's amount to its (run, contract, date) total
    ///
    /// On overflow the store is unchanged and the record is not counted.
    pub fn accumulate(&mut self, record: &FeeRecord) -> Result<(), AmountOverflow> {
        self.add(record.run(), record.contract(), record.date(), record.amount())?;
        self.records += 1;
        Ok(())
    }

    /// Fold another store into this one (pointwise addition)
    ///
    /// Totals that would overflow keep this store's value and are returned.
    pub fn merge(&mut self, other: AggregationStore) -> Vec<AmountOverflow> {
        let mut overflows = Vec::new();
        for (run, contracts) in other.runs {
            for (contract, dates) in contracts {
                for (date, amount) in dates {
                    if let Err(overflow) = self.add(&run, &contract, date, amount) {
                        overflows.push(overflow);
                    }
                }
            }
        }
        self.records += other.records;
        overflows
    }

    fn add(
        &mut self,
        run: &RunId,
        contract: &ContractId,
        date: NaiveDate,
        amount: Decimal,
    ) -> Result<(), AmountOverflow> {
        let current = self
            .runs
            .get(run)
            .and_then(|contracts| contracts.get(contract))
            .and_then(|dates| dates.get(&date))
            .copied()
            .unwrap_or(Decimal::ZERO);
        let total = current.checked_add(amount).ok_or_else(|| AmountOverflow {
            run: run.clone(),
            contract: contract.clone(),
            date,
        })?;

        self.runs
            .entry(run.clone())
            .or_default()
            .entry(contract.clone())
            .or_default()
            .insert(date, total);
        Ok(())
    }

    /// Number of records accumulated (including merged stores)
    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Freeze the store; it cannot be accumulated into afterwards
    pub fn snapshot(self) -> Snapshot {
        let dates = self
            .runs
            .values()
            .flat_map(|contracts| contracts.values())
            .flat_map(|dates| dates.keys().copied())
            .collect();

        Snapshot {
            runs: self.runs,
            dates,
        }
    }
}

impl Extend<FeeRecord> for AggregationStore {
    fn extend<I: IntoIterator<Item = FeeRecord>>(&mut self, iter: I) {
        for record in iter {
            if let Err(overflow) = self.accumulate(&record) {
                log::warn!("Dropped fee record: {}", overflow);
            }
        }
    }
}

impl FromIterator<FeeRecord> for AggregationStore {
    fn from_iter<I: IntoIterator<Item = FeeRecord>>(iter: I) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

/// Immutable, point-in-time view of the aggregated fees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    runs: RunAmounts,
    /// Distinct dates across every run, sorted
    dates: BTreeSet<NaiveDate>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Runs in report order
    pub fn runs(&self) -> impl Iterator<Item = &RunId> {
        self.runs.keys()
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Contracts present for a run, sorted
    pub fn contracts(&self, run: &RunId) -> Vec<&ContractId> {
        self.runs
            .get(run)
            .map(|contracts| contracts.keys().collect())
            .unwrap_or_default()
    }

    /// Global sorted date list (shared by every section)
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.dates.iter().copied().collect()
    }

    /// Earliest and latest date across the whole dataset
    pub fn date_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.dates.first()?;
        let last = self.dates.last()?;
        Some((*first, *last))
    }

    pub fn amount(&self, run: &RunId, contract: &ContractId, date: NaiveDate) -> Option<Decimal> {
        self.runs.get(run)?.get(contract)?.get(&date).copied()
    }

    /// Total of every amount recorded for a run
    pub fn run_total(&self, run: &RunId) -> Decimal {
        self.runs
            .get(run)
            .map(|contracts| {
                contracts
                    .values()
                    .flat_map(|d| d.values())
                    .fold(Decimal::ZERO, |total, amount| total.saturating_add(*amount))
            })
            .unwrap_or(Decimal::ZERO)
    }

    /// Distinct dates with at least one amount for a run
    pub fn run_dates(&self, run: &RunId) -> usize {
        self.runs
            .get(run)
            .map(|contracts| {
                contracts
                    .values()
                    .flat_map(|d| d.keys())
                    .collect::<BTreeSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }

    pub fn grand_total(&self) -> Decimal {
        self.runs
            .keys()
            .fold(Decimal::ZERO, |total, run| total.saturating_add(self.run_total(run)))
    }

    /// Flattened (run, contract, date, amount) rows in report order
    pub fn entries(&self) -> impl Iterator<Item = (&RunId, &ContractId, NaiveDate, Decimal)> {
        self.runs.iter().flat_map(|(run, contracts)| {
            contracts.iter().flat_map(move |(contract, dates)| {
                dates
                    .iter()
                    .map(move |(date, amount)| (run, contract, *date, *amount))
            })
        })
    }
}
