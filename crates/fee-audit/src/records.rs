//! Canonical fee records and the normalizer that builds them from raw rows
//!
//! Local reports and the portal describe the same runs in different shapes:
//! a run may arrive as `5`, `5.0` or `"005"`, amounts as numbers or as text
//! like `"$1,250.50"`. Everything is collapsed here, once, so the store and
//! the layout only ever see canonical identifiers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::constants;

// =============================================================================
// Identifiers
// =============================================================================

/// Canonical run identifier
///
/// Numeric runs are stored without leading zeros and sort by value; other
/// identifiers sort after every numeric run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Normalize a raw cell or JSON value into a run identifier
    pub fn from_raw(raw: &RawValue) -> Option<Self> {
        match raw {
            RawValue::Empty => None,
            RawValue::Int(n) => Some(Self(n.to_string())),
            RawValue::Float(f) => {
                if !f.is_finite() {
                    None
                } else if is_whole_u64(*f) {
                    Some(Self((*f as u64).to_string()))
                } else {
                    Some(Self(f.to_string()))
                }
            }
            RawValue::Text(s) => Self::parse(s),
        }
    }

    /// Normalize a textual run identifier
    pub fn parse(s: &str) -> Option<Self> {
        let text = collapse_whitespace(s);
        if text.is_empty() {
            return None;
        }
        if let Ok(n) = text.parse::<u64>() {
            return Some(Self(n.to_string()));
        }
        // "5.0" as exported by some spreadsheets
        if let Ok(f) = text.parse::<f64>()
            && is_whole_u64(f)
        {
            return Some(Self((f as u64).to_string()));
        }
        Some(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for RunId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RunId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical contract identifier (trimmed, single-spaced, uppercase)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractId(String);

impl ContractId {
    pub fn parse(s: &str) -> Option<Self> {
        let text = collapse_whitespace(s).to_ascii_uppercase();
        if text.is_empty() { None } else { Some(Self(text)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whole, non-negative and small enough to convert to `u64` exactly
fn is_whole_u64(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// Raw Input
// =============================================================================

/// A loosely typed value as read from a spreadsheet cell or JSON field
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Parse a money amount; accepts `$` prefixes and thousands separators
    pub fn to_amount(&self) -> Option<Decimal> {
        match self {
            RawValue::Empty => None,
            RawValue::Int(n) => Some(Decimal::from(*n)),
            RawValue::Float(f) => Decimal::try_from(*f).ok(),
            RawValue::Text(s) => {
                let cleaned: String = s
                    .trim()
                    .trim_start_matches('$')
                    .chars()
                    .filter(|c| *c != ',' && !c.is_whitespace())
                    .collect();
                Decimal::from_str(&cleaned).ok()
            }
        }
    }
}

impl From<&serde_json::Value> for RawValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Int(i),
                None => n.as_f64().map(RawValue::Float).unwrap_or(RawValue::Empty),
            },
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            _ => RawValue::Empty,
        }
    }
}

/// Where a raw tuple came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Local,
    Portal,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Portal => write!(f, "portal"),
        }
    }
}

/// One raw fee tuple before validation
#[derive(Debug, Clone)]
pub struct RawFee {
    pub run: RawValue,
    pub contract: Option<String>,
    pub amount: RawValue,
    pub date: Option<NaiveDate>,
}

// =============================================================================
// Canonical Record
// =============================================================================

/// A validated fee for one (run, contract, date)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeRecord {
    run: RunId,
    contract: ContractId,
    date: NaiveDate,
    amount: Decimal,
}

impl FeeRecord {
    /// Build a record; `None` unless the amount is strictly positive
    pub fn new(run: RunId, contract: ContractId, date: NaiveDate, amount: Decimal) -> Option<Self> {
        if amount <= Decimal::ZERO {
            return None;
        }
        Some(Self {
            run,
            contract,
            date,
            amount,
        })
    }

    pub fn run(&self) -> &RunId {
        &self.run
    }

    pub fn contract(&self) -> &ContractId {
        &self.contract
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Contracts assigned to rows that carry none, one per source kind
#[derive(Debug, Clone)]
pub struct Sentinels {
    pub local: ContractId,
    pub portal: ContractId,
}

impl Sentinels {
    pub fn for_source(&self, source: SourceKind) -> &ContractId {
        match source {
            SourceKind::Local => &self.local,
            SourceKind::Portal => &self.portal,
        }
    }
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            local: ContractId(constants::DEFAULT_LOCAL_CONTRACT.to_string()),
            portal: ContractId(constants::DEFAULT_PORTAL_CONTRACT.to_string()),
        }
    }
}

/// Turn a raw tuple into a record, or drop it
///
/// Missing run or date, an unparseable amount and amounts <= 0 all yield
/// `None`; these are per-row skips, never errors.
pub fn normalize(raw: &RawFee, source: SourceKind, sentinels: &Sentinels) -> Option<FeeRecord> {
    let run = RunId::from_raw(&raw.run)?;
    let date = raw.date?;
    let amount = raw.amount.to_amount()?;
    let contract = raw
        .contract
        .as_deref()
        .and_then(ContractId::parse)
        .unwrap_or_else(|| sentinels.for_source(source).clone());

    FeeRecord::new(run, contract, date, amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn raw(run: RawValue, contract: Option<&str>, amount: RawValue) -> RawFee {
        RawFee {
            run,
            contract: contract.map(str::to_string),
            amount,
            date: Some(date(20)),
        }
    }

    #[test]
    fn test_huge_float_runs_stay_distinct() {
        let a = RunId::from_raw(&RawValue::Float(2e19)).unwrap();
        let b = RunId::from_raw(&RawValue::Float(9e19)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "20000000000000000000");

        let c = RunId::parse("3e19").unwrap();
        let d = RunId::parse("4e19").unwrap();
        assert_ne!(c, d);
        assert_ne!(c.as_str(), u64::MAX.to_string());
    }

    #[test]
    fn test_run_ids_collapse_across_sources() {
        let from_int = RunId::from_raw(&RawValue::Int(5)).unwrap();
        let from_float = RunId::from_raw(&RawValue::Float(5.0)).unwrap();
        let from_padded = RunId::from_raw(&RawValue::Text(" 005 ".into())).unwrap();
        let from_text_float = RunId::parse("5.0").unwrap();

        assert_eq!(from_int, from_float);
        assert_eq!(from_int, from_padded);
        assert_eq!(from_int, from_text_float);
        assert_eq!(from_int.as_str(), "5");
    }

    #[test]
    fn test_run_ordering_numeric_first() {
        let mut runs: Vec<RunId> = ["12", "B7", "5", "A3", "100"]
            .iter()
            .filter_map(|s| RunId::parse(s))
            .collect();
        runs.sort();
        let ordered: Vec<&str> = runs.iter().map(RunId::as_str).collect();
        assert_eq!(ordered, vec!["5", "12", "100", "A3", "B7"]);
    }

    #[test]
    fn test_contract_canonical_form() {
        let a = ContractId::parse("  bex  north ").unwrap();
        assert_eq!(a.as_str(), "BEX NORTH");
        assert!(ContractId::parse("   ").is_none());
    }

    #[test]
    fn test_amount_text_parsing() {
        assert_eq!(RawValue::Text("$1,250.50".into()).to_amount(), Some(dec!(1250.50)));
        assert_eq!(RawValue::Float(0.1).to_amount(), Some(dec!(0.1)));
        assert_eq!(RawValue::Text("n/a".into()).to_amount(), None);
        assert_eq!(RawValue::Empty.to_amount(), None);
    }

    #[test]
    fn test_normalize_rejects_non_positive_and_missing() {
        let sentinels = Sentinels::default();

        let zero = raw(RawValue::Int(5), None, RawValue::Int(0));
        let negative = raw(RawValue::Int(5), None, RawValue::Int(-5));
        let no_run = raw(RawValue::Empty, None, RawValue::Int(10));
        let mut no_date = raw(RawValue::Int(5), None, RawValue::Int(10));
        no_date.date = None;

        for fee in [zero, negative, no_run, no_date] {
            assert!(normalize(&fee, SourceKind::Local, &sentinels).is_none());
        }
    }

    #[test]
    fn test_normalize_assigns_source_sentinel() {
        let sentinels = Sentinels::default();
        let fee = raw(RawValue::Int(5), None, RawValue::Float(100.0));

        let local = normalize(&fee, SourceKind::Local, &sentinels).unwrap();
        let portal = normalize(&fee, SourceKind::Portal, &sentinels).unwrap();

        assert_eq!(local.contract().as_str(), "STE");
        assert_eq!(portal.contract().as_str(), "PORTAL");
        assert_ne!(local.contract(), portal.contract());
    }

    #[test]
    fn test_normalize_keeps_explicit_contract() {
        let fee = raw(RawValue::Text("05".into()), Some("bex"), RawValue::Text("50".into()));
        let record = normalize(&fee, SourceKind::Portal, &Sentinels::default()).unwrap();

        assert_eq!(record.run().as_str(), "5");
        assert_eq!(record.contract().as_str(), "BEX");
        assert_eq!(record.amount(), dec!(50));
        assert_eq!(record.date(), date(20));
    }
}
