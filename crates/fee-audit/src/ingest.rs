//! Ingestion passes: local reports and the fee portal
//!
//! Each pass normalizes into its own store. The two passes run side by side
//! and their stores are merged once both are done.

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::discovery::{self, DiscoveryFilter};
use crate::extract;
use crate::portal::{self, PortalSettings};
use crate::records::{RawFee, Sentinels, SourceKind, normalize};
use crate::store::AggregationStore;

/// A document, page or login that contributed nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Result of one ingestion pass
#[derive(Debug)]
pub struct IngestOutcome {
    pub kind: SourceKind,
    pub store: AggregationStore,
    /// Documents read or pages fetched
    pub units: usize,
    pub accepted: usize,
    pub dropped: usize,
    pub failures: Vec<SourceFailure>,
}

impl IngestOutcome {
    fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            store: AggregationStore::new(),
            units: 0,
            accepted: 0,
            dropped: 0,
            failures: Vec::new(),
        }
    }

    fn absorb(&mut self, rows: &[RawFee], sentinels: &Sentinels) {
        for raw in rows {
            match normalize(raw, self.kind, sentinels) {
                Some(record) => match self.store.accumulate(&record) {
                    Ok(()) => self.accepted += 1,
                    Err(overflow) => {
                        log::warn!("Dropped {} row: {}", self.kind, overflow);
                        self.dropped += 1;
                    }
                },
                None => {
                    log::debug!("Dropped {} row: {:?}", self.kind, raw);
                    self.dropped += 1;
                }
            }
        }
    }

    fn fail(&mut self, source: impl Into<String>, reason: impl ToString) {
        let failure = SourceFailure {
            source: source.into(),
            reason: reason.to_string(),
        };
        log::warn!("Skipped {}: {}", failure.source, failure.reason);
        self.failures.push(failure);
    }
}

/// Settings of the local pass
#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub root: PathBuf,
    pub sheet_name: String,
    pub filter: DiscoveryFilter,
}

/// Read every discovered report into a fresh store
pub fn ingest_local(settings: &LocalSettings, sentinels: &Sentinels) -> IngestOutcome {
    let mut outcome = IngestOutcome::new(SourceKind::Local);

    for document in discovery::discover(&settings.root, &settings.filter) {
        match extract::extract(&document, &settings.sheet_name) {
            Ok(rows) => {
                outcome.units += 1;
                outcome.absorb(&rows, sentinels);
            }
            Err(e) => outcome.fail(document.path.display().to_string(), e),
        }
    }

    outcome
}

/// Fetch every configured run from the portal into a fresh store
pub async fn ingest_portal(
    settings: &PortalSettings,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    sentinels: &Sentinels,
) -> IngestOutcome {
    let mut outcome = IngestOutcome::new(SourceKind::Portal);

    match portal::fetch_fees(settings, from, to).await {
        Ok(fetch) => {
            outcome.units = fetch.pages;
            let (inside, outside): (Vec<RawFee>, Vec<RawFee>) = fetch
                .fees
                .into_iter()
                .partition(|fee| fee.date.is_none_or(|date| within(date, from, to)));
            if !outside.is_empty() {
                log::debug!("Dropped {} portal row(s) outside the date range", outside.len());
            }
            outcome.dropped += outside.len();
            outcome.absorb(&inside, sentinels);
            for failure in fetch.failures {
                outcome.fail(format!("portal run {} page {}", failure.run, failure.page), failure.error);
            }
        }
        Err(e) => outcome.fail(format!("portal login ({})", settings.base_url), e),
    }

    outcome
}

fn within(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.is_none_or(|from| date >= from) && to.is_none_or(|to| date <= to)
}

/// Which passes to run
#[derive(Debug, Clone, Default)]
pub struct IngestPlan {
    pub local: Option<LocalSettings>,
    pub portal: Option<PortalSettings>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Run both passes concurrently and merge their stores
///
/// The local pass does blocking file I/O and runs on the blocking pool; the
/// portal pass runs on the async runtime. Returns the merged store and one
/// outcome per pass that ran (stores drained).
pub async fn ingest_all(plan: IngestPlan, sentinels: Sentinels) -> (AggregationStore, Vec<IngestOutcome>) {
    let local = async {
        let settings = plan.local.clone()?;
        let sentinels = sentinels.clone();
        let task = tokio::task::spawn_blocking(move || ingest_local(&settings, &sentinels));
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                let mut outcome = IngestOutcome::new(SourceKind::Local);
                outcome.fail("local reports", e);
                Some(outcome)
            }
        }
    };
    let remote = async {
        let settings = plan.portal.as_ref()?;
        Some(ingest_portal(settings, plan.from, plan.to, &sentinels).await)
    };

    let (local, remote) = tokio::join!(local, remote);

    let mut merged = AggregationStore::new();
    let mut outcomes = Vec::new();
    for mut outcome in [local, remote].into_iter().flatten() {
        if !outcome.store.is_empty() {
            for overflow in merged.merge(std::mem::take(&mut outcome.store)) {
                outcome.fail(format!("{} merge", outcome.kind), overflow);
            }
        }
        outcomes.push(outcome);
    }

    (merged, outcomes)
}
