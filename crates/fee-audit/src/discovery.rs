//! Local STE report discovery
//!
//! Reports live in a dated folder tree such as
//! `Reports/2025/6 Jun/20-06-2025/STE_Report_Depot.xlsx`; the report date is
//! taken from the path, never from the file contents.

use chrono::NaiveDate;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// D-M-YYYY anywhere inside a path component
static PATH_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,2})-(\d{1,2})-(\d{4})").unwrap());

/// A report file found under the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// Date from the nearest dated path component, if any
    pub date: Option<NaiveDate>,
}

/// Which files to pick up
#[derive(Debug, Clone)]
pub struct DiscoveryFilter {
    pub marker: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DiscoveryFilter {
    /// Undated files are kept; extraction reports them as skipped
    fn admits(&self, date: Option<NaiveDate>) -> bool {
        let Some(date) = date else {
            return true;
        };
        if self.start.is_some_and(|start| date < start) {
            return false;
        }
        if self.end.is_some_and(|end| date > end) {
            return false;
        }
        true
    }
}

/// Date from the path component closest to the file
///
/// Components are checked from the file name upward; a component whose
/// digits do not form a real date (e.g. `31-02-2025`) is passed over.
pub fn date_from_path(path: &Path) -> Option<NaiveDate> {
    let components: Vec<_> = path.components().collect();
    components.iter().rev().find_map(|component| {
        let part = component.as_os_str().to_string_lossy();
        let caps = PATH_DATE.captures(&part)?;
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Walk `root` for `.xlsx` files whose name contains the marker
///
/// A missing root yields no documents. Results are sorted by path so runs
/// over the same tree always visit files in the same order.
pub fn discover(root: &Path, filter: &DiscoveryFilter) -> Vec<Document> {
    if !root.exists() {
        log::warn!("Root directory {} does not exist", root.display());
        return Vec::new();
    }

    let mut documents: Vec<Document> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_report(entry.path(), &filter.marker))
        .map(|entry| {
            let path = entry.into_path();
            let date = date_from_path(&path);
            Document { path, date }
        })
        .filter(|doc| filter.admits(doc.date))
        .collect();

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    log::debug!("Discovered {} report(s) under {}", documents.len(), root.display());
    documents
}

fn is_report(path: &Path, marker: &str) -> bool {
    let is_xlsx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    let has_marker = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(marker));
    // Skip Excel lock files like "~$STE_Report.xlsx"
    let is_lock = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("~$"));

    is_xlsx && has_marker && !is_lock
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn filter(start: Option<NaiveDate>, end: Option<NaiveDate>) -> DiscoveryFilter {
        DiscoveryFilter {
            marker: "STE_Report".to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_date_from_path_nearest_component() {
        let path = Path::new("/reports/2025/6 Jun/20-06-2025/STE_Report.xlsx");
        assert_eq!(date_from_path(path), Some(date(2025, 6, 20)));

        // File name wins over the folder
        let path = Path::new("/reports/20-06-2025/STE_Report 23-06-2025.xlsx");
        assert_eq!(date_from_path(path), Some(date(2025, 6, 23)));

        // Single-digit day and month
        let path = Path::new("/reports/2025/3-7-2025/STE_Report.xlsx");
        assert_eq!(date_from_path(path), Some(date(2025, 7, 3)));
    }

    #[test]
    fn test_date_from_path_skips_impossible_dates() {
        let path = Path::new("/reports/20-06-2025/31-02-2025/STE_Report.xlsx");
        assert_eq!(date_from_path(path), Some(date(2025, 6, 20)));
        assert_eq!(date_from_path(Path::new("/reports/misc/STE_Report.xlsx")), None);
    }

    #[test]
    fn test_discover_matches_marker_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "2025/20-06-2025/STE_Report_A.xlsx");
        touch(dir.path(), "2025/20-06-2025/STE_Report_A.csv");
        touch(dir.path(), "2025/20-06-2025/Other.xlsx");
        touch(dir.path(), "2025/20-06-2025/~$STE_Report_A.xlsx");
        touch(dir.path(), "2025/21-06-2025/deep/STE_Report_B.XLSX");

        let docs = discover(dir.path(), &filter(None, None));
        let names: Vec<_> = docs
            .iter()
            .map(|d| d.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["STE_Report_A.xlsx", "STE_Report_B.XLSX"]);
        assert_eq!(docs[1].date, Some(date(2025, 6, 21)));
    }

    #[test]
    fn test_discover_bounds_are_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        for day in 19..=23 {
            touch(dir.path(), &format!("{day}-06-2025/STE_Report.xlsx"));
        }
        touch(dir.path(), "undated/STE_Report.xlsx");

        let docs = discover(dir.path(), &filter(Some(date(2025, 6, 20)), Some(date(2025, 6, 22))));
        let dates: Vec<_> = docs.iter().map(|d| d.date).collect();

        assert_eq!(
            dates,
            vec![
                Some(date(2025, 6, 20)),
                Some(date(2025, 6, 21)),
                Some(date(2025, 6, 22)),
                None,
            ]
        );
    }

    #[test]
    fn test_discover_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let docs = discover(&dir.path().join("nope"), &filter(None, None));
        assert!(docs.is_empty());
    }
}
