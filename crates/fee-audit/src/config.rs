//! Configuration for the agent fee audit

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::constants;
use crate::costs::{CostBook, CostOverrides, CostSheet};
use crate::discovery::DiscoveryFilter;
use crate::ingest::LocalSettings;
use crate::portal::PortalSettings;
use crate::records::{ContractId, RunId, Sentinels};
use crate::styles::BorderTable;

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub portal: Option<PortalConfig>,
    #[serde(default)]
    pub report: ReportConfig,
    /// Global cost defaults
    #[serde(default)]
    pub costs: CostOverrides,
    /// Per-run cost overrides, keyed by run id
    #[serde(default)]
    pub runs: HashMap<String, CostOverrides>,
}

/// Local report settings
#[derive(Debug, Default, Deserialize)]
pub struct SourcesConfig {
    /// Root folder of the dated STE report tree
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    #[serde(default)]
    pub file_marker: Option<String>,
    #[serde(default)]
    pub sheet_name: Option<String>,
    /// Contract for local rows without one
    #[serde(default)]
    pub local_contract: Option<String>,
    /// Contract for portal manifests without one
    #[serde(default)]
    pub portal_contract: Option<String>,
}

/// Fee portal connection
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Runs whose manifests are fetched
    #[serde(default)]
    pub runs: Vec<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Output settings
#[derive(Debug, Default, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Replacement for the built-in section border table
    #[serde(default)]
    pub border_table: Option<PathBuf>,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| {
            "Failed to parse config.toml. Check for:\n\
             - Missing portal fields (portal.base_url, portal.username, portal.password)\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - Cost values that are neither a number nor { daily_rate, weekly_surcharge }\n\n\
             See config.toml.example for the expected format."
        })
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Command-line values that take precedence over config.toml
#[derive(Debug, Default)]
pub struct Overrides {
    pub root_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    /// YYYY-MM-DD
    pub start_date: Option<String>,
    /// YYYY-MM-DD
    pub end_date: Option<String>,
    pub skip_local: bool,
    pub skip_portal: bool,
}

/// Main configuration struct with parsed values
pub struct Config {
    /// Local pass settings (None when skipped or no root configured)
    pub local: Option<LocalSettings>,
    /// Portal pass settings (None when skipped or not configured)
    pub portal: Option<PortalSettings>,
    pub sentinels: Sentinels,
    /// Audit workbook path
    pub output: PathBuf,
    pub borders: BorderTable,
    pub costs: CostBook,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Config {
    /// Create config from file config and command-line overrides
    pub fn from_file(file_config: &FileConfig, overrides: Overrides) -> Result<Self> {
        let start_date = overrides.start_date.as_deref().map(parse_date).transpose()?;
        let end_date = overrides.end_date.as_deref().map(parse_date).transpose()?;
        if let (Some(start), Some(end)) = (start_date, end_date)
            && start > end
        {
            anyhow::bail!("Start date {} is after end date {}", start, end);
        }

        let sources = &file_config.sources;
        let local = if overrides.skip_local {
            None
        } else {
            overrides
                .root_dir
                .or_else(|| sources.root_dir.clone())
                .map(|root| LocalSettings {
                    root,
                    sheet_name: sources
                        .sheet_name
                        .clone()
                        .unwrap_or_else(|| constants::DEFAULT_SHEET_NAME.to_string()),
                    filter: DiscoveryFilter {
                        marker: sources
                            .file_marker
                            .clone()
                            .unwrap_or_else(|| constants::DEFAULT_FILE_MARKER.to_string()),
                        start: start_date,
                        end: end_date,
                    },
                })
        };

        let portal = match (&file_config.portal, overrides.skip_portal) {
            (Some(portal), false) => Some(PortalSettings {
                base_url: portal.base_url.clone(),
                username: portal.username.clone(),
                password: portal.password.clone(),
                runs: portal.runs.clone(),
                page_size: portal.page_size.unwrap_or(constants::DEFAULT_PAGE_SIZE),
            }),
            _ => None,
        };

        if local.is_none() && portal.is_none() {
            anyhow::bail!(
                "No fee sources enabled.\n\n\
                Set sources.root_dir (or pass --root-dir) for local reports,\n\
                and/or add a [portal] section to config.toml."
            );
        }

        let sentinels = Sentinels {
            local: sentinel(&sources.local_contract, constants::DEFAULT_LOCAL_CONTRACT)
                .with_context(|| "Invalid sources.local_contract")?,
            portal: sentinel(&sources.portal_contract, constants::DEFAULT_PORTAL_CONTRACT)
                .with_context(|| "Invalid sources.portal_contract")?,
        };

        let borders = match &file_config.report.border_table {
            Some(path) => BorderTable::load(path)?,
            None => BorderTable::builtin()?,
        };

        Ok(Self {
            local,
            portal,
            sentinels,
            output: overrides
                .output
                .or_else(|| file_config.report.output.clone())
                .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_OUTPUT_FILENAME)),
            borders,
            costs: cost_book(file_config)?,
            start_date,
            end_date,
        })
    }
}

/// Parse a YYYY-MM-DD command-line date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", value))
}

/// Ask for a date range on the terminal
///
/// Returns `(start, end)` as YYYY-MM-DD strings. Any invalid choice or date
/// falls back to processing every file.
pub fn prompt_date_range<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<(Option<String>, Option<String>)> {
    writeln!(output, "\nDate Range Selection:")?;
    writeln!(output, "1. Process all files (no date filtering)")?;
    writeln!(output, "2. Specify date range")?;

    match ask(input, output, "Enter choice (1 or 2): ")?.as_str() {
        "1" => Ok((None, None)),
        "2" => {
            let start = ask(input, output, "Enter start date (YYYY-MM-DD): ")?;
            let end = ask(input, output, "Enter end date (YYYY-MM-DD): ")?;
            let start = (!start.is_empty()).then_some(start);
            let end = (!end.is_empty()).then_some(end);

            for value in start.iter().chain(end.iter()) {
                if let Err(e) = parse_date(value) {
                    writeln!(output, "{}. Processing all files.", e)?;
                    return Ok((None, None));
                }
            }
            Ok((start, end))
        }
        _ => {
            writeln!(output, "Invalid choice. Processing all files.")?;
            Ok((None, None))
        }
    }
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn sentinel(configured: &Option<String>, default: &str) -> Result<ContractId> {
    let value = configured.as_deref().unwrap_or(default);
    ContractId::parse(value).with_context(|| format!("Contract name '{}' is empty", value))
}

fn cost_book(file_config: &FileConfig) -> Result<CostBook> {
    let defaults = CostSheet::default().with_overrides(&file_config.costs);

    let mut runs = HashMap::new();
    for (key, overrides) in &file_config.runs {
        let run = RunId::parse(key).with_context(|| format!("Invalid run id '{}' in [runs]", key))?;
        runs.insert(run, overrides.clone());
    }

    Ok(CostBook::new(defaults, runs))
}
