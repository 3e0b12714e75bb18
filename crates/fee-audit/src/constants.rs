//! Centralized constants for the agent fee audit
//!
//! Site-specific settings (report root, portal credentials, cost overrides)
//! are loaded from config.toml.

// =============================================================================
// Local Reports
// =============================================================================

/// Substring every local fee report filename contains
pub const DEFAULT_FILE_MARKER: &str = "STE_Report";

/// Worksheet holding the per-consignment rows
pub const DEFAULT_SHEET_NAME: &str = "All Data";

/// Header of the run column in the report sheet
pub const RUN_COLUMN: &str = "Run";

/// Header of the fee column in the report sheet
pub const AMOUNT_COLUMN: &str = "Agent Fee";

/// Accepted headers for the optional contract column
pub const CONTRACT_COLUMNS: [&str; 2] = ["Contract", "Contract Name"];

/// Contract assigned to local rows without a contract column
pub const DEFAULT_LOCAL_CONTRACT: &str = "STE";

// =============================================================================
// Fee Portal
// =============================================================================

/// Contract assigned to portal manifests without a contract
pub const DEFAULT_PORTAL_CONTRACT: &str = "PORTAL";

/// Login endpoint (relative to the portal base URL)
pub const PORTAL_LOGIN_PATH: &str = "/auth/login";

/// Manifest listing endpoint (relative to the portal base URL)
pub const PORTAL_MANIFESTS_PATH: &str = "/manifests";

/// Manifests requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

// =============================================================================
// Report Layout
// =============================================================================

/// Weekday columns shown per section (dates beyond this are not rendered)
pub const WEEKDAYS: usize = 5;

/// Weekday column headers, in column order
pub const WEEKDAY_NAMES: [&str; WEEKDAYS] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

/// Default running cost per weekday
pub const DEFAULT_DAILY_RUNNING_COST: i64 = 140;

/// Default weekly running cost surcharge
pub const DEFAULT_WEEKLY_SURCHARGE: i64 = 65;

/// Worksheet name of the audit workbook
pub const AUDIT_SHEET_NAME: &str = "Audit";

/// Date format of the section caption
pub const CAPTION_DATE_FORMAT: &str = "%d/%m/%Y";

// =============================================================================
// File Names
// =============================================================================

/// Default config file path
pub const CONFIG_FILENAME: &str = "config.toml";

/// Default audit workbook filename
pub const DEFAULT_OUTPUT_FILENAME: &str = "Agent_Fee_Audit.xlsx";

/// Flattened fee ledger written next to the workbook
pub const FEE_LEDGER_FILENAME: &str = "fee_ledger.csv";
