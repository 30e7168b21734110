//! TOML configuration for railreport.
//!
//! Layered: an explicit `--config` path, then `RAILREPORT_CONFIG`, then
//! `./railreport.toml`, then compiled-in defaults. TestRail credentials can
//! be overridden from the environment after the file is loaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{ExecutedStatusSet, StatusId};

pub const CONFIG_ENV: &str = "RAILREPORT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "railreport.toml";
pub const MAX_WORKERS: usize = 16;
/// TestRail caps paginated responses at 250 items.
pub const MAX_PAGE_SIZE: u32 = 250;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RailReportConfig {
    #[serde(default)]
    pub testrail: TestRailConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl RailReportConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the configuration file and apply environment overrides.
    ///
    /// An explicit path must load. A broken `RAILREPORT_CONFIG` file is
    /// reported and skipped.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "RAILREPORT_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Override TestRail credentials from `TESTRAIL_URL`,
    /// `TESTRAIL_USERNAME` and `TESTRAIL_API_KEY`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty("TESTRAIL_URL") {
            self.testrail.url = url;
        }
        if let Some(user) = non_empty("TESTRAIL_USERNAME") {
            self.testrail.username = user;
        }
        if let Some(key) = non_empty("TESTRAIL_API_KEY") {
            self.testrail.api_key = key;
        }
    }
}

// ---------------------------------------------------------------------------
// TestRail
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestRailConfig {
    /// Base URL, e.g. `https://example.testrail.io`.
    pub url: String,
    pub username: String,
    pub api_key: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// `limit` used for paginated endpoints; clamped to 1..=250.
    pub page_size: u32,
}

impl Default for TestRailConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            api_key: String::new(),
            timeout_secs: 20,
            page_size: 250,
        }
    }
}

impl TestRailConfig {
    pub fn page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

impl std::fmt::Debug for TestRailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRailConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Trailing window length in local calendar days.
    pub days: u32,
    /// IANA name or fixed offset (`+02:00`, `UTC-5`).
    pub timezone: String,
    /// Used when `timezone` cannot be resolved.
    pub fallback_utc_offset_hours: i32,
    pub plan_ids: Vec<u64>,
    pub run_ids: Vec<u64>,
    pub milestone_ids: Vec<u64>,
    /// Status ids that count as executed.
    pub executed_statuses: Vec<u8>,
    /// Concurrent fetches; clamped to 1..=16.
    pub workers: usize,
    pub output_dir: PathBuf,
    /// Plan id (as a TOML key) to display name.
    pub plan_names: BTreeMap<String, String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            days: 14,
            timezone: "UTC".to_string(),
            fallback_utc_offset_hours: 0,
            plan_ids: Vec::new(),
            run_ids: Vec::new(),
            milestone_ids: Vec::new(),
            executed_statuses: vec![1, 5],
            workers: 6,
            output_dir: PathBuf::from("output"),
            plan_names: BTreeMap::new(),
        }
    }
}

impl ReportConfig {
    pub fn workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }

    pub fn executed_set(&self) -> ExecutedStatusSet {
        if self.executed_statuses.is_empty() {
            warn!("executed_statuses is empty, using passed and failed");
            return ExecutedStatusSet::default();
        }
        ExecutedStatusSet::new(self.executed_statuses.iter().map(|&s| StatusId(s)))
    }

    /// Configured plan display names keyed by numeric id. Non-numeric keys
    /// are ignored with a warning.
    pub fn plan_names(&self) -> BTreeMap<u64, String> {
        self.plan_names
            .iter()
            .filter_map(|(key, name)| match key.trim().parse::<u64>() {
                Ok(id) => Some((id, name.clone())),
                Err(_) => {
                    warn!(key = %key, "ignoring plan_names entry with non-numeric plan id");
                    None
                }
            })
            .collect()
    }
}
