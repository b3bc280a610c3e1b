//! Guard configuration via `stratalock.toml`
//!
//! Declares protected operations and the defaults they fall back on. Every
//! `[[operation]]` becomes a [`ProtectedOperation`]; fields left out take the
//! top-level defaults.

use crate::operation::{ProtectedOperation, UnitOfWorkStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strata_core::{StrataError, StrataResult};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "stratalock.toml";

fn default_wait_ms() -> u64 {
    5000
}

fn default_lease_ms() -> u64 {
    3000
}

fn default_strategy_str() -> String {
    UnitOfWorkStrategy::default().as_str().to_string()
}

fn default_params() -> Vec<String> {
    vec!["lockName".to_string(), "id".to_string(), "quantity".to_string()]
}

fn default_key() -> String {
    "#lockName".to_string()
}

/// One `[[operation]]` record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationConfig {
    /// Registry name
    pub name: String,
    /// Parameter names (default: `["lockName", "id", "quantity"]`)
    #[serde(default = "default_params")]
    pub params: Vec<String>,
    /// Key expression (default: `"#lockName"`)
    #[serde(default = "default_key")]
    pub key: String,
    /// Wait in milliseconds; falls back to `default_wait_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_ms: Option<u64>,
    /// Lease in milliseconds; falls back to `default_lease_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_ms: Option<u64>,
    /// Strategy string; falls back to `default_strategy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

/// Configuration loaded from `stratalock.toml`
///
/// # Example
///
/// ```toml
/// default_strategy = "commit_joined"
///
/// [[operation]]
/// name = "decrease_stock"
/// key = "stock-#id"
/// strategy = "forced_nested"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardConfig {
    /// Wait applied to operations that do not set one
    #[serde(default = "default_wait_ms")]
    pub default_wait_ms: u64,
    /// Lease applied to operations that do not set one
    #[serde(default = "default_lease_ms")]
    pub default_lease_ms: u64,
    /// Strategy applied to operations that do not set one
    #[serde(default = "default_strategy_str")]
    pub default_strategy: String,
    /// Artificial latency of each storage commit, widening the window in
    /// which a released-but-uncommitted write is visible as stale
    #[serde(default)]
    pub commit_latency_ms: u64,
    /// Declared operations
    #[serde(default, rename = "operation", skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationConfig>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            default_wait_ms: default_wait_ms(),
            default_lease_ms: default_lease_ms(),
            default_strategy: default_strategy_str(),
            commit_latency_ms: 0,
            operations: Vec::new(),
        }
    }
}

impl GuardConfig {
    /// Parse the default strategy string
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown strategy.
    pub fn default_strategy(&self) -> StrataResult<UnitOfWorkStrategy> {
        self.default_strategy.parse()
    }

    /// Storage commit latency
    pub fn commit_latency(&self) -> Duration {
        Duration::from_millis(self.commit_latency_ms)
    }

    /// Declared operations with defaults applied
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a strategy string is unknown, a declaration
    /// does not validate or two operations share a name.
    pub fn operations(&self) -> StrataResult<Vec<ProtectedOperation>> {
        let default_strategy = self.default_strategy()?;
        let mut operations: Vec<ProtectedOperation> = Vec::with_capacity(self.operations.len());

        for record in &self.operations {
            let strategy = match &record.strategy {
                Some(s) => s.parse()?,
                None => default_strategy,
            };
            let operation = ProtectedOperation::new(record.name.clone(), record.key.clone())
                .params(record.params.iter().cloned())
                .wait(Duration::from_millis(record.wait_ms.unwrap_or(self.default_wait_ms)))
                .lease(Duration::from_millis(
                    record.lease_ms.unwrap_or(self.default_lease_ms),
                ))
                .strategy(strategy);
            operation.validate()?;

            if operations.iter().any(|existing| existing.name == operation.name) {
                return Err(StrataError::invalid_input(format!(
                    "operation '{}' is declared more than once",
                    operation.name
                )));
            }
            operations.push(operation);
        }
        Ok(operations)
    }

    /// Check every value eagerly
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero default lease or any error of
    /// [`GuardConfig::operations`].
    pub fn validate(&self) -> StrataResult<()> {
        if self.default_lease_ms == 0 {
            return Err(StrataError::invalid_input(
                "default_lease_ms must be greater than zero",
            ));
        }
        self.operations().map(|_| ())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r##"# stratalock configuration
#
# Defaults for operations that do not set their own values
default_wait_ms = 5000
default_lease_ms = 3000

# Where the commit happens relative to the lock:
#   "embedded"           = commit after release (race, for demonstration)
#   "forced_nested"      = commit in a new unit of work inside the lock
#   "priority_reordered" = lock ordered outside the transaction
#   "commit_joined"      = lock released by the commit itself (default)
default_strategy = "commit_joined"

# Artificial storage commit latency in milliseconds (default: 0)
commit_latency_ms = 0

# [[operation]]
# name = "decrease_stock"
# params = ["lockName", "id", "quantity"]   # optional
# key = "stock-#id"                          # optional, default "#lockName"
# wait_ms = 1000                             # optional
# lease_ms = 3000                            # optional
# strategy = "forced_nested"                 # optional
"##
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: GuardConfig = toml::from_str(&content).map_err(|e| {
            StrataError::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StrataResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                StrataError::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StrataResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StrataError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StrataError::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
