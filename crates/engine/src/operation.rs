//! Protected operation declarations
//!
//! A [`ProtectedOperation`] is the per-operation configuration record of a
//! guarded call: which parameters it takes, how its lock key is derived, how
//! long to wait for the lock, how long the grant is honored, and which
//! [`UnitOfWorkStrategy`] places its commit relative to the lock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use strata_core::{StrataError, StrataResult};

/// Default wait for a contended lock
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Default lease of a granted lock
pub const DEFAULT_LEASE: Duration = Duration::from_secs(3);

/// Where a protected operation's commit happens relative to its lock
///
/// | Strategy | Commit before release |
/// |---|---|
/// | `Embedded` | no; the ambient unit of work commits after release |
/// | `ForcedNested` | yes; the body commits in its own unit of work |
/// | `PriorityReordered` | yes, as long as the lock interceptor runs first |
/// | `CommitJoined` | yes; the lock is released by the commit itself |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfWorkStrategy {
    /// Body joins the ambient unit of work, which commits after the lock is
    /// released. Exhibits the stale-read race.
    Embedded,
    /// Body runs in a new unit of work committed inside the lock. Loses
    /// atomicity with any enclosing unit of work.
    ForcedNested,
    /// Ambient unit of work, but the lock interceptor is ordered outside the
    /// transaction interceptor.
    PriorityReordered,
    /// Lock guard is bound to the unit of work and released after its commit
    /// or rollback.
    #[default]
    CommitJoined,
}

impl UnitOfWorkStrategy {
    /// All strategies
    pub const ALL: [UnitOfWorkStrategy; 4] = [
        UnitOfWorkStrategy::Embedded,
        UnitOfWorkStrategy::ForcedNested,
        UnitOfWorkStrategy::PriorityReordered,
        UnitOfWorkStrategy::CommitJoined,
    ];

    /// Config string of this strategy
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfWorkStrategy::Embedded => "embedded",
            UnitOfWorkStrategy::ForcedNested => "forced_nested",
            UnitOfWorkStrategy::PriorityReordered => "priority_reordered",
            UnitOfWorkStrategy::CommitJoined => "commit_joined",
        }
    }

    /// True if the commit is guaranteed to finish before the lock is released
    pub fn commits_before_release(&self) -> bool {
        !matches!(self, UnitOfWorkStrategy::Embedded)
    }
}

impl fmt::Display for UnitOfWorkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitOfWorkStrategy {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitOfWorkStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| {
                StrataError::invalid_input(format!(
                    "Invalid strategy '{}'. Expected one of \"embedded\", \"forced_nested\", \
                     \"priority_reordered\" or \"commit_joined\".",
                    s
                ))
            })
    }
}

/// Declaration of one lock-protected operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedOperation {
    /// Registry name
    pub name: String,
    /// Parameter names, positionally matching the call's arguments
    pub params: Vec<String>,
    /// Lock key expression, resolved against the arguments
    pub key: String,
    /// Longest time to block waiting for the lock
    pub wait: Duration,
    /// How long a grant is honored without release
    pub lease: Duration,
    /// Commit placement
    pub strategy: UnitOfWorkStrategy,
}

impl ProtectedOperation {
    /// Declare an operation with default wait, lease and strategy
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            key: key.into(),
            wait: DEFAULT_WAIT,
            lease: DEFAULT_LEASE,
            strategy: UnitOfWorkStrategy::default(),
        }
    }

    /// Set the parameter names
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Set the wait time
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Set the lease time
    pub fn lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Set the strategy
    pub fn strategy(mut self, strategy: UnitOfWorkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Parameter names as string slices, for the key resolver
    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(String::as_str).collect()
    }

    /// Check the declaration is usable
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty name or key expression, a zero
    /// lease, or duplicate parameter names.
    pub fn validate(&self) -> StrataResult<()> {
        if self.name.trim().is_empty() {
            return Err(StrataError::invalid_input("operation name must not be empty"));
        }
        if self.key.trim().is_empty() {
            return Err(StrataError::invalid_input(format!(
                "operation '{}' has an empty key expression",
                self.name
            )));
        }
        if self.lease.is_zero() {
            return Err(StrataError::invalid_input(format!(
                "operation '{}' must have a non-zero lease",
                self.name
            )));
        }
        for (i, param) in self.params.iter().enumerate() {
            if self.params[..i].contains(param) {
                return Err(StrataError::invalid_input(format!(
                    "operation '{}' declares parameter '{}' twice",
                    self.name, param
                )));
            }
        }
        Ok(())
    }
}
