//! Transaction definition: propagation, isolation and advisory hints.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// How a new scope relates to the transaction already active, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Join the active transaction or start one.
    #[default]
    Required,
    /// Always start an independent transaction, suspending the active one.
    RequiresNew,
    /// Savepoint inside the active transaction, or start one.
    Nested,
    /// Join the active transaction, or run without one.
    Supports,
    /// Suspend the active transaction and run without one.
    NotSupported,
    /// Join the active transaction; fail when there is none.
    Mandatory,
    /// Run without a transaction; fail when one is active.
    Never,
}

impl Display for Propagation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Required => "required",
            Self::RequiresNew => "requires_new",
            Self::Nested => "nested",
            Self::Supports => "supports",
            Self::NotSupported => "not_supported",
            Self::Mandatory => "mandatory",
            Self::Never => "never",
        };
        f.write_str(text)
    }
}

/// Requested isolation level; advisory for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Whatever the connection uses by default.
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Display for Isolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Default => "default",
            Self::ReadUncommitted => "read_uncommitted",
            Self::ReadCommitted => "read_committed",
            Self::RepeatableRead => "repeatable_read",
            Self::Serializable => "serializable",
        };
        f.write_str(text)
    }
}

/// Attributes of one transactional scope.
///
/// ```
/// use petstore_core::tx::{Propagation, TransactionDefinition};
/// use std::time::Duration;
///
/// let definition = TransactionDefinition::requires_new()
///     .with_read_only(true)
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(definition.propagation, Propagation::RequiresNew);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransactionDefinition {
    pub propagation: Propagation,
    pub isolation: Isolation,
    pub read_only: bool,
    pub timeout: Option<Duration>,
}

impl TransactionDefinition {
    pub fn new(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }

    pub fn required() -> Self {
        Self::new(Propagation::Required)
    }

    pub fn requires_new() -> Self {
        Self::new(Propagation::RequiresNew)
    }

    pub fn nested() -> Self {
        Self::new(Propagation::Nested)
    }

    pub fn supports() -> Self {
        Self::new(Propagation::Supports)
    }

    pub fn not_supported() -> Self {
        Self::new(Propagation::NotSupported)
    }

    pub fn mandatory() -> Self {
        Self::new(Propagation::Mandatory)
    }

    pub fn never() -> Self {
        Self::new(Propagation::Never)
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }
}
