//! Store client seam and shared record types.

mod mongo;
mod postgres;

pub use mongo::MongoStore;
pub use postgres::PostgresStore;

use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::value::Value;

/// Bound applied to every connect / liveness round-trip.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How many recent records a read returns, newest first.
pub const READ_LIMIT: i64 = 5;

/// Datastore family the daemon talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Mongodb,
    Postgresql,
}

impl StoreKind {
    /// Wire tag used in the envelope `database` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mongodb => "mongodb",
            Self::Postgresql => "postgresql",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record came from: a collection or a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Collection(String),
    Table(String),
}

impl Target {
    /// Collection or table name.
    pub fn name(&self) -> &str {
        match self {
            Self::Collection(name) | Self::Table(name) => name,
        }
    }
}

/// An immutable unit of data produced by a write or a read.
///
/// One record becomes one envelope: a single document for the document-store
/// variant, a non-empty batch of rows for a table in the relational variant.
#[derive(Debug, Clone)]
pub struct Record {
    /// Collection or table the data belongs to.
    pub target: Target,
    /// Payload in the tagged value model.
    pub data: Value,
    /// Human-readable summary, used as the envelope `message`.
    pub message: String,
}

/// Errors produced by store operations.
///
/// Read failures are absorbed inside `read_recent` and never surface here;
/// the two remaining cases drive the controller's skip-iteration policy.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connect, reconnect or health-check failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Insert or transactional failure; partial state has been rolled back.
    #[error("write error: {0}")]
    Write(String),
}

impl StoreError {
    pub(crate) fn connection(e: impl std::fmt::Display) -> Self {
        Self::Connection(e.to_string())
    }

    pub(crate) fn write(e: impl std::fmt::Display) -> Self {
        Self::Write(e.to_string())
    }
}

/// Connection lifecycle and record operations against a backing datastore.
///
/// Implementations own their connection handle exclusively; the handle moves
/// through disconnected / connected / broken states and is never reused once
/// broken — reconnection always creates a fresh one.
#[async_trait::async_trait]
pub trait StoreClient: Send {
    /// Datastore family tag for envelopes and logs.
    fn kind(&self) -> StoreKind;

    /// Establish a fresh connection with a bounded timeout, verifying
    /// liveness with a trivial round-trip before declaring success.
    async fn connect(&mut self) -> Result<(), StoreError>;

    /// Probe the current connection; on failure discard the stale handle
    /// (close errors ignored) and reconnect.
    async fn ensure_healthy(&mut self) -> Result<(), StoreError>;

    /// Generate and persist one pseudo-random record.
    async fn write_record(&mut self) -> Result<Record, StoreError>;

    /// Read at most `limit` most recently created records, newest first.
    ///
    /// Failures degrade to an empty result and mark the connection broken so
    /// the next probe reconnects; they never propagate.
    async fn read_recent(&mut self, limit: i64) -> Vec<Record>;

    /// Mark the connection broken so the next probe reconnects.
    fn invalidate(&mut self);

    /// Best-effort close; errors are suppressed.
    async fn close(&mut self);
}

/// Connection handle states shared by the store implementations.
pub(crate) enum ConnState<S> {
    Disconnected,
    Connected(S),
    Broken,
}

impl<S> Default for ConnState<S> {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl<S> ConnState<S> {
    pub(crate) fn session(&mut self) -> Option<&mut S> {
        match self {
            Self::Connected(session) => Some(session),
            _ => None,
        }
    }
}

/// Generate a random alphanumeric key of the given length.
pub(crate) fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_key_pattern() {
        for len in [10, 15] {
            let key = random_key(len);
            assert_eq!(key.len(), len);
            assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_random_keys_distinct() {
        // Birthday bound: 62^10 keys make collisions vanishingly unlikely.
        let keys: std::collections::HashSet<_> = (0..256).map(|_| random_key(10)).collect();
        assert_eq!(keys.len(), 256);
    }

    #[test]
    fn test_store_kind_tags() {
        assert_eq!(StoreKind::Mongodb.as_str(), "mongodb");
        assert_eq!(StoreKind::Postgresql.as_str(), "postgresql");
        assert_eq!(
            serde_json::to_value(StoreKind::Postgresql).unwrap(),
            serde_json::json!("postgresql")
        );
    }

    #[test]
    fn test_target_name() {
        assert_eq!(Target::Collection("sample".into()).name(), "sample");
        assert_eq!(Target::Table("a_table1".into()).name(), "a_table1");
    }
}
