//! Logpump - Datastore Sampling and Log-Forwarding Daemon
//!
//! This crate provides the core functionality for the logpump daemon. It
//! periodically generates a random record, inserts it into a backing
//! datastore (MongoDB or PostgreSQL), reads the most recently created
//! records back, and forwards each as a JSON envelope to a downstream
//! log-ingestion HTTP endpoint.
//!
//! # Architecture
//!
//! - **Value**: tagged value model bridging datastore-native types to JSON
//! - **Store**: connection lifecycle and record operations per datastore
//! - **Forward**: envelope construction and best-effort HTTP delivery
//! - **Cycle**: the phase state machine driving the iteration loop

pub mod config;
pub mod cycle;
pub mod forward;
pub mod store;
pub mod value;

pub use config::{AppConfig, ConfigError, StoreConfig};
pub use cycle::{CycleController, Phase};
pub use forward::{Envelope, Forwarder};
pub use store::{MongoStore, PostgresStore, Record, StoreClient, StoreError, StoreKind, Target};
pub use value::Value;
