//! Downstream envelope construction and HTTP forwarding.
//!
//! One POST per envelope, bounded timeout, no retries. Delivery is
//! best-effort: every failure mode is absorbed and reported as `false`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::store::{Record, StoreKind, Target};

/// Timeout applied to every forwarding request.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Collection or table tag, keyed per datastore family on the wire.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
enum TargetField {
    Collection { collection_name: String },
    Table { table_name: String },
}

impl From<&Target> for TargetField {
    fn from(target: &Target) -> Self {
        match target {
            Target::Collection(name) => Self::Collection {
                collection_name: name.clone(),
            },
            Target::Table(name) => Self::Table {
                table_name: name.clone(),
            },
        }
    }
}

/// Outbound unit sent to the ingestion endpoint.
///
/// Every metadata tag is required and non-null by construction.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub cluster: String,
    pub database: StoreKind,
    pub db_name: String,
    #[serde(flatten)]
    target: TargetField,
    pub source: String,
    pub data: serde_json::Value,
    pub message: String,
}

impl Envelope {
    /// Wrap a record with the deployment metadata from the configuration.
    pub fn new(config: &AppConfig, record: &Record) -> Self {
        Self {
            timestamp: Utc::now(),
            cluster: config.cluster.clone(),
            database: config.store.kind,
            db_name: config.store.db_name.clone(),
            target: TargetField::from(&record.target),
            source: config.store.source.clone(),
            data: record.data.to_json(),
            message: record.message.clone(),
        }
    }

    /// Collection or table name this envelope describes.
    pub fn target_name(&self) -> &str {
        match &self.target {
            TargetField::Collection { collection_name } => collection_name,
            TargetField::Table { table_name } => table_name,
        }
    }
}

/// Single-attempt HTTP forwarder for the ingestion endpoint.
pub struct Forwarder {
    client: reqwest::Client,
    endpoint: String,
}

impl Forwarder {
    /// Create a forwarder with the request timeout baked into the client.
    ///
    /// # Errors
    /// Returns `ConfigError` if the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, crate::config::ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .build()
            .map_err(|e| {
                crate::config::ConfigError::ValidationError(format!(
                    "failed to build HTTP client: {e}"
                ))
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Send one envelope. Returns `true` only on a 2xx response; network
    /// errors, timeouts and error statuses are logged and reported as
    /// `false`. No retry, no backoff.
    pub async fn forward(&self, envelope: &Envelope) -> bool {
        let result = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(envelope)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    target = %envelope.target_name(),
                    status = response.status().as_u16(),
                    "Envelope forwarded"
                );
                true
            }
            Ok(response) => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    target = %envelope.target_name(),
                    status = response.status().as_u16(),
                    "Forwarding rejected by endpoint"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    target = %envelope.target_name(),
                    error = %e,
                    "Forwarding failed"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreConfig, DEFAULT_INTERVAL, DEFAULT_RETRY_DELAY};
    use crate::value::Value;

    fn config(kind: StoreKind) -> AppConfig {
        AppConfig {
            store: StoreConfig::new(
                kind,
                "localhost".to_string(),
                None,
                None,
                None,
                None,
                None,
                None,
            ),
            endpoint: "http://127.0.0.1:8080".to_string(),
            cluster: AppConfig::default_cluster(kind).to_string(),
            interval: DEFAULT_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[test]
    fn test_envelope_document_variant_schema() {
        let record = Record {
            target: Target::Collection("sample".to_string()),
            data: Value::map([("key", Value::Str("Ab3dEf6hIj".to_string()))]),
            message: "MongoDB data from mongo-a/dbA.sample: key=Ab3dEf6hIj".to_string(),
        };
        let envelope = Envelope::new(&config(StoreKind::Mongodb), &record);
        let json = serde_json::to_value(&envelope).unwrap();

        assert!(json["@timestamp"].is_string());
        assert_eq!(json["cluster"], "cluster2");
        assert_eq!(json["database"], "mongodb");
        assert_eq!(json["db_name"], "dbA");
        assert_eq!(json["collection_name"], "sample");
        assert_eq!(json["source"], "mongo-a");
        assert_eq!(json["data"]["key"], "Ab3dEf6hIj");
        assert!(json.get("table_name").is_none());
    }

    #[test]
    fn test_envelope_relational_variant_schema() {
        let record = Record {
            target: Target::Table("a_table1".to_string()),
            data: Value::Seq(vec![Value::map([("id", Value::Int(1))])]),
            message: "PostgreSQL data from postgres-a/db_a.a_table1".to_string(),
        };
        let envelope = Envelope::new(&config(StoreKind::Postgresql), &record);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["cluster"], "cluster1");
        assert_eq!(json["database"], "postgresql");
        assert_eq!(json["table_name"], "a_table1");
        assert!(json.get("collection_name").is_none());
        assert!(json["data"].is_array());
    }

    #[test]
    fn test_envelope_metadata_non_null() {
        let record = Record {
            target: Target::Collection("sample".to_string()),
            data: Value::Null,
            message: "m".to_string(),
        };
        let json = serde_json::to_value(Envelope::new(&config(StoreKind::Mongodb), &record)).unwrap();
        for field in ["@timestamp", "cluster", "database", "db_name", "source", "message"] {
            assert!(!json[field].is_null(), "field {field} must be non-null");
        }
        // Payload nulls stay explicit.
        assert!(json["data"].is_null());
        assert!(json.as_object().unwrap().contains_key("data"));
    }
}
