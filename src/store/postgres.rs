//! Relational store client (PostgreSQL).
//!
//! Each write inserts one row into each of the two tables mapped to the
//! configured database name, inside a single transaction. Reads return the
//! most recent rows per table, newest first.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_postgres::config::TargetSessionAttrs;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::config::StoreConfig;
use crate::store::{
    random_key, ConnState, Record, StoreClient, StoreError, StoreKind, Target, CONNECT_TIMEOUT,
};
use crate::value::Value;

/// Length of the generated alphanumeric text value.
const INFO_LEN: usize = 15;

/// Table and column names for one logical database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableMap {
    table1: &'static str,
    table2: &'static str,
    text_col: &'static str,
    num_col: &'static str,
    /// Whether table 2 stores the generated integer scaled down to a
    /// fractional numeric (value / 100).
    fractional: bool,
}

/// Fixed lookup keyed by database name. Unrecognized names fall back to the
/// `db_a` pair.
fn table_map(db_name: &str) -> TableMap {
    match db_name {
        "db_b" => TableMap {
            table1: "b_table1",
            table2: "b_table2",
            text_col: "note",
            num_col: "amount",
            fractional: true,
        },
        _ => TableMap {
            table1: "a_table1",
            table2: "a_table2",
            text_col: "info",
            num_col: "value",
            fractional: false,
        },
    }
}

fn scaled_amount(value: i32) -> Decimal {
    Decimal::from(value) / Decimal::from(100)
}

struct Session {
    client: tokio_postgres::Client,
    driver: JoinHandle<()>,
}

/// Store client for the relational variant.
pub struct PostgresStore {
    config: StoreConfig,
    conn: ConnState<Session>,
}

impl PostgresStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            conn: ConnState::Disconnected,
        }
    }
}

async fn open_session(config: &StoreConfig) -> Result<Session, StoreError> {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.user)
        .password(&config.password)
        .dbname(&config.db_name)
        .connect_timeout(CONNECT_TIMEOUT);
    if config.replica_set.is_some() {
        // Replicated topology: only a writable primary is acceptable.
        pg.target_session_attrs(TargetSessionAttrs::ReadWrite);
    }

    let (client, connection) = timeout(CONNECT_TIMEOUT, pg.connect(NoTls))
        .await
        .map_err(|_| StoreError::Connection("connect timed out".to_string()))?
        .map_err(StoreError::connection)?;

    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "PostgreSQL connection task ended");
        }
    });

    // Liveness round-trip before declaring the connection usable.
    match timeout(CONNECT_TIMEOUT, client.simple_query("SELECT 1")).await {
        Ok(Ok(_)) => Ok(Session { client, driver }),
        Ok(Err(e)) => {
            driver.abort();
            Err(StoreError::connection(e))
        }
        Err(_) => {
            driver.abort();
            Err(StoreError::Connection("liveness check timed out".to_string()))
        }
    }
}

fn timestamp_value(row: &Row) -> Value {
    match row.try_get::<_, Option<NaiveDateTime>>("created_at").ok().flatten() {
        Some(naive) => Value::Timestamp(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)),
        None => Value::Null,
    }
}

fn text_row_value(row: &Row, map: &TableMap) -> Value {
    let mut entries = BTreeMap::new();
    entries.insert("id".to_string(), Value::Int(row.get::<_, i32>("id").into()));
    entries.insert(
        map.text_col.to_string(),
        Value::Str(row.get::<_, String>(map.text_col)),
    );
    entries.insert("created_at".to_string(), timestamp_value(row));
    Value::Map(entries)
}

fn num_row_value(row: &Row, map: &TableMap) -> Value {
    let mut entries = BTreeMap::new();
    entries.insert("id".to_string(), Value::Int(row.get::<_, i32>("id").into()));
    let num = if map.fractional {
        Value::Decimal(row.get::<_, Decimal>(map.num_col))
    } else {
        Value::Int(row.get::<_, i32>(map.num_col).into())
    };
    entries.insert(map.num_col.to_string(), num);
    entries.insert("created_at".to_string(), timestamp_value(row));
    Value::Map(entries)
}

fn insert_sql(table: &str, column: &str) -> String {
    format!(
        "INSERT INTO {table} ({column}, created_at) VALUES ($1, $2) RETURNING id, {column}, created_at"
    )
}

fn select_recent_sql(table: &str, column: &str) -> String {
    format!("SELECT id, {column}, created_at FROM {table} ORDER BY created_at DESC LIMIT $1")
}

#[async_trait::async_trait]
impl StoreClient for PostgresStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Postgresql
    }

    async fn connect(&mut self) -> Result<(), StoreError> {
        let session = open_session(&self.config).await?;
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            db = %self.config.db_name,
            source = %self.config.source,
            "Connected to PostgreSQL"
        );
        self.conn = ConnState::Connected(session);
        Ok(())
    }

    async fn ensure_healthy(&mut self) -> Result<(), StoreError> {
        if let Some(session) = self.conn.session() {
            if session.client.is_closed() {
                tracing::warn!("PostgreSQL connection closed, reconnecting");
            } else {
                match timeout(CONNECT_TIMEOUT, session.client.simple_query("SELECT 1")).await {
                    Ok(Ok(_)) => return Ok(()),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "PostgreSQL connection unhealthy, reconnecting")
                    }
                    Err(_) => tracing::warn!("PostgreSQL health probe timed out, reconnecting"),
                }
            }
            // Discard the stale handle; close errors are ignored.
            if let ConnState::Connected(stale) = std::mem::take(&mut self.conn) {
                let Session { client, driver } = stale;
                drop(client);
                driver.abort();
            }
        }
        self.connect().await
    }

    async fn write_record(&mut self) -> Result<Record, StoreError> {
        let config = self.config.clone();
        let map = table_map(&config.db_name);
        let session = self
            .conn
            .session()
            .ok_or_else(|| StoreError::Connection("not connected".to_string()))?;

        let info = random_key(INFO_LEN);
        let value: i32 = rand::thread_rng().gen_range(1..=10_000);
        let now = Utc::now().naive_utc();

        let tx = session.client.transaction().await.map_err(StoreError::write)?;

        let amount = scaled_amount(value);
        let num_param: &(dyn ToSql + Sync) = if map.fractional { &amount } else { &value };

        let inserts = async {
            let row1 = tx
                .query_one(&insert_sql(map.table1, map.text_col), &[&info, &now])
                .await?;
            let row2 = tx
                .query_one(&insert_sql(map.table2, map.num_col), &[num_param, &now])
                .await?;
            Ok::<_, tokio_postgres::Error>((row1, row2))
        }
        .await;

        let (row1, row2) = match inserts {
            Ok(rows) => rows,
            Err(e) => {
                // Roll back any partial state before propagating.
                tx.rollback().await.ok();
                return Err(StoreError::write(e));
            }
        };
        tx.commit().await.map_err(StoreError::write)?;

        let id1: i32 = row1.get("id");
        let id2: i32 = row2.get("id");
        let mut data = BTreeMap::new();
        data.insert(map.table1.to_string(), text_row_value(&row1, &map));
        data.insert(map.table2.to_string(), num_row_value(&row2, &map));

        Ok(Record {
            target: Target::Table(map.table1.to_string()),
            data: Value::Map(data),
            message: format!(
                "inserted into {}: {} id={}, {} id={}",
                config.db_name, map.table1, id1, map.table2, id2
            ),
        })
    }

    async fn read_recent(&mut self, limit: i64) -> Vec<Record> {
        let config = self.config.clone();
        let map = table_map(&config.db_name);
        let Some(session) = self.conn.session() else {
            return Vec::new();
        };

        let result = async {
            let rows1 = session
                .client
                .query(&select_recent_sql(map.table1, map.text_col), &[&limit])
                .await?;
            let rows2 = session
                .client
                .query(&select_recent_sql(map.table2, map.num_col), &[&limit])
                .await?;
            Ok::<_, tokio_postgres::Error>((rows1, rows2))
        }
        .await;

        let (rows1, rows2) = match result {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "PostgreSQL read failed, returning empty result");
                self.conn = ConnState::Broken;
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        let batches = [
            (map.table1, rows1.iter().map(|r| text_row_value(r, &map)).collect::<Vec<_>>()),
            (map.table2, rows2.iter().map(|r| num_row_value(r, &map)).collect::<Vec<_>>()),
        ];
        // One record per non-empty table result set.
        for (table, values) in batches {
            if values.is_empty() {
                continue;
            }
            records.push(Record {
                target: Target::Table(table.to_string()),
                data: Value::Seq(values),
                message: format!(
                    "PostgreSQL data from {}/{}.{}",
                    config.source, config.db_name, table
                ),
            });
        }
        records
    }

    fn invalidate(&mut self) {
        tracing::debug!("Discarding PostgreSQL connection");
        if let ConnState::Connected(session) = std::mem::take(&mut self.conn) {
            let Session { client, driver } = session;
            drop(client);
            driver.abort();
        }
        self.conn = ConnState::Broken;
    }

    async fn close(&mut self) {
        if let ConnState::Connected(session) = std::mem::take(&mut self.conn) {
            let Session { client, driver } = session;
            drop(client);
            driver.abort();
            tracing::info!("PostgreSQL connection closed");
        }
    }
}
