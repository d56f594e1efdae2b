//! Iteration loop driving the generate-insert-read-forward cycle.
//!
//! Each iteration is an explicit sequence of phases dispatched one at a
//! time; transitions are returned as data rather than implied by control
//! flow. Failures abort at most the current iteration — the loop itself
//! never terminates except on the external stop signal.

use std::time::Duration;

use tokio::sync::watch;

use crate::config::AppConfig;
use crate::forward::{Envelope, Forwarder};
use crate::store::{Record, StoreClient, READ_LIMIT};

/// Phase of the current iteration.
#[derive(Debug)]
pub enum Phase {
    /// Health-check the connection, reconnecting if needed.
    Probe,
    /// Generate and insert one record.
    Generate,
    /// Read the most recent records.
    Collect,
    /// Forward each collected record downstream.
    Dispatch(Vec<Record>),
    /// Wait before the next iteration.
    Idle(Duration),
}

/// Owns the store client, the forwarder and the iteration loop.
pub struct CycleController<S: StoreClient> {
    store: S,
    forwarder: Forwarder,
    config: AppConfig,
    iteration: u64,
}

impl<S: StoreClient> CycleController<S> {
    pub fn new(store: S, forwarder: Forwarder, config: AppConfig) -> Self {
        Self {
            store,
            forwarder,
            config,
            iteration: 1,
        }
    }

    /// Execute one phase and return the next.
    ///
    /// `Idle` is resolved by [`run`](Self::run), which owns the sleep and
    /// the stop signal; stepping it directly starts the next iteration.
    pub async fn step(&mut self, phase: Phase) -> Phase {
        match phase {
            Phase::Probe => match self.store.ensure_healthy().await {
                Ok(()) => Phase::Generate,
                Err(e) => {
                    tracing::error!(
                        iteration = self.iteration,
                        error = %e,
                        "Health check failed, skipping iteration"
                    );
                    Phase::Idle(self.config.retry_delay)
                }
            },
            Phase::Generate => match self.store.write_record().await {
                Ok(record) => {
                    tracing::info!(
                        iteration = self.iteration,
                        detail = %record.message,
                        "Record written"
                    );
                    Phase::Collect
                }
                Err(e) => {
                    tracing::error!(
                        iteration = self.iteration,
                        error = %e,
                        "Write failed, discarding connection"
                    );
                    self.store.invalidate();
                    Phase::Idle(self.config.retry_delay)
                }
            },
            Phase::Collect => {
                let records = self.store.read_recent(READ_LIMIT).await;
                tracing::info!(
                    iteration = self.iteration,
                    count = records.len(),
                    "Read recent records"
                );
                Phase::Dispatch(records)
            }
            Phase::Dispatch(records) => {
                let mut sent = 0u32;
                let mut failed = 0u32;
                for record in &records {
                    let envelope = Envelope::new(&self.config, record);
                    // Per-envelope failures do not halt the batch.
                    if self.forwarder.forward(&envelope).await {
                        sent += 1;
                    } else {
                        failed += 1;
                    }
                }
                if !records.is_empty() {
                    tracing::info!(iteration = self.iteration, sent, failed, "Dispatch complete");
                }
                Phase::Idle(self.config.interval)
            }
            Phase::Idle(_) => {
                self.iteration += 1;
                Phase::Probe
            }
        }
    }

    /// Drive iterations until the stop signal fires.
    ///
    /// The signal is observed at the idle boundary; a closed channel counts
    /// as a stop. On exit the connection is closed best-effort.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval = ?self.config.interval,
            endpoint = %self.config.endpoint,
            "Cycle controller started"
        );

        let mut phase = Phase::Probe;
        loop {
            phase = match phase {
                Phase::Idle(delay) => {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => self.step(Phase::Idle(delay)).await,
                    }
                }
                other => self.step(other).await,
            };
        }

        tracing::info!("Stop signal received, closing connection");
        self.store.close().await;
        tracing::info!("Cycle controller stopped");
    }
}
