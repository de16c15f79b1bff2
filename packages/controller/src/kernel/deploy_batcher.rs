//! Coalesces concurrent deploy requests per fabric.
//!
//! A config-deploy materializes the whole fabric's pending intent, so two
//! jobs provisioned back-to-back need only one. The first request for a
//! fabric opens a batch and starts a debounce timer; requests arriving
//! inside the window attach to the same batch and observe the same outcome.
//! When the window closes the batch leaves the map (so later requests open a
//! fresh one) and a single upstream deploy runs. Dropping a waiter abandons
//! the wait, never the deploy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error};

use super::traits::BaseFabricApi;

const DEFAULT_WINDOW: Duration = Duration::from_millis(250);

/// Shared outcome of one batched deploy. Errors are flattened to their
/// display chain: by the time a deploy fails, every caller treats it the
/// same way (record and reconcile later), so the error kind is not needed.
type DeployOutcome = Result<(), String>;

pub struct DeployBatcher {
    fabric_api: Arc<dyn BaseFabricApi>,
    window: Duration,
    pending: Mutex<HashMap<String, watch::Receiver<Option<DeployOutcome>>>>,
}

impl DeployBatcher {
    pub fn new(fabric_api: Arc<dyn BaseFabricApi>) -> Arc<Self> {
        Self::with_window(fabric_api, DEFAULT_WINDOW)
    }

    pub fn with_window(fabric_api: Arc<dyn BaseFabricApi>, window: Duration) -> Arc<Self> {
        Arc::new(Self {
            fabric_api,
            window,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Request a deploy of `fabric`, waiting for the outcome of the batch
    /// this request lands in.
    pub async fn request_deploy(self: &Arc<Self>, fabric: &str) -> Result<()> {
        let mut receiver = {
            let mut pending = self.pending.lock().await;
            if let Some(existing) = pending.get(fabric) {
                debug!(fabric = %fabric, "joining pending deploy batch");
                existing.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                pending.insert(fabric.to_string(), rx.clone());

                let batcher = Arc::clone(self);
                let fabric = fabric.to_string();
                tokio::spawn(async move {
                    batcher.run_batch(fabric, tx).await;
                });
                rx
            }
        };

        let outcome = receiver
            .wait_for(|outcome| outcome.is_some())
            .await
            .map_err(|_| anyhow!("deploy batch task dropped its channel"))?
            .clone()
            .expect("wait_for guarantees a value");

        outcome.map_err(|message| anyhow!("config-deploy failed: {}", message))
    }

    async fn run_batch(self: Arc<Self>, fabric: String, tx: watch::Sender<Option<DeployOutcome>>) {
        tokio::time::sleep(self.window).await;

        // Close the window before deploying: arrivals from here on belong to
        // the next batch.
        self.pending.lock().await.remove(&fabric);

        debug!(fabric = %fabric, "deploy window closed, running config-deploy");
        let outcome = match self.fabric_api.deploy_config(&fabric).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(fabric = %fabric, error = %format!("{:#}", err), "config-deploy failed");
                Err(format!("{:#}", err))
            }
        };

        // Waiters may all have been cancelled; that must not cancel the
        // deploy itself, so a send failure is uninteresting.
        let _ = tx.send(Some(outcome));
    }
}
