//! Long-running background services and their shutdown plumbing.
//!
//! A `Service` runs until its cancellation token fires, then drains and
//! returns. The `ServiceHost` spawns every registered service, waits for
//! SIGINT/SIGTERM, cancels the shared token, and joins the services.

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[async_trait::async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()>;
}

#[derive(Default)]
pub struct ServiceHost {
    services: Vec<Box<dyn Service>>,
    token: CancellationToken,
}

impl ServiceHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: impl Service + 'static) -> Self {
        self.services.push(Box::new(service));
        self
    }

    /// Token handed to anything else (e.g. the HTTP server's graceful
    /// shutdown) that should stop when the host does.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn spawn_all(&mut self) -> Vec<(&'static str, JoinHandle<Result<()>>)> {
        self.services
            .drain(..)
            .map(|service| {
                let name = service.name();
                let token = self.token.clone();
                info!(service = name, "starting service");
                (name, tokio::spawn(service.run(token)))
            })
            .collect()
    }

    /// Run all services until a termination signal arrives, then shut down
    /// cleanly, waiting for each service to drain.
    pub async fn run_until_shutdown(mut self) -> Result<()> {
        let handles = self.spawn_all();

        wait_for_signal().await;
        info!("shutdown signal received, stopping services");
        self.token.cancel();

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(())) => info!(service = name, "service stopped"),
                Ok(Err(err)) => error!(service = name, error = %format!("{:#}", err), "service failed"),
                Err(err) => error!(service = name, error = %err, "service panicked"),
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
