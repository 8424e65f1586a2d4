use anyhow::{anyhow, Result};
use std::future::Future;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};


/// Owns the consumption loops and the stop signal they share.
///
/// The first loop to end brings the others down with it, so a dead loop
/// never leaves the process running without a consumer. A failed loop's
/// error becomes the process result; its uncommitted batch is picked up
/// again on the next start.
pub struct LoopSupervisor {
    tasks: JoinSet<(&'static str, Result<()>)>,
    stop: watch::Sender<bool>,
}

impl LoopSupervisor {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            tasks: JoinSet::new(),
            stop,
        }
    }

    /// Receiver that flips to `true` once shutdown starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    pub fn spawn<F>(&mut self, name: &'static str, run: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (name, run.await) });
    }

    /// Runs until `signal` resolves or a loop ends, whichever comes first,
    /// then stops every remaining loop and waits for it.
    ///
    /// Returns the error of the loop that ended first, if any.
    pub async fn run_until<S>(mut self, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let result = tokio::select! {
            _ = signal => {
                info!("Shutdown signal received");
                Ok(())
            }
            Some(joined) = self.tasks.join_next() => {
                // Loops only return cleanly once asked to stop
                let result = match joined {
                    Ok((name, Ok(()))) => Err(anyhow!("{} loop stopped unexpectedly", name)),
                    other => loop_outcome(other),
                };
                if let Err(e) = &result {
                    error!(error = %format!("{:#}", e), "Consumption loop ended, shutting down");
                }
                result
            }
        };

        let _ = self.stop.send(true);

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = loop_outcome(joined) {
                error!(error = %format!("{:#}", e), "Consumption loop failed during shutdown");
            }
        }

        result
    }
}

impl Default for LoopSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

fn loop_outcome(joined: Result<(&'static str, Result<()>), JoinError>) -> Result<()> {
    match joined {
        Ok((name, Ok(()))) => {
            info!(component = name, "Stopped");
            Ok(())
        }
        Ok((name, Err(e))) => Err(e.context(format!("{} loop failed", name))),
        Err(e) => Err(anyhow!("consumption loop panicked: {}", e)),
    }
}
