// # Heartbeat
//
// Fixed-interval self-healing pass over the registry's clients.
//
// Clients are processed one at a time: a client's auth check, dead-letter
// drain and monitoring restart all finish before the next client starts.
// Each client's step runs in its own task so an error or a panic is recorded
// against that client and the tick moves on.
//
// ## Per-client step
//
// ```text
// ready = is_ready()
// can_auth = initialized && auth_gated && can_try_auth
//
// !ready && !can_auth  -> skip
// !ready && can_auth   -> test_auth; stop unless authed and now ready
// ready                -> drain dead letters; restart monitoring if stopped
// ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::registry::ClientRegistry;
use crate::traits::DestinationClient;

/// Outcome of one heartbeat tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Clients visited
    pub checked: usize,
    /// Monitoring loops (re)started
    pub restarted: usize,
    /// `(client name, error)` for every client whose step failed
    pub errors: Vec<(String, String)>,
}

/// What one client's step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Skipped,
    AuthFailed,
    Healthy,
    Restarted,
}

/// Recurring health check over a [`ClientRegistry`]
pub struct HeartbeatTask {
    registry: Arc<ClientRegistry>,
    interval: Duration,
}

impl HeartbeatTask {
    /// Create a heartbeat for `registry`, ticking every `interval`
    pub fn new(registry: Arc<ClientRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass over the current clients
    ///
    /// Never fails; per-client failures are collected in the report.
    pub async fn tick(&self) -> HeartbeatReport {
        let clients = self.registry.clients();
        let mut report = HeartbeatReport::default();

        for client in clients {
            report.checked += 1;
            let name = client.name().to_string();

            let step = tokio::spawn(async move { heartbeat_client(client.as_ref()).await });
            match step.await {
                Ok(Ok(StepOutcome::Restarted)) => report.restarted += 1,
                Ok(Ok(outcome)) => debug!(client = %name, "Heartbeat: {:?}", outcome),
                Ok(Err(e)) => report.errors.push((name, e.to_string())),
                Err(e) => report.errors.push((name, format!("heartbeat step aborted: {}", e))),
            }
        }

        for (name, e) in &report.errors {
            error!(client = %name, "Heartbeat error: {}", e);
        }
        if report.restarted > 0 {
            info!(
                "Heartbeat checked {} client(s), restarted {} monitoring loop(s)",
                report.checked, report.restarted
            );
        } else {
            debug!("Heartbeat checked {} client(s)", report.checked);
        }

        report
    }

    /// Tick every interval until `shutdown` completes
    ///
    /// The first tick runs immediately. Ticks missed while a slow tick was
    /// running are skipped rather than bunched up.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Heartbeat started, interval {}s", self.interval.as_secs());
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("Heartbeat stopped");
    }

    /// Run the heartbeat on a background task
    pub fn spawn<F>(self, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(shutdown))
    }
}

async fn heartbeat_client(client: &dyn DestinationClient) -> crate::Result<StepOutcome> {
    let mut ready = client.is_ready().await;
    let can_auth = client.is_initialized() && client.auth_gated() && client.can_try_auth();

    if !ready && !can_auth {
        return Ok(StepOutcome::Skipped);
    }

    if !ready {
        if !client.test_auth().await? {
            return Ok(StepOutcome::AuthFailed);
        }
        ready = client.is_ready().await;
        if !ready {
            return Ok(StepOutcome::AuthFailed);
        }
    }

    client.process_dead_letter_queue().await?;

    if client.is_scrobbling() {
        return Ok(StepOutcome::Healthy);
    }
    client.init_scrobble_monitoring()?;
    info!(client = %client.name(), "Restarted scrobble monitoring");
    Ok(StepOutcome::Restarted)
}
