//! Stateful destination client
//!
//! [`ManagedClient`] implements [`DestinationClient`] on top of any
//! [`DestinationApi`]. The API performs single-shot wire calls; this module
//! owns everything that makes delivery reliable:
//!
//! - reachability and auth state, with exponential auth backoff
//! - the recent-history cache used for duplicate detection
//! - the dead-letter queue and its retry budget
//! - the monitoring loop that consumes queued plays
//!
//! ## Locking
//!
//! Flags, cache and queue live behind one `std::sync::Mutex` that is never
//! held across an `.await`. Deliveries additionally take a per-client async
//! lock so a dispatch, the monitoring loop and a dead-letter drain never
//! interleave their submissions to the same destination.

pub mod dead_letter;
pub mod history;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::play::PlayEvent;
use crate::traits::{
    DeadLetterReport, DeliveryOutcome, DeliveryStatus, DestinationApi, DestinationClient,
};

pub use dead_letter::{DeadLetterQueue, DeadLetterScrobble};
pub use history::{RecentHistory, TimeWindow};

/// Mutable per-client state
#[derive(Debug)]
struct ClientState {
    /// Last probe succeeded and no connection failure since
    connected: bool,
    authed: bool,
    /// Consecutive failed auth attempts
    auth_failures: u32,
    /// Earliest time the next auth attempt may run
    next_auth_attempt: Option<DateTime<Utc>>,
    last_checked_at: Option<DateTime<Utc>>,
    history: RecentHistory,
    dead_letters: DeadLetterQueue,
    /// Plays waiting for the monitoring loop
    pending: VecDeque<PlayEvent>,
    /// Stop signal of the running monitoring loop
    monitor_stop: Option<watch::Sender<bool>>,
}

/// Why a single submission failed
#[derive(Debug)]
struct DeliveryFailure {
    reason: String,
    auth: bool,
    connection: bool,
}

struct ClientInner {
    name: String,
    api: Box<dyn DestinationApi>,
    options: ClientOptions,
    window: TimeWindow,
    initialized: bool,
    state: Mutex<ClientState>,
    delivery: tokio::sync::Mutex<()>,
    scrobbling: AtomicBool,
    wake: Notify,
}

/// Generic destination client with auth, history, dead-letter and monitoring
/// state
///
/// Dropping the client stops its monitoring loop.
pub struct ManagedClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ManagedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedClient")
            .field("name", &self.inner.name)
            .field("type", &self.inner.api.destination_type())
            .field("scrobbling", &self.inner.scrobbling.load(Ordering::SeqCst))
            .finish()
    }
}

impl ManagedClient {
    /// Create a new client
    ///
    /// # Parameters
    ///
    /// - `name`: Display name used in logs
    /// - `api`: Wire-level destination implementation
    /// - `options`: Client behaviour settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the options are invalid.
    pub fn new(name: impl Into<String>, api: Box<dyn DestinationApi>, options: ClientOptions) -> Result<Self> {
        options.validate()?;

        let tolerance = Duration::seconds(options.dedup_tolerance_secs as i64);
        let state = ClientState {
            connected: false,
            authed: false,
            auth_failures: 0,
            next_auth_attempt: None,
            last_checked_at: None,
            history: RecentHistory::new(options.recent_limit, tolerance),
            dead_letters: DeadLetterQueue::new(options.dead_letter_capacity),
            pending: VecDeque::new(),
            monitor_stop: None,
        };

        Ok(Self {
            inner: Arc::new(ClientInner {
                name: name.into(),
                api,
                window: TimeWindow::from_options(&options),
                options,
                initialized: true,
                state: Mutex::new(state),
                delivery: tokio::sync::Mutex::new(()),
                scrobbling: AtomicBool::new(false),
                wake: Notify::new(),
            }),
        })
    }

    /// Snapshot of the dead-letter queue, oldest first
    pub fn dead_letters(&self) -> Vec<DeadLetterScrobble> {
        self.inner.state().dead_letters.entries()
    }

    /// Number of plays waiting for the monitoring loop
    pub fn pending_len(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// Window check against an explicit `now`
    pub fn time_frame_is_valid_at(&self, played_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.inner.window.contains(played_at, now)
    }
}

impl Drop for ManagedClient {
    fn drop(&mut self) {
        self.inner.stop_monitoring();
    }
}

impl ClientInner {
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn auth_backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(20);
        let secs = self
            .options
            .auth_retry_base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.options.auth_retry_max_secs);
        Duration::seconds(secs as i64)
    }

    fn record_auth_failure(&self, reason: &str, connection: bool) {
        let mut state = self.state();
        state.authed = false;
        if connection {
            state.connected = false;
        }
        state.auth_failures = state.auth_failures.saturating_add(1);
        let delay = self.auth_backoff(state.auth_failures);
        state.next_auth_attempt = Some(Utc::now() + delay);
        warn!(
            client = %self.name,
            "Authentication failed ({} consecutive): {}. Next attempt in {}s",
            state.auth_failures,
            reason,
            delay.num_seconds()
        );
    }

    fn already_scrobbled(&self, event: &PlayEvent) -> bool {
        self.state().history.contains(event)
    }

    async fn ensure_connected(&self) -> bool {
        if self.state().connected {
            return true;
        }
        match self.api.check_connection().await {
            Ok(()) => {
                debug!(client = %self.name, "Destination reachable");
                self.state().connected = true;
                true
            }
            Err(e) => {
                warn!(client = %self.name, "Destination not reachable: {}", e);
                false
            }
        }
    }

    async fn is_ready(&self) -> bool {
        if !self.initialized {
            return false;
        }
        if !self.ensure_connected().await {
            return false;
        }
        !self.api.auth_gated() || self.state().authed
    }

    async fn test_auth(&self) -> Result<bool> {
        if !self.ensure_connected().await {
            self.record_auth_failure("destination not reachable", true);
            return Ok(false);
        }

        match self.api.test_auth().await {
            Ok(()) => {
                let mut state = self.state();
                state.authed = true;
                state.auth_failures = 0;
                state.next_auth_attempt = None;
                info!(client = %self.name, "Authenticated");
                Ok(true)
            }
            Err(e) => {
                self.record_auth_failure(&e.to_string(), e.is_connection());
                Ok(false)
            }
        }
    }

    async fn refresh_scrobbles(&self) -> Result<()> {
        let limit = self.options.recent_limit;
        match self.api.recent_scrobbles(limit).await {
            Ok(events) => {
                let mut state = self.state();
                debug!(client = %self.name, "Refreshed recent history with {} scrobbles", events.len());
                state.history.replace(events);
                state.last_checked_at = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                let mut state = self.state();
                if e.is_connection() {
                    state.connected = false;
                }
                if e.is_auth() {
                    state.authed = false;
                }
                Err(e)
            }
        }
    }

    /// Submit one play and update state from the result (caller holds the
    /// delivery lock)
    async fn deliver(&self, event: &PlayEvent) -> std::result::Result<(), DeliveryFailure> {
        let failure = match self.api.submit(event).await {
            Ok(DeliveryOutcome::Delivered { warnings }) => {
                for warning in &warnings {
                    warn!(
                        client = %self.name,
                        "Scrobble of {} accepted with warning {} ({}): {}",
                        event.display_label(),
                        warning.kind,
                        warning.value,
                        warning.description
                    );
                }
                info!(client = %self.name, "Scrobbled {}", event.display_label());
                self.state().history.record(event.clone());
                return Ok(());
            }
            Ok(outcome) => DeliveryFailure {
                reason: outcome.failure_reason(),
                auth: false,
                connection: false,
            },
            Err(e) => DeliveryFailure {
                reason: e.to_string(),
                auth: e.is_auth(),
                connection: e.is_connection(),
            },
        };

        let mut state = self.state();
        if failure.auth {
            state.authed = false;
        }
        if failure.connection {
            state.connected = false;
        }
        Err(failure)
    }

    fn dead_letter(&self, event: &PlayEvent, reason: &str) {
        let evicted = self.state().dead_letters.push(event.clone(), reason, Utc::now());
        if let Some(evicted) = evicted {
            error!(
                client = %self.name,
                "Dead-letter queue full, dropped oldest entry {} (queued at {})",
                evicted.event.display_label(),
                evicted.queued_at
            );
        }
    }

    async fn scrobble(&self, event: &PlayEvent) -> Result<DeliveryStatus> {
        let _guard = self.delivery.lock().await;

        if self.already_scrobbled(event) {
            debug!(client = %self.name, "{} already scrobbled, skipping", event.display_label());
            return Ok(DeliveryStatus::AlreadyScrobbled);
        }

        match self.deliver(event).await {
            Ok(()) => Ok(DeliveryStatus::Delivered),
            Err(failure) => {
                warn!(
                    client = %self.name,
                    "Failed to scrobble {}: {}. Queued for retry",
                    event.display_label(),
                    failure.reason
                );
                self.dead_letter(event, &failure.reason);
                Ok(DeliveryStatus::DeadLettered)
            }
        }
    }

    async fn process_dead_letter_queue(&self) -> Result<DeadLetterReport> {
        let _guard = self.delivery.lock().await;

        let mut drained = self.state().dead_letters.take_all();
        if drained.is_empty() {
            return Ok(DeadLetterReport::default());
        }

        info!(client = %self.name, "Processing {} dead-letter scrobbles", drained.len());

        let mut report = DeadLetterReport::default();
        let mut kept = VecDeque::new();

        while let Some(mut entry) = drained.pop_front() {
            if self.already_scrobbled(&entry.event) {
                debug!(
                    client = %self.name,
                    "Dead-letter {} found in recent history, removing",
                    entry.event.display_label()
                );
                report.already_scrobbled += 1;
                continue;
            }

            report.attempted += 1;
            match self.deliver(&entry.event).await {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    entry.record_failure(failure.reason.as_str(), Utc::now());
                    if entry.retries >= self.options.dead_letter_max_retries {
                        error!(
                            client = %self.name,
                            "Giving up on {} after {} retries: {}",
                            entry.event.display_label(),
                            entry.retries,
                            failure.reason
                        );
                        report.discarded += 1;
                    } else {
                        kept.push_back(entry);
                    }

                    if failure.connection || failure.auth {
                        // remaining entries would fail the same way
                        debug!(
                            client = %self.name,
                            "Stopping dead-letter drain early, {} entries untouched",
                            drained.len()
                        );
                        break;
                    }
                }
            }
        }
        kept.extend(drained);

        let mut state = self.state();
        for evicted in state.dead_letters.restore_front(kept) {
            error!(
                client = %self.name,
                "Dead-letter queue full, dropped oldest entry {}",
                evicted.event.display_label()
            );
        }
        report.remaining = state.dead_letters.len();
        drop(state);

        info!(
            client = %self.name,
            "Dead-letter drain: {} delivered, {} already scrobbled, {} discarded, {} remaining",
            report.delivered,
            report.already_scrobbled,
            report.discarded,
            report.remaining
        );
        Ok(report)
    }

    fn queue_scrobble(&self, event: PlayEvent) {
        let mut state = self.state();
        state.pending.push_back(event);
        if state.pending.len() > self.options.pending_capacity {
            if let Some(dropped) = state.pending.pop_front() {
                warn!(
                    client = %self.name,
                    "Pending queue full, dropped oldest play {}",
                    dropped.display_label()
                );
            }
        }
        drop(state);
        self.wake.notify_one();
    }

    fn stop_monitoring(&self) {
        if let Some(stop) = self.state().monitor_stop.take() {
            let _ = stop.send(true);
        }
    }

    fn pop_pending(&self) -> Option<PlayEvent> {
        self.state().pending.pop_front()
    }

    fn auth_lost(&self) -> bool {
        self.api.auth_gated() && !self.state().authed
    }
}

/// Clears the scrobbling flag however the monitoring loop exits
struct ScrobblingGuard(Arc<ClientInner>);

impl Drop for ScrobblingGuard {
    fn drop(&mut self) {
        self.0.scrobbling.store(false, Ordering::SeqCst);
    }
}

async fn monitor_loop(inner: Arc<ClientInner>, mut stop: watch::Receiver<bool>) {
    let _guard = ScrobblingGuard(Arc::clone(&inner));
    info!(client = %inner.name, "Scrobble monitoring started");

    let reason = 'monitor: loop {
        while let Some(event) = inner.pop_pending() {
            if *stop.borrow() {
                // leave the play for the next loop
                inner.state().pending.push_front(event);
                break 'monitor "stop requested";
            }

            if !inner.window.contains(event.played_at(), Utc::now()) {
                debug!(
                    client = %inner.name,
                    "{} is outside the acceptable time window, skipping",
                    event.display_label()
                );
                continue;
            }

            match inner.scrobble(&event).await {
                Ok(DeliveryStatus::DeadLettered) if inner.auth_lost() => {
                    break 'monitor "authentication lost";
                }
                Ok(_) => {}
                Err(e) => {
                    error!(client = %inner.name, "Unexpected error while scrobbling: {}", e);
                }
            }
        }

        tokio::select! {
            _ = inner.wake.notified() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break 'monitor "stop requested";
                }
            }
        }
    };

    info!(client = %inner.name, "Scrobble monitoring ended: {}", reason);
}

#[async_trait]
impl DestinationClient for ManagedClient {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn destination_type(&self) -> &str {
        self.inner.api.destination_type()
    }

    fn is_initialized(&self) -> bool {
        self.inner.initialized
    }

    fn auth_gated(&self) -> bool {
        self.inner.api.auth_gated()
    }

    fn is_authed(&self) -> bool {
        self.inner.state().authed
    }

    fn can_try_auth(&self) -> bool {
        self.inner
            .state()
            .next_auth_attempt
            .is_none_or(|next| Utc::now() >= next)
    }

    fn is_scrobbling(&self) -> bool {
        self.inner.scrobbling.load(Ordering::SeqCst)
    }

    fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state().last_checked_at
    }

    fn dead_letter_len(&self) -> usize {
        self.inner.state().dead_letters.len()
    }

    async fn is_ready(&self) -> bool {
        self.inner.is_ready().await
    }

    async fn test_auth(&self) -> Result<bool> {
        self.inner.test_auth().await
    }

    async fn refresh_scrobbles(&self) -> Result<()> {
        self.inner.refresh_scrobbles().await
    }

    fn time_frame_is_valid(&self, played_at: DateTime<Utc>) -> bool {
        self.inner.window.contains(played_at, Utc::now())
    }

    fn already_scrobbled(&self, event: &PlayEvent) -> bool {
        self.inner.already_scrobbled(event)
    }

    async fn scrobble(&self, event: &PlayEvent) -> Result<DeliveryStatus> {
        self.inner.scrobble(event).await
    }

    async fn process_dead_letter_queue(&self) -> Result<DeadLetterReport> {
        self.inner.process_dead_letter_queue().await
    }

    fn init_scrobble_monitoring(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Other(format!("cannot start monitoring outside a runtime: {}", e)))?;

        let mut state = self.inner.state();
        if self.inner.scrobbling.load(Ordering::SeqCst) {
            if state.monitor_stop.is_some() {
                debug!(client = %self.inner.name, "Monitoring already running");
                return Ok(());
            }
            return Err(Error::Other(format!(
                "monitoring of {} is still stopping, retry once it has ended",
                self.inner.name
            )));
        }

        self.inner.scrobbling.store(true, Ordering::SeqCst);
        let (stop_tx, stop_rx) = watch::channel(false);
        // a loop that ended on its own leaves a stale sender behind
        state.monitor_stop = Some(stop_tx);
        drop(state);

        handle.spawn(monitor_loop(Arc::clone(&self.inner), stop_rx));
        Ok(())
    }

    fn stop_scrobble_monitoring(&self) {
        self.inner.stop_monitoring();
    }

    fn queue_scrobble(&self, event: PlayEvent) {
        self.inner.queue_scrobble(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DestinationErrorDetail;
    use std::sync::atomic::AtomicUsize;

    /// Scripted API: accepts or rejects every call according to its flags
    struct ScriptedApi {
        reachable: Arc<AtomicBool>,
        auth_ok: Arc<AtomicBool>,
        submit_ok: Arc<AtomicBool>,
        submit_calls: Arc<AtomicUsize>,
        history: Vec<PlayEvent>,
    }

    impl ScriptedApi {
        fn new() -> Self {
            Self {
                reachable: Arc::new(AtomicBool::new(true)),
                auth_ok: Arc::new(AtomicBool::new(true)),
                submit_ok: Arc::new(AtomicBool::new(true)),
                submit_calls: Arc::new(AtomicUsize::new(0)),
                history: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl DestinationApi for ScriptedApi {
        fn destination_type(&self) -> &'static str {
            "scripted"
        }

        async fn check_connection(&self) -> Result<()> {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(Error::connection("refused"))
            }
        }

        async fn test_auth(&self) -> Result<()> {
            if self.auth_ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(Error::auth("bad key"))
            }
        }

        async fn recent_scrobbles(&self, _limit: usize) -> Result<Vec<PlayEvent>> {
            Ok(self.history.clone())
        }

        async fn submit(&self, _event: &PlayEvent) -> Result<DeliveryOutcome> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if self.submit_ok.load(Ordering::SeqCst) {
                Ok(DeliveryOutcome::Delivered { warnings: Vec::new() })
            } else {
                Ok(DeliveryOutcome::Failed {
                    error: Some(DestinationErrorDetail {
                        kind: "server_error".to_string(),
                        value: None,
                        description: "database locked".to_string(),
                    }),
                    description: None,
                    warnings: Vec::new(),
                })
            }
        }
    }

    fn play(title: &str) -> PlayEvent {
        PlayEvent::new(["Artist"], title, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_failed_delivery_is_dead_lettered_not_raised() {
        let api = ScriptedApi::new();
        api.submit_ok.store(false, Ordering::SeqCst);
        let client = ManagedClient::new("test", Box::new(api), ClientOptions::default()).unwrap();

        let status = client.scrobble(&play("Song")).await.unwrap();
        assert_eq!(status, DeliveryStatus::DeadLettered);
        assert_eq!(client.dead_letter_len(), 1);
        assert!(client.dead_letters()[0].last_error.contains("database locked"));
    }

    #[tokio::test]
    async fn test_delivered_play_is_not_delivered_twice() {
        let api = ScriptedApi::new();
        let calls = Arc::clone(&api.submit_calls);
        let client = ManagedClient::new("test", Box::new(api), ClientOptions::default()).unwrap();

        let event = play("Song");
        assert_eq!(client.scrobble(&event).await.unwrap(), DeliveryStatus::Delivered);
        assert!(client.already_scrobbled(&event));
        assert_eq!(client.scrobble(&event).await.unwrap(), DeliveryStatus::AlreadyScrobbled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_enters_backoff() {
        let api = ScriptedApi::new();
        api.auth_ok.store(false, Ordering::SeqCst);
        let client = ManagedClient::new("test", Box::new(api), ClientOptions::default()).unwrap();

        assert!(client.can_try_auth());
        assert!(!client.test_auth().await.unwrap());
        assert!(!client.is_authed());
        assert!(!client.can_try_auth());
        assert!(!client.is_ready().await);
    }

    #[tokio::test]
    async fn test_ready_after_auth() {
        let client = ManagedClient::new("test", Box::new(ScriptedApi::new()), ClientOptions::default()).unwrap();

        assert!(!client.is_ready().await);
        assert!(client.test_auth().await.unwrap());
        assert!(client.is_ready().await);
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_not_ready() {
        let api = ScriptedApi::new();
        api.reachable.store(false, Ordering::SeqCst);
        let client = ManagedClient::new("test", Box::new(api), ClientOptions::default()).unwrap();

        assert!(!client.test_auth().await.unwrap());
        assert!(!client.is_ready().await);
    }

    #[tokio::test]
    async fn test_dead_letters_drain_in_order_once_destination_recovers() {
        let api = ScriptedApi::new();
        let submit_ok = Arc::clone(&api.submit_ok);
        submit_ok.store(false, Ordering::SeqCst);
        let client = ManagedClient::new("test", Box::new(api), ClientOptions::default()).unwrap();

        client.scrobble(&play("1")).await.unwrap();
        client.scrobble(&play("2")).await.unwrap();

        let report = client.process_dead_letter_queue().await.unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.remaining, 2);
        assert_eq!(client.dead_letters()[0].event.title(), "1");
        assert_eq!(client.dead_letters()[0].retries, 1);

        submit_ok.store(true, Ordering::SeqCst);
        let report = client.process_dead_letter_queue().await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn test_dead_letter_discarded_after_retry_budget() {
        let api = ScriptedApi::new();
        api.submit_ok.store(false, Ordering::SeqCst);
        let options = ClientOptions { dead_letter_max_retries: 2, ..ClientOptions::default() };
        let client = ManagedClient::new("test", Box::new(api), options).unwrap();

        client.scrobble(&play("1")).await.unwrap();
        assert_eq!(client.process_dead_letter_queue().await.unwrap().remaining, 1);

        let report = client.process_dead_letter_queue().await.unwrap();
        assert_eq!(report.discarded, 1);
        assert_eq!(client.dead_letter_len(), 0);
    }

    #[tokio::test]
    async fn test_monitoring_consumes_queued_plays() {
        let api = ScriptedApi::new();
        let calls = Arc::clone(&api.submit_calls);
        let client = ManagedClient::new("test", Box::new(api), ClientOptions::default()).unwrap();
        assert!(client.test_auth().await.unwrap());

        client.init_scrobble_monitoring().unwrap();
        assert!(client.is_scrobbling());

        client.queue_scrobble(play("Queued"));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.pending_len(), 0);

        client.stop_scrobble_monitoring();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!client.is_scrobbling());
    }

    #[tokio::test]
    async fn test_restart_while_stopping_is_an_error() {
        let client = ManagedClient::new("test", Box::new(ScriptedApi::new()), ClientOptions::default()).unwrap();

        client.init_scrobble_monitoring().unwrap();
        client.stop_scrobble_monitoring();
        // the old loop has not had a chance to observe the stop yet
        assert!(client.is_scrobbling());
        assert!(client.init_scrobble_monitoring().is_err());

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!client.is_scrobbling());
        client.init_scrobble_monitoring().unwrap();
        assert!(client.is_scrobbling());
    }

    #[tokio::test]
    async fn test_pending_queue_has_its_own_cap() {
        let options = ClientOptions {
            pending_capacity: 2,
            dead_letter_capacity: 1,
            ..ClientOptions::default()
        };
        let client = ManagedClient::new("test", Box::new(ScriptedApi::new()), options).unwrap();

        client.queue_scrobble(play("1"));
        client.queue_scrobble(play("2"));
        assert_eq!(client.pending_len(), 2);

        client.queue_scrobble(play("3"));
        assert_eq!(client.pending_len(), 2);
    }

    #[test]
    fn test_monitoring_requires_runtime() {
        let client = ManagedClient::new("test", Box::new(ScriptedApi::new()), ClientOptions::default()).unwrap();
        assert!(client.init_scrobble_monitoring().is_err());
        assert!(!client.is_scrobbling());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = ClientOptions { dead_letter_capacity: 0, ..ClientOptions::default() };
        assert!(ManagedClient::new("test", Box::new(ScriptedApi::new()), options).is_err());
    }
}
