// # Destination Client Trait
//
// The capability interface the registry and the heartbeat drive. One
// instance exists per configured destination and exclusively owns that
// destination's auth state, monitoring state, recent-history cache and
// dead-letter queue.
//
// ## States
//
// ```text
// Uninitialized ──(config valid)──▶ Initialized
//                                      │
//              ┌───────────────────────┼────────────────────────┐
//              ▼                       ▼                        ▼
//       Unauthenticated ──testAuth──▶ Authenticating ──ok──▶ Authenticated
//              ▲                       │
//              └────────fail───────────┘
//
// orthogonal: Scrobbling ∈ {active, stalled}
// ```
//
// New destination types provide a [`DestinationFactory`]; the registry never
// special-cases a type by name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::ResolvedDestination;
use crate::play::PlayEvent;

/// What happened to one play handed to [`DestinationClient::scrobble`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Accepted by the destination
    Delivered,
    /// Delivery failed; the play was queued for a later retry
    DeadLettered,
    /// An equivalent play was already in the recent history
    AlreadyScrobbled,
}

/// Summary of one dead-letter drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadLetterReport {
    /// Entries attempted this drain
    pub attempted: usize,
    /// Entries delivered and removed
    pub delivered: usize,
    /// Entries found in the recent history and removed without delivery
    pub already_scrobbled: usize,
    /// Entries that exhausted their retries and were removed
    pub discarded: usize,
    /// Entries still queued after the drain
    pub remaining: usize,
}

/// Trait for destination clients
///
/// Implementations must be thread-safe: dispatch and the heartbeat call into
/// the same instance concurrently.
///
/// # Failure Contract
///
/// [`scrobble`](Self::scrobble) never reports a delivery failure as `Err`;
/// failed plays go to the dead-letter queue. `Err` from any method means
/// something unexpected happened, and callers treat it as zero progress for
/// this client only.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Display name (for logging)
    fn name(&self) -> &str;

    /// Destination type tag
    fn destination_type(&self) -> &str;

    /// Whether construction validated the configuration
    fn is_initialized(&self) -> bool;

    /// Whether the destination requires auth before scrobbling
    fn auth_gated(&self) -> bool;

    /// Whether the last auth attempt succeeded
    fn is_authed(&self) -> bool;

    /// Whether an auth attempt is allowed right now (not in backoff)
    fn can_try_auth(&self) -> bool;

    /// Whether a monitoring loop is currently consuming queued plays
    fn is_scrobbling(&self) -> bool;

    /// When the recent-history cache was last refreshed
    fn last_checked_at(&self) -> Option<DateTime<Utc>>;

    /// Number of plays waiting in the dead-letter queue
    fn dead_letter_len(&self) -> usize;

    /// Reachable and authenticated (or auth not required)
    ///
    /// May probe the destination if reachability is unknown.
    async fn is_ready(&self) -> bool;

    /// Attempt authentication
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: authenticated
    /// - `Ok(false)`: rejected or unreachable; not retried until
    ///   [`can_try_auth`](Self::can_try_auth) allows it again
    async fn test_auth(&self) -> Result<bool, crate::Error>;

    /// Repopulate the recent-history cache from the destination
    async fn refresh_scrobbles(&self) -> Result<(), crate::Error>;

    /// Whether `played_at` lies inside this client's acceptable window
    fn time_frame_is_valid(&self, played_at: DateTime<Utc>) -> bool;

    /// Whether an equivalent play is already in the recent-history cache
    fn already_scrobbled(&self, event: &PlayEvent) -> bool;

    /// Deliver one play, dead-lettering it on failure
    async fn scrobble(&self, event: &PlayEvent) -> Result<DeliveryStatus, crate::Error>;

    /// Re-attempt queued failures in FIFO order
    async fn process_dead_letter_queue(&self) -> Result<DeadLetterReport, crate::Error>;

    /// Start the monitoring loop (only call when [`is_ready`](Self::is_ready))
    ///
    /// Returns `Ok(())` without starting a second loop if one is running.
    /// Fails if a stop was requested and the previous loop has not exited
    /// yet; callers should retry after [`is_scrobbling`](Self::is_scrobbling)
    /// turns false.
    fn init_scrobble_monitoring(&self) -> Result<(), crate::Error>;

    /// Stop the monitoring loop, if running
    fn stop_scrobble_monitoring(&self);

    /// Hand a play to the monitoring loop
    fn queue_scrobble(&self, event: PlayEvent);
}

/// Helper trait for constructing destination clients from configuration
pub trait DestinationFactory: Send + Sync {
    /// Create a client instance from a resolved configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration with url and api key guaranteed present
    ///
    /// # Returns
    ///
    /// A shared DestinationClient trait object
    fn create(
        &self,
        config: &ResolvedDestination,
    ) -> Result<Arc<dyn DestinationClient>, crate::Error>;
}
