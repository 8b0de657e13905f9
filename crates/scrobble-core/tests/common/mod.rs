//! Test doubles and common utilities for contract tests
//!
//! `MockClient` is a scripted [`DestinationClient`] whose behaviour is set
//! through plain fields and whose calls are counted in shared atomics.
//! `MockApi` is a scripted [`DestinationApi`] for exercising `ManagedClient`.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use scrobble_core::error::{Error, Result};
use scrobble_core::traits::{
    DeadLetterReport, DeliveryOutcome, DeliveryStatus, DestinationApi, DestinationClient,
    DestinationErrorDetail,
};
use scrobble_core::PlayEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How a scripted call misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Failure {
    #[default]
    None,
    Error,
    Panic,
}

impl Failure {
    fn apply(self, what: &str) -> Result<()> {
        match self {
            Failure::None => Ok(()),
            Failure::Error => Err(Error::Other(format!("{} exploded", what))),
            Failure::Panic => panic!("{} panicked", what),
        }
    }
}

/// Shared call counters, so tests keep a handle after the client moves
#[derive(Debug, Default, Clone)]
pub struct Counters {
    pub refresh: Arc<AtomicUsize>,
    pub scrobble: Arc<AtomicUsize>,
    pub test_auth: Arc<AtomicUsize>,
    pub dead_letter: Arc<AtomicUsize>,
    pub monitoring_started: Arc<AtomicUsize>,
    pub delivered: Arc<Mutex<Vec<String>>>,
}

impl Counters {
    pub fn get(counter: &Arc<AtomicUsize>) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn delivered_titles(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

/// Scripted destination client
pub struct MockClient {
    pub name: String,
    pub ready: AtomicBool,
    pub auth_gated: bool,
    pub can_try_auth: bool,
    pub auth_succeeds: bool,
    pub authed: AtomicBool,
    pub scrobbling: AtomicBool,
    /// Oldest acceptable play relative to now
    pub max_age: Duration,
    pub last_checked_at: Mutex<Option<DateTime<Utc>>>,
    /// Titles the destination already has
    pub history: Mutex<Vec<String>>,
    pub refresh_failure: Failure,
    pub scrobble_failure: Failure,
    /// Restrict `scrobble_failure` to plays with this title
    pub failing_title: Option<String>,
    pub dead_letter_failure: Failure,
    pub counters: Counters,
}

impl MockClient {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ready: AtomicBool::new(true),
            auth_gated: false,
            can_try_auth: false,
            auth_succeeds: true,
            authed: AtomicBool::new(false),
            scrobbling: AtomicBool::new(false),
            max_age: Duration::hours(1),
            last_checked_at: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            refresh_failure: Failure::None,
            scrobble_failure: Failure::None,
            failing_title: None,
            dead_letter_failure: Failure::None,
            counters: Counters::default(),
        }
    }

    /// Create a new MockClient that shares counters with an existing one
    pub fn sharing_counters_with(name: &str, other: &Self) -> Self {
        Self {
            counters: other.counters.clone(),
            ..Self::new(name)
        }
    }

    pub fn with_history(self, titles: &[&str]) -> Self {
        *self.history.lock().unwrap() = titles.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn checked_at(self, at: DateTime<Utc>) -> Self {
        *self.last_checked_at.lock().unwrap() = Some(at);
        self
    }
}

#[async_trait]
impl DestinationClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn destination_type(&self) -> &str {
        "mock"
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn auth_gated(&self) -> bool {
        self.auth_gated
    }

    fn is_authed(&self) -> bool {
        self.authed.load(Ordering::SeqCst)
    }

    fn can_try_auth(&self) -> bool {
        self.can_try_auth
    }

    fn is_scrobbling(&self) -> bool {
        self.scrobbling.load(Ordering::SeqCst)
    }

    fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        *self.last_checked_at.lock().unwrap()
    }

    fn dead_letter_len(&self) -> usize {
        0
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn test_auth(&self) -> Result<bool> {
        self.counters.test_auth.fetch_add(1, Ordering::SeqCst);
        if self.auth_succeeds {
            self.authed.store(true, Ordering::SeqCst);
            self.ready.store(true, Ordering::SeqCst);
        }
        Ok(self.auth_succeeds)
    }

    async fn refresh_scrobbles(&self) -> Result<()> {
        self.counters.refresh.fetch_add(1, Ordering::SeqCst);
        self.refresh_failure.apply("refresh")?;
        *self.last_checked_at.lock().unwrap() = Some(Utc::now());
        Ok(())
    }

    fn time_frame_is_valid(&self, played_at: DateTime<Utc>) -> bool {
        let now = Utc::now();
        played_at >= now - self.max_age && played_at <= now + Duration::seconds(60)
    }

    fn already_scrobbled(&self, event: &PlayEvent) -> bool {
        self.history.lock().unwrap().iter().any(|t| t == event.title())
    }

    async fn scrobble(&self, event: &PlayEvent) -> Result<DeliveryStatus> {
        self.counters.scrobble.fetch_add(1, Ordering::SeqCst);
        if self.failing_title.as_deref().is_none_or(|t| t == event.title()) {
            self.scrobble_failure.apply("scrobble")?;
        }
        self.history.lock().unwrap().push(event.title().to_string());
        self.counters
            .delivered
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, event.title()));
        Ok(DeliveryStatus::Delivered)
    }

    async fn process_dead_letter_queue(&self) -> Result<DeadLetterReport> {
        self.counters.dead_letter.fetch_add(1, Ordering::SeqCst);
        self.dead_letter_failure.apply("dead letter drain")?;
        Ok(DeadLetterReport::default())
    }

    fn init_scrobble_monitoring(&self) -> Result<()> {
        self.counters.monitoring_started.fetch_add(1, Ordering::SeqCst);
        self.scrobbling.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_scrobble_monitoring(&self) {
        self.scrobbling.store(false, Ordering::SeqCst);
    }

    fn queue_scrobble(&self, _event: PlayEvent) {}
}

/// Scripted wire API whose submit results are popped from a queue
///
/// When the script is empty every submit is accepted.
#[derive(Clone, Default)]
pub struct MockApi {
    pub script: Arc<Mutex<VecDeque<SubmitScript>>>,
    pub submitted: Arc<Mutex<Vec<String>>>,
    pub history: Arc<Mutex<Vec<PlayEvent>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitScript {
    Accept,
    Reject,
    Unreachable,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, steps: &[SubmitScript]) {
        self.script.lock().unwrap().extend(steps.iter().copied());
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationApi for MockApi {
    fn destination_type(&self) -> &'static str {
        "mock"
    }

    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn test_auth(&self) -> Result<()> {
        Ok(())
    }

    async fn recent_scrobbles(&self, _limit: usize) -> Result<Vec<PlayEvent>> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn submit(&self, event: &PlayEvent) -> Result<DeliveryOutcome> {
        self.submitted.lock().unwrap().push(event.title().to_string());
        let step = self.script.lock().unwrap().pop_front().unwrap_or(SubmitScript::Accept);
        match step {
            SubmitScript::Accept => Ok(DeliveryOutcome::Delivered { warnings: Vec::new() }),
            SubmitScript::Reject => Ok(DeliveryOutcome::Failed {
                error: Some(DestinationErrorDetail {
                    kind: "invalid_scrobble".to_string(),
                    value: None,
                    description: "rejected".to_string(),
                }),
                description: None,
                warnings: Vec::new(),
            }),
            SubmitScript::Unreachable => Err(Error::connection("connection refused")),
        }
    }
}

pub fn play(title: &str) -> PlayEvent {
    PlayEvent::new(["Artist"], title, Utc::now()).unwrap()
}

pub fn play_at(title: &str, at: DateTime<Utc>) -> PlayEvent {
    PlayEvent::new(["Artist"], title, at).unwrap()
}

pub fn titles(events: &[PlayEvent]) -> Vec<String> {
    events.iter().map(|e| e.title().to_string()).collect()
}
