//! Plugin-based client registry
//!
//! The registry maps destination type names to factories, builds one client
//! per configured destination and fans plays out to all of them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scrobble_core::registry::{ClientRegistry, DispatchOptions};
//!
//! let registry = ClientRegistry::new();
//! scrobble_destination_maloja::register(&registry);
//!
//! registry.build(&configs, Some(config_dir));
//! let attempted = registry.scrobble(plays, DispatchOptions::default()).await;
//! ```
//!
//! ## Failure Isolation
//!
//! Each client is driven in its own task. An error or panic in one client is
//! logged with that client's name; the other clients are unaffected and
//! [`ClientRegistry::scrobble`] itself never fails. Plays are recorded as
//! attempted before they are handed to the client, so a client that panics
//! mid-batch still reports the plays it was given.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{
    ConfigResolver, DestinationConfig, ResolveContext, default_resolvers, process_env,
    resolve_destination,
};
use crate::play::{PlayBatch, PlayEvent};
use crate::traits::{DestinationClient, DestinationFactory};

/// Per-call dispatch settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Refresh every client's recent history before delivering
    pub force_refresh: bool,
    /// Refresh clients whose history is older than this (defaults to now)
    pub check_time: Option<DateTime<Utc>>,
}

impl DispatchOptions {
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
            check_time: None,
        }
    }

    pub fn checked_at(check_time: DateTime<Utc>) -> Self {
        Self {
            force_refresh: false,
            check_time: Some(check_time),
        }
    }
}

type ClientList = Arc<Vec<Arc<dyn DestinationClient>>>;

/// Registry of destination factories and the clients built from them
///
/// ## Thread Safety
///
/// Factories and the client list sit behind `RwLock`s. The client list is
/// replaced wholesale on rebuild, so a dispatch in flight keeps the snapshot
/// it started with.
pub struct ClientRegistry {
    factories: RwLock<HashMap<String, Box<dyn DestinationFactory>>>,
    resolvers: Vec<Box<dyn ConfigResolver>>,
    clients: RwLock<ClientList>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    /// Create an empty registry using the default config resolvers
    pub fn new() -> Self {
        Self::with_resolvers(default_resolvers())
    }

    /// Create an empty registry with a custom resolver chain
    ///
    /// Resolvers are consulted in order; the first to return a candidate
    /// wins.
    pub fn with_resolvers(resolvers: Vec<Box<dyn ConfigResolver>>) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            resolvers,
            clients: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Register a destination factory
    ///
    /// # Parameters
    ///
    /// - `name`: Destination type name (e.g., "maloja")
    /// - `factory`: Factory object for creating client instances
    pub fn register_factory(&self, name: impl Into<String>, factory: Box<dyn DestinationFactory>) {
        let name = name.into().to_lowercase();
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        factories.insert(name, factory);
    }

    /// Check if a destination type is registered
    pub fn has_factory(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.contains_key(&name.to_lowercase())
    }

    /// List registered destination types, sorted
    pub fn list_factories(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of the current clients
    pub fn clients(&self) -> Vec<Arc<dyn DestinationClient>> {
        self.snapshot().as_ref().clone()
    }

    fn snapshot(&self) -> ClientList {
        Arc::clone(&self.clients.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Build clients from configuration and the process environment
    ///
    /// See [`build_with_env`](Self::build_with_env).
    pub fn build(&self, configs: &[DestinationConfig], config_dir: Option<&Path>) -> usize {
        let env = process_env();
        self.build_with_env(configs, config_dir, &env)
    }

    /// Build clients, replacing any previous list
    ///
    /// For every registered destination type the resolver chain picks one
    /// configuration (explicit, then environment, then `{config_dir}/{type}.json`).
    /// Types with no usable configuration, or whose factory fails, are
    /// skipped with a warning. Building never fails.
    ///
    /// Monitoring loops of the replaced clients are stopped.
    ///
    /// # Returns
    ///
    /// Number of clients built
    pub fn build_with_env(
        &self,
        configs: &[DestinationConfig],
        config_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> usize {
        let ctx = ResolveContext {
            configs,
            config_dir,
            env,
        };

        let mut built: Vec<Arc<dyn DestinationClient>> = Vec::new();
        {
            let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
            let mut kinds: Vec<&String> = factories.keys().collect();
            kinds.sort();

            for kind in kinds {
                let Some(resolved) = resolve_destination(kind, &self.resolvers, &ctx) else {
                    continue;
                };
                let Some(factory) = factories.get(kind) else {
                    continue;
                };

                match factory.create(&resolved) {
                    Ok(client) => {
                        info!(
                            client = %client.name(),
                            "Built {} client from {} config",
                            kind,
                            resolved.source
                        );
                        built.push(client);
                    }
                    Err(e) => {
                        warn!("Failed to create {} client {}: {}", kind, resolved.name, e);
                    }
                }
            }
        }

        let count = built.len();
        let previous = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *clients, Arc::new(built))
        };
        for client in previous.iter() {
            client.stop_scrobble_monitoring();
        }

        if count == 0 {
            warn!("No scrobble clients configured");
        } else {
            info!("{} scrobble client(s) ready", count);
        }
        count
    }

    /// Replace the client list with pre-built clients
    ///
    /// Monitoring loops of the replaced clients are stopped.
    pub fn set_clients(&self, clients: Vec<Arc<dyn DestinationClient>>) {
        let previous = {
            let mut current = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, Arc::new(clients))
        };
        for client in previous.iter() {
            client.stop_scrobble_monitoring();
        }
    }

    /// Deliver plays to every client
    ///
    /// Clients run concurrently; each handles the plays sequentially in the
    /// given order. Per client:
    ///
    /// 1. Refresh the recent history if `force_refresh` is set or the last
    ///    refresh is missing or older than `check_time`. A failed refresh is
    ///    logged and delivery goes ahead with the cached history.
    /// 2. For each play inside the client's time window and not already
    ///    scrobbled, attempt delivery.
    ///
    /// # Returns
    ///
    /// The plays at least one client attempted, in input order and without
    /// repeats. A play a client dead-lettered, or was handed just before it
    /// failed or panicked, still counts as attempted.
    pub async fn scrobble(
        &self,
        events: impl Into<PlayBatch>,
        options: DispatchOptions,
    ) -> Vec<PlayEvent> {
        let events: Arc<Vec<PlayEvent>> = Arc::new(events.into().into_vec());
        let clients = self.snapshot();
        if events.is_empty() || clients.is_empty() {
            return Vec::new();
        }

        let check_time = options.check_time.unwrap_or_else(Utc::now);

        let attempted = Arc::new(Mutex::new(BTreeSet::new()));
        let mut tasks = JoinSet::new();
        let mut names: HashMap<tokio::task::Id, String> = HashMap::new();
        for client in clients.iter() {
            let client = Arc::clone(client);
            let events = Arc::clone(&events);
            let attempted = Arc::clone(&attempted);
            let name = client.name().to_string();
            let handle = tasks.spawn(async move {
                dispatch_to_client(client.as_ref(), &events, &attempted, options.force_refresh, check_time)
                    .await
            });
            names.insert(handle.id(), name);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, count)) => {
                    let name = names.get(&id).map(String::as_str).unwrap_or("unknown");
                    debug!(client = %name, "Dispatch finished after {} attempt(s)", count);
                }
                Err(e) => {
                    let name = names.get(&e.id()).map(String::as_str).unwrap_or("unknown");
                    error!(client = %name, "Dispatch task failed: {}", e);
                }
            }
        }

        let attempted = std::mem::take(&mut *attempted.lock().unwrap_or_else(PoisonError::into_inner));
        attempted.into_iter().map(|i| events[i].clone()).collect()
    }

    /// Hand plays to every client's monitoring loop
    ///
    /// Clients without a running loop keep the plays until one is started.
    pub fn queue_scrobble(&self, events: impl IntoIterator<Item = PlayEvent>) {
        let clients = self.snapshot();
        for event in events {
            for client in clients.iter() {
                client.queue_scrobble(event.clone());
            }
        }
    }

    /// Stop every client's monitoring loop
    pub fn shutdown(&self) {
        let clients = self.snapshot();
        for client in clients.iter() {
            client.stop_scrobble_monitoring();
        }
        info!("Stopped {} scrobble client(s)", clients.len());
    }
}

/// Drive one client through a dispatch, returning how many plays it attempted
///
/// Each index is added to `attempted` before the client sees the play.
async fn dispatch_to_client(
    client: &dyn DestinationClient,
    events: &[PlayEvent],
    attempted: &Mutex<BTreeSet<usize>>,
    force_refresh: bool,
    check_time: DateTime<Utc>,
) -> usize {
    let stale = client.last_checked_at().is_none_or(|at| at < check_time);
    if force_refresh || stale {
        if let Err(e) = client.refresh_scrobbles().await {
            warn!(client = %client.name(), "Could not refresh recent scrobbles: {}", e);
        }
    }

    let mut count = 0;
    for (index, event) in events.iter().enumerate() {
        if !client.time_frame_is_valid(event.played_at()) {
            debug!(
                client = %client.name(),
                "{} is outside the acceptable time window, skipping",
                event.display_label()
            );
            continue;
        }
        if client.already_scrobbled(event) {
            debug!(client = %client.name(), "{} already scrobbled, skipping", event.display_label());
            continue;
        }

        attempted.lock().unwrap_or_else(PoisonError::into_inner).insert(index);
        count += 1;
        match client.scrobble(event).await {
            Ok(status) => debug!(client = %client.name(), "{}: {:?}", event.display_label(), status),
            Err(e) => error!(client = %client.name(), "Error scrobbling {}: {}", event.display_label(), e),
        }
    }
    count
}
