// # scrobble-core
//
// Core library for delivering plays to scrobble destinations.
//
// ## Architecture Overview
//
// - **PlayEvent**: A normalized, validated record of one listen
// - **DestinationApi**: Trait for single-shot wire calls to one destination
// - **DestinationClient**: Trait for the stateful per-destination client
// - **ManagedClient**: Generic DestinationClient with auth backoff, recent
//   history, dead-letter queue and monitoring loop
// - **ClientRegistry**: Factory registry, config resolution and fan-out
// - **HeartbeatTask**: Fixed-interval, one-client-at-a-time self-healing
//
// ## Design Principles
//
// 1. **Per-client isolation**: No failure inside one client reaches another
// 2. **Plugin-based**: Destinations register factories, no type switches
// 3. **Library-first**: The daemon is a thin wrapper around this crate

pub mod client;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod play;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use client::ManagedClient;
pub use config::{ClientOptions, ConfigSource, DestinationConfig, ProtocolPreference, ResolvedDestination};
pub use error::{Error, Result};
pub use heartbeat::{HeartbeatReport, HeartbeatTask};
pub use play::{PlayBatch, PlayEvent};
pub use registry::{ClientRegistry, DispatchOptions};
pub use traits::{
    DeadLetterReport, DeliveryOutcome, DeliveryStatus, DestinationApi, DestinationClient,
    DestinationErrorDetail, DestinationFactory, DestinationWarning,
};
