//! Core traits for the scrobble delivery system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DestinationApi`]: Single-shot wire calls to one destination service
//! - [`DestinationClient`]: Stateful client driven by the registry and heartbeat

pub mod destination_api;
pub mod destination_client;

pub use destination_api::{DeliveryOutcome, DestinationApi, DestinationErrorDetail, DestinationWarning};
pub use destination_client::{DeadLetterReport, DeliveryStatus, DestinationClient, DestinationFactory};
