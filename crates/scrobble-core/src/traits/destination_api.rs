// # Destination API Trait
//
// Defines the wire-level interface to one scrobble-accepting service.
//
// ## Implementations
//
// - Maloja: `scrobble-destination-maloja` crate
//
// ## Usage
//
// ```rust,ignore
// use scrobble_core::traits::DestinationApi;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let api = /* DestinationApi implementation */;
//
//     api.check_connection().await?;
//     api.test_auth().await?;
//     let outcome = api.submit(&play).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::play::PlayEvent;

/// Structured error returned by a destination alongside a failed outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationErrorDetail {
    /// Error type reported by the destination
    pub kind: String,
    /// Offending value, if any
    pub value: Option<String>,
    /// Human-readable description
    pub description: String,
}

impl std::fmt::Display for DestinationErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} ({}): {}", self.kind, value, self.description),
            None => write!(f, "{}: {}", self.kind, self.description),
        }
    }
}

/// Non-fatal warning reported by a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationWarning {
    pub kind: String,
    pub value: String,
    pub description: String,
}

/// Decoded outcome of a single scrobble submission
///
/// Errors and warnings are informational: the core logs them but never
/// acts on their contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The destination recorded the scrobble
    Delivered {
        /// Warnings attached to the accepted scrobble
        warnings: Vec<DestinationWarning>,
    },
    /// The destination refused or failed the scrobble
    Failed {
        /// Structured error, if the destination provided one
        error: Option<DestinationErrorDetail>,
        /// Free-form description, if any
        description: Option<String>,
        /// Warnings attached to the response
        warnings: Vec<DestinationWarning>,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn warnings(&self) -> &[DestinationWarning] {
        match self {
            DeliveryOutcome::Delivered { warnings } | DeliveryOutcome::Failed { warnings, .. } => warnings,
        }
    }

    /// One-line reason for a failed outcome (empty for delivered)
    pub fn failure_reason(&self) -> String {
        match self {
            DeliveryOutcome::Delivered { .. } => String::new(),
            DeliveryOutcome::Failed { error: Some(error), .. } => error.to_string(),
            DeliveryOutcome::Failed { description: Some(desc), .. } => desc.clone(),
            DeliveryOutcome::Failed { .. } => "destination reported failure".to_string(),
        }
    }
}

/// Trait for destination API implementations
///
/// Implementations translate core operations into the destination's wire
/// protocol and nothing more.
///
/// # Responsibilities
///
/// - Perform HTTP calls to the configured endpoint only, each with a bounded
///   timeout
/// - Encode plays and decode responses
/// - Classify failures: [`crate::Error::Authentication`] when credentials are
///   rejected, [`crate::Error::Connection`] when the server cannot be reached
///
/// Retry, dead-lettering, duplicate detection and auth backoff are owned by
/// [`crate::client::ManagedClient`]. An implementation that retries on its own
/// defeats the dead-letter queue's ordering and the heartbeat's rate bound.
#[async_trait]
pub trait DestinationApi: Send + Sync {
    /// Destination type tag (e.g. "maloja")
    fn destination_type(&self) -> &'static str;

    /// Whether scrobbling requires a successful auth check first
    fn auth_gated(&self) -> bool {
        true
    }

    /// Probe the server
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the server answered and is able to accept scrobbles
    /// - `Err(Error::Connection)`: unreachable or unhealthy
    async fn check_connection(&self) -> Result<(), crate::Error>;

    /// Check the configured credentials
    ///
    /// # Returns
    ///
    /// - `Ok(())`: credentials accepted
    /// - `Err(Error::Authentication)`: credentials rejected
    /// - `Err(_)`: the check itself failed
    async fn test_auth(&self) -> Result<(), crate::Error>;

    /// Fetch the most recent scrobbles, newest first
    async fn recent_scrobbles(&self, limit: usize) -> Result<Vec<PlayEvent>, crate::Error>;

    /// Submit a single play
    ///
    /// A decoded refusal is `Ok(DeliveryOutcome::Failed { .. })`; `Err` is
    /// reserved for transport failures and undecodable responses.
    async fn submit(&self, event: &PlayEvent) -> Result<DeliveryOutcome, crate::Error>;
}
