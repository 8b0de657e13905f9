// # Maloja Destination
//
// Delivers plays to a self-hosted Maloja server through its native
// `mlj_1` API.
//
// ## Scope
//
// `MalojaApi` makes single-shot HTTP calls and reports what happened. Retry,
// backoff, duplicate detection and dead-lettering belong to the generic
// `ManagedClient` that `MalojaFactory` wraps around it.
//
// ## Security
//
// - The API key never appears in logs or Debug output
// - Every request carries the configured timeout
//
// ## API Reference
//
// - Server info: GET `/apis/mlj_1/serverinfo`
// - Key check: GET `/apis/mlj_1/test?key=...`
// - Recent plays: GET `/apis/mlj_1/scrobbles?max=...`
// - New play: POST `/apis/mlj_1/newscrobble`

pub mod codec;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use scrobble_core::config::{ClientOptions, ProtocolPreference, ResolvedDestination};
use scrobble_core::traits::{DeliveryOutcome, DestinationApi, DestinationClient, DestinationFactory};
use scrobble_core::{ClientRegistry, Error, ManagedClient, PlayEvent, Result};

use codec::{ProtocolVersion, ServerInfo};

/// Destination type tag
pub const DESTINATION_TYPE: &str = "maloja";

const API_PREFIX: &str = "/apis/mlj_1";

/// Wire-level Maloja API
pub struct MalojaApi {
    /// Server root without a trailing slash
    base_url: String,

    /// ⚠️ NEVER log this value
    api_key: String,

    client: reqwest::Client,

    preference: ProtocolPreference,

    nofix: bool,

    /// Request shape detected from the server version
    detected: RwLock<Option<ProtocolVersion>>,
}

impl std::fmt::Debug for MalojaApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MalojaApi")
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .field("preference", &self.preference)
            .field("nofix", &self.nofix)
            .finish()
    }
}

impl MalojaApi {
    /// Create a new Maloja API client
    ///
    /// # Parameters
    ///
    /// - `url`: Server root, e.g. `http://localhost:42010` (a trailing slash
    ///   is ignored)
    /// - `api_key`: Maloja API key
    /// - `options`: Supplies the request timeout, protocol preference and
    ///   `nofix`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an empty key, a non-HTTP url, or if the HTTP
    /// client cannot be built.
    pub fn new(url: &str, api_key: impl Into<String>, options: &ClientOptions) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("Maloja API key cannot be empty"));
        }

        let base_url = url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!("Maloja url must start with http:// or https://: {}", base_url)));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            api_key,
            client,
            preference: options.protocol,
            nofix: options.nofix,
            detected: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url, API_PREFIX, path)
    }

    /// Fetch `serverinfo` and remember the request shape it implies
    pub async fn server_info(&self) -> Result<ServerInfo> {
        let response = self
            .client
            .get(self.endpoint("serverinfo"))
            .send()
            .await
            .map_err(|e| Error::connection(format!("Maloja server not reachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::connection(format!("Maloja serverinfo returned {}", status)));
        }

        let info: ServerInfo = response
            .json()
            .await
            .map_err(|e| Error::connection(format!("Unreadable serverinfo response: {}", e)))?;

        *self.detected.write().await = Some(info.protocol());
        Ok(info)
    }

    /// Request shape to use for the next scrobble
    ///
    /// With an `auto` preference the server is probed once and the result is
    /// cached.
    pub async fn protocol(&self) -> Result<ProtocolVersion> {
        match self.preference {
            ProtocolPreference::Flat => return Ok(ProtocolVersion::Flat),
            ProtocolPreference::Structured => return Ok(ProtocolVersion::Structured),
            ProtocolPreference::Auto => {}
        }

        if let Some(version) = *self.detected.read().await {
            return Ok(version);
        }
        Ok(self.server_info().await?.protocol())
    }
}

#[async_trait]
impl DestinationApi for MalojaApi {
    fn destination_type(&self) -> &'static str {
        DESTINATION_TYPE
    }

    async fn check_connection(&self) -> Result<()> {
        let info = self.server_info().await?;
        if !info.is_healthy() {
            return Err(Error::connection("Maloja database is not healthy"));
        }
        info!(
            "Connected to Maloja {} at {} ({} form)",
            if info.versionstring.is_empty() { "(unknown version)" } else { info.versionstring.as_str() },
            self.base_url,
            self.protocol().await?
        );
        Ok(())
    }

    async fn test_auth(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("test"))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| Error::connection(format!("Maloja server not reachable: {}", e)))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::auth("Maloja rejected the API key"))
            }
            status if status.is_server_error() => {
                Err(Error::connection(format!("Maloja server error (transient): {}", status)))
            }
            status => Err(Error::auth(format!("Maloja key check failed: {}", status))),
        }
    }

    async fn recent_scrobbles(&self, limit: usize) -> Result<Vec<PlayEvent>> {
        let response = self
            .client
            .get(self.endpoint("scrobbles"))
            .query(&[("max", limit)])
            .send()
            .await
            .map_err(|e| Error::connection(format!("Maloja server not reachable: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::connection(format!("Maloja server error (transient): {}", status)));
        }
        if !status.is_success() {
            return Err(Error::delivery(DESTINATION_TYPE, format!("Recent scrobbles request failed: {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::connection(format!("Failed to read response: {}", e)))?;
        let events = codec::parse_recent_scrobbles(&body)?;
        debug!("Fetched {} recent scrobbles from {}", events.len(), self.base_url);
        Ok(events)
    }

    async fn submit(&self, event: &PlayEvent) -> Result<DeliveryOutcome> {
        let version = self.protocol().await?;
        let request = codec::encode(event, &self.api_key, version, self.nofix);

        let response = self
            .client
            .post(self.endpoint("newscrobble"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::connection(format!("Maloja server not reachable: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::auth(format!("Maloja rejected the scrobble: {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::connection(format!("Failed to read response: {}", e)))?;

        // 4xx bodies still carry the structured error
        match codec::parse_response(&body) {
            Ok(parsed) => {
                if let Some(track) = &parsed.track {
                    debug!(
                        "Maloja recorded {} - {}",
                        track.artists.join(", "),
                        track.title.as_deref().unwrap_or("?")
                    );
                }
                let outcome = parsed.into_outcome();
                if !outcome.is_delivered() && status.is_success() {
                    warn!("Maloja answered {} but reported failure", status);
                }
                Ok(outcome)
            }
            Err(e) if status.is_server_error() => {
                Err(Error::connection(format!("Maloja server error (transient): {} ({})", status, e)))
            }
            Err(e) => Err(Error::delivery(
                DESTINATION_TYPE,
                format!("Unreadable newscrobble response ({}): {}", status, e),
            )),
        }
    }
}

/// Factory for creating Maloja clients
pub struct MalojaFactory;

impl DestinationFactory for MalojaFactory {
    fn create(&self, config: &ResolvedDestination) -> Result<Arc<dyn DestinationClient>> {
        let api = MalojaApi::new(&config.url, config.api_key.clone(), &config.options)?;
        let client = ManagedClient::new(config.name.clone(), Box::new(api), config.options.clone())?;
        Ok(Arc::new(client))
    }
}

/// Register the Maloja destination with a registry
///
/// # Example
///
/// ```rust
/// use scrobble_core::ClientRegistry;
///
/// let registry = ClientRegistry::new();
/// scrobble_destination_maloja::register(&registry);
/// assert!(registry.has_factory("maloja"));
/// ```
pub fn register(registry: &ClientRegistry) {
    registry.register_factory(DESTINATION_TYPE, Box::new(MalojaFactory));
}
