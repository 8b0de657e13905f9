//! Configuration types for the scrobble delivery core
//!
//! This module defines the per-destination configuration structures and the
//! resolution policy that turns "whatever the operator provided" into at most
//! one usable configuration per destination type.
//!
//! ## Resolution Precedence
//!
//! For each destination type, resolvers are tried in order and the first one
//! that yields a candidate wins:
//!
//! 1. [`ExplicitConfigResolver`]: an entry in the provided config list whose
//!    `type` matches
//! 2. [`EnvConfigResolver`]: `<TYPE>_URL` / `<TYPE>_API_KEY` environment
//!    variables (only if at least one of them is set)
//! 3. [`FileConfigResolver`]: `<config_dir>/<type>.json`
//!
//! A winning candidate that lacks a `url` or `apiKey` yields no destination.
//! That outcome is logged as a warning and is never an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration for one destination, as provided by the operator
///
/// Every connection field is optional here; [`resolve_destination`] decides
/// whether the result is usable.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    /// Destination type tag (e.g. "maloja")
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Display name used in logs (defaults to the type tag)
    #[serde(default)]
    pub name: Option<String>,

    /// Base URL of the destination server
    #[serde(default)]
    pub url: Option<String>,

    /// API key used to authenticate scrobbles
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub api_key: Option<String>,

    /// Client behaviour tuning
    #[serde(default)]
    pub options: ClientOptions,
}

impl DestinationConfig {
    /// Create a configuration with url and api key set
    pub fn new(kind: impl Into<String>, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: Some(url.into()),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the client options
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }
}

impl std::fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("options", &self.options)
            .finish()
    }
}

/// Which wire form a destination should speak
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolPreference {
    /// Detect from the server on connection
    #[default]
    Auto,
    /// Flat form: artists joined into one string
    Flat,
    /// Structured form: artist lists
    Structured,
}

/// Upper bound for every duration option (ten years, in seconds)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Per-client behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// Oldest acceptable play, relative to now (in seconds)
    #[serde(default = "default_max_play_age_secs")]
    pub max_play_age_secs: u64,

    /// How far in the future a play timestamp may be (clock skew, in seconds)
    #[serde(default = "default_future_tolerance_secs")]
    pub future_tolerance_secs: u64,

    /// Two plays of the same track closer than this are duplicates (in seconds)
    #[serde(default = "default_dedup_tolerance_secs")]
    pub dedup_tolerance_secs: u64,

    /// Number of recent scrobbles fetched and kept for duplicate detection
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Maximum dead-letter entries; the oldest entry is dropped when full
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,

    /// Maximum plays waiting for the monitoring loop; the oldest play is
    /// dropped when full
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,

    /// Re-delivery attempts before a dead-letter entry is discarded
    #[serde(default = "default_dead_letter_max_retries")]
    pub dead_letter_max_retries: u32,

    /// First delay after a failed auth attempt (in seconds)
    #[serde(default = "default_auth_retry_base_secs")]
    pub auth_retry_base_secs: u64,

    /// Upper bound of the auth retry delay (in seconds)
    #[serde(default = "default_auth_retry_max_secs")]
    pub auth_retry_max_secs: u64,

    /// Timeout applied to every request made to the destination (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Ask the destination to skip server-side metadata correction
    #[serde(default)]
    pub nofix: bool,

    /// Wire form to use
    #[serde(default)]
    pub protocol: ProtocolPreference,
}

impl ClientOptions {
    /// Validate the options
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.recent_limit == 0 {
            return Err(crate::Error::config("recentLimit must be > 0"));
        }
        if self.dead_letter_capacity == 0 {
            return Err(crate::Error::config("deadLetterCapacity must be > 0"));
        }
        if self.pending_capacity == 0 {
            return Err(crate::Error::config("pendingCapacity must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("requestTimeoutSecs must be > 0"));
        }
        if self.auth_retry_base_secs > self.auth_retry_max_secs {
            return Err(crate::Error::config(
                "authRetryBaseSecs cannot exceed authRetryMaxSecs",
            ));
        }

        let durations = [
            ("maxPlayAgeSecs", self.max_play_age_secs),
            ("futureToleranceSecs", self.future_tolerance_secs),
            ("dedupToleranceSecs", self.dedup_tolerance_secs),
            ("authRetryMaxSecs", self.auth_retry_max_secs),
            ("requestTimeoutSecs", self.request_timeout_secs),
        ];
        for (field, secs) in durations {
            if secs > MAX_DURATION_SECS {
                return Err(crate::Error::config(format!(
                    "{} must be at most {} seconds. Got: {}",
                    field, MAX_DURATION_SECS, secs
                )));
            }
        }
        Ok(())
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_play_age_secs: default_max_play_age_secs(),
            future_tolerance_secs: default_future_tolerance_secs(),
            dedup_tolerance_secs: default_dedup_tolerance_secs(),
            recent_limit: default_recent_limit(),
            dead_letter_capacity: default_dead_letter_capacity(),
            pending_capacity: default_pending_capacity(),
            dead_letter_max_retries: default_dead_letter_max_retries(),
            auth_retry_base_secs: default_auth_retry_base_secs(),
            auth_retry_max_secs: default_auth_retry_max_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            nofix: false,
            protocol: ProtocolPreference::Auto,
        }
    }
}

fn default_max_play_age_secs() -> u64 {
    24 * 60 * 60
}

fn default_future_tolerance_secs() -> u64 {
    60
}

fn default_dedup_tolerance_secs() -> u64 {
    10
}

fn default_recent_limit() -> usize {
    50
}

fn default_dead_letter_capacity() -> usize {
    500
}

fn default_pending_capacity() -> usize {
    500
}

fn default_dead_letter_max_retries() -> u32 {
    10
}

fn default_auth_retry_base_secs() -> u64 {
    30
}

fn default_auth_retry_max_secs() -> u64 {
    15 * 60
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Where a resolved configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Entry in the explicit configuration list
    Explicit,
    /// Environment variables
    Environment,
    /// Per-type JSON file
    File(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Explicit => write!(f, "config list"),
            ConfigSource::Environment => write!(f, "environment"),
            ConfigSource::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// A configuration with every required connection field present
#[derive(Clone)]
pub struct ResolvedDestination {
    /// Destination type tag
    pub kind: String,
    /// Display name
    pub name: String,
    /// Base URL
    pub url: String,
    /// API key
    /// ⚠️ NEVER log this value
    pub api_key: String,
    /// Client behaviour tuning
    pub options: ClientOptions,
    /// Which resolver produced it
    pub source: ConfigSource,
}

impl std::fmt::Debug for ResolvedDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDestination")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_key", &"<REDACTED>")
            .field("source", &self.source)
            .finish()
    }
}

/// Inputs available to the resolvers
///
/// The environment is passed as a snapshot so resolution never reads
/// process-global state behind the caller's back.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Explicitly provided configurations
    pub configs: &'a [DestinationConfig],
    /// Directory holding per-type fallback files
    pub config_dir: Option<&'a Path>,
    /// Environment variables
    pub env: &'a HashMap<String, String>,
}

/// Snapshot the current process environment
pub fn process_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// One step of the resolution chain
pub trait ConfigResolver: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Produce a candidate configuration for `kind`, or `None` to fall through
    fn resolve(&self, kind: &str, ctx: &ResolveContext<'_>) -> Option<(DestinationConfig, ConfigSource)>;
}

/// Matches an entry of the explicit configuration list by type
pub struct ExplicitConfigResolver;

impl ConfigResolver for ExplicitConfigResolver {
    fn name(&self) -> &'static str {
        "explicit"
    }

    fn resolve(&self, kind: &str, ctx: &ResolveContext<'_>) -> Option<(DestinationConfig, ConfigSource)> {
        ctx.configs
            .iter()
            .find(|c| c.kind.eq_ignore_ascii_case(kind))
            .map(|c| (c.clone(), ConfigSource::Explicit))
    }
}

/// Reads `<TYPE>_URL` and `<TYPE>_API_KEY`
pub struct EnvConfigResolver;

impl EnvConfigResolver {
    /// Environment variable prefix for a destination type (`maloja` → `MALOJA`)
    pub fn prefix(kind: &str) -> String {
        kind.to_ascii_uppercase().replace(['-', '.'], "_")
    }
}

impl ConfigResolver for EnvConfigResolver {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn resolve(&self, kind: &str, ctx: &ResolveContext<'_>) -> Option<(DestinationConfig, ConfigSource)> {
        let prefix = Self::prefix(kind);
        let url = ctx.env.get(&format!("{prefix}_URL")).cloned();
        let api_key = ctx.env.get(&format!("{prefix}_API_KEY")).cloned();

        if url.is_none() && api_key.is_none() {
            return None;
        }

        let config = DestinationConfig {
            kind: kind.to_string(),
            url,
            api_key,
            ..DestinationConfig::default()
        };
        Some((config, ConfigSource::Environment))
    }
}

/// Loads `<config_dir>/<type>.json`
pub struct FileConfigResolver;

impl ConfigResolver for FileConfigResolver {
    fn name(&self) -> &'static str {
        "file"
    }

    fn resolve(&self, kind: &str, ctx: &ResolveContext<'_>) -> Option<(DestinationConfig, ConfigSource)> {
        let dir = ctx.config_dir?;
        let path = dir.join(format!("{kind}.json"));

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("No {} config file at {}: {}", kind, path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<DestinationConfig>(&contents) {
            Ok(mut config) => {
                config.kind = kind.to_string();
                Some((config, ConfigSource::File(path)))
            }
            Err(e) => {
                warn!("Ignoring unreadable {} config file {}: {}", kind, path.display(), e);
                None
            }
        }
    }
}

/// The standard resolution chain: explicit → environment → file
pub fn default_resolvers() -> Vec<Box<dyn ConfigResolver>> {
    vec![
        Box::new(ExplicitConfigResolver),
        Box::new(EnvConfigResolver),
        Box::new(FileConfigResolver),
    ]
}

/// Resolve the configuration for one destination type
///
/// Returns `None` (after logging a warning where appropriate) if no resolver
/// produced a candidate or the candidate lacks a url or api key.
pub fn resolve_destination(
    kind: &str,
    resolvers: &[Box<dyn ConfigResolver>],
    ctx: &ResolveContext<'_>,
) -> Option<ResolvedDestination> {
    let Some((config, source)) = resolvers.iter().find_map(|r| {
        let found = r.resolve(kind, ctx);
        if found.is_some() {
            debug!("{} config found by {} resolver", kind, r.name());
        }
        found
    }) else {
        debug!("No configuration found for {}, skipping", kind);
        return None;
    };

    let name = config
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| kind.to_string());

    let Some(url) = config.url.filter(|u| !u.trim().is_empty()) else {
        warn!("{} url not found in config ({}), skipping {}", kind, source, name);
        return None;
    };
    let Some(api_key) = config.api_key.filter(|k| !k.trim().is_empty()) else {
        warn!("{} api key not found in config ({}), skipping {}", kind, source, name);
        return None;
    };

    Some(ResolvedDestination {
        kind: kind.to_string(),
        name,
        url,
        api_key,
        options: config.options,
        source,
    })
}
