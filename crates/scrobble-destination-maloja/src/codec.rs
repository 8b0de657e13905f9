//! Maloja wire codec
//!
//! Maloja accepts two request shapes on `POST /apis/mlj_1/newscrobble`:
//!
//! - **Flat** (servers before 3.0): a single `artist` string
//! - **Structured** (3.0 and later): `artists` and `albumartists` lists
//!
//! Flattening joins names with [`FLAT_ARTIST_SEPARATOR`]. The join keeps the
//! order but is lossy: a comma inside an artist name cannot be told apart
//! from the separator.
//!
//! Responses carry a `status` string. Only `success` and `ok` mean the play
//! was recorded; every other value, including ones this codec has never
//! seen, is a failure.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use scrobble_core::traits::{DeliveryOutcome, DestinationErrorDetail, DestinationWarning};
use scrobble_core::{Error, PlayEvent, Result};

/// Separator used to join artists in the flat form
pub const FLAT_ARTIST_SEPARATOR: &str = ", ";

/// Request shape understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Flat,
    Structured,
}

impl ProtocolVersion {
    /// Pick the request shape for a server major version
    pub fn for_server_major(major: u64) -> Self {
        if major >= 3 {
            ProtocolVersion::Structured
        } else {
            ProtocolVersion::Flat
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::Flat => write!(f, "flat"),
            ProtocolVersion::Structured => write!(f, "structured"),
        }
    }
}

/// `newscrobble` body for servers before 3.0
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatScrobbleRequest<'a> {
    pub key: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<&'a str>,
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub artist: String,
}

/// `newscrobble` body for 3.0 and later
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredScrobbleRequest<'a> {
    pub key: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<&'a str>,
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub artists: &'a [String],
    pub albumartists: &'a [String],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nofix: bool,
}

/// An encoded `newscrobble` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScrobbleRequest<'a> {
    Flat(FlatScrobbleRequest<'a>),
    Structured(StructuredScrobbleRequest<'a>),
}

/// Build the request body for one play
///
/// # Parameters
///
/// - `event`: The play to encode
/// - `key`: API key sent in the body
/// - `version`: Request shape
/// - `nofix`: Ask the server not to correct metadata (structured form only)
///
/// Album artists fall back to the track artists, so neither list is ever
/// empty.
pub fn encode<'a>(
    event: &'a PlayEvent,
    key: &'a str,
    version: ProtocolVersion,
    nofix: bool,
) -> ScrobbleRequest<'a> {
    let time = event.played_at().timestamp();
    match version {
        ProtocolVersion::Flat => ScrobbleRequest::Flat(FlatScrobbleRequest {
            key,
            title: event.title(),
            album: event.album(),
            time,
            length: event.duration_secs(),
            duration: event.listened_secs(),
            artist: event.artists().join(FLAT_ARTIST_SEPARATOR),
        }),
        ProtocolVersion::Structured => {
            let albumartists = if event.album_artists().is_empty() {
                event.artists()
            } else {
                event.album_artists()
            };
            ScrobbleRequest::Structured(StructuredScrobbleRequest {
                key,
                title: event.title(),
                album: event.album(),
                time,
                length: event.duration_secs(),
                duration: event.listened_secs(),
                artists: event.artists(),
                albumartists,
                nofix,
            })
        }
    }
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Ok,
    Failure,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ResponseStatus {
    pub fn is_delivered(self) -> bool {
        matches!(self, ResponseStatus::Success | ResponseStatus::Ok)
    }
}

/// Error field: structured on 3.x, sometimes a bare string on older servers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResponseError {
    Detailed {
        #[serde(rename = "type", default)]
        kind: String,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default)]
        desc: Option<String>,
    },
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseWarning {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub desc: String,
}

/// Track echo returned by 3.x servers
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackEcho {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<Value>,
}

/// Parsed `newscrobble` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScrobbleResponse {
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub track: Option<TrackEcho>,
    #[serde(default)]
    pub warnings: Vec<ResponseWarning>,
}

impl ScrobbleResponse {
    /// Collapse the response into delivered or failed
    pub fn into_outcome(self) -> DeliveryOutcome {
        let warnings = self
            .warnings
            .into_iter()
            .map(|w| DestinationWarning {
                kind: w.kind,
                value: w.value.as_ref().map(value_text).unwrap_or_default(),
                description: w.desc,
            })
            .collect();

        if self.status.is_delivered() {
            return DeliveryOutcome::Delivered { warnings };
        }

        let error = self.error.map(|e| match e {
            ResponseError::Detailed { kind, value, desc } => DestinationErrorDetail {
                kind,
                value: value.as_ref().map(value_text),
                description: desc.unwrap_or_default(),
            },
            ResponseError::Message(message) => DestinationErrorDetail {
                kind: "error".to_string(),
                value: None,
                description: message,
            },
        });

        DeliveryOutcome::Failed {
            error,
            description: self.desc,
            warnings,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a raw `newscrobble` response body
pub fn parse_response(body: &[u8]) -> Result<ScrobbleResponse> {
    Ok(serde_json::from_slice(body)?)
}

/// Map a raw `newscrobble` response body to an outcome
///
/// # Errors
///
/// Returns `Error::Json` if the body is not a JSON object.
pub fn decode(body: &[u8]) -> Result<DeliveryOutcome> {
    parse_response(body).map(ScrobbleResponse::into_outcome)
}

/// Map an already parsed response to an outcome
pub fn decode_value(value: Value) -> Result<DeliveryOutcome> {
    let response: ScrobbleResponse = serde_json::from_value(value)?;
    Ok(response.into_outcome())
}

/// `GET /apis/mlj_1/serverinfo`
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub version: Vec<u64>,
    #[serde(default)]
    pub versionstring: String,
    #[serde(default)]
    pub db_status: Option<DbStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbStatus {
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_healthy() -> bool {
    true
}

impl ServerInfo {
    pub fn protocol(&self) -> ProtocolVersion {
        ProtocolVersion::for_server_major(self.version.first().copied().unwrap_or(0))
    }

    /// Servers that do not report database status count as healthy
    pub fn is_healthy(&self) -> bool {
        self.db_status.as_ref().is_none_or(|db| db.healthy)
    }
}

#[derive(Debug, Deserialize)]
struct ScrobbleList {
    #[serde(default)]
    list: Vec<Value>,
}

/// History entry returned by 3.x servers
#[derive(Debug, Deserialize)]
struct StructuredEntry {
    time: i64,
    track: TrackEntry,
    #[serde(default)]
    duration: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    artists: Vec<String>,
    title: String,
    #[serde(default)]
    album: Option<AlbumEntry>,
    #[serde(default)]
    length: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AlbumEntry {
    #[serde(default, alias = "name")]
    albumtitle: Option<String>,
    #[serde(default)]
    artists: Vec<String>,
}

/// History entry returned by servers before 3.0
#[derive(Debug, Deserialize)]
struct FlatEntry {
    artists: Vec<String>,
    title: String,
    #[serde(default)]
    album: Option<String>,
    time: i64,
    #[serde(default)]
    duration: Option<u32>,
}

/// Parse `GET /apis/mlj_1/scrobbles`
///
/// Both history shapes are accepted. Entries that cannot be turned into a
/// valid play are skipped.
pub fn parse_recent_scrobbles(body: &[u8]) -> Result<Vec<PlayEvent>> {
    let list: ScrobbleList = serde_json::from_slice(body)?;
    let mut events = Vec::with_capacity(list.list.len());

    for entry in list.list {
        match history_entry(entry) {
            Ok(event) => events.push(event),
            Err(e) => debug!("Skipping unreadable history entry: {}", e),
        }
    }
    Ok(events)
}

fn history_entry(entry: Value) -> Result<PlayEvent> {
    if entry.get("track").is_some() {
        let entry: StructuredEntry = serde_json::from_value(entry)?;
        let mut event = PlayEvent::new(entry.track.artists, entry.track.title, timestamp(entry.time)?)?;
        if let Some(album) = entry.track.album {
            if let Some(title) = album.albumtitle {
                event = event.with_album(title);
            }
            event = event.with_album_artists(album.artists);
        }
        if let Some(length) = entry.track.length {
            event = event.with_duration(length);
        }
        if let Some(listened) = entry.duration {
            event = event.with_listened_for(listened);
        }
        Ok(event)
    } else {
        let entry: FlatEntry = serde_json::from_value(entry)?;
        let mut event = PlayEvent::new(entry.artists, entry.title, timestamp(entry.time)?)?;
        if let Some(album) = entry.album {
            event = event.with_album(album);
        }
        if let Some(listened) = entry.duration {
            event = event.with_listened_for(listened);
        }
        Ok(event)
    }
}

fn timestamp(secs: i64) -> Result<chrono::DateTime<chrono::Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::invalid_input(format!("timestamp out of range: {}", secs)))
}
