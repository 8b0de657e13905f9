// # Play Events
//
// A `PlayEvent` is the normalized, source-independent record of one listen.
// Source adapters construct them; the delivery core only reads them.
//
// ## Invariants
//
// - at least one artist, every artist name non-blank
// - non-blank title
// - immutable after construction (fields are private, no setters)
//
// ## Wire Shape
//
// ```json
// {
//   "artists": ["Artist A", "Artist B"],
//   "albumArtists": [],
//   "title": "Track",
//   "album": "Album",
//   "duration": 215,
//   "listenedFor": 180,
//   "playedAt": "2025-01-09T12:00:00Z",
//   "source": "jellyfin"
// }
// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single normalized listen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PlayEventData", into = "PlayEventData")]
pub struct PlayEvent {
    artists: Vec<String>,
    album_artists: Vec<String>,
    title: String,
    album: Option<String>,
    duration_secs: Option<u32>,
    listened_secs: Option<u32>,
    played_at: DateTime<Utc>,
    source: Option<String>,
}

impl PlayEvent {
    /// Create a new play event
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `artists` is empty, any artist name is
    /// blank, or `title` is blank.
    pub fn new<I, S>(artists: I, title: impl Into<String>, played_at: DateTime<Utc>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let artists: Vec<String> = artists.into_iter().map(Into::into).collect();
        let title = title.into();

        if artists.is_empty() {
            return Err(Error::invalid_input("play must have at least one artist"));
        }
        if artists.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::invalid_input("artist names cannot be blank"));
        }
        if title.trim().is_empty() {
            return Err(Error::invalid_input("play title cannot be blank"));
        }

        Ok(Self {
            artists,
            album_artists: Vec::new(),
            title,
            album: None,
            duration_secs: None,
            listened_secs: None,
            played_at,
            source: None,
        })
    }

    /// Set the album name
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        let album = album.into();
        self.album = (!album.trim().is_empty()).then_some(album);
        self
    }

    /// Set the album artists (blank names are dropped)
    pub fn with_album_artists<I, S>(mut self, album_artists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.album_artists = album_artists
            .into_iter()
            .map(Into::into)
            .filter(|a: &String| !a.trim().is_empty())
            .collect();
        self
    }

    /// Set the track length in seconds
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Set how long the track was actually listened to, in seconds
    pub fn with_listened_for(mut self, secs: u32) -> Self {
        self.listened_secs = Some(secs);
        self
    }

    /// Label the source that observed this play
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Artist names, in credit order (never empty)
    pub fn artists(&self) -> &[String] {
        &self.artists
    }

    /// Album artist names (may be empty)
    pub fn album_artists(&self) -> &[String] {
        &self.album_artists
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn album(&self) -> Option<&str> {
        self.album.as_deref()
    }

    /// Track length in seconds
    pub fn duration_secs(&self) -> Option<u32> {
        self.duration_secs
    }

    /// Seconds actually listened
    pub fn listened_secs(&self) -> Option<u32> {
        self.listened_secs
    }

    /// When the play happened
    pub fn played_at(&self) -> DateTime<Utc> {
        self.played_at
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Short human-readable label for logs: `Artist A, Artist B - Title`
    pub fn display_label(&self) -> String {
        format!("{} - {}", self.artists.join(", "), self.title)
    }
}

/// One play or an ordered sequence of plays, as accepted by dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayBatch(Vec<PlayEvent>);

impl PlayBatch {
    pub fn into_vec(self) -> Vec<PlayEvent> {
        self.0
    }
}

impl From<PlayEvent> for PlayBatch {
    fn from(event: PlayEvent) -> Self {
        Self(vec![event])
    }
}

impl From<Vec<PlayEvent>> for PlayBatch {
    fn from(events: Vec<PlayEvent>) -> Self {
        Self(events)
    }
}

impl<const N: usize> From<[PlayEvent; N]> for PlayBatch {
    fn from(events: [PlayEvent; N]) -> Self {
        Self(events.into())
    }
}

impl FromIterator<PlayEvent> for PlayBatch {
    fn from_iter<I: IntoIterator<Item = PlayEvent>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Serializable form of [`PlayEvent`], validated on conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayEventData {
    artists: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    album_artists: Vec<String>,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    listened_for: Option<u32>,
    played_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl TryFrom<PlayEventData> for PlayEvent {
    type Error = Error;

    fn try_from(data: PlayEventData) -> Result<Self> {
        let mut event = PlayEvent::new(data.artists, data.title, data.played_at)?
            .with_album_artists(data.album_artists);
        if let Some(album) = data.album {
            event = event.with_album(album);
        }
        event.duration_secs = data.duration;
        event.listened_secs = data.listened_for;
        event.source = data.source;
        Ok(event)
    }
}

impl From<PlayEvent> for PlayEventData {
    fn from(event: PlayEvent) -> Self {
        Self {
            artists: event.artists,
            album_artists: event.album_artists,
            title: event.title,
            album: event.album,
            duration: event.duration_secs,
            listened_for: event.listened_secs,
            played_at: event.played_at,
            source: event.source,
        }
    }
}
