//! Socket message model and wire codec.
//!
//! Outbound frames are user actions wrapped as `{"command": tag, "data": payload}`.
//! Inbound frames are either the keep-alive literal `-` or a JSON object of
//! the same shape, dispatched on `command` through a fixed tag table. Tags
//! outside the table are ignored so the server can add notification types
//! without breaking older clients.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use uw_core::constants::KEEPALIVE_FRAME;
use uw_core::error::UwError;

/// Wire tags for every command and event this client understands.
pub mod tags {
    // Outbound
    pub const SEND_CHAT: &str = "sendChat";
    /// Shared by the outbound vote command and the inbound vote notification.
    pub const VOTE: &str = "vote";

    // Inbound
    pub const CHAT_MESSAGE: &str = "chatMessage";
    pub const CHAT_DELETE: &str = "chatDelete";
    pub const CHAT_DELETE_BY_ID: &str = "chatDeleteByID";
    pub const CHAT_DELETE_BY_USER: &str = "chatDeleteByUser";
    pub const LEAVE: &str = "leave";
    pub const NAME_CHANGE: &str = "nameChange";
    pub const FAVORITE: &str = "favorite";
    pub const PLAYLIST_CYCLE: &str = "playlistCycle";
    pub const WAITLIST_JOIN: &str = "waitlistJoin";
    pub const WAITLIST_LEAVE: &str = "waitlistLeave";
    pub const WAITLIST_ADD: &str = "waitlistAdd";
    pub const WAITLIST_REMOVE: &str = "waitlistRemove";
    pub const WAITLIST_UPDATE: &str = "waitlistUpdate";
    pub const WAITLIST_LOCK: &str = "waitlistLock";
    pub const WAITLIST_CLEAR: &str = "waitlistClear";
    pub const ADVANCE: &str = "advance";

    /// Every inbound tag in the dispatch table.
    pub const INBOUND: &[&str] = &[
        CHAT_MESSAGE,
        CHAT_DELETE,
        CHAT_DELETE_BY_ID,
        CHAT_DELETE_BY_USER,
        LEAVE,
        NAME_CHANGE,
        VOTE,
        FAVORITE,
        PLAYLIST_CYCLE,
        WAITLIST_JOIN,
        WAITLIST_LEAVE,
        WAITLIST_ADD,
        WAITLIST_REMOVE,
        WAITLIST_UPDATE,
        WAITLIST_LOCK,
        WAITLIST_CLEAR,
        ADVANCE,
    ];
}

// ---- Outbound ----

/// A user action sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Up- or downvote the current track (`vote`). The server expects 1 or -1.
    Vote(i32),
    /// Post a chat message (`sendChat`).
    ChatSend(String),
}

impl OutboundCommand {
    /// Build a vote command.
    pub fn vote(value: i32) -> Self {
        Self::Vote(value)
    }

    /// Build a chat command.
    pub fn chat(message: impl Into<String>) -> Self {
        Self::ChatSend(message.into())
    }

    /// The wire tag of this command.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Vote(_) => tags::VOTE,
            Self::ChatSend(_) => tags::SEND_CHAT,
        }
    }

    /// The `data` payload, or `None` for commands without one.
    fn payload(&self) -> Option<Value> {
        match self {
            Self::Vote(value) => Some(Value::from(*value)),
            Self::ChatSend(message) => Some(Value::from(message.as_str())),
        }
    }
}

/// Encode a command as a wire frame.
pub fn encode(command: &OutboundCommand) -> String {
    let mut frame = Map::new();
    frame.insert("command".into(), Value::from(command.tag()));
    if let Some(data) = command.payload() {
        frame.insert("data".into(), data);
    }
    Value::Object(frame).to_string()
}

// ---- Inbound ----

/// A server notification decoded from an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundEvent {
    /// A chat message was posted (`chatMessage`).
    ChatPosted {
        id: String,
        user_id: String,
        message: String,
        /// Milliseconds since the Unix epoch.
        timestamp: i64,
    },
    /// All chat messages were deleted (`chatDelete`).
    ChatClearedAll,
    /// One chat message was deleted (`chatDeleteByID`).
    ChatClearedOne { id: String },
    /// All chat messages by one user were deleted (`chatDeleteByUser`).
    ChatClearedByUser { user_id: String },
    /// A user left the room (`leave`).
    UserLeft { user_id: String },
    /// A user changed their name (`nameChange`).
    UserRenamed { user_id: String, username: String },
    /// A user voted on the current track (`vote`).
    VoteCast { user_id: String, value: i32 },
    /// A user added the current track to a playlist (`favorite`).
    Favorited { user_id: String, history_id: String },
    /// The active playlist rotated its first item to the end (`playlistCycle`).
    PlaylistCycled { playlist_id: String },
    /// A user joined the waitlist (`waitlistJoin`).
    WaitlistJoined { user_id: String, waitlist: Vec<String> },
    /// A user left the waitlist (`waitlistLeave`).
    WaitlistLeft { user_id: String, waitlist: Vec<String> },
    /// A moderator added a user to the waitlist (`waitlistAdd`).
    WaitlistAdded { user_id: String, waitlist: Vec<String> },
    /// A moderator removed a user from the waitlist (`waitlistRemove`).
    WaitlistRemoved { user_id: String, waitlist: Vec<String> },
    /// The waitlist was reordered or replaced (`waitlistUpdate`).
    WaitlistUpdated { waitlist: Vec<String> },
    /// The waitlist was locked or unlocked (`waitlistLock`).
    WaitlistLocked { locked: bool },
    /// The waitlist was emptied (`waitlistClear`).
    WaitlistCleared,
    /// The booth advanced (`advance`). `None` when nothing is playing anymore.
    Advanced { entry: Option<PlaybackEntry> },
}

/// The track that starts playing after an advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEntry {
    pub history_id: Option<String>,
    /// The DJ playing this entry.
    pub user_id: Option<String>,
    pub artist: String,
    pub title: String,
    /// Playback start offset into the media, in seconds.
    pub start: i64,
    /// Playback end offset into the media, in seconds.
    pub end: Option<i64>,
    /// Media source, e.g. "youtube" or "soundcloud".
    pub source_type: String,
    pub source_id: String,
    /// Milliseconds since the Unix epoch.
    pub played_at: Option<i64>,
}

impl InboundEvent {
    /// The wire tag this event was decoded from.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ChatPosted { .. } => tags::CHAT_MESSAGE,
            Self::ChatClearedAll => tags::CHAT_DELETE,
            Self::ChatClearedOne { .. } => tags::CHAT_DELETE_BY_ID,
            Self::ChatClearedByUser { .. } => tags::CHAT_DELETE_BY_USER,
            Self::UserLeft { .. } => tags::LEAVE,
            Self::UserRenamed { .. } => tags::NAME_CHANGE,
            Self::VoteCast { .. } => tags::VOTE,
            Self::Favorited { .. } => tags::FAVORITE,
            Self::PlaylistCycled { .. } => tags::PLAYLIST_CYCLE,
            Self::WaitlistJoined { .. } => tags::WAITLIST_JOIN,
            Self::WaitlistLeft { .. } => tags::WAITLIST_LEAVE,
            Self::WaitlistAdded { .. } => tags::WAITLIST_ADD,
            Self::WaitlistRemoved { .. } => tags::WAITLIST_REMOVE,
            Self::WaitlistUpdated { .. } => tags::WAITLIST_UPDATE,
            Self::WaitlistLocked { .. } => tags::WAITLIST_LOCK,
            Self::WaitlistCleared => tags::WAITLIST_CLEAR,
            Self::Advanced { .. } => tags::ADVANCE,
        }
    }

    /// Whether this event changes the chat log.
    pub fn is_chat_event(&self) -> bool {
        matches!(
            self,
            Self::ChatPosted { .. }
                | Self::ChatClearedAll
                | Self::ChatClearedOne { .. }
                | Self::ChatClearedByUser { .. }
        )
    }

    /// Whether this event changes the waitlist.
    pub fn is_waitlist_event(&self) -> bool {
        matches!(
            self,
            Self::WaitlistJoined { .. }
                | Self::WaitlistLeft { .. }
                | Self::WaitlistAdded { .. }
                | Self::WaitlistRemoved { .. }
                | Self::WaitlistUpdated { .. }
                | Self::WaitlistLocked { .. }
                | Self::WaitlistCleared
        )
    }

    /// The user this event is about, if any.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::ChatPosted { user_id, .. }
            | Self::ChatClearedByUser { user_id }
            | Self::UserLeft { user_id }
            | Self::UserRenamed { user_id, .. }
            | Self::VoteCast { user_id, .. }
            | Self::Favorited { user_id, .. }
            | Self::WaitlistJoined { user_id, .. }
            | Self::WaitlistLeft { user_id, .. }
            | Self::WaitlistAdded { user_id, .. }
            | Self::WaitlistRemoved { user_id, .. } => Some(user_id),
            Self::Advanced { entry } => entry.as_ref().and_then(|e| e.user_id.as_deref()),
            _ => None,
        }
    }

    /// When a chat message was posted.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ChatPosted { timestamp, .. } => Utc.timestamp_millis_opt(*timestamp).single(),
            _ => None,
        }
    }
}

/// A frame that could not be turned into an event.
///
/// Decode failures are local to one frame: the connection reports them and
/// keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, not an object, or no string `command` field.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A known tag arrived without the `data` payload it requires.
    #[error("`{0}` frame has no data payload")]
    MissingPayload(String),

    /// A known tag's payload is missing fields or has the wrong types.
    #[error("invalid `{command}` payload: {reason}")]
    InvalidPayload { command: String, reason: String },
}

impl From<DecodeError> for UwError {
    fn from(e: DecodeError) -> Self {
        UwError::Decode(e.to_string())
    }
}

/// Decode one inbound frame.
///
/// Returns `Ok(None)` for the keep-alive frame and for unknown tags.
pub fn decode(frame: &str) -> Result<Option<InboundEvent>, DecodeError> {
    if frame == KEEPALIVE_FRAME {
        return Ok(None);
    }

    // Parse as an object first; a struct would also accept a JSON array.
    let object: Map<String, Value> =
        serde_json::from_str(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let raw = RawFrame::deserialize(Value::Object(object))
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    decode_command(&raw.command, raw.data)
}

/// Envelope shared by every inbound frame. `data: null` counts as absent.
#[derive(Deserialize)]
struct RawFrame {
    command: String,
    #[serde(default)]
    data: Option<Value>,
}

fn decode_command(command: &str, data: Option<Value>) -> Result<Option<InboundEvent>, DecodeError> {
    let event = match command {
        tags::CHAT_MESSAGE => {
            let p: ChatMessagePayload = payload(command, data)?;
            InboundEvent::ChatPosted {
                id: p.id,
                user_id: p.user_id,
                message: p.message,
                timestamp: p.timestamp,
            }
        }
        tags::CHAT_DELETE => InboundEvent::ChatClearedAll,
        tags::CHAT_DELETE_BY_ID => {
            let p: MessageRef = payload(command, data)?;
            InboundEvent::ChatClearedOne { id: p.id }
        }
        tags::CHAT_DELETE_BY_USER => {
            let p: UserRef = payload(command, data)?;
            InboundEvent::ChatClearedByUser { user_id: p.user_id }
        }
        tags::LEAVE => {
            let p: UserRef = payload(command, data)?;
            InboundEvent::UserLeft { user_id: p.user_id }
        }
        tags::NAME_CHANGE => {
            let p: NameChangePayload = payload(command, data)?;
            InboundEvent::UserRenamed {
                user_id: p.user_id,
                username: p.username,
            }
        }
        tags::VOTE => {
            let p: VotePayload = payload(command, data)?;
            InboundEvent::VoteCast {
                user_id: p.user_id,
                value: p.value,
            }
        }
        tags::FAVORITE => {
            let p: FavoritePayload = payload(command, data)?;
            InboundEvent::Favorited {
                user_id: p.user_id,
                history_id: p.history_id,
            }
        }
        tags::PLAYLIST_CYCLE => {
            let p: PlaylistCyclePayload = payload(command, data)?;
            InboundEvent::PlaylistCycled {
                playlist_id: p.playlist_id,
            }
        }
        tags::WAITLIST_JOIN => {
            let p: WaitlistChangePayload = payload(command, data)?;
            InboundEvent::WaitlistJoined {
                user_id: p.user_id,
                waitlist: p.waitlist,
            }
        }
        tags::WAITLIST_LEAVE => {
            let p: WaitlistChangePayload = payload(command, data)?;
            InboundEvent::WaitlistLeft {
                user_id: p.user_id,
                waitlist: p.waitlist,
            }
        }
        tags::WAITLIST_ADD => {
            let p: WaitlistChangePayload = payload(command, data)?;
            InboundEvent::WaitlistAdded {
                user_id: p.user_id,
                waitlist: p.waitlist,
            }
        }
        tags::WAITLIST_REMOVE => {
            let p: WaitlistChangePayload = payload(command, data)?;
            InboundEvent::WaitlistRemoved {
                user_id: p.user_id,
                waitlist: p.waitlist,
            }
        }
        tags::WAITLIST_UPDATE => {
            let waitlist = match payload(command, data)? {
                WaitlistUpdatePayload::Wrapped { waitlist } => waitlist,
                WaitlistUpdatePayload::Bare(waitlist) => waitlist,
            };
            InboundEvent::WaitlistUpdated { waitlist }
        }
        tags::WAITLIST_LOCK => {
            let p: WaitlistLockPayload = payload(command, data)?;
            InboundEvent::WaitlistLocked { locked: p.locked }
        }
        tags::WAITLIST_CLEAR => InboundEvent::WaitlistCleared,
        tags::ADVANCE => {
            let entry = match data {
                Some(data) => {
                    let p: AdvancePayload = payload(command, Some(data))?;
                    Some(p.into_entry())
                }
                None => None,
            };
            InboundEvent::Advanced { entry }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn payload<T: DeserializeOwned>(command: &str, data: Option<Value>) -> Result<T, DecodeError> {
    let data = data.ok_or_else(|| DecodeError::MissingPayload(command.to_string()))?;
    serde_json::from_value(data).map_err(|e| DecodeError::InvalidPayload {
        command: command.to_string(),
        reason: e.to_string(),
    })
}

// ---- Wire payload shapes ----

#[derive(Deserialize)]
struct ChatMessagePayload {
    id: String,
    #[serde(rename = "userID")]
    user_id: String,
    message: String,
    timestamp: i64,
}

#[derive(Deserialize)]
struct MessageRef {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct UserRef {
    #[serde(rename = "userID")]
    user_id: String,
}

#[derive(Deserialize)]
struct NameChangePayload {
    #[serde(rename = "userID")]
    user_id: String,
    username: String,
}

#[derive(Deserialize)]
struct VotePayload {
    #[serde(rename = "_id")]
    user_id: String,
    value: i32,
}

#[derive(Deserialize)]
struct FavoritePayload {
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(rename = "historyID")]
    history_id: String,
}

#[derive(Deserialize)]
struct PlaylistCyclePayload {
    #[serde(rename = "playlistID")]
    playlist_id: String,
}

#[derive(Deserialize)]
struct WaitlistChangePayload {
    #[serde(rename = "userID")]
    user_id: String,
    waitlist: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WaitlistUpdatePayload {
    Wrapped { waitlist: Vec<String> },
    Bare(Vec<String>),
}

#[derive(Deserialize)]
struct WaitlistLockPayload {
    locked: bool,
}

#[derive(Deserialize)]
struct AdvancePayload {
    #[serde(rename = "historyID")]
    history_id: Option<String>,
    #[serde(rename = "userID")]
    user_id: Option<String>,
    #[serde(rename = "playedAt")]
    played_at: Option<i64>,
    media: AdvanceEntryPayload,
}

#[derive(Deserialize)]
struct AdvanceEntryPayload {
    artist: String,
    title: String,
    #[serde(default)]
    start: i64,
    end: Option<i64>,
    media: MediaPayload,
}

#[derive(Deserialize)]
struct MediaPayload {
    #[serde(rename = "sourceType")]
    source_type: String,
    #[serde(rename = "sourceID")]
    source_id: String,
}

impl AdvancePayload {
    fn into_entry(self) -> PlaybackEntry {
        PlaybackEntry {
            history_id: self.history_id,
            user_id: self.user_id,
            artist: self.media.artist,
            title: self.media.title,
            start: self.media.start,
            end: self.media.end,
            source_type: self.media.media.source_type,
            source_id: self.media.media.source_id,
            played_at: self.played_at,
        }
    }
}
