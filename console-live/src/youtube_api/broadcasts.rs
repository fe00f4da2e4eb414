//! YouTube Live Broadcasts API types.
//!
//! A broadcast is the viewer-facing event: title, description, schedule, privacy and the live
//! chat. It carries no video itself; it has to be bound to a [`super::streams::LiveStream`] whose
//! ingestion point the encoder publishes to.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `liveBroadcast` resource.
///
/// Which of the optional parts are present depends on the `part` parameter of the request.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#resource>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcast {
    /// The ID that YouTube assigns to uniquely identify the broadcast.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<LiveBroadcastSnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LiveBroadcastStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_details: Option<LiveBroadcastContentDetails>,
}

impl LiveBroadcast {
    pub fn live_chat_id(&self) -> Option<&str> {
        self.snippet.as_ref()?.live_chat_id.as_deref()
    }

    pub fn bound_stream_id(&self) -> Option<&str> {
        self.content_details.as_ref()?.bound_stream_id.as_deref()
    }

    pub fn life_cycle_status(&self) -> Option<BroadcastLifeCycleStatus> {
        self.status.as_ref().map(|s| s.life_cycle_status)
    }
}

/// Basic details about the broadcast.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#snippet>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcastSnippet {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start_time: Option<Timestamp>,
    /// Unset means the broadcast is scheduled to continue indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_end_time: Option<Timestamp>,
    /// Only set once the broadcast has a chat, which it normally gets at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_chat_id: Option<String>,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#status>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcastStatus {
    pub life_cycle_status: BroadcastLifeCycleStatus,
    pub privacy_status: BroadcastPrivacyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub made_for_kids: Option<bool>,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#contentDetails>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcastContentDetails {
    /// The stream this broadcast takes its video from, once bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_stream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_auto_start: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_auto_stop: Option<bool>,
}

/// The broadcast's current lifecycle status.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#status.lifeCycleStatus>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastLifeCycleStatus {
    /// The broadcast was created but its settings are incomplete.
    Created,
    /// The broadcast is ready to be activated but has not yet been activated.
    Ready,
    /// The broadcast is transitioning to testing.
    TestStarting,
    /// The broadcast is in testing mode and only visible to the owner.
    Testing,
    /// The broadcast is transitioning to live.
    LiveStarting,
    /// The broadcast is active and visible to anyone who has access to the URL.
    Live,
    /// The broadcast has finished and is no longer live.
    Complete,
    /// The broadcast has been revoked and can no longer be activated.
    Revoked,
}

impl BroadcastLifeCycleStatus {
    /// Whether video has started flowing to viewers (or the owner, when testing).
    pub fn has_started(self) -> bool {
        matches!(
            self,
            Self::TestStarting | Self::Testing | Self::LiveStarting | Self::Live
        )
    }
}

impl fmt::Display for BroadcastLifeCycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Ready => write!(f, "ready"),
            Self::TestStarting => write!(f, "testStarting"),
            Self::Testing => write!(f, "testing"),
            Self::LiveStarting => write!(f, "liveStarting"),
            Self::Live => write!(f, "live"),
            Self::Complete => write!(f, "complete"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#status.privacyStatus>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastPrivacyStatus {
    Public,
    /// Only viewable by people with the link.
    Unlisted,
    Private,
}

/// Target states for `liveBroadcasts.transition`.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/transition>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastStatus {
    Complete,
}

impl fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Request body for `liveBroadcasts.insert`.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/insert>
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcastInsertRequest {
    pub snippet: InsertBroadcastSnippet,
    pub status: InsertBroadcastStatus,
    pub content_details: InsertBroadcastContentDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertBroadcastSnippet {
    pub title: String,
    pub description: String,
    pub scheduled_start_time: Timestamp,
    pub scheduled_end_time: Timestamp,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertBroadcastStatus {
    pub privacy_status: BroadcastPrivacyStatus,
    pub self_declared_made_for_kids: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertBroadcastContentDetails {
    /// Go live as soon as the bound stream starts receiving data.
    pub enable_auto_start: bool,
    /// Complete the broadcast once the stream stops.
    pub enable_auto_stop: bool,
}

impl LiveBroadcastInsertRequest {
    /// An unlisted broadcast that starts and stops itself with the encoder.
    pub fn new(
        title: &str,
        description: &str,
        scheduled_start: Timestamp,
        scheduled_end: Timestamp,
    ) -> Self {
        Self {
            snippet: InsertBroadcastSnippet {
                title: title.to_string(),
                description: description.to_string(),
                scheduled_start_time: scheduled_start,
                scheduled_end_time: scheduled_end,
            },
            status: InsertBroadcastStatus {
                privacy_status: BroadcastPrivacyStatus::Unlisted,
                self_declared_made_for_kids: false,
            },
            content_details: InsertBroadcastContentDetails {
                enable_auto_start: true,
                enable_auto_stop: true,
            },
        }
    }
}
