//! YouTube Live Streams API types.
//!
//! A stream is the technical side of a broadcast: the ingestion endpoint, the stream key, and the
//! resolution and frame rate the encoder promises to send.

use crate::frame::VideoFormat;
use serde::{Deserialize, Serialize};

/// A `liveStream` resource.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#resource>
#[derive(Debug, Serialize, Deserialize)]
pub struct LiveStream {
    /// The ID that YouTube assigns to uniquely identify the stream.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<LiveStreamSnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn: Option<CdnSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LiveStreamStatus>,
}

impl LiveStream {
    /// The stream key the encoder has to publish under.
    pub fn stream_name(&self) -> Option<&str> {
        Some(self.cdn.as_ref()?.ingestion_info.as_ref()?.stream_name.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LiveStreamSnippet {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#cdn>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnSettings {
    pub ingestion_type: IngestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_info: Option<IngestionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IngestionType {
    Rtmp,
    Dash,
    Webrtc,
    Hls,
}

/// Where and under which key the encoder publishes.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#cdn.ingestionInfo>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionInfo {
    /// The stream key. Secret: anyone holding it can publish to the broadcast.
    pub stream_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_ingestion_address: Option<String>,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#status.streamStatus>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamStatus {
    /// The stream is receiving data.
    Active,
    /// The stream exists but lacks valid CDN settings.
    Created,
    /// An error condition exists on the stream.
    Error,
    /// The stream is not receiving data.
    Inactive,
    /// The stream has valid CDN settings.
    Ready,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamStatus {
    pub stream_status: StreamStatus,
}

/// Request body for `liveStreams.insert`.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams/insert>
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamInsertRequest {
    pub snippet: LiveStreamSnippet,
    pub cdn: InsertCdnSettings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertCdnSettings {
    pub ingestion_type: IngestionType,
    pub resolution: &'static str,
    pub frame_rate: &'static str,
}

impl LiveStreamInsertRequest {
    /// An RTMP stream declared with the resolution and rate the encoder is launched with.
    pub fn rtmp(title: &str, format: VideoFormat) -> Self {
        Self {
            snippet: LiveStreamSnippet {
                title: title.to_string(),
                description: None,
            },
            cdn: InsertCdnSettings {
                ingestion_type: IngestionType::Rtmp,
                resolution: cdn_resolution(format.height),
                frame_rate: cdn_frame_rate(format.fps),
            },
        }
    }
}

/// YouTube only knows a fixed set of resolutions; anything else is `variable`.
fn cdn_resolution(height: u32) -> &'static str {
    match height {
        240 => "240p",
        360 => "360p",
        480 => "480p",
        720 => "720p",
        1080 => "1080p",
        1440 => "1440p",
        2160 => "2160p",
        _ => "variable",
    }
}

fn cdn_frame_rate(fps: u32) -> &'static str {
    match fps {
        30 => "30fps",
        60 => "60fps",
        _ => "variable",
    }
}
