//! The slice of the YouTube Data API v3 needed to run a broadcast.
//!
//! # Broadcasts vs Streams
//!
//! YouTube splits a live event into two resources:
//!
//! - [`broadcasts::LiveBroadcast`] is what viewers see: title, schedule, privacy, live chat.
//! - [`streams::LiveStream`] is where video enters: ingestion address and stream key.
//!
//! A broadcast shows nothing until it is bound to a stream. A run therefore:
//!
//! 1. creates an unlisted broadcast ([`YouTubeClient::create_broadcast`]),
//! 2. makes sure it has a stream bound ([`YouTubeClient::ensure_bound_stream`]),
//! 3. reads the stream key the encoder publishes under ([`YouTubeClient::get_stream_key`]),
//! 4. ends the broadcast when the encoder stops ([`YouTubeClient::end_broadcast`]).

pub mod broadcasts;
pub mod client;
pub mod streams;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{Teardown, YouTubeClient};
pub use types::{ListResponse, PageInfo};

pub use broadcasts::{
    BroadcastLifeCycleStatus, BroadcastPrivacyStatus, BroadcastStatus, LiveBroadcast,
    LiveBroadcastInsertRequest, LiveBroadcastSnippet, LiveBroadcastStatus,
};

pub use streams::{LiveStream, LiveStreamInsertRequest, LiveStreamSnippet, StreamStatus};
