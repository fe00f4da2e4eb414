//! Streams a rendered status screen to a freshly created YouTube live broadcast.
//!
//! A run authenticates with a stored refresh token ([`oauth`]), schedules an unlisted broadcast
//! and looks up its stream key ([`youtube_api`]), then renders frames ([`source`]) and pipes them
//! into an encoder process ([`pipe`]) at a fixed rate ([`driver`]).

use crate::config::BroadcastPlan;
use crate::youtube_api::YouTubeClient;
use std::fmt;

pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod oauth;
pub mod pipe;
pub mod source;
pub mod youtube_api;

pub use config::Config;
pub use driver::{DriverLoop, DriverState, RunSummary, run_pipeline};
pub use error::{ApiError, AuthError, ConfigError, LaunchError, StreamError, WriteError};
pub use frame::{Frame, Rgb, VideoFormat};
pub use pipe::{DeliveryPipe, EncoderConfig, FrameSink};
pub use source::{FrameSource, StatusSource, TextStyle};

/// The broadcast a run publishes to. Created once at startup and never changed.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamSession {
    pub broadcast_id: String,
    pub chat_id: String,
    /// Secret; see [`StreamSession`]'s `Debug` impl.
    pub stream_key: String,
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("broadcast_id", &self.broadcast_id)
            .field("chat_id", &self.chat_id)
            .field("stream_key", &"<redacted>")
            .finish()
    }
}

/// Creates the broadcast, gives it a stream to take video from and reads back the stream key.
///
/// If this fails after the broadcast was created, the [`StreamError::StreamKey`] carries the
/// broadcast id so the caller can still tear it down.
pub async fn open_session(
    yt: &YouTubeClient,
    plan: &BroadcastPlan,
    format: VideoFormat,
) -> Result<StreamSession, StreamError> {
    let (broadcast_id, chat_id) = yt
        .create_broadcast(
            &plan.title,
            &plan.description,
            plan.scheduled_start,
            plan.scheduled_end,
        )
        .await
        .map_err(StreamError::CreateBroadcast)?;

    let stream_key = async {
        yt.ensure_bound_stream(&broadcast_id, &plan.title, format)
            .await?;
        yt.get_stream_key(&broadcast_id).await
    }
    .await;

    match stream_key {
        Ok(stream_key) => Ok(StreamSession {
            broadcast_id,
            chat_id,
            stream_key,
        }),
        Err(source) => Err(StreamError::StreamKey {
            broadcast_id,
            source,
        }),
    }
}
