//! Core YouTube API client functionality and authentication management.

use crate::error::ApiError;
use crate::frame::VideoFormat;
use crate::oauth::{Credential, OAuthManager};
use crate::youtube_api::{
    broadcasts::{
        BroadcastLifeCycleStatus, BroadcastStatus, LiveBroadcast, LiveBroadcastInsertRequest,
    },
    streams::{LiveStream, LiveStreamInsertRequest},
    types::ListResponse,
};
use http::Method;
use jiff::Timestamp;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Base URL of the YouTube Data API v3.
pub const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// What [`YouTubeClient::end_broadcast`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The broadcast had gone live and was transitioned to `complete`.
    Completed,
    /// The broadcast never went live and was deleted.
    Deleted,
    /// The broadcast was already over.
    AlreadyEnded,
}

/// Client for the parts of the YouTube Data API v3 needed to run a broadcast.
///
/// Every request carries the bearer credential. An expired credential is refreshed before the
/// request goes out, so calls made long after startup (such as teardown) still authenticate.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    token: Arc<Mutex<Credential>>,
    oauth_manager: Arc<OAuthManager>,
    client: reqwest::Client,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(
        credential: Credential,
        oauth_manager: Arc<OAuthManager>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            token: Arc::new(Mutex::new(credential)),
            oauth_manager,
            client,
            base_url: API_BASE.to_string(),
        }
    }

    /// Sends requests somewhere other than [`API_BASE`].
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Gets a guaranteed-fresh access token, refreshing if necessary.
    #[instrument(skip(self))]
    async fn fresh_access_token(&self) -> Result<String, ApiError> {
        let mut token = self.token.lock().await;
        if token.is_expired() {
            tracing::debug!("access token expired, attempting refresh");
            token.refresh(&self.oauth_manager).await?;
            tracing::debug!("access token successfully refreshed");
        }
        Ok(token.access_token().to_string())
    }

    /// Makes an authenticated request against `path` (relative to the base URL) and checks the
    /// response status.
    #[instrument(skip(self, json_body), level = "trace")]
    async fn make_authenticated_request(
        &self,
        method: Method,
        path: &str,
        query_params: &[(&str, &str)],
        json_body: Option<&impl Serialize>,
    ) -> Result<reqwest::Response, ApiError> {
        let access_token = self.fresh_access_token().await?;
        let url = format!("{}/{}", self.base_url, path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(query_params);
        if let Some(body) = json_body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                method: method.clone(),
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ApiError::Status {
                method,
                url,
                status,
                body,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query_params: &[(&str, &str)],
        what: &'static str,
    ) -> Result<T, ApiError> {
        let response = self
            .make_authenticated_request(Method::GET, path, query_params, None::<&()>)
            .await?;
        response
            .json()
            .await
            .map_err(|source| ApiError::Decode { what, source })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query_params: &[(&str, &str)],
        body: Option<&impl Serialize>,
        what: &'static str,
    ) -> Result<T, ApiError> {
        let response = self
            .make_authenticated_request(Method::POST, path, query_params, body)
            .await?;
        response
            .json()
            .await
            .map_err(|source| ApiError::Decode { what, source })
    }

    /// Schedules a new unlisted broadcast and returns its ID and live chat ID.
    ///
    /// The broadcast is created with auto-start and auto-stop enabled, so it goes live when the
    /// encoder starts publishing.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/insert>
    #[instrument(skip(self))]
    pub async fn create_broadcast(
        &self,
        title: &str,
        description: &str,
        scheduled_start: Timestamp,
        scheduled_end: Timestamp,
    ) -> Result<(String, String), ApiError> {
        let request =
            LiveBroadcastInsertRequest::new(title, description, scheduled_start, scheduled_end);
        let broadcast = self.insert_live_broadcast(&request).await?;
        let Some(chat_id) = broadcast.live_chat_id() else {
            return Err(ApiError::MissingField {
                resource: "broadcast",
                id: broadcast.id,
                field: "snippet.liveChatId",
            });
        };
        let chat_id = chat_id.to_string();
        tracing::info!(broadcast_id = %broadcast.id, %chat_id, "created broadcast");
        Ok((broadcast.id, chat_id))
    }

    pub async fn insert_live_broadcast(
        &self,
        request: &LiveBroadcastInsertRequest,
    ) -> Result<LiveBroadcast, ApiError> {
        self.post_json(
            "liveBroadcasts",
            &[("part", "id,snippet,status,contentDetails")],
            Some(request),
            "liveBroadcasts.insert",
        )
        .await
    }

    /// Gets a single broadcast by ID.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/list>
    #[instrument(skip(self))]
    pub async fn get_live_broadcast(&self, broadcast_id: &str) -> Result<LiveBroadcast, ApiError> {
        let response: ListResponse<LiveBroadcast> = self
            .get_json(
                "liveBroadcasts",
                &[("part", "id,snippet,status,contentDetails"), ("id", broadcast_id)],
                "liveBroadcasts.list",
            )
            .await?;
        response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound {
                resource: "broadcast",
                id: broadcast_id.to_string(),
            })
    }

    /// Creates a new ingestion stream.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams/insert>
    #[instrument(skip(self))]
    pub async fn insert_live_stream(
        &self,
        request: &LiveStreamInsertRequest,
    ) -> Result<LiveStream, ApiError> {
        let stream: LiveStream = self
            .post_json(
                "liveStreams",
                &[("part", "id,snippet,cdn,status")],
                Some(request),
                "liveStreams.insert",
            )
            .await?;
        tracing::debug!(stream_id = %stream.id, "created stream");
        Ok(stream)
    }

    /// Gets a single stream by ID, including its ingestion info.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams/list>
    #[instrument(skip(self))]
    pub async fn get_live_stream(&self, stream_id: &str) -> Result<LiveStream, ApiError> {
        let response: ListResponse<LiveStream> = self
            .get_json(
                "liveStreams",
                &[("part", "id,snippet,cdn,status"), ("id", stream_id)],
                "liveStreams.list",
            )
            .await?;
        response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound {
                resource: "stream",
                id: stream_id.to_string(),
            })
    }

    /// Binds a broadcast to the stream it should take video from.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/bind>
    #[instrument(skip(self))]
    pub async fn bind_live_broadcast(
        &self,
        broadcast_id: &str,
        stream_id: &str,
    ) -> Result<LiveBroadcast, ApiError> {
        let broadcast: LiveBroadcast = self
            .post_json(
                "liveBroadcasts/bind",
                &[
                    ("part", "id,contentDetails"),
                    ("id", broadcast_id),
                    ("streamId", stream_id),
                ],
                None::<&()>,
                "liveBroadcasts.bind",
            )
            .await?;
        tracing::debug!(broadcast_id, stream_id, "bound broadcast to stream");
        Ok(broadcast)
    }

    /// Makes sure the broadcast has a stream to receive video on, creating and binding an RTMP
    /// stream matching `format` if it does not. Returns the stream ID.
    #[instrument(skip(self))]
    pub async fn ensure_bound_stream(
        &self,
        broadcast_id: &str,
        title: &str,
        format: VideoFormat,
    ) -> Result<String, ApiError> {
        let broadcast = self.get_live_broadcast(broadcast_id).await?;
        if let Some(stream_id) = broadcast.bound_stream_id() {
            tracing::debug!(stream_id, "broadcast already has a stream");
            return Ok(stream_id.to_string());
        }

        let stream = self
            .insert_live_stream(&LiveStreamInsertRequest::rtmp(title, format))
            .await?;
        self.bind_live_broadcast(broadcast_id, &stream.id).await?;
        Ok(stream.id)
    }

    /// Returns the ingestion stream key of the stream bound to a broadcast.
    ///
    /// The key is a secret and is deliberately kept out of logs.
    #[instrument(skip(self))]
    pub async fn get_stream_key(&self, broadcast_id: &str) -> Result<String, ApiError> {
        let broadcast = self.get_live_broadcast(broadcast_id).await?;
        let Some(stream_id) = broadcast.bound_stream_id() else {
            return Err(ApiError::MissingField {
                resource: "broadcast",
                id: broadcast_id.to_string(),
                field: "contentDetails.boundStreamId",
            });
        };
        let stream = self.get_live_stream(stream_id).await?;
        match stream.stream_name() {
            Some(key) => Ok(key.to_string()),
            None => Err(ApiError::MissingField {
                resource: "stream",
                id: stream.id,
                field: "cdn.ingestionInfo.streamName",
            }),
        }
    }

    /// Changes the status of a broadcast.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/transition>
    #[instrument(skip(self))]
    pub async fn transition_live_broadcast(
        &self,
        broadcast_id: &str,
        status: BroadcastStatus,
    ) -> Result<LiveBroadcast, ApiError> {
        let status = status.to_string();
        self.post_json(
            "liveBroadcasts/transition",
            &[
                ("part", "id,status"),
                ("id", broadcast_id),
                ("broadcastStatus", status.as_str()),
            ],
            None::<&()>,
            "liveBroadcasts.transition",
        )
        .await
    }

    /// Deletes a broadcast.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/delete>
    #[instrument(skip(self))]
    pub async fn delete_live_broadcast(&self, broadcast_id: &str) -> Result<(), ApiError> {
        self.make_authenticated_request(
            Method::DELETE,
            "liveBroadcasts",
            &[("id", broadcast_id)],
            None::<&()>,
        )
        .await?;
        Ok(())
    }

    /// Ends a broadcast created by this run so it does not linger on the channel.
    ///
    /// A broadcast that went live is completed; one that never did is deleted.
    #[instrument(skip(self))]
    pub async fn end_broadcast(&self, broadcast_id: &str) -> Result<Teardown, ApiError> {
        let broadcast = self.get_live_broadcast(broadcast_id).await?;
        let teardown = match broadcast.life_cycle_status() {
            Some(BroadcastLifeCycleStatus::Complete | BroadcastLifeCycleStatus::Revoked) => {
                Teardown::AlreadyEnded
            }
            Some(status) if status.has_started() => {
                self.transition_live_broadcast(broadcast_id, BroadcastStatus::Complete)
                    .await?;
                Teardown::Completed
            }
            _ => {
                self.delete_live_broadcast(broadcast_id).await?;
                Teardown::Deleted
            }
        };
        tracing::info!(broadcast_id, ?teardown, "ended broadcast");
        Ok(teardown)
    }
}
