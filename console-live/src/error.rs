//! Error types for each stage of a streaming run.
//!
//! Every error here is fatal to the run. Nothing is retried; the binary reports the stage that
//! failed and exits with a non-zero status.

use std::process::ExitStatus;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The credential exchange failed, or could not be attempted at all.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A required credential variable is absent from the environment.
    #[error("environment variable {0} is not set")]
    MissingVariable(&'static str),

    /// Google rejected the refresh token (`invalid_grant`).
    #[error("refresh token was rejected by the token endpoint")]
    Rejected,

    /// A hardcoded OAuth endpoint or the local redirect URL is malformed.
    #[error("invalid OAuth endpoint {url}")]
    Endpoint {
        url: String,
        #[source]
        source: oauth2::url::ParseError,
    },

    /// The token request failed for any other reason.
    #[error("token exchange failed")]
    Exchange(#[source] BoxError),

    /// The interactive browser flow failed before a code could be exchanged.
    #[error("interactive authorization failed: {0}")]
    Interactive(String),
}

/// A YouTube Data API call failed.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The access token could not be refreshed before the request.
    #[error("could not refresh access token")]
    Auth(#[from] AuthError),

    #[error("send {method} request to {url}")]
    Transport {
        method: http::Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("YouTube API {method} {url} failed with status {status}: {body}")]
    Status {
        method: http::Method,
        url: String,
        status: http::StatusCode,
        body: String,
    },

    #[error("parse {what} response")]
    Decode {
        what: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{resource} {id} has no {field}")]
    MissingField {
        resource: &'static str,
        id: String,
        field: &'static str,
    },
}

/// The encoder process could not be started.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("spawn encoder {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder stdin was not captured")]
    NoStdin,
}

/// A frame could not be handed to the encoder.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The pipe was already stopped.
    #[error("encoder input is closed")]
    Closed,

    /// The encoder process is no longer running.
    #[error("encoder exited with {0}")]
    Exited(ExitStatus),

    /// The frame does not have the byte length declared to the encoder at launch.
    #[error("frame is {actual} bytes but the encoder expects {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("write to encoder stdin")]
    Io(#[source] std::io::Error),
}

/// A configuration value is present but unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Top-level failure of a run, tagged with the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("configuration failed")]
    Config(#[source] ConfigError),

    #[error("authentication failed")]
    Auth(#[from] AuthError),

    #[error("broadcast creation failed")]
    CreateBroadcast(#[source] ApiError),

    /// The broadcast exists at this point and should be torn down.
    #[error("stream key retrieval failed for broadcast {broadcast_id}")]
    StreamKey {
        broadcast_id: String,
        #[source]
        source: ApiError,
    },

    #[error("encoder launch failed")]
    Launch(#[from] LaunchError),

    #[error("frame write failed")]
    Write(#[from] WriteError),
}

/// Missing credentials are reported as an authentication failure, not a configuration one.
impl From<ConfigError> for StreamError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Auth(e) => Self::Auth(e),
            e => Self::Config(e),
        }
    }
}
