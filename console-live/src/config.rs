//! Run configuration, read from the environment once at startup.

use crate::error::{AuthError, ConfigError};
use crate::frame::VideoFormat;
use crate::pipe::EncoderConfig;
use jiff::{SignedDuration, Timestamp};
use oauth2::{ClientId, ClientSecret, RefreshToken};
use std::str::FromStr;

/// Default ingestion base; the stream key is appended as the last path segment.
pub const DEFAULT_INGEST_URL: &str = "rtmp://a.rtmp.youtube.com/live2";

const DEFAULT_TITLE: &str = "Console Output Live Stream";
const DEFAULT_DESCRIPTION: &str = "Live streaming console output";
const DEFAULT_STATUS_TEXT: &str = "Your console output here";

/// The OAuth application the tool authenticates as.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
}

impl OAuthClientConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        Ok(Self {
            client_id: ClientId::new(required(lookup, "CLIENT_ID")?),
            client_secret: ClientSecret::new(required(lookup, "CLIENT_SECRET")?),
        })
    }
}

/// What the scheduled broadcast looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPlan {
    pub title: String,
    pub description: String,
    pub scheduled_start: Timestamp,
    pub scheduled_end: Timestamp,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub oauth: OAuthClientConfig,
    pub refresh_token: RefreshToken,
    pub broadcast: BroadcastPlan,
    pub video: VideoFormat,
    pub encoder: EncoderConfig,
    /// Ingestion base URL, without the stream key.
    pub ingest_url: String,
    pub status_text: String,
    pub frame_limit: Option<u64>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok(), Timestamp::now())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// `now` is the default scheduled start.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        now: Timestamp,
    ) -> Result<Self, ConfigError> {
        let oauth = OAuthClientConfig::from_lookup(&lookup)?;
        let refresh_token = RefreshToken::new(required(&lookup, "REFRESH_TOKEN")?);

        let scheduled_start = parsed(&lookup, "BROADCAST_START")?.unwrap_or(now);
        let scheduled_end = match parsed(&lookup, "BROADCAST_END")? {
            Some(end) => end,
            None => scheduled_start
                .checked_add(SignedDuration::from_hours(1))
                .map_err(|e| invalid("BROADCAST_START", scheduled_start.to_string(), e))?,
        };
        if scheduled_end <= scheduled_start {
            return Err(invalid(
                "BROADCAST_END",
                scheduled_end.to_string(),
                "must be after the scheduled start",
            ));
        }
        let broadcast = BroadcastPlan {
            title: lookup("BROADCAST_TITLE").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            description: lookup("BROADCAST_DESCRIPTION")
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            scheduled_start,
            scheduled_end,
        };

        let defaults = VideoFormat::default();
        let video = VideoFormat {
            width: dimension(&lookup, "VIDEO_WIDTH", defaults.width)?,
            height: dimension(&lookup, "VIDEO_HEIGHT", defaults.height)?,
            fps: parsed(&lookup, "VIDEO_FPS")?.unwrap_or(defaults.fps),
        };
        if video.fps == 0 {
            return Err(invalid("VIDEO_FPS", "0".to_string(), "must be non-zero"));
        }

        let mut encoder = EncoderConfig::default();
        if let Some(program) = lookup("FFMPEG_BIN") {
            encoder.program = program;
        }

        Ok(Self {
            oauth,
            refresh_token,
            broadcast,
            video,
            encoder,
            ingest_url: lookup("INGEST_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_INGEST_URL.to_string()),
            status_text: lookup("STATUS_TEXT").unwrap_or_else(|| DEFAULT_STATUS_TEXT.to_string()),
            frame_limit: parsed(&lookup, "FRAME_LIMIT")?,
        })
    }

    /// The full publish URL for a stream key.
    pub fn destination(&self, stream_key: &str) -> String {
        format!("{}/{}", self.ingest_url, stream_key)
    }
}

/// Reads `var`, falling back to the `GOOGLE_`-prefixed name.
fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<String, AuthError> {
    let set = |name: &str| lookup(name).filter(|v| !v.is_empty());
    set(var)
        .or_else(|| set(&format!("GOOGLE_{var}")))
        .ok_or(AuthError::MissingVariable(var))
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse() {
        Ok(v) => Ok(Some(v)),
        Err(e) => Err(invalid(var, value, e)),
    }
}

/// Frame dimensions must be non-zero and even for 4:2:0 output.
fn dimension(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    let v = parsed(lookup, var)?.unwrap_or(default);
    if v == 0 || v % 2 != 0 {
        return Err(invalid(var, v.to_string(), "must be a positive even number"));
    }
    Ok(v)
}

fn invalid(var: &'static str, value: String, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        reason: reason.to_string(),
    }
}
