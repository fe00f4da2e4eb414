//! Delivery Pipe: the external encoder process and the raw frame stream written to its stdin.
//!
//! Frames go to the encoder as bare `rgb24` bytes with no header or framing. The encoder splits
//! the stream purely by the frame size it was told about at launch, so the launch arguments and
//! every frame written must come from the same [`VideoFormat`].

use crate::error::{LaunchError, WriteError};
use crate::frame::{Frame, VideoFormat};
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

/// Encoder executable and rate-control profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub program: String,
    pub video_bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub audio_sample_rate: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            video_bitrate_kbps: 2500,
            buffer_size_kbps: 5000,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44100,
        }
    }
}

impl EncoderConfig {
    /// ffmpeg arguments that read raw frames of `format` from stdin and publish FLV to
    /// `destination`.
    ///
    /// YouTube wants an audio track, so a silent one is generated alongside the video.
    pub fn args(&self, destination: &str, format: VideoFormat) -> Vec<String> {
        let video_bitrate = format!("{}k", self.video_bitrate_kbps);
        let mut args: Vec<String> = Vec::new();
        let mut push = |xs: &[&str]| args.extend(xs.iter().map(|s| s.to_string()));

        push(&["-y", "-loglevel", "error"]);
        // input 0: raw video on stdin
        push(&[
            "-f",
            "rawvideo",
            "-pixel_format",
            "rgb24",
            "-video_size",
            &format.video_size(),
            "-framerate",
            &format.fps.to_string(),
            "-i",
            "-",
        ]);
        // input 1: silence
        push(&[
            "-f",
            "lavfi",
            "-i",
            &format!(
                "anullsrc=channel_layout=stereo:sample_rate={}",
                self.audio_sample_rate
            ),
        ]);
        push(&[
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-tune",
            "zerolatency",
            "-b:v",
            &video_bitrate,
            "-maxrate",
            &video_bitrate,
            "-bufsize",
            &format!("{}k", self.buffer_size_kbps),
            "-pix_fmt",
            "yuv420p",
            "-g",
            &format.fps.to_string(),
        ]);
        push(&[
            "-c:a",
            "aac",
            "-b:a",
            &format!("{}k", self.audio_bitrate_kbps),
            "-ar",
            &self.audio_sample_rate.to_string(),
            "-ac",
            "2",
        ]);
        push(&["-shortest", "-f", "flv", destination]);
        args
    }
}

/// Anything the Driver Loop can hand frames to.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> impl Future<Output = Result<(), WriteError>> + Send;
}

/// Owns the encoder process. This is the only writer to its stdin.
///
/// Call [`DeliveryPipe::stop`] on every exit path to close stdin and reap the process. If the
/// pipe is dropped without being stopped, the process is killed.
#[derive(Debug)]
pub struct DeliveryPipe {
    child: Child,
    stdin: Option<ChildStdin>,
    format: VideoFormat,
    exit: Option<ExitStatus>,
}

impl DeliveryPipe {
    /// Launches the encoder configured by `encoder`, publishing to `destination`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        encoder: &EncoderConfig,
        destination: &str,
        format: VideoFormat,
    ) -> Result<Self, LaunchError> {
        let mut cmd = Command::new(&encoder.program);
        cmd.args(encoder.args(destination, format));
        tracing::info!(
            program = %encoder.program,
            size = %format.video_size(),
            fps = format.fps,
            destination = %redact_stream_key(destination),
            "launching encoder"
        );
        Self::spawn(cmd, format)
    }

    /// Spawns an already prepared command as the encoder.
    ///
    /// `format` must match whatever input format the command declares.
    pub fn spawn(mut cmd: Command, format: VideoFormat) -> Result<Self, LaunchError> {
        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|source| LaunchError::Spawn { program, source })?;
        let stdin = child.stdin.take().ok_or(LaunchError::NoStdin)?;
        tracing::debug!(pid = ?child.id(), "encoder started");

        Ok(Self {
            child,
            stdin: Some(stdin),
            format,
            exit: None,
        })
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    /// Writes one frame's raw bytes to the encoder.
    ///
    /// Blocks while the encoder is not reading, so a slow encoder slows the caller down rather
    /// than frames piling up.
    pub async fn write(&mut self, frame: &Frame) -> Result<(), WriteError> {
        let expected = self.format.frame_len();
        let actual = frame.as_bytes().len();
        if actual != expected {
            return Err(WriteError::FrameSize { expected, actual });
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(WriteError::Closed);
        };
        if let Some(status) = self.child.try_wait().map_err(WriteError::Io)? {
            self.exit = Some(status);
            return Err(WriteError::Exited(status));
        }

        if let Err(e) = stdin.write_all(frame.as_bytes()).await {
            // a broken pipe usually means the encoder died; report that if we can see it
            if let Ok(Some(status)) = self.child.try_wait() {
                self.exit = Some(status);
                return Err(WriteError::Exited(status));
            }
            return Err(WriteError::Io(e));
        }
        Ok(())
    }

    /// Closes the encoder's stdin and waits for it to exit.
    ///
    /// Calling this again returns the same exit status.
    pub async fn stop(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(mut stdin) = self.stdin.take() {
            // the encoder may already be gone, in which case there's nothing to flush to
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "closing encoder stdin");
            }
        }
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        tracing::info!(%status, "encoder exited");
        self.exit = Some(status);
        Ok(status)
    }
}

impl FrameSink for DeliveryPipe {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), WriteError> {
        self.write(frame).await
    }
}

/// Replaces the final path segment (the stream key) of an ingestion URL.
pub fn redact_stream_key(url: &str) -> String {
    match url.rsplit_once('/') {
        Some((base, key)) if !key.is_empty() => format!("{base}/<redacted>"),
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rgb;

    const FORMAT: VideoFormat = VideoFormat {
        width: 640,
        height: 480,
        fps: 30,
    };

    fn black() -> Frame {
        Frame::filled(FORMAT.width, FORMAT.height, Rgb::BLACK)
    }

    #[cfg(unix)]
    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn args_declare_format_and_destination() {
        let args = EncoderConfig::default().args("rtmp://host/live2/KEY123", FORMAT);
        let pairs: Vec<(&str, &str)> = args
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
            .collect();

        for expected in [
            ("-f", "rawvideo"),
            ("-pixel_format", "rgb24"),
            ("-video_size", "640x480"),
            ("-framerate", "30"),
            ("-i", "-"),
            ("-c:v", "libx264"),
            ("-b:v", "2500k"),
            ("-maxrate", "2500k"),
            ("-bufsize", "5000k"),
            ("-pix_fmt", "yuv420p"),
            ("-g", "30"),
            ("-c:a", "aac"),
            ("-b:a", "128k"),
            ("-f", "flv"),
        ] {
            assert!(pairs.contains(&expected), "missing {expected:?} in {args:?}");
        }
        assert_eq!(args.last().map(String::as_str), Some("rtmp://host/live2/KEY123"));

        // the raw input must be declared before it is opened
        let raw = args.iter().position(|a| a == "rawvideo").unwrap();
        let stdin = args.iter().position(|a| a == "-").unwrap();
        assert!(raw < stdin);
    }

    #[test]
    fn redacts_key() {
        assert_eq!(
            redact_stream_key("rtmp://a.rtmp.youtube.com/live2/abcd-efgh"),
            "rtmp://a.rtmp.youtube.com/live2/<redacted>"
        );
        assert_eq!(redact_stream_key("rtmp://host/"), "rtmp://host/");
        assert_eq!(redact_stream_key("nothing"), "nothing");
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let encoder = EncoderConfig {
            program: "/nonexistent/encoder-binary".to_string(),
            ..EncoderConfig::default()
        };
        let err = DeliveryPipe::start(&encoder, "rtmp://host/live2/KEY123", FORMAT).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ten_black_frames_then_clean_stop() {
        // stands in for an encoder that accepts the raw format: consume exactly ten frames
        let script = format!(
            "bytes=$(wc -c | tr -d ' '); test \"$bytes\" -eq {}",
            FORMAT.frame_len() * 10
        );
        let mut pipe = DeliveryPipe::spawn(shell(&script), FORMAT).unwrap();
        let frame = black();
        for _ in 0..10 {
            pipe.write(&frame).await.unwrap();
        }
        let status = pipe.stop().await.unwrap();
        assert!(status.success(), "{status}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_hands_destination_to_encoder() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("console-live-encoder-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let program = dir.join("fake-ffmpeg");
        let dest_file = dir.join("destination");
        let bytes_file = dir.join("bytes");
        std::fs::write(
            &program,
            format!(
                "#!/bin/sh\n\
                 for last; do :; done\n\
                 printf '%s' \"$last\" > '{}'\n\
                 wc -c | tr -d ' ' > '{}'\n",
                dest_file.display(),
                bytes_file.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let encoder = EncoderConfig {
            program: program.display().to_string(),
            ..EncoderConfig::default()
        };
        let mut pipe = DeliveryPipe::start(&encoder, "rtmp://host/live2/KEY123", FORMAT).unwrap();
        let frame = black();
        for _ in 0..10 {
            pipe.write(&frame).await.unwrap();
        }
        let status = pipe.stop().await.unwrap();
        assert!(status.success(), "{status}");

        let destination = std::fs::read_to_string(&dest_file).unwrap();
        assert_eq!(destination, "rtmp://host/live2/KEY123");
        let bytes = std::fs::read_to_string(&bytes_file).unwrap();
        assert_eq!(bytes.trim(), (FORMAT.frame_len() * 10).to_string());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_after_stop_fails() {
        let mut pipe = DeliveryPipe::spawn(shell("cat > /dev/null"), FORMAT).unwrap();
        pipe.write(&black()).await.unwrap();
        let status = pipe.stop().await.unwrap();
        assert!(status.success());

        let err = pipe.write(&black()).await.unwrap_err();
        assert!(matches!(err, WriteError::Closed), "{err:?}");

        // stopping again is harmless and reports the same status
        assert_eq!(pipe.stop().await.unwrap(), status);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_to_exited_encoder_fails() {
        let mut pipe = DeliveryPipe::spawn(shell("exit 3"), FORMAT).unwrap();
        // one frame is far larger than a pipe buffer, so this cannot complete without a reader
        let err = pipe.write(&black()).await.unwrap_err();
        assert!(
            matches!(err, WriteError::Exited(_) | WriteError::Io(_)),
            "{err:?}"
        );
        let status = pipe.stop().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn mismatched_frame_is_rejected() {
        let mut pipe = DeliveryPipe::spawn(shell("cat > /dev/null"), FORMAT).unwrap();
        let err = pipe.write(&Frame::filled(320, 240, Rgb::BLACK)).await.unwrap_err();
        assert!(
            matches!(
                err,
                WriteError::FrameSize {
                    expected: 921_600,
                    actual: 230_400
                }
            ),
            "{err:?}"
        );
        assert!(pipe.stop().await.unwrap().success());
    }
}
