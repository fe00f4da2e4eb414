//! Driver Loop: pulls frames from the [`FrameSource`] and writes them to a [`FrameSink`] at the
//! configured frame rate.
//!
//! The loop is single-threaded and strictly sequential: render, write, wait for the next tick.
//! The only parallelism is the encoder process itself, and a slow encoder simply makes writes
//! block.

use crate::error::{LaunchError, StreamError, WriteError};
use crate::frame::VideoFormat;
use crate::pipe::{DeliveryPipe, FrameSink};
use crate::source::{FrameSource, StatusSource};
use std::fmt;
use std::future::Future;
use std::process::ExitStatus;
use tokio::time::MissedTickBehavior;

/// Log a progress line every this many seconds of video.
const PROGRESS_EVERY_SECS: u64 = 60;

/// Where the loop is in its lifecycle.
///
/// `Starting → Streaming → (Stopped | Failed)`. Both final states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    Starting,
    Streaming,
    Stopped,
    Failed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a run that ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub state: DriverState,
    pub frames_sent: u64,
    /// `None` if the encoder could not be waited on.
    pub encoder_status: Option<ExitStatus>,
}

#[derive(Debug)]
pub struct DriverLoop<S> {
    source: FrameSource<S>,
    format: VideoFormat,
    frame_limit: Option<u64>,
    frames_sent: u64,
    state: DriverState,
}

impl<S: StatusSource> DriverLoop<S> {
    pub fn new(format: VideoFormat, status: S) -> Self {
        Self::from_source(format, FrameSource::new(format, status))
    }

    /// `source` must produce frames of `format`.
    pub fn from_source(format: VideoFormat, source: FrameSource<S>) -> Self {
        Self {
            source,
            format,
            frame_limit: None,
            frames_sent: 0,
            state: DriverState::Starting,
        }
    }

    /// Stop on its own after `limit` frames instead of running until interrupted.
    pub fn with_frame_limit(mut self, limit: Option<u64>) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    fn transition(&mut self, next: DriverState) {
        tracing::info!(
            from = %self.state,
            to = %next,
            frames_sent = self.frames_sent,
            "driver state changed"
        );
        self.state = next;
    }

    /// Streams frames into `sink` until `shutdown` resolves, the frame limit is hit, or a write
    /// fails.
    ///
    /// `shutdown` also interrupts a write that is blocked on a stalled encoder.
    ///
    /// A loop that has already stopped or failed stays that way and refuses to run again.
    pub async fn run<K: FrameSink>(
        &mut self,
        sink: &mut K,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), WriteError> {
        if matches!(self.state, DriverState::Stopped | DriverState::Failed) {
            tracing::warn!(state = %self.state, "driver already finished");
            return Err(WriteError::Closed);
        }
        self.transition(DriverState::Streaming);

        let mut ticker = tokio::time::interval(self.format.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = std::pin::pin!(shutdown);
        let progress_every = u64::from(self.format.fps) * PROGRESS_EVERY_SECS;

        loop {
            if let Some(limit) = self.frame_limit
                && self.frames_sent >= limit
            {
                tracing::info!(limit, "frame limit reached");
                break;
            }

            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let frame = self.source.next_frame();
            let written = tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested during write");
                    break;
                }
                written = sink.write_frame(&frame) => written,
            };
            if let Err(e) = written {
                tracing::error!(error = %e, frames_sent = self.frames_sent, "frame write failed");
                self.transition(DriverState::Failed);
                return Err(e);
            }

            self.frames_sent += 1;
            if progress_every != 0 && self.frames_sent % progress_every == 0 {
                tracing::debug!(frames_sent = self.frames_sent, "still streaming");
            }
        }

        self.transition(DriverState::Stopped);
        Ok(())
    }
}

/// Launches the Delivery Pipe, streams into it, and stops it again on every exit path.
///
/// A launch failure leaves the driver in [`DriverState::Failed`] without streaming anything.
pub async fn run_pipeline<S, L>(
    launch: L,
    driver: &mut DriverLoop<S>,
    shutdown: impl Future<Output = ()>,
) -> Result<RunSummary, StreamError>
where
    S: StatusSource,
    L: FnOnce(VideoFormat) -> Result<DeliveryPipe, LaunchError>,
{
    let mut pipe = match launch(driver.format()) {
        Ok(pipe) => pipe,
        Err(e) => {
            driver.transition(DriverState::Failed);
            return Err(e.into());
        }
    };

    let streamed = driver.run(&mut pipe, shutdown).await;

    let encoder_status = match pipe.stop().await {
        Ok(status) => {
            if !status.success() {
                tracing::warn!(%status, "encoder exited unsuccessfully");
            }
            Some(status)
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not wait for encoder to exit");
            None
        }
    };
    streamed?;

    Ok(RunSummary {
        state: driver.state(),
        frames_sent: driver.frames_sent(),
        encoder_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use std::time::Duration;
    use tokio::time::Instant;

    const FORMAT: VideoFormat = VideoFormat {
        width: 64,
        height: 48,
        fps: 30,
    };

    #[derive(Debug, Default)]
    struct RecordingSink {
        writes: Vec<Instant>,
        lengths: Vec<usize>,
        fail_on: Option<usize>,
    }

    impl FrameSink for RecordingSink {
        async fn write_frame(&mut self, frame: &Frame) -> Result<(), WriteError> {
            if self.fail_on == Some(self.writes.len()) {
                return Err(WriteError::Closed);
            }
            self.writes.push(Instant::now());
            self.lengths.push(frame.as_bytes().len());
            Ok(())
        }
    }

    struct StalledSink;

    impl FrameSink for StalledSink {
        async fn write_frame(&mut self, _frame: &Frame) -> Result<(), WriteError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn paces_at_frame_rate() {
        let mut driver = DriverLoop::new(FORMAT, "pacing").with_frame_limit(Some(100));
        let mut sink = RecordingSink::default();

        let start = Instant::now();
        driver
            .run(&mut sink, std::future::pending())
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(sink.writes.len(), 100);
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(4500), "{elapsed:?}");

        for pair in sink.writes.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(33), "{gap:?}");
        }
        assert!(sink.lengths.iter().all(|&n| n == FORMAT.frame_len()));
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.frames_sent(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_ends_in_failed() {
        let mut driver = DriverLoop::new(FORMAT, "boom");
        let mut sink = RecordingSink {
            fail_on: Some(4),
            ..RecordingSink::default()
        };
        let err = driver
            .run(&mut sink, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Closed), "{err:?}");
        assert_eq!(driver.state(), DriverState::Failed);
        assert_eq!(driver.frames_sent(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_loop_does_not_restart() {
        let mut driver = DriverLoop::new(FORMAT, "once").with_frame_limit(Some(3));
        let mut sink = RecordingSink::default();
        driver.run(&mut sink, std::future::pending()).await.unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);

        let err = driver
            .run(&mut sink, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Closed), "{err:?}");
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(sink.writes.len(), 3);

        let mut failed = DriverLoop::new(FORMAT, "boom");
        let mut broken = RecordingSink {
            fail_on: Some(0),
            ..RecordingSink::default()
        };
        failed.run(&mut broken, std::future::pending()).await.unwrap_err();
        broken.fail_on = None;
        failed.run(&mut broken, std::future::pending()).await.unwrap_err();
        assert_eq!(failed.state(), DriverState::Failed);
        assert!(broken.writes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_shutdown_sends_nothing() {
        let mut driver = DriverLoop::new(FORMAT, "never shown");
        let mut sink = RecordingSink::default();
        driver
            .run(&mut sink, std::future::ready(()))
            .await
            .unwrap();
        assert!(sink.writes.is_empty());
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_streaming() {
        let mut driver = DriverLoop::new(FORMAT, "bye");
        let mut sink = RecordingSink::default();
        driver
            .run(&mut sink, tokio::time::sleep(Duration::from_millis(1000)))
            .await
            .unwrap();
        // ticks at 0, 33.3, ..., 999.9ms
        assert!((29..=31).contains(&sink.writes.len()), "{}", sink.writes.len());
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_stalled_write() {
        let mut driver = DriverLoop::new(FORMAT, "stuck");
        driver
            .run(&mut StalledSink, tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(driver.frames_sent(), 0);
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let mut driver = DriverLoop::new(FORMAT, "x");
        let err = run_pipeline(
            |_| Err(LaunchError::NoStdin),
            &mut driver,
            std::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StreamError::Launch(_)), "{err:?}");
        assert_eq!(driver.state(), DriverState::Failed);
        assert_eq!(driver.frames_sent(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipeline_stops_encoder_cleanly() {
        let mut driver = DriverLoop::new(FORMAT, "end to end").with_frame_limit(Some(10));
        let summary = run_pipeline(
            |format| {
                let mut cmd = tokio::process::Command::new("sh");
                cmd.args([
                    "-c",
                    &format!(
                        "bytes=$(wc -c | tr -d ' '); test \"$bytes\" -eq {}",
                        format.frame_len() * 10
                    ),
                ]);
                DeliveryPipe::spawn(cmd, format)
            },
            &mut driver,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(summary.state, DriverState::Stopped);
        assert_eq!(summary.frames_sent, 10);
        let status = summary.encoder_status.unwrap();
        assert!(status.success(), "{status}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipeline_fails_when_encoder_dies() {
        let mut driver = DriverLoop::new(
            VideoFormat {
                width: 640,
                height: 480,
                fps: 30,
            },
            "dies",
        );
        let err = run_pipeline(
            |format| {
                let mut cmd = tokio::process::Command::new("sh");
                cmd.args(["-c", "exit 1"]);
                DeliveryPipe::spawn(cmd, format)
            },
            &mut driver,
            std::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StreamError::Write(_)), "{err:?}");
        assert_eq!(driver.state(), DriverState::Failed);
    }
}
