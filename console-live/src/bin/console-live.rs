use console_live::config::Config;
use console_live::oauth::OAuthManager;
use console_live::youtube_api::YouTubeClient;
use console_live::{DeliveryPipe, DriverLoop, StreamError, open_session, run_pipeline};
use eyre::Context;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let config = Config::from_env().map_err(StreamError::from)?;

    let oauth_manager = OAuthManager::new(&config.oauth).map_err(StreamError::from)?;
    let credential = oauth_manager
        .get_credential(&config.refresh_token)
        .await
        .map_err(StreamError::from)?;
    let http_client = reqwest::Client::builder()
        // SSRF no thank you.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("build HTTP client")?;
    let yt = YouTubeClient::new(credential, Arc::new(oauth_manager), http_client);

    let session = match open_session(&yt, &config.broadcast, config.video).await {
        Ok(session) => session,
        Err(e) => {
            if let StreamError::StreamKey { broadcast_id, .. } = &e {
                end_broadcast(&yt, broadcast_id).await;
            }
            return Err(e.into());
        }
    };
    eprintln!(
        "Live Event ID: {}, Live Chat ID: {}",
        session.broadcast_id, session.chat_id
    );

    let started = Instant::now();
    let (status_tx, status_rx) = watch::channel(status_text(
        &config.status_text,
        &session.broadcast_id,
        Duration::ZERO,
    ));
    let clock = tokio::spawn(tick_status(
        status_tx,
        config.status_text.clone(),
        session.broadcast_id.clone(),
        started,
    ));

    let mut driver = DriverLoop::new(config.video, status_rx).with_frame_limit(config.frame_limit);
    let destination = config.destination(&session.stream_key);
    let streamed = run_pipeline(
        |format| DeliveryPipe::start(&config.encoder, &destination, format),
        &mut driver,
        shutdown_signal(),
    )
    .await;
    clock.abort();

    end_broadcast(&yt, &session.broadcast_id).await;

    let summary = streamed?;
    tracing::info!(
        state = %summary.state,
        frames_sent = summary.frames_sent,
        elapsed = ?started.elapsed(),
        "stream finished"
    );
    Ok(())
}

/// Best-effort: the run is over either way, so failure is only logged.
async fn end_broadcast(yt: &YouTubeClient, broadcast_id: &str) {
    if let Err(e) = yt.end_broadcast(broadcast_id).await {
        tracing::warn!(
            broadcast_id,
            error = ?eyre::Report::new(e),
            "could not end broadcast; end or delete it in YouTube Studio"
        );
    }
}

fn status_text(placeholder: &str, broadcast_id: &str, uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!(
        "{placeholder}\n\nbroadcast {broadcast_id}\nuptime {:02}:{:02}:{:02}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60
    )
}

async fn tick_status(
    tx: watch::Sender<String>,
    placeholder: String,
    broadcast_id: String,
    started: Instant,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        let text = status_text(&placeholder, &broadcast_id, started.elapsed());
        if tx.send(text).is_err() {
            // nobody is rendering any more
            return;
        }
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where there is such a thing.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
