//! One-time interactive authorization.
//!
//! Opens the Google consent screen in a browser and prints the refresh token that
//! `console-live` expects in `REFRESH_TOKEN`.

use console_live::config::OAuthClientConfig;
use console_live::oauth::OAuthManager;
use eyre::Context;
use oauth2::TokenResponse;
use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const DONE_HTML: &str = "<!DOCTYPE html>
<html>
<head><title>console-live</title></head>
<body>
<p>Authorization complete. You can close this tab and return to the terminal.</p>
</body>
</html>
";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();

    let client = OAuthClientConfig::from_lookup(&|var| std::env::var(var).ok())
        .context("read OAuth client from the environment")?;
    let oauth_manager = OAuthManager::new(&client).context("set up OAuth client")?;
    let token = oauth_manager
        .authenticate(DONE_HTML)
        .await
        .context("authorize access to YouTube")?;

    let Some(refresh_token) = token.refresh_token() else {
        eyre::bail!(
            "Google did not hand out a refresh token; \
             remove the app's access in your Google account settings and try again"
        );
    };

    eprintln!("Authorization complete. Set this in the environment of console-live:");
    println!("REFRESH_TOKEN={}", refresh_token.secret());
    Ok(())
}
