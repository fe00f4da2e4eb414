//! OAuth 2.0 credentials for the YouTube Data API.
//!
//! Streaming runs are unattended, so they authenticate by exchanging a stored refresh token for an
//! access token. The refresh token itself comes from a one-time interactive authorization
//! ([`OAuthManager::authenticate`]), which opens the user's browser and receives the redirect on a
//! throwaway local HTTP server.

use crate::config::OAuthClientConfig;
use crate::error::AuthError;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::future::Future;
use std::time::{Duration, SystemTime};

/// Google OAuth2 token endpoint URL used for both initial authentication and token refresh
const TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v3/token";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Managing broadcasts needs the SSL-only scope.
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

/// Safety margin subtracted from a token's lifetime.
const EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Lifetime assumed when the token endpoint does not say.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3300);

/// An access token together with when it stops being usable.
#[derive(Debug, Clone)]
pub struct Credential {
    token: BasicTokenResponse,
    /// When the access token expires, minus [`EXPIRY_BUFFER`].
    expires_at: SystemTime,
}

impl Credential {
    pub fn new(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Self::calculate_expiry(&token),
            token,
        }
    }

    /// A credential that is treated as expired, so the first use refreshes it.
    pub fn expired(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: SystemTime::UNIX_EPOCH,
            token,
        }
    }

    pub fn access_token(&self) -> &str {
        self.token.access_token().secret()
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Exchanges this credential's refresh token for a new access token.
    ///
    /// Google usually leaves the refresh token out of refresh responses, in which case the
    /// existing one is kept.
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> Result<(), AuthError> {
        let Some(refresh_token) = self.token.refresh_token().cloned() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Err(AuthError::Rejected);
        };
        tracing::trace!("refreshing token");
        *self = oauth_manager.get_credential(&refresh_token).await?;
        Ok(())
    }

    fn calculate_expiry(token: &BasicTokenResponse) -> SystemTime {
        let lifetime = token
            .expires_in()
            .map(|expires_in| expires_in.saturating_sub(EXPIRY_BUFFER))
            .unwrap_or(DEFAULT_LIFETIME);
        SystemTime::now() + lifetime
    }
}

/// Performs OAuth exchanges against Google's endpoints for one client application.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    client_id: ClientId,
    client_secret: ClientSecret,
    http_client: oauth2::reqwest::Client,
}

impl OAuthManager {
    pub fn new(config: &OAuthClientConfig) -> Result<Self, AuthError> {
        let http_client = oauth2::reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Exchange(Box::new(e)))?;
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            http_client,
        })
    }

    /// Exchanges a stored refresh token for a bearer credential.
    ///
    /// An `invalid_grant` answer means the refresh token was revoked or expired and is reported
    /// as [`AuthError::Rejected`]; the interactive authorization has to be repeated.
    #[tracing::instrument(skip_all)]
    pub async fn get_credential(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<Credential, AuthError> {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_token_uri(token_url()?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&self.http_client)
            .await
        {
            Ok(mut token) => {
                if token.refresh_token().is_none() {
                    tracing::trace!("new token lacks refresh token, preserving original");
                    token.set_refresh_token(Some(refresh_token.clone()));
                }
                tracing::debug!("obtained access token");
                Ok(Credential::new(token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(sr.error(), BasicErrorResponseType::InvalidGrant) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Err(AuthError::Rejected)
            }
            Err(e) => Err(AuthError::Exchange(Box::new(e))),
        }
    }

    /// Runs the full browser-based authorization-code flow (with PKCE) and returns the token,
    /// which includes the long-lived refresh token.
    ///
    /// `done_html` is shown in the browser once the redirect has been received.
    pub async fn authenticate(
        &self,
        done_html: &'static str,
    ) -> Result<BasicTokenResponse, AuthError> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) =
            setup_redirect(csrf.clone(), done_html).await?;

        let auth_url = AuthUrl::new(AUTH_URL.to_string()).map_err(|source| AuthError::Endpoint {
            url: AUTH_URL.to_string(),
            source,
        })?;
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(auth_url)
            .set_token_uri(token_url()?)
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scope(Scope::new(YOUTUBE_SCOPE.to_string()))
            // offline access is what makes Google hand out a refresh token
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if let Err(e) = webbrowser::open(auth_url.as_ref()) {
            tracing::warn!(error = %e, "could not open browser; visit the URL manually");
            eprintln!("Open this URL in your browser:\n\n  {auth_url}\n");
        }
        let authorization_code = eventually_authorization_code.await?;

        client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthError::Exchange(Box::new(e)))
    }
}

fn token_url() -> Result<TokenUrl, AuthError> {
    TokenUrl::new(TOKEN_URL.to_string()).map_err(|source| AuthError::Endpoint {
        url: TOKEN_URL.to_string(),
        source,
    })
}

/// Starts a one-shot HTTP server on a random local port that waits for the OAuth redirect.
///
/// Returns the redirect URL to register with the authorization request and a future that
/// resolves to the authorization code once the browser comes back with a matching `state`.
async fn setup_redirect(
    csrf: CsrfToken,
    done_html: &'static str,
) -> Result<
    (
        RedirectUrl,
        impl Future<Output = Result<AuthorizationCode, AuthError>>,
    ),
    AuthError,
> {
    let interactive =
        |what: &str, e: &dyn std::fmt::Display| AuthError::Interactive(format!("{what}: {e}"));

    let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| interactive("bind to localhost", &e))?;
    let addr = socket
        .local_addr()
        .map_err(|e| interactive("get local address", &e))?;
    let redirect = format!("http://{}:{}", addr.ip(), addr.port());
    let url = RedirectUrl::new(redirect.clone())
        .map_err(|source| AuthError::Endpoint { url: redirect, source })?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let r = async move {
            let (conn, _) = socket
                .accept()
                .await
                .map_err(|e| interactive("accept redirect", &e))?;
            let conn = hyper_util::rt::TokioIo::new(conn);
            let (got, mut gotten) = tokio::sync::mpsc::channel(1);
            let service = service_fn(move |req: Request<body::Incoming>| {
                let csrf = csrf.clone();
                let got = got.clone();
                async move {
                    let mut presented_state = None;
                    let mut presented_code = None;
                    for (k, v) in form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                    {
                        match &*k {
                            "state" => presented_state = Some(v),
                            "code" => presented_code = Some(v),
                            _ => {}
                        }
                    }
                    if presented_state.as_deref() != Some(csrf.secret().as_str()) {
                        return Err("invalid csrf token");
                    }
                    let Some(code) = presented_code else {
                        return Err("no authorization code found");
                    };
                    let code = AuthorizationCode::new(code.into_owned());
                    if got.send(code).await.is_err() {
                        return Err("redirect listener is gone");
                    }
                    Ok(Response::new(Full::<Bytes>::from(done_html)))
                }
            });
            let mut serve = std::pin::pin!(
                hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
            );

            tokio::select! {
                exit = &mut serve => {
                    match exit {
                        Err(e) => Err(interactive("redirect server got bad request", &e)),
                        Ok(()) => Err(AuthError::Interactive(
                            "redirect server exited prematurely".to_string(),
                        )),
                    }
                }
                code = gotten.recv() => {
                    serve.as_mut().graceful_shutdown();
                    // let the browser get its response before the connection goes away
                    let _ = serve.await;
                    code.ok_or_else(|| {
                        AuthError::Interactive("no authorization code received".to_string())
                    })
                }
            }
        };
        let _ = tx.send(r.await);
    });

    Ok((url, async move {
        rx.await.map_err(|_| {
            AuthError::Interactive("redirect future dropped prematurely".to_string())
        })?
    }))
}
