//! A local stand-in for the YouTube Data API, for tests.

use crate::config::OAuthClientConfig;
use crate::oauth::{Credential, OAuthManager};
use crate::youtube_api::YouTubeClient;
use http::Method;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use oauth2::basic::{BasicTokenResponse, BasicTokenType};
use oauth2::{AccessToken, ClientId, ClientSecret, EmptyExtraTokenFields};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: HashMap<String, String>,
    pub(crate) authorization: Option<String>,
    pub(crate) body: Option<Value>,
}

pub(crate) type Router = fn(&Recorded) -> (StatusCode, Value);

/// Serves `router` on a local port, recording every request it sees.
pub(crate) async fn mock_api(router: Router) -> (String, Arc<std::sync::Mutex<Vec<Recorded>>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        loop {
            let Ok((conn, _)) = listener.accept().await else {
                return;
            };
            let log = Arc::clone(&log);
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let log = Arc::clone(&log);
                async move {
                    let method = req.method().clone();
                    let path = req.uri().path().trim_start_matches('/').to_string();
                    let query = req.uri().query().unwrap_or("").as_bytes();
                    let query = form_urlencoded::parse(query).into_owned().collect();
                    let authorization = req
                        .headers()
                        .get(http::header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let bytes = req.into_body().collect().await?.to_bytes();
                    let body = serde_json::from_slice(&bytes).ok();
                    let recorded = Recorded {
                        method,
                        path,
                        query,
                        authorization,
                        body,
                    };
                    let (status, reply) = router(&recorded);
                    log.lock().unwrap().push(recorded);

                    let mut response = Response::new(Full::new(Bytes::from(reply.to_string())));
                    *response.status_mut() = status;
                    Ok::<_, hyper::Error>(response)
                }
            });
            tokio::spawn(async move {
                let conn = hyper_util::rt::TokioIo::new(conn);
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(conn, service)
                    .await;
            });
        }
    });

    (format!("http://{addr}"), seen)
}

pub(crate) fn test_client(base_url: &str) -> YouTubeClient {
    let mut token = BasicTokenResponse::new(
        AccessToken::new("test-access-token".to_string()),
        BasicTokenType::Bearer,
        EmptyExtraTokenFields {},
    );
    token.set_expires_in(Some(&Duration::from_secs(3600)));
    let oauth = OAuthManager::new(&OAuthClientConfig {
        client_id: ClientId::new("id".to_string()),
        client_secret: ClientSecret::new("secret".to_string()),
    })
    .unwrap();
    YouTubeClient::new(Credential::new(token), Arc::new(oauth), reqwest::Client::new())
        .with_base_url(base_url)
}

pub(crate) fn broadcast(status: &str, bound_stream: Option<&str>) -> Value {
    let mut details = json!({ "enableAutoStart": true });
    if let Some(stream) = bound_stream {
        details["boundStreamId"] = json!(stream);
    }
    json!({
        "id": "b-1",
        "snippet": { "title": "Console Output Live Stream", "liveChatId": "chat-1" },
        "status": { "lifeCycleStatus": status, "privacyStatus": "unlisted" },
        "contentDetails": details,
    })
}

pub(crate) fn list(items: Vec<Value>) -> Value {
    json!({ "kind": "youtube#listResponse", "items": items })
}

pub(crate) fn stream_with_key() -> Value {
    json!({
        "id": "s-1",
        "cdn": {
            "ingestionType": "rtmp",
            "ingestionInfo": { "streamName": "KEY123" }
        }
    })
}
