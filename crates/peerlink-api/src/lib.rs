//! Peerlink backend calls made on behalf of the signed-in user
//!
//! Every call goes through `RequestGateway`, so authentication and the
//! one-shot refresh-and-retry are handled below this layer. Responses are
//! handed back as JSON without interpretation.

use peerlink_auth::{GatewayError, RequestGateway, endpoint};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub const SEARCH_PATH: &str = "/search/";
pub const SEND_MAGNET_PATH: &str = "/send-magnet/";

/// Metadata field searched when no filter is given
pub const DEFAULT_SEARCH_FILTER: &str = "filename";

/// Errors from API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Whether the user has to log in again before retrying.
    pub fn requires_login(&self) -> bool {
        match self {
            ApiError::Gateway(e) => e.requires_login(),
            _ => false,
        }
    }
}

/// Result alias for API calls.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Narrowing for `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions<'a> {
    /// Restrict to one group's files; all of the user's groups otherwise
    pub group: Option<&'a str>,
    /// Metadata field to match against; `filename` when unset
    pub filter: Option<&'a str>,
}

#[derive(Serialize)]
struct MagnetBody<'a> {
    #[serde(rename = "magnetLink")]
    magnet_link: &'a str,
}

#[derive(Clone)]
pub struct PeerlinkApi {
    gateway: RequestGateway,
    base_url: String,
}

impl PeerlinkApi {
    pub fn new(gateway: RequestGateway, base_url: impl Into<String>) -> Self {
        Self {
            gateway,
            base_url: base_url.into(),
        }
    }

    /// `GET /search/?query=..&filter=..[&group=..]`
    pub async fn search(&self, query: &str, options: SearchOptions<'_>) -> Result<Value> {
        let mut url = Url::parse(&endpoint(&self.base_url, SEARCH_PATH))
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            pairs.append_pair("filter", options.filter.unwrap_or(DEFAULT_SEARCH_FILTER));
            if let Some(group) = options.group {
                pairs.append_pair("group", group);
            }
        }
        debug!(query, "searching files");
        self.call(self.gateway.client().get(url)).await
    }

    /// `POST /send-magnet/` with `{ "magnetLink": .. }`
    pub async fn send_magnet(&self, magnet: &str) -> Result<Value> {
        let request = self
            .gateway
            .client()
            .post(endpoint(&self.base_url, SEND_MAGNET_PATH))
            .json(&MagnetBody {
                magnet_link: magnet,
            });
        debug!("sending magnet link");
        self.call(request).await
    }

    async fn call(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = self.gateway.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::Json;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use peerlink_auth::{CredentialPair, CredentialStore, HttpIssuer, RefreshCoordinator};
    use serde_json::json;
    use tokio::net::TcpListener;

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Backend that accepts only "A2"; refresh with "R1" hands out A2/R2.
    async fn start_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = axum::Router::new()
            .route(
                "/api/search/",
                get(
                    |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                        if bearer(&headers).as_deref() != Some("Bearer A2") {
                            return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "expired"})));
                        }
                        (StatusCode::OK, Json(json!([{"params": params}])))
                    },
                ),
            )
            .route(
                "/api/send-magnet/",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    if bearer(&headers).as_deref() != Some("Bearer A2") {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "expired"})));
                    }
                    match body["magnetLink"].as_str() {
                        Some(link) if !link.is_empty() => (
                            StatusCode::OK,
                            Json(json!({"message": "Magnet link sent successfully"})),
                        ),
                        _ => (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": "Magnet link is required"})),
                        ),
                    }
                }),
            )
            .route(
                "/api/token/refresh/",
                post(|Json(body): Json<Value>| async move {
                    if body["refresh"] == "R1" {
                        (StatusCode::OK, Json(json!({"access": "A2", "refresh": "R2"})))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "invalid"})))
                    }
                }),
            );

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn api(base_url: &str, pair: Option<CredentialPair>) -> (PeerlinkApi, CredentialStore) {
        let client = reqwest::Client::new();
        let store = CredentialStore::new();
        if let Some(pair) = pair {
            store.set(pair);
        }
        let issuer = Arc::new(HttpIssuer::new(client.clone(), base_url));
        let coordinator = RefreshCoordinator::new(store.clone(), issuer);
        let gateway = RequestGateway::new(client, coordinator);
        (PeerlinkApi::new(gateway, base_url), store)
    }

    #[tokio::test]
    async fn search_sends_query_parameters_after_refresh() {
        let base_url = start_backend().await;
        let (api, store) = api(&base_url, Some(CredentialPair::new("A1", "R1")));

        let result = api
            .search(
                "ubuntu iso",
                SearchOptions {
                    group: Some("g-1"),
                    filter: None,
                },
            )
            .await
            .unwrap();

        let params = &result[0]["params"];
        assert_eq!(params["query"], "ubuntu iso");
        assert_eq!(params["filter"], "filename");
        assert_eq!(params["group"], "g-1");
        assert_eq!(store.get().unwrap().access(), "A2");
    }

    #[tokio::test]
    async fn send_magnet_posts_link() {
        let base_url = start_backend().await;
        let (api, _) = api(&base_url, Some(CredentialPair::new("A2", "R2")));

        let result = api.send_magnet("magnet:?xt=urn:btih:abc").await.unwrap();
        assert_eq!(result["message"], "Magnet link sent successfully");

        match api.send_magnet("").await {
            Err(ApiError::Status { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("required"));
            }
            other => panic!("expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_session_requires_login() {
        let base_url = start_backend().await;
        let (api, store) = api(&base_url, Some(CredentialPair::new("A0", "R-revoked")));

        let err = api.search("x", SearchOptions::default()).await.unwrap_err();
        assert!(err.requires_login(), "got: {err:?}");
        assert!(store.get().is_none());
    }
}
