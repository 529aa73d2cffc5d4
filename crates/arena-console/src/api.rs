//! Game server HTTP API: login and bearer-authenticated calls.

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Login answered with a non-200 status.
    #[error("login failed with status {status}: {body}")]
    AuthFailure {
        /// HTTP status code.
        status: u16,
        /// Response body, for the operator.
        body: String,
    },

    /// Transport or response decoding failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A 2xx body that is not JSON.
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of an authenticated call.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiReply {
    /// 2xx with a JSON body.
    Body(Value),
    /// 2xx with an empty body.
    Accepted,
    /// Non-2xx.
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    player_name: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Client for the game server's REST API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_path: String,
}

impl ApiClient {
    /// Create a client for `{base_url}{api_path}`.
    pub fn new(base_url: &str, api_path: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_path: format!("/{}", api_path.trim_matches('/')),
        }
    }

    /// Full URL of an API resource.
    pub fn endpoint(&self, resource: &str) -> String {
        let resource = resource.trim_start_matches('/');
        if self.api_path == "/" {
            format!("{}/{resource}", self.base_url)
        } else {
            format!("{}{}/{resource}", self.base_url, self.api_path)
        }
    }

    /// Log a player in and return the bearer token.
    #[tracing::instrument(skip_all, fields(player = %player))]
    pub async fn login(&self, player: &str, password: &str) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(self.endpoint("auth/login"))
            .json(&LoginRequest {
                player_name: player,
                password,
            })
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            warn!(status, "login rejected");
            return Err(ApiError::AuthFailure { status, body });
        }

        let login: LoginResponse = resp.json().await?;
        debug!("login succeeded");
        Ok(login.token)
    }

    /// Call an API resource with the bearer token and an optional JSON body.
    #[tracing::instrument(skip_all, fields(method = %method, resource = %resource))]
    pub async fn authenticated(
        &self,
        method: Method,
        resource: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<ApiReply, ApiError> {
        let mut req = self
            .http
            .request(method, self.endpoint(resource))
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "request rejected");
            return Ok(ApiReply::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ApiReply::Accepted);
        }
        Ok(ApiReply::Body(serde_json::from_slice(&bytes)?))
    }
}
