//! JSON-over-HTTP client for the gym API.

use crate::api::{ClientDirectory, RecognitionService};
use crate::error::ApiError;
use crate::types::{
    Client, ClientId, ClientUpdate, NewClient, NewClientWithFace, RecognitionOutcome,
    RegisterFace, Snapshot,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Shown for a JSON error body that carries no message.
const GENERIC_SERVER_ERROR: &str = "error communicating with the server";

/// `{success, client, message?}`
#[derive(Debug, Deserialize)]
struct ClientEnvelope {
    #[serde(default)]
    success: bool,
    client: Option<Client>,
    message: Option<String>,
}

/// `{success, clients, message?}`
#[derive(Debug, Deserialize)]
struct ClientsEnvelope {
    #[serde(default)]
    success: bool,
    clients: Option<Vec<Client>>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Serialize)]
struct VerifyAccessRequest<'a> {
    image: &'a Snapshot,
}

impl ClientEnvelope {
    fn into_client(self) -> Result<Client, ApiError> {
        match self.client {
            Some(client) if self.success => Ok(client),
            _ => Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "request rejected by server".into()),
            )),
        }
    }
}

impl ClientsEnvelope {
    fn into_clients(self) -> Result<Vec<Client>, ApiError> {
        match self.clients {
            Some(clients) if self.success => Ok(clients),
            _ => Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "request rejected by server".into()),
            )),
        }
    }
}

/// HTTP client for the recognition and directory endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client rooted at `base_url` (e.g. `http://localhost:5000/api`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Probe `GET /health`. Any failure, including a timeout, reads as unreachable.
    pub async fn health(&self) -> bool {
        let result = self
            .http
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                false
            }
        }
    }

    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%method, %url, "api request");

        let mut builder = self.http.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(%url, error = %e, "api request failed");
            ApiError::from(e)
        })?;
        let status = response.status();
        let bytes = response.bytes().await?;
        decode_body(status, &bytes)
    }
}

/// Map a response status and body to the decoded payload or an [`ApiError`].
fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, ApiError> {
    if !status.is_success() {
        return Err(status_error(status, body));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// Prefer the server's `message`. A JSON body without one gets a generic
/// message; a body that is not JSON falls back to `HTTP <status>: <reason>`.
fn status_error(status: StatusCode, body: &[u8]) -> ApiError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(body) => body
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string()),
        Err(_) => format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    };
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

impl RecognitionService for ApiClient {
    async fn verify_access(&self, image: &Snapshot) -> Result<RecognitionOutcome, ApiError> {
        self.request(
            Method::POST,
            "/verify-access",
            Some(&VerifyAccessRequest { image }),
        )
        .await
    }
}

impl ClientDirectory for ApiClient {
    async fn list_clients(&self) -> Result<Vec<Client>, ApiError> {
        self.request::<(), ClientsEnvelope>(Method::GET, "/clients", None)
            .await?
            .into_clients()
    }

    async fn get_client(&self, id: ClientId) -> Result<Client, ApiError> {
        self.request::<(), ClientEnvelope>(Method::GET, &format!("/clients/{id}"), None)
            .await?
            .into_client()
    }

    async fn create_client(&self, client: &NewClient) -> Result<Client, ApiError> {
        self.request::<_, ClientEnvelope>(Method::POST, "/clients", Some(client))
            .await?
            .into_client()
    }

    async fn create_client_with_face(&self, client: &NewClientWithFace) -> Result<Client, ApiError> {
        self.request::<_, ClientEnvelope>(Method::POST, "/clients/with-face", Some(client))
            .await?
            .into_client()
    }

    async fn update_client(&self, id: ClientId, update: &ClientUpdate) -> Result<Client, ApiError> {
        self.request::<_, ClientEnvelope>(Method::PUT, &format!("/clients/{id}"), Some(update))
            .await?
            .into_client()
    }

    async fn register_face(&self, request: &RegisterFace) -> Result<Client, ApiError> {
        self.request::<_, ClientEnvelope>(Method::POST, "/register-face", Some(request))
            .await?
            .into_client()
    }
}
