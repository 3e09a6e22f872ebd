//! HTTP contact store.
//!
//! Talks JSON to the CRM's REST endpoints. The actual HTTP client is
//! abstracted via a trait so different libraries (reqwest, ureq, an
//! in-process loopback) can be plugged in.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::ContactStore;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use synchro_model::{RemoteContact, RemoteFields};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        })
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
    /// Bearer token, if any.
    pub bearer_token: Option<String>,
}

/// A response as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a 200 response with a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, String> {
        serde_json::to_vec(value)
            .map(|body| Self::new(200, body))
            .map_err(|e| e.to_string())
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a request. `Err` means no response was received.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// FastAPI-style error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Body returned by the create endpoint (the full record; only the id is
/// needed).
#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// A [`ContactStore`] backed by the CRM's REST API.
///
/// Endpoints, relative to the base URL:
/// - `GET /contacts`
/// - `POST /contacts`
/// - `PUT /contacts/{id}`
/// - `GET /contacts/{id}`
pub struct HttpContactStore<C: HttpClient> {
    /// Base URL of the API (e.g., "https://crm.example.com/api").
    base_url: String,
    /// Bearer token sent with every request.
    auth_token: Option<String>,
    /// HTTP client implementation.
    client: C,
    /// Connection state.
    connected: AtomicBool,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpContactStore<C> {
    /// Creates a new store.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Creates a store from the sync configuration.
    pub fn from_config(config: &SyncConfig, client: C) -> Self {
        let store = Self::new(config.server_url.clone(), client);
        match &config.auth_token {
            Some(token) => store.with_auth_token(token.clone()),
            None => store,
        }
    }

    /// Sets the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns true if the store is open and the client is healthy.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Closes the store; later calls fail with `NotConnected`.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn contact_url(&self, id: &str) -> String {
        format!("{}/contacts/{}", self.base_url, encode_segment(id))
    }

    fn send<B: Serialize>(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<&B>,
        cancel: &CancelToken,
    ) -> SyncResult<HttpResponse> {
        cancel.check()?;
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = body.map(serde_json::to_vec).transpose()?;
        let request = HttpRequest {
            method,
            url,
            body,
            bearer_token: self.auth_token.clone(),
        };
        tracing::trace!(method = %request.method, url = %request.url, "crm request");

        let response = self.client.send(request).map_err(|e| {
            self.set_error(&e);
            SyncError::transport_retryable(e)
        })?;

        match response.status {
            200..=299 => {
                self.clear_error();
                Ok(response)
            }
            status => {
                let err = status_error(status, &response.body);
                self.set_error(&err.to_string());
                Err(err)
            }
        }
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> SyncResult<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Codec(format!("failed to decode response: {}", e)))
    }
}

impl<C: HttpClient> ContactStore for HttpContactStore<C> {
    fn list_all(&self, cancel: &CancelToken) -> SyncResult<Vec<RemoteContact>> {
        let url = format!("{}/contacts", self.base_url);
        let response = self.send::<()>(HttpMethod::Get, url, None, cancel)?;
        Self::decode(&response)
    }

    fn create(&self, fields: &RemoteFields, cancel: &CancelToken) -> SyncResult<String> {
        let url = format!("{}/contacts", self.base_url);
        let response = self.send(HttpMethod::Post, url, Some(fields), cancel)?;
        let created: Created = Self::decode(&response)?;
        Ok(created.id)
    }

    fn update(&self, id: &str, fields: &RemoteFields, cancel: &CancelToken) -> SyncResult<()> {
        self.send(HttpMethod::Put, self.contact_url(id), Some(fields), cancel)?;
        Ok(())
    }

    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> SyncResult<Option<RemoteContact>> {
        match self.send::<()>(HttpMethod::Get, self.contact_url(id), None, cancel) {
            Ok(response) => Self::decode(&response).map(Some),
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Maps a non-success status to an error.
fn status_error(status: u16, body: &[u8]) -> SyncError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|b| match b.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    match status {
        401 | 403 => SyncError::AuthenticationFailed(message),
        404 => SyncError::NotFound(message),
        408 => SyncError::Timeout,
        400..=499 => SyncError::Rejected { status, message },
        _ => SyncError::ServerError(format!("{}: {}", status, message)),
    }
}

/// Percent-encodes a path segment.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// An HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request for `path` (starting at `/contacts`).
    fn handle(&self, method: HttpMethod, path: &str, body: Option<&[u8]>) -> HttpResponse;
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let path = request
            .url
            .find("/contacts")
            .map(|i| &request.url[i..])
            .unwrap_or(&request.url);

        Ok(self
            .server
            .handle(request.method, path, request.body.as_deref()))
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
