//! Resource-oriented client for the Online Labs account and compute APIs.
//!
//! # Design
//! Every operation maps to exactly one HTTP request and unwraps one field of
//! the JSON envelope. All of them funnel through `execute`, which builds an
//! `HttpRequest`, hands it to the `Transport`, and classifies the response
//! with `parse_envelope`. Building and classifying are pure; only the
//! transport does I/O.
//!
//! The auth token is the one piece of mutable state. It sits behind an
//! `RwLock` so a client can be shared across threads and re-keyed after
//! `authenticate`.

use std::fmt;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, AUTH_TOKEN_HEADER, CONTENT_TYPE};
use crate::response::{extract_field, parse_envelope};
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    NewImage, NewIp, NewServer, NewSnapshot, NewToken, NewVolume, RemapIp, ServerActionRequest,
    VolumeType,
};

/// Blocking client for the Online Labs API.
pub struct OlClient<T = UreqTransport> {
    config: ClientConfig,
    token: RwLock<Option<String>>,
    transport: T,
}

impl<T: fmt::Debug> fmt::Debug for OlClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OlClient")
            .field("config", &self.config)
            .field("has_token", &self.token.read().map(|t| t.is_some()).unwrap_or(false))
            .field("transport", &self.transport)
            .finish()
    }
}

impl OlClient<UreqTransport> {
    /// Client for the public endpoints with the default 60 second timeout.
    pub fn new(token: Option<String>, debug: bool) -> Self {
        Self::with_config(ClientConfig::default().with_debug(debug), token)
    }

    pub fn with_config(config: ClientConfig, token: Option<String>) -> Self {
        Self::with_transport(config, token, UreqTransport::new())
    }
}

impl<T: Transport> OlClient<T> {
    pub fn with_transport(config: ClientConfig, token: Option<String>, transport: T) -> Self {
        Self {
            config,
            token: RwLock::new(token),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replace the token sent with subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    /// Token currently attached to requests, if any.
    pub fn current_token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // -----------------------------------------------------------------------
    // Account service
    // -----------------------------------------------------------------------

    pub fn organizations(&self) -> Result<Value, ApiError> {
        self.fetch(HttpMethod::Get, self.config.account("/organizations"), None, "organizations")
    }

    /// Exchange credentials for a token. Does not store it; see `authenticate`.
    pub fn new_token(&self, email: &str, password: &str, expires: bool) -> Result<Value, ApiError> {
        let body = to_body(&NewToken {
            email,
            password,
            expires,
        })?;
        self.fetch(HttpMethod::Post, self.config.account("/tokens"), Some(body), "token")
    }

    /// Create an expiring token and use its id for every later request.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Value, ApiError> {
        let token = self.new_token(email, password, true)?;
        let id = token
            .get("id")
            .and_then(Value::as_str)
            .ok_or(ApiError::MissingField("id"))?;
        self.set_token(id);
        Ok(token)
    }

    pub fn user(&self, user_id: &str) -> Result<Value, ApiError> {
        let url = self.config.account(&format!("/users/{user_id}"));
        self.fetch(HttpMethod::Get, url, None, "user")
    }

    pub fn tokens(&self) -> Result<Value, ApiError> {
        self.fetch(HttpMethod::Get, self.config.account("/tokens"), None, "tokens")
    }

    pub fn token(&self, token_id: &str) -> Result<Value, ApiError> {
        let url = self.config.account(&format!("/token/{token_id}"));
        self.fetch(HttpMethod::Get, url, None, "token")
    }

    /// Push back the expiry of a token.
    pub fn extend_token(&self, token_id: &str) -> Result<Value, ApiError> {
        let url = self.config.account(&format!("/token/{token_id}"));
        self.fetch(HttpMethod::Patch, url, None, "token")
    }

    pub fn delete_token(&self, token_id: &str) -> Result<(), ApiError> {
        let url = self.config.account(&format!("/token/{token_id}"));
        self.execute(HttpMethod::Delete, &url, None).map(drop)
    }

    // -----------------------------------------------------------------------
    // Servers
    // -----------------------------------------------------------------------

    pub fn servers(&self) -> Result<Value, ApiError> {
        self.fetch(HttpMethod::Get, self.config.compute("/servers"), None, "servers")
    }

    pub fn server(&self, server_id: &str) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/servers/{server_id}"));
        self.fetch(HttpMethod::Get, url, None, "server")
    }

    pub fn new_server(
        &self,
        name: &str,
        organization_id: &str,
        image_id: &str,
        volumes: &Value,
        tags: &[&str],
    ) -> Result<Value, ApiError> {
        let body = to_body(&NewServer {
            name,
            organization: organization_id,
            image: image_id,
            volumes,
            tags,
        })?;
        self.fetch(HttpMethod::Post, self.config.compute("/servers"), Some(body), "server")
    }

    /// Send the whole server object back; its `id` selects the target.
    pub fn update_server(&self, server: &Value) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/servers/{}", object_id(server)?));
        self.fetch(HttpMethod::Put, url, Some(server.clone()), "server")
    }

    pub fn delete_server(&self, server_id: &str) -> Result<(), ApiError> {
        let url = self.config.compute(&format!("/servers/{server_id}"));
        self.execute(HttpMethod::Delete, &url, None).map(drop)
    }

    /// Actions the server currently accepts.
    pub fn server_actions(&self, server_id: &str) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/servers/{server_id}/action"));
        self.fetch(HttpMethod::Get, url, None, "actions")
    }

    /// Start a lifecycle action and return the task tracking it. Takes a
    /// `ServerAction` or any action name the service knows.
    pub fn server_action(
        &self,
        server_id: &str,
        action: impl fmt::Display,
    ) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/servers/{server_id}/action"));
        let action = action.to_string();
        let body = to_body(&ServerActionRequest { action: &action })?;
        self.fetch(HttpMethod::Post, url, Some(body), "task")
    }

    // -----------------------------------------------------------------------
    // Volumes
    // -----------------------------------------------------------------------

    pub fn volumes(&self) -> Result<Value, ApiError> {
        self.fetch(HttpMethod::Get, self.config.compute("/volumes"), None, "volumes")
    }

    /// Create a volume. `volume_type` must be `l_ssd` or `l_hdd`; anything
    /// else fails before a request is made.
    pub fn new_volume(
        &self,
        name: &str,
        size: u64,
        organization_id: &str,
        volume_type: &str,
    ) -> Result<Value, ApiError> {
        let volume_type: VolumeType = volume_type.parse()?;
        let body = to_body(&NewVolume {
            name,
            size,
            organization: organization_id,
            volume_type,
        })?;
        self.fetch(HttpMethod::Post, self.config.compute("/volumes"), Some(body), "volume")
    }

    pub fn volume(&self, volume_id: &str) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/volumes/{volume_id}"));
        self.fetch(HttpMethod::Get, url, None, "volume")
    }

    pub fn delete_volume(&self, volume_id: &str) -> Result<(), ApiError> {
        let url = self.config.compute(&format!("/volumes/{volume_id}"));
        self.execute(HttpMethod::Delete, &url, None).map(drop)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn new_snapshot(
        &self,
        name: &str,
        organization_id: &str,
        volume_id: &str,
    ) -> Result<Value, ApiError> {
        let body = to_body(&NewSnapshot {
            name,
            organization: organization_id,
            volume: volume_id,
        })?;
        self.fetch(HttpMethod::Post, self.config.compute("/snapshots"), Some(body), "snapshot")
    }

    /// Updates go to the singular `/snapshot/{id}` route.
    pub fn update_snapshot(&self, snapshot: &Value) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/snapshot/{}", object_id(snapshot)?));
        self.fetch(HttpMethod::Put, url, Some(snapshot.clone()), "snapshot")
    }

    pub fn snapshots(&self) -> Result<Value, ApiError> {
        self.fetch(HttpMethod::Get, self.config.compute("/snapshots"), None, "snapshots")
    }

    pub fn snapshot(&self, snapshot_id: &str) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/snapshots/{snapshot_id}"));
        self.fetch(HttpMethod::Get, url, None, "snapshot")
    }

    pub fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), ApiError> {
        let url = self.config.compute(&format!("/snapshots/{snapshot_id}"));
        self.execute(HttpMethod::Delete, &url, None).map(drop)
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    pub fn image(&self, image_id: &str) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/images/{image_id}"));
        self.fetch(HttpMethod::Get, url, None, "image")
    }

    pub fn images(&self) -> Result<Value, ApiError> {
        self.fetch(HttpMethod::Get, self.config.compute("/images"), None, "images")
    }

    /// Register an image whose root is an existing volume.
    pub fn new_image(
        &self,
        name: &str,
        organization_id: &str,
        arch: &str,
        volume_id: &str,
    ) -> Result<Value, ApiError> {
        let body = to_body(&NewImage {
            name,
            organization: organization_id,
            arch,
            root_volume: volume_id,
        })?;
        self.fetch(HttpMethod::Post, self.config.compute("/images"), Some(body), "image")
    }

    pub fn update_image(&self, image: &Value) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/images/{}", object_id(image)?));
        self.fetch(HttpMethod::Put, url, Some(image.clone()), "image")
    }

    pub fn delete_image(&self, image_id: &str) -> Result<(), ApiError> {
        let url = self.config.compute(&format!("/images/{image_id}"));
        self.execute(HttpMethod::Delete, &url, None).map(drop)
    }

    // -----------------------------------------------------------------------
    // IP addresses
    // -----------------------------------------------------------------------

    /// Reserve a new IP for an organization.
    pub fn new_ip(&self, organization_id: &str) -> Result<Value, ApiError> {
        let body = to_body(&NewIp {
            organization: organization_id,
        })?;
        self.fetch(HttpMethod::Post, self.config.compute("/ips"), Some(body), "ip")
    }

    pub fn ips(&self) -> Result<Value, ApiError> {
        self.fetch(HttpMethod::Get, self.config.compute("/ips"), None, "ips")
    }

    pub fn ip(&self, ip_id: &str) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/ips/{ip_id}"));
        self.fetch(HttpMethod::Get, url, None, "ip")
    }

    /// Attach an IP to a different server.
    pub fn remap_ip(
        &self,
        ip_id: &str,
        address: &str,
        server_id: &str,
        organization_id: &str,
    ) -> Result<Value, ApiError> {
        let url = self.config.compute(&format!("/ips/{ip_id}"));
        let body = to_body(&RemapIp {
            address,
            id: ip_id,
            organization: organization_id,
            server: server_id,
        })?;
        self.fetch(HttpMethod::Post, url, Some(body), "ip")
    }

    pub fn delete_ip(&self, ip_id: &str) -> Result<(), ApiError> {
        let url = self.config.compute(&format!("/ips/{ip_id}"));
        self.execute(HttpMethod::Delete, &url, None).map(drop)
    }

    // -----------------------------------------------------------------------
    // Request executor
    // -----------------------------------------------------------------------

    /// Send a request with the verb given by name.
    ///
    /// Unknown verbs fail with `ApiError::Validation` before any I/O.
    pub fn request(&self, url: &str, data: Option<&Value>, method: &str) -> Result<Value, ApiError> {
        let method: HttpMethod = method.parse()?;
        self.execute(method, url, data.cloned())
    }

    /// Run one request/response cycle and return the decoded envelope.
    pub fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        data: Option<Value>,
    ) -> Result<Value, ApiError> {
        let request = self.build_request(method, url, data)?;
        if self.config.debug {
            debug!(
                headers = ?redacted_headers(&request.headers),
                url = %request.url,
                method = %request.method,
                data = request.body.as_deref().unwrap_or(""),
                "sending request"
            );
        }
        let response = self.transport.execute(&request)?;
        parse_envelope(method, &response)
    }

    /// Headers and body for a call. Every verb except DELETE carries a JSON
    /// body, defaulting to `{}`.
    pub fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        data: Option<Value>,
    ) -> Result<HttpRequest, ApiError> {
        let mut headers = vec![(CONTENT_TYPE.to_string(), "application/json".to_string())];
        if let Some(token) = self.current_token() {
            headers.push((AUTH_TOKEN_HEADER.to_string(), token));
        }

        let body = if method.sends_body() {
            let data = data.unwrap_or_else(|| json!({}));
            Some(serde_json::to_string(&data).map_err(ApiError::Serialization)?)
        } else {
            None
        };

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
            timeout: self.config.timeout,
        })
    }

    fn fetch(
        &self,
        method: HttpMethod,
        url: String,
        data: Option<Value>,
        field: &'static str,
    ) -> Result<Value, ApiError> {
        let envelope = self.execute(method, &url, data)?;
        extract_field(envelope, field)
    }
}

fn to_body<S: Serialize>(payload: &S) -> Result<Value, ApiError> {
    serde_json::to_value(payload).map_err(ApiError::Serialization)
}

fn object_id(object: &Value) -> Result<&str, ApiError> {
    object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Validation("object has no string `id` field".to_string()))
}

fn redacted_headers(headers: &[(String, String)]) -> Vec<(&str, &str)> {
    headers
        .iter()
        .map(|(k, v)| {
            if k.eq_ignore_ascii_case(AUTH_TOKEN_HEADER) {
                (k.as_str(), "<redacted>")
            } else {
                (k.as_str(), v.as_str())
            }
        })
        .collect()
}
