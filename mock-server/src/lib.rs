//! In-memory emulation of the Online Labs account and compute services.
//!
//! Both services are served from one router, so tests point the client's
//! account and compute base URLs at the same address. Responses use the
//! same envelopes and error bodies as the real API, including the 200
//! `{"id": "not_found"}` answer for unknown users.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "secret";
pub const ORGANIZATION_ID: &str = "000a115d-2852-4b0a-9ce8-47f1134ba95a";
pub const USER_ID: &str = "5bea0358-db40-429e-bd82-914686a7e7b9";

const AUTH_HEADER: &str = "x-auth-token";
const SERVER_ACTIONS: [&str; 4] = ["poweron", "poweroff", "reboot", "terminate"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Server,
    Volume,
    Snapshot,
    Image,
    Ip,
}

impl Kind {
    fn singular(self) -> &'static str {
        match self {
            Kind::Server => "server",
            Kind::Volume => "volume",
            Kind::Snapshot => "snapshot",
            Kind::Image => "image",
            Kind::Ip => "ip",
        }
    }

    fn plural(self) -> &'static str {
        match self {
            Kind::Server => "servers",
            Kind::Volume => "volumes",
            Kind::Snapshot => "snapshots",
            Kind::Image => "images",
            Kind::Ip => "ips",
        }
    }
}

#[derive(Debug, Default)]
pub struct Store {
    tokens: BTreeMap<String, Value>,
    servers: BTreeMap<String, Value>,
    volumes: BTreeMap<String, Value>,
    snapshots: BTreeMap<String, Value>,
    images: BTreeMap<String, Value>,
    ips: BTreeMap<String, Value>,
    allocated_ips: u32,
}

impl Store {
    fn collection(&self, kind: Kind) -> &BTreeMap<String, Value> {
        match kind {
            Kind::Server => &self.servers,
            Kind::Volume => &self.volumes,
            Kind::Snapshot => &self.snapshots,
            Kind::Image => &self.images,
            Kind::Ip => &self.ips,
        }
    }

    fn collection_mut(&mut self, kind: Kind) -> &mut BTreeMap<String, Value> {
        match kind {
            Kind::Server => &mut self.servers,
            Kind::Volume => &mut self.volumes,
            Kind::Snapshot => &mut self.snapshots,
            Kind::Image => &mut self.images,
            Kind::Ip => &mut self.ips,
        }
    }

    fn insert(&mut self, kind: Kind, object: Value) -> Value {
        let id = object["id"].as_str().unwrap_or_default().to_string();
        self.collection_mut(kind).insert(id, object.clone());
        object
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|token| self.tokens.contains_key(token))
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Error response in the service's wire format.
#[derive(Debug)]
pub struct ApiFailure(StatusCode, Value);

impl ApiFailure {
    fn unauthorized() -> Self {
        ApiFailure(
            StatusCode::UNAUTHORIZED,
            json!({ "error_message": "Authentication error", "type": "invalid_auth" }),
        )
    }

    fn not_found(kind: &str, id: &str) -> Self {
        ApiFailure(
            StatusCode::NOT_FOUND,
            json!({
                "message": format!("\"{id}\" not found"),
                "type": "unknown_resource",
                "resource": kind,
            }),
        )
    }

    fn invalid(message: impl Into<String>) -> Self {
        ApiFailure(
            StatusCode::BAD_REQUEST,
            json!({ "message": message.into(), "type": "invalid_request_error" }),
        )
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiFailure>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/organizations", get(list_organizations))
        .route("/tokens", get(list_tokens).post(create_token))
        .route(
            "/token/{id}",
            get(get_token).patch(extend_token).delete(delete_token),
        )
        .route("/users/{id}", get(get_user))
        .route("/servers", get(list_servers).post(create_server))
        .route(
            "/servers/{id}",
            get(get_server).put(update_server).delete(delete_server),
        )
        .route("/servers/{id}/action", get(list_actions).post(run_action))
        .route("/volumes", get(list_volumes).post(create_volume))
        .route("/volumes/{id}", get(get_volume).delete(delete_volume))
        .route("/snapshots", get(list_snapshots).post(create_snapshot))
        .route("/snapshots/{id}", get(get_snapshot).delete(delete_snapshot))
        .route("/snapshot/{id}", put(update_snapshot))
        .route("/images", get(list_images).post(create_image))
        .route(
            "/images/{id}",
            get(get_image).put(update_image).delete(delete_image),
        )
        .route("/ips", get(list_ips).post(create_ip))
        .route("/ips/{id}", get(get_ip).post(remap_ip).delete(delete_ip))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn string_field<'a>(body: &'a Value, field: &str) -> Result<&'a str, ApiFailure> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiFailure::invalid(format!("Validation Error: {field} is required")))
}

/// Copy every field of `patch` onto `target`, except the id.
fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch.iter().filter(|(k, _)| k.as_str() != "id") {
            target.insert(key.clone(), value.clone());
        }
    }
}

async fn list(db: &Db, headers: &HeaderMap, kind: Kind) -> ApiResult {
    let store = db.read().await;
    if !store.is_authorized(headers) {
        return Err(ApiFailure::unauthorized());
    }
    let items: Vec<Value> = store.collection(kind).values().cloned().collect();
    Ok(Json(json!({ kind.plural(): items })))
}

async fn fetch(db: &Db, headers: &HeaderMap, kind: Kind, id: &str) -> ApiResult {
    let store = db.read().await;
    if !store.is_authorized(headers) {
        return Err(ApiFailure::unauthorized());
    }
    let item = store
        .collection(kind)
        .get(id)
        .cloned()
        .ok_or_else(|| ApiFailure::not_found(kind.singular(), id))?;
    Ok(Json(json!({ kind.singular(): item })))
}

async fn update(db: &Db, headers: &HeaderMap, kind: Kind, id: &str, patch: &Value) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(headers) {
        return Err(ApiFailure::unauthorized());
    }
    let item = store
        .collection_mut(kind)
        .get_mut(id)
        .ok_or_else(|| ApiFailure::not_found(kind.singular(), id))?;
    merge(item, patch);
    Ok(Json(json!({ kind.singular(): item.clone() })))
}

async fn remove(db: &Db, headers: &HeaderMap, kind: Kind, id: &str) -> Result<StatusCode, ApiFailure> {
    let mut store = db.write().await;
    if !store.is_authorized(headers) {
        return Err(ApiFailure::unauthorized());
    }
    store
        .collection_mut(kind)
        .remove(id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| ApiFailure::not_found(kind.singular(), id))
}

// ---------------------------------------------------------------------------
// Account service
// ---------------------------------------------------------------------------

async fn list_organizations(State(db): State<Db>, headers: HeaderMap) -> ApiResult {
    if !db.read().await.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    Ok(Json(json!({
        "organizations": [{ "id": ORGANIZATION_ID, "name": "example", "users": [{ "id": USER_ID }] }]
    })))
}

async fn create_token(State(db): State<Db>, Json(body): Json<Value>) -> ApiResult {
    let email = body.get("email").and_then(Value::as_str);
    let password = body.get("password").and_then(Value::as_str);
    if email != Some(EMAIL) || password != Some(PASSWORD) {
        return Err(ApiFailure(
            StatusCode::UNAUTHORIZED,
            json!({ "message": "Invalid credentials", "type": "invalid_auth" }),
        ));
    }
    let expires = body.get("expires").and_then(Value::as_bool).unwrap_or(true);
    let expiry = if expires { json!("in 1 hour") } else { Value::Null };
    let token = json!({ "id": new_id(), "user_id": USER_ID, "expires": expiry });
    let id = token["id"].as_str().unwrap_or_default().to_string();
    tracing::debug!(%id, expires, "issued token");
    db.write().await.tokens.insert(id, token.clone());
    Ok(Json(json!({ "token": token })))
}

async fn list_tokens(State(db): State<Db>, headers: HeaderMap) -> ApiResult {
    let store = db.read().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let tokens: Vec<Value> = store.tokens.values().cloned().collect();
    Ok(Json(json!({ "tokens": tokens })))
}

async fn get_token(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult {
    let store = db.read().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let token = store
        .tokens
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiFailure::not_found("token", &id))?;
    Ok(Json(json!({ "token": token })))
}

async fn extend_token(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let token = store
        .tokens
        .get_mut(&id)
        .ok_or_else(|| ApiFailure::not_found("token", &id))?;
    if !token["expires"].is_null() {
        token["expires"] = json!("in 2 hours");
    }
    Ok(Json(json!({ "token": token.clone() })))
}

async fn delete_token(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    store
        .tokens
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| ApiFailure::not_found("token", &id))
}

/// Unknown users answer 200 with an embedded not-found marker.
async fn get_user(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult {
    if !db.read().await.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    if id != USER_ID {
        return Ok(Json(json!({ "id": "not_found", "message": "User not found" })));
    }
    Ok(Json(json!({
        "user": {
            "id": USER_ID,
            "email": EMAIL,
            "organizations": [{ "id": ORGANIZATION_ID }],
        }
    })))
}

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

async fn list_servers(State(db): State<Db>, headers: HeaderMap) -> ApiResult {
    list(&db, &headers, Kind::Server).await
}

async fn create_server(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let server = json!({
        "id": new_id(),
        "name": string_field(&body, "name")?,
        "organization": string_field(&body, "organization")?,
        "image": string_field(&body, "image")?,
        "volumes": body.get("volumes").cloned().unwrap_or_else(|| json!({})),
        "tags": body.get("tags").cloned().unwrap_or_else(|| json!([])),
        "state": "stopped",
        "public_ip": Value::Null,
    });
    Ok(Json(json!({ "server": store.insert(Kind::Server, server) })))
}

async fn get_server(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult {
    fetch(&db, &headers, Kind::Server, &id).await
}

async fn update_server(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    update(&db, &headers, Kind::Server, &id, &body).await
}

async fn delete_server(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    remove(&db, &headers, Kind::Server, &id).await
}

async fn list_actions(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let store = db.read().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    if !store.servers.contains_key(&id) {
        return Err(ApiFailure::not_found("server", &id));
    }
    Ok(Json(json!({ "actions": SERVER_ACTIONS })))
}

async fn run_action(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let action = string_field(&body, "action")?;
    if !SERVER_ACTIONS.contains(&action) {
        return Err(ApiFailure::invalid(format!("Unknown action {action}")));
    }
    if action == "terminate" {
        store
            .servers
            .remove(&id)
            .ok_or_else(|| ApiFailure::not_found("server", &id))?;
    } else {
        let server = store
            .servers
            .get_mut(&id)
            .ok_or_else(|| ApiFailure::not_found("server", &id))?;
        let state = if action == "poweroff" { "stopped" } else { "running" };
        server["state"] = json!(state);
    }
    Ok(Json(json!({
        "task": {
            "id": new_id(),
            "description": action,
            "status": "pending",
            "href_from": format!("/servers/{id}/action"),
        }
    })))
}

// ---------------------------------------------------------------------------
// Volumes
// ---------------------------------------------------------------------------

async fn list_volumes(State(db): State<Db>, headers: HeaderMap) -> ApiResult {
    list(&db, &headers, Kind::Volume).await
}

async fn create_volume(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let volume_type = string_field(&body, "volume_type")?;
    if !matches!(volume_type, "l_ssd" | "l_hdd") {
        return Err(ApiFailure::invalid("Validation Error: volume_type"));
    }
    let size = body
        .get("size")
        .and_then(Value::as_u64)
        .ok_or_else(|| ApiFailure::invalid("Validation Error: size is required"))?;
    let volume = json!({
        "id": new_id(),
        "name": string_field(&body, "name")?,
        "organization": string_field(&body, "organization")?,
        "size": size,
        "volume_type": volume_type,
        "server": Value::Null,
    });
    Ok(Json(json!({ "volume": store.insert(Kind::Volume, volume) })))
}

async fn get_volume(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult {
    fetch(&db, &headers, Kind::Volume, &id).await
}

async fn delete_volume(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    remove(&db, &headers, Kind::Volume, &id).await
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

async fn list_snapshots(State(db): State<Db>, headers: HeaderMap) -> ApiResult {
    list(&db, &headers, Kind::Snapshot).await
}

async fn create_snapshot(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let volume_id = string_field(&body, "volume")?;
    let volume = store
        .volumes
        .get(volume_id)
        .cloned()
        .ok_or_else(|| ApiFailure::not_found("volume", volume_id))?;
    let snapshot = json!({
        "id": new_id(),
        "name": string_field(&body, "name")?,
        "organization": string_field(&body, "organization")?,
        "base_volume": { "id": volume_id, "name": volume["name"] },
        "size": volume["size"],
        "volume_type": volume["volume_type"],
        "state": "snapshotting",
    });
    Ok(Json(json!({ "snapshot": store.insert(Kind::Snapshot, snapshot) })))
}

async fn get_snapshot(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    fetch(&db, &headers, Kind::Snapshot, &id).await
}

async fn update_snapshot(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    update(&db, &headers, Kind::Snapshot, &id, &body).await
}

async fn delete_snapshot(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    remove(&db, &headers, Kind::Snapshot, &id).await
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

async fn list_images(State(db): State<Db>, headers: HeaderMap) -> ApiResult {
    list(&db, &headers, Kind::Image).await
}

async fn create_image(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let root_volume = string_field(&body, "root_volume")?;
    if !store.snapshots.contains_key(root_volume) && !store.volumes.contains_key(root_volume) {
        return Err(ApiFailure::not_found("volume", root_volume));
    }
    let image = json!({
        "id": new_id(),
        "name": string_field(&body, "name")?,
        "organization": string_field(&body, "organization")?,
        "arch": string_field(&body, "arch")?,
        "root_volume": { "id": root_volume },
        "public": false,
    });
    Ok(Json(json!({ "image": store.insert(Kind::Image, image) })))
}

async fn get_image(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult {
    fetch(&db, &headers, Kind::Image, &id).await
}

async fn update_image(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    update(&db, &headers, Kind::Image, &id, &body).await
}

async fn delete_image(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    remove(&db, &headers, Kind::Image, &id).await
}

// ---------------------------------------------------------------------------
// IP addresses
// ---------------------------------------------------------------------------

async fn list_ips(State(db): State<Db>, headers: HeaderMap) -> ApiResult {
    list(&db, &headers, Kind::Ip).await
}

async fn create_ip(State(db): State<Db>, headers: HeaderMap, Json(body): Json<Value>) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let organization = string_field(&body, "organization")?.to_string();
    store.allocated_ips += 1;
    let n = store.allocated_ips;
    let ip = json!({
        "id": new_id(),
        "address": format!("212.47.{}.{}", n / 256, n % 256),
        "organization": organization,
        "server": Value::Null,
    });
    Ok(Json(json!({ "ip": store.insert(Kind::Ip, ip) })))
}

async fn get_ip(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult {
    fetch(&db, &headers, Kind::Ip, &id).await
}

async fn remap_ip(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    let mut store = db.write().await;
    if !store.is_authorized(&headers) {
        return Err(ApiFailure::unauthorized());
    }
    let server_id = string_field(&body, "server")?;
    let server = store
        .servers
        .get(server_id)
        .map(|s| json!({ "id": server_id, "name": s["name"] }))
        .ok_or_else(|| ApiFailure::not_found("server", server_id))?;
    let ip = store
        .ips
        .get_mut(&id)
        .ok_or_else(|| ApiFailure::not_found("ip", &id))?;
    ip["server"] = server;
    Ok(Json(json!({ "ip": ip.clone() })))
}

async fn delete_ip(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    remove(&db, &headers, Kind::Ip, &id).await
}
