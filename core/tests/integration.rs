//! Full account and compute lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives every `OlClient`
//! operation over real HTTP through `UreqTransport`. Both base URLs point at
//! the same mock, which serves the account and compute routes together.

use std::time::Duration;

use mock_server::{EMAIL, ORGANIZATION_ID, PASSWORD, USER_ID};
use olcloud_core::{ApiError, ClientConfig, OlClient};
use serde_json::json;

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn client(base: &str) -> OlClient {
    let config = ClientConfig::default()
        .with_base_urls(base, base)
        .with_timeout(Duration::from_secs(5))
        .with_debug(true);
    OlClient::with_config(config, None)
}

#[test]
fn unauthenticated_requests_fail_with_error_message() {
    let base = start_server();
    let client = client(&base);

    let err = client.servers().unwrap_err();
    assert!(matches!(err, ApiError::Api(ref m) if m == "Authentication error"));
}

#[test]
fn bad_credentials_leave_client_without_token() {
    let base = start_server();
    let client = client(&base);

    let err = client.authenticate(EMAIL, "wrong").unwrap_err();
    assert!(matches!(err, ApiError::Api(ref m) if m == "Invalid credentials"));
    assert!(client.current_token().is_none());
}

#[test]
fn account_lifecycle() {
    let base = start_server();
    let client = client(&base);

    // Step 1: exchange credentials for a token.
    let token = client.authenticate(EMAIL, PASSWORD).unwrap();
    let token_id = token["id"].as_str().unwrap().to_string();
    assert_eq!(client.current_token().as_deref(), Some(token_id.as_str()));

    // Step 2: read-only account resources.
    let orgs = client.organizations().unwrap();
    assert_eq!(orgs[0]["id"], ORGANIZATION_ID);
    let user = client.user(USER_ID).unwrap();
    assert_eq!(user["email"], EMAIL);

    // Step 3: unknown users come back 200 with an embedded not-found marker.
    let err = client.user("nobody").unwrap_err();
    assert!(matches!(err, ApiError::Api(ref m) if m == "User not found"));

    // Step 4: token management.
    let tokens = client.tokens().unwrap();
    assert_eq!(tokens.as_array().unwrap().len(), 1);
    assert_eq!(client.token(&token_id).unwrap()["id"], token_id.as_str());
    let extended = client.extend_token(&token_id).unwrap();
    assert_eq!(extended["expires"], "in 2 hours");

    // Step 5: a second token, then delete it.
    let other = client.new_token(EMAIL, PASSWORD, false).unwrap();
    assert!(other["expires"].is_null());
    let other_id = other["id"].as_str().unwrap();
    client.delete_token(other_id).unwrap();
    let err = client.token(other_id).unwrap_err();
    assert!(err.is_api());
}

#[test]
fn compute_lifecycle() {
    let base = start_server();
    let client = client(&base);
    client.authenticate(EMAIL, PASSWORD).unwrap();

    // Step 1: volumes, with the local type check first.
    let err = client.new_volume("data", 10, ORGANIZATION_ID, "l_raid").unwrap_err();
    assert!(err.is_validation());
    let volume = client
        .new_volume("data", 20_000_000_000, ORGANIZATION_ID, "l_ssd")
        .unwrap();
    let volume_id = volume["id"].as_str().unwrap().to_string();
    assert_eq!(client.volume(&volume_id).unwrap()["volume_type"], "l_ssd");
    assert_eq!(client.volumes().unwrap().as_array().unwrap().len(), 1);

    // Step 2: snapshot the volume and rename it.
    let snapshot = client.new_snapshot("nightly", ORGANIZATION_ID, &volume_id).unwrap();
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();
    let mut renamed = client.snapshot(&snapshot_id).unwrap();
    renamed["name"] = json!("weekly");
    assert_eq!(client.update_snapshot(&renamed).unwrap()["name"], "weekly");
    assert_eq!(client.snapshots().unwrap().as_array().unwrap().len(), 1);

    // Step 3: image from the snapshot.
    let image = client
        .new_image("base", ORGANIZATION_ID, "arm", &snapshot_id)
        .unwrap();
    let image_id = image["id"].as_str().unwrap().to_string();
    let mut image = client.image(&image_id).unwrap();
    image["name"] = json!("base-2");
    assert_eq!(client.update_image(&image).unwrap()["name"], "base-2");
    assert_eq!(client.images().unwrap().as_array().unwrap().len(), 1);

    // Step 4: server create, update, power on.
    let volumes = json!({ "0": { "id": volume_id } });
    let server = client
        .new_server("web", ORGANIZATION_ID, &image_id, &volumes, &["prod"])
        .unwrap();
    let server_id = server["id"].as_str().unwrap().to_string();
    assert_eq!(server["tags"], json!(["prod"]));

    let mut server = client.server(&server_id).unwrap();
    server["name"] = json!("api");
    assert_eq!(client.update_server(&server).unwrap()["name"], "api");

    let actions = client.server_actions(&server_id).unwrap();
    assert!(actions.as_array().unwrap().contains(&json!("poweron")));
    let task = client.server_action(&server_id, "poweron").unwrap();
    assert_eq!(task["status"], "pending");
    assert_eq!(client.server(&server_id).unwrap()["state"], "running");

    // Step 5: IPs.
    let ip = client.new_ip(ORGANIZATION_ID).unwrap();
    let ip_id = ip["id"].as_str().unwrap().to_string();
    let address = ip["address"].as_str().unwrap().to_string();
    let remapped = client
        .remap_ip(&ip_id, &address, &server_id, ORGANIZATION_ID)
        .unwrap();
    assert_eq!(remapped["server"]["id"], server_id.as_str());
    assert_eq!(client.ip(&ip_id).unwrap()["address"], address.as_str());
    assert_eq!(client.ips().unwrap().as_array().unwrap().len(), 1);

    // Step 6: tear everything down.
    client.delete_ip(&ip_id).unwrap();
    client.delete_server(&server_id).unwrap();
    client.delete_image(&image_id).unwrap();
    client.delete_snapshot(&snapshot_id).unwrap();
    client.delete_volume(&volume_id).unwrap();

    // Step 7: lookups now report the remote message.
    let err = client.server(&server_id).unwrap_err();
    assert!(matches!(err, ApiError::Api(ref m) if m.contains("not found")));

    // Step 8: deleting twice surfaces the bare status, the body is not read.
    let err = client.delete_volume(&volume_id).unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 404 }));
    assert!(client.servers().unwrap().as_array().unwrap().is_empty());
}

#[test]
fn unsupported_method_never_reaches_the_server() {
    let base = start_server();
    let client = client(&base);
    let err = client
        .request(&format!("{base}/servers"), None, "TRACE")
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.to_string(), "Unsupported method TRACE");
}

#[test]
fn non_json_body_is_a_decode_error() {
    let base = start_server();
    let client = client(&base);
    client.authenticate(EMAIL, PASSWORD).unwrap();

    // axum answers unknown routes with an empty 404 body.
    let err = client
        .request(&format!("{base}/no-such-route"), None, "GET")
        .unwrap_err();
    assert!(err.is_decode(), "unexpected error: {err:?}");
}
