//! Integration tests for the onboarding REST surface.
//!
//! Each test spins up an Axum server on a random port backed by in-memory
//! stores, then drives it with reqwest the way the check-in page does.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use guest_checkin::access::InMemoryAccessGate;
use guest_checkin::config::AppConfig;
use guest_checkin::images::{BlobStore, InMemoryBlobStore, StorageImagePipeline};
use guest_checkin::onboarding::SessionRegistry;
use guest_checkin::server::{Backends, build_router};
use guest_checkin::store::{InMemoryDirectory, InMemoryLedger};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct TestServer {
    base: String,
    client: reqwest::Client,
    directory: Arc<InMemoryDirectory>,
    ledger: Arc<InMemoryLedger>,
}

/// Start an Axum server on a random port with in-memory backends.
async fn start_server() -> TestServer {
    let config = AppConfig {
        profile_image_size: 64,
        image_upload_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let directory = Arc::new(InMemoryDirectory::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
    let backends = Backends {
        directory: directory.clone(),
        ledger: ledger.clone(),
        access: Arc::new(InMemoryAccessGate::new()),
        images: Arc::new(StorageImagePipeline::new(
            blobs.clone(),
            directory.clone(),
            config.profile_image_size,
        )),
        blobs: Some(blobs),
    };
    let sessions = Arc::new(SessionRegistry::new(
        backends.flow_services(&config),
        config.session_idle_timeout,
    ));
    let app = build_router(&backends, sessions, &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        directory,
        ledger,
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    /// Start a session and return its id.
    async fn start_session(&self) -> String {
        let (status, json) = self.post("/api/onboarding/sessions", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        json["data"]["session_id"].as_str().unwrap().to_string()
    }

    async fn step(&self, session: &str, action: &str, body: Value) -> (StatusCode, Value) {
        self.post(&format!("/api/onboarding/sessions/{session}/{action}"), body)
            .await
    }
}

/// Helper: a small PNG.
fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height))
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn personal_info() -> Value {
    json!({
        "first_name": "Maya",
        "last_name": "Lopez",
        "email": "maya@example.com",
        "github_url": "https://github.com/maya",
        "x_handle": "@maya"
    })
}

fn answers() -> Value {
    json!({
        "why_here": "Cowork with friends",
        "working_on": "A modular synth",
        "where_from": "Oakland"
    })
}

// ── New guest ────────────────────────────────────────────────────────

#[tokio::test]
async fn new_guest_checks_in_with_picture() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let session = server.start_session().await;

        let (_, json) = server.step(&session, "first-time", json!({})).await;
        assert_eq!(json["data"]["step"], "rules");
        assert_eq!(json["data"]["show_progress"], true);

        let (_, json) = server.step(&session, "rules", json!({"agreed": true})).await;
        assert_eq!(json["data"]["step"], "personal-info");

        let (_, json) = server.step(&session, "personal-info", personal_info()).await;
        assert_eq!(json["data"]["step"], "profile-picture");
        assert_eq!(json["data"]["draft"]["first_name"], "Maya");
        assert!(json["data"]["draft"].get("email").is_none());

        let part = Part::bytes(png(40, 30))
            .file_name("me.png")
            .mime_str("image/png")
            .unwrap();
        let resp = server
            .client
            .post(format!(
                "{}/api/onboarding/sessions/{session}/picture",
                server.base
            ))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["data"]["step"], "profile-questions");
        assert_eq!(json["data"]["has_picture"], true);

        let (status, json) = server.step(&session, "questions", answers()).await;
        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["step"], "complete");
        assert_eq!(data["progress"], 100.0);
        assert!(data["visit_id"].is_string());
        let image_url = data["draft"]["image_url"].as_str().unwrap().to_string();
        assert!(image_url.starts_with("/api/profile-image/"));

        assert_eq!(server.directory.create_calls(), 1);
        assert_eq!(server.ledger.create_calls(), 1);

        // The stored picture is served back as a square JPEG.
        let resp = server
            .client
            .get(format!("{}{image_url}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "image/jpeg");
        let bytes = resp.bytes().await.unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));

        // The presence list shows the new guest as checked in, without email.
        let (_, json) = server.get("/api/guests").await;
        let guests = json["data"].as_array().unwrap();
        assert_eq!(guests.len(), 1);
        assert_eq!(guests[0]["first_name"], "Maya");
        assert_eq!(guests[0]["is_active"], true);
        assert_eq!(guests[0]["image_url"], image_url.as_str());
        assert!(guests[0].get("email").is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn double_submit_creates_one_guest_and_one_visit() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let session = server.start_session().await;
        server.step(&session, "first-time", json!({})).await;
        server.step(&session, "rules", json!({"agreed": true})).await;
        server.step(&session, "personal-info", personal_info()).await;
        server.step(&session, "picture/skip", json!({})).await;

        let (a, b) = tokio::join!(
            server.step(&session, "questions", answers()),
            server.step(&session, "questions", answers()),
        );
        assert!(a.0.is_success() || b.0.is_success());
        let (_, again) = server.step(&session, "questions", answers()).await;
        assert_eq!(again["data"]["step"], "complete");

        assert_eq!(server.directory.create_calls(), 1);
        assert_eq!(server.ledger.create_calls(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn consent_and_names_are_enforced() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let session = server.start_session().await;
        server.step(&session, "first-time", json!({})).await;

        let (status, json) = server.step(&session, "rules", json!({"agreed": false})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["success"], false);
        let (_, json) = server
            .get(&format!("/api/onboarding/sessions/{session}"))
            .await;
        assert_eq!(json["data"]["step"], "rules");

        server.step(&session, "rules", json!({"agreed": true})).await;
        let (status, _) = server
            .step(
                &session,
                "personal-info",
                json!({"first_name": "Jo", "last_name": ""}),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (_, json) = server
            .get(&format!("/api/onboarding/sessions/{session}"))
            .await;
        assert_eq!(json["data"]["step"], "personal-info");
        assert_eq!(json["data"]["field_errors"][0]["field"], "last_name");

        assert_eq!(server.directory.create_calls(), 0);
        assert_eq!(server.ledger.create_calls(), 0);
    })
    .await
    .expect("test timed out");
}

// ── Returning guest ──────────────────────────────────────────────────

#[tokio::test]
async fn returning_guest_checks_in_and_out() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        server.directory.seed("Alex", "Chen").await;
        let sam = server.directory.seed("Sam", "Alvarez").await;
        server.directory.seed("Maya", "Lopez").await;

        let session = server.start_session().await;
        let (_, json) = server.step(&session, "returning", json!({})).await;
        assert_eq!(json["data"]["step"], "returning-check");
        assert_eq!(json["data"]["progress"], 0.0);

        let (_, json) = server
            .get(&format!("/api/onboarding/sessions/{session}/search?q=al"))
            .await;
        assert_eq!(json["data"]["outcome"], "matches");
        let names: Vec<&str> = json["data"]["guests"]
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["first_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Sam", "Alex"]);

        let (status, json) = server
            .step(&session, "select", json!({"guest_id": sam.id}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["step"], "complete");
        assert_eq!(json["data"]["is_returning"], true);
        assert_eq!(json["data"]["previous_visits"], 0);
        let visit_id = json["data"]["visit_id"].as_str().unwrap().to_string();

        assert_eq!(server.directory.create_calls(), 0);
        assert_eq!(server.ledger.create_calls(), 1);
        assert_eq!(server.directory.list_calls(), 1);

        let (_, json) = server.get("/api/guests").await;
        assert_eq!(json["data"][0]["first_name"], "Sam");
        assert_eq!(json["data"][0]["is_active"], true);

        let (status, json) = server
            .post(&format!("/api/visits/{visit_id}/checkout"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["data"]["checkout_at"].is_string());

        let (_, json) = server.get("/api/guests").await;
        let active = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|g| g["is_active"] == true)
            .count();
        assert_eq!(active, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn not_found_search_starts_new_profile() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        server.directory.seed("Alex", "Chen").await;

        let session = server.start_session().await;
        server.step(&session, "returning", json!({})).await;

        let (_, json) = server
            .get(&format!(
                "/api/onboarding/sessions/{session}/search?q=Priya%20Singh"
            ))
            .await;
        assert_eq!(json["data"]["outcome"], "not_found");
        assert_eq!(json["data"]["first_name"], "Priya");
        assert_eq!(json["data"]["last_name"], "Singh");

        let (_, json) = server
            .step(&session, "not-found", json!({"query": "Priya Singh"}))
            .await;
        assert_eq!(json["data"]["step"], "rules");
        assert_eq!(json["data"]["draft"]["first_name"], "Priya");
        assert_eq!(json["data"]["draft"]["last_name"], "Singh");

        // Search belongs to the returning-check step only.
        let (status, json) = server
            .get(&format!("/api/onboarding/sessions/{session}/search?q=al"))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["success"], false);
    })
    .await
    .expect("test timed out");
}

// ── Session lifecycle ────────────────────────────────────────────────

#[tokio::test]
async fn back_restart_and_leave() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let session = server.start_session().await;
        server.step(&session, "first-time", json!({})).await;
        server.step(&session, "rules", json!({"agreed": true})).await;

        let (_, json) = server.step(&session, "back", json!({})).await;
        assert_eq!(json["data"]["step"], "rules");

        let (_, json) = server.step(&session, "restart", json!({})).await;
        assert_eq!(json["data"]["step"], "welcome");

        let (status, _) = server.step(&session, "back", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let resp = server
            .client
            .delete(format!("{}/api/onboarding/sessions/{session}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let (status, _) = server
            .get(&format!("/api/onboarding/sessions/{session}"))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    })
    .await
    .expect("test timed out");
}

// ── Profile image endpoint ───────────────────────────────────────────

#[tokio::test]
async fn profile_image_upload_checks_input() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let guest = server.directory.seed("Alex", "Chen").await;
        let url = format!("{}/api/profile-image", server.base);

        let part = Part::bytes(png(8, 8)).file_name("a.png").mime_str("image/png").unwrap();
        let resp = server
            .client
            .post(&url)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["error"], "No homie ID provided");

        let part = Part::bytes(b"GIF89a".to_vec())
            .file_name("a.gif")
            .mime_str("image/gif")
            .unwrap();
        let resp = server
            .client
            .post(&url)
            .multipart(
                Form::new()
                    .part("file", part)
                    .text("homieId", guest.id.to_string()),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let part = Part::bytes(png(20, 10)).file_name("a.png").mime_str("image/png").unwrap();
        let resp = server
            .client
            .post(&url)
            .multipart(
                Form::new()
                    .part("file", part)
                    .text("homieId", guest.id.to_string()),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = resp.json().await.unwrap();
        let stored = json["data"]["url"].as_str().unwrap();
        assert!(stored.starts_with(&format!("/api/profile-image/{}_", guest.id)));
        assert!(stored.ends_with(".jpg"));
        assert_eq!(server.directory.update_calls(), 1);
    })
    .await
    .expect("test timed out");
}
