use axum::http::{header, Request, StatusCode};
use axum::body::Body;
use chrono::{Duration, Utc};
use navguard_backend::{
    models::{device::DeviceStatus, pattern::NewPattern},
    repositories::{device as device_repo, pattern as pattern_repo},
    services::notifier::NotificationEvent,
};
use navguard_policy::{Decision, PatternKind, PatternSnapshot, Policy};
use serde_json::json;

mod support;

use support::{body_json, body_text, device_request, seed_device, TestApp};

async fn add_pattern(app: &TestApp, device_id: navguard_backend::types::DeviceId, pattern: &str, kind: PatternKind) {
    pattern_repo::insert_pattern(
        app.pool(),
        &NewPattern {
            device_id,
            pattern: pattern.into(),
            kind,
            expires_at: None,
        },
        Utc::now(),
    )
    .await
    .expect("insert pattern");
}

#[tokio::test]
async fn patterns_require_a_valid_device_token() {
    let app = TestApp::new().await;

    let response = app
        .send(Request::get("/api/patterns").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::get("/api/patterns")
                .header(header::AUTHORIZATION, "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn denied_host_is_blocked_and_others_allowed() {
    let app = TestApp::new().await;
    let device = seed_device(app.pool(), "laptop").await;
    let other = seed_device(app.pool(), "tablet").await;
    add_pattern(&app, device.id, "bad.com/*", PatternKind::Deny).await;
    add_pattern(&app, other.id, "good.com/*", PatternKind::Deny).await;

    let response = app
        .send(device_request("GET", "/api/patterns", &device, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot: PatternSnapshot =
        serde_json::from_value(body_json(response).await).expect("snapshot shape");
    assert_eq!(snapshot.patterns.len(), 1);
    assert_eq!(snapshot.patterns[0].pattern, "bad.com/*");

    let policy = Policy::from_records(&snapshot.patterns);
    let now = Utc::now();
    assert_eq!(policy.evaluate("http://bad.com/x", now), Decision::Block);
    assert_eq!(policy.evaluate("http://good.com", now), Decision::Allow);
}

#[tokio::test]
async fn disabled_and_expired_patterns_are_not_served() {
    let app = TestApp::new().await;
    let device = seed_device(app.pool(), "laptop").await;
    add_pattern(&app, device.id, "live.example/*", PatternKind::Allow).await;
    add_pattern(&app, device.id, "off.example/*", PatternKind::Allow).await;
    pattern_repo::insert_pattern(
        app.pool(),
        &NewPattern {
            device_id: device.id,
            pattern: "gone.example/*".into(),
            kind: PatternKind::Allow,
            expires_at: Some(Utc::now() - Duration::minutes(1)),
        },
        Utc::now() - Duration::hours(1),
    )
    .await
    .unwrap();
    sqlx::query("UPDATE patterns SET enabled = 0 WHERE pattern = 'off.example/*'")
        .execute(app.pool())
        .await
        .unwrap();

    let response = app
        .send(device_request("GET", "/api/patterns", &device, None))
        .await;
    let body = body_json(response).await;
    let patterns = body["patterns"].as_array().unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0]["pattern"], "live.example/*");
    assert_eq!(patterns[0]["type"], "allow");
}

#[tokio::test]
async fn access_request_derives_pattern_and_notifies() {
    let mut app = TestApp::new().await;
    let device = seed_device(app.pool(), "kid-laptop").await;

    let response = app
        .send(device_request(
            "POST",
            "/api/requests",
            &device,
            Some(json!({ "url": "https://www.news.example/story/1" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["suggested_pattern"], "www.news.example/*");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["device_name"], "kid-laptop");

    assert_eq!(
        app.drain_events(),
        vec![NotificationEvent::NewRequest {
            device_name: "kid-laptop".into(),
            url: "https://www.news.example/story/1".into(),
        }]
    );
}

#[tokio::test]
async fn access_request_rejects_non_http_urls() {
    let mut app = TestApp::new().await;
    let device = seed_device(app.pool(), "laptop").await;

    let response = app
        .send(device_request(
            "POST",
            "/api/requests",
            &device,
            Some(json!({ "url": "ftp://files.example/a" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.drain_events().is_empty());
}

#[tokio::test]
async fn heartbeat_reactivates_an_inactive_device() {
    let app = TestApp::new().await;
    let device = seed_device(app.pool(), "laptop").await;
    sqlx::query("UPDATE devices SET status = 'inactive', last_seen = NULL WHERE id = ?")
        .bind(device.id)
        .execute(app.pool())
        .await
        .unwrap();

    let response = app
        .send(device_request("POST", "/api/heartbeat", &device, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "success": true, "status": "active" }));

    let stored = device_repo::find_device(app.pool(), device.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DeviceStatus::Active);
    assert!(stored.last_seen.is_some());
}

#[tokio::test]
async fn uninstall_is_idempotent_and_always_succeeds() {
    let mut app = TestApp::new().await;
    let device = seed_device(app.pool(), "tablet").await;

    for _ in 0..2 {
        let response = app
            .send(
                Request::post(format!("/api/uninstall?token={}", device.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "success": true }));
    }

    let response = app
        .send(
            Request::post("/api/uninstall?token=unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(device_request("GET", "/api/uninstall", &device, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("uninstalled"));

    let stored = device_repo::find_device(app.pool(), device.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DeviceStatus::Uninstalled);
    assert_eq!(
        app.drain_events(),
        vec![NotificationEvent::DeviceStatus {
            device_name: "tablet".into(),
            status: DeviceStatus::Uninstalled,
        }]
    );
}

#[tokio::test]
async fn heartbeat_does_not_revive_an_uninstalled_device() {
    let app = TestApp::new().await;
    let device = seed_device(app.pool(), "tablet").await;
    app.state.liveness.mark_uninstalled(device.id).await.unwrap();

    let response = app
        .send(device_request("POST", "/api/heartbeat", &device, None))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["status"], "uninstalled");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new().await;
    let response = app
        .send(
            Request::get("/api/setup/status")
                .header("x-request-id", "client-req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.headers().get("x-request-id").unwrap(), "client-req-123");

    let response = app
        .send(Request::get("/api/setup/status").body(Body::empty()).unwrap())
        .await;
    let generated = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(generated.len(), 16);
}
