use axum::{body::Body, http::{Request, StatusCode}};
use chrono::{DateTime, Duration, Utc};
use navguard_backend::{models::device::Device, repositories::access_request as request_repo};
use navguard_policy::{Decision, PatternSnapshot, Policy};
use serde_json::json;

mod support;

use support::{admin_request, body_json, device_request, seed_device, seed_session, seed_user, TestApp};

async fn admin_cookie(app: &TestApp) -> String {
    let admin = seed_user(app.pool(), "admin").await;
    seed_session(app.pool(), &admin).await
}

#[tokio::test]
async fn admin_routes_require_a_session() {
    let app = TestApp::new().await;
    let response = app
        .send(Request::get("/api/admin/devices").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(admin_request("GET", "/api/admin/devices", "session=bogus", None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn device_lifecycle_create_list_rotate_delete() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;

    let response = app
        .send(admin_request(
            "POST",
            "/api/admin/devices",
            &cookie,
            Some(json!({ "name": "kid-laptop" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_i64().unwrap();
    let first_token = created["token"].as_str().unwrap().to_string();
    assert_eq!(first_token.len(), 64);
    assert_eq!(created["status"], "active");

    let response = app
        .send(admin_request("GET", "/api/admin/devices", &cookie, None))
        .await;
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["connected"], false);
    assert!(list[0].get("token").is_none());

    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/devices/{}/regenerate-token", id),
            &cookie,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await;
    assert_ne!(rotated["token"].as_str().unwrap(), first_token);

    let stale = Request::get("/api/patterns")
        .header("authorization", format!("Bearer {}", first_token))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(stale).await.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(admin_request("DELETE", &format!("/api/admin/devices/{}", id), &cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .send(admin_request("DELETE", &format!("/api/admin/devices/{}", id), &cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_device_validates_name() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;
    let response = app
        .send(admin_request(
            "POST",
            "/api/admin/devices",
            &cookie,
            Some(json!({ "name": "" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pattern_crud_is_reflected_in_device_snapshot() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;
    let device = seed_device(app.pool(), "laptop").await;

    let response = app
        .send(admin_request(
            "POST",
            "/api/admin/patterns",
            &cookie,
            Some(json!({ "device_id": device.id, "pattern": "  bad.com/*  ", "type": "deny" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let pattern_id = created["id"].as_i64().unwrap();
    assert_eq!(created["pattern"], "bad.com/*");
    assert!(created["expires_at"].is_null());

    let response = app
        .send(admin_request(
            "PUT",
            &format!("/api/admin/patterns/{}", pattern_id),
            &cookie,
            Some(json!({ "pattern": "worse.com/*", "type": "deny", "duration": "30m" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["pattern"], "worse.com/*");
    assert!(updated["expires_at"].is_string());

    let response = app
        .send(admin_request(
            "GET",
            &format!("/api/admin/patterns?device_id={}", device.id),
            &cookie,
            None,
        ))
        .await;
    let listed = body_json(response).await;
    assert_eq!(listed[0]["device_name"], "laptop");
    assert_eq!(listed[0]["type"], "deny");

    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/patterns/{}/toggle", pattern_id),
            &cookie,
            None,
        ))
        .await;
    assert_eq!(body_json(response).await["enabled"], false);

    let snapshot = body_json(
        app.send(device_request("GET", "/api/patterns", &device, None))
            .await,
    )
    .await;
    assert!(snapshot["patterns"].as_array().unwrap().is_empty());

    let response = app
        .send(admin_request(
            "DELETE",
            &format!("/api/admin/patterns/{}", pattern_id),
            &cookie,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/patterns/{}/toggle", pattern_id),
            &cookie,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_patterns_and_durations_are_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;
    let device = seed_device(app.pool(), "laptop").await;

    for body in [
        json!({ "device_id": device.id, "pattern": "   ", "type": "deny" }),
        json!({ "device_id": device.id, "pattern": "a.com/*", "type": "deny", "duration": "2h" }),
        json!({ "device_id": device.id, "pattern": "a.com/*", "type": "deny", "duration": "custom", "custom_minutes": 0 }),
        json!({ "device_id": device.id, "pattern": "a.com/*", "type": "deny", "duration": "custom", "custom_minutes": 1_000_000_000_000i64 }),
    ] {
        let response = app
            .send(admin_request("POST", "/api/admin/patterns", &cookie, Some(body)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .send(admin_request(
            "POST",
            "/api/admin/patterns",
            &cookie,
            Some(json!({ "device_id": 999, "pattern": "a.com/*", "type": "deny" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patterns")
        .fetch_one(app.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn approving_a_request_grants_a_timed_allow_pattern() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;
    let device = seed_device(app.pool(), "kid-laptop").await;
    let request = request_repo::create_request(
        app.pool(),
        device.id,
        "https://news.example/today",
        "news.example/*",
        Utc::now(),
    )
    .await
    .unwrap();

    let before = Utc::now();
    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/requests/{}/approve", request.id),
            &cookie,
            Some(json!({ "pattern": "news.example/*", "type": "allow", "duration": "1h" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["request"]["status"], "approved");
    assert!(body["request"]["resolved_at"].is_string());
    assert_eq!(body["pattern"]["type"], "allow");
    let expires_at: DateTime<Utc> = body["pattern"]["expires_at"].as_str().unwrap().parse().unwrap();
    assert!(expires_at >= before + Duration::hours(1));
    assert!(expires_at <= Utc::now() + Duration::hours(1));

    let snapshot = body_json(
        app.send(device_request("GET", "/api/patterns", &device, None))
            .await,
    )
    .await;
    assert_eq!(snapshot["patterns"][0]["pattern"], "news.example/*");

    // Once the grant lapses it drops out of the served set.
    sqlx::query("UPDATE patterns SET expires_at = ?")
        .bind(Utc::now() - Duration::seconds(1))
        .execute(app.pool())
        .await
        .unwrap();
    let snapshot = body_json(
        app.send(device_request("GET", "/api/patterns", &device, None))
            .await,
    )
    .await;
    assert!(snapshot["patterns"].as_array().unwrap().is_empty());

    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/requests/{}/approve", request.id),
            &cookie,
            Some(json!({ "duration": "1h" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/requests/{}/deny", request.id),
            &cookie,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn approve_without_body_uses_the_suggested_pattern() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;
    let device = seed_device(app.pool(), "laptop").await;
    let request = request_repo::create_request(
        app.pool(),
        device.id,
        "https://docs.example/a",
        "docs.example/*",
        Utc::now(),
    )
    .await
    .unwrap();

    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/requests/{}/approve", request.id),
            &cookie,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pattern"]["pattern"], "docs.example/*");
    assert_eq!(body["pattern"]["type"], "allow");
    assert!(body["pattern"]["expires_at"].is_null());
}

#[tokio::test]
async fn approving_an_oversized_custom_grant_leaves_the_request_pending() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;
    let device = seed_device(app.pool(), "laptop").await;
    let request = request_repo::create_request(
        app.pool(),
        device.id,
        "https://docs.example/a",
        "docs.example/*",
        Utc::now(),
    )
    .await
    .unwrap();

    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/requests/{}/approve", request.id),
            &cookie,
            Some(json!({ "duration": "custom", "custom_minutes": i64::MAX })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let status: String = sqlx::query_scalar("SELECT status FROM access_requests WHERE id = ?")
        .bind(request.id)
        .fetch_one(app.pool())
        .await
        .unwrap();
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn one_click_approval_unblocks_a_www_url() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;
    let device = seed_device(app.pool(), "kid-laptop").await;
    let url = "https://www.bad.com/a";

    // A non-empty allow list blocks everything it does not name.
    let response = app
        .send(admin_request(
            "POST",
            "/api/admin/patterns",
            &cookie,
            Some(json!({ "device_id": device.id, "pattern": "school.example/*", "type": "allow" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    assert_eq!(served_decision(&app, &device, url).await, Decision::Block);

    let response = app
        .send(device_request(
            "POST",
            "/api/requests",
            &device,
            Some(json!({ "url": url })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let filed = body_json(response).await;
    assert_eq!(filed["suggested_pattern"], "www.bad.com/*");

    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/requests/{}/approve", filed["id"]),
            &cookie,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(served_decision(&app, &device, url).await, Decision::Allow);
}

async fn served_decision(app: &TestApp, device: &Device, url: &str) -> Decision {
    let body = body_json(
        app.send(device_request("GET", "/api/patterns", device, None))
            .await,
    )
    .await;
    let snapshot: PatternSnapshot = serde_json::from_value(body).unwrap();
    Policy::from_records(&snapshot.patterns).evaluate(url, Utc::now())
}

#[tokio::test]
async fn denied_requests_filter_by_status() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;
    let device = seed_device(app.pool(), "laptop").await;
    let now = Utc::now();
    let first = request_repo::create_request(app.pool(), device.id, "https://a.example/", "a.example/*", now)
        .await
        .unwrap();
    request_repo::create_request(app.pool(), device.id, "https://b.example/", "b.example/*", now)
        .await
        .unwrap();

    let response = app
        .send(admin_request(
            "POST",
            &format!("/api/admin/requests/{}/deny", first.id),
            &cookie,
            None,
        ))
        .await;
    assert_eq!(body_json(response).await["status"], "denied");

    let pending = body_json(
        app.send(admin_request("GET", "/api/admin/requests?status=pending", &cookie, None))
            .await,
    )
    .await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["url"], "https://b.example/");

    let all = body_json(
        app.send(admin_request("GET", "/api/admin/requests?status=all", &cookie, None))
            .await,
    )
    .await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let response = app
        .send(admin_request("GET", "/api/admin/requests?status=bogus", &cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(admin_request("POST", "/api/admin/requests/999/deny", &cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn users_and_notification_prefs() {
    let app = TestApp::new().await;
    let cookie = admin_cookie(&app).await;

    let response = app
        .send(admin_request(
            "POST",
            "/api/admin/users",
            &cookie,
            Some(json!({ "username": "parent2", "password": "long-enough-pw" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert!(created.get("password_hash").is_none());

    let response = app
        .send(admin_request(
            "POST",
            "/api/admin/users",
            &cookie,
            Some(json!({ "username": "parent2", "password": "long-enough-pw" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let users = body_json(app.send(admin_request("GET", "/api/admin/users", &cookie, None)).await).await;
    assert_eq!(users.as_array().unwrap().len(), 2);

    let prefs = body_json(
        app.send(admin_request("GET", "/api/admin/notifications/prefs", &cookie, None))
            .await,
    )
    .await;
    assert_eq!(prefs, json!({ "notify_new_requests": true, "notify_device_status": true }));

    let prefs = body_json(
        app.send(admin_request(
            "PUT",
            "/api/admin/notifications/prefs",
            &cookie,
            Some(json!({ "notify_device_status": false })),
        ))
        .await,
    )
    .await;
    assert_eq!(prefs, json!({ "notify_new_requests": true, "notify_device_status": false }));
}
