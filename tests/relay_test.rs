//! End-to-end tests for the notification relay.
//!
//! Each test drives the axum router with `oneshot` and stands up a wiremock
//! server in place of the Discord webhook.

mod common;

use anyhow::Result;
use axum::http::{StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header as header_matcher, method, path},
};

use common::*;

async fn discord(status: u16, expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(WEBHOOK_PATH))
        .and(header_matcher("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

async fn forwarded_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.body_json::<Value>().expect("forwarded body should be JSON"))
        .collect()
}

/// An authorized notification is forwarded once with the configured color,
/// and Discord's 204 comes back unchanged.
#[tokio::test]
async fn relays_authorized_notification() -> Result<()> {
    let server = discord(204, 1).await;
    let app = router(config(&server.uri(), false));

    let payload = notification().to_string();
    let response = app.oneshot(notify_request("/notify", &payload, None)).await?;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(body_string(response).await, "");

    let bodies = forwarded_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let embed = &bodies[0]["embeds"][0];
    assert_eq!(bodies[0]["username"], "Travis CI");
    assert_eq!(embed["color"], PASSED_COLOR);
    assert_eq!(embed["title"], "Fix bug");
    assert_eq!(embed["description"], "Second line\nThird line");
    assert_eq!(embed["url"], "");
    assert_eq!(embed["timestamp"], "2024-05-01T10:05:00Z");
    assert_eq!(
        embed["author"]["icon_url"],
        "https://travis-ci.com/images/logos/TravisCI-Mascot-blue.png"
    );
    assert_eq!(
        embed["fields"][0]["value"],
        "[`62aae5f`](https://github.com/octocat/hello-world/compare/a...b)"
    );
    Ok(())
}

/// The `/webhook` route is an alias of `/notify`.
#[tokio::test]
async fn webhook_alias_relays() -> Result<()> {
    let server = discord(204, 1).await;
    let app = router(config(&server.uri(), false));

    let payload = notification().to_string();
    let response = app.oneshot(notify_request("/webhook", &payload, None)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    Ok(())
}

/// Status keywords are matched case-insensitively against the color table,
/// and pending builds carry their start time.
#[tokio::test]
async fn pending_build_uses_start_time_and_pending_color() -> Result<()> {
    let server = discord(204, 1).await;
    let app = router(config(&server.uri(), false));

    let mut payload = notification();
    payload["status_message"] = "PENDING".into();
    payload["finished_at"] = Value::Null;
    let response = app
        .oneshot(notify_request("/notify", &payload.to_string(), None))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let bodies = forwarded_bodies(&server).await;
    let embed = &bodies[0]["embeds"][0];
    assert_eq!(embed["color"], PENDING_COLOR);
    assert_eq!(embed["timestamp"], "2024-05-01T10:00:00Z");
    assert_eq!(
        embed["author"]["icon_url"],
        "https://travis-ci.com/images/logos/TravisCI-Mascot-grey.png"
    );
    Ok(())
}

/// Pull request builds link to the pull request on GitHub.
#[tokio::test]
async fn pull_request_build_links_pull_request() -> Result<()> {
    let server = discord(204, 1).await;
    let app = router(config(&server.uri(), false));

    let mut payload = notification();
    payload["pull_request"] = true.into();
    payload["pull_request_number"] = 17.into();
    app.oneshot(notify_request("/notify", &payload.to_string(), None))
        .await?;

    let bodies = forwarded_bodies(&server).await;
    assert_eq!(
        bodies[0]["embeds"][0]["url"],
        "https://github.com/octocat/hello-world/pull/17"
    );
    Ok(())
}

/// Discord's own errors are passed through, not turned into relay errors.
#[tokio::test]
async fn discord_error_passes_through() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(WEBHOOK_PATH))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("x-ratelimit-limit", "5")
                .set_body_raw(r#"{"message":"Invalid Form Body","code":50035}"#, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let app = router(config(&server.uri(), false));

    let payload = notification().to_string();
    let response = app.oneshot(notify_request("/notify", &payload, None)).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(
        body_string(response).await,
        r#"{"message":"Invalid Form Body","code":50035}"#
    );
    Ok(())
}

/// Unknown owners get 401 and nothing is forwarded, even when the rest of
/// the payload is unusable.
#[tokio::test]
async fn unauthorized_owner_is_rejected() -> Result<()> {
    let server = discord(204, 0).await;
    let app = router(config(&server.uri(), false));

    let payload = r#"{"repository":{"owner_name":"mallory"}}"#;
    let response = app.oneshot(notify_request("/notify", payload, None)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "");
    assert!(forwarded_bodies(&server).await.is_empty());
    Ok(())
}

/// A status with no color is a server error and nothing is forwarded.
#[tokio::test]
async fn unmapped_status_returns_error_page() -> Result<()> {
    let server = discord(204, 0).await;
    let app = router(config(&server.uri(), false));

    let mut payload = notification();
    payload["status_message"] = "Errored".into();
    let response = app
        .oneshot(notify_request("/notify", &payload.to_string(), None))
        .await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()?
            .starts_with("text/html")
    );
    let body = body_string(response).await;
    assert!(body.contains("<pre>No color configured for status 'errored'</pre>"));
    Ok(())
}

/// Missing fields are reported by name.
#[tokio::test]
async fn missing_field_returns_error_page() -> Result<()> {
    let server = discord(204, 0).await;
    let app = router(config(&server.uri(), false));

    let mut payload = notification();
    payload.as_object_mut().expect("object").remove("branch");
    let response = app
        .oneshot(notify_request("/notify", &payload.to_string(), None))
        .await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("missing field 'branch'"));
    Ok(())
}

/// A body that is not JSON, or a form without `payload`, is a server error.
#[tokio::test]
async fn malformed_requests_return_error_page() -> Result<()> {
    let server = discord(204, 0).await;
    let app = router(config(&server.uri(), false));

    let response = app
        .clone()
        .oneshot(notify_request("/notify", "{not json", None))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/notify")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(axum::body::Body::from("other=1"))?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

/// A transport failure reaching Discord is a server error.
#[tokio::test]
async fn unreachable_discord_returns_error_page() -> Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let uri = format!("http://{}", listener.local_addr()?);
    drop(listener);
    let app = router(config(&uri, false));

    let payload = notification().to_string();
    let response = app.oneshot(notify_request("/notify", &payload, None)).await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("Forwarding to Discord failed"));
    Ok(())
}

#[tokio::test]
async fn root_answers() -> Result<()> {
    let app = router(config("http://127.0.0.1:1", false));
    let request = axum::http::Request::builder()
        .uri("/")
        .body(axum::body::Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
