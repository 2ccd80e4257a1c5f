use std::time::{Duration, Instant};

use super::runtime;

#[tokio::test]
async fn test_root_x_status() {
    let runtime = runtime::spawn_with_args(&[]).await;

    let resp = runtime.send("GET", "/", &[("x-status", "503")]).await;
    assert_eq!(resp.status, 503);
    assert_eq!(resp.body, "{}");
    assert_eq!(
        resp.header("server"),
        Some(postbin_lib::utils::env::server_identifier())
    );
}

#[tokio::test]
async fn test_delay_timing_lower_bound() {
    let runtime = runtime::spawn_with_args(&[]).await;

    let start = Instant::now();
    let resp = runtime.send("POST", "/delay/100", &[]).await;
    assert_eq!(resp.status, 200);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_token_then_auth_timeout() {
    let runtime = runtime::spawn_with_args(&["--profile", "extended"]).await;

    let resp = runtime
        .send_with_body(
            "POST",
            "/token",
            &[("content-type", "application/x-www-form-urlencoded")],
            "grant_type=client_credentials&expires_in=3600",
        )
        .await;
    assert_eq!(resp.status, 200);
    let body: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(body["expires_in"], "3600");
    let token = body["access_token"].as_str().unwrap().to_owned();

    let bearer = format!("Bearer {token}");
    let resp = runtime
        .send(
            "GET",
            "/status/202?authTimeout=60000",
            &[("authorization", bearer.as_str())],
        )
        .await;
    assert_eq!(resp.status, 202);

    let resp = runtime.send("GET", "/status/202?authTimeout=60000", &[]).await;
    assert_eq!(resp.status, 400);
}

#[tokio::test]
async fn test_pipeline_override_flag() {
    let runtime = runtime::spawn_with_args(&["--pipeline", "root=bad-responses"]).await;

    let resp = runtime.send("GET", "/?badResponses=418:1", &[]).await;
    assert_eq!(resp.status, 418);
    assert!(resp.body.is_empty());
}

#[tokio::test]
async fn test_lenient_token_flag() {
    let runtime = runtime::spawn_with_args(&["--token-content-type", "lenient"]).await;

    let resp = runtime
        .send_with_body(
            "POST",
            "/token",
            &[("content-type", "application/json")],
            r#"{"grant_type":"client_credentials"}"#,
        )
        .await;
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_unknown_route() {
    let runtime = runtime::spawn_with_args(&[]).await;

    let resp = runtime.send("GET", "/does/not/exist", &[]).await;
    assert_eq!(resp.status, 404);
}
