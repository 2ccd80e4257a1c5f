use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt as _;

use super::runtime;

#[tokio::test]
#[tracing_test::traced_test]
async fn test_client_drop_during_delay() {
    let runtime = runtime::spawn_with_args(&[]).await;

    let mut stream = runtime.connect().await;
    stream
        .write_all(b"GET /delay/200 HTTP/1.1\r\nhost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(stream);

    // give the abandoned timer the chance to fire
    tokio::time::sleep(Duration::from_millis(300)).await;

    let resp = runtime.send("GET", "/status/204", &[]).await;
    assert_eq!(resp.status, 204);
    assert!(!logs_contain("request failed"));
}

#[tokio::test]
async fn test_chunked_body_over_limit() {
    let runtime = runtime::spawn_with_args(&["--max-body-size", "16"]).await;

    let resp = runtime
        .send_chunked("POST", "/logged/200", &["0123456789", "0123456789", "0123456789"])
        .await;
    assert_eq!(resp.status, 413);

    let resp = runtime
        .send_chunked("POST", "/logged/200", &["01234567", "89abcdef"])
        .await;
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_concurrent_delays_do_not_block_each_other() {
    let runtime = runtime::spawn_with_args(&[]).await;

    let timed = |path: &'static str| {
        let runtime = runtime.clone();
        async move {
            let start = Instant::now();
            let resp = runtime.send("GET", path, &[]).await;
            (resp, start.elapsed())
        }
    };

    let ((slow, slow_elapsed), (fast, fast_elapsed)) =
        tokio::join!(timed("/delay/400"), timed("/status/201"));
    assert_eq!(slow.status, 200);
    assert_eq!(fast.status, 201);
    assert!(slow_elapsed >= Duration::from_millis(400));
    assert!(fast_elapsed < Duration::from_millis(400), "{fast_elapsed:?}");
}
