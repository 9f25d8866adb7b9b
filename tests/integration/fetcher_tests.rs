//! Fetcher tests against a mock HTTP server

use std::time::{Duration, Instant};

use loupe::crawler::{CancellationToken, Fetcher};
use loupe::FetchError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{article, test_fetch_settings};

#[tokio::test]
async fn test_fetch_html_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/article"))
        .and(header("user-agent", "TestAgent/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article("Hello", 200, &[]), "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(test_fetch_settings()).expect("Failed to build fetcher");
    let url = format!("{}/article", mock_server.uri());
    let page = fetcher
        .fetch(&url, &CancellationToken::new())
        .await
        .expect("Fetch failed");

    assert_eq!(page.status_code, 200);
    assert_eq!(page.final_url, url);
    assert_eq!(page.redirects, 0);
    assert!(page.content_type.starts_with("text/html"));
    assert!(page.body.contains("<title>Hello</title>"));
}

#[tokio::test]
async fn test_fetch_http_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(test_fetch_settings()).unwrap();
    let result = fetcher
        .fetch(&format!("{}/missing", mock_server.uri()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::HttpStatus { status: 404, .. })));
}

#[tokio::test]
async fn test_fetch_rejects_non_html() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"a": 1}"#, "application/json"))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(test_fetch_settings()).unwrap();
    let result = fetcher
        .fetch(&format!("{}/data.json", mock_server.uri()), &CancellationToken::new())
        .await;

    match result {
        Err(FetchError::UnsupportedContentType { content_type, .. }) => {
            assert_eq!(content_type, "application/json");
        }
        other => panic!("Expected UnsupportedContentType, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_rejects_oversized_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("x".repeat(8 * 1024), "text/html"))
        .mount(&mock_server)
        .await;

    let mut settings = test_fetch_settings();
    settings.max_body_bytes = 1024;
    let fetcher = Fetcher::new(settings).unwrap();
    let result = fetcher
        .fetch(&format!("{}/huge", mock_server.uri()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::ResponseTooLarge { limit: 1024, .. })));
}

/// Serves one HTML response whose length is only known when the connection closes
async fn serve_without_content_length(body_len: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\nconnection: close\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&vec![b'a'; body_len]).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}/unsized", addr)
}

#[tokio::test]
async fn test_fetch_caps_streamed_body_without_length() {
    let url = serve_without_content_length(8 * 1024).await;

    let mut settings = test_fetch_settings();
    settings.max_body_bytes = 1024;
    let fetcher = Fetcher::new(settings).unwrap();
    let result = fetcher.fetch(&url, &CancellationToken::new()).await;

    assert!(matches!(result, Err(FetchError::ResponseTooLarge { limit: 1024, .. })));
}

#[tokio::test]
async fn test_fetch_streams_body_without_length() {
    let url = serve_without_content_length(512).await;

    let mut settings = test_fetch_settings();
    settings.max_body_bytes = 1024;
    let fetcher = Fetcher::new(settings).unwrap();
    let page = fetcher
        .fetch(&url, &CancellationToken::new())
        .await
        .expect("Body under the limit should be accepted");

    assert_eq!(page.body.len(), 512);
}

#[tokio::test]
async fn test_fetch_decodes_declared_charset() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/latin1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=iso-8859-1")
                .set_body_bytes(&b"<html><body><p>Caf\xe9 cr\xe8me</p></body></html>"[..]),
        )
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(test_fetch_settings()).unwrap();
    let page = fetcher
        .fetch(&format!("{}/latin1", mock_server.uri()), &CancellationToken::new())
        .await
        .expect("Fetch failed");

    assert!(page.body.contains("Café crème"));
}

#[tokio::test]
async fn test_fetch_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(article("Slow", 200, &[]), "text/html")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let mut settings = test_fetch_settings();
    settings.timeout = Duration::from_millis(200);
    let fetcher = Fetcher::new(settings).unwrap();

    let started = Instant::now();
    let result = fetcher
        .fetch(&format!("{}/slow", mock_server.uri()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_fetch_follows_redirect() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article("New", 200, &[]), "text/html"))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(test_fetch_settings()).unwrap();
    let page = fetcher
        .fetch(&format!("{}/old", mock_server.uri()), &CancellationToken::new())
        .await
        .expect("Redirect should be followed");

    assert_eq!(page.final_url, format!("{}/new", mock_server.uri()));
    assert_eq!(page.redirects, 1);
}

#[tokio::test]
async fn test_fetch_redirect_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(test_fetch_settings()).unwrap();
    let result = fetcher
        .fetch(&format!("{}/loop", mock_server.uri()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::TooManyRedirects { .. })));

    // The first request plus five followed hops
    let requests = mock_server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 6);
}

#[tokio::test]
async fn test_fetch_aborts_on_cancellation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stall"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(article("Stall", 200, &[]), "text/html")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let mut settings = test_fetch_settings();
    settings.timeout = Duration::from_secs(10);
    let fetcher = Fetcher::new(settings).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = fetcher
        .fetch(&format!("{}/stall", mock_server.uri()), &cancel)
        .await;

    assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
}
