//! HTTP fetcher tests against a mock server

use linkwatch::crawler::{FetchError, Fetcher, HttpFetcher};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new("Mozilla/5.0 (linkwatch tests)", 20)
}

#[tokio::test]
async fn test_redirect_chain_is_recorded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/middle"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/middle"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/new", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>moved</html>"))
        .mount(&server)
        .await;

    let outcome = fetcher()
        .fetch(&format!("{}/old", server.uri()), None, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.status_codes, vec![301, 302, 200]);
    assert_eq!(outcome.redirect_url, Some(format!("{}/new", server.uri())));
    assert_eq!(outcome.body, "<html>moved</html>");
}

#[tokio::test]
async fn test_redirect_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let outcome = HttpFetcher::new("test", 3)
        .fetch(&format!("{}/loop", server.uri()), None, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.status_codes, vec![302, 302, 302, 302]);
}

#[tokio::test]
async fn test_forbidden_is_blocked() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let outcome = fetcher()
        .fetch(&format!("{}/guarded", server.uri()), None, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.status_codes, vec![403]);
    assert!(outcome.is_blocked());
    assert_eq!(outcome.redirect_url, None);
}

#[tokio::test]
async fn test_latin1_body_is_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/latin1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x47, 0x72, 0xFC, 0xDF, 0x65]))
        .mount(&server)
        .await;

    let outcome = fetcher()
        .fetch(&format!("{}/latin1", server.uri()), None, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.body, "Grüße");
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let error = fetcher()
        .fetch(&format!("{}/slow", server.uri()), None, Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::Timeout(_)));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_timeout_covers_the_whole_redirect_chain() {
    let server = MockServer::start().await;

    for (from, to) in [("/hop0", "/hop1"), ("/hop1", "/hop2"), ("/hop2", "/hop3")] {
        Mock::given(method("GET"))
            .and(path(from))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", to)
                    .set_delay(Duration::from_millis(250)),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/hop3"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(250)))
        .mount(&server)
        .await;

    // Every hop fits the budget on its own; the chain does not.
    let error = fetcher()
        .fetch(&format!("{}/hop0", server.uri()), None, Duration::from_millis(600))
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::Timeout(_)));
}

#[tokio::test]
async fn test_refused_connection_is_retryable() {
    let error = fetcher()
        .fetch("http://127.0.0.1:9/", None, Duration::from_secs(2))
        .await
        .unwrap_err();

    assert!(error.is_retryable(), "unexpected error kind: {:?}", error);
}
