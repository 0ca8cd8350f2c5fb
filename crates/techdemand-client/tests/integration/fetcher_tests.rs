use std::time::Duration;

use techdemand_client::ReqwestFetcher;
use techdemand_core::error::AppError;
use techdemand_core::traits::Fetcher;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::counts_body;

#[tokio::test]
async fn fetches_body_with_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/vacancy"))
        .and(header("user-agent", "techdemand-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(counts_body(306)))
        .mount(&server)
        .await;

    let fetcher =
        ReqwestFetcher::with_options(Duration::from_secs(2), "techdemand-test/1.0").unwrap();
    let body = fetcher
        .fetch(&format!("{}/search/vacancy?text=golang&area=1", server.uri()))
        .await
        .unwrap();

    assert!(body.contains(r#""value":306,"#));
}

#[tokio::test]
async fn server_error_is_retryable_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(2)).unwrap();
    let err = fetcher.fetch(&server.uri()).await.unwrap_err();

    assert!(matches!(err, AppError::HttpStatus { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn not_found_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(2)).unwrap();
    let err = fetcher.fetch(&server.uri()).await.unwrap_err();

    assert!(matches!(err, AppError::HttpStatus { status: 404, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(counts_body(1))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(1)).unwrap();
    let err = fetcher.fetch(&server.uri()).await.unwrap_err();

    assert!(
        matches!(err, AppError::Timeout(after) if after == Duration::from_secs(1)),
        "got {err:?}"
    );
    assert!(err.is_retryable());
}
