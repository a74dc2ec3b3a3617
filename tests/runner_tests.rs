//! Integration tests for the sequential request runner.
//!
//! A wiremock server stands in for the WebHDFS endpoint; TLS is not involved
//! here, only request shape, timing, classification and batch bookkeeping.

use std::collections::HashSet;
use std::time::Duration;

use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use webhdfs_latency::app::execute_tests;
use webhdfs_latency::client::{build_client, ClientConfig};
use webhdfs_latency::errors::ErrorCategory;
use webhdfs_latency::request::{TestKind, TestSelection};
use webhdfs_latency::runner::{RequestRunner, RunnerConfig};
use webhdfs_latency::stats::calculate_statistics;

fn test_client(timeout: Duration) -> reqwest::Client {
    build_client(&ClientConfig {
        insecure_skip_verify: false,
        client_cert_path: None,
        client_key_path: None,
        request_timeout: timeout,
    })
    .expect("Failed to create HTTP client")
}

fn runner_for(server: &MockServer, file_path: Option<&str>) -> RequestRunner {
    RequestRunner::new(
        test_client(Duration::from_secs(5)),
        RunnerConfig {
            base_url: server.uri(),
            container: "container-1".to_string(),
            file_path: file_path.map(str::to_string),
            max_body_bytes: 1024,
            debug: true,
        },
    )
}

#[tokio::test]
async fn whoami_batch_sends_expected_request_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/webhdfs/v1/"))
        .and(query_param("op", "WHOAMI"))
        .and(header("x-sap-filecontainer", "container-1"))
        .and(header("content-type", "application/json"))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"user":"tester"}"#))
        .expect(6)
        .mount(&server)
        .await;

    let mut runner = runner_for(&server, None);
    let batch = runner.run_batch(TestKind::Identity, 5).await;

    assert_eq!(batch.results.len(), 6, "warmup plus five measured requests");
    assert!(batch.results[0].is_warmup);
    assert!(batch.results[1..].iter().all(|r| !r.is_warmup));
    assert_eq!(batch.successful_requests, 5);
    assert!(batch.warmup_duration_ms.is_some());
    assert_eq!(
        batch.results[1].response_body.as_deref(),
        Some(r#"{"user":"tester"}"#)
    );
    assert!(batch.results.iter().all(|r| r.test_kind == TestKind::Identity));
}

#[tokio::test]
async fn file_fetch_uses_open_operation_on_configured_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/webhdfs/v1/landing/data.csv"))
        .and(query_param("op", "OPEN"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a,b,c\n1,2,3\n"))
        .expect(3)
        .mount(&server)
        .await;

    let mut runner = runner_for(&server, Some("/landing/data.csv"));
    let batch = runner.run_batch(TestKind::FileFetch, 2).await;

    assert_eq!(batch.successful_requests, 2);
    assert_eq!(batch.results[2].status_code, Some(200));
}

#[tokio::test]
async fn request_ids_are_unique_within_a_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut runner = runner_for(&server, None);
    let batch = runner.run_batch(TestKind::Identity, 50).await;

    let ids: HashSet<&str> = batch.results.iter().map(|r| r.request_id.as_str()).collect();
    assert_eq!(ids.len(), batch.results.len());
}

#[tokio::test]
async fn non_2xx_statuses_are_failures_with_status_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let mut runner = runner_for(&server, None);
    let batch = runner.run_batch(TestKind::Identity, 3).await;

    assert_eq!(batch.successful_requests, 0);
    for result in &batch.results {
        assert!(!result.success);
        assert_eq!(result.status_code, Some(403));
        assert_eq!(result.response_body.as_deref(), Some("forbidden"));
        assert_eq!(
            result.error.as_ref().map(|e| e.category),
            Some(ErrorCategory::ClientError)
        );
    }

    let stats = calculate_statistics(&batch);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.total_requests, 3);
    assert!(stats.mean_ms.is_none());
}

#[tokio::test]
async fn redirects_are_not_followed_and_count_as_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(307).insert_header("location", "https://datanode.example.com/"),
        )
        .mount(&server)
        .await;

    let mut runner = runner_for(&server, Some("/x"));
    let result = runner.execute(TestKind::FileFetch, false).await;

    assert!(!result.success);
    assert_eq!(result.status_code, Some(307));
    assert_eq!(
        result.error.map(|e| e.category),
        Some(ErrorCategory::RedirectError)
    );
}

#[tokio::test]
async fn slow_responses_time_out_without_status_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;

    let mut runner = RequestRunner::new(
        test_client(Duration::from_millis(200)),
        RunnerConfig {
            base_url: server.uri(),
            container: "container-1".to_string(),
            file_path: None,
            max_body_bytes: 1024,
            debug: false,
        },
    );
    let result = runner.execute(TestKind::Identity, false).await;

    assert!(!result.success);
    assert_eq!(result.status_code, None);
    assert_eq!(
        result.error.map(|e| e.category),
        Some(ErrorCategory::TimeoutError)
    );
    // Duration runs up to the point of failure, not the server delay.
    assert!(result.duration_ms >= 150.0, "duration {}", result.duration_ms);
    assert!(result.duration_ms < 1500.0, "duration {}", result.duration_ms);
}

#[tokio::test]
async fn failed_warmup_does_not_affect_measured_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut runner = runner_for(&server, None);
    let batch = runner.run_batch(TestKind::Identity, 4).await;

    assert!(!batch.results[0].success);
    assert!(batch.results[0].is_warmup);
    assert_eq!(batch.successful_requests, 4);

    let stats = calculate_statistics(&batch);
    assert_eq!(stats.success_rate, 100.0);
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.warmup_duration_ms, Some(batch.results[0].duration_ms));
}

#[tokio::test]
async fn response_bodies_are_truncated_but_fully_read() {
    let server = MockServer::start().await;
    let big = "x".repeat(10_000);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(big))
        .mount(&server)
        .await;

    let mut runner = RequestRunner::new(
        test_client(Duration::from_secs(5)),
        RunnerConfig {
            base_url: server.uri(),
            container: "container-1".to_string(),
            file_path: Some("big.bin".to_string()),
            max_body_bytes: 16,
            debug: false,
        },
    );
    let result = runner.execute(TestKind::FileFetch, false).await;

    assert!(result.success);
    assert_eq!(result.response_body.map(|b| b.len()), Some(16));
}

#[tokio::test]
async fn both_selection_reports_each_kind_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("op", "WHOAMI"))
        .respond_with(ResponseTemplate::new(200))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("op", "OPEN"))
        .respond_with(ResponseTemplate::new(404))
        .expect(4)
        .mount(&server)
        .await;

    let mut runner = runner_for(&server, Some("/missing.txt"));
    let stats = execute_tests(&mut runner, TestSelection::Both, 3).await;

    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].test_kind, TestKind::Identity);
    assert_eq!(stats[0].success_rate, 100.0);
    assert_eq!(stats[1].test_kind, TestKind::FileFetch);
    assert_eq!(stats[1].success_rate, 0.0);
    assert_eq!(
        stats[1].errors_by_category.get("client_error"),
        Some(&3)
    );
}
