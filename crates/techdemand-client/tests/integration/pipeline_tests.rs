use std::time::Duration;

use chrono::Utc;
use techdemand_client::ReqwestFetcher;
use techdemand_core::error::AppError;
use techdemand_core::output::{OutputFormat, write_report};
use techdemand_core::task::{FailureKind, TaskStatus, build_tasks};
use techdemand_core::{
    AppConfig, Executor, SearchCountsExtractor, TracingRunReporter, build_report,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::{counts_body, market_config, mount_count};

fn executor(config: &AppConfig) -> Executor<ReqwestFetcher, SearchCountsExtractor> {
    let fetcher =
        ReqwestFetcher::with_timeout(config.parser.timeout()).expect("client should build");
    let run_config = config.run_config().expect("run config should be valid");
    Executor::new(fetcher, SearchCountsExtractor, run_config)
}

async fn mount_market(server: &MockServer) {
    mount_count(server, "golang", 1, 306).await;
    mount_count(server, "python", 1, 3181).await;
    mount_count(server, "golang", 2, 4).await;
    mount_count(server, "python", 2, 72).await;
}

#[tokio::test]
async fn full_run_builds_and_writes_report() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_market(&server).await;

    let config = AppConfig::from_yaml_str(&market_config(&server))?;
    config.validate()?;
    let cities = config.enabled_cities();
    let technologies = config.enabled_technologies();

    let tasks = build_tasks(&cities, &technologies);
    assert_eq!(tasks.len(), 4);

    let run = executor(&config)
        .run(tasks, CancellationToken::new(), &TracingRunReporter)
        .await?;
    run.ensure_complete()?;
    assert!(run.tasks.iter().all(|t| t.status == TaskStatus::Resolved));

    let report = build_report(&run.tasks, &cities, &technologies, Utc::now())?;
    assert_eq!(report.city("MOSCOW").map(|c| c.total), Some(3487));
    assert_eq!(report.city("KRASNODAR").map(|c| c.total), Some(76));
    assert!(report.city("SOCHI").is_none());
    assert_eq!(report.summary.get("Golang"), Some(310));
    assert_eq!(report.summary.get("Python"), Some(3253));
    assert_eq!(report.summary.total, 3563);

    let dir = tempfile::tempdir()?;
    let mut output = config.output.clone();
    output.directory = dir.path().to_path_buf();
    output.formats = vec![OutputFormat::Json, OutputFormat::Txt, OutputFormat::Csv];
    let written = write_report(&report, &output)?;
    assert_eq!(written.len(), 3);

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&written[0])?)?;
    assert_eq!(json["summary"]["total"], 3563);
    assert_eq!(json["summary"]["Golang"], 310);
    assert_eq!(json["cities"][0]["vacancies"]["Python"], 3181);
    assert!(json.get("failures").is_none());

    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 4);
    Ok(())
}

#[tokio::test]
async fn zero_count_is_retried_until_positive() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/vacancy"))
        .and(query_param("text", "golang"))
        .and(query_param("area", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(counts_body(0)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_market(&server).await;

    let config = AppConfig::from_yaml_str(&market_config(&server))?;
    let tasks = build_tasks(&config.enabled_cities(), &config.enabled_technologies());
    let run = executor(&config)
        .run(tasks, CancellationToken::new(), &TracingRunReporter)
        .await?;

    let task = run
        .tasks
        .iter()
        .find(|t| t.technology_name == "Golang" && t.city_code == 2)
        .expect("task present");
    assert_eq!(task.status, TaskStatus::Resolved);
    assert_eq!(task.count, 4);
    assert_eq!(task.attempts, 2);
    Ok(())
}

#[tokio::test]
async fn server_error_then_success_recovers() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("text", "python"))
        .and(query_param("area", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_market(&server).await;

    let config = AppConfig::from_yaml_str(&market_config(&server))?;
    let tasks = build_tasks(&config.enabled_cities(), &config.enabled_technologies());
    let run = executor(&config)
        .run(tasks, CancellationToken::new(), &TracingRunReporter)
        .await?;

    run.ensure_complete()?;
    let task = run
        .tasks
        .iter()
        .find(|t| t.technology_name == "Python" && t.city_code == 1)
        .expect("task present");
    assert_eq!(task.count, 3181);
    assert!(task.failure.is_none());
    Ok(())
}

#[tokio::test]
async fn permanent_failure_is_reported_without_aborting_siblings() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("text", "python"))
        .and(query_param("area", "2"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_market(&server).await;

    let config = AppConfig::from_yaml_str(&market_config(&server))?;
    let cities = config.enabled_cities();
    let technologies = config.enabled_technologies();
    let run = executor(&config)
        .run(
            build_tasks(&cities, &technologies),
            CancellationToken::new(),
            &TracingRunReporter,
        )
        .await?;

    let failed: Vec<_> = run.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 1);

    match run.ensure_complete() {
        Err(AppError::FetchFailed {
            failed,
            kind,
            technology,
            city_code,
            ..
        }) => {
            assert_eq!(failed, 1);
            assert_eq!(kind, FailureKind::HttpStatus);
            assert_eq!(technology, "Python");
            assert_eq!(city_code, 2);
        }
        other => panic!("expected FetchFailed, got {other:?}"),
    }

    let report = build_report(&run.tasks, &cities, &technologies, Utc::now())?;
    assert!(report.is_partial());
    assert_eq!(report.count("Python", 2), Some(0));
    assert_eq!(report.summary.total, 306 + 3181 + 4);
    Ok(())
}

#[tokio::test]
async fn single_slot_runs_requests_one_at_a_time() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(counts_body(7))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let yaml = market_config(&server).replace("max_concurrency: 2", "max_concurrency: 1");
    let config = AppConfig::from_yaml_str(&yaml)?;
    let tasks = build_tasks(&config.enabled_cities(), &config.enabled_technologies());

    let started = std::time::Instant::now();
    let run = executor(&config)
        .run(tasks, CancellationToken::new(), &TracingRunReporter)
        .await?;

    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(run.tasks.iter().all(|t| t.count == 7));
    Ok(())
}
