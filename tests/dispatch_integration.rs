//! Dispatcher tests against raw-TCP backends and a live relay server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use preview_cron::config::{parse_vercel_json, CronJob, PanelConfig, RelayConfig};
use preview_cron::dispatch::{Dispatcher, JobState};
use preview_cron::http::HttpServer;
use preview_cron::lifecycle::Shutdown;
use preview_cron::relay::{RelayState, UpstreamResponse};

mod common;
use common::{header_value, start_mock_backend, start_programmable_backend, StubReply, StubUpstream};

fn panel(preview_url: String) -> PanelConfig {
    PanelConfig {
        preview_url,
        deploy_protection_token: None,
        custom_headers: None,
    }
}

fn jobs(json: &str) -> Vec<CronJob> {
    parse_vercel_json(json).unwrap()
}

/// An address nothing listens on.
async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A counting backend standing in for the relay.
async fn counting_relay() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (500, "relay should not be called".to_string()) }
    })
    .await;
    (format!("http://{addr}/api/trigger-cron"), hits)
}

#[tokio::test]
async fn test_local_target_is_called_directly() {
    let backend = start_mock_backend(200, "ok").await;
    let (relay_url, relay_hits) = counting_relay().await;

    let dispatcher = Dispatcher::new(panel(format!("http://127.0.0.1:{}", backend.port())), &relay_url)
        .unwrap();
    let outcome = dispatcher.dispatch("/api/cron/ping").await;

    assert!(outcome.success());
    assert_eq!(outcome.message(), "Success: ok");
    assert_eq!(outcome.status_code(), 200);
    assert_eq!(relay_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_local_error_status() {
    let backend = start_mock_backend(503, "down for maintenance").await;
    let dispatcher = Dispatcher::new(
        panel(format!("http://localhost:{}", backend.port())),
        &format!("http://{}/api/trigger-cron", dead_addr().await),
    )
    .unwrap();

    let outcome = dispatcher.dispatch("/api/cron/x").await;
    assert!(!outcome.success());
    assert_eq!(outcome.message(), "Error: down for maintenance");
    assert_eq!(outcome.status_code(), 503);
}

#[tokio::test]
async fn test_token_and_custom_headers_reach_target() {
    let backend = start_programmable_backend(|head| {
        let echoed = format!(
            "{}|{}|{}|{}",
            header_value(&head, "x-vercel-protection-bypass").unwrap_or("-"),
            header_value(&head, "x-env").unwrap_or("-"),
            header_value(&head, "authorization").unwrap_or("-"),
            header_value(&head, "x-forwarded-host").unwrap_or("-"),
        );
        async move { (200, echoed) }
    })
    .await;

    let dispatcher = Dispatcher::new(
        PanelConfig {
            preview_url: format!("http://127.0.0.1:{}", backend.port()),
            deploy_protection_token: Some("bypass-secret".into()),
            custom_headers: Some("X-Env: preview\nAuthorization: Bearer abc\nHost: evil\nbroken".into()),
        },
        "http://127.0.0.1:1/api/trigger-cron",
    )
    .unwrap();
    assert_eq!(dispatcher.rejected_headers().len(), 2);

    let outcome = dispatcher.dispatch("/api/cron/ping").await;
    assert_eq!(outcome.message(), "Success: bypass-secret|preview|Bearer abc|-");
}

#[tokio::test]
async fn test_local_timeout() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        (200, "too late".to_string())
    })
    .await;

    let dispatcher = Dispatcher::new(
        panel(format!("http://127.0.0.1:{}", backend.port())),
        "http://127.0.0.1:1/api/trigger-cron",
    )
    .unwrap()
    .with_timeout(Duration::from_secs(1));

    let outcome = dispatcher.dispatch("/slow").await;
    assert!(!outcome.success());
    assert_eq!(outcome.message(), "Request timeout (1s)");
    assert_eq!(outcome.status_code(), 408);
}

async fn start_relay<F>(stub: StubUpstream<F>) -> (String, Shutdown)
where
    F: Fn(&url::Url, &axum::http::HeaderMap) -> StubReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::with_state(RelayConfig::default(), Arc::new(RelayState::new(stub)));

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (format!("http://{addr}/api/trigger-cron"), shutdown)
}

#[tokio::test]
async fn test_public_target_through_relay() {
    let (relay_url, shutdown) = start_relay(StubUpstream::new(|url, headers| {
        assert_eq!(url.as_str(), "https://myapp-preview.example.com/api/cron/fail");
        assert_eq!(headers["x-vercel-protection-bypass"], "secret");
        StubReply::Respond(UpstreamResponse {
            status: 500,
            body: Some("boom".into()),
        })
    }))
    .await;

    let dispatcher = Dispatcher::new(
        PanelConfig {
            preview_url: "https://myapp-preview.example.com".into(),
            deploy_protection_token: Some("secret".into()),
            custom_headers: None,
        },
        &relay_url,
    )
    .unwrap();

    let job = &jobs(r#"{"crons":[{"path":"/api/cron/fail","schedule":"0 * * * *"}]}"#)[0];
    let run = dispatcher.run_job(job).await.unwrap();

    assert_eq!(run.job_id, "/api/cron/fail-0");
    assert!(!run.outcome.success());
    assert_eq!(run.outcome.message(), "Error: boom");
    assert_eq!(run.outcome.status_code(), 500);
    assert!(matches!(
        dispatcher.slots().state(&job.id),
        JobState::Finished { .. }
    ));

    shutdown.trigger();
}

#[tokio::test]
async fn test_relay_rejection_keeps_status() {
    let relay = start_mock_backend(429, r#"{"success":false}"#).await;
    let dispatcher = Dispatcher::new(
        panel("https://app.example.com".into()),
        &format!("http://{relay}/api/trigger-cron"),
    )
    .unwrap();

    let outcome = dispatcher.dispatch("/api/cron").await;
    assert!(!outcome.success());
    assert_eq!(outcome.message(), "API request failed: 429");
    assert_eq!(outcome.status_code(), 429);
}

#[tokio::test]
async fn test_relay_malformed_reply() {
    let relay = start_mock_backend(200, "<html>not json</html>").await;
    let dispatcher = Dispatcher::new(
        panel("https://app.example.com".into()),
        &format!("http://{relay}/api/trigger-cron"),
    )
    .unwrap();

    let outcome = dispatcher.dispatch("/api/cron").await;
    assert_eq!(outcome.message(), "Invalid response format from API");
    assert_eq!(outcome.status_code(), 502);
}

#[tokio::test]
async fn test_relay_unreachable() {
    let dispatcher = Dispatcher::new(
        panel("https://app.example.com".into()),
        &format!("http://{}/api/trigger-cron", dead_addr().await),
    )
    .unwrap();

    let outcome = dispatcher.dispatch("/api/cron").await;
    assert!(!outcome.success());
    assert_eq!(outcome.message(), "Failed to trigger cron job");
    assert_eq!(outcome.status_code(), 502);
}

#[tokio::test]
async fn test_relay_outcome_is_truncated_on_arrival() {
    let long = format!(
        r#"{{"success":true,"message":"{}","statusCode":200}}"#,
        "a".repeat(3000)
    );
    let relay = start_programmable_backend(move |_| {
        let long = long.clone();
        async move { (200, long) }
    })
    .await;
    let dispatcher = Dispatcher::new(
        panel("https://app.example.com".into()),
        &format!("http://{relay}/api/trigger-cron"),
    )
    .unwrap();

    let outcome = dispatcher.dispatch("/api/cron").await;
    assert!(outcome.success());
    assert_eq!(outcome.message().chars().count(), 1000);
}

#[tokio::test]
async fn test_rerun_supersedes_in_flight_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let backend = start_programmable_backend(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                tokio::time::sleep(Duration::from_millis(800)).await;
                (200, "slow".to_string())
            } else {
                (200, "fast".to_string())
            }
        }
    })
    .await;

    let dispatcher = Arc::new(
        Dispatcher::new(
            panel(format!("http://127.0.0.1:{}", backend.port())),
            "http://127.0.0.1:1/api/trigger-cron",
        )
        .unwrap(),
    );
    let job = jobs(r#"{"crons":[{"path":"/api/cron/sync","schedule":"*/5 * * * *"}]}"#)
        .remove(0);

    let first = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let job = job.clone();
        async move { dispatcher.run_job(&job).await }
    });

    // Let the first request reach the backend.
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let second = dispatcher.run_job(&job).await.unwrap();
    assert_eq!(second.outcome.message(), "Success: fast");

    assert!(first.await.unwrap().is_none());
    match dispatcher.slots().state(&job.id) {
        JobState::Finished { outcome, .. } => assert_eq!(outcome.message(), "Success: fast"),
        other => panic!("unexpected slot state {other:?}"),
    }
}

#[tokio::test]
async fn test_run_all_jobs_concurrently() {
    let backend = start_programmable_backend(|head| {
        let path = head
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_string();
        async move { (200, path) }
    })
    .await;

    let dispatcher = Dispatcher::new(
        panel(format!("http://localhost:{}", backend.port())),
        "http://127.0.0.1:1/api/trigger-cron",
    )
    .unwrap();
    let jobs = jobs(
        r#"{"crons":[
            {"path":"/api/cron/a","schedule":"0 0 * * *"},
            {"path":"/api/cron/b","schedule":"0 1 * * *"},
            {"path":"/api/cron/a","schedule":"0 2 * * *"}
        ]}"#,
    );

    let runs = futures_util::future::join_all(jobs.iter().map(|j| dispatcher.run_job(j))).await;

    // Same path, different index: separate slots, neither superseded.
    let messages: Vec<_> = runs
        .into_iter()
        .map(|run| run.unwrap().outcome.message().to_string())
        .collect();
    assert_eq!(
        messages,
        vec!["Success: /api/cron/a", "Success: /api/cron/b", "Success: /api/cron/a"]
    );
}

#[tokio::test]
async fn test_abort_all_cancels_running_jobs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let backend = start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (200, "too late".to_string())
        }
    })
    .await;

    let dispatcher = Arc::new(
        Dispatcher::new(
            panel(format!("http://127.0.0.1:{}", backend.port())),
            "http://127.0.0.1:1/api/trigger-cron",
        )
        .unwrap(),
    );
    let job = jobs(r#"{"crons":[{"path":"/api/cron/slow","schedule":"0 * * * *"}]}"#).remove(0);

    let running = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let job = job.clone();
        async move { dispatcher.run_job(&job).await }
    });

    while calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(dispatcher.slots().abort_all(), 1);
    let run = tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("aborted job should return promptly")
        .unwrap();
    assert!(run.is_none());
    assert!(matches!(dispatcher.slots().state(&job.id), JobState::Idle));

    // Nothing left running.
    assert_eq!(dispatcher.slots().abort_all(), 0);
}

#[tokio::test]
async fn test_local_large_body_is_bounded() {
    let backend = start_programmable_backend(|_| async { (200, "z".repeat(100_000)) }).await;
    let dispatcher = Dispatcher::new(
        panel(format!("http://127.0.0.1:{}", backend.port())),
        "http://127.0.0.1:1/api/trigger-cron",
    )
    .unwrap();

    let outcome = dispatcher.dispatch("/api/cron/big").await;
    assert!(outcome.success());
    assert!(outcome.message().starts_with("Success: zzz"));
    assert_eq!(outcome.message().chars().count(), 1000);
}
