//! 检测周期集成测试
//!
//! 使用本地 mock 网关驱动完整的探测、调度和注册表写入流程

use gateway_vitals::health::{
    CheckScheduler, HttpProbe, ProbeStage, SchedulerConfig, TargetStatus,
};
use gateway_vitals::registry::{InMemoryRegistry, NewTarget, TargetRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;

/// 只接受连接、从不响应的网关
async fn silent_gateway() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            sockets.push(socket);
        }
    });

    (format!("http://{address}"), accepted)
}

fn target(name: &str, endpoint: &str) -> NewTarget {
    NewTarget {
        name: name.to_string(),
        endpoint: endpoint.to_string(),
        token: format!("{name}-token"),
        description: None,
    }
}

fn scheduler_for(registry: Arc<InMemoryRegistry>) -> CheckScheduler {
    let probe = HttpProbe::with_timeouts(Duration::from_millis(400), Duration::from_millis(200))
        .unwrap();
    CheckScheduler::new(
        Arc::new(probe),
        registry,
        SchedulerConfig {
            check_interval: Duration::from_secs(3600),
            max_concurrent_checks: 4,
            probe_deadline: Duration::from_secs(5),
        },
    )
}

#[tokio::test]
async fn test_cycle_with_hanging_gateway() {
    let mut online = mockito::Server::new_async().await;
    let online_mock = online
        .mock("GET", "/api/v1/qr/status")
        .match_header("authorization", "Bearer a-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true,"data":{"connectionStatus":"connected"}}"#)
        .expect(1)
        .create_async()
        .await;

    let mut unauthorized = mockito::Server::new_async().await;
    let unauthorized_mock = unauthorized
        .mock("GET", "/api/v1/qr/status")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let no_fallback = unauthorized
        .mock("GET", "/")
        .expect(0)
        .create_async()
        .await;

    let (silent_url, accepted) = silent_gateway().await;

    let registry = Arc::new(InMemoryRegistry::default());
    let a = registry
        .create_target(target("a", &format!("{}/", online.url())))
        .await
        .unwrap();
    let b = registry.create_target(target("b", &silent_url)).await.unwrap();
    let c = registry
        .create_target(target("c", &unauthorized.url()))
        .await
        .unwrap();

    let scheduler = scheduler_for(registry.clone());
    let started = Instant::now();
    let report = scheduler.run_check_cycle().await.unwrap();

    // 有界并发下总耗时由最慢目标的超时决定
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.total_targets, 3);
    assert_eq!(report.online, 1);
    assert_eq!(report.offline, 2);
    assert_eq!(report.persist_failures, 0);

    online_mock.assert_async().await;
    unauthorized_mock.assert_async().await;
    no_fallback.assert_async().await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    let a_record = registry.get_target_record(a.id).await.unwrap();
    assert_eq!(a_record.latest.status, TargetStatus::Online);
    assert_eq!(a_record.latest.connection_status.as_deref(), Some("connected"));

    let b_logs = registry.list_check_logs(Some(b.id), 10).await;
    assert_eq!(b_logs.len(), 1);
    assert_eq!(b_logs[0].status, TargetStatus::Offline);
    assert_eq!(b_logs[0].error_message.as_deref(), Some("Request timeout"));

    let c_logs = registry.list_check_logs(Some(c.id), 10).await;
    assert_eq!(c_logs[0].status, TargetStatus::Offline);
    assert_eq!(c_logs[0].error_message.as_deref(), Some("HTTP 401 Unauthorized"));

    let counts = registry.status_counts().await;
    assert_eq!(counts.online, 1);
    assert_eq!(counts.offline, 2);
    assert_eq!(counts.unknown, 0);
}

#[tokio::test]
async fn test_legacy_gateway_reached_through_fallback() {
    let mut legacy = mockito::Server::new_async().await;
    let _status = legacy
        .mock("GET", "/api/v1/qr/status")
        .with_status(404)
        .create_async()
        .await;
    let _root = legacy
        .mock("GET", "/")
        .with_status(200)
        .with_body("OK")
        .create_async()
        .await;

    let registry = Arc::new(InMemoryRegistry::default());
    let legacy_target = registry
        .create_target(target("legacy", &legacy.url()))
        .await
        .unwrap();
    let scheduler = scheduler_for(registry.clone());

    let outcome = scheduler.trigger_single_check(legacy_target.id).await.unwrap();

    assert_eq!(outcome.status, TargetStatus::Online);
    assert_eq!(outcome.stage, ProbeStage::Fallback);
    assert!(outcome.connection_status.is_none());

    let record = registry.get_target_record(legacy_target.id).await.unwrap();
    assert_eq!(record.latest.status, TargetStatus::Online);
    assert!(record.latest.connection_status.is_none());
}

#[tokio::test]
async fn test_status_overwritten_and_history_appended() {
    let mut gateway = mockito::Server::new_async().await;
    let first = gateway
        .mock("GET", "/api/v1/qr/status")
        .with_status(200)
        .with_body(r#"{"success":true,"data":{"connectionStatus":"connected"}}"#)
        .expect(1)
        .create_async()
        .await;

    let registry = Arc::new(InMemoryRegistry::default());
    let gateway_target = registry
        .create_target(target("gw", &gateway.url()))
        .await
        .unwrap();
    let scheduler = scheduler_for(registry.clone());

    scheduler.run_check_cycle().await.unwrap();
    first.remove_async().await;

    let _second = gateway
        .mock("GET", "/api/v1/qr/status")
        .with_status(503)
        .create_async()
        .await;
    scheduler.run_check_cycle().await.unwrap();

    let record = registry.get_target_record(gateway_target.id).await.unwrap();
    assert_eq!(record.latest.status, TargetStatus::Offline);
    assert!(record.latest.connection_status.is_none());

    let logs = registry.list_check_logs(Some(gateway_target.id), 10).await;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, TargetStatus::Offline);
    assert_eq!(logs[1].status, TargetStatus::Online);
    assert!(logs[0].checked_at >= logs[1].checked_at);

    let all = registry.list_all_targets().await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let mut gateway = mockito::Server::new_async().await;
    let _status = gateway
        .mock("GET", "/api/v1/qr/status")
        .with_status(200)
        .with_body(r#"{"success":true,"data":{"connectionStatus":"connected"}}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let registry = Arc::new(InMemoryRegistry::default());
    let created = registry
        .create_target(target("gw", &gateway.url()))
        .await
        .unwrap();
    scheduler_for(registry.clone()).run_check_cycle().await.unwrap();
    registry.save_to_file(&path).await.unwrap();

    let restored = InMemoryRegistry::load_from_file(&path, 100).await.unwrap();
    let seeded = restored
        .seed_if_empty(&[target("from-config", "https://other.example.com")])
        .await
        .unwrap();
    assert_eq!(seeded, 0);

    let record = restored.get_target_record(created.id).await.unwrap();
    assert_eq!(record.latest.status, TargetStatus::Online);
    assert_eq!(restored.list_check_logs(None, 10).await.len(), 1);
}
