/// Integration tests for the orchestrator
///
/// These tests drive whole check cycles through the real executor, result
/// processor and alert dispatcher:
/// - Down/recovery scenarios against a mock HTTP endpoint
/// - Management operations (pause, resume, edit, delete)
/// - Results arriving for monitors paused or deleted mid-flight
use crate::alerts::{Alert, AlertChannel, AlertKind, AlertSink, DispatchError, NotificationPreferences};
use crate::config::Config;
use crate::database::{Database, MemoryDatabase, MonitorPatch, NewMonitor};
use crate::error::MonitorError;
use crate::history::Window;
use crate::monitoring::checker::HttpChecker;
use crate::monitoring::retry::{BackoffStrategy, RetryPolicy};
use crate::monitoring::types::{CheckOutcome, CheckResult, ErrorKind, MonitorStatus};
use crate::monitoring::MonitoringExecutor;
use crate::orchestrator::{Orchestrator, Processed, ResultProcessor};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<(AlertKind, Uuid)>>,
}

impl RecordingSink {
    /// Recorded alerts, test alerts excluded
    fn kinds(&self) -> Vec<AlertKind> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|(kind, _)| *kind)
            .filter(|kind| *kind != AlertKind::Test)
            .collect()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn channel(&self) -> AlertChannel {
        AlertChannel::Webhook
    }

    async fn on_alert(&self, alert: &Alert) -> Result<(), DispatchError> {
        self.alerts.lock().unwrap().push((alert.kind, alert.monitor.id));
        Ok(())
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    database: Arc<dyn Database>,
    sink: Arc<RecordingSink>,
    processor: ResultProcessor,
    executor: MonitoringExecutor,
}

impl Harness {
    fn new() -> Self {
        let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = Orchestrator::offline(
            test_config(),
            Arc::clone(&database),
            vec![sink.clone() as Arc<dyn AlertSink>],
        );
        let processor = ResultProcessor::new(Arc::clone(&database), None, orchestrator.alerts.clone());
        let executor = MonitoringExecutor::new(
            Arc::new(HttpChecker::new(&orchestrator.config().probe).unwrap()),
            fast_retries(),
        );

        Self { orchestrator, database, sink, processor, executor }
    }

    async fn check(&self, id: Uuid) -> (CheckResult, Processed) {
        let monitor = self.orchestrator.get_monitor(id).await.unwrap();
        let result = self.executor.execute_check(id, &monitor.check_settings()).await;
        let processed = self.processor.process(result.clone()).await.unwrap();
        (result, processed)
    }

    /// Wait until every alert queued so far has been handled. The dispatcher
    /// handles events in order, so a test alert's reply means the queue is drained.
    async fn flush_alerts(&self, id: Uuid) {
        self.orchestrator.alerts.test(self.orchestrator.get_monitor(id).await.unwrap()).await;
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.database.path = crate::database::MEMORY_PATH.to_string();
    config.scheduler.startup_jitter_ms = 0;
    config.scheduler.reload_interval_secs = 0;
    config.alerts.dispatch_retry_ms = 1;
    config
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        strategy: BackoffStrategy::Fixed,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    }
}

fn failed(id: Uuid) -> CheckResult {
    CheckResult::new(id, Utc::now()).failure(ErrorKind::Timeout, None, None)
}

#[tokio::test]
async fn test_failing_endpoint_goes_down_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor {
            interval_seconds: Some(60),
            timeout_seconds: Some(10),
            max_retries: Some(2),
            ..NewMonitor::new("owner-1", format!("{}/health", server.uri()))
        })
        .await
        .unwrap();
    assert_eq!(monitor.status, MonitorStatus::Pending);

    let (result, processed) = harness.check(monitor.id).await;
    assert_eq!(result.attempts, 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(result.outcome, CheckOutcome::Down);
    assert_eq!(result.error, Some(ErrorKind::UnexpectedStatus { status: 500 }));
    assert_eq!(result.http_status, Some(500));
    match processed {
        Processed::Recorded { change: Some(change), alerted: true } => {
            assert_eq!(change.from, MonitorStatus::Pending);
            assert_eq!(change.to, MonitorStatus::Down);
        }
        other => panic!("unexpected processing outcome: {other:?}"),
    }

    harness.flush_alerts(monitor.id).await;
    assert_eq!(harness.sink.kinds(), vec![AlertKind::Down]);

    // Still failing: no new transition, no new alert
    let (_, processed) = harness.check(monitor.id).await;
    assert!(matches!(processed, Processed::Recorded { change: None, .. }));
    let stored = harness.orchestrator.get_monitor(monitor.id).await.unwrap();
    assert_eq!(stored.status, MonitorStatus::Down);
    assert_eq!(stored.consecutive_failures, 2);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(120)))
        .mount(&server)
        .await;

    let (result, processed) = harness.check(monitor.id).await;
    assert_eq!(result.attempts, 1);
    assert!(result.is_up());
    assert!(result.response_time_ms.unwrap() >= 120);
    assert!(matches!(processed, Processed::Recorded { change: Some(_), alerted: true }));

    harness.flush_alerts(monitor.id).await;
    assert_eq!(harness.sink.kinds(), vec![AlertKind::Down, AlertKind::Recovery]);

    let stored = harness.orchestrator.get_monitor(monitor.id).await.unwrap();
    assert_eq!(stored.status, MonitorStatus::Up);
    assert_eq!(stored.consecutive_failures, 0);
    assert!(stored.status_changed_at.is_some());

    let history = harness.orchestrator.get_history(monitor.id, Window::Day).await.unwrap();
    assert_eq!(history.statistics.total_checks, 3);
    assert_eq!(history.statistics.successful_checks, 1);
    assert_eq!(history.points.last().unwrap().response_time_ms, result.response_time_ms);

    let transitions = harness.orchestrator.get_transitions(monitor.id, 10).await.unwrap();
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[0].to, MonitorStatus::Up);
    assert_eq!(transitions[1].to, MonitorStatus::Down);
}

#[tokio::test]
async fn test_first_success_sends_no_recovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", server.uri()))
        .await
        .unwrap();

    let (_, processed) = harness.check(monitor.id).await;
    assert!(matches!(processed, Processed::Recorded { change: Some(_), .. }));

    harness.flush_alerts(monitor.id).await;
    assert!(harness.sink.kinds().is_empty());
    assert_eq!(harness.orchestrator.get_monitor(monitor.id).await.unwrap().status, MonitorStatus::Up);
}

#[tokio::test]
async fn test_threshold_delays_down_alert() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor {
            failure_threshold: Some(3),
            ..NewMonitor::new("owner-1", "https://example.com")
        })
        .await
        .unwrap();

    for expected in [MonitorStatus::Pending, MonitorStatus::Pending, MonitorStatus::Down, MonitorStatus::Down] {
        harness.processor.process(failed(monitor.id)).await.unwrap();
        assert_eq!(harness.orchestrator.get_monitor(monitor.id).await.unwrap().status, expected);
    }

    harness.flush_alerts(monitor.id).await;
    assert_eq!(harness.sink.kinds(), vec![AlertKind::Down]);
}

#[tokio::test]
async fn test_resume_active_monitor_is_noop() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "https://example.com"))
        .await
        .unwrap();

    let resumed = harness.orchestrator.resume_monitor(monitor.id).await.unwrap();
    assert_eq!(resumed, monitor);
    let history = harness.orchestrator.get_history(monitor.id, Window::Hour).await.unwrap();
    assert_eq!(history.statistics.total_checks, 0);
    assert_eq!(history.statistics.uptime_percentage, None);

    let paused = harness.orchestrator.pause_monitor(monitor.id).await.unwrap();
    assert!(paused.is_paused);
    assert!(paused.paused_at.is_some());
    assert_eq!(paused, harness.orchestrator.get_monitor(monitor.id).await.unwrap());
    let paused_again = harness.orchestrator.pause_monitor(monitor.id).await.unwrap();
    assert_eq!(paused_again, paused);

    let resumed = harness.orchestrator.resume_monitor(monitor.id).await.unwrap();
    assert!(resumed.is_active());
    assert!(resumed.paused_at.is_none());
    assert_eq!(resumed.status, MonitorStatus::Pending);
    assert_eq!(resumed, harness.orchestrator.get_monitor(monitor.id).await.unwrap());
}

#[tokio::test]
async fn test_edit_keeps_health_state() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "https://example.com"))
        .await
        .unwrap();
    harness.processor.process(failed(monitor.id)).await.unwrap();

    let edited = harness
        .orchestrator
        .edit_monitor(
            monitor.id,
            MonitorPatch {
                name: Some("Example".into()),
                url: Some("https://example.org/status".into()),
                interval_seconds: Some(120),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(edited.name, "Example");
    assert_eq!(edited.url, "https://example.org/status");
    assert_eq!(edited.interval_seconds, 120);
    assert_eq!(edited.status, MonitorStatus::Down);
    assert_eq!(edited.consecutive_failures, 1);

    let err = harness
        .orchestrator
        .edit_monitor(monitor.id, MonitorPatch { url: Some("not a url".into()), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::InvalidInput(_)));
    assert_eq!(harness.orchestrator.get_monitor(monitor.id).await.unwrap().url, "https://example.org/status");
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let harness = Harness::new();
    let id = Uuid::new_v4();

    assert!(matches!(harness.orchestrator.get_monitor(id).await, Err(MonitorError::NotFound(_))));
    assert!(matches!(harness.orchestrator.pause_monitor(id).await, Err(MonitorError::NotFound(_))));
    assert!(matches!(harness.orchestrator.resume_monitor(id).await, Err(MonitorError::NotFound(_))));
    assert!(matches!(
        harness.orchestrator.edit_monitor(id, MonitorPatch::default()).await,
        Err(MonitorError::NotFound(_))
    ));
    assert!(matches!(harness.orchestrator.delete_monitor(id).await, Err(MonitorError::NotFound(_))));
    assert!(matches!(harness.orchestrator.get_history(id, Window::Day).await, Err(MonitorError::NotFound(_))));
    assert!(matches!(harness.orchestrator.send_test_alert(id).await, Err(MonitorError::NotFound(_))));
}

#[tokio::test]
async fn test_invalid_monitor_is_rejected() {
    let harness = Harness::new();

    let err = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "example.com/no-scheme"))
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::InvalidInput(_)));

    let err = harness
        .orchestrator
        .create_monitor(NewMonitor {
            interval_seconds: Some(0),
            ..NewMonitor::new("owner-1", "https://example.com")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::InvalidInput(_)));

    assert!(harness.orchestrator.list_monitors().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_cascades_history() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "https://example.com"))
        .await
        .unwrap();
    harness.processor.process(failed(monitor.id)).await.unwrap();

    harness.orchestrator.delete_monitor(monitor.id).await.unwrap();

    let now = Utc::now();
    let results = harness
        .database
        .results_between(monitor.id, now - TimeDelta::days(1), now + TimeDelta::seconds(1))
        .await
        .unwrap();
    assert!(results.is_empty());
    assert!(harness.orchestrator.get_monitors("owner-1").await.unwrap().is_empty());
    assert!(matches!(
        harness.orchestrator.delete_monitor(monitor.id).await,
        Err(MonitorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_result_of_deleted_monitor_is_discarded() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "https://example.com"))
        .await
        .unwrap();
    let in_flight = failed(monitor.id);

    harness.orchestrator.delete_monitor(monitor.id).await.unwrap();
    assert_eq!(harness.processor.process(in_flight).await.unwrap(), Processed::Discarded);

    let latest = harness.database.latest_result(monitor.id).await.unwrap();
    assert!(latest.is_none());
}

#[tokio::test]
async fn test_result_of_paused_monitor_is_recorded_without_alert() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "https://example.com"))
        .await
        .unwrap();
    // Started before the pause
    let in_flight = CheckResult::new(monitor.id, Utc::now() - TimeDelta::seconds(1))
        .failure(ErrorKind::Timeout, None, None);

    harness.orchestrator.pause_monitor(monitor.id).await.unwrap();
    match harness.processor.process(in_flight).await.unwrap() {
        Processed::Recorded { change: Some(change), alerted } => {
            assert_eq!(change.to, MonitorStatus::Down);
            assert!(!alerted);
        }
        other => panic!("unexpected processing outcome: {other:?}"),
    }

    harness.flush_alerts(monitor.id).await;
    assert!(harness.sink.kinds().is_empty());

    let stored = harness.orchestrator.get_monitor(monitor.id).await.unwrap();
    assert!(stored.is_paused);
    assert_eq!(stored.status, MonitorStatus::Down);
    assert!(harness.database.latest_result(monitor.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_check_started_after_pause_is_discarded() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "https://example.com"))
        .await
        .unwrap();

    // Paused straight in storage, as another process would
    harness.database.set_paused(monitor.id, true).await.unwrap();
    let late = failed(monitor.id);

    assert_eq!(harness.processor.process(late).await.unwrap(), Processed::Discarded);
    harness.flush_alerts(monitor.id).await;
    assert!(harness.sink.kinds().is_empty());

    let stored = harness.orchestrator.get_monitor(monitor.id).await.unwrap();
    assert_eq!(stored.status, MonitorStatus::Pending);
    assert!(stored.last_checked_at.is_none());
    assert!(harness.database.latest_result(monitor.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_owner_preferences_mute_alerts() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "https://example.com"))
        .await
        .unwrap();

    assert_eq!(
        harness.orchestrator.get_notification_preferences("owner-1").await.unwrap(),
        NotificationPreferences::default()
    );
    let muted = NotificationPreferences { webhook: false, ..Default::default() };
    harness.orchestrator.set_notification_preferences("owner-1", muted).await.unwrap();
    assert_eq!(harness.orchestrator.get_notification_preferences("owner-1").await.unwrap(), muted);

    harness.processor.process(failed(monitor.id)).await.unwrap();
    assert!(!harness.orchestrator.send_test_alert(monitor.id).await.unwrap());
    assert!(harness.sink.alerts.lock().unwrap().is_empty());

    let err = harness.orchestrator.set_notification_preferences(" ", muted).await.unwrap_err();
    assert!(matches!(err, MonitorError::InvalidInput(_)));
}

#[tokio::test]
async fn test_send_test_alert_reaches_sinks() {
    let harness = Harness::new();
    let monitor = harness
        .orchestrator
        .create_monitor(NewMonitor::new("owner-1", "https://example.com"))
        .await
        .unwrap();

    assert!(harness.orchestrator.send_test_alert(monitor.id).await.unwrap());
    let recorded = harness.sink.alerts.lock().unwrap().clone();
    assert_eq!(recorded, vec![(AlertKind::Test, monitor.id)]);
}

#[tokio::test]
async fn test_started_orchestrator_checks_monitors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = test_config();
    let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
    let sink = Arc::new(RecordingSink::default());
    let executor = Arc::new(MonitoringExecutor::http(&config).unwrap());
    let orchestrator = Orchestrator::start(
        config,
        Arc::clone(&database),
        executor,
        vec![sink.clone() as Arc<dyn AlertSink>],
    )
    .await
    .unwrap();
    assert!(orchestrator.is_scheduling());

    let monitor = orchestrator
        .create_monitor(NewMonitor {
            interval_seconds: Some(2),
            timeout_seconds: Some(1),
            ..NewMonitor::new("owner-1", format!("{}/up", server.uri()))
        })
        .await
        .unwrap();

    let mut status = MonitorStatus::Pending;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        status = orchestrator.get_monitor(monitor.id).await.unwrap().status;
        if status == MonitorStatus::Up {
            break;
        }
    }
    assert_eq!(status, MonitorStatus::Up);
    assert!(database.latest_result(monitor.id).await.unwrap().unwrap().is_up());

    orchestrator.shutdown();
    assert!(sink.kinds().is_empty());
}

#[tokio::test]
async fn test_pause_from_another_process_stops_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = test_config();
    let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
    let executor = Arc::new(MonitoringExecutor::http(&config).unwrap());
    let orchestrator = Orchestrator::start(config, Arc::clone(&database), executor, Vec::new()).await.unwrap();

    let monitor = orchestrator
        .create_monitor(NewMonitor {
            interval_seconds: Some(2),
            timeout_seconds: Some(1),
            ..NewMonitor::new("owner-1", format!("{}/up", server.uri()))
        })
        .await
        .unwrap();

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if database.latest_result(monitor.id).await.unwrap().is_some() {
            break;
        }
    }
    assert!(database.latest_result(monitor.id).await.unwrap().is_some());

    // The scheduler is not told, like a pause from the management CLI
    database.set_paused(monitor.id, true).await.unwrap();
    let paused_at = database.get_monitor(monitor.id).await.unwrap().unwrap().paused_at.unwrap();
    tokio::time::sleep(Duration::from_millis(2600)).await;

    let since_pause = database
        .results_between(monitor.id, paused_at - TimeDelta::hours(1), Utc::now() + TimeDelta::seconds(1))
        .await
        .unwrap()
        .into_iter()
        .filter(|result| result.started_at >= paused_at)
        .count();
    assert_eq!(since_pause, 0);

    orchestrator.shutdown();
}
