//! End-to-end flow: event log → consumer → bootstrap store, under the monitor.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use devicehub::events::{
    ConsumerError, ConsumerSettings, ConsumerState, EventDispatcher, EventLog, GroupStart, MemoryLog,
    StreamConsumer,
};
use devicehub::lifecycle::{ErrorSink, GracefulListener, MonitorExit, ServeError, ServiceMonitor, SignalSet};
use devicehub::provision::{api, ConfigService, ConfigState, ConfigStore};
use devicehub::resilience::BackoffPolicy;
use tower::ServiceExt;

mod common;

const STREAM: &str = "mainflux.things";
const GROUP: &str = "mainflux.bootstrap";

fn settings() -> ConsumerSettings {
    ConsumerSettings::new(GROUP, "bootstrap-test")
        .with_block(Duration::from_millis(20))
        .with_backoff(BackoffPolicy::new(1, 10))
}

fn consumer(log: Arc<dyn EventLog>, service: Arc<dyn ConfigService>) -> Arc<StreamConsumer> {
    Arc::new(StreamConsumer::new(
        "things-consumer",
        log,
        EventDispatcher::new(service),
        settings(),
    ))
}

#[tokio::test]
async fn events_keep_bootstrap_configs_in_sync() {
    let store = ConfigStore::new();
    store
        .save(common::bootstrap_config("t1", vec![common::channel("c1", "temp")]))
        .unwrap();
    store
        .save(common::bootstrap_config(
            "t2",
            vec![common::channel("c1", "temp"), common::channel("c2", "humidity")],
        ))
        .unwrap();
    store
        .save(common::bootstrap_config("t3", vec![common::channel("c2", "humidity")]))
        .unwrap();

    let log = Arc::new(MemoryLog::new());
    log.create_group(STREAM, GROUP, GroupStart::Latest).await.unwrap();
    log.append(STREAM, [("operation", "thing.remove"), ("id", "t1")]);
    log.append(
        STREAM,
        [
            ("operation", "channel.update"),
            ("id", "c1"),
            ("name", "temperature"),
            ("metadata", r#"{"unit":"C"}"#),
        ],
    );
    log.append(STREAM, [("operation", "thing.disconnect"), ("chan_id", "c2"), ("thing_id", "t3")]);
    log.append(STREAM, [("operation", "channel.remove"), ("id", "c2")]);
    log.append(STREAM, [("operation", "thing.create"), ("id", "t9")]);

    let consumer = consumer(log.clone(), Arc::new(store.clone()));
    let (errs, _err_rx) = ErrorSink::channel();
    consumer.start(STREAM, errs);

    common::eventually(|| log.acked(STREAM, GROUP).len() == 5).await;
    consumer.stop(Duration::from_secs(1)).await.unwrap();

    assert!(store.get("t1").is_none());

    let t2 = store.get("t2").unwrap();
    assert_eq!(t2.channels.len(), 1);
    assert_eq!(t2.channels[0].name, "temperature");
    assert_eq!(t2.channels[0].metadata["unit"], "C");

    let t3 = store.get("t3").unwrap();
    assert_eq!(t3.state, ConfigState::Inactive);
    assert!(t3.channels.is_empty());

    // The API reflects what the consumer applied.
    let response = api::router(store.clone(), None)
        .oneshot(Request::get("/configs/t2").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["channels"][0]["metadata"]["unit"], "C");
}

#[tokio::test]
async fn malformed_metadata_still_updates_channel() {
    let log = Arc::new(MemoryLog::new());
    let recorder = Arc::new(common::RecordingService::default());
    let consumer = consumer(log.clone(), recorder.clone());
    let (errs, _err_rx) = ErrorSink::channel();

    consumer.start(STREAM, errs);
    common::eventually(|| log.has_group(STREAM, GROUP)).await;
    log.append(
        STREAM,
        [("operation", "channel.update"), ("id", "c1"), ("name", "n"), ("metadata", "{broken")],
    );

    common::eventually(|| log.acked(STREAM, GROUP).len() == 1).await;
    consumer.stop(Duration::from_secs(1)).await.unwrap();
    assert_eq!(recorder.calls(), vec!["update_channel:c1:n"]);
}

#[tokio::test]
async fn monitor_stops_consumer_on_termination() {
    let log = Arc::new(MemoryLog::new());
    let recorder = Arc::new(common::RecordingService::default());
    let consumer = consumer(log.clone(), recorder.clone());
    let (errs, err_rx) = ErrorSink::channel();

    consumer.start(STREAM, errs);
    common::eventually(|| log.has_group(STREAM, GROUP)).await;
    log.append(STREAM, [("operation", "thing.remove"), ("id", "t1")]);

    let (terminate, terminated) = tokio::sync::oneshot::channel::<()>();
    let listeners: Vec<Arc<dyn GracefulListener>> = vec![consumer.clone()];
    let monitor = ServiceMonitor::new(SignalSet::default()).with_stop_timeout(Duration::from_secs(1));
    let run = tokio::spawn(async move {
        monitor
            .run_until(err_rx, &listeners, async move {
                let _ = terminated.await;
                "test termination"
            })
            .await
    });

    common::eventually(|| log.acked(STREAM, GROUP).len() == 1).await;
    terminate.send(()).unwrap();

    let exit = common::within(run).await.unwrap();
    assert!(matches!(exit, MonitorExit::Signalled { stopped: 1, failed: 0 }));
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(recorder.calls(), vec!["remove_config:t1"]);
}

#[tokio::test]
async fn unreachable_log_is_fatal_for_the_monitor() {
    let consumer = consumer(
        Arc::new(common::UnreachableLog),
        Arc::new(common::RecordingService::default()),
    );
    let (errs, err_rx) = ErrorSink::channel();
    consumer.start(STREAM, errs);

    let listeners: Vec<Arc<dyn GracefulListener>> = vec![consumer.clone()];
    let exit = common::within(ServiceMonitor::new(SignalSet::default()).run_until(
        err_rx,
        &listeners,
        std::future::pending::<&str>(),
    ))
    .await;

    assert!(matches!(
        exit,
        MonitorExit::Fatal(ServeError::Subscribe {
            source: ConsumerError::CreateGroup { .. },
            ..
        })
    ));
    assert_eq!(consumer.state(), ConsumerState::Stopped);
}
