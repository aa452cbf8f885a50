//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

mod common;

use std::sync::Arc;

use futures_util::StreamExt;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serde_json::json;
use tonic::Status;

use bifrost::stream::CANCELLED_ON_CLIENT;
use bifrost::{ClientStreamEvent, ServerStreamEvent, telemetry};
use common::*;

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a metric name and one label.
fn counter_with(snapshot: &SnapshotVec, name: &str, label: (&str, &str)) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            key.key()
                .labels()
                .any(|l| l.key() == label.0 && l.value() == label.1)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Runs a future on a current-thread runtime so spawned stream drivers share
/// the thread, and therefore the local recorder.
fn run_recorded<F: std::future::Future>(recorder: &DebuggingRecorder, future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    metrics::with_local_recorder(recorder, || runtime.block_on(future))
}

// ============================================================================
// Tests
// ============================================================================

/// `block_in_place` keeps the sync `with_local_recorder` closure on the
/// current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_unary_records_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let client = client(grpc_protocol(Arc::new(MockChannel::default()))).await;
                client
                    .invoke_unary(&options(UNARY), json!({ "id": "abc" }), None)
                    .await
            })
        })
    });
    assert!(result.unwrap().is_ok());

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::CALLS_TOTAL), 1);
    assert_eq!(
        counter_with(&snapshot, telemetry::CALLS_TOTAL, ("code", "ok")),
        1
    );
    assert!(
        has_histogram(&snapshot, telemetry::CALL_DURATION_SECONDS),
        "expected a duration histogram entry"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_unary_records_remote_code() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let _result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let channel = Arc::new(MockChannel {
                    unary_error: Some(Status::aborted("nope")),
                    ..Default::default()
                });
                let client = client(grpc_protocol(channel)).await;
                client
                    .invoke_unary(&options(UNARY), json!({ "id": "abc" }), None)
                    .await
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with(&snapshot, telemetry::CALLS_TOTAL, ("code", "aborted")),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn lookup_failure_records_nothing() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let client = client(grpc_protocol(Arc::new(MockChannel::default()))).await;
                client
                    .invoke_unary(
                        &bifrost::RequestOptions::new(SERVICE, "NotAMethod"),
                        json!({}),
                        None,
                    )
                    .await
            })
        })
    });
    assert!(result.is_err());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::CALLS_TOTAL), 0);
}

#[test]
fn server_stream_counts_inbound_messages() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let events: Vec<_> = run_recorded(&recorder, async {
        let channel = Arc::new(MockChannel {
            server_items: vec![Ok(json!({ "id": "1" })), Ok(json!({ "id": "2" }))],
            ..Default::default()
        });
        let client = client(grpc_protocol(channel)).await;
        client
            .invoke_server_stream(&options(SERVER_STREAM), json!({ "id": "x" }), None)
            .unwrap()
            .collect()
            .await
    });
    assert_eq!(events.last(), Some(&ServerStreamEvent::End));

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::STREAM_MESSAGES_TOTAL,
            ("direction", "inbound")
        ),
        2
    );
    assert_eq!(
        counter_with(&snapshot, telemetry::CALLS_TOTAL, ("code", "ok")),
        1
    );
}

#[test]
fn cancelled_client_stream_records_outbound_and_cancelled() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let events: Vec<_> = run_recorded(&recorder, async {
        let client = client(grpc_protocol(Arc::new(MockChannel::default()))).await;
        let mut call = client
            .invoke_client_stream(&options(CLIENT_STREAM), None)
            .unwrap();
        call.write(json!({ "id": "a" }));
        tokio::task::yield_now().await;
        call.cancel();
        let mut events = Vec::new();
        while let Some(event) = call.next().await {
            events.push(event);
        }
        events
    });
    match events.as_slice() {
        [ClientStreamEvent::Error(envelope)] => assert_eq!(
            envelope.error().unwrap().details.as_deref(),
            Some(CANCELLED_ON_CLIENT)
        ),
        other => panic!("unexpected events: {other:?}"),
    }

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::STREAM_MESSAGES_TOTAL,
            ("direction", "outbound")
        ),
        1
    );
    assert_eq!(
        counter_with(&snapshot, telemetry::CALLS_TOTAL, ("code", "cancelled")),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let client = client(grpc_protocol(Arc::new(MockChannel::default()))).await;
    let _response = client
        .invoke_unary(&options(UNARY), json!({ "id": "abc" }), None)
        .await
        .unwrap();
}
