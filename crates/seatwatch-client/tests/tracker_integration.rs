//! Integration tests for the tracker actor.
//!
//! These tests drive `spawn_tracker_with()` through a fake dialer: the test
//! plays the server, the tracker is exercised only through `TrackerHandle`.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use common::*;
use seatwatch_client::{
    spawn_tracker_with, TaskOptions, TaskOrigin, TrackerError, TrackerEvent, TrackerHandle,
};
use seatwatch_core::{TaskIdentity, TaskKey, TaskStatus, WatcherKey, WatcherSpec, WatcherStatus};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    handle: TrackerHandle,
    sockets: mpsc::UnboundedReceiver<FakeSocket>,
    cancel: CancellationToken,
}

fn spawn(config: seatwatch_client::ClientConfig) -> Harness {
    let (dialer, sockets) = FakeDialer::new();
    let cancel = CancellationToken::new();
    let handle = spawn_tracker_with(dialer, &config, cancel.clone());
    Harness {
        handle,
        sockets,
        cancel,
    }
}

/// Spawns a tracker and opens its first socket.
async fn spawn_open() -> (Harness, FakeSocket) {
    let mut harness = spawn(config());
    let socket = next_socket(&mut harness.sockets).await;
    socket.open();
    (harness, socket)
}

fn list_identity() -> TaskIdentity {
    TaskIdentity::list("2000000", "2060150", "31.12.2019")
}

fn list_key() -> TaskKey {
    TaskKey::new(LIST_KEY)
}

fn seat_spec() -> WatcherSpec {
    WatcherSpec::new("258А", "13:45", "Купе")
}

fn watch_line() -> String {
    format!("watch {LIST_KEY} {WATCHER_KEY}")
}

async fn track_seat(handle: &TrackerHandle) {
    handle
        .track(list_identity(), TaskOptions::default(), seat_spec())
        .await
        .expect("track should succeed");
}

// ============================================================================
// End-to-End Scenarios
// ============================================================================

#[tokio::test]
async fn test_track_sends_watch_line() {
    let (harness, mut socket) = spawn_open().await;

    let watcher = harness
        .handle
        .track(list_identity(), TaskOptions::default(), seat_spec())
        .await
        .unwrap();

    assert_eq!(watcher.key().as_str(), WATCHER_KEY);
    assert_eq!(watcher.status(), WatcherStatus::Waiting);
    assert_eq!(socket.next_line().await, watch_line());

    // Tracking the same spec again is idempotent on the wire.
    track_seat(&harness.handle).await;
    socket.assert_silent().await;
}

#[tokio::test]
async fn test_found_marks_watcher_succeeded() {
    let (harness, mut socket) = spawn_open().await;
    let mut events = harness.handle.subscribe();
    track_seat(&harness.handle).await;
    socket.next_line().await;

    socket.push(format!(
        r#"{LIST_KEY} found {{"{WATCHER_KEY}":{{"freeSeats":170}}}}"#
    ));

    let event = wait_event(&mut events, |e| matches!(e, TrackerEvent::Found { .. })).await;
    let TrackerEvent::Found { task_key, watchers } = event else {
        panic!("expected a found event");
    };
    assert_eq!(task_key, list_key());
    assert_eq!(watchers.len(), 1);
    assert_eq!(watchers[0].key().as_str(), WATCHER_KEY);
    assert_eq!(watchers[0].status(), WatcherStatus::Succeeded);
    assert_eq!(watchers[0].found_payload(), Some(&json!({"freeSeats": 170})));

    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    let watcher = task.watcher(&WatcherKey::new(WATCHER_KEY)).unwrap();
    assert!(watcher.is_succeeded());
}

#[tokio::test]
async fn test_attempt_status_tracking() {
    let (harness, mut socket) = spawn_open().await;
    let mut events = harness.handle.subscribe();
    track_seat(&harness.handle).await;
    socket.next_line().await;

    socket.push(format!("{LIST_KEY} 2-"));
    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert_eq!(task.attempts_done(), 1);
    assert_eq!(task.status(), TaskStatus::Failure);
    assert_eq!(task.consecutive_errors(), 1);

    let event = wait_event(&mut events, |e| matches!(e, TrackerEvent::Failure { .. })).await;
    assert!(matches!(
        event,
        TrackerEvent::Failure {
            status: TaskStatus::Failure,
            ..
        }
    ));

    socket.push(format!("{LIST_KEY} 0."));
    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert_eq!(task.attempts_done(), 2);
    assert_eq!(task.status(), TaskStatus::InProgress);
    assert_eq!(task.consecutive_errors(), 0);
}

#[tokio::test]
async fn test_all_watchers_departed_is_fatal() {
    let (harness, mut socket) = spawn_open().await;
    track_seat(&harness.handle).await;
    let other = harness
        .handle
        .track(
            list_identity(),
            TaskOptions::default(),
            WatcherSpec::new("054Ч", "23:40", "*"),
        )
        .await
        .unwrap();
    socket.next_line().await;
    socket.next_line().await;

    socket.push(format!("{LIST_KEY} -W:{WATCHER_KEY} dep"));
    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert_ne!(task.status(), TaskStatus::FatalFailure);
    assert!(task.watcher(&WatcherKey::new(WATCHER_KEY)).unwrap().is_outdated());

    socket.push(format!("{LIST_KEY} -W:{} dep", other.key()));
    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::FatalFailure);
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_preconnect_lines_flush_after_login() {
    let mut harness = spawn(config_with_login());
    let mut socket = next_socket(&mut harness.sockets).await;

    // Accepted while the socket is still connecting.
    track_seat(&harness.handle).await;
    socket.assert_silent().await;

    socket.open();
    assert_eq!(
        socket.next_line().await,
        "login user@example.com seatwatch abc123"
    );
    assert_eq!(socket.next_line().await, watch_line());
}

#[tokio::test]
async fn test_login_updates_session_state() {
    let mut harness = spawn(config_with_login());
    let mut socket = next_socket(&mut harness.sockets).await;
    socket.open();
    assert!(socket.next_line().await.starts_with("login "));

    socket.push("login_result success");
    socket.push("fallback_enabled yes");

    let mut session = harness.handle.session();
    let state = timeout(
        WAIT,
        session.wait_for(|s| s.logged_in_identity.is_some() && s.fallback_enabled),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert!(state.connected);
    assert_eq!(state.logged_in_identity.as_deref(), Some("user@example.com"));
}

#[tokio::test]
async fn test_login_after_start() {
    let (harness, mut socket) = spawn_open().await;

    harness.handle.login(credentials()).await.unwrap();
    assert_eq!(
        socket.next_line().await,
        "login user@example.com seatwatch abc123"
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replays_waiting_watchers_once() {
    let (mut harness, mut socket) = spawn_open().await;
    let mut events = harness.handle.subscribe();
    track_seat(&harness.handle).await;
    assert_eq!(socket.next_line().await, watch_line());

    socket.close();
    // A duplicate close for the same socket must not add a reconnect.
    socket.close();

    let mut second = next_socket(&mut harness.sockets).await;
    assert_eq!(second.generation, socket.generation + 1);
    wait_event(&mut events, |e| matches!(e, TrackerEvent::Reconnected)).await;

    second.open();
    assert_eq!(second.next_line().await, watch_line());
    second.assert_silent().await;
    assert_no_dial(&mut harness.sockets).await;

    // The old socket is stale now.
    socket.close();
    assert_no_dial(&mut harness.sockets).await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_stops_fully_succeeded_task() {
    let (mut harness, mut socket) = spawn_open().await;
    let mut events = harness.handle.subscribe();
    track_seat(&harness.handle).await;
    socket.next_line().await;

    socket.push(format!(
        r#"{LIST_KEY} found {{"{WATCHER_KEY}":{{"freeSeats":2}}}}"#
    ));
    wait_event(&mut events, |e| matches!(e, TrackerEvent::Found { .. })).await;

    socket.close();
    let mut second = next_socket(&mut harness.sockets).await;
    second.open();
    assert_eq!(second.next_line().await, format!("remove {LIST_KEY}"));

    second.push(format!("{LIST_KEY} removed"));
    let event = wait_event(&mut events, |e| matches!(e, TrackerEvent::TaskRemoved { .. })).await;
    assert!(matches!(
        event,
        TrackerEvent::TaskRemoved { reason: Some(ref reason), .. } if reason == "succeeded"
    ));
    assert!(harness.handle.get_task(list_key()).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_track_while_closed_is_replayed() {
    let (mut harness, socket) = spawn_open().await;
    socket.close();

    // The watcher is kept even though the line could not be sent.
    let result = harness
        .handle
        .track(list_identity(), TaskOptions::default(), seat_spec())
        .await;
    assert!(matches!(result, Err(TrackerError::Connection(_))));
    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert_eq!(task.watcher_count(), 1);

    let mut second = next_socket(&mut harness.sockets).await;
    second.open();
    assert_eq!(second.next_line().await, watch_line());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_drops_unconfirmed_unwatch() {
    let (mut harness, mut socket) = spawn_open().await;
    let mut events = harness.handle.subscribe();
    let other = WatcherSpec::new("054Ч", "23:40", "Плац");
    track_seat(&harness.handle).await;
    harness
        .handle
        .track(list_identity(), TaskOptions::default(), other.clone())
        .await
        .unwrap();
    socket.next_line().await;
    socket.next_line().await;

    harness
        .handle
        .remove_watcher(list_key(), other.key())
        .await
        .unwrap();
    assert_eq!(
        socket.next_line().await,
        format!("unwatch {LIST_KEY} {}", other.key())
    );

    // Closed before the server confirmed with -W:.
    socket.close();
    let mut second = next_socket(&mut harness.sockets).await;
    second.open();
    assert_eq!(second.next_line().await, watch_line());
    second.assert_silent().await;

    let event = wait_event(&mut events, |e| matches!(e, TrackerEvent::WatcherRemoved { .. })).await;
    assert!(matches!(
        event,
        TrackerEvent::WatcherRemoved { ref watcher_key, departed: false, .. } if *watcher_key == other.key()
    ));
    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert_eq!(task.watcher_count(), 1);
}

// ============================================================================
// Task Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_stop_task_waits_for_removed() {
    let (harness, mut socket) = spawn_open().await;
    let mut events = harness.handle.subscribe();
    track_seat(&harness.handle).await;
    socket.next_line().await;

    harness.handle.stop_task(list_key()).await.unwrap();
    assert_eq!(socket.next_line().await, format!("remove {LIST_KEY}"));
    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert!(task.is_stopping());

    socket.push(format!("{LIST_KEY} removed"));
    let event = wait_event(&mut events, |e| matches!(e, TrackerEvent::TaskRemoved { .. })).await;
    assert!(matches!(
        event,
        TrackerEvent::TaskRemoved { reason: Some(ref reason), .. } if reason == "user"
    ));
    assert!(harness.handle.get_all_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_track_refused_while_stopping() {
    let (harness, mut socket) = spawn_open().await;
    let mut events = harness.handle.subscribe();
    track_seat(&harness.handle).await;
    socket.next_line().await;

    harness.handle.stop_task(list_key()).await.unwrap();
    assert_eq!(socket.next_line().await, format!("remove {LIST_KEY}"));

    let other = WatcherSpec::new("054Ч", "23:40", "Плац");
    let result = harness
        .handle
        .track(list_identity(), TaskOptions::default(), other.clone())
        .await;
    assert!(matches!(result, Err(TrackerError::TaskStopping(_))));
    socket.assert_silent().await;

    socket.push(format!("{LIST_KEY} removed"));
    wait_event(&mut events, |e| matches!(e, TrackerEvent::TaskRemoved { .. })).await;

    let watcher = harness
        .handle
        .track(list_identity(), TaskOptions::default(), other.clone())
        .await
        .unwrap();
    assert_eq!(
        socket.next_line().await,
        format!("watch {LIST_KEY} {}", other.key())
    );
    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert!(task.watcher(watcher.key()).is_some());
}

#[tokio::test]
async fn test_removing_last_watcher_stops_task() {
    let (harness, mut socket) = spawn_open().await;
    track_seat(&harness.handle).await;
    socket.next_line().await;

    harness
        .handle
        .remove_watcher(list_key(), WatcherKey::new(WATCHER_KEY))
        .await
        .unwrap();
    assert_eq!(
        socket.next_line().await,
        format!("unwatch {LIST_KEY} {WATCHER_KEY}")
    );

    socket.push(format!("{LIST_KEY} -W:{WATCHER_KEY}"));
    assert_eq!(socket.next_line().await, format!("remove {LIST_KEY}"));
}

#[tokio::test]
async fn test_restart_failed_task() {
    let (harness, mut socket) = spawn_open().await;
    track_seat(&harness.handle).await;
    socket.next_line().await;

    let result = harness.handle.restart_task(list_key()).await;
    assert!(matches!(result, Err(TrackerError::NotRecoverable { .. })));

    socket.push(format!(r#"{LIST_KEY} 2- {{"code":"timeout"}}"#));
    let resent = harness.handle.restart_task(list_key()).await.unwrap();
    assert_eq!(resent, 1);
    assert_eq!(socket.next_line().await, watch_line());

    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::InProgress);
    assert!(task.last_error().is_none());
}

#[tokio::test]
async fn test_server_task_emerges() {
    let (harness, socket) = spawn_open().await;
    let mut events = harness.handle.subscribe();
    let key = TaskKey::new("details,2000000,2060150,31.12.2019,054Ч,23:40");

    socket.push(format!("{key} 0."));

    let event = wait_event(&mut events, |e| matches!(e, TrackerEvent::TaskEmerged { .. })).await;
    assert_eq!(event.task_key(), Some(&key));
    let task = harness.handle.get_task(key).await.unwrap().unwrap();
    assert_eq!(task.origin(), TaskOrigin::Server);
    assert_eq!(task.attempts_done(), 1);
}

#[tokio::test]
async fn test_unrecognized_line_is_dropped() {
    let (harness, mut socket) = spawn_open().await;
    track_seat(&harness.handle).await;
    socket.next_line().await;

    socket.push(format!("{LIST_KEY} something unexpected"));
    socket.push("garbage");
    socket.push(format!("{LIST_KEY} 0."));

    let task = harness.handle.get_task(list_key()).await.unwrap().unwrap();
    assert_eq!(task.attempts_done(), 1);
    assert_eq!(harness.handle.get_all_tasks().await.unwrap().len(), 1);
    assert!(harness.handle.session_state().connected);
}

#[tokio::test]
async fn test_details_and_fallback_commands() {
    let (harness, mut socket) = spawn_open().await;
    track_seat(&harness.handle).await;
    socket.next_line().await;

    let result = harness.handle.request_details(list_key(), None).await;
    assert!(matches!(result, Err(TrackerError::MissingTrain(_))));

    harness
        .handle
        .request_details(list_key(), Some(("258А".to_string(), "13:45".to_string())))
        .await
        .unwrap();
    assert_eq!(
        socket.next_line().await,
        format!("get_details {LIST_KEY} 258А 13:45")
    );

    harness.handle.set_task_fallback(list_key(), true).await.unwrap();
    assert_eq!(
        socket.next_line().await,
        format!("set_fallback_for {LIST_KEY} yes")
    );

    harness.handle.set_fallback(false).await.unwrap();
    assert_eq!(socket.next_line().await, "fallback disable");
}

#[tokio::test]
async fn test_alias_routes_reports() {
    let (harness, mut socket) = spawn_open().await;
    track_seat(&harness.handle).await;
    socket.next_line().await;

    let fork = TaskKey::new("list,2000000,2060150,31.12.2019,fork1");
    harness.handle.alias_task(fork.clone(), list_key()).await.unwrap();

    socket.push(format!(
        r#"{fork} found {{"{WATCHER_KEY}":{{"freeSeats":1}}}}"#
    ));
    let task = harness.handle.get_task(fork).await.unwrap().unwrap();
    assert_eq!(task.key(), &list_key());
    assert!(task.watcher(&WatcherKey::new(WATCHER_KEY)).unwrap().is_succeeded());
}

#[tokio::test]
async fn test_unknown_task_errors() {
    let (harness, _socket) = spawn_open().await;
    let missing = TaskKey::new("list,1,2,01.01.2020");

    assert!(matches!(
        harness.handle.stop_task(missing.clone()).await,
        Err(TrackerError::TaskNotFound(_))
    ));
    assert!(matches!(
        harness
            .handle
            .remove_watcher(missing, WatcherKey::new(WATCHER_KEY))
            .await,
        Err(TrackerError::TaskNotFound(_))
    ));
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_cancel_closes_handle() {
    let (harness, _socket) = spawn_open().await;
    assert!(harness.handle.is_connected());

    harness.cancel.cancel();
    timeout(WAIT, async {
        while harness.handle.is_connected() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("actor should stop");

    let result = harness
        .handle
        .track(list_identity(), TaskOptions::default(), seat_spec())
        .await;
    assert!(matches!(result, Err(TrackerError::ChannelClosed)));
}
