#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::time::Duration;

use bridge::{BridgeError, EngineDescriptor, EngineManager, SessionState, WorkerEvent};
use chess_common::{from_engine_move, GamePosition};
use cozy_chess::Move;
use engine::{OptionValue, Protocol, Score, SearchLimit};
use tempfile::TempDir;

use common::*;

fn mv(s: &str) -> Move {
    s.parse().unwrap()
}

fn after_e4() -> GamePosition {
    let mut pos = GamePosition::default();
    let e4 = from_engine_move(pos.board(), "e2e4").unwrap();
    pos.push(e4).unwrap();
    pos
}

fn manager_with(dir: &TempDir, engines: Vec<(&str, PathBuf, Protocol)>) -> EngineManager {
    let mut manager = EngineManager::new(test_config(dir));
    for (name, path, protocol) in engines {
        manager
            .add_engine(EngineDescriptor::new(name, path, protocol))
            .unwrap();
    }
    manager
}

#[tokio::test]
async fn test_events_flow_through_manager() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("a.log");
    let path = modern_engine(&dir, "engine-a", "EngineA", &log);
    let mut manager = manager_with(&dir, vec![("EngineA", path, Protocol::Modern)]);
    let mut rx = manager.subscribe();

    manager.start_engine("EngineA").await.unwrap();
    assert_eq!(next_event(&mut rx).await, WorkerEvent::Ready("EngineA".into()));
    assert!(manager.is_engine_running());
    assert_eq!(manager.active_engine_name(), Some("EngineA"));

    manager
        .analyze_position(
            GamePosition::default(),
            2,
            SearchLimit::time(Duration::from_millis(100)),
        )
        .unwrap();
    let seen = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Analysis(i) if i.multipv == 2)).await;
    let WorkerEvent::Analysis(best) = &seen[0] else {
        panic!("expected analysis, got {:?}", seen[0]);
    };
    assert_eq!(best.multipv, 1);
    assert_eq!(best.score, Some(Score::Centipawns(25)));
    assert_eq!(best.pv_san, vec!["e4", "e5"]);

    manager
        .get_best_move(
            GamePosition::default(),
            SearchLimit::time(Duration::from_millis(100)),
        )
        .unwrap();
    let seen = wait_for(&mut rx, |e| matches!(e, WorkerEvent::MoveReady(_))).await;
    assert_eq!(seen.last(), Some(&WorkerEvent::MoveReady(Some(mv("e2e4")))));

    manager.stop_engine().await;
    assert_eq!(next_event(&mut rx).await, WorkerEvent::Stopped);
    assert!(!manager.is_engine_running());
    assert_eq!(manager.active_engine_name(), None);
    assert_eq!(received(&log).last().map(String::as_str), Some("quit"));
}

#[tokio::test]
async fn test_switching_engines_stops_previous_first() {
    let dir = TempDir::new().unwrap();
    let log_a = dir.path().join("a.log");
    let log_b = dir.path().join("b.log");
    let a = modern_engine(&dir, "engine-a", "EngineA", &log_a);
    let b = modern_engine(&dir, "engine-b", "EngineB", &log_b);
    let mut manager = manager_with(
        &dir,
        vec![
            ("EngineA", a, Protocol::Modern),
            ("EngineB", b, Protocol::Modern),
        ],
    );
    let mut rx = manager.subscribe();

    manager.start_engine("EngineA").await.unwrap();
    assert_eq!(next_event(&mut rx).await, WorkerEvent::Ready("EngineA".into()));

    manager.start_engine("EngineB").await.unwrap();
    let seen = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Ready(_))).await;
    assert_eq!(
        seen,
        vec![WorkerEvent::Stopped, WorkerEvent::Ready("EngineB".into())]
    );
    assert_eq!(received(&log_a).last().map(String::as_str), Some("quit"));
    assert_eq!(manager.active_engine_name(), Some("EngineB"));

    manager.stop_engine().await;
    assert_eq!(next_event(&mut rx).await, WorkerEvent::Stopped);
}

#[tokio::test]
async fn test_stop_twice_emits_one_stopped() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("a.log");
    let path = modern_engine(&dir, "engine-a", "EngineA", &log);
    let mut manager = manager_with(&dir, vec![("EngineA", path, Protocol::Modern)]);
    let mut rx = manager.subscribe();

    // Nothing running yet.
    manager.stop_engine().await;

    manager.start_engine("EngineA").await.unwrap();
    assert_eq!(next_event(&mut rx).await, WorkerEvent::Ready("EngineA".into()));

    manager.stop_engine().await;
    manager.stop_engine().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(drain(&mut rx), vec![WorkerEvent::Stopped]);
}

#[tokio::test]
async fn test_unknown_engine_reports_error() {
    let dir = TempDir::new().unwrap();
    let mut manager = EngineManager::new(test_config(&dir));
    let mut rx = manager.subscribe();

    let err = manager.start_engine("Nope").await.unwrap_err();
    assert!(matches!(err, BridgeError::UnknownEngine(ref name) if name == "Nope"));
    match next_event(&mut rx).await {
        WorkerEvent::Error(msg) => assert!(msg.contains("Nope")),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(manager.state().is_none());
}

#[tokio::test]
async fn test_add_missing_executable_reports_error() {
    let dir = TempDir::new().unwrap();
    let mut manager = EngineManager::new(test_config(&dir));
    let mut rx = manager.subscribe();

    let result = manager.add_engine(EngineDescriptor::new(
        "Ghost",
        dir.path().join("ghost"),
        Protocol::Modern,
    ));
    assert!(matches!(result, Err(BridgeError::MissingExecutable(_))));
    assert!(matches!(next_event(&mut rx).await, WorkerEvent::Error(_)));
    assert!(manager.engines().is_empty());
}

#[tokio::test]
async fn test_requests_without_engine_are_refused() {
    let dir = TempDir::new().unwrap();
    let mut manager = EngineManager::new(test_config(&dir));

    let limit = SearchLimit::time(Duration::from_millis(100));
    assert!(matches!(
        manager.get_best_move(GamePosition::default(), limit),
        Err(BridgeError::NotRunning)
    ));
    assert!(matches!(
        manager.analyze_position(GamePosition::default(), 1, limit),
        Err(BridgeError::NotRunning)
    ));
    assert!(matches!(
        manager.update_option("Hash", OptionValue::Int(16)),
        Err(BridgeError::NotRunning)
    ));
    manager.stop_analysis();
}

#[tokio::test]
async fn test_update_option_persists_on_descriptor() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("a.log");
    let path = modern_engine(&dir, "engine-a", "EngineA", &log);
    let mut manager = manager_with(&dir, vec![("EngineA", path, Protocol::Modern)]);
    let mut rx = manager.subscribe();

    manager.start_engine("EngineA").await.unwrap();
    next_event(&mut rx).await;

    manager
        .update_option("Contempt", OptionValue::Int(15))
        .unwrap();
    manager.update_option("MultiPV", OptionValue::Int(3)).unwrap();
    manager
        .get_best_move(
            GamePosition::default(),
            SearchLimit::time(Duration::from_millis(50)),
        )
        .unwrap();
    wait_for(&mut rx, |e| matches!(e, WorkerEvent::MoveReady(_))).await;

    let sent = received(&log);
    assert!(sent.contains(&"setoption name Contempt value 15".to_string()));
    assert!(!sent.iter().any(|l| l.contains("MultiPV")));

    let descriptor = manager.engine("EngineA").unwrap();
    assert_eq!(
        descriptor.options.extra.get("Contempt"),
        Some(&OptionValue::Int(15))
    );
    assert_eq!(descriptor.options.multi_pv, Some(3));

    let file = dir.path().join("saved.json");
    manager.save_registry_to(&file).unwrap();
    assert!(std::fs::read_to_string(&file).unwrap().contains("\"Contempt\": 15"));

    manager.stop_engine().await;
}

#[tokio::test]
async fn test_stop_analysis_keeps_engine_running() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("stubborn.log");
    let path = stubborn_engine(&dir, &log);
    let mut manager = manager_with(&dir, vec![("Stubborn", path, Protocol::Modern)]);
    let mut rx = manager.subscribe();

    manager.start_engine("Stubborn").await.unwrap();
    next_event(&mut rx).await;

    manager
        .analyze_position(
            GamePosition::default(),
            1,
            SearchLimit::time(Duration::from_secs(30)),
        )
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, WorkerEvent::Analysis(_)));

    let mut state = manager.watch_state().unwrap();
    manager.stop_analysis();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == SessionState::Ready),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(received(&log).contains(&"stop".to_string()));
    assert!(manager.is_engine_running());
    manager.stop_engine().await;
}

#[tokio::test]
async fn test_move_timeout_reports_error_then_no_move() {
    let dir = TempDir::new().unwrap();
    let path = silent_engine(&dir);
    let mut manager = manager_with(&dir, vec![("Silent", path, Protocol::Modern)]);
    let mut rx = manager.subscribe();

    manager.start_engine("Silent").await.unwrap();
    next_event(&mut rx).await;

    manager
        .get_best_move(
            GamePosition::default(),
            SearchLimit::time(Duration::from_millis(100)),
        )
        .unwrap();
    let seen = wait_for(&mut rx, |e| matches!(e, WorkerEvent::MoveReady(_))).await;
    assert_eq!(seen.len(), 2);
    assert!(matches!(&seen[0], WorkerEvent::Error(msg) if msg.contains("Timed out")));
    assert_eq!(seen[1], WorkerEvent::MoveReady(None));
    assert!(manager.is_engine_running());

    manager.stop_engine().await;
}

#[tokio::test]
async fn test_legacy_engine_behind_worker() {
    let dir = TempDir::new().unwrap();
    let path = legacy_engine(&dir, "e7e5");
    let mut manager = manager_with(&dir, vec![("OldKing", path, Protocol::Legacy)]);
    let mut rx = manager.subscribe();

    manager.start_engine("OldKing").await.unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        WorkerEvent::Ready("oldking (WinBoard)".into())
    );

    manager
        .analyze_position(after_e4(), 3, SearchLimit::time(Duration::from_millis(100)))
        .unwrap();
    match next_event(&mut rx).await {
        WorkerEvent::Analysis(info) => {
            assert_eq!(info.multipv, 1);
            assert_eq!(info.score, Some(Score::Centipawns(30)));
            assert_eq!(info.pv_san, vec!["e5"]);
        }
        other => panic!("expected analysis, got {:?}", other),
    }

    manager
        .get_best_move(after_e4(), SearchLimit::time(Duration::from_millis(100)))
        .unwrap();
    let seen = wait_for(&mut rx, |e| matches!(e, WorkerEvent::MoveReady(_))).await;
    assert_eq!(seen.last(), Some(&WorkerEvent::MoveReady(Some(mv("e7e5")))));

    manager.stop_engine().await;
    assert_eq!(next_event(&mut rx).await, WorkerEvent::Stopped);
}
