//! Tests for the simulate command and store-backed commands

use facematch_common::sim::LocatorStyle;
use facematch_common::{Config, Mode};
use facematchctl::commands::{open_knowledge, run_simulation, SimulateArgs};

fn config_in(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.store.data_dir = Some(dir.to_path_buf());
    config
}

#[tokio::test(start_paused = true)]
async fn test_simulation_learns_whole_roster() {
    let dir = tempfile::tempdir().unwrap();
    let args = SimulateArgs {
        people: 6,
        options: 3,
        rounds: 90,
        seed: Some(21),
        ..Default::default()
    };

    let summary = run_simulation(&config_in(dir.path()), &args).await.unwrap();

    assert_eq!(summary.mode, Mode::Learning);
    assert_eq!(summary.quiz.rounds_presented, 90);
    assert_eq!(summary.quiz.submissions, 90);
    assert_eq!(summary.people_learned, 6);
    assert_eq!(summary.session.rounds, 90);
    assert!(summary.quiz_accuracy.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_content_style_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let args = SimulateArgs {
        people: 4,
        options: 2,
        rounds: 60,
        seed: Some(8),
        style: LocatorStyle::Content,
        ..Default::default()
    };

    let summary = run_simulation(&config_in(dir.path()), &args).await.unwrap();
    assert_eq!(summary.people_learned, 4);
}

#[tokio::test(start_paused = true)]
async fn test_throwaway_simulation_leaves_store_alone() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let args = SimulateArgs {
        people: 3,
        rounds: 10,
        seed: Some(2),
        ..Default::default()
    };

    run_simulation(&config, &args).await.unwrap();
    assert_eq!(open_knowledge(&config).tracked_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_persisted_simulation_is_visible_to_stats() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let args = SimulateArgs {
        people: 3,
        options: 2,
        rounds: 40,
        seed: Some(2),
        persist: true,
        ..Default::default()
    };

    let summary = run_simulation(&config, &args).await.unwrap();
    let kb = open_knowledge(&config);
    assert_eq!(kb.people(), summary.people_learned);
    assert_eq!(kb.people(), 3);
}

#[test]
fn test_summary_serializes_for_output() {
    let summary = facematchctl::commands::SimulationSummary {
        mode: Mode::Guessing,
        quiz: Default::default(),
        quiz_accuracy: None,
        people_learned: 0,
        negatives: 0,
        session: Default::default(),
    };
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["mode"], "guessing");
    assert!(json["quiz_accuracy"].is_null());
}

#[test]
fn test_reset_removes_malformed_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let path = dir.path().join(format!("{}.json", config.store.key));
    std::fs::write(&path, "{ truncated").unwrap();
    assert_eq!(open_knowledge(&config).tracked_len(), 0);

    facematchctl::commands::reset(&config, true).unwrap();
    assert!(!path.exists());
}

#[test]
fn test_reset_without_store_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    facematchctl::commands::reset(&config, true).unwrap();
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
