//! Persistence and recovery tests for the cognitive routing core.
//!
//! These verify that per-user keyword weights survive a store restart
//! (reopen the same `redb` file in a fresh process) and that feedback
//! history recorded before a restart is still visible to statistics.

use std::collections::HashMap;

use divinesense::feedback::{RedbWeightStore, UserWeights, WeightStore};
use divinesense::types::{FeedbackKind, Intent, RouteSource, RouterFeedback};

fn store_at(dir: &std::path::Path) -> RedbWeightStore {
    RedbWeightStore::open(dir).unwrap()
}

#[test]
fn weights_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    // First session: save weights and drop the store.
    {
        let store = store_at(dir.path());
        let mut weights = UserWeights::new();
        weights.insert("schedule".into(), HashMap::from([("提醒".to_string(), 4u8)]));
        weights.insert("memo".into(), HashMap::from([("笔记".to_string(), 2u8)]));
        store.save_weights(42, weights);
    }

    // Second session: reopen and verify.
    {
        let store = store_at(dir.path());
        let weights = store.get_weights(42);
        assert_eq!(weights.get("schedule").unwrap().get("提醒"), Some(&4));
        assert_eq!(weights.get("memo").unwrap().get("笔记"), Some(&2));
    }
}

#[test]
fn overwriting_weights_replaces_the_prior_snapshot() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let store = store_at(dir.path());
        let mut first = UserWeights::new();
        first.insert("schedule".into(), HashMap::from([("提醒".to_string(), 3u8)]));
        store.save_weights(1, first);

        let mut second = UserWeights::new();
        second.insert("schedule".into(), HashMap::from([("提醒".to_string(), 5u8)]));
        store.save_weights(1, second);
    }

    let store = store_at(dir.path());
    let weights = store.get_weights(1);
    assert_eq!(weights.get("schedule").unwrap().get("提醒"), Some(&5));
}

#[test]
fn feedback_history_survives_restart_and_feeds_stats() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let store = store_at(dir.path());
        for i in 0..6 {
            let actual = if i % 3 == 0 { Intent::MemoSearch } else { Intent::ScheduleCreate };
            store.record_feedback(&RouterFeedback::new(
                9,
                "提醒我明天开会",
                Intent::ScheduleCreate,
                actual,
                FeedbackKind::Positive,
                RouteSource::Rule,
            ));
        }
    }

    // Reopen in a fresh store handle, as a new process would.
    let store = store_at(dir.path());
    let stats = store.get_stats(9, 10);
    assert_eq!(stats.total, 6);
    assert!(stats.accuracy > 0.0 && stats.accuracy < 1.0);
}

#[test]
fn unknown_user_has_no_persisted_weights() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_at(dir.path());
    let weights = store.get_weights(999);
    assert!(weights.is_empty());
}

#[test]
fn stats_window_narrows_to_most_recent_records_after_reopen() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let store = store_at(dir.path());
        for i in 0..10 {
            let actual = if i < 5 { Intent::ScheduleCreate } else { Intent::MemoSearch };
            store.record_feedback(&RouterFeedback::new(
                3,
                "x",
                Intent::ScheduleCreate,
                actual,
                FeedbackKind::Positive,
                RouteSource::Rule,
            ));
        }
    }

    let store = store_at(dir.path());
    let stats = store.get_stats(3, 4);
    assert_eq!(stats.total, 4);
    // The four most recent records (by timestamp) were all mismatched (MemoSearch != ScheduleCreate).
    assert_eq!(stats.correct, 0);
}
