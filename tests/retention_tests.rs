use shardtsdb::*;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const SEC: i64 = 1_000_000_000;
const MINUTE: i64 = 60 * SEC;
const HOUR: i64 = 60 * MINUTE;

#[derive(Debug, Default)]
struct RecordingListener {
    events: Mutex<Vec<DbEvent>>,
}

impl DbEventListener for RecordingListener {
    fn on_event(&self, event: DbEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn tags(v: &str) -> Vec<Tag> {
    vec![Tag::new("host", v)]
}

/// An engine with one hour of retention whose clock only moves when the test says so.
/// The periodic sweep is pushed far out so only `sweep_now` evicts.
fn manual_db(start: Timestamp) -> (Tsdb<i64>, Arc<ManualClock>, Arc<RecordingListener>) {
    let clock = Arc::new(ManualClock::new(start));
    let events = Arc::new(RecordingListener::default());
    let config = TsdbConfig {
        retention: Duration::from_secs(3600),
        retention_check_interval: Duration::from_secs(24 * 3600),
        clock: clock.clone(),
        event_listener: events.clone(),
        ..TsdbConfig::default()
    };
    (Tsdb::with_config(config).unwrap(), clock, events)
}

#[test]
fn test_sweep_evicts_values_older_than_retention() {
    let (db, clock, _) = manual_db(0);
    db.insert_points(vec![
        Point::new(tags("a"), 10 * SEC, 1),
        Point::new(tags("a"), 30 * SEC, 2),
        Point::new(tags("a"), 50 * SEC, 3),
    ])
    .unwrap();

    clock.set(HOUR + 30 * SEC);
    let report = db.sweep_now().unwrap();
    assert_eq!(report.cutoff, 30 * SEC);
    assert_eq!(report.evicted_values, 1);
    assert_eq!(report.retired_groups, 0);

    let got: Vec<i64> = db
        .query(&Tag::new("host", "a"), 0..=MINUTE - 1)
        .unwrap()
        .into_iter()
        .map(|v| v.value)
        .collect();
    assert_eq!(got, vec![2, 3]);
}

#[test]
fn test_expired_groups_are_pooled_and_reused() {
    let (db, clock, events) = manual_db(0);
    db.insert_points(vec![
        Point::new(tags("a"), 10 * SEC, 1),
        Point::new(tags("a"), MINUTE + 10 * SEC, 2),
    ])
    .unwrap();
    assert_eq!(db.stats().unwrap().active_shard_groups, 2);

    clock.set(HOUR + 2 * MINUTE);
    let report = db.sweep_now().unwrap();
    assert_eq!(report.retired_groups, 2);
    assert_eq!(report.evicted_values, 2);

    let stats = db.stats().unwrap();
    assert_eq!(stats.active_shard_groups, 0);
    assert_eq!(stats.pooled_shard_groups, 2);

    db.insert_points(vec![Point::new(tags("b"), HOUR + 2 * MINUTE, 9)])
        .unwrap();
    let stats = db.stats().unwrap();
    assert_eq!(stats.active_shard_groups, 1);
    assert_eq!(stats.pooled_shard_groups, 1);
    assert_eq!(stats.series, 1);

    // Old data must not resurface through the recycled group.
    assert!(db.query(&Tag::new("host", "a"), 0..=2 * HOUR).unwrap().is_empty());

    let seen = events.events.lock().unwrap().clone();
    assert!(seen.contains(&DbEvent::ShardGroupRetired { min: 0, max: MINUTE }));
    assert!(seen.contains(&DbEvent::ShardGroupCreated {
        min: HOUR + 2 * MINUTE,
        max: HOUR + 3 * MINUTE,
        reused: true,
    }));
}

#[test]
fn test_remove_before_is_idempotent() {
    let (db, _, _) = manual_db(0);
    db.insert_points(
        (0..10)
            .map(|i| Point::new(tags("a"), i * 5 * SEC, i))
            .collect(),
    )
    .unwrap();

    db.remove_before(25 * SEC).unwrap();
    let once = db.query(&Tag::new("host", "a"), 0..=MINUTE - 1).unwrap();
    let report = db.remove_before(25 * SEC).unwrap();
    let twice = db.query(&Tag::new("host", "a"), 0..=MINUTE - 1).unwrap();

    assert_eq!(report.evicted_values, 0);
    assert_eq!(once, twice);
    assert_eq!(once.len(), 5);
}

#[test]
fn test_emptied_series_dropped_on_second_sweep() {
    let store: SeriesStore<i64> = SeriesStore::new(Duration::from_secs(3600)).unwrap();
    store
        .write_points(vec![
            Point::new(tags("old"), 10, 1),
            Point::new(tags("new"), 1_000, 2),
        ])
        .unwrap();

    // The first sweep empties the entry but leaves its slot allocated.
    let first = store.remove_before(500).unwrap();
    assert_eq!(first.evicted_values, 1);
    assert_eq!(first.dropped_series, 0);
    assert_eq!(store.stats().unwrap().series, 2);

    // Nothing was written in between, so the next sweep reclaims the slot.
    let second = store.remove_before(500).unwrap();
    assert_eq!(second.evicted_values, 0);
    assert_eq!(second.dropped_series, 1);
    assert_eq!(store.stats().unwrap(), ShardStats { series: 1, values: 1 });
}

#[test]
fn test_rewritten_series_survives_second_sweep() {
    let store: SeriesStore<i64> = SeriesStore::new(Duration::from_secs(3600)).unwrap();
    store.write_points(vec![Point::new(tags("a"), 10, 1)]).unwrap();
    store.remove_before(500).unwrap();

    store.write_points(vec![Point::new(tags("a"), 600, 2)]).unwrap();
    let report = store.remove_before(500).unwrap();
    assert_eq!(report.dropped_series, 0);
    assert_eq!(
        store.query(&Tag::new("host", "a"), 0..=1_000).unwrap(),
        vec![Value::new(600, 2)]
    );
}

#[test]
fn test_background_sweep_runs_on_interval() {
    let clock = Arc::new(ManualClock::new(HOUR + 2 * MINUTE));
    let config = TsdbConfig {
        retention: Duration::from_secs(3600),
        retention_check_interval: Duration::from_millis(10),
        clock: clock.clone(),
        ..TsdbConfig::default()
    };
    let db: Tsdb<i64> = Tsdb::with_config(config).unwrap();
    db.insert_points(vec![Point::new(tags("a"), SEC, 1)]).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while db.stats().unwrap().pooled_shard_groups == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    let stats = db.stats().unwrap();
    assert_eq!(stats.pooled_shard_groups, 1);
    assert_eq!(stats.values, 0);
}

#[test]
fn test_stop_emits_lifecycle_events() {
    let (db, _, events) = manual_db(0);
    db.stop().unwrap();
    drop(db);

    let seen = events.events.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&DbEvent::RetentionThreadStarted));
    assert_eq!(seen.last(), Some(&DbEvent::RetentionThreadStopping));
}
