#![cfg(feature = "prometheus")]

use std::sync::OnceLock;
use std::time::Duration;

use shardtsdb::telemetry::db_metrics::{self, InProcessPrometheus};
use shardtsdb::{Point, SeriesStore, Tag, Tsdb};

fn install_prometheus_once() -> &'static InProcessPrometheus {
    static PROM: OnceLock<InProcessPrometheus> = OnceLock::new();
    PROM.get_or_init(|| {
        InProcessPrometheus::install(Duration::from_millis(25))
            .expect("failed to install in-process prometheus recorder")
    })
}

fn parse_sample(rendered: &str, metric: &str) -> Option<f64> {
    for line in rendered.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let key = parts.next()?;
        let val = parts.next()?;
        // Support exact match and label form: `name{...} value`.
        if key == metric
            || key.starts_with(metric) && key.as_bytes().get(metric.len()).copied() == Some(b'{')
        {
            if let Ok(v) = val.parse::<f64>() {
                return Some(v);
            }
        }
    }
    None
}

fn parse_counter(rendered: &str, base_name: &str) -> f64 {
    parse_sample(rendered, &format!("{}_total", base_name))
        .or_else(|| parse_sample(rendered, base_name))
        .unwrap_or(0.0)
}

fn extract_lines(rendered: &str) -> String {
    rendered
        .lines()
        .filter(|l| l.contains("shardtsdb_"))
        .take(200)
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn emits_ingest_query_and_retention_metrics() {
    let prom = install_prometheus_once();

    let before = prom.render();
    let before_ingest = parse_counter(&before, db_metrics::INGEST_POINTS);
    let before_evicted = parse_counter(&before, db_metrics::RETENTION_EVICTED_VALUES);
    let query_count = format!("{}_count", db_metrics::QUERY_DURATION_SECONDS);
    let sweep_count = format!("{}_count", db_metrics::RETENTION_SWEEP_DURATION_SECONDS);
    let before_queries = parse_sample(&before, &query_count).unwrap_or(0.0);
    let before_sweeps = parse_sample(&before, &sweep_count).unwrap_or(0.0);

    let db: Tsdb<f64> = Tsdb::new(Duration::from_secs(3600)).unwrap();
    let points = 10i64;
    db.insert_points(
        (0..points)
            .map(|i| Point::new(vec![Tag::new("host", "test")], i, i as f64 * 1.25))
            .collect(),
    )
    .unwrap();
    db.query(&Tag::new("host", "test"), 0..=points).unwrap();

    // The system clock is far past these timestamps, so one sweep evicts all of them.
    let report = db.sweep_now().unwrap();
    assert_eq!(report.evicted_values, points as usize);

    let store: SeriesStore<f64> = SeriesStore::new(Duration::from_secs(3600)).unwrap();
    store
        .write_points(vec![Point::new(vec![Tag::new("host", "store")], 1, 0.5)])
        .unwrap();

    // Give the exporter time to run upkeep at least once.
    std::thread::sleep(Duration::from_millis(60));

    let after = prom.render();
    let after_ingest = parse_counter(&after, db_metrics::INGEST_POINTS);
    let after_evicted = parse_counter(&after, db_metrics::RETENTION_EVICTED_VALUES);
    let after_queries = parse_sample(&after, &query_count).unwrap_or(0.0);
    let after_sweeps = parse_sample(&after, &sweep_count).unwrap_or(0.0);

    assert!(
        after_ingest >= before_ingest + (points as f64) + 1.0,
        "expected ingest counter to increase by at least {}, before={}, after={}\n\nRendered shardtsdb_* metrics:\n{}",
        points + 1,
        before_ingest,
        after_ingest,
        extract_lines(&after)
    );
    assert!(
        after_evicted >= before_evicted + (points as f64),
        "expected evicted counter to increase, before={}, after={}",
        before_evicted,
        after_evicted
    );
    assert!(
        after_queries >= before_queries + 1.0,
        "expected query histogram count to increase, before={}, after={}",
        before_queries,
        after_queries
    );
    assert!(
        after_sweeps >= before_sweeps + 1.0,
        "expected sweep histogram count to increase, before={}, after={}",
        before_sweeps,
        after_sweeps
    );
    assert!(
        after.contains(db_metrics::POOLED_SHARD_GROUPS),
        "expected shard group gauges to be rendered\n{}",
        extract_lines(&after)
    );
}
