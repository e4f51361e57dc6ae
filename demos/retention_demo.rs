use shardtsdb::{DbError, ManualClock, Point, Tag, Tsdb, TsdbConfig};
use std::sync::Arc;
use std::time::Duration;

const SEC: i64 = 1_000_000_000;
const MINUTE: i64 = 60 * SEC;

fn main() -> Result<(), DbError> {
    // Drive retention with a manual clock so the demo is deterministic.
    let clock = Arc::new(ManualClock::new(0));
    let config = TsdbConfig {
        retention: Duration::from_secs(5 * 60),
        retention_check_interval: Duration::from_secs(60 * 60),
        shard_group_duration: Duration::from_secs(60),
        clock: clock.clone(),
        ..TsdbConfig::default()
    };

    println!("Creating engine with 5 minutes of retention and 1 minute shard groups");
    let db: Tsdb<f64> = Tsdb::with_config(config)?;

    // Ten minutes of cpu samples, one every 10 seconds, for three hosts.
    println!("Inserting ten minutes of data...");
    for step in 0..60 {
        let t = step * 10 * SEC;
        let points = (0..3)
            .map(|h| {
                let tags = vec![
                    Tag::new("host", format!("server{}", h)),
                    Tag::new("metric", "cpu_usage"),
                ];
                Point::new(tags, t, (step + h) as f64 / 10.0)
            })
            .collect();
        db.insert_points(points)?;
    }

    let stats = db.stats()?;
    println!(
        "  {} active shard groups, {} series, {} values",
        stats.active_shard_groups, stats.series, stats.values
    );

    let host = Tag::new("host", "server1");
    let values = db.query(&host, 2 * MINUTE..=2 * MINUTE + 30 * SEC)?;
    println!("server1 between 2m and 2m30s: {} values", values.len());
    for v in &values {
        println!("  t={}s value={:.1}", v.unix_nano / SEC, v.value);
    }

    // Move the clock to 10 minutes and sweep: everything before 5 minutes ages out.
    clock.set(10 * MINUTE);
    let report = db.sweep_now()?;
    println!(
        "Sweep at cutoff {}s: evicted {} values, retired {} shard groups",
        report.cutoff / SEC,
        report.evicted_values,
        report.retired_groups
    );

    let stats = db.stats()?;
    println!(
        "  {} active shard groups, {} pooled, {} values left",
        stats.active_shard_groups, stats.pooled_shard_groups, stats.values
    );

    // New data reuses the pooled groups instead of allocating.
    let tags = vec![Tag::new("host", "server0"), Tag::new("metric", "cpu_usage")];
    db.insert_points(vec![Point::new(tags, 10 * MINUTE + SEC, 0.42)])?;
    let stats = db.stats()?;
    println!(
        "After a new write at 10m: {} active, {} pooled",
        stats.active_shard_groups, stats.pooled_shard_groups
    );

    println!("Active windows:");
    for (min, max) in db.shard_group_windows()? {
        println!("  [{}s, {}s)", min / SEC, max / SEC);
    }

    db.stop()?;
    println!("Engine stopped");
    Ok(())
}
