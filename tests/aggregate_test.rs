use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use eventgate::{
    AggregationPlanner, AggregationQuery, EventInput, EventStore, InMemoryStore, Interval,
};

#[tokio::test]
async fn aggregate_buckets_counts_and_durations() {
    let store = Arc::new(InMemoryStore::new());
    let start = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();

    // Two events in the first minute (one with a duration), one in the
    // third, none in the second.
    for (offset_secs, duration) in [(10, Some(120)), (40, None), (130, Some(80))] {
        let mut input = EventInput::new("page.view", "web")
            .with_timestamp(start + Duration::seconds(offset_secs));
        input.duration_ms = duration;
        store.create_event(input).await.unwrap();
    }

    let planner = AggregationPlanner::new(store);
    let rows = planner
        .aggregate(&AggregationQuery {
            interval: Interval::Minute,
            start,
            end: start + Duration::seconds(180),
            event_type: None,
            source: None,
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].count, 2);
    assert_eq!(rows[0].avg_duration_ms, Some(120.0));
    assert_eq!(rows[1].count, 0);
    assert_eq!(rows[1].avg_duration_ms, None);
    assert_eq!(rows[2].count, 1);
    assert_eq!(rows[2].avg_duration_ms, Some(80.0));

    // Buckets tile [start, end) exactly.
    assert_eq!(rows[0].bucket_start, start);
    assert_eq!(rows[2].bucket_end, start + Duration::seconds(180));
}

#[tokio::test]
async fn aggregate_applies_filters() {
    let store = Arc::new(InMemoryStore::new());
    let start = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();

    for (event_type, source) in [
        ("page.view", "web"),
        ("page.view", "mobile"),
        ("api.call", "web"),
    ] {
        store
            .create_event(
                EventInput::new(event_type, source)
                    .with_timestamp(start + Duration::seconds(5)),
            )
            .await
            .unwrap();
    }

    let planner = AggregationPlanner::new(store);
    let rows = planner
        .aggregate(&AggregationQuery {
            interval: Interval::Minute,
            start,
            end: start + Duration::seconds(60),
            event_type: Some("page.view".to_string()),
            source: Some("web".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 1);
}

#[tokio::test]
async fn aggregate_rejects_invalid_ranges_before_querying() {
    let store = Arc::new(InMemoryStore::new());
    let planner = AggregationPlanner::new(store);
    let start = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();

    let inverted = planner
        .aggregate(&AggregationQuery {
            interval: Interval::Hour,
            start,
            end: start,
            event_type: None,
            source: None,
        })
        .await
        .unwrap_err();
    assert!(inverted.is_validation());

    // 8 days at hour granularity exceeds the 7 day cap.
    let oversized = planner
        .aggregate(&AggregationQuery {
            interval: Interval::Hour,
            start,
            end: start + Duration::days(8),
            event_type: None,
            source: None,
        })
        .await
        .unwrap_err();
    assert!(oversized.is_validation());
}
