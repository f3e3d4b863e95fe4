//! Aggregation planning.
//!
//! Maps a requested granularity to a bounded query window: validates the
//! time range against the interval's maximum span, resolves the matching
//! precomputed view, and issues the bucketed query. Validation failures
//! are a distinct, caller-correctable error kind.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::store::EventStore;
use crate::types::{AggregateRow, AggregationQuery, Interval};

impl Interval {
    /// Maximum allowed span of [start, end) for this granularity.
    /// Smaller granularity allows a smaller span, since bucket volume
    /// grows with span / interval.
    pub fn max_span(&self) -> Duration {
        match self {
            Interval::Minute => Duration::hours(6),
            Interval::FiveMinutes => Duration::hours(24),
            Interval::FifteenMinutes => Duration::days(3),
            Interval::Hour => Duration::days(7),
            Interval::Day => Duration::days(90),
        }
    }

    /// Name of the precomputed aggregate view for this granularity.
    pub fn view_name(&self) -> &'static str {
        match self {
            Interval::Minute => "event_stats_1m",
            Interval::FiveMinutes => "event_stats_5m",
            Interval::FifteenMinutes => "event_stats_15m",
            Interval::Hour => "event_stats_1h",
            Interval::Day => "event_stats_1d",
        }
    }

    /// Native interval literal understood by the underlying store.
    pub fn native_interval(&self) -> &'static str {
        match self {
            Interval::Minute => "1 minute",
            Interval::FiveMinutes => "5 minutes",
            Interval::FifteenMinutes => "15 minutes",
            Interval::Hour => "1 hour",
            Interval::Day => "1 day",
        }
    }
}

/// Resolved plan for one aggregation read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub interval: Interval,
    pub view_name: &'static str,
    pub native_interval: &'static str,
}

/// Validates ranges and issues bucketed queries against the store.
pub struct AggregationPlanner {
    store: Arc<dyn EventStore>,
}

impl AggregationPlanner {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Validate `[start, end)` for `interval` and resolve the view to query.
    ///
    /// Validation order: empty/inverted range first, then span versus the
    /// interval's maximum. Both are `Validation` errors, never internal.
    pub fn plan(
        &self,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<QueryPlan> {
        plan(interval, start, end)
    }

    /// Run one aggregation query, returning bucketed rows over exactly
    /// `[start, end)`.
    pub async fn aggregate(&self, query: &AggregationQuery) -> Result<Vec<AggregateRow>> {
        let plan = self.plan(query.interval, query.start, query.end)?;
        self.store.query_aggregates(&plan, query).await
    }
}

/// Free-function form of [`AggregationPlanner::plan`].
pub fn plan(interval: Interval, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<QueryPlan> {
    if end <= start {
        return Err(Error::validation("end must be after start"));
    }

    let span = end - start;
    if span > interval.max_span() {
        return Err(Error::Validation(format!(
            "span of {} minutes exceeds the {} minute maximum for {:?}",
            span.num_minutes(),
            interval.max_span().num_minutes(),
            interval,
        )));
    }

    Ok(QueryPlan {
        interval,
        view_name: interval.view_name(),
        native_interval: interval.native_interval(),
    })
}

/// Pick a granularity for callers that did not specify one.
///
/// Short spans get the finest interval whose maximum still covers them;
/// longer spans degrade to coarser intervals. The span caps take
/// precedence over raw fineness: a 20 hour span suggests `FiveMinutes`,
/// not `Minute`, because minute granularity only admits 6 hours and a
/// suggestion that `plan` would then reject is useless to the caller.
pub fn suggest_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Interval {
    let span = end - start;
    if span <= Interval::Minute.max_span() {
        Interval::Minute
    } else if span <= Interval::FiveMinutes.max_span() {
        Interval::FiveMinutes
    } else if span <= Interval::FifteenMinutes.max_span() {
        Interval::FifteenMinutes
    } else if span <= Interval::Hour.max_span() {
        Interval::Hour
    } else {
        Interval::Day
    }
}

/// Produce contiguous, non-overlapping `[bucket_start, bucket_end)` windows
/// covering exactly `[start, end)`. The final bucket is clipped to `end`
/// rather than overrunning it.
pub fn generate_buckets(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Interval,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let width = Duration::seconds(interval.bucket_width().as_secs() as i64);
    let mut buckets = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let next = (cursor + width).min(end);
        buckets.push((cursor, next));
        cursor = next;
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn plan_rejects_inverted_range() {
        let err = plan(Interval::Hour, at(1000), at(1000)).unwrap_err();
        assert!(err.is_validation());

        let err = plan(Interval::Hour, at(1000), at(999)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn plan_rejects_oversized_span() {
        // 7 hours at minute granularity exceeds the 6 hour cap.
        let err = plan(Interval::Minute, at(0), at(7 * 3600)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn plan_resolves_view_at_exact_max_span() {
        let plan = plan(Interval::Minute, at(0), at(6 * 3600)).unwrap();
        assert_eq!(plan.view_name, "event_stats_1m");
        assert_eq!(plan.native_interval, "1 minute");
    }

    #[test]
    fn buckets_cover_range_exactly() {
        // 2.5 minutes at minute granularity: two full buckets plus a clipped one.
        let buckets = generate_buckets(at(0), at(150), Interval::Minute);
        assert_eq!(
            buckets,
            vec![(at(0), at(60)), (at(60), at(120)), (at(120), at(150))]
        );

        // Contiguity: each bucket starts where the previous one ended.
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn sub_bucket_range_yields_single_clipped_bucket() {
        let buckets = generate_buckets(at(0), at(10), Interval::Hour);
        assert_eq!(buckets, vec![(at(0), at(10))]);
    }

    #[test]
    fn empty_range_yields_no_buckets() {
        assert!(generate_buckets(at(5), at(5), Interval::Minute).is_empty());
    }

    #[test]
    fn suggested_interval_degrades_with_span() {
        assert_eq!(suggest_interval(at(0), at(3600)), Interval::Minute);
        // Past minute's 6 hour cap the suggestion steps down one notch,
        // so anything up to 24 hours lands on five-minute buckets.
        assert_eq!(suggest_interval(at(0), at(20 * 3600)), Interval::FiveMinutes);
        assert_eq!(suggest_interval(at(0), at(24 * 3600)), Interval::FiveMinutes);
        assert_eq!(
            suggest_interval(at(0), at(2 * 24 * 3600)),
            Interval::FifteenMinutes
        );
        assert_eq!(suggest_interval(at(0), at(5 * 24 * 3600)), Interval::Hour);
        assert_eq!(suggest_interval(at(0), at(30 * 24 * 3600)), Interval::Day);
    }

    #[test]
    fn suggestion_is_always_plannable() {
        for days in [0i64, 1, 2, 5, 30, 89] {
            let end = at(days * 24 * 3600 + 600);
            let interval = suggest_interval(at(0), end);
            assert!(plan(interval, at(0), end).is_ok(), "span of {} days", days);
        }
    }
}
