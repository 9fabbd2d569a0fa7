//! Alignment of historical bars with forecast series.
//!
//! Produces one ascending timeline: actual bars over the rolling window, then
//! predicted volume up to the last timestamp both forecast series cover. The
//! near/far predicted-volume splice is smoothed by averaging the join value.

use mdsync_core::{IntervalBar, MarketSnapshot, SeriesPoint};
use serde::Serialize;

/// Historical bars and forecasts on a common time axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AlignedTimeline {
    /// Lower bound of the actual series.
    pub first_timestamp: i64,
    /// Upper bound of every series.
    pub last_prediction_timestamp: i64,
    /// Historical bars in `[first_timestamp, last_prediction_timestamp]`.
    pub actual: Vec<IntervalBar>,
    /// Near-term then far-term predicted volume, after the last actual bar.
    pub forecast_volume: Vec<SeriesPoint>,
    /// Forecast volatility band, after the last actual bar.
    pub forecast_volatility: Vec<SeriesPoint>,
}

impl AlignedTimeline {
    pub fn last_actual_timestamp(&self) -> Option<i64> {
        self.actual.last().map(|b| b.timestamp)
    }

    /// Actual bar volume followed by forecast volume.
    pub fn joined_volume(&self) -> Vec<SeriesPoint> {
        self.actual
            .iter()
            .map(|b| SeriesPoint::new(b.timestamp, b.volume))
            .chain(self.forecast_volume.iter().copied())
            .collect()
    }

    /// Actual volume as its own series.
    pub fn actual_volume(&self) -> Vec<SeriesPoint> {
        self.actual
            .iter()
            .map(|b| SeriesPoint::new(b.timestamp, b.volume))
            .collect()
    }
}

/// Sort ascending, keep the last value seen for a repeated timestamp.
fn sorted_series(points: &[SeriesPoint]) -> Vec<SeriesPoint> {
    let mut out: Vec<SeriesPoint> = points
        .iter()
        .filter(|p| p.value.is_finite())
        .copied()
        .collect();
    out.sort_by_key(|p| p.timestamp);
    dedup_keep_last(&mut out, |p| p.timestamp);
    out
}

fn dedup_keep_last<T, F: Fn(&T) -> i64>(items: &mut Vec<T>, ts: F) {
    // Stable sort keeps input order within a timestamp; reversing makes
    // `dedup_by_key` keep the last occurrence.
    items.reverse();
    items.dedup_by_key(|item| ts(item));
    items.reverse();
}

/// Align `snapshot` to the window starting at `window_start_ms`.
///
/// Returns `None` when neither the volatility nor the extrapolated-volume
/// forecast is present.
pub fn align(snapshot: &MarketSnapshot, window_start_ms: i64) -> Option<AlignedTimeline> {
    let earliest_bar = snapshot.interval_stats.iter().map(|b| b.timestamp).min();
    let first_timestamp = earliest_bar.map_or(window_start_ms, |ts| ts.max(window_start_ms));

    let volatility = sorted_series(&snapshot.future_price_volatility);
    let far = sorted_series(&snapshot.esv);
    let last_prediction_timestamp = [volatility.last(), far.last()]
        .into_iter()
        .flatten()
        .map(|p| p.timestamp)
        .min()?;

    let mut actual: Vec<IntervalBar> = snapshot
        .interval_stats
        .iter()
        .filter(|b| b.timestamp >= first_timestamp && b.timestamp <= last_prediction_timestamp)
        .cloned()
        .collect();
    actual.sort_by_key(|b| b.timestamp);
    dedup_keep_last(&mut actual, |b| b.timestamp);

    // Forecasts start strictly after the last actual bar.
    let floor = actual.last().map_or(i64::MIN, |b| b.timestamp);
    let in_range = |p: &SeriesPoint| p.timestamp > floor && p.timestamp <= last_prediction_timestamp;

    let near: Vec<SeriesPoint> = sorted_series(&snapshot.pv)
        .into_iter()
        .filter(in_range)
        .collect();
    let near_end = near.last().map_or(floor, |p| p.timestamp);
    let mut far_tail: Vec<SeriesPoint> = far
        .into_iter()
        .filter(|p| in_range(p) && p.timestamp > near_end)
        .collect();

    if let (Some(last_near), Some(first_far)) = (near.last(), far_tail.first_mut()) {
        first_far.value = (last_near.value + first_far.value) / 2.0;
    }

    let mut forecast_volume = near;
    forecast_volume.append(&mut far_tail);

    let forecast_volatility = volatility.into_iter().filter(in_range).collect();

    Some(AlignedTimeline {
        first_timestamp,
        last_prediction_timestamp,
        actual,
        forecast_volume,
        forecast_volatility,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64, volume: f64) -> IntervalBar {
        IntervalBar {
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    fn points(pairs: &[(i64, f64)]) -> Vec<SeriesPoint> {
        pairs.iter().map(|&(t, v)| SeriesPoint::new(t, v)).collect()
    }

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            interval_stats: vec![bar(0, 1.0, 1.0), bar(10, 2.0, 2.0), bar(20, 3.0, 3.0), bar(30, 4.0, 4.0)],
            pv: points(&[(40, 10.0), (50, 12.0)]),
            esv: points(&[(60, 20.0), (70, 22.0), (80, 24.0)]),
            future_price_volatility: points(&[(40, 1.0), (60, 1.1), (75, 1.2)]),
            ..Default::default()
        }
    }

    fn assert_strictly_increasing(timestamps: &[i64]) {
        for pair in timestamps.windows(2) {
            assert!(pair[0] < pair[1], "not strictly increasing: {timestamps:?}");
        }
    }

    #[test]
    fn test_align_window_and_clip() {
        let timeline = align(&snapshot(), 5).unwrap();
        assert_eq!(timeline.first_timestamp, 5);
        assert_eq!(timeline.last_prediction_timestamp, 75);

        let actual_ts: Vec<_> = timeline.actual.iter().map(|b| b.timestamp).collect();
        assert_eq!(actual_ts, vec![10, 20, 30]);

        let forecast_ts: Vec<_> = timeline.forecast_volume.iter().map(|p| p.timestamp).collect();
        assert_eq!(forecast_ts, vec![40, 50, 60, 70]);
        let vol_ts: Vec<_> = timeline.forecast_volatility.iter().map(|p| p.timestamp).collect();
        assert_eq!(vol_ts, vec![40, 60, 75]);
    }

    #[test]
    fn test_join_value_averaged() {
        let timeline = align(&snapshot(), 0).unwrap();
        let join = timeline
            .forecast_volume
            .iter()
            .find(|p| p.timestamp == 60)
            .unwrap();
        assert_eq!(join.value, (12.0 + 20.0) / 2.0);
        // Only the first far-term point is touched.
        assert_eq!(timeline.forecast_volume.last().unwrap().value, 22.0);
    }

    #[test]
    fn test_abort_without_forecasts() {
        let mut snap = snapshot();
        snap.esv.clear();
        snap.future_price_volatility.clear();
        assert!(align(&snap, 0).is_none());
    }

    #[test]
    fn test_single_forecast_series_sets_bound() {
        let mut snap = snapshot();
        snap.future_price_volatility.clear();
        let timeline = align(&snap, 0).unwrap();
        assert_eq!(timeline.last_prediction_timestamp, 80);
        assert_eq!(timeline.forecast_volume.last().unwrap().timestamp, 80);
    }

    #[test]
    fn test_overlapping_inputs_stay_strictly_increasing() {
        let snap = MarketSnapshot {
            interval_stats: vec![bar(30, 1.0, 1.0), bar(10, 1.0, 1.0), bar(30, 2.0, 5.0)],
            pv: points(&[(20, 1.0), (30, 2.0), (40, 3.0), (40, 4.0)]),
            esv: points(&[(35, 1.0), (40, 9.0), (45, 10.0)]),
            future_price_volatility: points(&[(50, 1.0)]),
            ..Default::default()
        };
        let timeline = align(&snap, 0).unwrap();
        let joined: Vec<_> = timeline.joined_volume().iter().map(|p| p.timestamp).collect();
        assert_eq!(joined, vec![10, 30, 40, 45]);
        // Duplicate bar timestamp keeps the later record.
        assert_eq!(timeline.actual[1].volume, 5.0);
        // Duplicate near-term timestamp keeps the later value, then splices.
        assert_eq!(timeline.forecast_volume[0].value, 4.0);
        assert_eq!(timeline.forecast_volume[1].value, (4.0 + 10.0) / 2.0);
    }

    #[test]
    fn test_timestamps_strictly_increasing_for_generated_inputs() {
        // Small LCG so the test is deterministic without extra crates.
        let mut seed: u64 = 0x5DEE_CE66;
        let mut next = |bound: i64| {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((seed >> 33) as i64).rem_euclid(bound)
        };

        for _ in 0..500 {
            let mut series = |n: i64| -> Vec<SeriesPoint> {
                (0..next(n)).map(|_| SeriesPoint::new(next(100), next(50) as f64)).collect()
            };
            let pv = series(8);
            let esv = series(8);
            let vol = series(8);
            let bars = (0..next(10))
                .map(|_| bar(next(100), 1.0, next(20) as f64))
                .collect();
            let snap = MarketSnapshot {
                interval_stats: bars,
                pv,
                esv,
                future_price_volatility: vol,
                ..Default::default()
            };

            let Some(timeline) = align(&snap, next(40)) else {
                assert!(snap.esv.is_empty() && snap.future_price_volatility.is_empty());
                continue;
            };
            let joined: Vec<_> = timeline.joined_volume().iter().map(|p| p.timestamp).collect();
            assert_strictly_increasing(&joined);
            let mut vol_line: Vec<_> = timeline.actual.iter().map(|b| b.timestamp).collect();
            vol_line.extend(timeline.forecast_volatility.iter().map(|p| p.timestamp));
            assert_strictly_increasing(&vol_line);
            assert!(joined.iter().all(|&t| t <= timeline.last_prediction_timestamp));
        }
    }
}
