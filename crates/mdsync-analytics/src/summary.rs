//! Market summary metrics derived from a snapshot and its timeline.

use crate::aligner::AlignedTimeline;
use mdsync_core::MarketSnapshot;
use serde::Serialize;

const HOUR_MS: i64 = 3_600_000;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SummaryMetrics {
    pub last_close: Option<f64>,
    /// Change from the first to the last bar in the window, percent.
    pub price_change_pct: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub past_day_volume: f64,
    /// Participation scalar as reported.
    pub evr: Option<f64>,
    pub hourly_volatility_pct: Option<f64>,
    pub daily_volatility_pct: Option<f64>,
    /// Predicted volume over the hour after `now`.
    pub next_hour_volume: Option<f64>,
}

/// Summarize `snapshot` as of `now_ms`.
///
/// Bar-based figures use the aligned window when available, otherwise every
/// bar in the snapshot.
pub fn summarize(
    snapshot: &MarketSnapshot,
    timeline: Option<&AlignedTimeline>,
    now_ms: u64,
) -> SummaryMetrics {
    let mut bars: Vec<_> = match timeline {
        Some(t) if !t.actual.is_empty() => t.actual.iter().collect(),
        _ => snapshot.interval_stats.iter().collect(),
    };
    bars.sort_by_key(|b| b.timestamp);

    let first_open = bars.first().map(|b| b.open);
    let last_close = bars.last().map(|b| b.close);
    let price_change_pct = match (first_open, last_close) {
        (Some(open), Some(close)) if open > 0.0 => Some((close - open) / open * 100.0),
        _ => None,
    };
    let high = bars.iter().map(|b| b.high).reduce(f64::max);
    let low = bars.iter().map(|b| b.low).reduce(f64::min);

    let hourly_volatility_pct = snapshot.price_volatility.filter(|v| v.is_finite() && *v >= 0.0);

    let next_hour_volume = timeline.and_then(|t| {
        let now = now_ms as i64;
        let horizon: Vec<f64> = t
            .forecast_volume
            .iter()
            .filter(|p| p.timestamp > now && p.timestamp <= now + HOUR_MS)
            .map(|p| p.value)
            .collect();
        (!horizon.is_empty()).then(|| horizon.iter().sum())
    });

    SummaryMetrics {
        last_close,
        price_change_pct,
        high,
        low,
        past_day_volume: snapshot.past_day_volume,
        evr: snapshot.evr,
        hourly_volatility_pct,
        daily_volatility_pct: hourly_volatility_pct.map(|v| v * 24f64.sqrt()),
        next_hour_volume,
    }
}
