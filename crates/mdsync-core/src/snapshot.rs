//! Analytics snapshot types.
//!
//! One successful poll of the analytics endpoint. Field names follow the
//! endpoint's JSON so the response deserializes directly.

use serde::{Deserialize, Deserializer, Serialize};

/// Historical OHLCV bar. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalBar {
    #[serde(alias = "time", alias = "t")]
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// One point of a forecast series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    #[serde(alias = "time", alias = "t")]
    pub timestamp: i64,
    #[serde(alias = "volume", alias = "volatility", alias = "v")]
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Result of one analytics poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Historical bars, ascending.
    #[serde(default)]
    pub interval_stats: Vec<IntervalBar>,
    /// Rolling 24h traded volume. Missing or null reads as zero.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub past_day_volume: f64,
    /// Near-term (< 60 min) predicted volume.
    #[serde(default)]
    pub pv: Vec<SeriesPoint>,
    /// Far-term extrapolated predicted volume.
    #[serde(default)]
    pub esv: Vec<SeriesPoint>,
    /// Forecast volatility band, percent.
    #[serde(default)]
    pub future_price_volatility: Vec<SeriesPoint>,
    /// Participation scalar.
    #[serde(default)]
    pub evr: Option<f64>,
    /// Realized hourly volatility, percent.
    #[serde(default)]
    pub price_volatility: Option<f64>,
    /// Opaque overlay payload passed through to consumers.
    #[serde(default)]
    pub order_overlay_data: serde_json::Value,
}

impl MarketSnapshot {
    /// Zero interval bars is the endpoint's canonical "no data" answer.
    pub fn is_structurally_empty(&self) -> bool {
        self.interval_stats.is_empty()
    }

    /// Most recent bar close.
    pub fn last_close(&self) -> Option<f64> {
        self.interval_stats
            .iter()
            .max_by_key(|b| b.timestamp)
            .map(|b| b.close)
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}
