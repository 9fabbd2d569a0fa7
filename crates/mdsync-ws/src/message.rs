//! Streaming wire envelopes.
//!
//! Outgoing commands:
//! `{"command": "subscribe"|"unsubscribe"|"keep_alive", "data_type": ..., "exchanges"?: [..], "exchange"?: .., "pair": ..}`
//!
//! Incoming data:
//! `{"type": "order_book_update"|"price_update", "exchange": .., "pair"?: .., "book"|"price": ..}`

use mdsync_core::{ChannelType, InstrumentKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Outgoing commands
// ============================================================================

/// Command verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Subscribe,
    Unsubscribe,
    KeepAlive,
}

/// Wire name of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    OrderBook,
    PairPrice,
}

impl From<ChannelType> for DataType {
    fn from(channel: ChannelType) -> Self {
        match channel {
            ChannelType::OrderBook => Self::OrderBook,
            ChannelType::LastPrice => Self::PairPrice,
        }
    }
}

impl From<DataType> for ChannelType {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::OrderBook => Self::OrderBook,
            DataType::PairPrice => Self::LastPrice,
        }
    }
}

/// Outgoing command envelope.
///
/// Order book commands address venues through `exchanges`, price commands
/// through `exchange`. Keep-alives carry only the verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsCommand {
    pub command: CommandKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_type: Option<DataType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exchanges: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pair: Option<String>,
}

impl WsCommand {
    fn channel_command(command: CommandKind, key: &InstrumentKey, channel: ChannelType) -> Self {
        let (exchanges, exchange) = match channel {
            ChannelType::OrderBook => (Some(vec![key.venue.clone()]), None),
            ChannelType::LastPrice => (None, Some(key.venue.clone())),
        };
        Self {
            command,
            data_type: Some(channel.into()),
            exchanges,
            exchange,
            pair: Some(key.pair.clone()),
        }
    }

    pub fn subscribe(key: &InstrumentKey, channel: ChannelType) -> Self {
        Self::channel_command(CommandKind::Subscribe, key, channel)
    }

    pub fn unsubscribe(key: &InstrumentKey, channel: ChannelType) -> Self {
        Self::channel_command(CommandKind::Unsubscribe, key, channel)
    }

    pub fn keep_alive() -> Self {
        Self {
            command: CommandKind::KeepAlive,
            data_type: None,
            exchanges: None,
            exchange: None,
            pair: None,
        }
    }

    /// Channel targeted by this command, if any.
    pub fn channel(&self) -> Option<ChannelType> {
        self.data_type.map(Into::into)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Incoming data
// ============================================================================

/// Raw book level: either `[price, size]` or `{"price": .., "size": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawLevel {
    Pair(Decimal, Decimal),
    Object {
        price: Decimal,
        #[serde(alias = "quantity", alias = "amount")]
        size: Decimal,
    },
}

impl RawLevel {
    pub fn price(&self) -> Decimal {
        match self {
            Self::Pair(px, _) | Self::Object { price: px, .. } => *px,
        }
    }

    pub fn size(&self) -> Decimal {
        match self {
            Self::Pair(_, sz) | Self::Object { size: sz, .. } => *sz,
        }
    }
}

/// Raw order book payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawBook {
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    #[serde(default, alias = "mid", alias = "midPrice")]
    pub mid_price: Option<Decimal>,
    #[serde(default, alias = "spreadBps")]
    pub spread_bps: Option<f64>,
    #[serde(default, alias = "contractValue")]
    pub contract_value: Option<Decimal>,
    #[serde(default, alias = "isInverse")]
    pub is_inverse: Option<bool>,
}

/// Raw last-price payload: a bare number/string or `{"price": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Bare(Decimal),
    Detailed {
        #[serde(alias = "last", alias = "value")]
        price: Decimal,
    },
}

impl RawPrice {
    pub fn value(&self) -> Decimal {
        match self {
            Self::Bare(px) | Self::Detailed { price: px } => *px,
        }
    }
}

/// Decoded inbound data message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    OrderBookUpdate {
        exchange: String,
        #[serde(default)]
        pair: Option<String>,
        book: RawBook,
    },
    PriceUpdate {
        exchange: String,
        #[serde(default)]
        pair: Option<String>,
        price: RawPrice,
    },
}

impl InboundMessage {
    pub fn channel(&self) -> ChannelType {
        match self {
            Self::OrderBookUpdate { .. } => ChannelType::OrderBook,
            Self::PriceUpdate { .. } => ChannelType::LastPrice,
        }
    }

    pub fn exchange(&self) -> &str {
        match self {
            Self::OrderBookUpdate { exchange, .. } | Self::PriceUpdate { exchange, .. } => exchange,
        }
    }

    pub fn pair(&self) -> Option<&str> {
        match self {
            Self::OrderBookUpdate { pair, .. } | Self::PriceUpdate { pair, .. } => pair.as_deref(),
        }
    }
}

/// Result of decoding one text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A data message for a known channel.
    Data(InboundMessage),
    /// Acks, keep-alive echoes and other non-data frames, by type name.
    Control(String),
    /// Unparseable frame or a data frame with a bad payload.
    Malformed(String),
}

const DATA_TYPES: [&str; 2] = ["order_book_update", "price_update"];

/// Decode one text frame.
///
/// Only frames whose `type` names a data channel are decoded strictly; any
/// other typed frame is reported as control traffic. A non-positive last
/// price is malformed.
pub fn decode_inbound(text: &str) -> Decoded {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(format!("invalid JSON: {e}")),
    };

    let kind = match value.get("type").and_then(|t| t.as_str()) {
        Some(kind) => kind.to_string(),
        None => return Decoded::Malformed("missing type".to_string()),
    };

    if !DATA_TYPES.contains(&kind.as_str()) {
        return Decoded::Control(kind);
    }

    match serde_json::from_value::<InboundMessage>(value) {
        Ok(InboundMessage::PriceUpdate { price, .. }) if price.value() <= Decimal::ZERO => {
            Decoded::Malformed(format!("{kind}: non-positive price {}", price.value()))
        }
        Ok(msg) => Decoded::Data(msg),
        Err(e) => Decoded::Malformed(format!("{kind}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn key() -> InstrumentKey {
        InstrumentKey::new("binance", "BTC-USDT")
    }

    #[test]
    fn test_subscribe_order_book_uses_exchanges() {
        let cmd = WsCommand::subscribe(&key(), ChannelType::OrderBook);
        let value: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "command": "subscribe",
                "data_type": "order_book",
                "exchanges": ["binance"],
                "pair": "BTC-USDT"
            })
        );
    }

    #[test]
    fn test_unsubscribe_price_uses_exchange() {
        let cmd = WsCommand::unsubscribe(&key(), ChannelType::LastPrice);
        let value: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "command": "unsubscribe",
                "data_type": "pair_price",
                "exchange": "binance",
                "pair": "BTC-USDT"
            })
        );
        assert_eq!(cmd.channel(), Some(ChannelType::LastPrice));
    }

    #[test]
    fn test_keep_alive_is_bare() {
        let json = WsCommand::keep_alive().to_json().unwrap();
        assert_eq!(json, r#"{"command":"keep_alive"}"#);
    }

    #[test]
    fn test_decode_order_book_mixed_levels() {
        let text = json!({
            "type": "order_book_update",
            "exchange": "binance",
            "book": {
                "bids": [["100", "5"]],
                "asks": [{"price": 101, "size": "3"}],
                "mid_price": "100.5",
                "spread_bps": 99.5
            }
        })
        .to_string();

        let Decoded::Data(InboundMessage::OrderBookUpdate { book, pair, .. }) = decode_inbound(&text)
        else {
            panic!("expected order book update");
        };
        assert!(pair.is_none());
        assert_eq!(book.bids[0].price(), dec!(100));
        assert_eq!(book.asks[0].size(), dec!(3));
        assert_eq!(book.mid_price, Some(dec!(100.5)));
    }

    #[test]
    fn test_decode_price_variants() {
        let bare = json!({"type": "price_update", "exchange": "okx", "price": "42000.5"});
        let detailed = json!({"type": "price_update", "exchange": "okx", "pair": "BTC-USDT", "price": {"price": 42000.5}});

        for text in [bare.to_string(), detailed.to_string()] {
            match decode_inbound(&text) {
                Decoded::Data(msg @ InboundMessage::PriceUpdate { .. }) => {
                    assert_eq!(msg.channel(), ChannelType::LastPrice);
                    let InboundMessage::PriceUpdate { price, .. } = msg else {
                        unreachable!()
                    };
                    assert_eq!(price.value(), dec!(42000.5));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_control_and_malformed() {
        assert_eq!(
            decode_inbound(r#"{"type":"keep_alive_ack"}"#),
            Decoded::Control("keep_alive_ack".to_string())
        );
        assert!(matches!(decode_inbound("not json"), Decoded::Malformed(_)));
        assert!(matches!(decode_inbound(r#"{"exchange":"x"}"#), Decoded::Malformed(_)));
        assert!(matches!(
            decode_inbound(r#"{"type":"price_update","exchange":"x","price":"abc"}"#),
            Decoded::Malformed(_)
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"order_book_update","exchange":"x"}"#),
            Decoded::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_non_positive_price_is_malformed() {
        for price in [json!("0"), json!(-5), json!({"price": "-0.1"})] {
            let text = json!({"type": "price_update", "exchange": "x", "price": price}).to_string();
            assert!(matches!(decode_inbound(&text), Decoded::Malformed(_)), "{text}");
        }
    }
}
