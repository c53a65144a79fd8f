//! Hyperliquid info API client and wire-format parsing.
//!
//! The parsers here are shared with the feed writers: the WebSocket
//! `l2Book`, `userFills` and `orderUpdates` payloads use the same shapes as
//! the REST responses.

use super::{DataSourceError, InfoSource};
use crate::domain::{
    AccountState, BookSnapshot, ClientOrderId, Coin, ExchangeOrderId, ExchangeOrderStatus, Fill,
    OrderUpdate, Position, PriceLevel, Side, TimeMs,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.hyperliquid.xyz";

#[derive(Debug, Clone)]
pub struct HyperliquidInfoSource {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

impl HyperliquidInfoSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            max_elapsed: Duration::from_secs(5),
        }
    }

    /// Upper bound on time spent retrying one request.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn post_info(&self, payload: Value) -> Result<Value, DataSourceError> {
        let url = format!("{}/info", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl InfoSource for HyperliquidInfoSource {
    async fn fetch_l2_book(&self, coin: &Coin) -> Result<BookSnapshot, DataSourceError> {
        debug!("Fetching l2Book for coin={}", coin);
        let payload = serde_json::json!({ "type": "l2Book", "coin": coin.as_str() });
        let response = self.post_info(payload).await?;
        parse_l2_book(&response)
    }

    async fn fetch_account_state(&self, user: &str) -> Result<AccountState, DataSourceError> {
        debug!("Fetching clearinghouseState for user={}", user);
        let payload = serde_json::json!({ "type": "clearinghouseState", "user": user });
        let response = self.post_info(payload).await?;
        parse_account_state(&response)
    }
}

fn str_field<'a>(json: &'a Value, field: &str) -> Result<&'a str, DataSourceError> {
    json.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))
}

fn decimal_field(json: &Value, field: &str) -> Result<Decimal, DataSourceError> {
    let raw = str_field(json, field)?;
    Decimal::from_str(raw)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", field, e)))
}

/// Like `decimal_field` but absent/null/empty means zero.
fn decimal_or_zero(json: &Value, field: &str) -> Result<Decimal, DataSourceError> {
    match json.get(field).and_then(|v| v.as_str()) {
        None | Some("") => Ok(Decimal::ZERO),
        Some(raw) => Decimal::from_str(raw)
            .map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", field, e))),
    }
}

fn i64_field(json: &Value, field: &str) -> Result<i64, DataSourceError> {
    json.get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))
}

fn u64_field(json: &Value, field: &str) -> Result<u64, DataSourceError> {
    json.get(field)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))
}

fn side_field(json: &Value) -> Result<Side, DataSourceError> {
    let code = str_field(json, "side")?;
    Side::from_code(code).ok_or_else(|| DataSourceError::ParseError(format!("Invalid side: {}", code)))
}

fn cloid_field(json: &Value) -> Option<ClientOrderId> {
    json.get("cloid")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

fn parse_level(level: &Value) -> Result<PriceLevel, DataSourceError> {
    let n = level.get("n").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    Ok(PriceLevel::new(
        decimal_field(level, "px")?,
        decimal_field(level, "sz")?,
        n,
    ))
}

/// `{"coin": str, "levels": [[bids...], [asks...]], "time": int}`
pub fn parse_l2_book(json: &Value) -> Result<BookSnapshot, DataSourceError> {
    let coin = Coin::new(str_field(json, "coin")?);
    let time = TimeMs::new(i64_field(json, "time")?);
    let levels = json
        .get("levels")
        .and_then(|v| v.as_array())
        .filter(|sides| sides.len() == 2)
        .ok_or_else(|| DataSourceError::ParseError("Expected two level arrays".to_string()))?;

    let parse_side = |side: &Value| -> Result<Vec<PriceLevel>, DataSourceError> {
        side.as_array()
            .ok_or_else(|| DataSourceError::ParseError("Expected level array".to_string()))?
            .iter()
            .map(parse_level)
            .collect()
    };
    let bids = parse_side(&levels[0])?;
    let asks = parse_side(&levels[1])?;

    BookSnapshot::new(coin, bids, asks, time)
        .map_err(|e| DataSourceError::ParseError(e.to_string()))
}

pub fn parse_account_state(json: &Value) -> Result<AccountState, DataSourceError> {
    let summary = json
        .get("marginSummary")
        .or_else(|| json.get("crossMarginSummary"))
        .ok_or_else(|| DataSourceError::ParseError("Missing marginSummary".to_string()))?;

    let mut positions = HashMap::new();
    if let Some(asset_positions) = json.get("assetPositions").and_then(|v| v.as_array()) {
        for entry in asset_positions {
            let Some(pos) = entry.get("position") else {
                continue;
            };
            match parse_position(pos) {
                Ok(position) => {
                    positions.insert(position.coin.clone(), position);
                }
                Err(e) => warn!("Failed to parse position: {}", e),
            }
        }
    }

    Ok(AccountState {
        account_value: decimal_or_zero(summary, "accountValue")?,
        total_margin_used: decimal_or_zero(summary, "totalMarginUsed")?,
        withdrawable: decimal_or_zero(json, "withdrawable")?,
        positions,
    })
}

fn parse_position(pos: &Value) -> Result<Position, DataSourceError> {
    let leverage = pos
        .get("leverage")
        .and_then(|l| l.get("value"))
        .and_then(|v| v.as_u64())
        .unwrap_or(1) as u32;
    let liquidation_px = match pos.get("liquidationPx").and_then(|v| v.as_str()) {
        Some(raw) => Some(Decimal::from_str(raw).map_err(|e| {
            DataSourceError::ParseError(format!("Invalid liquidationPx: {}", e))
        })?),
        None => None,
    };

    Ok(Position {
        coin: Coin::new(str_field(pos, "coin")?),
        szi: decimal_or_zero(pos, "szi")?,
        entry_px: decimal_or_zero(pos, "entryPx")?,
        unrealized_pnl: decimal_or_zero(pos, "unrealizedPnl")?,
        leverage,
        liquidation_px,
        margin_used: decimal_or_zero(pos, "marginUsed")?,
    })
}

/// One element of a `userFills` payload.
pub fn parse_user_fill(json: &Value) -> Result<Fill, DataSourceError> {
    let tid = json.get("tid").and_then(|v| v.as_u64());
    Ok(Fill::new(
        ExchangeOrderId::new(u64_field(json, "oid")?),
        Coin::new(str_field(json, "coin")?),
        side_field(json)?,
        decimal_field(json, "px")?,
        decimal_field(json, "sz")?,
        decimal_or_zero(json, "fee")?,
        decimal_or_zero(json, "closedPnl")?,
        TimeMs::new(i64_field(json, "time")?),
        tid,
    ))
}

/// One element of an `orderUpdates` payload:
/// `{"order": {"coin", "oid", "cloid"?, ...}, "status": str, "statusTimestamp": int}`.
pub fn parse_order_update(json: &Value) -> Result<OrderUpdate, DataSourceError> {
    let order = json
        .get("order")
        .ok_or_else(|| DataSourceError::ParseError("Missing order field".to_string()))?;
    let status_str = str_field(json, "status")?;
    let status = ExchangeOrderStatus::parse(status_str)
        .ok_or_else(|| DataSourceError::ParseError(format!("Unhandled status: {}", status_str)))?;
    let time = json
        .get("statusTimestamp")
        .and_then(|v| v.as_i64())
        .map(TimeMs::new)
        .unwrap_or_else(TimeMs::now);

    Ok(OrderUpdate {
        exchange_id: ExchangeOrderId::new(u64_field(order, "oid")?),
        client_id: cloid_field(order),
        coin: Coin::new(str_field(order, "coin")?),
        status,
        time,
    })
}
