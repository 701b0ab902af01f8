use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Order;

/// Envelope for `GET /api/orders`.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub status: u16,
    pub data: Vec<Order>,
}

/// Plain acknowledgement body (`{"message": "..."}`).
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" when every store answered the last probe, else "degraded"
    pub status: String,
    pub counter_store_up: bool,
    pub credential_store_up: bool,
    pub order_store_up: bool,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}
