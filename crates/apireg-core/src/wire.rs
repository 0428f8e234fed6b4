//! apireg wire format — the registration announcement datagram.
//!
//! One UDP datagram announces one Api. The payload is a JSON object:
//!
//! ```text
//! {
//!   "api-name": "billing",
//!   "api-version": {"major": 1, "minor": 4, "bugfix": 0},
//!   "api-port": 8080,
//!   "sender-id": "9f2c…",
//!   "env": "prod"
//! }
//! ```
//!
//! The host address is never carried in the payload. Receivers take it
//! from the datagram's source address.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::api::{Api, Environment, Version};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default IPv4 multicast group for announcements.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 78);

/// Default UDP port for announcements.
pub const DEFAULT_MULTICAST_PORT: u16 = 5324;

/// Ceiling on an encoded announcement. Keeps a datagram inside one
/// Ethernet frame. Also the size of the receive buffer.
pub const MAX_MESSAGE_SIZE: usize = 1400;

/// Default interval between re-broadcasts of owned Apis.
pub const RESEND_INTERVAL_SECS: u64 = 15;

/// Default interval between sweeps of the registration store.
pub const PURGE_INTERVAL_SECS: u64 = 30;

/// A registration lives this many resend intervals after its last refresh,
/// so three consecutive lost resends do not expire it.
pub const LIFESPAN_MULTIPLIER: u32 = 4;

// ── Message ───────────────────────────────────────────────────────────────────

/// A registration announcement as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMessage {
    #[serde(rename = "api-name")]
    pub api_name: String,

    #[serde(rename = "api-version")]
    pub api_version: Version,

    #[serde(rename = "api-port")]
    pub api_port: u16,

    /// Process id of the sender. Receivers drop their own announcements by it.
    #[serde(rename = "sender-id")]
    pub sender_id: String,

    #[serde(rename = "env")]
    pub environment: Environment,
}

impl RegisterMessage {
    /// Build the announcement for a locally owned Api.
    pub fn for_api(api: &Api, sender_id: &str, environment: Environment) -> Self {
        Self {
            api_name: api.name().to_string(),
            api_version: api.version(),
            api_port: api.host_port(),
            sender_id: sender_id.to_string(),
            environment,
        }
    }

    /// Encode to bytes, refusing anything over `MAX_MESSAGE_SIZE`.
    /// Nothing is ever truncated.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let bytes = serde_json::to_vec(self).map_err(WireError::Encode)?;
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(WireError::MessageTooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Decode)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("encoded message is {size} bytes, exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
