//! Device session entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// One row of a Catalog response (a device channel)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCatalogItem {
    /// Channel ID (20-digit GB28181 code)
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// Signaling state of one device, keyed by its remote transport address
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSession {
    /// Signaling identity (user part of the From header)
    pub gb_id: String,
    /// Last observed transport address
    pub remote_address: SocketAddr,
    pub registered: bool,
    pub online: bool,
    /// Call-ID of the most recently sent catalog query
    pub catalog_call_id: Option<String>,
    /// False once a catalog exchange ended with a non-200 status
    pub last_catalog_ok: bool,
    pub keep_alive_count: u64,
    pub catalog_count: u64,
    pub register_count: u64,
    pub unregister_count: u64,
    /// Outbound CSeq counter for requests originated by the gateway
    pub cseq: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) user_agent_logged: bool,
}

impl DeviceSession {
    pub fn new(gb_id: impl Into<String>, remote_address: SocketAddr) -> Self {
        let now = Utc::now();
        Self {
            gb_id: gb_id.into(),
            remote_address,
            registered: false,
            online: false,
            catalog_call_id: None,
            last_catalog_ok: true,
            keep_alive_count: 0,
            catalog_count: 0,
            register_count: 0,
            unregister_count: 0,
            cseq: 0,
            first_seen: now,
            last_seen: now,
            user_agent_logged: false,
        }
    }

    /// Advance the outbound CSeq and return the value to use
    pub fn next_cseq(&mut self) -> u32 {
        self.cseq = self.cseq.wrapping_add(1);
        self.cseq
    }

    pub fn touch(&mut self, gb_id: &str, remote_address: SocketAddr) {
        if !gb_id.is_empty() {
            self.gb_id = gb_id.to_string();
        }
        self.remote_address = remote_address;
        self.last_seen = Utc::now();
    }

    /// Record a catalog query about to be sent
    pub fn expect_catalog_response(&mut self, call_id: impl Into<String>) {
        self.catalog_call_id = Some(call_id.into());
    }

    pub fn is_catalog_response(&self, call_id: &str) -> bool {
        self.catalog_call_id.as_deref() == Some(call_id)
    }
}
