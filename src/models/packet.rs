// Telemetry packets emitted by the worker, decoded at the IPC boundary.

use serde::{Deserialize, Serialize};

/// One telemetry record for a single handled request.
///
/// Tagged by `type`; anything that does not decode into one of these variants is
/// not a packet and is forwarded as a log line instead. Times are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    #[serde(rename_all = "camelCase")]
    NetworkRequest {
        total_time: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    MultipartNetworkRequest {
        total_time: f64,
        handle_time: f64,
        processing_time: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<i64>,
    },
}

impl Packet {
    /// Discriminants accepted on the IPC channel.
    pub const TYPES: [&'static str; 2] = ["NetworkRequest", "MultipartNetworkRequest"];

    pub fn network(total_time: f64, error: Option<i64>) -> Self {
        Packet::NetworkRequest { total_time, error }
    }

    pub fn multipart(
        total_time: f64,
        handle_time: f64,
        processing_time: f64,
        error: Option<i64>,
    ) -> Self {
        Packet::MultipartNetworkRequest {
            total_time,
            handle_time,
            processing_time,
            error,
        }
    }

    pub fn total_time(&self) -> f64 {
        match *self {
            Packet::NetworkRequest { total_time, .. } => total_time,
            Packet::MultipartNetworkRequest { total_time, .. } => total_time,
        }
    }

    pub fn error(&self) -> Option<i64> {
        match *self {
            Packet::NetworkRequest { error, .. } => error,
            Packet::MultipartNetworkRequest { error, .. } => error,
        }
    }

    /// `(handle_time, processing_time)` for multipart packets.
    pub fn multipart_timings(&self) -> Option<(f64, f64)> {
        match *self {
            Packet::MultipartNetworkRequest {
                handle_time,
                processing_time,
                ..
            } => Some((handle_time, processing_time)),
            Packet::NetworkRequest { .. } => None,
        }
    }

    /// Decodes a JSON value into a packet. Returns `None` for untagged messages,
    /// unknown discriminants, and packets with missing or negative timings.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let tag = value.get("type")?.as_str()?;
        if !Self::TYPES.contains(&tag) {
            return None;
        }
        let packet = Packet::deserialize(value).ok()?;
        packet.is_valid().then_some(packet)
    }

    fn is_valid(&self) -> bool {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        valid(self.total_time())
            && self
                .multipart_timings()
                .is_none_or(|(handle, processing)| valid(handle) && valid(processing))
    }
}
