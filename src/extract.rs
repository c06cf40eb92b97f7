//! Record Extractor — normalizes one captured packet into a `PacketRecord`.
//!
//! Total function: every failure mode becomes `None` (with a warn line),
//! never a panic or an error the caller has to handle. A dropped packet
//! must never halt the pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::capture::RawPacket;

/// Sentinel for fields the capture could not resolve.
pub const UNKNOWN: &str = "Unknown";

/// Normalized packet metadata. Ports and flags are present only when the
/// transport layer resolved to a known protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub src_ip: String,
    pub dest_ip: String,
    pub protocol: String,
    pub length: u32,
    /// Capture time, seconds since the Unix epoch.
    pub timestamp: f64,
    pub port_src: Option<u16>,
    pub port_dst: Option<u16>,
    pub flags: Option<String>,
}

/// Extract a `PacketRecord` from one raw captured packet.
///
/// Rules:
/// - addresses default to [`UNKNOWN`] when there is no network layer;
/// - protocol defaults to [`UNKNOWN`] when there is no transport layer;
/// - ports are parsed as integers only for a resolved protocol, and a
///   missing or malformed port there invalidates the whole packet;
/// - a missing or non-numeric length always invalidates the packet.
pub fn extract_packet_data(packet: &RawPacket) -> Option<PacketRecord> {
    let (src_ip, dest_ip) = match &packet.network {
        Some(net) => (net.src.clone(), net.dst.clone()),
        None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
    };

    let length = match packet.length.as_deref().map(str::parse::<u32>) {
        Some(Ok(n)) => n,
        Some(Err(_)) | None => {
            tracing::warn!(length = ?packet.length, "Error extracting packet data: bad length");
            return None;
        }
    };

    let mut protocol = UNKNOWN.to_string();
    let mut port_src = None;
    let mut port_dst = None;
    let mut flags = None;

    if let Some(transport) = &packet.transport {
        protocol = transport.label.clone();
        port_src = Some(parse_port(transport.src_port.as_deref(), "source")?);
        port_dst = Some(parse_port(transport.dst_port.as_deref(), "destination")?);
        // Some protocols carry no flags; that is not an error.
        flags = transport.flags.clone();
    }

    Some(PacketRecord {
        src_ip,
        dest_ip,
        protocol,
        length,
        timestamp: epoch_seconds(),
        port_src,
        port_dst,
        flags,
    })
}

fn parse_port(raw: Option<&str>, which: &str) -> Option<u16> {
    match raw.map(str::parse::<u16>) {
        Some(Ok(p)) => Some(p),
        Some(Err(_)) | None => {
            tracing::warn!(port = ?raw, which, "Error extracting packet data: bad port");
            None
        }
    }
}

fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
