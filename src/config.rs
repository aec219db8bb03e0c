//! Process-level configuration (spec.md §6 "process-level inputs").
//! Constructed programmatically by the embedding application; SDP parsing
//! is explicitly out of scope, so nothing here reads wire-format text.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// What kind of media application this session is carrying, driving how
/// the XR/RTCP layer sizes its reports (spec.md §4.9.1's "application type
/// enum").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationType {
    LinearTv,
    VideoOnDemand,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XrConfig {
    pub loss_rle_enabled: bool,
    pub media_acquisition_enabled: bool,
    pub diagnostic_counters_enabled: bool,
}

impl Default for XrConfig {
    fn default() -> Self {
        XrConfig {
            loss_rle_enabled: true,
            media_acquisition_enabled: true,
            diagnostic_counters_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthConfig {
    pub session_bandwidth_bytes_per_sec: f64,
    pub rtcp_bandwidth_fraction: f64,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        BandwidthConfig {
            session_bandwidth_bytes_per_sec: 2_000_000.0 / 8.0,
            rtcp_bandwidth_fraction: rtcp::bandwidth::RTCP_BANDWIDTH_FRACTION,
        }
    }
}

/// Per-session inputs: sockets, bandwidth config, XR config, application
/// type, and the RTCP reduced-size flag (RFC 5506).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub local_socket: SocketAddr,
    pub local_ssrc: u32,
    pub local_cname: String,
    pub max_members: usize,
    pub min_sequential: i32,
    pub bandwidth: BandwidthConfig,
    pub xr: XrConfig,
    pub application_type: ApplicationType,
    pub reduced_size_rtcp: bool,
}

/// Top-level receiver configuration: NAT binding limits and the session it
/// serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub max_bindings: usize,
    pub refresh_interval_secs: u64,
    pub max_packet_size: usize,
    pub input_interface_name: String,
    pub session: SessionConfig,
}

impl Config {
    pub fn refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_secs.saturating_mul(1000)
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn refresh_interval_converts_seconds_to_millis() {
        let cfg = Config {
            max_bindings: 8,
            refresh_interval_secs: 30,
            max_packet_size: 1460,
            input_interface_name: "eth0".into(),
            session: SessionConfig {
                local_socket: "0.0.0.0:5004".parse().unwrap(),
                local_ssrc: 1,
                local_cname: "r@h".into(),
                max_members: 16,
                min_sequential: 2,
                bandwidth: BandwidthConfig::default(),
                xr: XrConfig::default(),
                application_type: ApplicationType::LinearTv,
                reduced_size_rtcp: false,
            },
        };
        assert_eq!(cfg.refresh_interval_ms(), 30_000);
    }
}
