#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// re-export sub-crates
pub use clock;
pub use nat;
pub use rtcp;
pub use rtp;
pub use session;
pub use stun;

pub mod config;
pub mod error;
pub mod timer;

pub use error::Error;

use std::net::SocketAddr;
use std::sync::Mutex;

use clock::{AbsTime, Nll, Pcr32Time, RelTime};
use config::Config;
use session::SessionVariant;

/// Equal to the common UDP MTU; `Config::max_packet_size` may lower this.
pub(crate) const RECEIVE_MTU: usize = 1460;

/// MPEG-TS over RTP carries both the PCR and the RTP timestamp at 90 kHz
/// (spec.md's "PCR/RTP media timestamp"), so wall-clock arrivals convert
/// to media-clock ticks with this single constant.
pub(crate) const MEDIA_CLOCK_HZ: i64 = 90_000;

/// Everything the global lock protects: the RTP/RTCP session and its clock
/// recovery loop. Methods on `Receiver` acquire this lock on entry and
/// release it on return, matching the single global-lock discipline the
/// session engine, NLL, STUN protocol, and hybrid arbiter all run under.
struct ReceiverState {
    session: SessionVariant,
    nll: Nll,
    session_start: AbsTime,
}

/// Wires a `Session` and its clock recovery loop together behind one lock.
/// This is the type an embedding application holds for the media path; the
/// NAT manager (`nat::HybridNatManager`) is driven separately since its
/// socket and HTTP I/O live outside this crate's cooperative core.
pub struct Receiver {
    state: Mutex<ReceiverState>,
}

impl Receiver {
    pub fn new(config: &Config, session: SessionVariant) -> Self {
        let _ = config;
        Receiver {
            state: Mutex::new(ReceiverState {
                session,
                nll: Nll::new(),
                session_start: AbsTime::now(),
            }),
        }
    }

    /// Converts a wall-clock arrival into the 90 kHz media-clock ticks the
    /// jitter estimator (RFC 3550 §A.8) is defined over.
    fn media_ticks(session_start: AbsTime, arrival_wall: AbsTime) -> u32 {
        let elapsed_micros = arrival_wall.checked_sub(session_start).as_micros();
        let ticks = elapsed_micros.saturating_mul(MEDIA_CLOCK_HZ) / 1_000_000;
        ticks as u32
    }

    /// Feeds one inbound RTP datagram through sequence tracking and
    /// member-table bookkeeping. Does not itself consult `recover_media_time`;
    /// that is a separate, explicit call for the playout path (spec.md's NLL
    /// is a PCR-to-wall-clock predictor, not an input to jitter).
    pub fn receive_rtp(&self, raw: &[u8], source_addr: SocketAddr, arrival_wall: AbsTime) -> crate::error::Result<Option<session::RtpArrival>> {
        let mut guard = self.state.lock().expect("receiver lock poisoned");
        let arrival_media = Self::media_ticks(guard.session_start, arrival_wall);
        let arrival = guard.session.receive_rtp(raw, source_addr, arrival_wall, arrival_media)?;
        Ok(arrival)
    }

    /// Runs one PCR sample through the NLL clock recovery loop, predicting
    /// when that sample should be handed to the decoder.
    pub fn recover_media_time(&self, actual_time: AbsTime, pcr32: Pcr32Time, est_rtp_delta: RelTime, disc: &mut bool) -> AbsTime {
        let mut guard = self.state.lock().expect("receiver lock poisoned");
        guard.nll.adjust(actual_time, pcr32, est_rtp_delta, disc)
    }

    /// Feeds one inbound compound RTCP packet.
    pub fn receive_rtcp(&self, raw: &[u8], source_addr: SocketAddr, arrival: AbsTime) -> crate::error::Result<()> {
        let mut guard = self.state.lock().expect("receiver lock poisoned");
        guard.session.receive_rtcp(raw, source_addr, arrival)?;
        Ok(())
    }

    /// Builds this receiver's next outgoing compound RTCP report (RR + SDES,
    /// BYE only on shutdown via `build_bye` directly).
    pub fn build_report(&self) -> crate::error::Result<bytes::Bytes> {
        let mut guard = self.state.lock().expect("receiver lock poisoned");
        let rr = guard.session.base_mut().build_receiver_report();
        let sdes = guard.session.base().build_sdes();
        let packets = vec![rtcp::RtcpPacket::ReceiverReport(rr), rtcp::RtcpPacket::SourceDescription(sdes)];
        Ok(rtcp::compound_packet::build(&packets)?)
    }

    pub fn next_reporting_interval(&self, rand_unit: f64) -> clock::RelTime {
        let mut guard = self.state.lock().expect("receiver lock poisoned");
        guard.session.base_mut().next_reporting_interval(rand_unit)
    }
}

#[cfg(test)]
mod lib_test {
    use super::*;
    use session::SessionParams;

    fn receiver() -> Receiver {
        let params = SessionParams {
            local_ssrc: 0xCAFE,
            local_cname: bytes::Bytes::from_static(b"r@h"),
            max_members: 8,
            min_sequential: 2,
            bandwidth: rtcp::bandwidth::BandwidthCfg {
                session_as_bytes_per_sec: Some(64_000.0 / rtcp::bandwidth::RTCP_BANDWIDTH_FRACTION),
                ..Default::default()
            },
        };
        let cfg = Config {
            max_bindings: 8,
            refresh_interval_secs: 30,
            max_packet_size: 1460,
            input_interface_name: "eth0".into(),
            session: config::SessionConfig {
                local_socket: "0.0.0.0:5004".parse().unwrap(),
                local_ssrc: params.local_ssrc,
                local_cname: "r@h".into(),
                max_members: params.max_members,
                min_sequential: params.min_sequential,
                bandwidth: config::BandwidthConfig::default(),
                xr: config::XrConfig::default(),
                application_type: config::ApplicationType::LinearTv,
                reduced_size_rtcp: false,
            },
        };
        Receiver::new(&cfg, SessionVariant::new_asm(params))
    }

    fn rtp_packet(seq: u16, ssrc: u32) -> Vec<u8> {
        let mut b = vec![0u8; 12];
        b[0] = 2 << 6;
        b[1] = 33;
        b[2..4].copy_from_slice(&seq.to_be_bytes());
        b[8..12].copy_from_slice(&ssrc.to_be_bytes());
        b
    }

    #[test]
    fn receive_rtp_creates_a_member_and_reports_can_be_built() {
        let recv = receiver();
        let addr: SocketAddr = "127.0.0.1:5004".parse().unwrap();
        let arrival = recv.receive_rtp(&rtp_packet(1, 0xBEEF), addr, AbsTime::now()).unwrap();
        assert!(arrival.is_some());

        let report = recv.build_report().unwrap();
        assert!(!report.is_empty());
    }

    #[test]
    fn recover_media_time_tracks_a_pcr_discontinuity() {
        let recv = receiver();
        let mut disc = false;
        let t0 = recv.recover_media_time(AbsTime::from_micros(0), Pcr32Time::from_raw(0), RelTime::from_millis(33), &mut disc);
        assert!(disc); // first sample is always reported as a discontinuity

        let mut disc = false;
        let t1 = recv.recover_media_time(AbsTime::from_micros(33_000), Pcr32Time::from_raw(2970), RelTime::from_millis(33), &mut disc);
        assert!(t1.as_micros() >= t0.as_micros());
    }
}
