//! Shared receive-side session state: member table, CNAME, and the RR/XR
//! scheduling inputs every session variant needs regardless of topology.

use std::net::SocketAddr;

use clock::AbsTime;
use rtcp::bandwidth::{reporting_interval, BandwidthInfo, IntervalParams};
use rtcp::compound_packet::RtcpPacket;
use rtcp::reception_report::ReceptionReport;
use rtcp::rsi::{Gapsb, ReceiverSummaryInformation, SubReport};
use rtcp::{Goodbye, ReceiverReport, SourceDescription};
use rtp::header;
use rtp::SeqEvent;

use crate::error::{Error, Result};
use crate::member::{Conflict, MemberTable};

/// Session-wide configuration that does not change once a session is
/// constructed (see `rtrecv::config::SessionConfig` for the user-facing
/// form this is built from).
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub local_ssrc: u32,
    pub local_cname: bytes::Bytes,
    pub max_members: usize,
    pub min_sequential: i32,
    pub bandwidth: rtcp::bandwidth::BandwidthCfg,
}

#[derive(Debug)]
pub struct SessionBase {
    pub params: SessionParams,
    pub members: MemberTable,
    pub average_rtcp_size_bytes: f64,
    pub last_rr_sent: AbsTime,
    pub initial_report: bool,
    /// Role bandwidth derived from `params.bandwidth` at construction time,
    /// then mutated in place as RSI BISB subreports arrive.
    pub bandwidth_info: BandwidthInfo,
    /// RFC 5760 §4.2-style learned group size, rolled forward from GAPSB
    /// subreports (`rtcp_process_rsi`'s `rtcp_nmembers_learned`). Signed
    /// since a subtract-then-add update can transiently dip below zero
    /// when a reporting member's group size shrinks.
    pub nmembers_learned: i64,
}

/// One fully-decoded inbound RTP packet, handed up from the session to the
/// media path once header, sequence, and jitter processing are done.
#[derive(Debug)]
pub struct RtpArrival {
    pub ssrc: u32,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub marker: bool,
    pub payload_type: u8,
    pub payload_offset: usize,
}

impl SessionBase {
    pub fn new(params: SessionParams) -> Self {
        let members = MemberTable::new(params.local_ssrc, params.max_members, params.min_sequential);
        let bandwidth_info = BandwidthInfo::from_cfg(&params.bandwidth);
        SessionBase {
            params,
            members,
            average_rtcp_size_bytes: 0.0,
            last_rr_sent: AbsTime::ZERO,
            initial_report: true,
            bandwidth_info,
            nmembers_learned: 0,
        }
    }

    /// Parses one RTP packet, resolves its source through the member
    /// table, and updates sequence/jitter state. `arrival_media` is the
    /// wall-clock arrival time already converted to the stream's media
    /// clock by the caller's `clock::Nll` (RFC 3550 §A.8 jitter is defined
    /// over media-clock units, not wall-clock ones). Returns `None` for
    /// packets the member table rejected (local-SSRC collision, table
    /// full) or that the sequence tracker discarded as a large jump.
    pub fn receive_rtp(
        &mut self,
        raw: &[u8],
        source_addr: SocketAddr,
        arrival_wall: AbsTime,
        arrival_media: u32,
    ) -> Result<Option<RtpArrival>> {
        let (hdr, status) = header::parse(raw)?;

        let (conflict, ssrc) = self.members.resolve(hdr.ssrc, source_addr);
        let ssrc = match ssrc {
            Some(s) => s,
            None => return Ok(None),
        };
        if conflict == Conflict::CollidesWithLocalSsrc {
            return Err(Error::SsrcCollisionRejected(hdr.ssrc));
        }

        let member = self.members.get_mut(ssrc).ok_or(Error::UnknownMember(ssrc))?;
        let (event, extended) = member.rtp.update_seq(hdr.sequence_number);
        if matches!(event, SeqEvent::Jump) {
            return Ok(None);
        }
        if extended.is_some() {
            member.rtp.update_jitter(arrival_media, hdr.timestamp);
            member.jitter_stats.sample(member.rtp.rr_jitter());
        }
        member.last_rtp_arrival = arrival_wall;
        self.members.tick_probation(ssrc);

        let _ = status;
        Ok(Some(RtpArrival {
            ssrc,
            sequence_number: hdr.sequence_number,
            timestamp: hdr.timestamp,
            marker: hdr.marker,
            payload_type: hdr.payload_type,
            payload_offset: hdr.header_len,
        }))
    }

    /// Processes one compound RTCP packet's worth of sub-packets, updating
    /// member CNAME bindings, sender flags, and BYE-driven removal.
    pub fn receive_rtcp(&mut self, raw: &[u8], source_addr: SocketAddr, arrival: AbsTime) -> Result<()> {
        let packets = rtcp::compound_packet::parse(raw)?;
        self.roll_average_rtcp_size(raw.len());

        for packet in packets {
            match packet {
                RtcpPacket::SenderReport(sr) => {
                    let (_, ssrc) = self.members.resolve(sr.ssrc, source_addr);
                    if let Some(ssrc) = ssrc {
                        if let Some(m) = self.members.get_mut(ssrc) {
                            m.is_sender = true;
                            m.last_rtcp_arrival = arrival;
                        }
                    }
                }
                RtcpPacket::SourceDescription(sdes) => {
                    for chunk in sdes.chunks {
                        if let Some(m) = self.members.get_mut(chunk.source) {
                            if let Some(item) = chunk
                                .items
                                .into_iter()
                                .find(|i| i.sdes_type == rtcp::source_description::SdesType::Cname)
                            {
                                m.cname = Some(item.text);
                            }
                            m.last_rtcp_arrival = arrival;
                        }
                    }
                }
                RtcpPacket::Goodbye(bye) => {
                    for ssrc in bye.sources {
                        if let Some(m) = self.members.get_mut(ssrc) {
                            m.received_bye = true;
                        }
                    }
                }
                RtcpPacket::Rsi(rsi) => {
                    let (_, ssrc) = self.members.resolve(rsi.sender_ssrc, source_addr);
                    if let Some(ssrc) = ssrc {
                        if let Some(m) = self.members.get_mut(ssrc) {
                            m.last_rtcp_arrival = arrival;
                        }
                        self.apply_rsi(ssrc, &rsi);
                    }
                }
                RtcpPacket::ReceiverReport(_) | RtcpPacket::ExtendedReport(_) | RtcpPacket::Unsupported { .. } => {}
            }
        }
        Ok(())
    }

    /// Applies an inbound RSI's subreports: GAPSB rolls the reporting
    /// member's view of group size into `nmembers_learned`, BISB updates
    /// the role bandwidth `bandwidth_info` uses for interval timing.
    /// Ported from `rtcp_process_rsi`.
    fn apply_rsi(&mut self, member_ssrc: u32, rsi: &ReceiverSummaryInformation) {
        for sub in &rsi.sub_reports {
            match sub {
                SubReport::Gapsb(g) => self.apply_gapsb(member_ssrc, g),
                SubReport::Bisb(b) => self.bandwidth_info.apply_reported_bandwidth(b.role, b.rtcp_bandwidth),
                SubReport::Unsupported { .. } => {}
            }
        }
    }

    fn apply_gapsb(&mut self, member_ssrc: u32, g: &Gapsb) {
        let Some(member) = self.members.get_mut(member_ssrc) else {
            return;
        };
        if member.rtcp_nmembers_reported != 0 {
            self.nmembers_learned -= member.rtcp_nmembers_reported as i64 - 2;
        }
        member.rtcp_nmembers_reported = g.group_size;
        member.rtcp_avg_size_reported = g.average_packet_size;
        self.nmembers_learned += g.group_size as i64 - 2;
    }

    /// RFC 3550 §6.3.3's running average of compound packet size, used to
    /// keep the next interval's bandwidth estimate accurate.
    fn roll_average_rtcp_size(&mut self, packet_len: usize) {
        self.average_rtcp_size_bytes =
            (1.0 / 16.0) * packet_len as f64 + (15.0 / 16.0) * self.average_rtcp_size_bytes;
    }

    /// Builds one Receiver Report covering every valid member, rolling
    /// each member's RR-emission snapshot forward as a side effect.
    pub fn build_receiver_report(&mut self) -> ReceiverReport {
        let mut reports = Vec::new();
        for member in self.members.iter_mut() {
            if !member.is_valid() {
                continue;
            }
            let expected = member.rtp.extended_seq() as i64 - member.rtp.base_seq as i64 + 1;
            let lost = expected - member.rtp.received as i64;
            let expected_interval = expected as i64 - member.rtp.expected_prior as i64;
            let received_interval = member.rtp.received as i64 - member.rtp.received_prior as i64;
            let lost_interval = (expected_interval - received_interval).max(0);
            let fraction_lost = if expected_interval <= 0 || lost_interval == 0 {
                0
            } else {
                ((lost_interval << 8) / expected_interval.max(1)).clamp(0, 255) as u8
            };

            reports.push(ReceptionReport {
                ssrc: member.ssrc,
                fraction_lost,
                total_lost: lost.clamp(0, (1 << 24) - 1) as u32,
                last_sequence_number: member.rtp.extended_seq(),
                jitter: member.rtp.rr_jitter(),
                last_sender_report: 0,
                delay: 0,
            });
            member.rtp.roll_rr_priors();
        }

        ReceiverReport {
            ssrc: self.params.local_ssrc,
            reports,
            profile_extensions: bytes::Bytes::new(),
        }
    }

    /// Builds one XR Diagnostic Counters block for `ssrc`, draining its
    /// jitter mean/std-dev accumulator. `None` if `ssrc` is not a known
    /// member (the caller has nothing to report for an unseen source).
    pub fn build_diagnostic_counters(&mut self, ssrc: u32) -> Option<rtcp::extended_report::DiagnosticCountersBlock> {
        let member = self.members.get_mut(ssrc)?;
        let (mean_jitter, std_dev_jitter) = member.jitter_stats.take_summary();
        Some(rtcp::extended_report::DiagnosticCountersBlock {
            mean_jitter,
            std_dev_jitter,
            ..Default::default()
        })
    }

    pub fn build_sdes(&self) -> SourceDescription {
        SourceDescription {
            chunks: vec![rtcp::source_description::SdesChunk {
                source: self.params.local_ssrc,
                items: vec![rtcp::source_description::SdesItem {
                    sdes_type: rtcp::source_description::SdesType::Cname,
                    text: self.params.local_cname.clone(),
                }],
            }],
        }
    }

    pub fn build_bye(&self, reason: &'static str) -> Goodbye {
        Goodbye {
            sources: vec![self.params.local_ssrc],
            reason: bytes::Bytes::from_static(reason.as_bytes()),
        }
    }

    /// Computes the next randomized reporting interval (RFC 3550 §6.3.1).
    pub fn next_reporting_interval(&mut self, rand_unit: f64) -> clock::RelTime {
        let senders = self.members.iter().filter(|m| m.is_sender).count() as u32;
        let avg_size = self.average_rtcp_size_bytes.max(1.0);
        let params = IntervalParams {
            members: (self.members.len() + 1) as u32,
            senders,
            average_rtcp_size_bytes: avg_size,
            average_rtcp_size_sent_bytes: avg_size,
            we_sent: false,
            initial: self.initial_report,
        };
        self.initial_report = false;
        reporting_interval(&self.bandwidth_info, &params, rand_unit)
    }

    pub fn rsi_summary(&self, summary_ssrc: u32, ntp_time: u64) -> ReceiverSummaryInformation {
        ReceiverSummaryInformation {
            sender_ssrc: self.params.local_ssrc,
            summary_ssrc,
            ntp_time,
            sub_reports: Vec::new(),
        }
    }
}

#[cfg(test)]
mod base_test {
    use super::*;

    fn params() -> SessionParams {
        SessionParams {
            local_ssrc: 0xF00D,
            local_cname: bytes::Bytes::from_static(b"r@h"),
            max_members: 8,
            min_sequential: 1,
            bandwidth: rtcp::bandwidth::BandwidthCfg {
                session_as_bytes_per_sec: Some(64_000.0 / rtcp::bandwidth::RTCP_BANDWIDTH_FRACTION),
                ..Default::default()
            },
        }
    }

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 5004))
    }

    fn rtp_packet(seq: u16, ts: u32, ssrc: u32) -> Vec<u8> {
        let mut b = vec![0u8; 12];
        b[0] = 2 << 6;
        b[1] = 33;
        b[2..4].copy_from_slice(&seq.to_be_bytes());
        b[4..8].copy_from_slice(&ts.to_be_bytes());
        b[8..12].copy_from_slice(&ssrc.to_be_bytes());
        b
    }

    #[test]
    fn first_packet_creates_member_and_returns_arrival() {
        let mut base = SessionBase::new(params());
        let raw = rtp_packet(100, 90000, 1);
        let arrival = base.receive_rtp(&raw, addr(), AbsTime::ZERO, 90000).unwrap().unwrap();
        assert_eq!(arrival.ssrc, 1);
        assert_eq!(arrival.sequence_number, 100);
        assert_eq!(base.members.len(), 1);
    }

    #[test]
    fn local_ssrc_collision_is_rejected() {
        let mut base = SessionBase::new(params());
        let raw = rtp_packet(1, 0, 0xF00D);
        assert!(matches!(
            base.receive_rtp(&raw, addr(), AbsTime::ZERO, 0),
            Err(Error::SsrcCollisionRejected(0xF00D))
        ));
    }

    #[test]
    fn receiver_report_reflects_loss() {
        let mut base = SessionBase::new(params());
        base.receive_rtp(&rtp_packet(1, 0, 1), addr(), AbsTime::ZERO, 0).unwrap();
        base.receive_rtp(&rtp_packet(3, 0, 1), addr(), AbsTime::ZERO, 0).unwrap(); // skip 2
        let rr = base.build_receiver_report();
        assert_eq!(rr.reports.len(), 1);
        assert_eq!(rr.reports[0].total_lost, 1);
    }

    #[test]
    fn diagnostic_counters_drains_jitter_summary() {
        let mut base = SessionBase::new(params());
        base.receive_rtp(&rtp_packet(1, 0, 1), addr(), AbsTime::ZERO, 0).unwrap();
        base.receive_rtp(&rtp_packet(2, 1000, 1), addr(), AbsTime::from_micros(10_000), 2000)
            .unwrap();
        base.receive_rtp(&rtp_packet(3, 2000, 1), addr(), AbsTime::from_micros(20_000), 4500)
            .unwrap();

        let dc = base.build_diagnostic_counters(1).unwrap();
        assert!(dc.mean_jitter > 0 || dc.std_dev_jitter > 0);

        // Draining resets the accumulator.
        let dc2 = base.build_diagnostic_counters(1).unwrap();
        assert_eq!(dc2.mean_jitter, 0);
        assert_eq!(dc2.std_dev_jitter, 0);

        assert!(base.build_diagnostic_counters(999).is_none());
    }

    #[test]
    fn rsi_subreports_update_learned_membership_and_bandwidth() {
        let mut base = SessionBase::new(params());
        base.receive_rtp(&rtp_packet(1, 0, 7), addr(), AbsTime::ZERO, 0).unwrap();

        let rsi = ReceiverSummaryInformation {
            sender_ssrc: 7,
            summary_ssrc: 0xF00D,
            ntp_time: 0,
            sub_reports: vec![
                SubReport::Gapsb(Gapsb {
                    group_size: 10,
                    average_packet_size: 200,
                }),
                SubReport::Bisb(rtcp::rsi::Bisb {
                    role: 0x2,
                    rtcp_bandwidth: rtcp::bandwidth::bytes_per_sec_to_bi(4000.0),
                }),
            ],
        };
        let rr = ReceiverReport {
            ssrc: 0xF00D,
            reports: vec![],
            profile_extensions: bytes::Bytes::new(),
        };
        let raw = rtcp::compound_packet::build(&[RtcpPacket::ReceiverReport(rr), RtcpPacket::Rsi(rsi)]).unwrap();

        base.receive_rtcp(&raw, addr(), AbsTime::ZERO).unwrap();
        assert_eq!(base.nmembers_learned, 8); // 10 - 2
        assert_eq!(base.members.get(7).unwrap().rtcp_nmembers_reported, 10);
        assert!(base.bandwidth_info.rcvr.rpt_per_member_bw.is_some());

        // A second report from the same member rolls its prior contribution
        // back out before folding in the new one.
        let rsi2 = ReceiverSummaryInformation {
            sender_ssrc: 7,
            summary_ssrc: 0xF00D,
            ntp_time: 0,
            sub_reports: vec![SubReport::Gapsb(Gapsb {
                group_size: 4,
                average_packet_size: 150,
            })],
        };
        let rr2 = ReceiverReport {
            ssrc: 0xF00D,
            reports: vec![],
            profile_extensions: bytes::Bytes::new(),
        };
        let raw2 = rtcp::compound_packet::build(&[RtcpPacket::ReceiverReport(rr2), RtcpPacket::Rsi(rsi2)]).unwrap();
        base.receive_rtcp(&raw2, addr(), AbsTime::ZERO).unwrap();
        assert_eq!(base.nmembers_learned, 2); // (8 - 8) + (4 - 2)
    }
}
