//! Receiver Summary Information packet (RFC 5760 §4), used by an SSM
//! feedback target to summarize group receive status back out to the
//! receivers it aggregates. Not present in the teacher's `rtcp` crate; this
//! is a pack addition grounded on `rtp_ssm_rsi_fbt.c`/`rtp_ssm_rsi.c`.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::marshal::{get_padding, require, Marshal, MarshalSize, Packet, Unmarshal};

// sender_ssrc(4) + summary_ssrc(4) + ntp_time(8)
const RSI_FIXED_LENGTH: usize = 16;
const SUBREPORT_HEADER_LENGTH: usize = 4;

/// Group-and-Average-Packet-Size Summary Block: how many members the
/// sending member's own view of the group reports, plus its observed
/// average packet size. Applied into the FBT's learned-membership count
/// and rolled into the session's average packet size estimate
/// (`rtcp_process_rsi`'s GAPSB handling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gapsb {
    pub group_size: u32,
    pub average_packet_size: u16,
}

const GAPSB_LENGTH: usize = 6;

impl Gapsb {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        require(buf, GAPSB_LENGTH)?;
        let mut b = &mut buf[..GAPSB_LENGTH];
        b.put_u32(self.group_size);
        b.put_u16(self.average_packet_size);
        Ok(GAPSB_LENGTH)
    }

    fn unmarshal(raw: &[u8]) -> Result<Self> {
        require(raw, GAPSB_LENGTH)?;
        let mut b = &raw[..GAPSB_LENGTH];
        Ok(Gapsb {
            group_size: b.get_u32(),
            average_packet_size: b.get_u16(),
        })
    }
}

/// Bandwidth Indication Summary Block: the reporting member's view of the
/// RTCP bandwidth apportioned to a role, so a feedback-target-derived
/// per-member share can override the population-wide RFC 3556 estimate
/// (`rtcp_process_rsi`'s BISB handling, `rtcp::bandwidth::
/// BandwidthInfo::apply_reported_bandwidth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bisb {
    /// Bit 0: applies to the sender role. Bit 1: applies to the receiver
    /// role. Both may be set.
    pub role: u16,
    /// 16:16 fixed-point bytes/sec, carried through unconverted into
    /// `BandwidthRole::rpt_per_member_bw`.
    pub rtcp_bandwidth: u32,
}

const BISB_LENGTH: usize = 6;

impl Bisb {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        require(buf, BISB_LENGTH)?;
        let mut b = &mut buf[..BISB_LENGTH];
        b.put_u16(self.role);
        b.put_u32(self.rtcp_bandwidth);
        Ok(BISB_LENGTH)
    }

    fn unmarshal(raw: &[u8]) -> Result<Self> {
        require(raw, BISB_LENGTH)?;
        let mut b = &raw[..BISB_LENGTH];
        Ok(Bisb {
            role: b.get_u16(),
            rtcp_bandwidth: b.get_u32(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubReport {
    Gapsb(Gapsb),
    Bisb(Bisb),
    Unsupported { sub_type: u16, content: bytes::Bytes },
}

impl SubReport {
    const TYPE_GAPSB: u16 = 0;
    const TYPE_BISB: u16 = 1;

    fn content_len(&self) -> usize {
        match self {
            SubReport::Gapsb(_) => GAPSB_LENGTH,
            SubReport::Bisb(_) => BISB_LENGTH,
            SubReport::Unsupported { content, .. } => content.len(),
        }
    }

    fn marshal_size(&self) -> usize {
        let raw = SUBREPORT_HEADER_LENGTH + self.content_len();
        raw + get_padding(raw)
    }

    fn sub_type(&self) -> u16 {
        match self {
            SubReport::Gapsb(_) => Self::TYPE_GAPSB,
            SubReport::Bisb(_) => Self::TYPE_BISB,
            SubReport::Unsupported { sub_type, .. } => *sub_type,
        }
    }

    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.marshal_size();
        require(buf, size)?;
        let content_len = self.content_len();
        (&mut buf[..2]).put_u16(self.sub_type());
        (&mut buf[2..4]).put_u16(content_len as u16);
        let written = match self {
            SubReport::Gapsb(g) => g.marshal_to(&mut buf[4..])?,
            SubReport::Bisb(b) => b.marshal_to(&mut buf[4..])?,
            SubReport::Unsupported { content, .. } => {
                buf[4..4 + content.len()].copy_from_slice(content);
                content.len()
            }
        };
        for b in &mut buf[4 + written..size] {
            *b = 0;
        }
        Ok(size)
    }

    fn unmarshal(raw: &[u8]) -> Result<(Self, usize)> {
        require(raw, SUBREPORT_HEADER_LENGTH)?;
        let mut hdr = &raw[..SUBREPORT_HEADER_LENGTH];
        let sub_type = hdr.get_u16();
        let content_len = hdr.get_u16() as usize;
        require(raw, SUBREPORT_HEADER_LENGTH + content_len)?;
        let content = &raw[SUBREPORT_HEADER_LENGTH..SUBREPORT_HEADER_LENGTH + content_len];
        let report = match sub_type {
            Self::TYPE_GAPSB => SubReport::Gapsb(Gapsb::unmarshal(content)?),
            Self::TYPE_BISB => SubReport::Bisb(Bisb::unmarshal(content)?),
            other => SubReport::Unsupported {
                sub_type: other,
                content: bytes::Bytes::copy_from_slice(content),
            },
        };
        let raw_total = SUBREPORT_HEADER_LENGTH + content_len;
        let total = raw_total + get_padding(raw_total);
        Ok((report, total))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiverSummaryInformation {
    pub sender_ssrc: u32,
    pub summary_ssrc: u32,
    pub ntp_time: u64,
    pub sub_reports: Vec<SubReport>,
}

impl MarshalSize for ReceiverSummaryInformation {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + RSI_FIXED_LENGTH + self.sub_reports.iter().map(SubReport::marshal_size).sum::<usize>()
    }
}

impl Marshal for ReceiverSummaryInformation {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::BufferTooShort);
        }
        let words = size / 4 - 1;
        let header = Header {
            padding: false,
            count: 0,
            packet_type_raw: PacketType::ReceiverSummaryInformation.into(),
            length: words as u16,
        };
        let mut n = header.marshal_to(buf)?;
        (&mut buf[n..]).put_u32(self.sender_ssrc);
        n += 4;
        (&mut buf[n..]).put_u32(self.summary_ssrc);
        n += 4;
        (&mut buf[n..]).put_u64(self.ntp_time);
        n += 8;
        for sr in &self.sub_reports {
            n += sr.marshal_to(&mut buf[n..])?;
        }
        Ok(n)
    }
}

impl Unmarshal for ReceiverSummaryInformation {
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(raw)?;
        if header.packet_type() != PacketType::ReceiverSummaryInformation {
            return Err(Error::WrongType);
        }
        let mut body = &raw[HEADER_LENGTH..];
        if body.len() < 16 {
            return Err(Error::PacketTooShort);
        }
        let sender_ssrc = body.get_u32();
        let summary_ssrc = body.get_u32();
        let ntp_time = body.get_u64();

        let packet_len = (header.length as usize + 1) * 4;
        let mut remaining = packet_len.saturating_sub(HEADER_LENGTH + 16).min(body.len());
        let mut sub_reports = Vec::new();
        let mut offset = 0;
        while remaining > 0 {
            let (sr, consumed) = SubReport::unmarshal(&body[offset..])?;
            sub_reports.push(sr);
            offset += consumed;
            remaining = remaining.saturating_sub(consumed);
        }

        Ok(ReceiverSummaryInformation {
            sender_ssrc,
            summary_ssrc,
            ntp_time,
            sub_reports,
        })
    }
}

impl Packet for ReceiverSummaryInformation {
    fn header(&self) -> Header {
        let words = self.marshal_size() / 4 - 1;
        Header {
            padding: false,
            count: 0,
            packet_type_raw: PacketType::ReceiverSummaryInformation.into(),
            length: words as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.summary_ssrc]
    }
}

#[cfg(test)]
mod rsi_test {
    use super::*;

    #[test]
    fn roundtrips_with_gapsb() {
        let rsi = ReceiverSummaryInformation {
            sender_ssrc: 1,
            summary_ssrc: 2,
            ntp_time: 3,
            sub_reports: vec![SubReport::Gapsb(Gapsb {
                group_size: 10,
                average_packet_size: 200,
            })],
        };
        let raw = rsi.marshal().unwrap();
        assert_eq!(raw.len() % 4, 0);
        assert_eq!(ReceiverSummaryInformation::unmarshal(&raw).unwrap(), rsi);
    }

    #[test]
    fn roundtrips_with_bisb() {
        let rsi = ReceiverSummaryInformation {
            sender_ssrc: 1,
            summary_ssrc: 2,
            ntp_time: 0,
            sub_reports: vec![SubReport::Bisb(Bisb {
                role: 0x3,
                rtcp_bandwidth: 65536 * 8000,
            })],
        };
        let raw = rsi.marshal().unwrap();
        let got = ReceiverSummaryInformation::unmarshal(&raw).unwrap();
        assert_eq!(got.sub_reports.len(), 1);
        match &got.sub_reports[0] {
            SubReport::Bisb(b) => {
                assert_eq!(b.role, 0x3);
                assert_eq!(b.rtcp_bandwidth, 65536 * 8000);
            }
            _ => panic!("expected Bisb"),
        }
    }

    #[test]
    fn roundtrips_with_both_subreports() {
        let rsi = ReceiverSummaryInformation {
            sender_ssrc: 7,
            summary_ssrc: 9,
            ntp_time: 42,
            sub_reports: vec![
                SubReport::Gapsb(Gapsb {
                    group_size: 5,
                    average_packet_size: 150,
                }),
                SubReport::Bisb(Bisb {
                    role: 0x1,
                    rtcp_bandwidth: 1000,
                }),
            ],
        };
        let raw = rsi.marshal().unwrap();
        assert_eq!(ReceiverSummaryInformation::unmarshal(&raw).unwrap(), rsi);
    }
}
