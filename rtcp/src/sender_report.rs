//! Sender Report packet (RFC 3550 §6.4.1). This crate is receiver-only, so
//! `SenderReport` is only ever unmarshaled, never built.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::marshal::{Marshal, MarshalSize, Packet, Unmarshal};
use crate::reception_report::{ReceptionReport, RECEPTION_REPORT_LENGTH};

pub const SENDER_INFO_LENGTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_time: u64,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReceptionReport>,
    pub profile_extensions: bytes::Bytes,
}

impl SenderReport {
    fn raw_reports_len(&self) -> usize {
        self.reports.len() * RECEPTION_REPORT_LENGTH
    }
}

impl MarshalSize for SenderReport {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + SENDER_INFO_LENGTH + self.raw_reports_len() + self.profile_extensions.len()
    }
}

impl Marshal for SenderReport {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if self.reports.len() > 31 {
            return Err(Error::TooManyReports);
        }
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::BufferTooShort);
        }
        let words = size / 4 - 1;
        let header = Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type_raw: PacketType::SenderReport.into(),
            length: words as u16,
        };
        let mut n = header.marshal_to(buf)?;
        let mut b = &mut buf[n..];
        b.put_u32(self.ssrc);
        b.put_u64(self.ntp_time);
        b.put_u32(self.rtp_time);
        b.put_u32(self.packet_count);
        b.put_u32(self.octet_count);
        n += SENDER_INFO_LENGTH;
        for r in &self.reports {
            n += r.marshal_to(&mut buf[n..])?;
        }
        buf[n..n + self.profile_extensions.len()].copy_from_slice(&self.profile_extensions);
        n += self.profile_extensions.len();
        Ok(n)
    }
}

impl Unmarshal for SenderReport {
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(raw)?;
        if header.packet_type() != PacketType::SenderReport {
            return Err(Error::WrongType);
        }
        let body = &raw[HEADER_LENGTH..];
        if body.len() < SENDER_INFO_LENGTH {
            return Err(Error::PacketTooShort);
        }
        let mut b = &body[..SENDER_INFO_LENGTH];
        let ssrc = b.get_u32();
        let ntp_time = b.get_u64();
        let rtp_time = b.get_u32();
        let packet_count = b.get_u32();
        let octet_count = b.get_u32();

        let mut reports = Vec::with_capacity(header.count as usize);
        let mut offset = SENDER_INFO_LENGTH;
        for _ in 0..header.count {
            if body.len() < offset + RECEPTION_REPORT_LENGTH {
                return Err(Error::PacketTooShort);
            }
            reports.push(ReceptionReport::unmarshal(&body[offset..offset + RECEPTION_REPORT_LENGTH])?);
            offset += RECEPTION_REPORT_LENGTH;
        }

        let packet_len = (header.length as usize + 1) * 4;
        let extensions_end = packet_len.saturating_sub(HEADER_LENGTH).min(body.len());
        let profile_extensions = if extensions_end > offset {
            bytes::Bytes::copy_from_slice(&body[offset..extensions_end])
        } else {
            bytes::Bytes::new()
        };

        Ok(SenderReport {
            ssrc,
            ntp_time,
            rtp_time,
            packet_count,
            octet_count,
            reports,
            profile_extensions,
        })
    }
}

impl Packet for SenderReport {
    fn header(&self) -> Header {
        let words = self.marshal_size() / 4 - 1;
        Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type_raw: PacketType::SenderReport.into(),
            length: words as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.reports.iter().map(|r| r.ssrc).collect()
    }
}

#[cfg(test)]
mod sender_report_test {
    use super::*;

    #[test]
    fn roundtrips_with_reports() {
        let sr = SenderReport {
            ssrc: 1,
            ntp_time: 2,
            rtp_time: 3,
            packet_count: 4,
            octet_count: 5,
            reports: vec![ReceptionReport {
                ssrc: 9,
                ..Default::default()
            }],
            profile_extensions: bytes::Bytes::new(),
        };
        let raw = sr.marshal().unwrap();
        let got = SenderReport::unmarshal(&raw).unwrap();
        assert_eq!(sr, got);
    }

    #[test]
    fn rejects_wrong_packet_type() {
        let raw = [0x80, 201, 0, 1, 0, 0, 0, 0];
        assert_eq!(SenderReport::unmarshal(&raw), Err(Error::WrongType));
    }
}
