//! Receiver Report packet (RFC 3550 §6.4.2). This is the packet type this
//! stack actually emits; `member.rs` in `rtrecv-session` builds one of these
//! per reporting interval from `rtp::SourceState`.

use bytes::BufMut;

use crate::error::{Error, Result};
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::marshal::{Marshal, MarshalSize, Packet, Unmarshal};
use crate::reception_report::{ReceptionReport, RECEPTION_REPORT_LENGTH};

pub const RR_SSRC_LENGTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReceptionReport>,
    pub profile_extensions: bytes::Bytes,
}

impl MarshalSize for ReceiverReport {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH
            + RR_SSRC_LENGTH
            + self.reports.len() * RECEPTION_REPORT_LENGTH
            + self.profile_extensions.len()
    }
}

impl Marshal for ReceiverReport {
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
            packet_type_raw: PacketType::ReceiverReport.into(),
            length: words as u16,
        };
        let mut n = header.marshal_to(buf)?;
        (&mut buf[n..]).put_u32(self.ssrc);
        n += RR_SSRC_LENGTH;
        for r in &self.reports {
            n += r.marshal_to(&mut buf[n..])?;
        }
        buf[n..n + self.profile_extensions.len()].copy_from_slice(&self.profile_extensions);
        n += self.profile_extensions.len();
        Ok(n)
    }
}

impl Unmarshal for ReceiverReport {
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(raw)?;
        if header.packet_type() != PacketType::ReceiverReport {
            return Err(Error::WrongType);
        }
        let body = &raw[HEADER_LENGTH..];
        if body.len() < RR_SSRC_LENGTH {
            return Err(Error::PacketTooShort);
        }
        let ssrc = u32::from_be_bytes(body[..4].try_into().unwrap());

        let mut reports = Vec::with_capacity(header.count as usize);
        let mut offset = RR_SSRC_LENGTH;
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

        Ok(ReceiverReport {
            ssrc,
            reports,
            profile_extensions,
        })
    }
}

impl Packet for ReceiverReport {
    fn header(&self) -> Header {
        let words = self.marshal_size() / 4 - 1;
        Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type_raw: PacketType::ReceiverReport.into(),
            length: words as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.reports.iter().map(|r| r.ssrc).collect()
    }
}
