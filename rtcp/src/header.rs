//! Common RTCP header (RFC 3550 §6.4.1) shared by every packet type in a
//! compound packet.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::marshal::{Marshal, MarshalSize, Unmarshal};

pub const HEADER_LENGTH: usize = 4;
pub const RTP_VERSION: u8 = 2;
const VERSION_SHIFT: u8 = 6;
const VERSION_MASK: u8 = 0x3;
const PADDING_SHIFT: u8 = 5;
const PADDING_MASK: u8 = 0x1;
const COUNT_MASK: u8 = 0x1F;

/// Feedback message format for RTPFB/PSFB (RFC 4585).
pub const FORMAT_PLI: u8 = 1;
pub const FORMAT_SLI: u8 = 2;
pub const FORMAT_FIR: u8 = 4;
pub const FORMAT_TLN: u8 = 1;
pub const FORMAT_RRR: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    SenderReport,
    ReceiverReport,
    SourceDescription,
    Goodbye,
    ApplicationDefined,
    TransportSpecificFeedback,
    PayloadSpecificFeedback,
    ExtendedReport,
    AvbRtcpPacket,
    ReceiverSummaryInformation,
    Unsupported(u8),
}

impl From<u8> for PacketType {
    fn from(b: u8) -> Self {
        match b {
            200 => PacketType::SenderReport,
            201 => PacketType::ReceiverReport,
            202 => PacketType::SourceDescription,
            203 => PacketType::Goodbye,
            204 => PacketType::ApplicationDefined,
            205 => PacketType::TransportSpecificFeedback,
            206 => PacketType::PayloadSpecificFeedback,
            207 => PacketType::ExtendedReport,
            208 => PacketType::AvbRtcpPacket,
            209 => PacketType::ReceiverSummaryInformation,
            other => PacketType::Unsupported(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(p: PacketType) -> u8 {
        match p {
            PacketType::SenderReport => 200,
            PacketType::ReceiverReport => 201,
            PacketType::SourceDescription => 202,
            PacketType::Goodbye => 203,
            PacketType::ApplicationDefined => 204,
            PacketType::TransportSpecificFeedback => 205,
            PacketType::PayloadSpecificFeedback => 206,
            PacketType::ExtendedReport => 207,
            PacketType::AvbRtcpPacket => 208,
            PacketType::ReceiverSummaryInformation => 209,
            PacketType::Unsupported(b) => b,
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PacketType::SenderReport => "SR",
            PacketType::ReceiverReport => "RR",
            PacketType::SourceDescription => "SDES",
            PacketType::Goodbye => "BYE",
            PacketType::ApplicationDefined => "APP",
            PacketType::TransportSpecificFeedback => "TransportSpecificFeedback",
            PacketType::PayloadSpecificFeedback => "PayloadSpecificFeedback",
            PacketType::ExtendedReport => "XR",
            PacketType::AvbRtcpPacket => "AVB",
            PacketType::ReceiverSummaryInformation => "RSI",
            PacketType::Unsupported(_) => "Unsupported",
        };
        write!(f, "{s}")
    }
}

/// Common RTCP header. `count` doubles as the feedback message type (FMT)
/// field for RTPFB/PSFB packets, per RFC 4585.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub padding: bool,
    pub count: u8,
    pub packet_type_raw: u8,
    /// Packet length in 32-bit words minus one (RFC 3550 §6.4.1).
    pub length: u16,
}

impl Header {
    pub fn packet_type(&self) -> PacketType {
        PacketType::from(self.packet_type_raw)
    }
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Marshal for Header {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::BufferTooShort);
        }
        if self.count > 31 {
            return Err(Error::TooManyReports);
        }
        let mut b = &mut buf[..HEADER_LENGTH];
        let b0 = (RTP_VERSION << VERSION_SHIFT)
            | ((self.padding as u8) << PADDING_SHIFT)
            | (self.count & COUNT_MASK);
        b.put_u8(b0);
        b.put_u8(self.packet_type_raw);
        b.put_u16(self.length);
        Ok(HEADER_LENGTH)
    }
}

impl Unmarshal for Header {
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LENGTH {
            return Err(Error::PacketTooShort);
        }
        let mut b = raw;
        let b0 = b.get_u8();
        let version = (b0 >> VERSION_SHIFT) & VERSION_MASK;
        if version != RTP_VERSION {
            return Err(Error::BadVersion);
        }
        let padding = ((b0 >> PADDING_SHIFT) & PADDING_MASK) > 0;
        let count = b0 & COUNT_MASK;
        let packet_type_raw = b.get_u8();
        let length = b.get_u16();
        Ok(Header {
            padding,
            count,
            packet_type_raw,
            length,
        })
    }
}

#[cfg(test)]
mod header_test {
    use super::*;

    #[test]
    fn roundtrips_through_marshal() {
        let h = Header {
            padding: false,
            count: 1,
            packet_type_raw: 200,
            length: 6,
        };
        let raw = h.marshal().unwrap();
        let got = Header::unmarshal(&raw).unwrap();
        assert_eq!(h, got);
        assert_eq!(got.packet_type(), PacketType::SenderReport);
    }

    #[test]
    fn rejects_bad_version() {
        let raw = [0x00, 200, 0, 6];
        assert_eq!(Header::unmarshal(&raw), Err(Error::BadVersion));
    }

    #[test]
    fn rejects_count_over_31() {
        let h = Header {
            padding: false,
            count: 32,
            packet_type_raw: 201,
            length: 1,
        };
        let mut buf = [0u8; 4];
        assert_eq!(h.marshal_to(&mut buf), Err(Error::TooManyReports));
    }

    #[test]
    fn unsupported_type_is_preserved() {
        let raw = [0x80, 199, 0, 0];
        let h = Header::unmarshal(&raw).unwrap();
        assert_eq!(h.packet_type(), PacketType::Unsupported(199));
    }
}
