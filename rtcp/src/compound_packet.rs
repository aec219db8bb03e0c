//! Compound packet parse/build/dispatch (RFC 3550 §6.1): every RTCP packet
//! sent on the wire is one or more individual packets concatenated back to
//! back, with the first required to be an SR or RR.

use crate::error::{Error, Result};
use crate::goodbye::Goodbye;
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::marshal::{Marshal, Unmarshal};
use crate::receiver_report::ReceiverReport;
use crate::rsi::ReceiverSummaryInformation;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::extended_report::ExtendedReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    Goodbye(Goodbye),
    ExtendedReport(ExtendedReport),
    Rsi(ReceiverSummaryInformation),
    Unsupported { header: Header, raw: bytes::Bytes },
}

impl RtcpPacket {
    pub fn packet_type(&self) -> PacketType {
        match self {
            RtcpPacket::SenderReport(_) => PacketType::SenderReport,
            RtcpPacket::ReceiverReport(_) => PacketType::ReceiverReport,
            RtcpPacket::SourceDescription(_) => PacketType::SourceDescription,
            RtcpPacket::Goodbye(_) => PacketType::Goodbye,
            RtcpPacket::ExtendedReport(_) => PacketType::ExtendedReport,
            RtcpPacket::Rsi(_) => PacketType::ReceiverSummaryInformation,
            RtcpPacket::Unsupported { header, .. } => header.packet_type(),
        }
    }

    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            RtcpPacket::SenderReport(p) => p.marshal_to(buf),
            RtcpPacket::ReceiverReport(p) => p.marshal_to(buf),
            RtcpPacket::SourceDescription(p) => p.marshal_to(buf),
            RtcpPacket::Goodbye(p) => p.marshal_to(buf),
            RtcpPacket::ExtendedReport(p) => p.marshal_to(buf),
            RtcpPacket::Rsi(p) => p.marshal_to(buf),
            RtcpPacket::Unsupported { raw, .. } => {
                if buf.len() < raw.len() {
                    return Err(Error::BufferTooShort);
                }
                buf[..raw.len()].copy_from_slice(raw);
                Ok(raw.len())
            }
        }
    }

    fn marshal_size(&self) -> usize {
        match self {
            RtcpPacket::SenderReport(p) => crate::marshal::MarshalSize::marshal_size(p),
            RtcpPacket::ReceiverReport(p) => crate::marshal::MarshalSize::marshal_size(p),
            RtcpPacket::SourceDescription(p) => crate::marshal::MarshalSize::marshal_size(p),
            RtcpPacket::Goodbye(p) => crate::marshal::MarshalSize::marshal_size(p),
            RtcpPacket::ExtendedReport(p) => crate::marshal::MarshalSize::marshal_size(p),
            RtcpPacket::Rsi(p) => crate::marshal::MarshalSize::marshal_size(p),
            RtcpPacket::Unsupported { raw, .. } => raw.len(),
        }
    }
}

/// Parses a compound RTCP packet, validating that the first sub-packet is
/// an SR or RR (RFC 3550 §6.1) and that every sub-packet's declared length
/// lines up with the next one's start.
pub fn parse(raw: &[u8]) -> Result<Vec<RtcpPacket>> {
    if raw.is_empty() {
        return Err(Error::EmptyCompound);
    }

    let mut packets = Vec::new();
    let mut offset = 0;
    while offset < raw.len() {
        if raw.len() - offset < HEADER_LENGTH {
            return Err(Error::PacketTooShort);
        }
        let header = Header::unmarshal(&raw[offset..])?;
        let packet_len = (header.length as usize + 1) * 4;
        if raw.len() - offset < packet_len {
            return Err(Error::PacketTooShort);
        }
        let sub = &raw[offset..offset + packet_len];

        let packet = match header.packet_type() {
            PacketType::SenderReport => RtcpPacket::SenderReport(SenderReport::unmarshal(sub)?),
            PacketType::ReceiverReport => RtcpPacket::ReceiverReport(ReceiverReport::unmarshal(sub)?),
            PacketType::SourceDescription => RtcpPacket::SourceDescription(SourceDescription::unmarshal(sub)?),
            PacketType::Goodbye => RtcpPacket::Goodbye(Goodbye::unmarshal(sub)?),
            PacketType::ExtendedReport => RtcpPacket::ExtendedReport(ExtendedReport::unmarshal(sub)?),
            PacketType::ReceiverSummaryInformation => RtcpPacket::Rsi(ReceiverSummaryInformation::unmarshal(sub)?),
            _ => RtcpPacket::Unsupported {
                header,
                raw: bytes::Bytes::copy_from_slice(sub),
            },
        };

        if packets.is_empty()
            && !matches!(packet.packet_type(), PacketType::SenderReport | PacketType::ReceiverReport)
        {
            return Err(Error::BadFirstPacket);
        }

        packets.push(packet);
        offset += packet_len;
    }

    Ok(packets)
}

/// Serializes a sequence of packets back into one compound RTCP packet.
pub fn build(packets: &[RtcpPacket]) -> Result<bytes::Bytes> {
    if packets.is_empty() {
        return Err(Error::EmptyCompound);
    }
    if !matches!(
        packets[0].packet_type(),
        PacketType::SenderReport | PacketType::ReceiverReport
    ) {
        return Err(Error::BadFirstPacket);
    }

    let total: usize = packets.iter().map(RtcpPacket::marshal_size).sum();
    let mut buf = vec![0u8; total];
    let mut n = 0;
    for p in packets {
        n += p.marshal_to(&mut buf[n..])?;
    }
    buf.truncate(n);
    Ok(buf.into())
}
