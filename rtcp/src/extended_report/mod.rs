//! Extended Report packet (RFC 3611), carrying per-block diagnostic and
//! loss-pattern data. Two block types are vendor extensions (Media
//! Acquisition timing and Diagnostic Counters) carried in the experimental
//! block-type range the registry reserves (192-254), grounded on
//! `rtcp_xr.c`'s `ma_xr_tl`/`dc` TLV tables.

pub mod dc;
pub mod ma;
pub mod rle;

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::marshal::{require, Marshal, MarshalSize, Packet, Unmarshal};

pub use dc::DiagnosticCountersBlock;
pub use ma::MediaAcquisitionBlock;
pub use rle::LossRleReportBlock;

pub const BT_LOSS_RLE: u8 = 1;
pub const BT_DUPLICATE_RLE: u8 = 2;
pub const BT_RECEIVER_REFERENCE_TIME: u8 = 4;
pub const BT_STATISTICS_SUMMARY: u8 = 6;
pub const BT_MEDIA_ACQUISITION: u8 = 220;
pub const BT_DIAGNOSTIC_COUNTERS: u8 = 221;

const BLOCK_HEADER_LENGTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XrBlock {
    LossRle(LossRleReportBlock),
    DuplicateRle(LossRleReportBlock),
    MediaAcquisition(MediaAcquisitionBlock),
    DiagnosticCounters(DiagnosticCountersBlock),
    Unsupported {
        block_type: u8,
        type_specific: u8,
        content: bytes::Bytes,
    },
}

impl XrBlock {
    fn block_type(&self) -> u8 {
        match self {
            XrBlock::LossRle(_) => BT_LOSS_RLE,
            XrBlock::DuplicateRle(_) => BT_DUPLICATE_RLE,
            XrBlock::MediaAcquisition(_) => BT_MEDIA_ACQUISITION,
            XrBlock::DiagnosticCounters(_) => BT_DIAGNOSTIC_COUNTERS,
            XrBlock::Unsupported { block_type, .. } => *block_type,
        }
    }

    fn content_len(&self) -> usize {
        match self {
            XrBlock::LossRle(b) | XrBlock::DuplicateRle(b) => b.content_len(),
            XrBlock::MediaAcquisition(b) => b.content_len(),
            XrBlock::DiagnosticCounters(b) => b.content_len(),
            XrBlock::Unsupported { content, .. } => content.len(),
        }
    }

    fn marshal_size(&self) -> usize {
        BLOCK_HEADER_LENGTH + self.content_len()
    }

    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.marshal_size();
        require(buf, size)?;
        buf[0] = self.block_type();
        buf[1] = 0;
        let words = (self.content_len() / 4) as u16;
        (&mut buf[2..4]).put_u16(words);
        let written = match self {
            XrBlock::LossRle(b) | XrBlock::DuplicateRle(b) => b.marshal_content(&mut buf[4..])?,
            XrBlock::MediaAcquisition(b) => b.marshal_content(&mut buf[4..])?,
            XrBlock::DiagnosticCounters(b) => b.marshal_content(&mut buf[4..])?,
            XrBlock::Unsupported { content, .. } => {
                buf[4..4 + content.len()].copy_from_slice(content);
                content.len()
            }
        };
        Ok(BLOCK_HEADER_LENGTH + written)
    }

    fn unmarshal(raw: &[u8]) -> Result<(Self, usize)> {
        require(raw, BLOCK_HEADER_LENGTH)?;
        let block_type = raw[0];
        let type_specific = raw[1];
        let content_words = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        let content_len = content_words * 4;
        require(raw, BLOCK_HEADER_LENGTH + content_len)?;
        let content = &raw[BLOCK_HEADER_LENGTH..BLOCK_HEADER_LENGTH + content_len];
        let block = match block_type {
            BT_LOSS_RLE => XrBlock::LossRle(LossRleReportBlock::unmarshal_content(content)?),
            BT_DUPLICATE_RLE => XrBlock::DuplicateRle(LossRleReportBlock::unmarshal_content(content)?),
            BT_MEDIA_ACQUISITION => XrBlock::MediaAcquisition(MediaAcquisitionBlock::unmarshal_content(content)?),
            BT_DIAGNOSTIC_COUNTERS => {
                XrBlock::DiagnosticCounters(DiagnosticCountersBlock::unmarshal_content(content)?)
            }
            other => XrBlock::Unsupported {
                block_type: other,
                type_specific,
                content: bytes::Bytes::copy_from_slice(content),
            },
        };
        Ok((block, BLOCK_HEADER_LENGTH + content_len))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtendedReport {
    pub sender_ssrc: u32,
    pub blocks: Vec<XrBlock>,
}

impl MarshalSize for ExtendedReport {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + 4 + self.blocks.iter().map(XrBlock::marshal_size).sum::<usize>()
    }
}

impl Marshal for ExtendedReport {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::BufferTooShort);
        }
        let words = size / 4 - 1;
        let header = Header {
            padding: false,
            count: 0,
            packet_type_raw: PacketType::ExtendedReport.into(),
            length: words as u16,
        };
        let mut n = header.marshal_to(buf)?;
        (&mut buf[n..]).put_u32(self.sender_ssrc);
        n += 4;
        for block in &self.blocks {
            n += block.marshal_to(&mut buf[n..])?;
        }
        Ok(n)
    }
}

impl Unmarshal for ExtendedReport {
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(raw)?;
        if header.packet_type() != PacketType::ExtendedReport {
            return Err(Error::WrongType);
        }
        let mut body = &raw[HEADER_LENGTH..];
        if body.len() < 4 {
            return Err(Error::PacketTooShort);
        }
        let sender_ssrc = body.get_u32();

        let packet_len = (header.length as usize + 1) * 4;
        let mut remaining = packet_len.saturating_sub(HEADER_LENGTH + 4).min(body.len());
        let mut blocks = Vec::new();
        let mut offset = 0;
        while remaining > 0 {
            let (block, consumed) = XrBlock::unmarshal(&body[offset..])?;
            blocks.push(block);
            offset += consumed;
            remaining = remaining.saturating_sub(consumed);
        }

        Ok(ExtendedReport { sender_ssrc, blocks })
    }
}

impl Packet for ExtendedReport {
    fn header(&self) -> Header {
        let words = self.marshal_size() / 4 - 1;
        Header {
            padding: false,
            count: 0,
            packet_type_raw: PacketType::ExtendedReport.into(),
            length: words as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![]
    }
}

#[cfg(test)]
mod extended_report_test {
    use super::*;
    use crate::extended_report::rle::ChunkKind;

    #[test]
    fn roundtrips_with_loss_rle_block() {
        let rle = LossRleReportBlock {
            ssrc: 5,
            begin_seq: 0,
            end_seq: 8,
            chunks: vec![rle::encode_chunk(ChunkKind::BitVector(&[
                false, false, true, false, false, false, false, false,
            ]))],
        };
        let xr = ExtendedReport {
            sender_ssrc: 1,
            blocks: vec![XrBlock::LossRle(rle)],
        };
        let raw = xr.marshal().unwrap();
        assert_eq!(raw.len() % 4, 0);
        let got = ExtendedReport::unmarshal(&raw).unwrap();
        assert_eq!(xr, got);
    }
}
