//! Media Acquisition block (vendor XR block, block type
//! [`super::BT_MEDIA_ACQUISITION`]): channel-join diagnostics a receiver can
//! report once per acquisition, generalized from the `ma_xr_tl` TLV table in
//! `rtcp_xr.c`. Unknown tags are preserved verbatim so a mixed-version
//! deployment doesn't lose data it can't yet interpret.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::marshal::{get_padding, require};

const TAG_JOIN_LATENCY_MS: u8 = 1;
const TAG_FIRST_SEQ_NUM: u8 = 2;
const TAG_FIRST_RTP_TIMESTAMP: u8 = 3;
const TAG_CLOCK_LOCK_MS: u8 = 4;

const TLV_HEADER_LENGTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaAcquisitionBlock {
    pub join_latency_ms: Option<u32>,
    pub first_seq_num: Option<u16>,
    pub first_rtp_timestamp: Option<u32>,
    pub clock_lock_ms: Option<u32>,
    pub extra: Vec<(u8, bytes::Bytes)>,
}

fn tlv_len(value_len: usize) -> usize {
    TLV_HEADER_LENGTH + value_len
}

impl MediaAcquisitionBlock {
    pub(crate) fn content_len(&self) -> usize {
        let mut raw = 0;
        if self.join_latency_ms.is_some() {
            raw += tlv_len(4);
        }
        if self.first_seq_num.is_some() {
            raw += tlv_len(2);
        }
        if self.first_rtp_timestamp.is_some() {
            raw += tlv_len(4);
        }
        if self.clock_lock_ms.is_some() {
            raw += tlv_len(4);
        }
        for (_, v) in &self.extra {
            raw += tlv_len(v.len());
        }
        raw + get_padding(raw)
    }

    pub(crate) fn marshal_content(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.content_len();
        require(buf, size)?;
        let mut n = 0;
        if let Some(v) = self.join_latency_ms {
            buf[n] = TAG_JOIN_LATENCY_MS;
            buf[n + 1] = 4;
            (&mut buf[n + 2..n + 6]).put_u32(v);
            n += TLV_HEADER_LENGTH + 4;
        }
        if let Some(v) = self.first_seq_num {
            buf[n] = TAG_FIRST_SEQ_NUM;
            buf[n + 1] = 2;
            (&mut buf[n + 2..n + 4]).put_u16(v);
            n += TLV_HEADER_LENGTH + 2;
        }
        if let Some(v) = self.first_rtp_timestamp {
            buf[n] = TAG_FIRST_RTP_TIMESTAMP;
            buf[n + 1] = 4;
            (&mut buf[n + 2..n + 6]).put_u32(v);
            n += TLV_HEADER_LENGTH + 4;
        }
        if let Some(v) = self.clock_lock_ms {
            buf[n] = TAG_CLOCK_LOCK_MS;
            buf[n + 1] = 4;
            (&mut buf[n + 2..n + 6]).put_u32(v);
            n += TLV_HEADER_LENGTH + 4;
        }
        for (tag, v) in &self.extra {
            buf[n] = *tag;
            buf[n + 1] = v.len() as u8;
            buf[n + 2..n + 2 + v.len()].copy_from_slice(v);
            n += TLV_HEADER_LENGTH + v.len();
        }
        for b in &mut buf[n..size] {
            *b = 0;
        }
        Ok(size)
    }

    pub(crate) fn unmarshal_content(raw: &[u8]) -> Result<Self> {
        let mut block = MediaAcquisitionBlock::default();
        let mut rest = raw;
        while rest.len() >= TLV_HEADER_LENGTH {
            let tag = rest[0];
            let len = rest[1] as usize;
            if tag == 0 && len == 0 {
                break;
            }
            if rest.len() < TLV_HEADER_LENGTH + len {
                return Err(Error::TlvTooLong);
            }
            let mut value = &rest[TLV_HEADER_LENGTH..TLV_HEADER_LENGTH + len];
            match tag {
                TAG_JOIN_LATENCY_MS if len == 4 => block.join_latency_ms = Some(value.get_u32()),
                TAG_FIRST_SEQ_NUM if len == 2 => block.first_seq_num = Some(value.get_u16()),
                TAG_FIRST_RTP_TIMESTAMP if len == 4 => block.first_rtp_timestamp = Some(value.get_u32()),
                TAG_CLOCK_LOCK_MS if len == 4 => block.clock_lock_ms = Some(value.get_u32()),
                _ => block.extra.push((tag, bytes::Bytes::copy_from_slice(value))),
            }
            rest = &rest[TLV_HEADER_LENGTH + len..];
        }
        Ok(block)
    }
}

#[cfg(test)]
mod ma_test {
    use super::*;

    #[test]
    fn roundtrips_known_fields() {
        let block = MediaAcquisitionBlock {
            join_latency_ms: Some(250),
            first_seq_num: Some(1000),
            first_rtp_timestamp: Some(90000),
            clock_lock_ms: Some(500),
            extra: vec![],
        };
        let mut buf = vec![0u8; block.content_len()];
        block.marshal_content(&mut buf).unwrap();
        let got = MediaAcquisitionBlock::unmarshal_content(&buf).unwrap();
        assert_eq!(block, got);
    }

    #[test]
    fn preserves_unknown_tags() {
        let raw = [99u8, 2, 0xAB, 0xCD, 0, 0];
        let got = MediaAcquisitionBlock::unmarshal_content(&raw).unwrap();
        assert_eq!(got.extra, vec![(99, bytes::Bytes::from_static(&[0xAB, 0xCD]))]);
    }
}
