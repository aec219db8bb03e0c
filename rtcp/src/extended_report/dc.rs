//! Diagnostic Counters block (vendor XR block, block type
//! [`super::BT_DIAGNOSTIC_COUNTERS`]): cumulative loss/outage counters
//! generalized from `rtcp_xr.c`'s diagnostic-counter TLV table, so a
//! feedback target can distinguish "a few reordered packets" from
//! "the stream dropped out" without decoding the full RLE block.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::marshal::{get_padding, require};

const TAG_LATE_PACKETS: u8 = 1;
const TAG_LOST_PACKETS: u8 = 2;
const TAG_DUP_PACKETS: u8 = 3;
const TAG_SEQ_JUMPS: u8 = 4;
const TAG_OUTAGE_COUNT: u8 = 5;
const TAG_OUTAGE_DURATION_MS: u8 = 6;
/// Mean of the RFC 3550 §A.8 interarrival jitter estimate over the
/// reporting interval, in RTP timestamp units.
const TAG_MEAN_JITTER: u8 = 7;
/// Standard deviation of the same jitter samples, in RTP timestamp units.
const TAG_STD_DEV_JITTER: u8 = 8;

const TLV_HEADER_LENGTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticCountersBlock {
    pub late_packets: u32,
    pub lost_packets: u32,
    pub dup_packets: u32,
    pub seq_jumps: u32,
    pub outage_count: u32,
    pub outage_duration_ms: u32,
    pub mean_jitter: u32,
    pub std_dev_jitter: u32,
}

const NUM_COUNTERS: usize = 8;

impl DiagnosticCountersBlock {
    pub(crate) fn content_len(&self) -> usize {
        let raw = NUM_COUNTERS * (TLV_HEADER_LENGTH + 4);
        raw + get_padding(raw)
    }

    pub(crate) fn marshal_content(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.content_len();
        require(buf, size)?;
        let mut n = 0;
        for (tag, value) in [
            (TAG_LATE_PACKETS, self.late_packets),
            (TAG_LOST_PACKETS, self.lost_packets),
            (TAG_DUP_PACKETS, self.dup_packets),
            (TAG_SEQ_JUMPS, self.seq_jumps),
            (TAG_OUTAGE_COUNT, self.outage_count),
            (TAG_OUTAGE_DURATION_MS, self.outage_duration_ms),
            (TAG_MEAN_JITTER, self.mean_jitter),
            (TAG_STD_DEV_JITTER, self.std_dev_jitter),
        ] {
            buf[n] = tag;
            buf[n + 1] = 4;
            (&mut buf[n + 2..n + 6]).put_u32(value);
            n += TLV_HEADER_LENGTH + 4;
        }
        for b in &mut buf[n..size] {
            *b = 0;
        }
        Ok(size)
    }

    pub(crate) fn unmarshal_content(raw: &[u8]) -> Result<Self> {
        let mut block = DiagnosticCountersBlock::default();
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
            if len == 4 {
                let v = value.get_u32();
                match tag {
                    TAG_LATE_PACKETS => block.late_packets = v,
                    TAG_LOST_PACKETS => block.lost_packets = v,
                    TAG_DUP_PACKETS => block.dup_packets = v,
                    TAG_SEQ_JUMPS => block.seq_jumps = v,
                    TAG_OUTAGE_COUNT => block.outage_count = v,
                    TAG_OUTAGE_DURATION_MS => block.outage_duration_ms = v,
                    TAG_MEAN_JITTER => block.mean_jitter = v,
                    TAG_STD_DEV_JITTER => block.std_dev_jitter = v,
                    _ => {}
                }
            }
            rest = &rest[TLV_HEADER_LENGTH + len..];
        }
        Ok(block)
    }
}

#[cfg(test)]
mod dc_test {
    use super::*;

    #[test]
    fn roundtrips() {
        let block = DiagnosticCountersBlock {
            late_packets: 1,
            lost_packets: 2,
            dup_packets: 3,
            seq_jumps: 4,
            outage_count: 5,
            outage_duration_ms: 6000,
            mean_jitter: 12,
            std_dev_jitter: 3,
        };
        let mut buf = vec![0u8; block.content_len()];
        block.marshal_content(&mut buf).unwrap();
        let got = DiagnosticCountersBlock::unmarshal_content(&buf).unwrap();
        assert_eq!(block, got);
    }
}
