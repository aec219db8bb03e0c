//! RTP header parsing (RFC 3550), including the optional 32-bit extension
//! header. Extension contents are handed back raw — this crate validates
//! their length but does not interpret them.

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

pub const MIN_HEADER_LENGTH: usize = 12;
const VERSION_SHIFT: u8 = 6;
const VERSION_MASK: u8 = 0x3;
const PADDING_SHIFT: u8 = 5;
const PADDING_MASK: u8 = 0x1;
const EXTENSION_SHIFT: u8 = 4;
const EXTENSION_MASK: u8 = 0x1;
const CC_MASK: u8 = 0xF;
const MARKER_SHIFT: u8 = 7;
const MARKER_MASK: u8 = 0x1;
const PT_MASK: u8 = 0x7F;
const RTP_VERSION: u8 = 2;

/// Outcome of validating a header: the caller may choose to process or
/// skip the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    ExtensionPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extension_payload: Bytes,
    /// Offset of the payload within the original buffer.
    pub header_len: usize,
}

/// Validate and parse an RTP header. Returns `ParseStatus::ExtensionPresent`
/// when an extension header was found and parsed, so the caller can decide
/// whether to interpret `extension_payload`.
pub fn parse(raw: &[u8]) -> Result<(Header, ParseStatus)> {
    if raw.len() < MIN_HEADER_LENGTH {
        return Err(Error::HeaderSizeInsufficient);
    }

    let mut buf = raw;
    let b0 = buf.get_u8();
    let version = (b0 >> VERSION_SHIFT) & VERSION_MASK;
    if version != RTP_VERSION {
        return Err(Error::BadVersion);
    }
    let padding = ((b0 >> PADDING_SHIFT) & PADDING_MASK) > 0;
    let extension = ((b0 >> EXTENSION_SHIFT) & EXTENSION_MASK) > 0;
    let cc = (b0 & CC_MASK) as usize;

    let fixed_len = MIN_HEADER_LENGTH + cc * 4;
    if raw.len() < fixed_len {
        return Err(Error::HeaderSizeInsufficient);
    }

    let b1 = buf.get_u8();
    let marker = ((b1 >> MARKER_SHIFT) & MARKER_MASK) > 0;
    let payload_type = b1 & PT_MASK;
    let sequence_number = buf.get_u16();
    let timestamp = buf.get_u32();
    let ssrc = buf.get_u32();

    let mut csrc = Vec::with_capacity(cc);
    for _ in 0..cc {
        csrc.push(buf.get_u32());
    }

    let mut header = Header {
        version,
        padding,
        marker,
        payload_type,
        sequence_number,
        timestamp,
        ssrc,
        csrc,
        extension_profile: 0,
        extension_payload: Bytes::new(),
        header_len: fixed_len,
    };

    if !extension {
        return Ok((header, ParseStatus::Ok));
    }

    if raw.len() < fixed_len + 4 {
        return Err(Error::HeaderSizeInsufficientForExtension);
    }
    header.extension_profile = buf.get_u16();
    let ext_words = buf.get_u16() as usize;
    let ext_len = ext_words * 4;
    if raw.len() < fixed_len + 4 + ext_len {
        return Err(Error::HeaderSizeInsufficientForExtension);
    }
    header.extension_payload = Bytes::copy_from_slice(&raw[fixed_len + 4..fixed_len + 4 + ext_len]);
    header.header_len = fixed_len + 4 + ext_len;

    Ok((header, ParseStatus::ExtensionPresent))
}

#[cfg(test)]
mod header_test {
    use super::*;

    fn base_header_bytes(cc: u8, ext: bool) -> Vec<u8> {
        let mut b = vec![0u8; 12 + (cc as usize) * 4];
        b[0] = (2 << VERSION_SHIFT) | (if ext { 1 } else { 0 } << EXTENSION_SHIFT) | cc;
        b[1] = 96; // payload type
        b[2..4].copy_from_slice(&1000u16.to_be_bytes());
        b[4..8].copy_from_slice(&90000u32.to_be_bytes());
        b[8..12].copy_from_slice(&0xDEADBEEFu32.to_be_bytes());
        b
    }

    #[test]
    fn runt_packet_is_rejected() {
        let buf = [0u8; 4];
        assert_eq!(parse(&buf), Err(Error::HeaderSizeInsufficient));
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut b = base_header_bytes(0, false);
        b[0] = (1 << VERSION_SHIFT) | 0; // version 1
        assert_eq!(parse(&b), Err(Error::BadVersion));
    }

    #[test]
    fn plain_header_parses() {
        let b = base_header_bytes(0, false);
        let (h, status) = parse(&b).unwrap();
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(h.sequence_number, 1000);
        assert_eq!(h.timestamp, 90000);
        assert_eq!(h.ssrc, 0xDEADBEEF);
    }

    #[test]
    fn csrc_accounted_for_in_length_check() {
        let mut b = base_header_bytes(2, false);
        b.truncate(b.len() - 1);
        assert_eq!(parse(&b), Err(Error::HeaderSizeInsufficient));
    }

    #[test]
    fn extension_present_is_reported_distinctly() {
        let mut b = base_header_bytes(0, true);
        b.extend_from_slice(&0xBEDEu16.to_be_bytes());
        b.extend_from_slice(&1u16.to_be_bytes());
        b.extend_from_slice(&[1, 2, 3, 4]);
        let (h, status) = parse(&b).unwrap();
        assert_eq!(status, ParseStatus::ExtensionPresent);
        assert_eq!(h.extension_payload.as_ref(), &[1, 2, 3, 4]);
    }
}
