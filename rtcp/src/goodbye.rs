//! Goodbye packet (RFC 3550 §6.6). The session layer uses this to retire a
//! member table entry without waiting out the full BYE timeout.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::marshal::{get_padding, Marshal, MarshalSize, Packet, Unmarshal};

const SSRC_LENGTH: usize = 4;
const REASON_LENGTH_LENGTH: usize = 1;
const MAX_SOURCES: usize = 31;
const MAX_REASON_LENGTH: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Goodbye {
    pub sources: Vec<u32>,
    pub reason: bytes::Bytes,
}

impl MarshalSize for Goodbye {
    fn marshal_size(&self) -> usize {
        let srcs_len = self.sources.len() * SSRC_LENGTH;
        let reason_len = if self.reason.is_empty() {
            0
        } else {
            REASON_LENGTH_LENGTH + self.reason.len()
        };
        let raw = HEADER_LENGTH + srcs_len + reason_len;
        raw + get_padding(raw - HEADER_LENGTH)
    }
}

impl Marshal for Goodbye {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if self.sources.len() > MAX_SOURCES {
            return Err(Error::TooManySources);
        }
        if self.reason.len() > MAX_REASON_LENGTH {
            return Err(Error::ReasonTooLong);
        }
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::BufferTooShort);
        }
        let words = size / 4 - 1;
        let header = Header {
            padding: false,
            count: self.sources.len() as u8,
            packet_type_raw: PacketType::Goodbye.into(),
            length: words as u16,
        };
        let mut n = header.marshal_to(buf)?;
        for s in &self.sources {
            (&mut buf[n..]).put_u32(*s);
            n += SSRC_LENGTH;
        }
        if !self.reason.is_empty() {
            buf[n] = self.reason.len() as u8;
            n += REASON_LENGTH_LENGTH;
            buf[n..n + self.reason.len()].copy_from_slice(&self.reason);
            n += self.reason.len();
        }
        for b in &mut buf[n..size] {
            *b = 0;
        }
        Ok(size)
    }
}

impl Unmarshal for Goodbye {
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(raw)?;
        if header.packet_type() != PacketType::Goodbye {
            return Err(Error::WrongType);
        }
        let mut body = &raw[HEADER_LENGTH..];
        let mut sources = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            if body.len() < SSRC_LENGTH {
                return Err(Error::PacketTooShort);
            }
            sources.push(body.get_u32());
        }
        let reason = if !body.is_empty() {
            let len = body.get_u8() as usize;
            if body.len() < len {
                return Err(Error::PacketTooShort);
            }
            bytes::Bytes::copy_from_slice(&body[..len])
        } else {
            bytes::Bytes::new()
        };
        Ok(Goodbye { sources, reason })
    }
}

impl Packet for Goodbye {
    fn header(&self) -> Header {
        let words = self.marshal_size() / 4 - 1;
        Header {
            padding: false,
            count: self.sources.len() as u8,
            packet_type_raw: PacketType::Goodbye.into(),
            length: words as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.sources.clone()
    }
}

#[cfg(test)]
mod goodbye_test {
    use super::*;

    #[test]
    fn roundtrips_without_reason() {
        let bye = Goodbye {
            sources: vec![1, 2],
            reason: bytes::Bytes::new(),
        };
        let raw = bye.marshal().unwrap();
        assert_eq!(Goodbye::unmarshal(&raw).unwrap(), bye);
    }

    #[test]
    fn roundtrips_with_reason() {
        let bye = Goodbye {
            sources: vec![7],
            reason: bytes::Bytes::from_static(b"camera switch"),
        };
        let raw = bye.marshal().unwrap();
        assert_eq!(raw.len() % 4, 0);
        assert_eq!(Goodbye::unmarshal(&raw).unwrap(), bye);
    }

    #[test]
    fn rejects_reason_too_long() {
        let bye = Goodbye {
            sources: vec![],
            reason: bytes::Bytes::from(vec![0u8; 256]),
        };
        let mut buf = vec![0u8; 512];
        assert_eq!(bye.marshal_to(&mut buf), Err(Error::ReasonTooLong));
    }
}
