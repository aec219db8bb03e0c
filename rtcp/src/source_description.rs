//! Source Description packet (RFC 3550 §6.5). Only CNAME is required by
//! this stack; the other item types are parsed but otherwise unused.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::marshal::{Marshal, MarshalSize, Packet, Unmarshal};

const SDES_SOURCE_LENGTH: usize = 4;
const SDES_TYPE_LENGTH: usize = 2;
const SDES_MAX_SOURCES: usize = 31;
const SDES_OCTET_COUNT_MAX: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdesType {
    End,
    Cname,
    Name,
    Email,
    Phone,
    Loc,
    Tool,
    Note,
    Priv,
    Unsupported(u8),
}

impl From<u8> for SdesType {
    fn from(b: u8) -> Self {
        match b {
            0 => SdesType::End,
            1 => SdesType::Cname,
            2 => SdesType::Name,
            3 => SdesType::Email,
            4 => SdesType::Phone,
            5 => SdesType::Loc,
            6 => SdesType::Tool,
            7 => SdesType::Note,
            8 => SdesType::Priv,
            other => SdesType::Unsupported(other),
        }
    }
}

impl From<SdesType> for u8 {
    fn from(t: SdesType) -> u8 {
        match t {
            SdesType::End => 0,
            SdesType::Cname => 1,
            SdesType::Name => 2,
            SdesType::Email => 3,
            SdesType::Phone => 4,
            SdesType::Loc => 5,
            SdesType::Tool => 6,
            SdesType::Note => 7,
            SdesType::Priv => 8,
            SdesType::Unsupported(b) => b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesItem {
    pub sdes_type: SdesType,
    pub text: bytes::Bytes,
}

impl SdesItem {
    fn marshal_size(&self) -> usize {
        SDES_TYPE_LENGTH + self.text.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdesChunk {
    pub source: u32,
    pub items: Vec<SdesItem>,
}

impl SdesChunk {
    fn marshal_size(&self) -> usize {
        let items_len: usize = self.items.iter().map(SdesItem::marshal_size).sum();
        let raw = SDES_SOURCE_LENGTH + items_len + 1; // +1 for the null terminator
        raw + get_chunk_padding(raw)
    }
}

fn get_chunk_padding(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDescription {
    pub chunks: Vec<SdesChunk>,
}

impl MarshalSize for SourceDescription {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.chunks.iter().map(SdesChunk::marshal_size).sum::<usize>()
    }
}

impl Marshal for SourceDescription {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if self.chunks.len() > SDES_MAX_SOURCES {
            return Err(Error::TooManySources);
        }
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::BufferTooShort);
        }
        let words = size / 4 - 1;
        let header = Header {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type_raw: PacketType::SourceDescription.into(),
            length: words as u16,
        };
        let mut n = header.marshal_to(buf)?;
        for chunk in &self.chunks {
            let start = n;
            (&mut buf[n..]).put_u32(chunk.source);
            n += SDES_SOURCE_LENGTH;
            for item in &chunk.items {
                if item.text.len() > SDES_OCTET_COUNT_MAX {
                    return Err(Error::SdesTextTooLong);
                }
                buf[n] = item.sdes_type.into();
                buf[n + 1] = item.text.len() as u8;
                n += SDES_TYPE_LENGTH;
                buf[n..n + item.text.len()].copy_from_slice(&item.text);
                n += item.text.len();
            }
            buf[n] = 0; // END item
            n += 1;
            let written = n - start;
            let pad = get_chunk_padding(written);
            for b in &mut buf[n..n + pad] {
                *b = 0;
            }
            n += pad;
        }
        Ok(n)
    }
}

impl Unmarshal for SourceDescription {
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(raw)?;
        if header.packet_type() != PacketType::SourceDescription {
            return Err(Error::WrongType);
        }
        let mut body = &raw[HEADER_LENGTH..];
        let mut chunks = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            if body.len() < SDES_SOURCE_LENGTH {
                return Err(Error::PacketTooShort);
            }
            let start_len = body.len();
            let source = body.get_u32();
            let mut items = Vec::new();
            loop {
                if body.is_empty() {
                    return Err(Error::PacketTooShort);
                }
                let sdes_type = SdesType::from(body.get_u8());
                if sdes_type == SdesType::End {
                    break;
                }
                if body.is_empty() {
                    return Err(Error::PacketTooShort);
                }
                let len = body.get_u8() as usize;
                if body.len() < len {
                    return Err(Error::PacketTooShort);
                }
                let text = bytes::Bytes::copy_from_slice(&body[..len]);
                body.advance(len);
                items.push(SdesItem { sdes_type, text });
            }
            let consumed = start_len - body.len();
            let pad = get_chunk_padding(consumed);
            if body.len() < pad {
                return Err(Error::PacketTooShort);
            }
            body.advance(pad);
            chunks.push(SdesChunk { source, items });
        }
        Ok(SourceDescription { chunks })
    }
}

impl Packet for SourceDescription {
    fn header(&self) -> Header {
        let words = self.marshal_size() / 4 - 1;
        Header {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type_raw: PacketType::SourceDescription.into(),
            length: words as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.chunks.iter().map(|c| c.source).collect()
    }
}

#[cfg(test)]
mod source_description_test {
    use super::*;

    #[test]
    fn roundtrips_cname_chunk() {
        let sdes = SourceDescription {
            chunks: vec![SdesChunk {
                source: 1,
                items: vec![SdesItem {
                    sdes_type: SdesType::Cname,
                    text: bytes::Bytes::from_static(b"receiver@host"),
                }],
            }],
        };
        let raw = sdes.marshal().unwrap();
        assert_eq!(raw.len() % 4, 0);
        let got = SourceDescription::unmarshal(&raw).unwrap();
        assert_eq!(sdes, got);
    }

    #[test]
    fn roundtrips_multiple_chunks() {
        let sdes = SourceDescription {
            chunks: vec![
                SdesChunk {
                    source: 1,
                    items: vec![SdesItem {
                        sdes_type: SdesType::Cname,
                        text: bytes::Bytes::from_static(b"a"),
                    }],
                },
                SdesChunk {
                    source: 2,
                    items: vec![SdesItem {
                        sdes_type: SdesType::Cname,
                        text: bytes::Bytes::from_static(b"bb"),
                    }],
                },
            ],
        };
        let raw = sdes.marshal().unwrap();
        let got = SourceDescription::unmarshal(&raw).unwrap();
        assert_eq!(sdes, got);
    }
}
