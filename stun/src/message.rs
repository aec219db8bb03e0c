//! STUN message codec (RFC 3489bis / RFC 5389 wire format): 20-byte header,
//! magic cookie, 96-bit transaction id, TLV attributes padded to 4 bytes.
//! Only the pieces this receiver needs are modeled: Binding request/response
//! and the mapped-address family of attributes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const HEADER_LEN: usize = 20;
pub const TRANSACTION_ID_LEN: usize = 12;

/// STUN message class, encoded across two non-adjacent bits of the type
/// field per RFC 5389 §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

/// The only method this stack speaks. TURN/ICE methods are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Binding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType {
    pub class: Class,
    pub method: Method,
}

impl MessageType {
    pub fn binding_request() -> Self {
        MessageType {
            class: Class::Request,
            method: Method::Binding,
        }
    }

    pub fn binding_success() -> Self {
        MessageType {
            class: Class::SuccessResponse,
            method: Method::Binding,
        }
    }

    fn encode(self) -> u16 {
        let method: u16 = match self.method {
            Method::Binding => 0x001,
        };
        let (c1, c0): (u16, u16) = match self.class {
            Class::Request => (0, 0),
            Class::Indication => (0, 1),
            Class::SuccessResponse => (1, 0),
            Class::ErrorResponse => (1, 1),
        };
        // RFC 5389 §6: method split around the two class bits.
        let m = method & 0b1111_1111_1111;
        ((m & 0b1111_1110_0000) << 2) | (c1 << 8) | ((m & 0b0000_0001_1100) << 1) | (c0 << 4) | (m & 0b0000_0000_0011)
    }

    fn decode(raw: u16) -> Result<Self> {
        let c0 = (raw >> 4) & 0x1;
        let c1 = (raw >> 8) & 0x1;
        let class = match (c1, c0) {
            (0, 0) => Class::Request,
            (0, 1) => Class::Indication,
            (1, 0) => Class::SuccessResponse,
            (1, 1) => Class::ErrorResponse,
            _ => unreachable!(),
        };
        let m = ((raw >> 2) & 0b1111_1110_0000) | ((raw >> 1) & 0b0000_0001_1100) | (raw & 0b0000_0000_0011);
        let method = match m {
            0x001 => Method::Binding,
            _ => Method::Binding, // only Binding is speakable; preserve class for error reporting
        };
        Ok(MessageType { class, method })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_LEN]);

impl TransactionId {
    pub fn random() -> Self {
        let mut id = [0u8; TRANSACTION_ID_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut id);
        TransactionId(id)
    }
}

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const FAMILY_IPV4: u16 = 0x01;
const FAMILY_IPV6: u16 = 0x02;

/// The one attribute family this stack reads and writes: a responder's view
/// of the requester's public address, plain or XOR-obfuscated per RFC 5389.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddress {
    pub addr: SocketAddr,
    pub xor: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub typ: Option<MessageType>,
    pub transaction_id: TransactionId,
    pub mapped_address: Option<MappedAddress>,
    /// Attributes this stack does not interpret, preserved so a response can
    /// be re-marshaled without dropping unrecognized data.
    pub other_attributes: Vec<(u16, Bytes)>,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::binding_request()
    }
}

impl Message {
    pub fn binding_request(transaction_id: TransactionId) -> Self {
        Message {
            typ: Some(MessageType::binding_request()),
            transaction_id,
            mapped_address: None,
            other_attributes: Vec::new(),
        }
    }

    pub fn binding_success(transaction_id: TransactionId, mapped: SocketAddr) -> Self {
        Message {
            typ: Some(MessageType::binding_success()),
            transaction_id,
            mapped_address: Some(MappedAddress { addr: mapped, xor: true }),
            other_attributes: Vec::new(),
        }
    }

    pub fn is_message(b: &[u8]) -> bool {
        b.len() >= HEADER_LEN && u32::from_be_bytes([b[4], b[5], b[6], b[7]]) == MAGIC_COOKIE
    }

    pub fn marshal(&self) -> Bytes {
        let mut body = BytesMut::new();
        if let Some(m) = &self.mapped_address {
            encode_mapped_address(&mut body, m, &self.transaction_id);
        }
        for (attr_type, value) in &self.other_attributes {
            put_attr_header(&mut body, *attr_type, value.len());
            body.put_slice(value);
            pad_to_4(&mut body, value.len());
        }

        let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
        out.put_u16(self.typ.unwrap_or_default().encode());
        out.put_u16(body.len() as u16);
        out.put_u32(MAGIC_COOKIE);
        out.put_slice(&self.transaction_id.0);
        out.put_slice(&body);
        out.freeze()
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(Error::Runt);
        }
        let mut buf = raw;
        let typ_raw = buf.get_u16();
        let length = buf.get_u16() as usize;
        let cookie = buf.get_u32();
        if cookie != MAGIC_COOKIE {
            return Err(Error::BadMagicCookie(cookie));
        }
        let mut tid = [0u8; TRANSACTION_ID_LEN];
        tid.copy_from_slice(&buf[..TRANSACTION_ID_LEN]);
        buf.advance(TRANSACTION_ID_LEN);

        if buf.remaining() != length {
            return Err(Error::LengthMismatch {
                declared: length,
                actual: buf.remaining(),
            });
        }

        let typ = MessageType::decode(typ_raw)?;
        let mut msg = Message {
            typ: Some(typ),
            transaction_id: TransactionId(tid),
            mapped_address: None,
            other_attributes: Vec::new(),
        };

        let mut consumed = 0usize;
        while buf.remaining() >= 4 {
            let attr_type = buf.get_u16();
            let attr_len = buf.get_u16() as usize;
            if buf.remaining() < attr_len {
                return Err(Error::AttributeOverrun(consumed));
            }
            let value = Bytes::copy_from_slice(&buf[..attr_len]);
            buf.advance(attr_len);
            let padding = (4 - (attr_len % 4)) % 4;
            if buf.remaining() < padding {
                return Err(Error::AttributeOverrun(consumed));
            }
            buf.advance(padding);
            consumed += 4 + attr_len + padding;

            match attr_type {
                ATTR_MAPPED_ADDRESS => {
                    msg.mapped_address = Some(MappedAddress {
                        addr: decode_address(&value, false, &msg.transaction_id)?,
                        xor: false,
                    });
                }
                ATTR_XOR_MAPPED_ADDRESS => {
                    msg.mapped_address = Some(MappedAddress {
                        addr: decode_address(&value, true, &msg.transaction_id)?,
                        xor: true,
                    });
                }
                other => msg.other_attributes.push((other, value)),
            }
        }

        Ok(msg)
    }
}

fn put_attr_header(buf: &mut BytesMut, attr_type: u16, value_len: usize) {
    buf.put_u16(attr_type);
    buf.put_u16(value_len as u16);
}

fn pad_to_4(buf: &mut BytesMut, unpadded_len: usize) {
    let padding = (4 - (unpadded_len % 4)) % 4;
    for _ in 0..padding {
        buf.put_u8(0);
    }
}

fn encode_mapped_address(buf: &mut BytesMut, mapped: &MappedAddress, tid: &TransactionId) {
    let family = match mapped.addr {
        SocketAddr::V4(_) => FAMILY_IPV4,
        SocketAddr::V6(_) => FAMILY_IPV6,
    };
    let ip_bytes = match mapped.addr.ip() {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    let port = mapped.addr.port();

    let (port, ip_bytes) = if mapped.xor {
        xor_address(port, &ip_bytes, tid)
    } else {
        (port, ip_bytes)
    };

    let value_len = 4 + ip_bytes.len();
    let attr_type = if mapped.xor { ATTR_XOR_MAPPED_ADDRESS } else { ATTR_MAPPED_ADDRESS };
    put_attr_header(buf, attr_type, value_len);
    buf.put_u8(0);
    buf.put_u8(family as u8);
    buf.put_u16(port);
    buf.put_slice(&ip_bytes);
    pad_to_4(buf, value_len);
}

fn decode_address(value: &[u8], xor: bool, tid: &TransactionId) -> Result<SocketAddr> {
    if value.len() < 4 {
        return Err(Error::Runt);
    }
    let family = value[1] as u16;
    let port_raw = u16::from_be_bytes([value[2], value[3]]);
    let ip_raw = &value[4..];

    let (port, ip_bytes) = if xor {
        xor_address(port_raw, ip_raw, tid)
    } else {
        (port_raw, ip_raw.to_vec())
    };

    let ip = match family {
        FAMILY_IPV4 => {
            if ip_bytes.len() < 4 {
                return Err(Error::Runt);
            }
            IpAddr::V4(Ipv4Addr::new(ip_bytes[0], ip_bytes[1], ip_bytes[2], ip_bytes[3]))
        }
        FAMILY_IPV6 => {
            if ip_bytes.len() < 16 {
                return Err(Error::Runt);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&ip_bytes[..16]);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        other => return Err(Error::UnknownAddressFamily(other)),
    };
    Ok(SocketAddr::new(ip, port))
}

/// RFC 5389 §15.2: XOR the port against the top 16 bits of the magic cookie
/// and the address against the cookie followed by the transaction id.
fn xor_address(port: u16, ip: &[u8], tid: &TransactionId) -> (u16, Vec<u8>) {
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let xored_port = port ^ ((MAGIC_COOKIE >> 16) as u16);

    let mut pad = Vec::with_capacity(16);
    pad.extend_from_slice(&cookie);
    pad.extend_from_slice(&tid.0);

    let mut xored_ip = vec![0u8; ip.len()];
    for i in 0..ip.len() {
        xored_ip[i] = ip[i] ^ pad[i % pad.len().max(1)];
    }
    (xored_port, xored_ip)
}

#[cfg(test)]
mod message_test {
    use super::*;

    #[test]
    fn binding_request_roundtrips() {
        let tid = TransactionId::random();
        let msg = Message::binding_request(tid);
        let raw = msg.marshal();
        let parsed = Message::unmarshal(&raw).unwrap();
        assert_eq!(parsed.transaction_id, tid);
        assert_eq!(parsed.typ.unwrap().class, Class::Request);
    }

    #[test]
    fn xor_mapped_address_roundtrips_v4() {
        let tid = TransactionId::random();
        let addr: SocketAddr = "203.0.113.5:5004".parse().unwrap();
        let msg = Message::binding_success(tid, addr);
        let raw = msg.marshal();
        let parsed = Message::unmarshal(&raw).unwrap();
        assert_eq!(parsed.mapped_address.unwrap().addr, addr);
    }

    #[test]
    fn rejects_bad_magic_cookie() {
        let tid = TransactionId::random();
        let mut raw = Message::binding_request(tid).marshal().to_vec();
        raw[4] = 0;
        assert!(matches!(Message::unmarshal(&raw), Err(Error::BadMagicCookie(_))));
    }

    #[test]
    fn is_message_rejects_short_buffers() {
        assert!(!Message::is_message(&[0u8; 4]));
    }
}
