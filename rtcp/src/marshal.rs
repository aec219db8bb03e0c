//! Minimal stand-ins for the teacher's `util::marshal` traits, reimplemented
//! locally on top of `bytes` so this crate does not depend on `util`.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::header::Header;

pub trait MarshalSize {
    fn marshal_size(&self) -> usize;
}

pub trait Marshal: MarshalSize {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize>;

    fn marshal(&self) -> Result<bytes::Bytes> {
        let mut buf = vec![0u8; self.marshal_size()];
        let n = self.marshal_to(&mut buf)?;
        buf.truncate(n);
        Ok(buf.into())
    }
}

pub trait Unmarshal: Sized {
    fn unmarshal(raw: &[u8]) -> Result<Self>;
}

/// Packets that can appear inside an RTCP compound packet.
pub trait Packet: Marshal + std::fmt::Debug {
    fn header(&self) -> Header;
    fn destination_ssrc(&self) -> Vec<u32>;
}

pub(crate) fn require(buf: &[u8], n: usize) -> Result<()> {
    if buf.len() < n {
        Err(Error::PacketTooShort)
    } else {
        Ok(())
    }
}

pub(crate) fn get_padding(payload_len: usize) -> usize {
    if payload_len % 4 == 0 {
        0
    } else {
        4 - (payload_len % 4)
    }
}

pub(crate) fn put_u24(buf: &mut impl BufMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

pub(crate) fn get_u24(buf: &mut impl Buf) -> u32 {
    let a = buf.get_u8() as u32;
    let b = buf.get_u8() as u32;
    let c = buf.get_u8() as u32;
    (a << 16) | (b << 8) | c
}
