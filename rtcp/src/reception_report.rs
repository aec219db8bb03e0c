//! Reception report block (RFC 3550 §6.4.1), shared by SR and RR packets.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::marshal::{get_u24, put_u24, Marshal, MarshalSize, Unmarshal};

pub const RECEPTION_REPORT_LENGTH: usize = 24;
const MAX_TOTAL_LOST: u32 = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceptionReport {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub total_lost: u32,
    pub last_sequence_number: u32,
    pub jitter: u32,
    pub last_sender_report: u32,
    pub delay: u32,
}

impl MarshalSize for ReceptionReport {
    fn marshal_size(&self) -> usize {
        RECEPTION_REPORT_LENGTH
    }
}

impl Marshal for ReceptionReport {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < RECEPTION_REPORT_LENGTH {
            return Err(Error::BufferTooShort);
        }
        if self.total_lost >= MAX_TOTAL_LOST {
            return Err(Error::InvalidTotalLost);
        }
        let mut b = &mut buf[..RECEPTION_REPORT_LENGTH];
        b.put_u32(self.ssrc);
        b.put_u8(self.fraction_lost);
        put_u24(&mut b, self.total_lost);
        b.put_u32(self.last_sequence_number);
        b.put_u32(self.jitter);
        b.put_u32(self.last_sender_report);
        b.put_u32(self.delay);
        Ok(RECEPTION_REPORT_LENGTH)
    }
}

impl Unmarshal for ReceptionReport {
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < RECEPTION_REPORT_LENGTH {
            return Err(Error::PacketTooShort);
        }
        let mut b = &raw[..RECEPTION_REPORT_LENGTH];
        let ssrc = b.get_u32();
        let fraction_lost = b.get_u8();
        let total_lost = get_u24(&mut b);
        let last_sequence_number = b.get_u32();
        let jitter = b.get_u32();
        let last_sender_report = b.get_u32();
        let delay = b.get_u32();
        Ok(ReceptionReport {
            ssrc,
            fraction_lost,
            total_lost,
            last_sequence_number,
            jitter,
            last_sender_report,
            delay,
        })
    }
}

#[cfg(test)]
mod reception_report_test {
    use super::*;

    #[test]
    fn roundtrips() {
        let r = ReceptionReport {
            ssrc: 1,
            fraction_lost: 2,
            total_lost: 3,
            last_sequence_number: 4,
            jitter: 5,
            last_sender_report: 6,
            delay: 7,
        };
        let raw = r.marshal().unwrap();
        assert_eq!(ReceptionReport::unmarshal(&raw).unwrap(), r);
    }

    #[test]
    fn rejects_total_lost_overflow() {
        let r = ReceptionReport {
            total_lost: MAX_TOTAL_LOST,
            ..Default::default()
        };
        let mut buf = [0u8; RECEPTION_REPORT_LENGTH];
        assert_eq!(r.marshal_to(&mut buf), Err(Error::InvalidTotalLost));
    }
}
