//! Four time kinds used throughout the receiver: absolute wall time,
//! relative intervals, NTP timestamps, and 90kHz PCR/RTP media timestamps.
//!
//! Conversions between kinds are explicit; arithmetic is closed within a
//! kind (`AbsTime - AbsTime -> RelTime`, `AbsTime + RelTime -> AbsTime`,
//! `RelTime +/- RelTime -> RelTime`, `RelTime * i64 -> RelTime` with
//! saturation). Nothing here implicitly mixes kinds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Absolute wall-clock time, microsecond resolution, signed 64-bit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsTime(i64);

/// Relative (signed) interval, microsecond resolution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelTime(i64);

/// NTP timestamp, 32.32 fixed point: high 32 bits are seconds since the NTP
/// epoch (1900-01-01), low 32 bits are a binary fraction of a second.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NtpTime(u64);

/// PCR / RTP media timestamp: 32 bits, 90kHz, modular. The MPEG-TS PCR is
/// technically 33 bits; only the low 32 bits (the part that repeats at the
/// same rate as an RTP timestamp) are tracked here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pcr32Time(u32);

const USECS_PER_SEC: i64 = 1_000_000;
const NTP_EPOCH_OFFSET_SECS: i64 = 2_208_988_800; // 1900-01-01 -> 1970-01-01
const PCR_HZ: i64 = 90_000;

impl AbsTime {
    pub const ZERO: AbsTime = AbsTime(0);

    pub fn from_micros(micros: i64) -> Self {
        AbsTime(micros)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn as_millis(self) -> i64 {
        self.0 / 1_000
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Current system time, per `get_sys_time()` in the original NLL.
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        AbsTime(dur.as_micros() as i64)
    }

    /// `abs - abs -> rel`, saturating on overflow.
    pub fn checked_sub(self, other: AbsTime) -> RelTime {
        RelTime(self.0.saturating_sub(other.0))
    }

    /// `abs + rel -> abs`, saturating on overflow.
    pub fn checked_add_rel(self, delta: RelTime) -> AbsTime {
        AbsTime(self.0.saturating_add(delta.0))
    }
}

impl std::ops::Sub for AbsTime {
    type Output = RelTime;
    fn sub(self, rhs: AbsTime) -> RelTime {
        self.checked_sub(rhs)
    }
}

impl std::ops::Add<RelTime> for AbsTime {
    type Output = AbsTime;
    fn add(self, rhs: RelTime) -> AbsTime {
        self.checked_add_rel(rhs)
    }
}

impl RelTime {
    pub const ZERO: RelTime = RelTime(0);

    pub fn from_micros(micros: i64) -> Self {
        RelTime(micros)
    }

    pub fn from_millis(millis: i64) -> Self {
        RelTime(millis.saturating_mul(1_000))
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn as_millis(self) -> i64 {
        self.0 / 1_000
    }

    pub fn abs(self) -> RelTime {
        RelTime(self.0.saturating_abs())
    }

    pub fn neg(self) -> RelTime {
        RelTime(self.0.saturating_neg())
    }

    /// `rel * int -> rel`, saturating on overflow rather than panicking or
    /// wrapping (this loop runs per-packet; a saturated correction is
    /// recoverable, a panicked receiver is not).
    pub fn checked_mul(self, rhs: i64) -> RelTime {
        RelTime(self.0.saturating_mul(rhs))
    }

    /// Arithmetic right shift used to fuse the moving-average decay and the
    /// slew-rate division into a single integer operation (see `nll.rs`).
    pub fn checked_shr(self, bits: u32) -> RelTime {
        RelTime(self.0 >> bits)
    }

    /// The closest-of-two-deltas modular distance between two 32-bit PCR
    /// values, expressed as a relative time in microseconds. Must use
    /// unsigned wrapping subtraction per spec; a signed comparison of the
    /// wrapped difference is not safe.
    pub fn from_pcr_delta(base: Pcr32Time, cur: Pcr32Time) -> RelTime {
        let d1 = cur.0.wrapping_sub(base.0);
        let d2 = base.0.wrapping_sub(cur.0);
        let ticks: i64 = if d1 <= d2 { d1 as i64 } else { -(d2 as i64) };
        RelTime::from_pcr_ticks(ticks)
    }

    fn from_pcr_ticks(ticks: i64) -> RelTime {
        // ticks * (1_000_000 / 90_000) done in integer math as ticks*100/9.
        RelTime((ticks * 100) / 9)
    }
}

impl std::ops::Add for RelTime {
    type Output = RelTime;
    fn add(self, rhs: RelTime) -> RelTime {
        RelTime(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for RelTime {
    type Output = RelTime;
    fn sub(self, rhs: RelTime) -> RelTime {
        RelTime(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::Neg for RelTime {
    type Output = RelTime;
    fn neg(self) -> RelTime {
        RelTime(self.0.saturating_neg())
    }
}

impl NtpTime {
    pub fn from_raw(raw: u64) -> Self {
        NtpTime(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn from_abs(abs: AbsTime) -> Self {
        let micros = abs.as_micros().max(0) as u64;
        let secs = (micros / 1_000_000) as u32;
        let frac_micros = micros % 1_000_000;
        // frac (32 bits) = frac_micros / 1e6 * 2^32
        let frac = ((frac_micros << 32) / 1_000_000) as u32;
        NtpTime(((secs as u64 + NTP_EPOCH_OFFSET_SECS as u64) << 32) | frac as u64)
    }

    pub fn to_abs(self) -> AbsTime {
        let secs = (self.0 >> 32) as i64 - NTP_EPOCH_OFFSET_SECS;
        let frac = (self.0 & 0xFFFF_FFFF) as u64;
        let frac_micros = (frac * 1_000_000) >> 32;
        AbsTime(secs.saturating_mul(USECS_PER_SEC) + frac_micros as i64)
    }
}

impl Pcr32Time {
    pub fn from_raw(raw: u32) -> Self {
        Pcr32Time(raw)
    }

    pub fn as_raw(self) -> u32 {
        self.0
    }

    pub fn wrapping_add_ticks(self, ticks: i64) -> Pcr32Time {
        Pcr32Time(self.0.wrapping_add(ticks as u32))
    }
}

#[allow(dead_code)]
pub(crate) const PCR_HZ_CONST: i64 = PCR_HZ;

#[cfg(test)]
mod time_test {
    use super::*;

    #[test]
    fn abs_sub_gives_rel() {
        let a = AbsTime::from_micros(5_000_000);
        let b = AbsTime::from_micros(2_000_000);
        assert_eq!((a - b).as_micros(), 3_000_000);
        assert_eq!((b - a).as_micros(), -3_000_000);
    }

    #[test]
    fn abs_add_rel_round_trips() {
        let a = AbsTime::from_micros(1_000);
        let d = RelTime::from_micros(500);
        assert_eq!((a + d).as_micros(), 1_500);
    }

    #[test]
    fn rel_mul_saturates_instead_of_overflow() {
        let r = RelTime::from_micros(i64::MAX / 2);
        let out = r.checked_mul(4);
        assert_eq!(out.as_micros(), i64::MAX);
    }

    #[test]
    fn pcr_delta_picks_smaller_magnitude_forward() {
        let base = Pcr32Time::from_raw(0);
        let cur = Pcr32Time::from_raw(9_100_000); // ~101ms at 90kHz
        let d = RelTime::from_pcr_delta(base, cur);
        assert!(d.as_millis() > 100);
    }

    #[test]
    fn pcr_delta_picks_smaller_magnitude_backward() {
        // cur is "behind" base by a small amount, expressed via wraparound
        // the unsigned distance backward is smaller than forward.
        let base = Pcr32Time::from_raw(1000);
        let cur = Pcr32Time::from_raw(900);
        let d = RelTime::from_pcr_delta(base, cur);
        assert!(d.as_micros() < 0);
    }

    #[test]
    fn ntp_round_trips_through_abs() {
        let a = AbsTime::from_micros(1_700_000_000_000_000);
        let ntp = NtpTime::from_abs(a);
        let back = ntp.to_abs();
        // sub-microsecond rounding in the 32.32 fraction is expected.
        assert!((back.as_micros() - a.as_micros()).abs() < 2);
    }
}
