//! Member table: one entry per SSRC this session has heard from, keyed for
//! O(1) lookup on the hot per-packet path. Collision/loop handling follows
//! RFC 3550 Appendix A.4's model of comparing a packet's `(SSRC, source
//! address)` pair against the table, generalized here to the cases that
//! matter for a pure receiver (we never need to pick a new SSRC for
//! ourselves, so the "own SSRC collided" branches collapse to a single
//! rejection instead of the sender-side renegotiation the appendix
//! describes).

use std::collections::HashMap;
use std::net::SocketAddr;

use clock::AbsTime;
use rtp::SourceState;

/// Outcome of feeding one packet's `(ssrc, source address)` through the
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// First packet from this SSRC; a new entry was created.
    New,
    /// SSRC and address both matched an existing entry.
    Ok,
    /// The SSRC is known but this packet arrived from a different source
    /// address than the entry's original one. Per RFC 3550 Appendix A.4
    /// this is the "new SSRC/CSRC" and "identified as a third-party loop"
    /// family of cases collapsed into one: the table is updated to the new
    /// address (a receiver can't usefully refuse to hear a re-homed
    /// sender), but the caller should log a collision.
    SourceAddressChanged,
    /// The SSRC collides with this session's own identifying SSRC. A pure
    /// receiver has no sending SSRC to renegotiate away from, so the
    /// packet is rejected outright rather than triggering collision
    /// resolution.
    CollidesWithLocalSsrc,
}

/// Running mean/standard-deviation accumulator over a member's jitter
/// samples, drained once per reporting interval. Grounded on
/// `rtcp_xr.c`'s `rtcp_xr_get_mean_jitter`/`rtcp_xr_get_std_dev_jitter`,
/// restated as a single-pass accumulator instead of the original's
/// stored-sample-array approach.
#[derive(Debug, Clone, Copy, Default)]
pub struct JitterStats {
    count: u32,
    sum: u64,
    sum_sq: u64,
}

impl JitterStats {
    pub fn sample(&mut self, jitter: u32) {
        self.count += 1;
        self.sum += jitter as u64;
        self.sum_sq += (jitter as u64) * (jitter as u64);
    }

    /// Returns `(mean, population std-dev)` over the samples seen since the
    /// last call, and resets the accumulator. `(0, 0)` if no samples arrived.
    pub fn take_summary(&mut self) -> (u32, u32) {
        if self.count == 0 {
            return (0, 0);
        }
        let n = self.count as f64;
        let mean = self.sum as f64 / n;
        let variance = (self.sum_sq as f64 / n - mean * mean).max(0.0);
        *self = JitterStats::default();
        (mean.round() as u32, variance.sqrt().round() as u32)
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub ssrc: u32,
    pub source_addr: SocketAddr,
    pub cname: Option<bytes::Bytes>,
    pub rtp: SourceState,
    pub last_rtp_arrival: AbsTime,
    pub last_rtcp_arrival: AbsTime,
    /// RFC 3550 §8.2 validation counter: a member is not "valid" (eligible
    /// to be counted or reported on) until this reaches zero.
    pub probation: i32,
    pub is_sender: bool,
    pub received_bye: bool,
    pub jitter_stats: JitterStats,
    /// Last GAPSB `group_size` this member reported via an RSI subreport
    /// (RFC 5760 §4.2-style), used to back out its prior contribution to
    /// `SessionBase::nmembers_learned` before folding in the new one.
    pub rtcp_nmembers_reported: u32,
    /// Last GAPSB `average_packet_size` this member reported.
    pub rtcp_avg_size_reported: u16,
}

impl Member {
    fn new(ssrc: u32, source_addr: SocketAddr, probation: i32) -> Self {
        Member {
            ssrc,
            source_addr,
            cname: None,
            rtp: SourceState::new(),
            last_rtp_arrival: AbsTime::ZERO,
            last_rtcp_arrival: AbsTime::ZERO,
            probation,
            is_sender: false,
            received_bye: false,
            jitter_stats: JitterStats::default(),
            rtcp_nmembers_reported: 0,
            rtcp_avg_size_reported: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.probation <= 0
    }
}

#[derive(Debug)]
pub struct MemberTable {
    members: HashMap<u32, Member>,
    local_ssrc: u32,
    capacity: usize,
    /// Number of RTP packets a new source must be seen on before it is
    /// promoted out of probation (RFC 3550 §8.2's `MIN_SEQUENTIAL`).
    initial_probation: i32,
}

impl MemberTable {
    pub fn new(local_ssrc: u32, capacity: usize, initial_probation: i32) -> Self {
        MemberTable {
            members: HashMap::with_capacity(capacity.min(256)),
            local_ssrc,
            capacity,
            initial_probation,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, ssrc: u32) -> Option<&Member> {
        self.members.get(&ssrc)
    }

    pub fn get_mut(&mut self, ssrc: u32) -> Option<&mut Member> {
        self.members.get_mut(&ssrc)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Member> {
        self.members.values_mut()
    }

    pub fn remove(&mut self, ssrc: u32) -> Option<Member> {
        self.members.remove(&ssrc)
    }

    /// Resolves a `(ssrc, source_addr)` pair against the table, inserting a
    /// new probationary entry when the SSRC is unseen. Returns the
    /// resulting member's SSRC alongside the conflict classification so
    /// the caller can decide whether to still process the packet.
    pub fn resolve(&mut self, ssrc: u32, source_addr: SocketAddr) -> (Conflict, Option<u32>) {
        if ssrc == self.local_ssrc {
            return (Conflict::CollidesWithLocalSsrc, None);
        }

        if let Some(existing) = self.members.get_mut(&ssrc) {
            if existing.source_addr == source_addr {
                return (Conflict::Ok, Some(ssrc));
            }
            existing.source_addr = source_addr;
            return (Conflict::SourceAddressChanged, Some(ssrc));
        }

        if self.members.len() >= self.capacity {
            // Table full: treat as a silent drop rather than growing
            // unboundedly. The caller is expected to have already logged
            // table pressure before this point.
            return (Conflict::CollidesWithLocalSsrc, None);
        }

        self.members
            .insert(ssrc, Member::new(ssrc, source_addr, self.initial_probation));
        (Conflict::New, Some(ssrc))
    }

    /// Decrements probation for a member that has just received another
    /// sequential RTP packet (RFC 3550 §8.2). Returns `true` the instant
    /// the member becomes valid.
    pub fn tick_probation(&mut self, ssrc: u32) -> bool {
        if let Some(m) = self.members.get_mut(&ssrc) {
            if m.probation > 0 {
                m.probation -= 1;
                return m.probation == 0;
            }
        }
        false
    }

    pub fn valid_count(&self) -> usize {
        self.members.values().filter(|m| m.is_valid()).count()
    }
}

#[cfg(test)]
mod member_test {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn first_packet_creates_probationary_entry() {
        let mut t = MemberTable::new(0xAAAA, 8, 2);
        let (c, ssrc) = t.resolve(1, addr(1000));
        assert_eq!(c, Conflict::New);
        assert_eq!(ssrc, Some(1));
        assert!(!t.get(1).unwrap().is_valid());
    }

    #[test]
    fn probation_clears_after_min_sequential() {
        let mut t = MemberTable::new(0xAAAA, 8, 2);
        t.resolve(1, addr(1000));
        assert!(!t.tick_probation(1));
        assert!(t.tick_probation(1));
        assert!(t.get(1).unwrap().is_valid());
    }

    #[test]
    fn rejects_ssrc_colliding_with_local() {
        let mut t = MemberTable::new(0xAAAA, 8, 2);
        let (c, ssrc) = t.resolve(0xAAAA, addr(1000));
        assert_eq!(c, Conflict::CollidesWithLocalSsrc);
        assert_eq!(ssrc, None);
    }

    #[test]
    fn source_address_change_is_flagged_but_updated() {
        let mut t = MemberTable::new(0xAAAA, 8, 2);
        t.resolve(1, addr(1000));
        let (c, ssrc) = t.resolve(1, addr(2000));
        assert_eq!(c, Conflict::SourceAddressChanged);
        assert_eq!(ssrc, Some(1));
        assert_eq!(t.get(1).unwrap().source_addr, addr(2000));
    }

    #[test]
    fn table_full_drops_new_ssrc() {
        let mut t = MemberTable::new(0xAAAA, 1, 0);
        t.resolve(1, addr(1000));
        let (c, ssrc) = t.resolve(2, addr(2000));
        assert_eq!(ssrc, None);
        assert_eq!(t.len(), 1);
        let _ = c;
    }
}
