//! RTCP bandwidth apportionment and reporting-interval calculation (RFC
//! 3550 §6.2/6.3, RFC 3556), grounded on `rtcp_bandwidth.c`. This stack is
//! a pure receiver, so `we_sent` is almost always false; the sender share
//! exists only so the interval stays correct in a mixed ASM session where
//! other participants are sending.
//!
//! [`BandwidthInfo::from_cfg`] applies RFC 3556's `b=RS`/`b=RR`/`b=AS`
//! precedence (ported from `rtcp_set_bw_info`/`rtcp_set_role_bw_info`) to
//! derive each role's total apportioned bandwidth once per session. Every
//! reporting interval then calls [`reporting_interval`], which is
//! `rtcp_get_intvl_calc_params` + `rtcp_td_interval` + `rtcp_jitter_interval`
//! folded into one pass: it picks either the normal members/senders split
//! or, when a per-member bandwidth has been configured or reported to us
//! via an RSI BISB subreport, a single-member fast path that bypasses the
//! population apportionment entirely.

use clock::RelTime;

/// Minimum compound-packet interval floor for non-initial reports (RFC
/// 3550 §6.2), halved for the very first report a session sends.
pub const MIN_INTERVAL_MS: i64 = 5000;
const COMPENSATION_FACTOR: f64 = 1.21828; // e - 3/2, RFC 3550's jitter compensation constant
const DFLT_SENDER_BW_PCT: f64 = 0.25;
const DFLT_RECEIVER_BW_PCT: f64 = 0.75;
const DFLT_AVG_PKT_SIZE_BYTES: f64 = 100.0;
/// RTCP is allotted 5% of the session's total bandwidth (RFC 3556 default).
pub const RTCP_BANDWIDTH_FRACTION: f64 = 0.05;

/// Sentinel for "no bandwidth reported" (`rtcp_bandwidth.h`'s
/// `RTCP_BW_UNSPECIFIED`), used on the wire (e.g. a BISB subreport that
/// hasn't been filled in). Internal state instead uses `Option` so this
/// constant only matters at the marshal/unmarshal boundary.
pub const BANDWIDTH_UNSPECIFIED: u32 = 0xffff_ffff;
/// Largest bandwidth value this module will ever apportion; derived shares
/// are capped here (`RTCP_MAX_BW`).
pub const MAX_BANDWIDTH_BYTES_PER_SEC: f64 = 0xffff_fffe_u32 as f64;

/// Converts a 16:16 fixed-point bandwidth value (as carried on the wire in
/// an RSI BISB subreport) to bytes/sec. Ported from
/// `rtcp_bw_bi_to_dbps`/`rtcp_bw_dbps_to_bi`'s ÷65.536 fixed-point scaling.
pub fn bi_to_bytes_per_sec(bi: u32) -> f64 {
    bi as f64 / 65.536
}

pub fn bytes_per_sec_to_bi(bps: f64) -> u32 {
    (bps * 65.536).clamp(0.0, MAX_BANDWIDTH_BYTES_PER_SEC) as u32
}

/// Session-wide bandwidth configuration: RFC 3556's `b=RS`/`b=RR`/`b=AS`
/// session-description lines, plus an optional direct per-member share.
/// Mirrors `rtcp_bw_cfg_t`, with the kbps→bytes/sec conversion RFC 3556's
/// `b=AS` line implies already folded in at config-parsing time so every
/// field here is in the same bytes/sec unit the rest of this crate uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandwidthCfg {
    /// Explicit `b=RS` (sender RTCP bandwidth), bytes/sec.
    pub session_rs_bytes_per_sec: Option<f64>,
    /// Explicit `b=RR` (receiver RTCP bandwidth), bytes/sec.
    pub session_rr_bytes_per_sec: Option<f64>,
    /// `b=AS`, the overall session media bandwidth, bytes/sec.
    pub session_as_bytes_per_sec: Option<f64>,
    /// A configured per-member bandwidth share, bytes/sec, that bypasses
    /// the members/senders apportionment entirely when set.
    pub per_member_bytes_per_sec: Option<f64>,
}

/// One role's (sender or receiver) derived bandwidth state, mirroring
/// `rtcp_bw_role_t`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandwidthRole {
    /// This role's configured per-member share, bytes/sec.
    pub cfg_per_member_bw: Option<f64>,
    /// This role's per-member share as learned from an RSI BISB
    /// subreport, raw 16:16 fixed-point bytes/sec as carried on the wire.
    pub rpt_per_member_bw: Option<u32>,
    /// This role's total apportioned bandwidth, bytes/sec, capped to
    /// [`MAX_BANDWIDTH_BYTES_PER_SEC`].
    pub tot_role_bw: f64,
}

/// Both roles' derived bandwidth state, mirroring `rtcp_bw_info_t`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandwidthInfo {
    pub rcvr: BandwidthRole,
    pub sndr: BandwidthRole,
}

impl BandwidthInfo {
    /// Applies RFC 3556 precedence to derive `tot_role_bw` for both roles:
    /// an explicit `b=RS`/`b=RR` wins outright; otherwise the role's share
    /// comes out of `b=AS * RTCP_BANDWIDTH_FRACTION`, preferring to
    /// subtract the other role's explicit share over falling back to the
    /// 25%/75% default split. Ported from `rtcp_set_bw_info` and
    /// `rtcp_set_role_bw_info`.
    pub fn from_cfg(cfg: &BandwidthCfg) -> Self {
        let mut info = BandwidthInfo::default();
        info.sndr.cfg_per_member_bw = cfg.per_member_bytes_per_sec;
        info.rcvr.cfg_per_member_bw = cfg.per_member_bytes_per_sec;

        info.sndr.tot_role_bw = Self::role_bw(
            cfg.session_rs_bytes_per_sec,
            cfg.session_rr_bytes_per_sec,
            cfg.session_as_bytes_per_sec,
            DFLT_SENDER_BW_PCT,
        );
        info.rcvr.tot_role_bw = Self::role_bw(
            cfg.session_rr_bytes_per_sec,
            cfg.session_rs_bytes_per_sec,
            cfg.session_as_bytes_per_sec,
            DFLT_RECEIVER_BW_PCT,
        );

        info
    }

    fn role_bw(explicit: Option<f64>, other_explicit: Option<f64>, as_bw: Option<f64>, default_pct: f64) -> f64 {
        if let Some(v) = explicit {
            return v.min(MAX_BANDWIDTH_BYTES_PER_SEC);
        }
        let Some(as_bw) = as_bw else {
            return 0.0;
        };
        let tot_rtcp_bw = as_bw * RTCP_BANDWIDTH_FRACTION;
        let share = match other_explicit {
            Some(other) => (tot_rtcp_bw - other).max(0.0),
            None => tot_rtcp_bw * default_pct,
        };
        share.min(MAX_BANDWIDTH_BYTES_PER_SEC)
    }

    /// Records a BISB subreport's role bandwidth (RFC 5760 §4.2-style:
    /// `role` bit 0 = sender, bit 1 = receivers, either or both may be
    /// set). Ported from `rtcp_process_rsi`'s BISB handling.
    pub fn apply_reported_bandwidth(&mut self, role: u16, rtcp_bandwidth: u32) {
        const ROLE_SENDER: u16 = 0x1;
        const ROLE_RECEIVERS: u16 = 0x2;
        if role & ROLE_SENDER != 0 {
            self.sndr.rpt_per_member_bw = Some(rtcp_bandwidth);
        }
        if role & ROLE_RECEIVERS != 0 {
            self.rcvr.rpt_per_member_bw = Some(rtcp_bandwidth);
        }
    }
}

/// Per-interval session state the bandwidth/timing calculation needs,
/// mirroring `rtcp_intvl_calc_sess_info_t`.
#[derive(Debug, Clone, Copy)]
pub struct IntervalParams {
    pub members: u32,
    pub senders: u32,
    pub average_rtcp_size_bytes: f64,
    /// Average size of packets *we* send; only meaningful (and only used)
    /// on the single-member fast path, where the RFC 3556 population
    /// apportionment doesn't apply.
    pub average_rtcp_size_sent_bytes: f64,
    pub we_sent: bool,
    pub initial: bool,
}

struct EffectiveShare {
    rtcp_bw_bytes_per_sec: f64,
    avg_size_bytes: f64,
    members: u32,
}

/// Ported from `rtcp_get_intvl_calc_params`: a reported or configured
/// per-member bandwidth takes precedence over the members/senders
/// apportionment, since it is already scoped to a single member.
fn effective_share(bw: &BandwidthInfo, sess: &IntervalParams) -> EffectiveShare {
    let role = if sess.we_sent { &bw.sndr } else { &bw.rcvr };

    if let Some(reported) = role.rpt_per_member_bw {
        return EffectiveShare {
            rtcp_bw_bytes_per_sec: bi_to_bytes_per_sec(reported),
            avg_size_bytes: sess.average_rtcp_size_sent_bytes,
            members: 1,
        };
    }
    if let Some(cfg) = role.cfg_per_member_bw {
        let scale = sess.average_rtcp_size_sent_bytes / DFLT_AVG_PKT_SIZE_BYTES;
        return EffectiveShare {
            rtcp_bw_bytes_per_sec: cfg * scale,
            avg_size_bytes: sess.average_rtcp_size_sent_bytes,
            members: 1,
        };
    }

    EffectiveShare {
        rtcp_bw_bytes_per_sec: bw.rcvr.tot_role_bw + bw.sndr.tot_role_bw,
        avg_size_bytes: sess.average_rtcp_size_bytes,
        members: sess.members,
    }
}

/// Computes the deterministic interval `Td` (RFC 3550 §6.3.1), before the
/// randomized jitter factor is applied. Ported from `rtcp_td_interval`.
pub fn td_interval(bw: &BandwidthInfo, sess: &IntervalParams) -> f64 {
    let share = effective_share(bw, sess);

    let rtcp_bw = if share.members <= 1 {
        share.rtcp_bw_bytes_per_sec
    } else if (sess.senders as f64) <= share.members as f64 * DFLT_SENDER_BW_PCT {
        // Few enough senders that splitting bandwidth strictly by role
        // (rather than evenly across all members) won't starve receivers.
        if sess.we_sent {
            bw.sndr.tot_role_bw / sess.senders.max(1) as f64
        } else {
            bw.rcvr.tot_role_bw / share.members.saturating_sub(sess.senders).max(1) as f64
        }
    } else {
        share.rtcp_bw_bytes_per_sec / share.members as f64
    };

    let td_secs = share.avg_size_bytes / rtcp_bw.max(f64::MIN_POSITIVE);
    let floor_secs = (MIN_INTERVAL_MS as f64 / 1000.0) / if sess.initial { 2.0 } else { 1.0 };
    td_secs.max(floor_secs)
}

/// Applies RFC 3550 §6.3.1's randomization factor `T = Td·(U(0,1)+0.5) /
/// 1.21828` to a deterministic interval, so peers with the same `Td` don't
/// all report in lockstep. `rand_unit` must be uniform over `[0, 1)`.
pub fn jitter_interval(td_secs: f64, rand_unit: f64) -> f64 {
    (td_secs * (rand_unit + 0.5)) / COMPENSATION_FACTOR
}

/// Computes the next randomized reporting interval `T` for one participant.
pub fn reporting_interval(bw: &BandwidthInfo, sess: &IntervalParams, rand_unit: f64) -> RelTime {
    let td_secs = td_interval(bw, sess);
    let t_secs = jitter_interval(td_secs, rand_unit);
    RelTime::from_millis((t_secs * 1000.0) as i64)
}

#[cfg(test)]
mod bandwidth_test {
    use super::*;

    fn params(members: u32, senders: u32, we_sent: bool, initial: bool) -> IntervalParams {
        IntervalParams {
            members,
            senders,
            average_rtcp_size_bytes: 100.0,
            average_rtcp_size_sent_bytes: 100.0,
            we_sent,
            initial,
        }
    }

    #[test]
    fn explicit_rs_rr_take_precedence_over_as() {
        let cfg = BandwidthCfg {
            session_rs_bytes_per_sec: Some(1000.0),
            session_rr_bytes_per_sec: Some(2000.0),
            session_as_bytes_per_sec: Some(999_999.0),
            per_member_bytes_per_sec: None,
        };
        let bw = BandwidthInfo::from_cfg(&cfg);
        assert_eq!(bw.sndr.tot_role_bw, 1000.0);
        assert_eq!(bw.rcvr.tot_role_bw, 2000.0);
    }

    #[test]
    fn as_derived_roles_split_five_percent_by_default_pct() {
        let cfg = BandwidthCfg {
            session_rs_bytes_per_sec: None,
            session_rr_bytes_per_sec: None,
            session_as_bytes_per_sec: Some(100_000.0),
            per_member_bytes_per_sec: None,
        };
        let bw = BandwidthInfo::from_cfg(&cfg);
        let tot_rtcp_bw = 100_000.0 * RTCP_BANDWIDTH_FRACTION;
        assert!((bw.sndr.tot_role_bw - tot_rtcp_bw * DFLT_SENDER_BW_PCT).abs() < 1e-6);
        assert!((bw.rcvr.tot_role_bw - tot_rtcp_bw * DFLT_RECEIVER_BW_PCT).abs() < 1e-6);
        assert!((bw.sndr.tot_role_bw + bw.rcvr.tot_role_bw - tot_rtcp_bw).abs() < 1e-6);
    }

    #[test]
    fn as_derived_role_subtracts_explicit_other_role() {
        let cfg = BandwidthCfg {
            session_rs_bytes_per_sec: Some(500.0),
            session_rr_bytes_per_sec: None,
            session_as_bytes_per_sec: Some(100_000.0),
            per_member_bytes_per_sec: None,
        };
        let bw = BandwidthInfo::from_cfg(&cfg);
        let tot_rtcp_bw = 100_000.0 * RTCP_BANDWIDTH_FRACTION;
        assert_eq!(bw.sndr.tot_role_bw, 500.0);
        assert!((bw.rcvr.tot_role_bw - (tot_rtcp_bw - 500.0)).abs() < 1e-6);
    }

    #[test]
    fn role_bandwidth_is_capped_to_max_bandwidth() {
        let cfg = BandwidthCfg {
            session_rs_bytes_per_sec: Some(f64::MAX),
            session_rr_bytes_per_sec: None,
            session_as_bytes_per_sec: None,
            per_member_bytes_per_sec: None,
        };
        let bw = BandwidthInfo::from_cfg(&cfg);
        assert_eq!(bw.sndr.tot_role_bw, MAX_BANDWIDTH_BYTES_PER_SEC);
    }

    #[test]
    fn floor_applies_for_small_sessions() {
        let cfg = BandwidthCfg {
            session_as_bytes_per_sec: Some(1000.0),
            ..Default::default()
        };
        let bw = BandwidthInfo::from_cfg(&cfg);
        let interval = reporting_interval(&bw, &params(2, 0, false, false), 0.5);
        assert!(interval.as_millis() >= MIN_INTERVAL_MS / 2);
    }

    #[test]
    fn initial_report_uses_half_the_minimum_interval() {
        let cfg = BandwidthCfg {
            session_as_bytes_per_sec: Some(1000.0),
            ..Default::default()
        };
        let bw = BandwidthInfo::from_cfg(&cfg);
        let steady = reporting_interval(&bw, &params(2, 0, false, false), 0.5);
        let initial = reporting_interval(&bw, &params(2, 0, false, true), 0.5);
        assert!(initial.as_millis() <= steady.as_millis());
    }

    #[test]
    fn larger_membership_grows_the_interval() {
        let cfg = BandwidthCfg {
            session_as_bytes_per_sec: Some(64_000.0 / RTCP_BANDWIDTH_FRACTION),
            ..Default::default()
        };
        let bw = BandwidthInfo::from_cfg(&cfg);
        let small = reporting_interval(&bw, &params(2, 0, false, false), 0.5);
        let large = reporting_interval(&bw, &params(200, 0, false, false), 0.5);
        assert!(large.as_millis() > small.as_millis());
    }

    #[test]
    fn jitter_factor_stays_within_the_half_to_one_and_a_half_band() {
        let td = 10.0;
        let low = jitter_interval(td, 0.0);
        let high = jitter_interval(td, 1.0);
        assert!((low - 0.5 * td / COMPENSATION_FACTOR).abs() < 1e-9);
        assert!((high - 1.5 * td / COMPENSATION_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn per_member_bandwidth_config_takes_the_single_member_fast_path() {
        let cfg = BandwidthCfg {
            session_as_bytes_per_sec: Some(1.0), // would floor-dominate otherwise
            per_member_bytes_per_sec: Some(10_000.0),
            ..Default::default()
        };
        let bw = BandwidthInfo::from_cfg(&cfg);
        let with_many_members = reporting_interval(&bw, &params(500, 0, false, false), 0.5);
        let with_few_members = reporting_interval(&bw, &params(2, 0, false, false), 0.5);
        // The fast path ignores `members` entirely, so both give the same Td.
        assert_eq!(with_many_members.as_millis(), with_few_members.as_millis());
    }

    #[test]
    fn reported_bisb_bandwidth_also_takes_the_fast_path() {
        let mut bw = BandwidthInfo::default();
        bw.apply_reported_bandwidth(0x2, bytes_per_sec_to_bi(8000.0));
        assert!(bw.rcvr.rpt_per_member_bw.is_some());
        let interval = reporting_interval(&bw, &params(500, 0, false, false), 0.5);
        assert!(interval.as_millis() > 0);
    }

    #[test]
    fn bisb_role_bitmask_can_set_both_roles_at_once() {
        let mut bw = BandwidthInfo::default();
        bw.apply_reported_bandwidth(0x3, bytes_per_sec_to_bi(4000.0));
        assert!(bw.sndr.rpt_per_member_bw.is_some());
        assert!(bw.rcvr.rpt_per_member_bw.is_some());
    }
}
