//! The five RTP session topologies this receiver can be configured for.
//! Modeled as a tagged enum rather than a trait object: the set of variants
//! is closed, each carries different constraints on the single dispatch
//! call site (`receive_rtp`/`receive_rtcp`), and a `match` keeps that
//! dispatch a compile-time-checked exhaustive list instead of a dynamic
//! call through `dyn Session`.

use std::net::SocketAddr;

use clock::AbsTime;

use crate::base::{RtpArrival, SessionBase, SessionParams};
use crate::error::{Error, Result};

/// Any-Source Multicast: no constraint on which source addresses or SSRCs
/// may join.
#[derive(Debug)]
pub struct AsmSession {
    pub base: SessionBase,
}

/// Point-to-Point: exactly one expected peer, known up front.
#[derive(Debug)]
pub struct PtpSession {
    pub base: SessionBase,
    pub peer_addr: SocketAddr,
}

/// Single-Source Multicast, source role: this stack never originates
/// media, but it still tracks the distinguished source SSRC so receivers
/// downstream of an SSM-FBT can validate RSI summaries reference it.
#[derive(Debug)]
pub struct SsmSourceSession {
    pub base: SessionBase,
    pub source_ssrc: u32,
}

/// Single-Source Multicast, receiver role: RTP must originate from the
/// one known source address; anything else is dropped before it reaches
/// the member table.
#[derive(Debug)]
pub struct SsmReceiverSession {
    pub base: SessionBase,
    pub source_addr: SocketAddr,
}

/// Single-Source Multicast, Feedback Target role: aggregates unicast
/// feedback from a receiver population and periodically emits an RSI
/// summary back out to the group.
#[derive(Debug)]
pub struct SsmFbtSession {
    pub base: SessionBase,
    pub summary_ssrc: u32,
}

#[derive(Debug)]
pub enum SessionVariant {
    Asm(AsmSession),
    Ptp(PtpSession),
    SsmSource(SsmSourceSession),
    SsmReceiver(SsmReceiverSession),
    SsmFbt(SsmFbtSession),
}

impl SessionVariant {
    pub fn base(&self) -> &SessionBase {
        match self {
            SessionVariant::Asm(s) => &s.base,
            SessionVariant::Ptp(s) => &s.base,
            SessionVariant::SsmSource(s) => &s.base,
            SessionVariant::SsmReceiver(s) => &s.base,
            SessionVariant::SsmFbt(s) => &s.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut SessionBase {
        match self {
            SessionVariant::Asm(s) => &mut s.base,
            SessionVariant::Ptp(s) => &mut s.base,
            SessionVariant::SsmSource(s) => &mut s.base,
            SessionVariant::SsmReceiver(s) => &mut s.base,
            SessionVariant::SsmFbt(s) => &mut s.base,
        }
    }

    pub fn new_asm(params: SessionParams) -> Self {
        SessionVariant::Asm(AsmSession {
            base: SessionBase::new(params),
        })
    }

    pub fn new_ptp(params: SessionParams, peer_addr: SocketAddr) -> Self {
        SessionVariant::Ptp(PtpSession {
            base: SessionBase::new(params),
            peer_addr,
        })
    }

    pub fn new_ssm_source(params: SessionParams, source_ssrc: u32) -> Self {
        SessionVariant::SsmSource(SsmSourceSession {
            base: SessionBase::new(params),
            source_ssrc,
        })
    }

    pub fn new_ssm_receiver(params: SessionParams, source_addr: SocketAddr) -> Self {
        SessionVariant::SsmReceiver(SsmReceiverSession {
            base: SessionBase::new(params),
            source_addr,
        })
    }

    pub fn new_ssm_fbt(params: SessionParams, summary_ssrc: u32) -> Self {
        SessionVariant::SsmFbt(SsmFbtSession {
            base: SessionBase::new(params),
            summary_ssrc,
        })
    }

    /// Validates the packet's source address against this variant's
    /// topology constraint before handing it to the shared receive
    /// pipeline. ASM, SSM-source, and SSM-FBT place no constraint here;
    /// PTP and SSM-receiver do.
    fn admits(&self, source_addr: SocketAddr) -> bool {
        match self {
            SessionVariant::Asm(_) | SessionVariant::SsmSource(_) | SessionVariant::SsmFbt(_) => true,
            SessionVariant::Ptp(s) => s.peer_addr == source_addr,
            SessionVariant::SsmReceiver(s) => s.source_addr == source_addr,
        }
    }

    pub fn receive_rtp(
        &mut self,
        raw: &[u8],
        source_addr: SocketAddr,
        arrival_wall: AbsTime,
        arrival_media: u32,
    ) -> Result<Option<RtpArrival>> {
        if !self.admits(source_addr) {
            return Ok(None);
        }
        self.base_mut().receive_rtp(raw, source_addr, arrival_wall, arrival_media)
    }

    pub fn receive_rtcp(&mut self, raw: &[u8], source_addr: SocketAddr, arrival: AbsTime) -> Result<()> {
        if !self.admits(source_addr) {
            return Err(Error::SenderNotPermitted(0));
        }
        self.base_mut().receive_rtcp(raw, source_addr, arrival)
    }
}
