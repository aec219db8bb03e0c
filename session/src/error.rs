use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("member table is full ({0} entries)")]
    MemberTableFull(usize),
    #[error("SSRC {0:08x} collided with the local CNAME and was rejected")]
    SsrcCollisionRejected(u32),
    #[error("no member entry for SSRC {0:08x}")]
    UnknownMember(u32),
    #[error("packet SSRC {0:08x} is not a sender this session variant accepts")]
    SenderNotPermitted(u32),
    #[error(transparent)]
    Rtp(#[from] rtp::Error),
    #[error(transparent)]
    Rtcp(#[from] rtcp::Error),
}
