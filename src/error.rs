use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Session(#[from] session::Error),
    #[error(transparent)]
    Stun(#[from] stun::Error),
    #[error(transparent)]
    Nat(#[from] nat::Error),
    #[error(transparent)]
    Rtcp(#[from] rtcp::Error),
    #[error("no timer with id {0:?}")]
    UnknownTimer(crate::timer::TimerId),
}
