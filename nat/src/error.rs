use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("UPnP binding pool is full ({0} entries)")]
    BindingPoolFull(usize),
    #[error("UPnP cookie pool is full ({0} entries)")]
    CookiePoolFull(usize),
    #[error("no binding with id {0}")]
    UnknownBinding(u32),
    #[error("no IGD has been discovered yet")]
    IgdNotReady,
    #[error(transparent)]
    Stun(#[from] stun::Error),
}
