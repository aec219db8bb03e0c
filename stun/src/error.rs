use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("message shorter than the 20-byte STUN header")]
    Runt,
    #[error("bad magic cookie {0:08x}")]
    BadMagicCookie(u32),
    #[error("message length {declared} does not match buffer remainder {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("attribute at offset {0} runs past the declared message length")]
    AttributeOverrun(usize),
    #[error("unknown address family {0:#x} in a mapped-address attribute")]
    UnknownAddressFamily(u16),
    #[error("binding pool is full ({0} entries)")]
    BindingPoolFull(usize),
    #[error("no binding with id {0}")]
    UnknownBinding(u32),
    #[error("transaction id in response does not match any pending trial")]
    UnexpectedTransactionId,
}
