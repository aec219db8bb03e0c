use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("RTP header size insufficient")]
    HeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    HeaderSizeInsufficientForExtension,
    #[error("unsupported RTP version")]
    BadVersion,
    #[error("buffer too small to marshal header")]
    BufferTooSmall,
}
