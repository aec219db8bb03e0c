use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("packet too short")]
    PacketTooShort,
    #[error("buffer too short to marshal packet")]
    BufferTooShort,
    #[error("invalid header version")]
    BadVersion,
    #[error("invalid RTCP header, no packets found")]
    InvalidHeader,
    #[error("empty compound packet")]
    EmptyCompound,
    #[error("first packet in compound must be SR or RR")]
    BadFirstPacket,
    #[error("padding byte count is invalid")]
    WrongPadding,
    #[error("header type does not match expected packet type")]
    WrongType,
    #[error("too many reception report blocks, must be < 32")]
    TooManyReports,
    #[error("too many SDES chunks")]
    TooManySources,
    #[error("too many XR RLE chunks")]
    TooManyChunks,
    #[error("packet lost count exceeds maximum")]
    InvalidTotalLost,
    #[error("SDES item text too long, must be < 256 bytes")]
    SdesTextTooLong,
    #[error("BYE reason too long, must be < 256 bytes")]
    ReasonTooLong,
    #[error("XR block type did not match expected value")]
    WrongBlockType,
    #[error("XR TLV value too long for its length field")]
    TlvTooLong,
    #[error("SSRC must be zero for this packet type")]
    SsrcMustBeZero,
}
