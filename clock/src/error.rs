use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("relative time multiplication overflowed and was saturated")]
    RelMulSaturated,
    #[error("absolute time subtraction overflowed and was saturated")]
    AbsSubSaturated,
    #[error("NLL invoked with a null predicted_time output")]
    NllInvalidOutput,
}
