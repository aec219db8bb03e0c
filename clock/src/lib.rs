#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub mod nll;
pub mod time;

pub use error::Error;
pub use nll::{Mode as NllMode, Nll};
pub use time::{AbsTime, NtpTime, Pcr32Time, RelTime};
