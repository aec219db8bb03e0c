#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod base;
pub mod error;
pub mod member;
pub mod variant;

pub use base::{RtpArrival, SessionBase, SessionParams};
pub use error::Error;
pub use member::{Conflict, JitterStats, Member, MemberTable};
pub use variant::{AsmSession, PtpSession, SessionVariant, SsmFbtSession, SsmReceiverSession, SsmSourceSession};
