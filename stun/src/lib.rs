#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod binding;
pub mod error;
pub mod message;

pub use binding::{BindingData, BindingDescriptor, BindingState, NatClient, StunProtocol, TimerKind};
pub use error::Error;
pub use message::{Message, TransactionId};
