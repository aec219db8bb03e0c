#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub mod hybrid;
pub mod upnp;

pub use error::Error;
pub use hybrid::{Authoritative, HybridNatManager, SubProtocol};
pub use upnp::UpnpProtocol;
