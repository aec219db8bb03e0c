#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod bandwidth;
pub mod compound_packet;
pub mod error;
pub mod extended_report;
pub mod goodbye;
pub mod header;
pub mod marshal;
pub mod pool;
pub mod receiver_report;
pub mod reception_report;
pub mod rsi;
pub mod sender_report;
pub mod source_description;

pub use compound_packet::RtcpPacket;
pub use error::Error;
pub use goodbye::Goodbye;
pub use header::{Header, PacketType};
pub use marshal::{Marshal, MarshalSize, Packet, Unmarshal};
pub use receiver_report::ReceiverReport;
pub use reception_report::ReceptionReport;
pub use rsi::ReceiverSummaryInformation;
pub use sender_report::SenderReport;
pub use source_description::SourceDescription;
