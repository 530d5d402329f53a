#![cfg_attr(not(feature = "std"), no_std)]
//! Sans-io implementation of the BACnet MS/TP data link layer.
//!
//! MS/TP (Master-Slave/Token-Passing) shares a half-duplex RS-485 line
//! between up to 128 master nodes, which pass a token between them in
//! address order, and slave nodes that only answer requests.
//!
//! This crate does no I/O and keeps no global state. A [`Port`] is one node
//! on the line. Feed it the octets received from the line, tick it once per
//! millisecond, [`poll`](Port::poll) it, and transmit what it hands out. The
//! network layer queues and takes payloads through the same `Port`.
//!
//! The building blocks are available on their own: [`frame`] encodes and
//! decodes frames, and the [`receive::Assembler`] reassembles frames one
//! octet at a time, which is what a bus monitor needs.
//!
//! With the `std` feature (the default) the [`io`] module connects a `Port`
//! to a serial port or any other blocking byte stream.

pub mod frame;
pub mod master;
pub mod receive;
pub mod slave;
pub mod timer;

mod buffer;
mod config;
mod crc;
mod nom_parser;
mod port;
mod types;

#[cfg(feature = "std")]
pub mod io;

pub use buffer::{Buffer, Payload};
pub use config::Config;
pub use frame::{Frame, FrameHeader};
pub use master::MasterState;
pub use port::{Pdu, Port, SendData, Statistics};
pub use receive::{Assembler, Received, RxStatus};
pub use slave::SlaveState;
pub use timer::Timing;
pub use types::{addr, Address, Error, FrameType, IntoAddress};

/// Maximum length of the data field of a frame.
pub const MAX_DATA_LEN: usize = 501;

/// Length of the preamble and header, including the header check octet.
pub const HEADER_LEN: usize = 8;

/// Maximum length of an encoded frame.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_DATA_LEN + 2;

/// Highest master node address.
pub const MAX_MASTER: u8 = 127;
