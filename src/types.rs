//! This module defines range-checked types for MS/TP station addresses and
//! frame types, and the error type shared by the synchronous API.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::{TryFrom, TryInto};
use core::fmt;
use core::ops::Deref;

use crate::{MAX_DATA_LEN, MAX_MASTER};

/// Error type for the synchronous API of this crate.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a valid MS/TP station address.
    #[snafu(display("Invalid address"))]
    InvalidAddress,
    /// The value isn't a valid master node address.
    #[snafu(display("Invalid master address"))]
    InvalidMasterAddress,
    /// Max info frames must be at least one.
    #[snafu(display("Invalid max info frames"))]
    InvalidMaxInfoFrames,
    /// Max master must not exceed 127.
    #[snafu(display("Invalid max master {}", max_master))]
    InvalidMaxMaster { max_master: u8 },
    /// Only data and test frames can be queued by the upper layer.
    #[snafu(display("Frame type {:?} can't carry a PDU", frame_type))]
    InvalidFrameType { frame_type: FrameType },
    /// The payload is larger than the 501 bytes a frame can carry.
    #[snafu(display("Payload of {} bytes is too large", len))]
    PayloadTooLarge { len: usize },
    /// The destination buffer can't hold the data.
    #[snafu(display("Buffer too small, need {} bytes, have {}", needed, available))]
    BufferTooSmall { needed: usize, available: usize },
    /// A fixed-capacity buffer is full.
    #[snafu(display("Buffer overflow, capacity is {} bytes", capacity))]
    BufferOverflow { capacity: usize },
    /// An outbound PDU is already waiting for the token.
    #[snafu(display("A PDU is already queued for transmission"))]
    PduPending,
}

const fn invalid_address() -> InvalidAddressSnafu {
    InvalidAddressSnafu
}

/// Address is a range-checked [0, 254] integer, representing a station address.
///
/// The broadcast address 255 is only available as [`Address::BROADCAST`],
/// it can be the destination of a frame but never a station.
///
/// ## Example
/// ```
/// use mstp_proto::Address;
/// use std::convert::TryInto;
/// let addr = Address::new(10).unwrap();
/// let addr: Address = 10.try_into().unwrap();
/// assert!(addr.is_master());
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct Address(u8);

/// Create a new station [`Address`], panics if it is out of range.
pub const fn addr(a: u8) -> Address {
    if a < 255 {
        return Address(a);
    }
    panic!("Invalid address.")
}

impl Address {
    /// The destination address of broadcast frames.
    pub const BROADCAST: Address = Address(255);

    /// Create a new address, checking that the address is in \[0, 254\].
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` is out of range.
    pub fn new(address: impl TryInto<u8>) -> Result<Self, Error> {
        let address = address.try_into().ok().with_context(invalid_address)?;
        ensure!(address < 255, invalid_address());
        Ok(Self(address))
    }

    /// Any octet seen on the wire, including the broadcast address.
    pub(crate) const fn from_wire(octet: u8) -> Self {
        Self(octet)
    }

    /// True for the broadcast address 255.
    pub const fn is_broadcast(self) -> bool {
        self.0 == 255
    }

    /// True if this address may belong to a master node (0-127).
    pub const fn is_master(self) -> bool {
        self.0 <= MAX_MASTER
    }
}

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u8> for Address {
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "broadcast")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Trait to convert `T: TryInto<u8>` into an [`Address`].
pub trait IntoAddress {
    /// Convert self to an Address.
    /// # Errors
    /// Returns `Error:InvalidAddress` if self isn't a valid address.
    fn into_address(self) -> Result<Address, Error>;
}

impl IntoAddress for Address {
    fn into_address(self) -> Result<Address, Error> {
        Ok(self)
    }
}

impl<T> IntoAddress for T
where
    T: TryInto<u8>,
{
    fn into_address(self) -> Result<Address, Error> {
        Address::new(self)
    }
}

impl TryFrom<usize> for Address {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}


/// The frame type octet of an MS/TP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Token,
    PollForMaster,
    ReplyToPollForMaster,
    TestRequest,
    TestResponse,
    DataExpectingReply,
    DataNotExpectingReply,
    ReplyPostponed,
    /// Codes 8 to 127, reserved by ASHRAE.
    Reserved(u8),
    /// Codes 128 to 255, available for vendor specific frames.
    Proprietary(u8),
}

impl FrameType {
    /// True if a node receiving this frame must answer it.
    pub const fn expects_reply(self) -> bool {
        matches!(self, Self::DataExpectingReply | Self::TestRequest)
    }

    /// True for the frame types the upper layer may hand to [`crate::Port::send_pdu`].
    pub const fn carries_pdu(self) -> bool {
        matches!(
            self,
            Self::DataExpectingReply
                | Self::DataNotExpectingReply
                | Self::TestRequest
                | Self::TestResponse
                | Self::Proprietary(_)
        )
    }
}

impl From<u8> for FrameType {
    fn from(octet: u8) -> Self {
        match octet {
            0 => Self::Token,
            1 => Self::PollForMaster,
            2 => Self::ReplyToPollForMaster,
            3 => Self::TestRequest,
            4 => Self::TestResponse,
            5 => Self::DataExpectingReply,
            6 => Self::DataNotExpectingReply,
            7 => Self::ReplyPostponed,
            8..=127 => Self::Reserved(octet),
            _ => Self::Proprietary(octet),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> Self {
        match frame_type {
            FrameType::Token => 0,
            FrameType::PollForMaster => 1,
            FrameType::ReplyToPollForMaster => 2,
            FrameType::TestRequest => 3,
            FrameType::TestResponse => 4,
            FrameType::DataExpectingReply => 5,
            FrameType::DataNotExpectingReply => 6,
            FrameType::ReplyPostponed => 7,
            FrameType::Reserved(octet) | FrameType::Proprietary(octet) => octet,
        }
    }
}

/// Check that `len` fits in the data field of a frame.
pub(crate) fn check_data_len(len: usize) -> Result<(), Error> {
    ensure!(len <= MAX_DATA_LEN, PayloadTooLargeSnafu { len });
    Ok(())
}
