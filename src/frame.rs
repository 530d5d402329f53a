//! MS/TP frame layout.
//!
//! ```text
//! 0x55 0xFF | type | destination | source | length (MSB first) | header CRC
//! data (length octets) | data CRC (LSB first, only if length > 0)
//! ```

use snafu::ensure;

use crate::buffer::{Buffer, Payload};
use crate::crc;
use crate::nom_parser;
use crate::types::{check_data_len, Address, BufferTooSmallSnafu, Error, FrameType};
use crate::{HEADER_LEN, MAX_FRAME_LEN};

pub(crate) const PREAMBLE1: u8 = 0x55;
pub(crate) const PREAMBLE2: u8 = 0xFF;

/// An encoded frame, ready to be put on the wire.
pub type FrameBytes = Buffer<MAX_FRAME_LEN>;

/// The fixed part of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub destination: Address,
    pub source: Address,
    /// Declared length of the data field.
    pub length: u16,
}

/// A complete MS/TP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub destination: Address,
    pub source: Address,
    pub data: Payload,
}

impl Frame {
    /// Create a frame, checking that `data` fits in a frame.
    pub fn new(
        frame_type: FrameType,
        destination: Address,
        source: Address,
        data: &[u8],
    ) -> Result<Self, Error> {
        check_data_len(data.len())?;
        Ok(Self {
            frame_type,
            destination,
            source,
            data: Payload::from_slice(data)?,
        })
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            frame_type: self.frame_type,
            destination: self.destination,
            source: self.source,
            length: self.data.len() as u16,
        }
    }

    /// True if a station with address `station` must process this frame.
    pub fn is_for(&self, station: Address) -> bool {
        self.destination == station || self.destination.is_broadcast()
    }

    /// Encode the frame into `out`, returning the number of bytes written.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, Error> {
        encode(self.frame_type, self.destination, self.source, &self.data, out)
    }

    /// Encode the frame into a new buffer.
    pub fn to_bytes(&self) -> Result<FrameBytes, Error> {
        let mut raw = [0; MAX_FRAME_LEN];
        let len = self.encode(&mut raw)?;
        FrameBytes::from_slice(&raw[..len])
    }
}

impl core::fmt::Display for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:?} {} -> {} [{} bytes]",
            self.frame_type,
            self.source,
            self.destination,
            self.data.len()
        )
    }
}

/// Number of bytes a frame with `data_len` data octets occupies on the wire.
pub const fn encoded_len(data_len: usize) -> usize {
    if data_len == 0 {
        HEADER_LEN
    } else {
        HEADER_LEN + data_len + 2
    }
}

/// Encode a frame into `out`, returning the number of bytes written.
///
/// # Errors
/// [`Error::PayloadTooLarge`] if `data` is longer than 501 bytes,
/// [`Error::BufferTooSmall`] if `out` can't hold the frame.
///
/// # Example
/// ```
/// use mstp_proto::{addr, frame, FrameType};
/// let mut buf = [0; 16];
/// let len = frame::encode(FrameType::Token, addr(0x10), addr(0x05), &[], &mut buf).unwrap();
/// assert_eq!(&buf[..len], &[0x55, 0xFF, 0x00, 0x10, 0x05, 0x00, 0x00, 0x8C]);
/// ```
pub fn encode(
    frame_type: FrameType,
    destination: Address,
    source: Address,
    data: &[u8],
    out: &mut [u8],
) -> Result<usize, Error> {
    check_data_len(data.len())?;
    let needed = encoded_len(data.len());
    ensure!(
        out.len() >= needed,
        BufferTooSmallSnafu {
            needed,
            available: out.len()
        }
    );

    out[0] = PREAMBLE1;
    out[1] = PREAMBLE2;
    out[2] = frame_type.into();
    out[3] = *destination;
    out[4] = *source;
    out[5..7].copy_from_slice(&(data.len() as u16).to_be_bytes());
    out[7] = crc::header_crc(&out[2..7]);

    if !data.is_empty() {
        let end = HEADER_LEN + data.len();
        out[HEADER_LEN..end].copy_from_slice(data);
        out[end..needed].copy_from_slice(&crc::data_crc(data).to_le_bytes());
    }
    Ok(needed)
}

/// Result of decoding a byte slice with [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A valid frame.
    Frame(Frame),
    /// A frame with a bad check value, or one too long to be stored. The
    /// header is known unless the header check failed.
    Invalid(Option<FrameHeader>),
    /// Bytes that aren't the start of a frame.
    Garbage,
    /// The slice ends inside a frame.
    NeedData,
}

/// Decode the first frame in `buf`.
///
/// Returns the number of bytes consumed and what they contained. Nothing is
/// consumed when more data is needed. Use the [`crate::receive::Assembler`]
/// for bytes arriving one at a time from a live bus; this is meant for
/// captured streams.
pub fn decode(buf: &[u8]) -> (usize, Decoded) {
    nom_parser::parse_frame(buf)
}
