//! Octet-at-a-time frame reassembly.
//!
//! The [`Assembler`] is fed every octet and every receive error from the
//! line, and is checked for stalls on every timer tick. A completed frame is
//! parked as a pending [`Received`] result until it is taken. While a result
//! is pending, further completed frames are dropped instead of overwriting it.

use log::{debug, trace, warn};

use crate::buffer::Payload;
use crate::crc::{self, DATA_CRC_RESIDUE, HEADER_CRC_RESIDUE};
use crate::frame::{Frame, FrameHeader, PREAMBLE1, PREAMBLE2};
use crate::timer::{Timers, Timing};
use crate::types::{Address, FrameType};

const HEADER_OCTETS: usize = 5;

const EMPTY_HEADER: FrameHeader = FrameHeader {
    frame_type: FrameType::Token,
    destination: Address::BROADCAST,
    source: Address::BROADCAST,
    length: 0,
};

/// Receiver states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Waiting for the first preamble octet.
    Idle,
    /// Waiting for the second preamble octet.
    Preamble,
    /// Receiving the header and its check octet.
    Header,
    /// Receiving the data field and its check octets.
    Data,
    /// Receiving a data field too long to be stored.
    SkipData,
}

/// A completed frame waiting to be taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Valid(Frame),
    /// A frame with a bad check value, a receive error or a stall inside it.
    /// The header is known if it passed its check.
    Invalid(Option<FrameHeader>),
}

/// Outcome of feeding the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxStatus {
    /// Nothing completed.
    Assembling,
    /// A valid frame is now pending.
    Valid,
    /// An invalid frame is now pending.
    Invalid,
    /// A frame completed while another was pending, and was discarded.
    Dropped,
}

/// Receive state machine for one line.
#[derive(Debug, Clone)]
pub struct Assembler {
    state: RxState,
    frame_abort: u32,
    header: FrameHeader,
    index: usize,
    header_crc: u8,
    data_crc: u16,
    data: Payload,
    received: Option<Received>,
    event_count: u8,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(Timing::default().frame_abort)
    }
}

impl Assembler {
    /// Create an idle assembler that abandons a frame after `frame_abort`
    /// milliseconds of silence inside it.
    pub fn new(frame_abort: u32) -> Self {
        Self {
            state: RxState::Idle,
            frame_abort,
            header: EMPTY_HEADER,
            index: 0,
            header_crc: 0xFF,
            data_crc: 0xFFFF,
            data: Payload::new(),
            received: None,
            event_count: 0,
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn set_frame_abort(&mut self, frame_abort: u32) {
        self.frame_abort = frame_abort;
    }

    /// Octets and receive errors seen since the last reset, saturating at 255.
    pub fn event_count(&self) -> u8 {
        self.event_count
    }

    pub fn reset_event_count(&mut self) {
        self.event_count = 0;
    }

    /// The pending result, if any.
    pub fn pending(&self) -> Option<&Received> {
        self.received.as_ref()
    }

    /// Take the pending result, making room for the next frame.
    pub fn take(&mut self) -> Option<Received> {
        self.received.take()
    }

    /// Process one octet from the line.
    pub fn receive_octet(&mut self, octet: u8, timers: &mut Timers) -> RxStatus {
        let status = self.check_timeout(timers);
        timers.reset_silence();
        self.count_event();

        let completed = match self.state {
            RxState::Idle => {
                if octet == PREAMBLE1 {
                    self.state = RxState::Preamble;
                }
                None
            }
            RxState::Preamble => {
                self.state = match octet {
                    PREAMBLE2 => {
                        self.start_header();
                        RxState::Header
                    }
                    PREAMBLE1 => RxState::Preamble,
                    _ => RxState::Idle,
                };
                None
            }
            RxState::Header => self.header_octet(octet),
            RxState::Data | RxState::SkipData => self.data_octet(octet),
        };

        match completed {
            Some(received) => self.complete(received),
            None => status,
        }
    }

    /// Process a framing or overrun error reported by the UART.
    pub fn receive_error(&mut self, timers: &mut Timers) -> RxStatus {
        let status = self.check_timeout(timers);
        timers.reset_silence();
        self.count_event();

        match core::mem::replace(&mut self.state, RxState::Idle) {
            RxState::Idle | RxState::Preamble => status,
            RxState::Header => {
                debug!("Receive error in header");
                self.complete(Received::Invalid(None))
            }
            RxState::Data | RxState::SkipData => {
                debug!("Receive error in data");
                self.complete(Received::Invalid(Some(self.header)))
            }
        }
    }

    /// Abandon a partial frame if the line has been silent for longer than
    /// the frame abort time.
    pub fn check_timeout(&mut self, timers: &Timers) -> RxStatus {
        if self.state == RxState::Idle || timers.silence() <= self.frame_abort {
            return RxStatus::Assembling;
        }

        match core::mem::replace(&mut self.state, RxState::Idle) {
            RxState::Idle | RxState::Preamble => RxStatus::Assembling,
            RxState::Header => {
                debug!("Frame abort in header");
                self.complete(Received::Invalid(None))
            }
            RxState::Data | RxState::SkipData => {
                debug!(
                    "Frame abort after {} of {} data octets",
                    self.index, self.header.length
                );
                self.complete(Received::Invalid(Some(self.header)))
            }
        }
    }

    fn count_event(&mut self) {
        self.event_count = self.event_count.saturating_add(1);
    }

    fn start_header(&mut self) {
        self.header = EMPTY_HEADER;
        self.index = 0;
        self.header_crc = 0xFF;
    }

    fn header_octet(&mut self, octet: u8) -> Option<Received> {
        self.header_crc = crc::header_crc_update(self.header_crc, octet);
        match self.index {
            0 => self.header.frame_type = octet.into(),
            1 => self.header.destination = Address::from_wire(octet),
            2 => self.header.source = Address::from_wire(octet),
            3 => self.header.length = u16::from(octet) << 8,
            4 => self.header.length |= u16::from(octet),
            _ => return self.header_done(),
        }
        self.index += 1;
        None
    }

    fn header_done(&mut self) -> Option<Received> {
        debug_assert_eq!(self.index, HEADER_OCTETS);
        self.state = RxState::Idle;
        if self.header_crc != HEADER_CRC_RESIDUE {
            debug!("Header CRC mismatch");
            return Some(Received::Invalid(None));
        }

        trace!("Header {:?}", self.header);
        self.data.clear();
        if self.header.length == 0 {
            return Some(Received::Valid(self.frame()));
        }

        self.index = 0;
        self.data_crc = 0xFFFF;
        self.state = if usize::from(self.header.length) > self.data.capacity() {
            debug!("Data length {} exceeds buffer, skipping", self.header.length);
            RxState::SkipData
        } else {
            RxState::Data
        };
        None
    }

    fn data_octet(&mut self, octet: u8) -> Option<Received> {
        let length = usize::from(self.header.length);
        self.data_crc = crc::data_crc_update(self.data_crc, octet);
        if self.index < length && self.state == RxState::Data && self.data.push(octet).is_err() {
            self.state = RxState::SkipData;
        }

        self.index += 1;
        if self.index < length + 2 {
            return None;
        }

        let skipped = self.state == RxState::SkipData;
        self.state = RxState::Idle;
        if skipped {
            Some(Received::Invalid(Some(self.header)))
        } else if self.data_crc != DATA_CRC_RESIDUE {
            debug!("Data CRC mismatch");
            Some(Received::Invalid(Some(self.header)))
        } else {
            Some(Received::Valid(self.frame()))
        }
    }

    fn frame(&mut self) -> Frame {
        Frame {
            frame_type: self.header.frame_type,
            destination: self.header.destination,
            source: self.header.source,
            data: core::mem::take(&mut self.data),
        }
    }

    fn complete(&mut self, received: Received) -> RxStatus {
        if self.received.is_some() {
            warn!("Dropped frame, the previous one was not consumed");
            return RxStatus::Dropped;
        }
        let status = match &received {
            Received::Valid(frame) => {
                trace!("Received {}", frame);
                RxStatus::Valid
            }
            Received::Invalid(_) => RxStatus::Invalid,
        };
        self.received = Some(received);
        status
    }
}
