//! See [`Port`] for more details.

use log::{debug, error, warn};
use snafu::ensure;

use crate::buffer::Payload;
use crate::config::Config;
use crate::frame::{self, FrameBytes};
use crate::master::MasterState;
use crate::receive::{Assembler, Received, RxStatus};
use crate::slave::SlaveState;
use crate::timer::{Timers, Timing};
use crate::types::{
    check_data_len, Address, BufferTooSmallSnafu, Error, FrameType, IntoAddress,
    InvalidFrameTypeSnafu, PduPendingSnafu,
};
use crate::MAX_FRAME_LEN;

/// A payload exchanged with the network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// Destination of an outbound PDU, source of an inbound one.
    pub address: Address,
    pub frame_type: FrameType,
    pub data: Payload,
}

/// Frame and token counters of a [`Port`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Valid frames received, including those for other stations.
    pub valid_frames: u32,
    /// Frames with a bad check value, a receive error or a stall inside them.
    pub invalid_frames: u32,
    /// Frames that completed while the previous one was still pending.
    pub dropped_frames: u32,
    pub frames_sent: u32,
    pub tokens_received: u32,
    /// Tokens sent again because the successor stayed silent.
    pub token_retries: u32,
    /// Successors given up on after the token retries ran out.
    pub lost_successors: u32,
    pub reply_timeouts: u32,
    pub replies_postponed: u32,
    pub pdus_received: u32,
    /// Inbound PDUs discarded because the previous one was not taken.
    pub pdus_dropped: u32,
}

/// Counters stick at their maximum instead of wrapping.
pub(crate) fn count(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}

/// One MS/TP node attached to a line.
///
/// The port owns all protocol state and performs no I/O. The transport
/// feeds it received octets with [`receive_octet()`](Self::receive_octet),
/// calls [`tick()`](Self::tick) once per millisecond and
/// [`poll()`](Self::poll) to run the node state machine, and sends whatever
/// [`transmit()`](Self::transmit) hands out.
///
/// # Example
///
/// ```
/// use mstp_proto::{Config, FrameType, Port};
/// # use std::io::Write;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut port = Port::new(Config::new(3)?);
/// let mut serial = Vec::new();
///
/// port.send_pdu(5, FrameType::DataNotExpectingReply, b"hello")?;
/// for _ in 0..1000 {
///     // for octet in serial.read() { port.receive_octet(octet); }
///     port.tick();
///     port.poll();
///     if let Some(send) = port.transmit() {
///         serial.write_all(send.get_data())?;
///         send.data_sent();
///     }
/// }
/// // alone on the line, this node generated a token and polled for masters
/// assert!(port.statistics().frames_sent > 0);
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct Port {
    pub(crate) config: Config,
    pub(crate) assembler: Assembler,
    pub(crate) timers: Timers,
    pub(crate) master_state: MasterState,
    pub(crate) slave_state: SlaveState,
    pub(crate) next_station: Address,
    pub(crate) poll_station: Address,
    pub(crate) frame_count: u8,
    pub(crate) token_count: u8,
    pub(crate) retry_count: u8,
    pub(crate) sole_master: bool,
    /// Source of the data request being answered.
    pub(crate) pending_request: Option<Address>,
    pub(crate) tx_pdu: Option<Pdu>,
    pub(crate) rx_pdu: Option<Pdu>,
    pub(crate) statistics: Statistics,
    output: FrameBytes,
}

impl Port {
    pub fn new(config: Config) -> Self {
        let this_station = config.this_station();
        Self {
            assembler: Assembler::new(config.timing().frame_abort),
            config,
            timers: Timers::new(),
            master_state: MasterState::Initialize,
            slave_state: SlaveState::Idle,
            next_station: this_station,
            poll_station: this_station,
            frame_count: 0,
            token_count: 0,
            retry_count: 0,
            sole_master: false,
            pending_request: None,
            tx_pdu: None,
            rx_pdu: None,
            statistics: Statistics::default(),
            output: FrameBytes::new(),
        }
    }

    /// Feed one octet received from the line.
    pub fn receive_octet(&mut self, octet: u8) -> RxStatus {
        let status = self.assembler.receive_octet(octet, &mut self.timers);
        self.received(status)
    }

    /// Report a framing or overrun error from the UART.
    pub fn receive_error(&mut self) -> RxStatus {
        let status = self.assembler.receive_error(&mut self.timers);
        self.received(status)
    }

    /// Advance the timers by one millisecond.
    pub fn tick(&mut self) {
        self.timers.tick();
        let status = self.assembler.check_timeout(&self.timers);
        self.received(status);
    }

    /// Run the node state machine until it waits for an event.
    ///
    /// Does nothing while a frame is waiting in the output buffer.
    pub fn poll(&mut self) {
        if !self.output.is_empty() {
            return;
        }
        if self.config.this_station().is_master() {
            while self.master_node_fsm() {}
        } else {
            self.slave_node_fsm();
        }
    }

    /// Get the frame to transmit, once the turnaround delay has passed.
    pub fn transmit(&mut self) -> Option<SendData<'_>> {
        if self.output.is_empty() || self.timers.silence() < self.config.timing().turnaround {
            None
        } else {
            Some(SendData { port: self })
        }
    }

    /// True if a frame is waiting to be transmitted.
    pub fn output_pending(&self) -> bool {
        !self.output.is_empty()
    }

    /// Queue a PDU for transmission the next time this node holds the token,
    /// or as the reply to a data request from `destination`.
    ///
    /// # Errors
    /// [`Error::PduPending`] if a PDU is already queued,
    /// [`Error::InvalidFrameType`] for token management frame types,
    /// [`Error::PayloadTooLarge`] if `data` doesn't fit in a frame.
    pub fn send_pdu(
        &mut self,
        destination: impl IntoAddress,
        frame_type: FrameType,
        data: &[u8],
    ) -> Result<(), Error> {
        let address = destination.into_address()?;
        ensure!(self.tx_pdu.is_none(), PduPendingSnafu);
        ensure!(frame_type.carries_pdu(), InvalidFrameTypeSnafu { frame_type });
        check_data_len(data.len())?;
        self.tx_pdu = Some(Pdu {
            address,
            frame_type,
            data: Payload::from_slice(data)?,
        });
        Ok(())
    }

    /// True if an outbound PDU is waiting for the token.
    pub fn pdu_pending(&self) -> bool {
        self.tx_pdu.is_some()
    }

    /// Copy the received PDU into `buf`, returning its source and length.
    ///
    /// # Errors
    /// [`Error::BufferTooSmall`] if `buf` can't hold the PDU. The PDU stays
    /// available in that case.
    pub fn receive_pdu(&mut self, buf: &mut [u8]) -> Result<Option<(Address, usize)>, Error> {
        let len = match &self.rx_pdu {
            Some(pdu) => pdu.data.len(),
            None => return Ok(None),
        };
        ensure!(
            buf.len() >= len,
            BufferTooSmallSnafu {
                needed: len,
                available: buf.len()
            }
        );
        Ok(self.rx_pdu.take().map(|pdu| {
            buf[..len].copy_from_slice(&pdu.data);
            (pdu.address, len)
        }))
    }

    /// Take the received PDU.
    pub fn take_pdu(&mut self) -> Option<Pdu> {
        self.rx_pdu.take()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn this_station(&self) -> Address {
        self.config.this_station()
    }

    /// Change the station address. The node starts over as a new station.
    pub fn set_this_station(&mut self, this_station: impl IntoAddress) -> Result<(), Error> {
        self.config.set_this_station(this_station)?;
        self.reinitialize();
        Ok(())
    }

    pub fn max_info_frames(&self) -> u8 {
        self.config.max_info_frames()
    }

    pub fn set_max_info_frames(&mut self, max_info_frames: u8) -> Result<(), Error> {
        self.config.set_max_info_frames(max_info_frames)
    }

    pub fn max_master(&self) -> u8 {
        self.config.max_master()
    }

    pub fn set_max_master(&mut self, max_master: u8) -> Result<(), Error> {
        self.config.set_max_master(max_master)
    }

    pub fn set_timing(&mut self, timing: Timing) {
        self.assembler.set_frame_abort(timing.frame_abort);
        self.config.set_timing(timing);
    }

    pub fn broadcast_address(&self) -> Address {
        Address::BROADCAST
    }

    /// True if octets were seen on the line within the no token time.
    pub fn is_bus_active(&self) -> bool {
        self.timers.silence() < self.config.timing().no_token
    }

    pub fn master_state(&self) -> MasterState {
        self.master_state
    }

    pub fn slave_state(&self) -> SlaveState {
        self.slave_state
    }

    /// The station this node passes the token to.
    pub fn next_station(&self) -> Address {
        self.next_station
    }

    /// The station last polled for a new master.
    pub fn poll_station(&self) -> Address {
        self.poll_station
    }

    pub fn is_sole_master(&self) -> bool {
        self.sole_master
    }

    /// True while this node holds the token.
    pub fn has_token(&self) -> bool {
        matches!(
            self.master_state,
            MasterState::UseToken
                | MasterState::WaitForReply
                | MasterState::DoneWithToken
                | MasterState::PollForMaster
        )
    }

    /// Milliseconds since an octet was last received or transmitted.
    pub fn silence(&self) -> u32 {
        self.timers.silence()
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    fn reinitialize(&mut self) {
        let this_station = self.config.this_station();
        debug!("Station {} initializing", this_station);
        self.master_state = MasterState::Initialize;
        self.slave_state = SlaveState::Idle;
        self.next_station = this_station;
        self.poll_station = this_station;
        self.pending_request = None;
        self.timers.disarm_reply_postponed();
        self.assembler.take();
    }

    fn received(&mut self, status: RxStatus) -> RxStatus {
        match status {
            RxStatus::Assembling => (),
            RxStatus::Valid => {
                count(&mut self.statistics.valid_frames);
                let this_station = self.config.this_station();
                let not_for_us = matches!(
                    self.assembler.pending(),
                    Some(Received::Valid(frame)) if !frame.is_for(this_station)
                );
                if not_for_us {
                    self.assembler.take();
                }
            }
            RxStatus::Invalid => count(&mut self.statistics.invalid_frames),
            RxStatus::Dropped => count(&mut self.statistics.dropped_frames),
        }
        status
    }

    /// Put a frame in the output buffer.
    pub(crate) fn send_frame(&mut self, frame_type: FrameType, destination: Address, data: &[u8]) {
        let mut raw = [0; MAX_FRAME_LEN];
        let source = self.config.this_station();
        let output = &mut self.output;
        let result = frame::encode(frame_type, destination, source, data, &mut raw).and_then(|len| {
            output.clear();
            output.write(&raw[..len])
        });
        match result {
            Ok(()) => debug!("{} sends {:?} to {}", source, frame_type, destination),
            Err(e) => error!("Failed to encode {:?} frame: {}", frame_type, e),
        }
    }

    /// Send the queued PDU, returning its destination and frame type.
    pub(crate) fn send_queued_pdu(&mut self) -> Option<(Address, FrameType)> {
        let pdu = self.tx_pdu.take()?;
        self.send_frame(pdu.frame_type, pdu.address, &pdu.data);
        Some((pdu.address, pdu.frame_type))
    }

    /// Hand a received data frame to the network layer.
    pub(crate) fn deliver(&mut self, frame: frame::Frame) {
        if self.rx_pdu.is_some() {
            warn!(
                "Dropped PDU from {}, the previous one was not taken",
                frame.source
            );
            count(&mut self.statistics.pdus_dropped);
            return;
        }
        count(&mut self.statistics.pdus_received);
        self.rx_pdu = Some(Pdu {
            address: frame.source,
            frame_type: frame.frame_type,
            data: frame.data,
        });
    }

    /// The station after `address`, wrapping at max master.
    pub(crate) fn successor(&self, address: Address) -> Address {
        let modulus = u16::from(self.config.max_master()) + 1;
        Address::from_wire(((u16::from(*address) + 1) % modulus) as u8)
    }
}

/// A frame ready for the line.
///
/// Call [`get_data()`](Self::get_data()) to get the octets to transmit, and
/// [`data_sent()`](Self::data_sent()) once they have left the transmitter.
#[derive(Debug)]
pub struct SendData<'a> {
    port: &'a mut Port,
}

impl SendData<'_> {
    /// Returns the data to be sent on the bus.
    pub fn get_data(&self) -> &[u8] {
        self.port.output.as_slice()
    }

    /// Signals that the data was sent. Restarts the silence timer.
    pub fn data_sent(self) {
        self.port.output.clear();
        self.port.timers.reset_silence();
        count(&mut self.port.statistics.frames_sent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr;
    use crate::frame::{Decoded, Frame};

    fn get_port(this_station: u8) -> Port {
        Port::new(Config::new(this_station).unwrap())
    }

    fn wait(port: &mut Port, ms: u32) {
        for _ in 0..ms {
            port.tick();
        }
    }

    fn feed(port: &mut Port, frame: &Frame) {
        for &b in frame.to_bytes().unwrap().iter() {
            port.receive_octet(b);
        }
    }

    fn sent_frame(port: &mut Port) -> Frame {
        let turnaround = port.config().timing().turnaround;
        wait(port, turnaround);
        let send = port.transmit().unwrap();
        let frame = match frame::decode(send.get_data()) {
            (_, Decoded::Frame(frame)) => frame,
            other => panic!("Unexpected {:?}", other),
        };
        send.data_sent();
        frame
    }

    #[test]
    fn test_send_pdu_errors() {
        let mut port = get_port(1);
        assert_eq!(
            port.send_pdu(2, FrameType::Token, &[]),
            Err(Error::InvalidFrameType {
                frame_type: FrameType::Token
            })
        );
        assert_eq!(
            port.send_pdu(2, FrameType::DataNotExpectingReply, &[0; 502]),
            Err(Error::PayloadTooLarge { len: 502 })
        );
        assert_eq!(
            port.send_pdu(255, FrameType::DataNotExpectingReply, &[]),
            Err(Error::InvalidAddress)
        );
        port.send_pdu(Address::BROADCAST, FrameType::DataNotExpectingReply, &[1])
            .unwrap();
        assert!(port.pdu_pending());
        assert_eq!(
            port.send_pdu(2, FrameType::DataNotExpectingReply, &[2]),
            Err(Error::PduPending)
        );
    }

    #[test]
    fn test_receive_pdu() {
        let mut port = get_port(1);
        port.poll();
        feed(
            &mut port,
            &Frame::new(FrameType::DataNotExpectingReply, addr(1), addr(9), b"abcd").unwrap(),
        );
        port.poll();

        let mut small = [0; 3];
        assert_eq!(
            port.receive_pdu(&mut small),
            Err(Error::BufferTooSmall {
                needed: 4,
                available: 3
            })
        );
        let mut buf = [0; 16];
        assert_eq!(port.receive_pdu(&mut buf), Ok(Some((addr(9), 4))));
        assert_eq!(&buf[..4], b"abcd");
        assert_eq!(port.receive_pdu(&mut buf), Ok(None));
    }

    #[test]
    fn test_second_pdu_is_dropped() {
        let mut port = get_port(1);
        port.poll();
        for data in [b"one", b"two"].iter() {
            feed(
                &mut port,
                &Frame::new(FrameType::DataNotExpectingReply, Address::BROADCAST, addr(9), *data)
                    .unwrap(),
            );
            port.poll();
        }
        assert_eq!(port.statistics().pdus_dropped, 1);
        assert_eq!(port.take_pdu().unwrap().data.as_slice(), b"one");
        assert_eq!(port.take_pdu(), None);
    }

    #[test]
    fn test_frames_for_others_are_ignored() {
        let mut port = get_port(1);
        port.poll();
        feed(
            &mut port,
            &Frame::new(FrameType::DataNotExpectingReply, addr(2), addr(9), b"x").unwrap(),
        );
        assert!(port.assembler.pending().is_none());
        port.poll();
        assert_eq!(port.take_pdu(), None);
        assert_eq!(port.statistics().valid_frames, 1);
    }

    #[test]
    fn test_turnaround() {
        let mut port = get_port(1);
        port.poll();
        feed(
            &mut port,
            &Frame::new(FrameType::PollForMaster, addr(1), addr(0), &[]).unwrap(),
        );
        port.poll();
        assert!(port.output_pending());
        let turnaround = port.config().timing().turnaround;
        for _ in 0..turnaround {
            assert!(port.transmit().is_none());
            port.tick();
        }
        let frame = sent_frame(&mut port);
        assert_eq!(frame.frame_type, FrameType::ReplyToPollForMaster);
        assert_eq!(frame.destination, 0);
        assert_eq!(port.silence(), 0);
        assert!(!port.output_pending());
    }

    #[test]
    fn test_bus_activity() {
        let mut port = get_port(1);
        assert!(port.is_bus_active());
        wait(&mut port, 500);
        assert!(!port.is_bus_active());
        port.receive_octet(0);
        assert!(port.is_bus_active());
    }

    #[test]
    fn test_config_accessors() {
        let mut port = get_port(1);
        assert_eq!(port.broadcast_address(), 255);
        assert!(port.set_max_master(200).is_err());
        port.set_max_master(10).unwrap();
        assert_eq!(port.max_master(), 10);
        assert!(port.set_max_info_frames(0).is_err());
        port.set_max_info_frames(3).unwrap();
        assert_eq!(port.max_info_frames(), 3);

        port.poll();
        assert_eq!(port.master_state(), MasterState::Idle);
        port.set_this_station(4).unwrap();
        assert_eq!(port.this_station(), 4);
        assert_eq!(port.master_state(), MasterState::Initialize);
        assert_eq!(port.next_station(), 4);
        assert_eq!(port.successor(addr(10)), addr(0));
        assert_eq!(port.successor(addr(4)), addr(5));
    }

    #[test]
    fn test_counters_saturate() {
        let mut port = get_port(1);
        port.poll();
        port.statistics.valid_frames = u32::MAX;
        port.statistics.pdus_received = u32::MAX;
        feed(
            &mut port,
            &Frame::new(FrameType::DataNotExpectingReply, addr(1), addr(9), b"x").unwrap(),
        );
        port.poll();
        assert_eq!(port.statistics().valid_frames, u32::MAX);
        assert_eq!(port.statistics().pdus_received, u32::MAX);
        assert!(port.take_pdu().is_some());
    }

    #[test]
    fn test_poll_range_covers_this_station() {
        let mut port = get_port(10);
        assert!(port.set_max_master(5).is_err());
        assert_eq!(port.max_master(), 127);
        port.set_max_master(10).unwrap();
        assert_eq!(port.successor(addr(9)), addr(10));
        assert_eq!(port.successor(addr(10)), addr(0));

        port.set_this_station(20).unwrap();
        assert_eq!(port.max_master(), 20);
        assert_eq!(port.successor(addr(19)), addr(20));
    }
}
