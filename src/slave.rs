//! The slave node state machine, see [`SlaveState`].

use log::debug;

use crate::port::Port;
use crate::receive::Received;
use crate::types::FrameType;

/// States of a slave node, a station above the master address range.
///
/// A slave never holds the token. It receives data frames and answers data
/// requests and test requests, nothing else. A reply that isn't queued
/// within the reply delay is abandoned, slaves can't postpone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    /// Waiting for a frame.
    Idle,
    /// Waiting for the network layer to queue the reply to a data request.
    AnswerDataRequest,
}

impl Port {
    pub(crate) fn slave_node_fsm(&mut self) {
        match self.slave_state {
            SlaveState::Idle => {
                let frame = match self.assembler.take() {
                    Some(Received::Valid(frame)) => frame,
                    _ => return,
                };
                let unicast = !frame.destination.is_broadcast();
                match frame.frame_type {
                    FrameType::DataExpectingReply if unicast => {
                        self.pending_request = Some(frame.source);
                        self.timers.arm_reply_postponed();
                        self.deliver(frame);
                        self.slave_state = SlaveState::AnswerDataRequest;
                    }
                    FrameType::TestRequest if unicast => {
                        self.send_frame(FrameType::TestResponse, frame.source, &frame.data);
                    }
                    FrameType::DataExpectingReply
                    | FrameType::DataNotExpectingReply
                    | FrameType::Proprietary(_) => self.deliver(frame),
                    _ => (),
                }
            }

            SlaveState::AnswerDataRequest => {
                let requester = self.pending_request;
                let reply_ready = matches!(
                    (&self.tx_pdu, requester),
                    (Some(pdu), Some(requester)) if pdu.address == requester
                );
                let expired = self
                    .timers
                    .reply_postponed()
                    .map_or(true, |t| t >= self.config.timing().reply_delay);

                if reply_ready {
                    self.send_queued_pdu();
                } else if expired {
                    debug!("No reply to {:?} within the reply delay", requester);
                } else {
                    return;
                }
                self.pending_request = None;
                self.timers.disarm_reply_postponed();
                self.slave_state = SlaveState::Idle;
            }
        }
    }
}
