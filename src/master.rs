//! The master node state machine, see [`MasterState`].

use log::{debug, info, warn};

use crate::frame::Frame;
use crate::port::{count, Port};
use crate::receive::Received;
use crate::timer::{NMIN_OCTETS, NPOLL, NRETRY_TOKEN};
use crate::types::{Address, FrameType};

/// States of a master node.
///
/// A master node holds the token in `UseToken`, `WaitForReply`,
/// `DoneWithToken` and `PollForMaster`. It passes the token to the next
/// station in address order, and every [`NPOLL`] tokens polls one address
/// between itself and the next station for a new master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Initialize,
    /// Waiting for a frame.
    Idle,
    /// Allowed to send data frames.
    UseToken,
    /// Waiting for the reply to a data or test request.
    WaitForReply,
    /// Decides whether to send another frame, pass the token or poll for a master.
    DoneWithToken,
    /// Listening for the successor to use the token just passed.
    PassToken,
    /// The line has been silent, waiting for this node's slot to create a token.
    NoToken,
    /// Listening for a reply to a Poll For Master.
    PollForMaster,
    /// Answering a data request, or postponing the answer.
    AnswerDataRequest,
}

impl Port {
    /// One step of the master node state machine. Returns true if the next
    /// step should run right away.
    pub(crate) fn master_node_fsm(&mut self) -> bool {
        let this_station = self.config.this_station();
        let next_this_station = self.successor(this_station);
        let next_next_station = self.successor(self.next_station);
        let next_poll_station = self.successor(self.poll_station);
        let timing = *self.config.timing();
        let silence = self.timers.silence();
        let state = self.master_state;
        let mut transition_now = false;

        match self.master_state {
            MasterState::Initialize => {
                self.next_station = this_station;
                self.poll_station = this_station;
                // poll for masters the first time the token arrives
                self.token_count = NPOLL;
                self.sole_master = false;
                self.master_state = MasterState::Idle;
                transition_now = true;
            }

            MasterState::Idle => {
                if silence >= timing.no_token {
                    self.assembler.reset_event_count();
                    self.assembler.take();
                    self.master_state = MasterState::NoToken;
                    transition_now = true;
                } else if let Some(Received::Valid(frame)) = self.assembler.take() {
                    transition_now = self.idle_frame(frame);
                }
            }

            MasterState::UseToken => match self.send_queued_pdu() {
                None => {
                    self.frame_count = self.config.max_info_frames();
                    self.master_state = MasterState::DoneWithToken;
                    transition_now = true;
                }
                Some((destination, frame_type)) => {
                    self.frame_count = self.frame_count.saturating_add(1);
                    self.master_state =
                        if frame_type.expects_reply() && !destination.is_broadcast() {
                            MasterState::WaitForReply
                        } else {
                            MasterState::DoneWithToken
                        };
                }
            },

            MasterState::WaitForReply => {
                if silence >= timing.reply_timeout {
                    debug!("No reply within {} ms", timing.reply_timeout);
                    count(&mut self.statistics.reply_timeouts);
                    // pass the token, any retry waits for the next token
                    self.frame_count = self.config.max_info_frames();
                    self.master_state = MasterState::DoneWithToken;
                    transition_now = true;
                } else {
                    match self.assembler.take() {
                        None => (),
                        Some(Received::Invalid(_)) => {
                            self.master_state = MasterState::DoneWithToken;
                            transition_now = true;
                        }
                        Some(Received::Valid(frame)) => {
                            self.master_state = if frame.destination == this_station {
                                self.reply_frame(frame)
                            } else {
                                // a broadcast while waiting means another node
                                // has a token, drop ours
                                MasterState::Idle
                            };
                            transition_now = true;
                        }
                    }
                }
            }

            MasterState::DoneWithToken => {
                if self.frame_count < self.config.max_info_frames() {
                    self.master_state = MasterState::UseToken;
                    transition_now = true;
                } else if !self.sole_master && self.next_station == this_station {
                    // no known successor
                    self.poll_station = next_this_station;
                    self.poll_for_master();
                } else if self.token_count < NPOLL - 1 {
                    if self.sole_master && self.next_station != next_this_station {
                        // no other master to pass the token to
                        self.frame_count = 0;
                        self.token_count += 1;
                        self.master_state = MasterState::UseToken;
                        transition_now = true;
                    } else {
                        self.token_count += 1;
                        self.pass_token();
                    }
                } else if next_poll_station == self.next_station {
                    if self.sole_master {
                        self.poll_station = next_next_station;
                        self.next_station = this_station;
                        self.token_count = 1;
                        self.poll_for_master();
                    } else {
                        self.poll_station = this_station;
                        self.token_count = 1;
                        self.pass_token();
                    }
                } else {
                    // maintenance poll of the next address between us and NS
                    self.poll_station = next_poll_station;
                    self.poll_for_master();
                }
            }

            MasterState::PassToken => {
                if silence <= timing.usage_timeout {
                    if self.assembler.event_count() > NMIN_OCTETS {
                        // the successor is using the token
                        self.master_state = MasterState::Idle;
                        transition_now = true;
                    }
                } else if self.retry_count < NRETRY_TOKEN {
                    self.retry_count += 1;
                    count(&mut self.statistics.token_retries);
                    debug!("Station {} silent, resending token", self.next_station);
                    self.send_token();
                } else {
                    warn!(
                        "Station {} did not use the token, looking for a new successor",
                        self.next_station
                    );
                    count(&mut self.statistics.lost_successors);
                    self.poll_station = next_next_station;
                    self.next_station = this_station;
                    self.token_count = 0;
                    self.poll_for_master();
                }
            }

            MasterState::NoToken => {
                let slot = |station: u32| timing.no_token + timing.slot * station;
                let my_timeout = slot(u32::from(*this_station));
                if silence < my_timeout {
                    if self.assembler.event_count() > NMIN_OCTETS {
                        // a node at a lower address has the token
                        self.master_state = MasterState::Idle;
                        transition_now = true;
                    }
                } else if silence < slot(u32::from(*this_station) + 1)
                    || silence > slot(u32::from(self.config.max_master()) + 1)
                {
                    info!("Station {} generating a token", this_station);
                    self.poll_station = next_this_station;
                    self.next_station = this_station;
                    self.token_count = 0;
                    self.poll_for_master();
                } else if self.assembler.event_count() > NMIN_OCTETS {
                    // missed our slot, someone else took it
                    self.master_state = MasterState::Idle;
                    transition_now = true;
                }
            }

            MasterState::PollForMaster => match self.assembler.take() {
                Some(Received::Valid(frame)) => {
                    if frame.destination == this_station
                        && frame.frame_type == FrameType::ReplyToPollForMaster
                    {
                        info!("Station {} found successor {}", this_station, frame.source);
                        self.sole_master = false;
                        self.next_station = frame.source;
                        self.poll_station = this_station;
                        self.token_count = 0;
                        self.pass_token();
                    } else {
                        self.master_state = MasterState::Idle;
                        transition_now = true;
                    }
                }
                received if silence > timing.usage_timeout || received.is_some() => {
                    if self.sole_master {
                        self.frame_count = 0;
                        self.master_state = MasterState::UseToken;
                        transition_now = true;
                    } else if self.next_station != this_station {
                        // done with the maintenance poll
                        self.pass_token();
                    } else if next_poll_station != this_station {
                        self.poll_station = next_poll_station;
                        self.poll_for_master();
                    } else {
                        info!("Station {} is the sole master", this_station);
                        self.sole_master = true;
                        self.frame_count = 0;
                        self.master_state = MasterState::UseToken;
                        transition_now = true;
                    }
                }
                _ => (),
            },

            MasterState::AnswerDataRequest => {
                transition_now = self.answer_data_request();
            }
        }

        if self.master_state != state {
            debug!(
                "TS={} NS={} PS={} EC={} TC={} ST={} {:?} -> {:?}",
                this_station,
                self.next_station,
                self.poll_station,
                self.assembler.event_count(),
                self.token_count,
                silence,
                state,
                self.master_state
            );
        }
        transition_now
    }

    /// A valid frame for this station arrived in the idle state.
    fn idle_frame(&mut self, frame: Frame) -> bool {
        let unicast = !frame.destination.is_broadcast();
        match frame.frame_type {
            FrameType::Token if unicast => {
                count(&mut self.statistics.tokens_received);
                self.frame_count = 0;
                self.sole_master = false;
                self.master_state = MasterState::UseToken;
                return true;
            }
            FrameType::PollForMaster if unicast => {
                self.send_frame(FrameType::ReplyToPollForMaster, frame.source, &[]);
            }
            FrameType::TestRequest if unicast => {
                self.send_frame(FrameType::TestResponse, frame.source, &frame.data);
            }
            FrameType::DataExpectingReply if unicast => {
                self.pending_request = Some(frame.source);
                self.timers.arm_reply_postponed();
                self.deliver(frame);
                self.master_state = MasterState::AnswerDataRequest;
            }
            FrameType::DataExpectingReply
            | FrameType::DataNotExpectingReply
            | FrameType::Proprietary(_) => self.deliver(frame),
            _ => (),
        }
        false
    }

    /// A valid frame for this station arrived while waiting for a reply.
    fn reply_frame(&mut self, frame: Frame) -> MasterState {
        match frame.frame_type {
            FrameType::ReplyPostponed => MasterState::DoneWithToken,
            FrameType::TestResponse
            | FrameType::DataNotExpectingReply
            | FrameType::Proprietary(_) => {
                self.deliver(frame);
                MasterState::DoneWithToken
            }
            _ => MasterState::Idle,
        }
    }

    fn answer_data_request(&mut self) -> bool {
        let requester = match self.pending_request {
            Some(requester) => requester,
            None => {
                self.master_state = MasterState::Idle;
                return true;
            }
        };
        let expired = self
            .timers
            .reply_postponed()
            .map_or(true, |t| t >= self.config.timing().reply_delay);

        match self.tx_pdu.as_ref().map(|pdu| pdu.address == requester) {
            Some(true) => {
                self.send_queued_pdu();
            }
            // a queued PDU for someone else won't be the reply
            Some(false) => self.postpone_reply(requester),
            None if expired => self.postpone_reply(requester),
            None => return false,
        }
        self.pending_request = None;
        self.timers.disarm_reply_postponed();
        self.master_state = MasterState::Idle;
        false
    }

    fn postpone_reply(&mut self, requester: Address) {
        debug!("Postponing reply to {}", requester);
        count(&mut self.statistics.replies_postponed);
        self.send_frame(FrameType::ReplyPostponed, requester, &[]);
    }

    fn send_token(&mut self) {
        self.assembler.reset_event_count();
        self.send_frame(FrameType::Token, self.next_station, &[]);
    }

    fn pass_token(&mut self) {
        self.retry_count = 0;
        self.send_token();
        self.master_state = MasterState::PassToken;
    }

    fn poll_for_master(&mut self) {
        self.retry_count = 0;
        self.send_frame(FrameType::PollForMaster, self.poll_station, &[]);
        self.master_state = MasterState::PollForMaster;
    }
}
