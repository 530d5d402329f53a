mod common;

use common::Rs485Bus;
use mstp_proto::{FrameType, SlaveState};

const MASTER: u8 = 1;
const SLAVE: u8 = 200;

fn bus() -> Rs485Bus {
    let mut bus = Rs485Bus::new(&[MASTER, SLAVE], 3);
    bus.run_until(3000, |bus| bus.port(MASTER).is_sole_master())
        .expect("Master did not take over the line");
    bus
}

#[test]
fn test_slave_is_not_polled_into_the_ring() {
    let mut bus = bus();
    bus.run(2000);
    assert_eq!(bus.port(MASTER).next_station(), MASTER);
    assert!(!bus
        .sent
        .iter()
        .any(|s| s.frame.source == SLAVE || s.frame.destination == SLAVE));
}

#[test]
fn test_slave_answers_request() {
    let mut bus = bus();
    bus.port(MASTER)
        .send_pdu(SLAVE, FrameType::DataExpectingReply, b"read")
        .unwrap();

    let mut request = None;
    bus.run_until(500, |bus| {
        request = bus.port(SLAVE).take_pdu();
        request.is_some()
    });
    let request = request.expect("Slave got no request");
    assert_eq!(request.address, MASTER);
    assert_eq!(bus.port(SLAVE).slave_state(), SlaveState::AnswerDataRequest);
    bus.port(SLAVE)
        .send_pdu(MASTER, FrameType::DataNotExpectingReply, b"value")
        .unwrap();

    let mut reply = None;
    bus.run_until(100, |bus| {
        reply = bus.port(MASTER).take_pdu();
        reply.is_some()
    });
    let reply = reply.expect("Master got no reply");
    assert_eq!(reply.address, SLAVE);
    assert_eq!(reply.data.as_slice(), b"value");
    assert_eq!(bus.port(SLAVE).slave_state(), SlaveState::Idle);
}

#[test]
fn test_unanswered_request_times_out() {
    let mut bus = bus();
    bus.port(MASTER)
        .send_pdu(SLAVE, FrameType::DataExpectingReply, b"read")
        .unwrap();
    bus.run_until(1000, |bus| bus.port(MASTER).statistics().reply_timeouts == 1)
        .expect("No reply timeout");
    assert_eq!(bus.port(SLAVE).slave_state(), SlaveState::Idle);
    assert!(!bus
        .sent
        .iter()
        .any(|s| s.frame.frame_type == FrameType::ReplyPostponed));
}

#[test]
fn test_slave_echo() {
    let mut bus = bus();
    bus.port(MASTER)
        .send_pdu(SLAVE, FrameType::TestRequest, b"are you there")
        .unwrap();
    let mut response = None;
    bus.run_until(500, |bus| {
        response = bus.port(MASTER).take_pdu();
        response.is_some()
    });
    let response = response.expect("No test response");
    assert_eq!(response.frame_type, FrameType::TestResponse);
    assert_eq!(response.data.as_slice(), b"are you there");
}
