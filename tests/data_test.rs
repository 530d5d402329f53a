mod common;

use common::Rs485Bus;
use mstp_proto::{Address, FrameType, Pdu};

fn ring() -> Rs485Bus {
    let mut bus = Rs485Bus::new(&[1, 2], 3);
    bus.run_until(5000, |bus| {
        bus.port(1).next_station() == 2 && bus.port(2).next_station() == 1
    })
    .expect("Ring did not form");
    bus
}

/// Run until station `station` receives a PDU.
fn receive(bus: &mut Rs485Bus, station: u8, ms: u32) -> Pdu {
    let mut pdu = None;
    bus.run_until(ms, |bus| {
        pdu = bus.port(station).take_pdu();
        pdu.is_some()
    });
    pdu.expect("No PDU received")
}

#[test]
fn test_data_request_answered() {
    let mut bus = ring();
    bus.port(1)
        .send_pdu(2, FrameType::DataExpectingReply, b"ping")
        .unwrap();

    let request = receive(&mut bus, 2, 1000);
    assert_eq!(request.frame_type, FrameType::DataExpectingReply);
    assert_eq!(request.address, 1);
    assert_eq!(request.data.as_slice(), b"ping");
    bus.port(2)
        .send_pdu(request.address, FrameType::DataNotExpectingReply, b"pong")
        .unwrap();

    let reply = receive(&mut bus, 1, 100);
    assert_eq!(reply.address, 2);
    assert_eq!(reply.data.as_slice(), b"pong");
    assert_eq!(bus.port(2).statistics().replies_postponed, 0);
    assert_eq!(bus.port(1).statistics().reply_timeouts, 0);
}

#[test]
fn test_reply_postponed() {
    let mut bus = ring();
    bus.port(1)
        .send_pdu(2, FrameType::DataExpectingReply, b"slow")
        .unwrap();
    let request = receive(&mut bus, 2, 1000);

    // no reply within the reply delay
    bus.run_until(1000, |bus| bus.port(2).statistics().replies_postponed == 1)
        .expect("Reply was not postponed");
    bus.run(10);
    assert!(bus.sent.iter().any(|s| {
        s.frame.frame_type == FrameType::ReplyPostponed
            && s.frame.source == 2
            && s.frame.destination == 1
    }));

    // the late reply goes out when station 2 holds the token
    bus.port(2)
        .send_pdu(request.address, FrameType::DataNotExpectingReply, b"late")
        .unwrap();
    let reply = receive(&mut bus, 1, 1000);
    assert_eq!(reply.data.as_slice(), b"late");
    assert_eq!(bus.port(1).statistics().reply_timeouts, 0);
}

#[test]
fn test_echo() {
    let mut bus = ring();
    bus.port(1)
        .send_pdu(2, FrameType::TestRequest, b"echo")
        .unwrap();
    let response = receive(&mut bus, 1, 1000);
    assert_eq!(response.frame_type, FrameType::TestResponse);
    assert_eq!(response.address, 2);
    assert_eq!(response.data.as_slice(), b"echo");
}

#[test]
fn test_broadcast() {
    let mut bus = Rs485Bus::new(&[1, 2, 3], 3);
    bus.run(3000);
    bus.port(3)
        .send_pdu(Address::BROADCAST, FrameType::DataNotExpectingReply, b"all")
        .unwrap();
    let mut seen = [false; 2];
    bus.run_until(1000, |bus| {
        for (i, station) in [1, 2].iter().enumerate() {
            if let Some(pdu) = bus.port(*station).take_pdu() {
                assert_eq!(pdu.address, 3);
                assert_eq!(pdu.data.as_slice(), b"all");
                seen[i] = true;
            }
        }
        seen.iter().all(|s| *s)
    })
    .expect("Broadcast not received");
}
