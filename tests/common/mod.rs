#![allow(dead_code)]

use mstp_proto::frame::{self, Decoded};
use mstp_proto::{Config, Frame, FrameType, Port, Timing};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A frame put on the line.
#[derive(Debug, Clone)]
pub struct Sent {
    pub at: u32,
    pub frame: Frame,
}

pub struct Node {
    pub port: Port,
    /// A dead node neither runs nor hears the line.
    pub alive: bool,
}

/// Simulated RS-485 line. Every node is ticked once per step, and frames are
/// delivered to all other live nodes as soon as they are transmitted.
pub struct Rs485Bus {
    pub nodes: Vec<Node>,
    pub now: u32,
    pub sent: Vec<Sent>,
}

impl Rs485Bus {
    pub fn new(stations: &[u8], max_master: u8) -> Self {
        Self::with_timing(stations, max_master, Timing::default())
    }

    pub fn with_timing(stations: &[u8], max_master: u8, timing: Timing) -> Self {
        init_logger();
        let nodes = stations
            .iter()
            .map(|&station| {
                let config = Config::new(station)
                    .and_then(|c| c.with_max_master(max_master))
                    .unwrap()
                    .with_timing(timing);
                Node {
                    port: Port::new(config),
                    alive: true,
                }
            })
            .collect();
        Self {
            nodes,
            now: 0,
            sent: Vec::new(),
        }
    }

    pub fn port(&mut self, station: u8) -> &mut Port {
        &mut self.node(station).port
    }

    pub fn node(&mut self, station: u8) -> &mut Node {
        self.nodes
            .iter_mut()
            .find(|n| n.port.this_station() == station)
            .expect("No such station")
    }

    /// Advance the line by one millisecond.
    pub fn step(&mut self) {
        self.now += 1;
        for i in 0..self.nodes.len() {
            if !self.nodes[i].alive {
                continue;
            }
            let port = &mut self.nodes[i].port;
            port.tick();
            port.poll();
            let bytes = match port.transmit() {
                Some(send) => {
                    let bytes = send.get_data().to_vec();
                    send.data_sent();
                    bytes
                }
                None => continue,
            };
            self.record(&bytes);
            self.deliver(Some(i), &bytes);
        }
    }

    pub fn run(&mut self, ms: u32) {
        for _ in 0..ms {
            self.step();
        }
    }

    /// Step until `done` returns true, at most `ms` steps. Returns the number
    /// of steps taken.
    pub fn run_until<F>(&mut self, ms: u32, mut done: F) -> Option<u32>
    where
        F: FnMut(&mut Self) -> bool,
    {
        for n in 1..=ms {
            self.step();
            if done(self) {
                return Some(n);
            }
        }
        None
    }

    /// Put raw octets on the line, as noise or a foreign transmitter would.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.deliver(None, bytes);
    }

    /// Stations currently holding the token.
    pub fn token_holders(&self) -> Vec<u8> {
        self.nodes
            .iter()
            .filter(|n| n.alive && n.port.has_token())
            .map(|n| *n.port.this_station())
            .collect()
    }

    /// Tokens sent to `station` after `since`.
    pub fn tokens_to(&self, station: u8, since: u32) -> usize {
        self.sent
            .iter()
            .filter(|s| {
                s.at > since
                    && s.frame.frame_type == FrameType::Token
                    && s.frame.destination == station
            })
            .count()
    }

    fn deliver(&mut self, from: Option<usize>, bytes: &[u8]) {
        for (j, node) in self.nodes.iter_mut().enumerate() {
            if Some(j) == from || !node.alive {
                continue;
            }
            for &b in bytes {
                node.port.receive_octet(b);
            }
        }
    }

    fn record(&mut self, bytes: &[u8]) {
        if let (_, Decoded::Frame(frame)) = frame::decode(bytes) {
            self.sent.push(Sent {
                at: self.now,
                frame,
            });
        }
    }
}
