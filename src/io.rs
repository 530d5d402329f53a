//! Glue between a [`Port`] and a blocking byte stream such as a serial port.
//!
//! A reader thread pushes [`RxEvent`]s into a channel, and a [`Driver`]
//! owned by a single thread drains it, keeps the millisecond tick and
//! writes frames to the line.

use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use snafu::{ResultExt, Snafu};

use crate::port::Port;
use crate::receive::RxStatus;

/// Errors from the std transport glue.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Writing a frame to the line failed.
    #[snafu(display("Failed to write frame"))]
    Write { source: std::io::Error },
    /// Spawning the reader thread failed.
    #[snafu(display("Failed to spawn reader thread"))]
    Spawn { source: std::io::Error },
    /// The reader thread has stopped.
    #[snafu(display("Line reader has stopped"))]
    Disconnected,
}

/// Something the line reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    Octet(u8),
    /// A framing, parity or overrun error.
    Error,
}

/// Spawn a thread reading octets from `reader` into a channel.
///
/// Read timeouts are ignored, the thread runs until the reader reports end
/// of file or an error, or the receiving end of the channel is dropped.
/// Invalid data errors are passed on as [`RxEvent::Error`].
pub fn spawn_reader<R>(
    mut reader: R,
) -> Result<(JoinHandle<std::io::Result<()>>, Receiver<RxEvent>), Error>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("mstp-reader".into())
        .spawn(move || read_loop(&mut reader, &tx))
        .context(SpawnSnafu)?;
    Ok((handle, rx))
}

fn read_loop<R: Read>(reader: &mut R, tx: &Sender<RxEvent>) -> std::io::Result<()> {
    let mut buf = [0; 64];
    loop {
        let events = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(len) => {
                trace!("Read {:02x?}", &buf[..len]);
                buf[..len].iter().map(|&b| tx.send(RxEvent::Octet(b))).collect()
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => tx.send(RxEvent::Error),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(())
            }
            Err(e) => return Err(e),
        };
        if events.is_err() {
            debug!("Driver is gone, reader stopping");
            return Ok(());
        }
    }
}

/// Drives a [`Port`] from a channel of [`RxEvent`]s and writes its frames to `W`.
pub struct Driver<W> {
    port: Port,
    writer: W,
    events: Receiver<RxEvent>,
    last_tick: Instant,
}

impl<W: Write> Driver<W> {
    pub fn new(port: Port, writer: W, events: Receiver<RxEvent>) -> Self {
        Self {
            port,
            writer,
            events,
            last_tick: Instant::now(),
        }
    }

    pub fn port(&self) -> &Port {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut Port {
        &mut self.port
    }

    pub fn into_inner(self) -> (Port, W) {
        (self.port, self.writer)
    }

    /// Wait up to one millisecond for line events, bring the timers up to
    /// date, feed the events, then run the node and transmit.
    ///
    /// The timers are advanced first: events still queued when the pump runs
    /// late arrived after that silence, and a partial frame before the gap
    /// must time out before they are fed.
    ///
    /// # Errors
    /// [`Error::Disconnected`] once the reader has stopped and all its
    /// events have been processed, [`Error::Write`] if the line can't be written.
    pub fn pump(&mut self) -> Result<(), Error> {
        let first = match self.events.recv_timeout(Duration::from_millis(1)) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => return DisconnectedSnafu.fail(),
        };

        let elapsed = self.last_tick.elapsed().as_millis();
        for _ in 0..elapsed {
            self.port.tick();
        }
        // keep the sub-millisecond remainder for the next round
        self.last_tick += Duration::from_millis(elapsed as u64);
        self.port.poll();

        if let Some(event) = first {
            self.feed(event);
            while let Ok(event) = self.events.try_recv() {
                self.feed(event);
            }
        }

        self.port.poll();
        if let Some(send) = self.port.transmit() {
            self.writer.write_all(send.get_data()).context(WriteSnafu)?;
            self.writer.flush().context(WriteSnafu)?;
            send.data_sent();
        }
        Ok(())
    }

    /// Pump for `duration`.
    pub fn run_for(&mut self, duration: Duration) -> Result<(), Error> {
        let start = Instant::now();
        while start.elapsed() < duration {
            self.pump()?;
        }
        Ok(())
    }

    /// Feed one event, running the node on each completed frame so that a
    /// backlog of frames is not dropped.
    fn feed(&mut self, event: RxEvent) {
        let status = match event {
            RxEvent::Octet(octet) => self.port.receive_octet(octet),
            RxEvent::Error => {
                warn!("Receive error");
                self.port.receive_error()
            }
        };
        if status != RxStatus::Assembling {
            self.port.poll();
        }
    }
}
