//! Print the MS/TP frames seen on a serial port, or decode a capture file.
//!
//! ```text
//! mstp_monitor /dev/ttyUSB0 38400
//! mstp_monitor capture.bin
//! ```

use anyhow::{ensure, Context, Result};
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use mstp_proto::frame::{self, Decoded};
use mstp_proto::receive::{Assembler, Received, RxStatus};
use mstp_proto::timer::Timers;

fn print_received(received: Option<Received>, at: Duration) {
    match received {
        Some(Received::Valid(frame)) => {
            println!("{:>10.3} {} {:02X?}", at.as_secs_f32(), frame, frame.data.as_slice())
        }
        Some(Received::Invalid(Some(header))) => println!(
            "{:>10.3} invalid {:?} {} -> {} [{} bytes]",
            at.as_secs_f32(),
            header.frame_type,
            header.source,
            header.destination,
            header.length
        ),
        Some(Received::Invalid(None)) => println!("{:>10.3} invalid header", at.as_secs_f32()),
        None => (),
    }
}

fn decode_file(path: &Path) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut buf = data.as_slice();
    let (mut frames, mut invalid, mut garbage) = (0, 0, 0);
    loop {
        match frame::decode(buf) {
            (_, Decoded::NeedData) => break,
            (n, Decoded::Frame(frame)) => {
                frames += 1;
                println!("{} {:02X?}", frame, frame.data.as_slice());
                buf = &buf[n..];
            }
            (n, Decoded::Invalid(header)) => {
                invalid += 1;
                println!("invalid {:?}", header);
                buf = &buf[n..];
            }
            (n, Decoded::Garbage) => {
                garbage += n;
                buf = &buf[n..];
            }
        }
    }
    println!(
        "{} frames, {} invalid, {} octets of garbage, {} octets left over",
        frames,
        invalid,
        garbage,
        buf.len()
    );
    Ok(())
}

fn monitor(port_name: &str, baud: u32) -> Result<()> {
    let mut serial = serialport::new(port_name, baud)
        .timeout(Duration::from_millis(5))
        .open()
        .with_context(|| format!("Failed to open {}", port_name))?;

    let mut assembler = Assembler::default();
    let mut timers = Timers::new();
    let start = Instant::now();
    let mut last_tick = start;
    let mut buf = [0; 256];
    loop {
        let len = match serial.read(&mut buf) {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
            Err(e) => return Err(e).context("Serial port read failed"),
        };

        let elapsed = last_tick.elapsed().as_millis();
        for _ in 0..elapsed {
            timers.tick();
            if assembler.check_timeout(&timers) != RxStatus::Assembling {
                print_received(assembler.take(), start.elapsed());
            }
        }
        last_tick += Duration::from_millis(elapsed as u64);

        for &octet in &buf[..len] {
            match assembler.receive_octet(octet, &mut timers) {
                RxStatus::Assembling => (),
                RxStatus::Dropped => println!("frame dropped"),
                _ => print_received(assembler.take(), start.elapsed()),
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let source = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud = match args.next() {
        Some(baud) => baud.parse().context("Invalid baud rate")?,
        None => 38400,
    };
    ensure!(baud > 0, "Baud rate must be positive");

    let path = Path::new(&source);
    if path.is_file() {
        decode_file(path)
    } else {
        monitor(&source, baud)
    }
}
