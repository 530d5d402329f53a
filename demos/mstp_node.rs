//! Run a master node on a serial port, printing the PDUs it receives.
//!
//! ```text
//! mstp_node /dev/ttyUSB0 12 38400 [ping station]
//! ```
//! With a ping station, a test request is sent to it every five seconds.

use anyhow::{ensure, Context, Result};
use std::time::{Duration, Instant};

use mstp_proto::io::{spawn_reader, Driver};
use mstp_proto::{Config, FrameType, Port, Timing};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port_name = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let station: u8 = args.next().unwrap_or_else(|| "1".to_string()).parse()?;
    let baud: u32 = args.next().unwrap_or_else(|| "38400".to_string()).parse()?;
    let ping: Option<u8> = args.next().map(|s| s.parse()).transpose()?;
    ensure!(baud > 0, "Baud rate must be positive");

    let serial = serialport::new(&port_name, baud)
        .timeout(Duration::from_millis(10))
        .open()
        .with_context(|| format!("Failed to open {}", port_name))?;
    let reader = serial.try_clone().context("Failed to clone serial port")?;

    let config = Config::new(station)?.with_timing(Timing::default().with_baud_rate(baud));
    let (_reader, events) = spawn_reader(reader)?;
    let mut driver = Driver::new(Port::new(config), serial, events);

    let mut last_ping = Instant::now();
    loop {
        driver.pump()?;
        let port = driver.port_mut();
        if let Some(pdu) = port.take_pdu() {
            println!(
                "{:?} from {}: {:02X?}",
                pdu.frame_type,
                pdu.address,
                pdu.data.as_slice()
            );
        }
        if let Some(destination) = ping {
            if last_ping.elapsed() > Duration::from_secs(5) && !port.pdu_pending() {
                port.send_pdu(destination, FrameType::TestRequest, b"ping")?;
                last_ping = Instant::now();
            }
        }
        if !port.is_bus_active() && last_ping.elapsed() > Duration::from_secs(5) {
            println!("line silent, {:?}", port.statistics());
            last_ping = Instant::now();
        }
    }
}
