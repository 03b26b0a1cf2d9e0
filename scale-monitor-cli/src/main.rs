// Copyright (C) 2025 Paul Hampson
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License version 3 as  published by the
// Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

mod util;

use smartscale_core::protocol::{
    decode_weight, encode_command, ControlCommand, LineAssembler, ProtocolError, FRAME_CAPACITY,
};
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use std::time::Duration;

type Port = Box<dyn serialport::SerialPort>;

fn send_tare(serial: &mut Port) -> IoResult<()> {
    let command = encode_command(ControlCommand::Tare)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("{:?}", e)))?;
    serial.write_all(&command)?;
    serial.write_all(b"\n")?;
    serial.flush()?;
    log::info!("Tare requested");
    Ok(())
}

fn report_line(line: Result<&[u8], ProtocolError>) {
    match line.and_then(decode_weight) {
        Ok(weight) => println!("{} g", weight),
        Err(e) => log::warn!("Discarding frame: {:?}", e),
    }
}

/// Prints weight frames until the port closes.
fn monitor(serial: &mut Port) -> IoResult<()> {
    let mut lines = LineAssembler::<FRAME_CAPACITY>::new();
    let mut buffer = [0u8; 64];

    loop {
        let received = match serial.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(received) => received,
            // the scale publishes once a second, a quiet period is normal
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(e),
        };
        log::trace!("Read {} bytes", received);

        for &byte in &buffer[..received] {
            if let Some(line) = lines.push(byte) {
                report_line(line);
            }
        }
    }
}

fn main() -> IoResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    env_logger::Builder::from_default_env()
        .filter_level(util::parse_log_level(&args))
        .format_timestamp_millis()
        .init();

    log::info!("SmartScale Monitor");

    let port_name = match util::extract_port(&args) {
        Some(port_name) => port_name,
        None => {
            let ports = serialport::available_ports()
                .map_err(|e| IoError::new(ErrorKind::Other, e.to_string()))?;
            for port in &ports {
                log::info!("  - {}", port.port_name);
            }
            ports
                .first()
                .map(|port| port.port_name.clone())
                .ok_or_else(|| IoError::new(ErrorKind::NotFound, "No serial ports found"))?
        }
    };

    log::info!("Connecting to: {}", port_name);
    let mut serial = serialport::new(&port_name, 115200)
        .timeout(Duration::from_secs(5))
        .open()
        .map_err(|e| IoError::new(ErrorKind::ConnectionRefused, e.to_string()))?;
    serial
        .write_data_terminal_ready(true)
        .map_err(|e| IoError::new(ErrorKind::Other, e.to_string()))?;
    log::info!("Connected successfully!");

    if util::wants_tare(&args) {
        send_tare(&mut serial)?;
    }

    monitor(&mut serial)
}
