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

//! Text frames exchanged with observers over the telemetry link.
//!
//! Frames are newline delimited on the wire; the functions here deal with a
//! single frame with the delimiter already removed. The scale sends
//! `{"weight":N}` (or a bare `N` in plain text mode) and accepts
//! `{"command":"tare"}` or the plain text forms `tare` and `Taring the Scale`.

use crate::config::PayloadFormat;
use core::fmt::Write;
use serde::{Deserialize, Serialize};

pub const FRAME_CAPACITY: usize = 32;

/// One encoded frame, without the line delimiter.
pub type TelemetryFrame = heapless::Vec<u8, FRAME_CAPACITY>;

const TARE_COMMAND: &str = "tare";
const LEGACY_TARE_COMMAND: &str = "Taring the Scale";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    FrameTooLong,
    Malformed,
    UnknownCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlCommand {
    Tare,
}

#[derive(Serialize, Deserialize)]
struct WeightMessage {
    weight: u32,
}

#[derive(Serialize, Deserialize)]
struct CommandMessage<'a> {
    command: &'a str,
}

pub fn encode_weight(weight: u32, format: PayloadFormat) -> Result<TelemetryFrame, ProtocolError> {
    match format {
        PayloadFormat::Json => {
            let mut frame = TelemetryFrame::new();
            frame
                .resize_default(FRAME_CAPACITY)
                .map_err(|_| ProtocolError::FrameTooLong)?;
            let len = serde_json_core::to_slice(&WeightMessage { weight }, &mut frame)
                .map_err(|_| ProtocolError::FrameTooLong)?;
            frame.truncate(len);
            Ok(frame)
        }
        PayloadFormat::PlainText => {
            let mut text = heapless::String::<FRAME_CAPACITY>::new();
            write!(text, "{}", weight).map_err(|_| ProtocolError::FrameTooLong)?;
            Ok(text.into_bytes())
        }
    }
}

/// Accepts either payload format.
pub fn decode_weight(frame: &[u8]) -> Result<u32, ProtocolError> {
    let text = trimmed_text(frame)?;
    if text.starts_with('{') {
        let (message, _) = serde_json_core::from_str::<WeightMessage>(text)
            .map_err(|_| ProtocolError::Malformed)?;
        Ok(message.weight)
    } else {
        text.parse::<u32>().map_err(|_| ProtocolError::Malformed)
    }
}

pub fn parse_command(frame: &[u8]) -> Result<ControlCommand, ProtocolError> {
    let text = trimmed_text(frame)?;
    let command = if text.starts_with('{') {
        let (message, _) = serde_json_core::from_str::<CommandMessage>(text)
            .map_err(|_| ProtocolError::Malformed)?;
        message.command.trim()
    } else {
        text
    };

    if command.is_empty() {
        Err(ProtocolError::Malformed)
    } else if command.eq_ignore_ascii_case(TARE_COMMAND)
        || command.eq_ignore_ascii_case(LEGACY_TARE_COMMAND)
    {
        Ok(ControlCommand::Tare)
    } else {
        Err(ProtocolError::UnknownCommand)
    }
}

pub fn encode_command(command: ControlCommand) -> Result<TelemetryFrame, ProtocolError> {
    let name = match command {
        ControlCommand::Tare => TARE_COMMAND,
    };

    let mut frame = TelemetryFrame::new();
    frame
        .resize_default(FRAME_CAPACITY)
        .map_err(|_| ProtocolError::FrameTooLong)?;
    let len = serde_json_core::to_slice(&CommandMessage { command: name }, &mut frame)
        .map_err(|_| ProtocolError::FrameTooLong)?;
    frame.truncate(len);
    Ok(frame)
}

/// Splits a byte stream into newline terminated lines of at most `N` bytes.
/// A line that overruns is reported once, at its newline, and discarded.
pub struct LineAssembler<const N: usize> {
    line: heapless::Vec<u8, N>,
    overflowed: bool,
    complete: bool,
}

impl<const N: usize> LineAssembler<N> {
    pub const fn new() -> Self {
        Self {
            line: heapless::Vec::new(),
            overflowed: false,
            complete: false,
        }
    }

    /// Returns the finished line, without its newline, when `byte` ends one.
    pub fn push(&mut self, byte: u8) -> Option<Result<&[u8], ProtocolError>> {
        if self.complete {
            self.line.clear();
            self.complete = false;
        }

        if byte == b'\n' {
            self.complete = true;
            if core::mem::take(&mut self.overflowed) {
                return Some(Err(ProtocolError::FrameTooLong));
            }
            return Some(Ok(self.line.as_slice()));
        }

        if !self.overflowed && self.line.push(byte).is_err() {
            self.overflowed = true;
        }
        None
    }
}

impl<const N: usize> Default for LineAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn trimmed_text(frame: &[u8]) -> Result<&str, ProtocolError> {
    core::str::from_utf8(frame)
        .map(str::trim)
        .map_err(|_| ProtocolError::Malformed)
}
