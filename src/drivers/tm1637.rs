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

//! Bit-banged driver for the TM1637 4 digit LED module.
//!
//! The two wire bus looks like I2C but is LSB first and has no address. DIO
//! must be open drain with a pull-up so the chip can pull it low to ack.

use embassy_time::{Duration, Timer};
use smartscale_core::display::{DisplayFrame, SegmentDisplay};

const CMD_DATA_AUTO_INCREMENT: u8 = 0x40;
const CMD_ADDRESS_FIRST_DIGIT: u8 = 0xC0;
const CMD_DISPLAY_ON: u8 = 0x88;
const MAX_BRIGHTNESS: u8 = 7;

const BIT_DELAY: Duration = Duration::from_micros(5);

#[derive(Debug)]
pub enum Error<ClkE, DioE> {
    Clock(ClkE),
    Data(DioE),
    /// The module did not pull DIO low after a byte
    NoAck,
}

pub struct Tm1637<CLK, DIO> {
    clock_pin: CLK,
    data_pin: DIO,
    brightness: u8,
}

impl<CLK, DIO, ClkE, DioE> Tm1637<CLK, DIO>
where
    CLK: embedded_hal::digital::OutputPin<Error = ClkE>,
    DIO: embedded_hal::digital::OutputPin<Error = DioE>
        + embedded_hal::digital::InputPin<Error = DioE>,
{
    /// `brightness` is 0 to 7, larger values are clamped.
    pub fn new(clock_pin: CLK, data_pin: DIO, brightness: u8) -> Self {
        Self {
            clock_pin,
            data_pin,
            brightness: brightness.min(MAX_BRIGHTNESS),
        }
    }

    async fn write_segments(&mut self, segments: &[u8]) -> Result<(), Error<ClkE, DioE>> {
        self.command(&[CMD_DATA_AUTO_INCREMENT]).await?;

        self.start().await?;
        self.write_byte(CMD_ADDRESS_FIRST_DIGIT).await?;
        for &segment in segments {
            self.write_byte(segment).await?;
        }
        self.stop().await?;

        self.command(&[CMD_DISPLAY_ON | self.brightness]).await
    }

    async fn command(&mut self, bytes: &[u8]) -> Result<(), Error<ClkE, DioE>> {
        self.start().await?;
        for &byte in bytes {
            self.write_byte(byte).await?;
        }
        self.stop().await
    }

    async fn start(&mut self) -> Result<(), Error<ClkE, DioE>> {
        self.data_pin.set_high().map_err(Error::Data)?;
        self.clock_pin.set_high().map_err(Error::Clock)?;
        Timer::after(BIT_DELAY).await;
        self.data_pin.set_low().map_err(Error::Data)?;
        Timer::after(BIT_DELAY).await;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), Error<ClkE, DioE>> {
        self.clock_pin.set_low().map_err(Error::Clock)?;
        self.data_pin.set_low().map_err(Error::Data)?;
        Timer::after(BIT_DELAY).await;
        self.clock_pin.set_high().map_err(Error::Clock)?;
        Timer::after(BIT_DELAY).await;
        self.data_pin.set_high().map_err(Error::Data)?;
        Timer::after(BIT_DELAY).await;
        Ok(())
    }

    async fn write_byte(&mut self, byte: u8) -> Result<(), Error<ClkE, DioE>> {
        for bit in 0..8 {
            self.clock_pin.set_low().map_err(Error::Clock)?;
            if byte & (1 << bit) != 0 {
                self.data_pin.set_high().map_err(Error::Data)?;
            } else {
                self.data_pin.set_low().map_err(Error::Data)?;
            }
            Timer::after(BIT_DELAY).await;
            self.clock_pin.set_high().map_err(Error::Clock)?;
            Timer::after(BIT_DELAY).await;
        }

        // release DIO and clock in the ack
        self.clock_pin.set_low().map_err(Error::Clock)?;
        self.data_pin.set_high().map_err(Error::Data)?;
        Timer::after(BIT_DELAY).await;
        self.clock_pin.set_high().map_err(Error::Clock)?;
        Timer::after(BIT_DELAY).await;
        let acked = self.data_pin.is_low().map_err(Error::Data)?;
        self.clock_pin.set_low().map_err(Error::Clock)?;
        Timer::after(BIT_DELAY).await;

        if acked { Ok(()) } else { Err(Error::NoAck) }
    }
}

impl<CLK, DIO, ClkE, DioE> SegmentDisplay for Tm1637<CLK, DIO>
where
    CLK: embedded_hal::digital::OutputPin<Error = ClkE>,
    DIO: embedded_hal::digital::OutputPin<Error = DioE>
        + embedded_hal::digital::InputPin<Error = DioE>,
{
    type Error = Error<ClkE, DioE>;

    async fn show(&mut self, frame: &DisplayFrame) -> Result<(), Self::Error> {
        self.write_segments(&frame.segments()).await
    }
}
