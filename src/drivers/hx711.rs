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

use embassy_time::{Duration, Ticker, Timer};
use heapless::Vec;
use smartscale_core::calibration::mean_raw;
use smartscale_core::sampler::LoadCell;

#[allow(dead_code)]
pub enum Hx711Gain {
    Gain128,
    Gain64,
    Gain32ChannelB,
}

impl Hx711Gain {
    fn tick_count(&self) -> usize {
        match self {
            Hx711Gain::Gain128 => 25,
            Hx711Gain::Gain64 => 27,
            Hx711Gain::Gain32ChannelB => 26,
        }
    }
}

const POWER_MODE_CHANGE_DELAY: Duration = Duration::from_micros(60);
const CLK_HALF_PERIOD: Duration = Duration::from_micros(1);
const VALID_DATA_BITS: usize = 24;
const MAX_AVERAGED_READINGS: usize = 32;

#[derive(Debug)]
pub enum Error<OutPinE, InPinE> {
    OutPin(OutPinE),
    InPin(InPinE),
}

pub struct Hx711<CLK, DATA> {
    clock_pin: CLK,
    data_pin: DATA,
    gain_clocks: usize,
    powered_up: bool,
}

impl<CLK, DATA, ClkE, DataE> Hx711<CLK, DATA>
where
    CLK: embedded_hal::digital::OutputPin<Error = ClkE>,
    DATA: embedded_hal_async::digital::Wait<Error = DataE>
        + embedded_hal::digital::InputPin<Error = DataE>,
{
    pub fn new(clock_pin: CLK, data_pin: DATA, gain: Hx711Gain) -> Self {
        Self {
            clock_pin,
            data_pin,
            gain_clocks: gain.tick_count(),
            powered_up: false,
        }
    }

    pub async fn power_up(&mut self) -> Result<(), Error<ClkE, DataE>> {
        self.clock_pin.set_low().map_err(Error::OutPin)?;
        Timer::after(POWER_MODE_CHANGE_DELAY).await;
        self.powered_up = true;
        Ok(())
    }

    async fn next_reading(&mut self) -> Result<i32, Error<ClkE, DataE>> {
        let mut clock_ticker = Ticker::every(CLK_HALF_PERIOD);

        if !self.powered_up {
            self.power_up().await?;
        }

        self.data_pin.wait_for_low().await.map_err(Error::InPin)?; // DOUT goes low when conversion is ready
        let mut data: i32 = 0;

        clock_ticker.next().await;
        for _ in 0..self.gain_clocks {
            data <<= 1;
            self.clock_pin.set_high().map_err(Error::OutPin)?;
            clock_ticker.next().await;
            self.clock_pin.set_low().map_err(Error::OutPin)?;
            if self.data_pin.is_high().map_err(Error::InPin)? {
                data |= 0x1;
            }
            clock_ticker.next().await;
        }

        // the trailing gain select clocks shift in nothing useful
        data >>= self.gain_clocks - VALID_DATA_BITS;
        data &= (1 << VALID_DATA_BITS) - 1;
        if (data >> 23) & 0x1 == 0x1 {
            data |= 0xFF000000u32 as i32;
        }
        Ok(data)
    }
}

impl<CLK, DATA, ClkE, DataE> LoadCell for Hx711<CLK, DATA>
where
    CLK: embedded_hal::digital::OutputPin<Error = ClkE>,
    DATA: embedded_hal_async::digital::Wait<Error = DataE>
        + embedded_hal::digital::InputPin<Error = DataE>,
{
    type Error = Error<ClkE, DataE>;

    fn is_ready(&mut self) -> bool {
        self.powered_up && self.data_pin.is_low().unwrap_or(false)
    }

    async fn read_average(&mut self, samples: u8) -> Result<i32, Self::Error> {
        let samples = (samples as usize).clamp(1, MAX_AVERAGED_READINGS);
        let mut readings = Vec::<i32, MAX_AVERAGED_READINGS>::new();
        for _ in 0..samples {
            let reading = self.next_reading().await?;
            // bounded by the clamp above
            let _ = readings.push(reading);
        }
        Ok(mean_raw(&readings).unwrap_or_default())
    }
}
