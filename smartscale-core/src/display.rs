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

use crate::measurement::Measurement;
use crate::scheduler::{DisplayResetSignal, Pace, PeriodicTask, TaskPriority};
use crate::store::SharedMeasurementStore;
use embassy_time::Duration;

pub const DIGITS: usize = 4;

// gfedcba, bit 0 is the top segment
const DIGIT_SEGMENTS: [u8; 10] = [0x3f, 0x06, 0x5b, 0x4f, 0x66, 0x6d, 0x7d, 0x07, 0x7f, 0x6f];
const DASH_SEGMENTS: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Glyph {
    Blank,
    Dash,
    /// 0 to 9, anything larger renders blank
    Digit(u8),
}

impl Glyph {
    pub fn segments(self) -> u8 {
        match self {
            Glyph::Blank => 0,
            Glyph::Dash => DASH_SEGMENTS,
            Glyph::Digit(d) => DIGIT_SEGMENTS.get(d as usize).copied().unwrap_or(0),
        }
    }
}

/// Leftmost glyph first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayFrame(pub [Glyph; DIGITS]);

impl DisplayFrame {
    pub const DASHES: DisplayFrame = DisplayFrame([Glyph::Dash; DIGITS]);

    pub fn segments(&self) -> [u8; DIGITS] {
        self.0.map(Glyph::segments)
    }
}

/// Weights wider than the display lose their high-order digits.
pub fn render_frame(measurement: &Measurement) -> DisplayFrame {
    if !measurement.is_valid() {
        return DisplayFrame::DASHES;
    }

    let mut glyphs = [Glyph::Blank; DIGITS];
    let mut remaining = measurement.weight();
    for glyph in glyphs.iter_mut().rev() {
        *glyph = Glyph::Digit((remaining % 10) as u8);
        remaining /= 10;
        if remaining == 0 {
            break;
        }
    }
    DisplayFrame(glyphs)
}

#[allow(async_fn_in_trait)]
pub trait SegmentDisplay {
    type Error;

    async fn show(&mut self, frame: &DisplayFrame) -> Result<(), Self::Error>;
}

pub struct DisplayRenderer<'a, D> {
    display: D,
    store: &'a SharedMeasurementStore,
    reset: &'a DisplayResetSignal,
    period: Duration,
}

impl<'a, D> DisplayRenderer<'a, D>
where
    D: SegmentDisplay,
{
    pub fn new(
        display: D,
        store: &'a SharedMeasurementStore,
        reset: &'a DisplayResetSignal,
        period: Duration,
    ) -> Self {
        Self {
            display,
            store,
            reset,
            period,
        }
    }

    pub async fn render(&mut self) -> DisplayFrame {
        let frame = render_frame(&self.store.snapshot().await);
        if self.display.show(&frame).await.is_err() {
            warn!("display write failed");
        }
        frame
    }
}

impl<D> PeriodicTask for DisplayRenderer<'_, D>
where
    D: SegmentDisplay,
{
    const NAME: &'static str = "display";
    const PRIORITY: TaskPriority = TaskPriority::Background;

    fn period(&self) -> Duration {
        self.period
    }

    async fn run_cycle(&mut self) -> Pace {
        self.render().await;
        Pace::OnSchedule
    }

    async fn wake_early(&self) {
        self.reset.wait().await
    }
}
