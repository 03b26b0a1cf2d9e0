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

use crate::calibration::to_weight;
use crate::config::ScaleConfig;
use crate::measurement::{Measurement, OutOfRange};
use crate::scheduler::{DisplayResetSignal, Pace, PeriodicTask, TareRequestSignal, TaskPriority};
use crate::store::SharedMeasurementStore;
use embassy_time::{Duration, Instant, Timer};

/// Raw access to the strain gauge amplifier.
#[allow(async_fn_in_trait)]
pub trait LoadCell {
    type Error;

    /// True when a conversion is waiting to be read.
    fn is_ready(&mut self) -> bool;

    /// Mean of `samples` consecutive conversions, in raw counts.
    async fn read_average(&mut self, samples: u8) -> Result<i32, Self::Error>;
}

#[derive(Debug)]
pub enum SamplerError<E> {
    NotReady,
    LoadCell(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TareError {
    /// The load cell was not ready or its read failed; the offset is unchanged
    LoadCellUnavailable,
}

/// What a single sampling cycle committed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleOutcome {
    Valid(u32),
    Unavailable,
    OutOfRange(i32),
}

pub struct SensorSampler<'a, L> {
    load_cell: L,
    store: &'a SharedMeasurementStore,
    display_reset: &'a DisplayResetSignal,
    tare_request: &'a TareRequestSignal,
    config: ScaleConfig,
}

impl<'a, L> SensorSampler<'a, L>
where
    L: LoadCell,
{
    pub fn new(
        load_cell: L,
        store: &'a SharedMeasurementStore,
        display_reset: &'a DisplayResetSignal,
        tare_request: &'a TareRequestSignal,
        config: ScaleConfig,
    ) -> Self {
        Self {
            load_cell,
            store,
            display_reset,
            tare_request,
            config,
        }
    }

    #[cfg(test)]
    pub(crate) fn load_cell_mut(&mut self) -> &mut L {
        &mut self.load_cell
    }

    async fn read_raw(&mut self, samples: u8) -> Result<i32, SamplerError<L::Error>> {
        if !self.load_cell.is_ready() {
            return Err(SamplerError::NotReady);
        }
        self.load_cell
            .read_average(samples)
            .await
            .map_err(SamplerError::LoadCell)
    }

    /// Zero the scale on a fresh averaged reading of whatever is on it now.
    /// Returns the new offset.
    pub async fn tare(&mut self) -> Result<i32, TareError> {
        let raw = match self.read_raw(self.config.tare_samples).await {
            Ok(raw) => raw,
            Err(SamplerError::NotReady) => return Err(TareError::LoadCellUnavailable),
            Err(SamplerError::LoadCell(_)) => {
                warn!("load cell read failed during tare");
                return Err(TareError::LoadCellUnavailable);
            }
        };

        self.store
            .with_exclusive_access(|state| state.calibration = state.calibration.tare(raw))
            .await;
        Ok(raw)
    }

    /// Start-up tare. Retries until the load cell answers.
    pub async fn initialise(&mut self) -> i32 {
        loop {
            if let Ok(offset) = self.tare().await {
                info!("initial tare offset {}", offset);
                return offset;
            }
            warn!("load cell not ready, waiting to tare");
            Timer::after(self.config.not_ready_backoff).await;
        }
    }

    /// Applies a tare asked for since the last cycle, if any.
    pub async fn handle_tare_request(&mut self) -> Option<Result<i32, TareError>> {
        self.tare_request.try_take()?;
        let result = self.tare().await;
        match result {
            Ok(offset) => info!("tare accepted, offset {}", offset),
            Err(e) => warn!("tare refused: {:?}", e),
        }
        Some(result)
    }

    /// Takes one reading and commits the resulting measurement.
    pub async fn sample(&mut self) -> SampleOutcome {
        let raw = match self.read_raw(self.config.samples_per_reading).await {
            Ok(raw) => raw,
            Err(e) => {
                let now = Instant::now();
                self.store
                    .with_exclusive_access(|state| state.measurement = Measurement::invalid(now))
                    .await;
                match e {
                    SamplerError::NotReady => warn!("load cell not ready"),
                    SamplerError::LoadCell(_) => warn!("load cell read failed"),
                }
                return SampleOutcome::Unavailable;
            }
        };

        let max_capacity_grams = self.config.max_capacity_grams;
        let now = Instant::now();
        let classified = self
            .store
            .with_exclusive_access(|state| {
                let grams = to_weight(raw, &state.calibration);
                let classified = Measurement::classify(grams, max_capacity_grams, now);
                state.measurement = classified.unwrap_or(Measurement::invalid(now));
                classified
            })
            .await;

        match classified {
            Ok(measurement) => {
                trace!("raw {} is {} g", raw, measurement.weight());
                SampleOutcome::Valid(measurement.weight())
            }
            Err(OutOfRange {
                grams,
                max_capacity_grams,
            }) => {
                warn!("{} g is outside 0..={} g", grams, max_capacity_grams);
                self.display_reset.signal(());
                SampleOutcome::OutOfRange(grams)
            }
        }
    }
}

impl<L> PeriodicTask for SensorSampler<'_, L>
where
    L: LoadCell,
{
    const NAME: &'static str = "sampler";
    const PRIORITY: TaskPriority = TaskPriority::Background;

    fn period(&self) -> Duration {
        self.config.sample_period
    }

    async fn run_cycle(&mut self) -> Pace {
        self.handle_tare_request().await;
        match self.sample().await {
            SampleOutcome::Unavailable => Pace::Backoff(self.config.not_ready_backoff),
            _ => Pace::OnSchedule,
        }
    }
}
