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

//! The single slot every task reads and only the sampler writes.
//!
//! All access goes through [`SharedMeasurementStore::with_exclusive_access`]
//! which takes a synchronous closure. Nothing can be awaited while the lock is
//! held, so the critical section is bounded by the closure body and the guard
//! is released on every exit path.

use crate::calibration::CalibrationState;
use crate::measurement::Measurement;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

pub struct ScaleState {
    pub measurement: Measurement,
    pub calibration: CalibrationState,
}

impl ScaleState {
    pub const fn new(calibration: CalibrationState) -> Self {
        Self {
            measurement: Measurement::UNSAMPLED,
            calibration,
        }
    }
}

pub struct SharedMeasurementStore {
    state: Mutex<CriticalSectionRawMutex, ScaleState>,
}

impl SharedMeasurementStore {
    pub const fn new(calibration: CalibrationState) -> Self {
        Self {
            state: Mutex::new(ScaleState::new(calibration)),
        }
    }

    /// Waits for the lock without a timeout, runs `f` and releases.
    pub async fn with_exclusive_access<R>(&self, f: impl FnOnce(&mut ScaleState) -> R) -> R {
        let mut guard = self.state.lock().await;
        f(&mut guard)
    }

    pub async fn snapshot(&self) -> Measurement {
        self.with_exclusive_access(|state| state.measurement).await
    }

    pub async fn calibration(&self) -> CalibrationState {
        self.with_exclusive_access(|state| state.calibration).await
    }
}
