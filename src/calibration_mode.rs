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

//! Two point calibration of a new load cell. Follow the prompts on the RTT
//! log, then copy the printed factor into `ScaleConfig`.

use crate::drivers::hx711::{Hx711, Hx711Gain};
use crate::{config, LoadCellResources};
use defmt::{error, info, warn};
use embassy_executor::Executor;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_time::{Duration, Timer};
use smartscale_core::calibration::derive_scale_factor;
use smartscale_core::sampler::LoadCell;
use static_cell::StaticCell;

const SETTLE_TIME: Duration = Duration::from_secs(10);

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

pub fn run(load_cell: LoadCellResources) -> ! {
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(calibration_task(load_cell).unwrap());
    })
}

#[embassy_executor::task]
async fn calibration_task(resources: LoadCellResources) {
    let clock = Output::new(resources.clock_pin, Level::Low);
    let data = Input::new(resources.data_pin, Pull::Up);
    let mut load_cell = Hx711::new(clock, data, Hx711Gain::Gain128);
    load_cell.power_up().await.unwrap();

    info!("Calibration: clear the platform");
    Timer::after(SETTLE_TIME).await;
    let unloaded = averaged_reading(&mut load_cell).await;
    info!("Unloaded reading {}", unloaded);

    info!("Calibration: place {} g on the platform", config::CALIBRATION_MASS_GRAMS);
    Timer::after(SETTLE_TIME).await;
    let loaded = averaged_reading(&mut load_cell).await;
    info!("Loaded reading {}", loaded);

    match derive_scale_factor(unloaded, loaded, config::CALIBRATION_MASS_GRAMS) {
        Ok(factor) => info!("Scale factor {} g per count (1 / {})", factor, 1.0 / factor),
        Err(e) => error!("Calibration failed: {:?}", e),
    }
}

async fn averaged_reading<L: LoadCell>(load_cell: &mut L) -> i32 {
    loop {
        if load_cell.is_ready() {
            match load_cell.read_average(config::SCALE_CONFIG.tare_samples).await {
                Ok(raw) => return raw,
                Err(_) => warn!("Load cell read failed, retrying"),
            }
        }
        Timer::after(config::SCALE_CONFIG.not_ready_backoff).await;
    }
}
