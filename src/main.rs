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

#![no_std]
#![no_main]

#[cfg(feature = "calibration-mode")]
mod calibration_mode;
mod config;
mod drivers;
#[cfg(not(feature = "calibration-mode"))]
mod pipeline;
#[cfg(not(feature = "calibration-mode"))]
mod usb_link;

#[allow(unused_imports)]
use {defmt_rtt as _, panic_probe as _};

use embassy_rp::peripherals::{PIN_14, PIN_15, PIN_2, PIN_3};
use embassy_rp::Peri;

pub struct LoadCellResources {
    pub clock_pin: Peri<'static, PIN_14>,
    pub data_pin: Peri<'static, PIN_15>,
}

#[allow(dead_code)]
pub struct DisplayResources {
    pub clock_pin: Peri<'static, PIN_2>,
    pub data_pin: Peri<'static, PIN_3>,
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let p = embassy_rp::init(Default::default());

    let load_cell = LoadCellResources {
        clock_pin: p.PIN_14,
        data_pin: p.PIN_15,
    };
    let display = DisplayResources {
        clock_pin: p.PIN_2,
        data_pin: p.PIN_3,
    };

    #[cfg(feature = "calibration-mode")]
    {
        let _ = display;
        calibration_mode::run(load_cell)
    }

    #[cfg(not(feature = "calibration-mode"))]
    {
        pipeline::run(load_cell, display, p.USB)
    }
}
