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

use smartscale_core::ScaleConfig;

pub const SCALE_CONFIG: ScaleConfig = ScaleConfig::new();

/// 0 (dim) to 7
#[cfg(not(feature = "calibration-mode"))]
pub const DISPLAY_BRIGHTNESS: u8 = 5;

#[cfg(not(feature = "calibration-mode"))]
pub const USB_VID: u16 = 0x1209;
#[cfg(not(feature = "calibration-mode"))]
pub const USB_PID: u16 = 0x4005;
#[cfg(not(feature = "calibration-mode"))]
pub const USB_MANUFACTURER: &str = "SmartScale";
#[cfg(not(feature = "calibration-mode"))]
pub const USB_PRODUCT: &str = "SmartScale Load Cell";
#[cfg(not(feature = "calibration-mode"))]
pub const USB_SERIAL_NUMBER: &str = "00000001";

/// Reference mass placed on the platform by the calibration routine
#[cfg(feature = "calibration-mode")]
pub const CALIBRATION_MASS_GRAMS: f32 = 50.0;
