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

//! Conversion from raw load cell counts to grams.

#[allow(unused_imports)]
use micromath::F32Ext;

/// Grams per raw count for the reference load cell. The amplifier is wired
/// so that load drives the count down, hence the negative sign.
pub const DEFAULT_SCALE_FACTOR: f32 = -1.0 / 396.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// The known mass must be a positive, finite number of grams
    InvalidMass,
    /// Loaded and unloaded readings are identical so no gradient can be fitted
    NoSpan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationState {
    /// Grams per raw count. Fixed at start-up.
    pub scale_factor: f32,
    /// Raw count that reads as zero grams.
    pub zero_offset: i32,
}

impl CalibrationState {
    pub const fn new(scale_factor: f32) -> Self {
        Self {
            scale_factor,
            zero_offset: 0,
        }
    }

    pub const fn with_zero_offset(self, zero_offset: i32) -> Self {
        Self {
            scale_factor: self.scale_factor,
            zero_offset,
        }
    }

    /// Re-zero on `baseline`, a raw reading taken with nothing on the scale.
    pub fn tare(self, baseline: i32) -> Self {
        self.with_zero_offset(baseline)
    }
}

/// Converts a raw reading to the nearest whole gram.
///
/// Non-decreasing in `raw` for a non-negative scale factor and non-increasing
/// for a negative one. Results beyond `i32` saturate.
pub fn to_weight(raw: i32, state: &CalibrationState) -> i32 {
    let delta = raw as i64 - state.zero_offset as i64;
    let grams = (delta as f32 * state.scale_factor).round();
    grams as i32
}

/// Integer mean rounded to nearest, `None` for an empty slice.
pub fn mean_raw(samples: &[i32]) -> Option<i32> {
    if samples.is_empty() {
        return None;
    }

    let count = samples.len() as i64;
    let sum: i64 = samples.iter().map(|&s| s as i64).sum();
    let half = count / 2;
    let mean = if sum >= 0 {
        (sum + half) / count
    } else {
        (sum - half) / count
    };
    Some(mean as i32)
}

/// Two point fit of the scale factor from an empty reading and a reading
/// with `known_mass_grams` on the platform.
///
/// This is an operator procedure run once per load cell, the running
/// pipeline only consumes its result.
pub fn derive_scale_factor(
    unloaded_raw: i32,
    loaded_raw: i32,
    known_mass_grams: f32,
) -> Result<f32, CalibrationError> {
    if !known_mass_grams.is_finite() || known_mass_grams <= 0.0 {
        return Err(CalibrationError::InvalidMass);
    }

    let span = loaded_raw as i64 - unloaded_raw as i64;
    if span == 0 {
        return Err(CalibrationError::NoSpan);
    }

    Ok(known_mass_grams / span as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_offset_reads_as_zero() {
        let state = CalibrationState::new(DEFAULT_SCALE_FACTOR).with_zero_offset(84_213);
        assert_eq!(to_weight(84_213, &state), 0);
    }

    #[test]
    fn fifty_grams_over_tared_baseline() {
        let state = CalibrationState::new(0.5).tare(1000);
        assert_eq!(to_weight(1100, &state), 50);
    }

    #[test]
    fn rounds_to_nearest_gram() {
        let state = CalibrationState::new(0.25);
        assert_eq!(to_weight(5, &state), 1);
        assert_eq!(to_weight(6, &state), 2);
        assert_eq!(to_weight(-6, &state), -2);
    }

    #[test]
    fn reference_factor_reads_load_as_positive() {
        let state = CalibrationState::new(DEFAULT_SCALE_FACTOR).with_zero_offset(0);
        // 100 g on the reference cell pulls the reading down by ~39699 counts
        assert_eq!(to_weight(-39_699, &state), 100);
    }

    #[test]
    fn monotonic_for_positive_factor() {
        let state = CalibrationState::new(0.0371).with_zero_offset(-1_234);
        let mut previous = i32::MIN;
        for raw in (-200_000..200_000).step_by(97) {
            let weight = to_weight(raw, &state);
            assert!(weight >= previous, "raw {} gave {} after {}", raw, weight, previous);
            previous = weight;
        }
    }

    #[test]
    fn monotonic_in_load_for_negative_factor() {
        let state = CalibrationState::new(DEFAULT_SCALE_FACTOR).with_zero_offset(50_000);
        let mut previous = i32::MAX;
        for raw in (-400_000..400_000).step_by(131) {
            let weight = to_weight(raw, &state);
            assert!(weight <= previous);
            previous = weight;
        }
    }

    #[test]
    fn extreme_readings_do_not_overflow() {
        let state = CalibrationState::new(1.0).with_zero_offset(i32::MIN);
        assert_eq!(to_weight(i32::MAX, &state), i32::MAX);
        let state = CalibrationState::new(1.0).with_zero_offset(i32::MAX);
        assert_eq!(to_weight(i32::MIN, &state), i32::MIN);
    }

    #[test]
    fn tare_twice_is_the_same_as_once() {
        let state = CalibrationState::new(0.5);
        let once = state.tare(1000);
        let twice = once.tare(1000);
        assert_eq!(once, twice);
        assert_eq!(twice.scale_factor, 0.5);
    }

    #[test]
    fn mean_rounds_to_nearest() {
        assert_eq!(mean_raw(&[]), None);
        assert_eq!(mean_raw(&[1000]), Some(1000));
        assert_eq!(mean_raw(&[1, 2]), Some(2));
        assert_eq!(mean_raw(&[-1, -2]), Some(-2));
        assert_eq!(mean_raw(&[i32::MAX, i32::MAX]), Some(i32::MAX));
    }

    #[test]
    fn two_point_fit() {
        let factor = derive_scale_factor(1000, 1100, 50.0).unwrap();
        assert_eq!(factor, 0.5);

        let state = CalibrationState::new(factor).tare(1000);
        assert_eq!(to_weight(1100, &state), 50);
    }

    #[test]
    fn two_point_fit_rejects_bad_input() {
        assert_eq!(derive_scale_factor(10, 10, 50.0), Err(CalibrationError::NoSpan));
        assert_eq!(derive_scale_factor(10, 20, 0.0), Err(CalibrationError::InvalidMass));
        assert_eq!(derive_scale_factor(10, 20, -5.0), Err(CalibrationError::InvalidMass));
        assert_eq!(derive_scale_factor(10, 20, f32::NAN), Err(CalibrationError::InvalidMass));
    }
}
