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

use crate::calibration::DEFAULT_SCALE_FACTOR;
use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadFormat {
    /// `{"weight":N}`
    Json,
    /// Bare decimal weight, as sent by older control pages
    PlainText,
}

/// Tunables for the weighing pipeline. Fixed once the scheduler is built.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScaleConfig {
    pub max_capacity_grams: u32,
    pub scale_factor: f32,
    pub samples_per_reading: u8,
    pub tare_samples: u8,
    pub sample_period: Duration,
    pub display_period: Duration,
    pub broadcast_period: Duration,
    pub not_ready_backoff: Duration,
    pub payload_format: PayloadFormat,
}

impl ScaleConfig {
    pub const DEFAULT: ScaleConfig = ScaleConfig::new();

    pub const fn new() -> Self {
        Self {
            max_capacity_grams: 5000,
            scale_factor: DEFAULT_SCALE_FACTOR,
            samples_per_reading: 1,
            tare_samples: 10,
            sample_period: Duration::from_millis(500),
            display_period: Duration::from_millis(1000),
            broadcast_period: Duration::from_millis(1000),
            not_ready_backoff: Duration::from_millis(1000),
            payload_format: PayloadFormat::Json,
        }
    }

    pub const fn with_max_capacity_grams(mut self, max_capacity_grams: u32) -> Self {
        self.max_capacity_grams = max_capacity_grams;
        self
    }

    pub const fn with_scale_factor(mut self, scale_factor: f32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Zero is treated as one.
    pub const fn with_samples_per_reading(mut self, samples: u8) -> Self {
        self.samples_per_reading = if samples == 0 { 1 } else { samples };
        self
    }

    /// Zero is treated as one.
    pub const fn with_tare_samples(mut self, samples: u8) -> Self {
        self.tare_samples = if samples == 0 { 1 } else { samples };
        self
    }

    pub const fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    pub const fn with_display_period(mut self, period: Duration) -> Self {
        self.display_period = period;
        self
    }

    pub const fn with_broadcast_period(mut self, period: Duration) -> Self {
        self.broadcast_period = period;
        self
    }

    pub const fn with_not_ready_backoff(mut self, backoff: Duration) -> Self {
        self.not_ready_backoff = backoff;
        self
    }

    pub const fn with_payload_format(mut self, payload_format: PayloadFormat) -> Self {
        self.payload_format = payload_format;
        self
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_hardware() {
        let config = ScaleConfig::default();
        assert_eq!(config.max_capacity_grams, 5000);
        assert_eq!(config.sample_period, Duration::from_millis(500));
        assert_eq!(config.display_period, Duration::from_millis(1000));
        assert_eq!(config.broadcast_period, Duration::from_millis(1000));
        assert_eq!(config.not_ready_backoff, Duration::from_millis(1000));
        assert_eq!(config.payload_format, PayloadFormat::Json);
        assert!(config.scale_factor < 0.0);
    }

    #[test]
    fn zero_sample_counts_are_clamped() {
        let config = ScaleConfig::new()
            .with_samples_per_reading(0)
            .with_tare_samples(0);
        assert_eq!(config.samples_per_reading, 1);
        assert_eq!(config.tare_samples, 1);
    }
}
