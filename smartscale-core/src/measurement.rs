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

use embassy_time::Instant;

/// A converted weight that fell outside `0..=max_capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRange {
    pub grams: i32,
    pub max_capacity_grams: u32,
}

/// The most recent reading. Invalid measurements always carry a zero weight
/// and valid ones never exceed the capacity they were classified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    weight: u32,
    valid: bool,
    sampled_at: Instant,
}

impl Measurement {
    /// What consumers see before the first sample lands.
    pub const UNSAMPLED: Measurement = Measurement::invalid(Instant::MIN);

    pub const fn invalid(sampled_at: Instant) -> Self {
        Self {
            weight: 0,
            valid: false,
            sampled_at,
        }
    }

    pub fn classify(
        grams: i32,
        max_capacity_grams: u32,
        sampled_at: Instant,
    ) -> Result<Self, OutOfRange> {
        match u32::try_from(grams) {
            Ok(weight) if weight <= max_capacity_grams => Ok(Self {
                weight,
                valid: true,
                sampled_at,
            }),
            _ => Err(OutOfRange {
                grams,
                max_capacity_grams,
            }),
        }
    }

    /// Grams, zero when invalid.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn sampled_at(&self) -> Instant {
        self.sampled_at
    }
}

impl Default for Measurement {
    fn default() -> Self {
        Self::UNSAMPLED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_is_valid() {
        let at = Instant::from_ticks(42);
        let m = Measurement::classify(50, 5000, at).unwrap();
        assert!(m.is_valid());
        assert_eq!(m.weight(), 50);
        assert_eq!(m.sampled_at(), at);
    }

    #[test]
    fn capacity_limits_are_inclusive() {
        let at = Instant::from_ticks(0);
        assert_eq!(Measurement::classify(0, 5000, at).unwrap().weight(), 0);
        assert_eq!(Measurement::classify(5000, 5000, at).unwrap().weight(), 5000);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let at = Instant::from_ticks(0);
        assert_eq!(
            Measurement::classify(5001, 5000, at),
            Err(OutOfRange {
                grams: 5001,
                max_capacity_grams: 5000
            })
        );
        assert!(Measurement::classify(-1, 5000, at).is_err());
        assert!(Measurement::classify(i32::MIN, 5000, at).is_err());
    }

    #[test]
    fn invalid_carries_zero_weight() {
        let m = Measurement::invalid(Instant::from_ticks(7));
        assert!(!m.is_valid());
        assert_eq!(m.weight(), 0);
        assert_eq!(Measurement::default(), Measurement::UNSAMPLED);
    }
}
