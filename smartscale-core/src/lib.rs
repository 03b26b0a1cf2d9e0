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

//! Hardware independent weighing pipeline for the smartscale node.
//!
//! A [`scheduler::Scheduler`] owns the shared store and channels and builds
//! the four tasks: the [`sampler::SensorSampler`] reads the load cell and
//! commits a [`measurement::Measurement`], the [`display::DisplayRenderer`]
//! and [`broadcast::BroadcastPublisher`] read it back out, and the
//! [`control::ControlChannel`] passes tare requests from connected clients on
//! to the sampler.
//! Devices are reached through the [`sampler::LoadCell`] and
//! [`display::SegmentDisplay`] traits.

#![no_std]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod broadcast;
pub mod calibration;
pub mod config;
pub mod control;
pub mod display;
pub mod measurement;
pub mod protocol;
pub mod sampler;
pub mod scheduler;
pub mod store;

pub use config::{PayloadFormat, ScaleConfig};
pub use scheduler::{run_periodic, InitError, PeriodicTask, Scheduler};
