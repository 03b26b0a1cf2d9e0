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

//! Periodic push of the latest weight to every connected observer.

use crate::config::PayloadFormat;
use crate::protocol::{encode_weight, TelemetryFrame};
use crate::scheduler::{Pace, PeriodicTask, TaskPriority};
use crate::store::SharedMeasurementStore;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::pubsub::Publisher;
use embassy_time::Duration;

/// Delivers a frame to every current subscriber without waiting on any of
/// them. Subscribers that fall behind miss frames.
pub trait FanOut {
    fn fan_out(&mut self, frame: &TelemetryFrame);
}

impl<M, const CAP: usize, const SUBS: usize, const PUBS: usize> FanOut
    for Publisher<'_, M, TelemetryFrame, CAP, SUBS, PUBS>
where
    M: RawMutex,
{
    fn fan_out(&mut self, frame: &TelemetryFrame) {
        self.publish_immediate(frame.clone());
    }
}

pub struct BroadcastPublisher<'a, F> {
    fan_out: F,
    store: &'a SharedMeasurementStore,
    format: PayloadFormat,
    period: Duration,
}

impl<'a, F> BroadcastPublisher<'a, F>
where
    F: FanOut,
{
    pub fn new(
        fan_out: F,
        store: &'a SharedMeasurementStore,
        format: PayloadFormat,
        period: Duration,
    ) -> Self {
        Self {
            fan_out,
            store,
            format,
            period,
        }
    }

    pub async fn publish(&mut self) {
        let measurement = self.store.snapshot().await;
        match encode_weight(measurement.weight(), self.format) {
            Ok(frame) => {
                trace!("broadcasting {} g", measurement.weight());
                self.fan_out.fan_out(&frame);
            }
            Err(e) => warn!("weight frame not sent: {:?}", e),
        }
    }
}

impl<F> PeriodicTask for BroadcastPublisher<'_, F>
where
    F: FanOut,
{
    const NAME: &'static str = "broadcast";
    const PRIORITY: TaskPriority = TaskPriority::Network;

    fn period(&self) -> Duration {
        self.period
    }

    async fn run_cycle(&mut self) -> Pace {
        self.publish().await;
        Pace::OnSchedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationState;
    use crate::measurement::Measurement;
    use crate::scheduler::TelemetryChannel;
    use embassy_futures::block_on;
    use embassy_sync::pubsub::WaitResult;
    use embassy_time::Instant;
    use std::vec::Vec;

    #[derive(Default)]
    struct CollectingFanOut {
        frames: Vec<TelemetryFrame>,
    }

    impl FanOut for CollectingFanOut {
        fn fan_out(&mut self, frame: &TelemetryFrame) {
            self.frames.push(frame.clone());
        }
    }

    fn store_with(measurement: Measurement) -> SharedMeasurementStore {
        let store = SharedMeasurementStore::new(CalibrationState::new(1.0));
        block_on(store.with_exclusive_access(|state| state.measurement = measurement));
        store
    }

    #[test]
    fn publishes_latest_weight() {
        let store = store_with(Measurement::classify(50, 5000, Instant::from_ticks(0)).unwrap());
        let mut publisher = BroadcastPublisher::new(
            CollectingFanOut::default(),
            &store,
            PayloadFormat::Json,
            Duration::from_millis(1000),
        );

        assert_eq!(block_on(publisher.run_cycle()), Pace::OnSchedule);
        assert_eq!(publisher.fan_out.frames.len(), 1);
        assert_eq!(publisher.fan_out.frames[0].as_slice(), br#"{"weight":50}"#);
    }

    #[test]
    fn invalid_publishes_zero() {
        let store = store_with(Measurement::invalid(Instant::from_ticks(0)));
        let mut publisher = BroadcastPublisher::new(
            CollectingFanOut::default(),
            &store,
            PayloadFormat::PlainText,
            Duration::from_millis(1000),
        );

        block_on(publisher.publish());
        assert_eq!(publisher.fan_out.frames[0].as_slice(), b"0");
    }

    #[test]
    fn every_subscriber_gets_the_frame() {
        let channel = TelemetryChannel::new();
        let mut first = channel.subscriber().unwrap();
        let mut second = channel.subscriber().unwrap();
        let store = store_with(Measurement::classify(7, 5000, Instant::from_ticks(0)).unwrap());
        let mut publisher = BroadcastPublisher::new(
            channel.publisher().unwrap(),
            &store,
            PayloadFormat::Json,
            Duration::from_millis(1000),
        );

        block_on(publisher.publish());
        for subscriber in [&mut first, &mut second] {
            let frame = subscriber.try_next_message_pure().unwrap();
            assert_eq!(frame.as_slice(), br#"{"weight":7}"#);
        }
    }

    #[test]
    fn slow_subscriber_lags_without_blocking() {
        let channel = TelemetryChannel::new();
        let mut slow = channel.subscriber().unwrap();
        let store = store_with(Measurement::classify(1, 5000, Instant::from_ticks(0)).unwrap());
        let mut publisher = BroadcastPublisher::new(
            channel.publisher().unwrap(),
            &store,
            PayloadFormat::Json,
            Duration::from_millis(1000),
        );

        // more frames than the channel holds, each publish must still complete
        for _ in 0..10 {
            block_on(publisher.publish());
        }

        assert!(matches!(slow.try_next_message(), Some(WaitResult::Lagged(_))));
        assert!(matches!(slow.try_next_message(), Some(WaitResult::Message(_))));
    }
}
