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

//! Shared context for the weighing pipeline and the loop that paces each
//! periodic task.
//!
//! The [`Scheduler`] lives in a `StaticCell` so every task can borrow it for
//! `'static`. It hands out the components wired to its store and channels.
//! Which executor a task lands on is the firmware's business; each task only
//! declares the [`TaskPriority`] class it expects.

use crate::broadcast::BroadcastPublisher;
use crate::calibration::CalibrationState;
use crate::config::ScaleConfig;
use crate::control::{ControlChannel, ControlEvent, ControlSender};
use crate::display::{DisplayRenderer, SegmentDisplay};
use crate::protocol::TelemetryFrame;
use crate::sampler::{LoadCell, SensorSampler};
use crate::store::SharedMeasurementStore;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pubsub::{self, PubSubChannel, Publisher, Subscriber};
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker, Timer};
use static_cell::StaticCell;

pub const CONTROL_INBOX_DEPTH: usize = 8;

const TELEMETRY_DEPTH: usize = 4;
pub const TELEMETRY_SUBSCRIBERS: usize = 4;
const TELEMETRY_PUBLISHERS: usize = 1;

pub type ControlInbox = Channel<CriticalSectionRawMutex, ControlEvent, CONTROL_INBOX_DEPTH>;

pub type TelemetryChannel = PubSubChannel<
    CriticalSectionRawMutex,
    TelemetryFrame,
    TELEMETRY_DEPTH,
    TELEMETRY_SUBSCRIBERS,
    TELEMETRY_PUBLISHERS,
>;
pub type TelemetryPublisher<'a> = Publisher<
    'a,
    CriticalSectionRawMutex,
    TelemetryFrame,
    TELEMETRY_DEPTH,
    TELEMETRY_SUBSCRIBERS,
    TELEMETRY_PUBLISHERS,
>;
pub type TelemetrySubscriber<'a> = Subscriber<
    'a,
    CriticalSectionRawMutex,
    TelemetryFrame,
    TELEMETRY_DEPTH,
    TELEMETRY_SUBSCRIBERS,
    TELEMETRY_PUBLISHERS,
>;

pub type DisplayResetSignal = Signal<CriticalSectionRawMutex, ()>;

/// Raised by the control channel, taken by the sampler. Requests made before
/// the sampler gets to it collapse into one.
pub type TareRequestSignal = Signal<CriticalSectionRawMutex, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// The shared context has already been placed in its static cell
    AlreadyInitialised,
    /// Another broadcast publisher already holds the telemetry channel
    TelemetryPublisherUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskPriority {
    /// Sampling and local display
    Background,
    /// Anything an observer is waiting on
    Network,
}

/// How long to wait before the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pace {
    OnSchedule,
    /// Wait this long, then a full period, before trying again
    Backoff(Duration),
}

#[allow(async_fn_in_trait)]
pub trait PeriodicTask {
    const NAME: &'static str;
    const PRIORITY: TaskPriority;

    fn period(&self) -> Duration;

    async fn run_cycle(&mut self) -> Pace;

    /// Resolves when the task should run a cycle before its period is up.
    async fn wake_early(&self) {
        core::future::pending::<()>().await
    }
}

/// Runs `task` forever. The wait at the end of each cycle is the only place
/// the task yields between cycles.
pub async fn run_periodic<T: PeriodicTask>(mut task: T) -> ! {
    info!("{} task started, {:?} priority", T::NAME, T::PRIORITY);
    let mut ticker = Ticker::every(task.period());
    loop {
        if let Pace::Backoff(delay) = task.run_cycle().await {
            Timer::after(delay).await;
            ticker.reset();
        }

        if let Either::Second(_) = select(ticker.next(), task.wake_early()).await {
            trace!("{} woken early", T::NAME);
        }
    }
}

pub struct Scheduler {
    config: ScaleConfig,
    store: SharedMeasurementStore,
    control_inbox: ControlInbox,
    telemetry: TelemetryChannel,
    display_reset: DisplayResetSignal,
    tare_request: TareRequestSignal,
}

impl Scheduler {
    pub const fn new(config: ScaleConfig) -> Self {
        Self {
            config,
            store: SharedMeasurementStore::new(CalibrationState::new(config.scale_factor)),
            control_inbox: Channel::new(),
            telemetry: PubSubChannel::new(),
            display_reset: Signal::new(),
            tare_request: Signal::new(),
        }
    }

    /// Places the context in `cell`. Fails if the cell is already in use.
    pub fn init(
        cell: &'static StaticCell<Scheduler>,
        config: ScaleConfig,
    ) -> Result<&'static Scheduler, InitError> {
        match cell.try_init(Self::new(config)) {
            Some(scheduler) => {
                debug!("scheduler context ready");
                Ok(&*scheduler)
            }
            None => {
                error!("scheduler context already initialised");
                Err(InitError::AlreadyInitialised)
            }
        }
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedMeasurementStore {
        &self.store
    }

    pub fn sampler<L: LoadCell>(&self, load_cell: L) -> SensorSampler<'_, L> {
        SensorSampler::new(
            load_cell,
            &self.store,
            &self.display_reset,
            &self.tare_request,
            self.config,
        )
    }

    pub fn display_renderer<D: SegmentDisplay>(&self, display: D) -> DisplayRenderer<'_, D> {
        DisplayRenderer::new(
            display,
            &self.store,
            &self.display_reset,
            self.config.display_period,
        )
    }

    /// Only one publisher can exist per context.
    pub fn broadcast_publisher(
        &self,
    ) -> Result<BroadcastPublisher<'_, TelemetryPublisher<'_>>, InitError> {
        let publisher = self.telemetry.publisher().map_err(|_| {
            error!("telemetry publisher slot already taken");
            InitError::TelemetryPublisherUnavailable
        })?;
        Ok(BroadcastPublisher::new(
            publisher,
            &self.store,
            self.config.payload_format,
            self.config.broadcast_period,
        ))
    }

    pub fn control_channel(&self) -> ControlChannel<'_> {
        ControlChannel::new(&self.control_inbox, &self.tare_request)
    }

    pub fn control_sender(&self) -> ControlSender<'_> {
        ControlSender::new(&self.control_inbox)
    }

    /// One per live connection, released when dropped.
    pub fn telemetry_subscriber(&self) -> Result<TelemetrySubscriber<'_>, pubsub::Error> {
        self.telemetry.subscriber()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayloadFormat;
    use crate::control::{ConnectionId, ControlOutcome};
    use crate::display::DisplayFrame;
    use crate::display::Glyph::{Blank, Digit};
    use crate::protocol::encode_weight;
    use crate::sampler::tests::ScriptedLoadCell;
    use crate::sampler::SampleOutcome;
    use embassy_futures::block_on;
    use embassy_time::Instant;
    use std::vec::Vec;

    struct CountingTask<'a> {
        cycles: u32,
        done: &'a Signal<CriticalSectionRawMutex, ()>,
    }

    impl PeriodicTask for CountingTask<'_> {
        const NAME: &'static str = "counting";
        const PRIORITY: TaskPriority = TaskPriority::Background;

        fn period(&self) -> Duration {
            Duration::from_millis(5)
        }

        async fn run_cycle(&mut self) -> Pace {
            self.cycles += 1;
            if self.cycles == 3 {
                self.done.signal(());
            }
            if self.cycles == 1 {
                Pace::Backoff(Duration::from_millis(20))
            } else {
                Pace::OnSchedule
            }
        }
    }

    #[test]
    fn periodic_loop_runs_cycles_and_honours_backoff() {
        let done = Signal::new();
        let begin = Instant::now();
        let task = CountingTask {
            cycles: 0,
            done: &done,
        };

        block_on(select(run_periodic(task), done.wait()));

        // first cycle backed off, so the second waited for backoff and a period
        assert!(begin.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn second_init_on_the_same_cell_fails() {
        static CELL: StaticCell<Scheduler> = StaticCell::new();

        let scheduler = Scheduler::init(&CELL, ScaleConfig::new()).unwrap();
        assert_eq!(scheduler.config().max_capacity_grams, 5000);
        assert_eq!(
            Scheduler::init(&CELL, ScaleConfig::new()).err(),
            Some(InitError::AlreadyInitialised)
        );
    }

    #[test]
    fn only_one_broadcast_publisher() {
        let scheduler = Scheduler::new(ScaleConfig::new());
        let _first = scheduler.broadcast_publisher().unwrap();
        assert_eq!(
            scheduler.broadcast_publisher().err(),
            Some(InitError::TelemetryPublisherUnavailable)
        );
    }

    #[test]
    fn subscriber_slots_are_bounded() {
        let scheduler = Scheduler::new(ScaleConfig::new());
        let subscribers: Vec<_> = (0..TELEMETRY_SUBSCRIBERS)
            .map(|_| scheduler.telemetry_subscriber().unwrap())
            .collect();
        assert!(scheduler.telemetry_subscriber().is_err());
        drop(subscribers);
        assert!(scheduler.telemetry_subscriber().is_ok());
    }

    fn config() -> ScaleConfig {
        ScaleConfig::new().with_scale_factor(0.5)
    }

    fn weight_frame(weight: u32) -> TelemetryFrame {
        encode_weight(weight, PayloadFormat::Json).unwrap()
    }

    #[test]
    fn tare_from_a_client_reaches_the_sampler() {
        struct NullDisplay;
        impl SegmentDisplay for NullDisplay {
            type Error = ();
            async fn show(&mut self, _frame: &DisplayFrame) -> Result<(), ()> {
                Ok(())
            }
        }

        let scheduler = Scheduler::new(config());
        let sender = scheduler.control_sender();
        let mut control = scheduler.control_channel();
        let mut sampler = scheduler.sampler(ScriptedLoadCell::reading(1000));
        let mut display = scheduler.display_renderer(NullDisplay);

        block_on(async {
            sampler.initialise().await;
            sampler.load_cell_mut().raw = 1400;
            assert_eq!(sampler.run_cycle().await, Pace::OnSchedule);
            assert_eq!(
                display.render().await,
                DisplayFrame([Blank, Digit(2), Digit(0), Digit(0)])
            );

            sender.connected(ConnectionId(1)).unwrap();
            sender.message(ConnectionId(1), b"tare").unwrap();
            for _ in 0..2 {
                let event = control.next_event().await;
                control.handle(event).await;
            }
            // nothing changes until the sampler serves the request
            assert_eq!(scheduler.store().calibration().await.zero_offset, 1000);

            sampler.run_cycle().await;
            assert_eq!(scheduler.store().calibration().await.zero_offset, 1400);
            assert_eq!(
                display.render().await,
                DisplayFrame([Blank, Blank, Blank, Digit(0)])
            );
        });
    }

    #[test]
    fn sensor_outage_publishes_zero_and_keeps_calibration() {
        let scheduler = Scheduler::new(config());
        let mut telemetry = scheduler.telemetry_subscriber().unwrap();
        let mut broadcast = scheduler.broadcast_publisher().unwrap();
        let mut sampler = scheduler.sampler(ScriptedLoadCell::reading(1000));

        block_on(async {
            sampler.initialise().await;
            sampler.load_cell_mut().raw = 1100;
            sampler.run_cycle().await;
            broadcast.publish().await;
            assert_eq!(telemetry.try_next_message_pure(), Some(weight_frame(50)));

            sampler.load_cell_mut().ready = false;
            for _ in 0..3 {
                assert_eq!(
                    sampler.run_cycle().await,
                    Pace::Backoff(scheduler.config().not_ready_backoff)
                );
                let m = scheduler.store().snapshot().await;
                assert!(!m.is_valid());
                assert_eq!(m.weight(), 0);
                assert_eq!(scheduler.store().calibration().await.zero_offset, 1000);

                broadcast.publish().await;
                assert_eq!(telemetry.try_next_message_pure(), Some(weight_frame(0)));
                assert_eq!(telemetry.try_next_message_pure(), None);
            }

            sampler.load_cell_mut().ready = true;
            assert_eq!(sampler.sample().await, SampleOutcome::Valid(50));
        });
    }

    #[test]
    fn malformed_command_leaves_sampling_alone() {
        let scheduler = Scheduler::new(config());
        let sender = scheduler.control_sender();
        let mut control = scheduler.control_channel();
        let mut telemetry = scheduler.telemetry_subscriber().unwrap();
        let mut broadcast = scheduler.broadcast_publisher().unwrap();
        let mut sampler = scheduler.sampler(ScriptedLoadCell::reading(1000));

        block_on(async {
            sampler.initialise().await;
            sampler.load_cell_mut().raw = 1600;
            sampler.run_cycle().await;

            sender.connected(ConnectionId(7)).unwrap();
            sender.message(ConnectionId(7), br#"{"command":"#).unwrap();
            sender.message(ConnectionId(7), b"calibrate").unwrap();
            let mut outcomes = [ControlOutcome::Opened; 3];
            for outcome in outcomes.iter_mut() {
                let event = control.next_event().await;
                *outcome = control.handle(event).await;
            }
            assert_eq!(
                outcomes,
                [ControlOutcome::Opened, ControlOutcome::Dropped, ControlOutcome::Dropped]
            );
            assert!(control.is_open(ConnectionId(7)));

            let requested_before = sampler.load_cell_mut().requested_samples.len();
            assert_eq!(sampler.run_cycle().await, Pace::OnSchedule);
            // one plain reading, no tare read
            assert_eq!(sampler.load_cell_mut().requested_samples.len(), requested_before + 1);
            assert_eq!(scheduler.store().calibration().await.zero_offset, 1000);
            let m = scheduler.store().snapshot().await;
            assert!(m.is_valid());
            assert_eq!(m.weight(), 300);

            broadcast.publish().await;
            assert_eq!(telemetry.try_next_message_pure(), Some(weight_frame(300)));
        });
    }
}
