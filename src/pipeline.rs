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

//! Task wiring for the weighing pipeline.
//!
//! Broadcast and control run on an interrupt executor so observers are served
//! ahead of sampling and display refresh, which share the thread executor
//! with the USB stack.

use crate::drivers::hx711::{Hx711, Hx711Gain};
use crate::drivers::tm1637::Tm1637;
use crate::{config, usb_link, DisplayResources, LoadCellResources};
use defmt::{error, info};
use embassy_executor::{Executor, InterruptExecutor};
use embassy_rp::gpio::{Input, Level, Output, OutputOpenDrain, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::USB;
use embassy_rp::Peri;
use smartscale_core::broadcast::BroadcastPublisher;
use smartscale_core::scheduler::TelemetryPublisher;
use smartscale_core::{run_periodic, InitError, Scheduler};
use static_cell::StaticCell;

static SCHEDULER: StaticCell<Scheduler> = StaticCell::new();
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_LOW: StaticCell<Executor> = StaticCell::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

pub fn run(load_cell: LoadCellResources, display: DisplayResources, usb: Peri<'static, USB>) -> ! {
    let scheduler = match Scheduler::init(&SCHEDULER, config::SCALE_CONFIG) {
        Ok(scheduler) => scheduler,
        Err(e) => halt(e),
    };
    let broadcast = match scheduler.broadcast_publisher() {
        Ok(publisher) => publisher,
        Err(e) => halt(e),
    };

    info!("Starting weighing pipeline");

    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let spawner = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    spawner.spawn(broadcast_task(broadcast).unwrap());
    spawner.spawn(control_task(scheduler).unwrap());

    let executor = EXECUTOR_LOW.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(sampler_task(scheduler, load_cell).unwrap());
        spawner.spawn(display_task(scheduler, display).unwrap());
        spawner.spawn(usb_link::usb_task(usb, scheduler).unwrap());
    })
}

/// Nothing is spawned if the shared context cannot be built.
fn halt(e: InitError) -> ! {
    error!("Start-up failed: {:?}", e);
    loop {
        cortex_m::asm::wfi();
    }
}

#[embassy_executor::task]
async fn broadcast_task(publisher: BroadcastPublisher<'static, TelemetryPublisher<'static>>) {
    run_periodic(publisher).await
}

#[embassy_executor::task]
async fn control_task(scheduler: &'static Scheduler) {
    scheduler.control_channel().run().await
}

#[embassy_executor::task]
async fn sampler_task(scheduler: &'static Scheduler, resources: LoadCellResources) {
    let clock = Output::new(resources.clock_pin, Level::Low);
    let data = Input::new(resources.data_pin, Pull::Up);
    let mut load_cell = Hx711::new(clock, data, Hx711Gain::Gain128);
    load_cell.power_up().await.unwrap();

    let mut sampler = scheduler.sampler(load_cell);
    sampler.initialise().await;
    run_periodic(sampler).await
}

#[embassy_executor::task]
async fn display_task(scheduler: &'static Scheduler, resources: DisplayResources) {
    let clock = Output::new(resources.clock_pin, Level::High);
    let data = OutputOpenDrain::new(resources.data_pin, Level::High);
    let display = Tm1637::new(clock, data, config::DISPLAY_BRIGHTNESS);

    run_periodic(scheduler.display_renderer(display)).await
}
