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

//! Telemetry and control over a USB CDC-ACM serial port.
//!
//! A connection lasts from the host configuring the CDC interface until the
//! endpoints are disabled by a bus reset, unplug or suspend. Each one is
//! reported to the control channel and gets its own telemetry subscription.
//! A host program closing and reopening the port only toggles DTR, so the
//! control channel sees no disconnect and connect for it. Lines read from the
//! host are posted as control messages; weight frames are written back one
//! per line while the host holds DTR.

use crate::config;
use defmt::{debug, info, warn};
use embassy_futures::join::join;
use embassy_futures::select::select;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_rp::{bind_interrupts, Peri};
use embassy_time::Timer;
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::UsbDevice;
use smartscale_core::control::{ConnectionId, ControlSender, MESSAGE_CAPACITY};
use smartscale_core::protocol::{LineAssembler, FRAME_CAPACITY};
use smartscale_core::scheduler::TelemetrySubscriber;
use smartscale_core::Scheduler;
use static_cell::StaticCell;

bind_interrupts!(struct UsbIrqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

const MAX_PACKET_SIZE: u8 = 64;

type UsbDriver = Driver<'static, USB>;

fn build(
    usb_peripheral: Peri<'static, USB>,
) -> (UsbDevice<'static, UsbDriver>, CdcAcmClass<'static, UsbDriver>) {
    let driver = Driver::new(usb_peripheral, UsbIrqs);

    let config = {
        let mut config = embassy_usb::Config::new(config::USB_VID, config::USB_PID);
        config.manufacturer = Some(config::USB_MANUFACTURER);
        config.product = Some(config::USB_PRODUCT);
        config.serial_number = Some(config::USB_SERIAL_NUMBER);
        config.max_power = 100;
        config.max_packet_size_0 = MAX_PACKET_SIZE;
        config
    };

    let mut builder = {
        static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
        static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
        static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

        embassy_usb::Builder::new(
            driver,
            config,
            CONFIG_DESCRIPTOR.init([0; 256]),
            BOS_DESCRIPTOR.init([0; 256]),
            &mut [], // no msos descriptors
            CONTROL_BUF.init([0; 64]),
        )
    };

    static STATE: StaticCell<State> = StaticCell::new();
    let class = CdcAcmClass::new(&mut builder, STATE.init(State::new()), MAX_PACKET_SIZE as u16);

    (builder.build(), class)
}

/// Runs the USB device and the serial link to the scheduler.
#[embassy_executor::task]
pub async fn usb_task(usb_peripheral: Peri<'static, USB>, scheduler: &'static Scheduler) {
    let (mut usb, class) = build(usb_peripheral);
    join(usb.run(), serve_link(class, scheduler)).await;
}

async fn serve_link(class: CdcAcmClass<'static, UsbDriver>, scheduler: &'static Scheduler) -> ! {
    let (mut sender, mut receiver) = class.split();
    let control = scheduler.control_sender();
    let mut next_id: u8 = 0;

    loop {
        receiver.wait_connection().await;

        let id = ConnectionId(next_id);
        next_id = next_id.wrapping_add(1);

        let mut telemetry = match scheduler.telemetry_subscriber() {
            Ok(subscriber) => subscriber,
            Err(e) => {
                warn!("No telemetry slot for connection {}: {:?}", id.0, defmt::Debug2Format(&e));
                Timer::after(config::SCALE_CONFIG.broadcast_period).await;
                continue;
            }
        };

        if let Err(e) = control.connected(id) {
            warn!("Connection {} not reported: {:?}", id.0, e);
        }
        info!("USB connection {} up", id.0);

        let _ = select(
            receive_commands(&mut receiver, id, control),
            send_telemetry(&mut sender, &mut telemetry),
        )
        .await;

        if let Err(e) = control.disconnected(id) {
            warn!("Disconnect of {} not reported: {:?}", id.0, e);
        }
        info!("USB connection {} down", id.0);
    }
}

struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => warn!("USB buffer overflow, dropping connection"),
            EndpointError::Disabled => debug!("USB endpoint disabled"),
        }
        Disconnected {}
    }
}

async fn receive_commands(
    receiver: &mut Receiver<'static, UsbDriver>,
    id: ConnectionId,
    control: ControlSender<'_>,
) -> Disconnected {
    let mut packet = [0u8; MAX_PACKET_SIZE as usize];
    let mut lines = LineAssembler::<MESSAGE_CAPACITY>::new();

    loop {
        let received = match receiver.read_packet(&mut packet).await {
            Ok(received) => received,
            Err(e) => return e.into(),
        };

        for &byte in &packet[..received] {
            match lines.push(byte) {
                Some(Ok([])) | None => {}
                Some(Ok(line)) => {
                    if let Err(e) = control.message(id, line) {
                        warn!("Command from {} dropped: {:?}", id.0, e);
                    }
                }
                Some(Err(e)) => warn!("Line from {} discarded: {:?}", id.0, e),
            }
        }
    }
}

async fn send_telemetry(
    sender: &mut Sender<'static, UsbDriver>,
    telemetry: &mut TelemetrySubscriber<'static>,
) -> Disconnected {
    let mut packet = [0u8; FRAME_CAPACITY + 1];

    loop {
        let frame = telemetry.next_message_pure().await;
        if !sender.dtr() {
            // nobody has the port open, let the frame go
            continue;
        }

        let len = frame.len();
        packet[..len].copy_from_slice(&frame);
        packet[len] = b'\n';
        if let Err(e) = sender.write_packet(&packet[..=len]).await {
            return e.into();
        }
    }
}
