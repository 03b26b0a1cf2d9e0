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

//! Remote control of the scale.
//!
//! The link layer posts connection events into a bounded inbox with
//! [`ControlSender`] and never waits on it. [`ControlChannel`] drains the
//! inbox, tracks which connections are open and hands recognised commands
//! on. A tare is raised as a request that the sampler serves on its next
//! cycle with a fresh reading.

use crate::protocol::{parse_command, ControlCommand};
use crate::scheduler::{ControlInbox, TareRequestSignal};

pub const MAX_CONNECTIONS: usize = 4;
pub const MESSAGE_CAPACITY: usize = 64;

pub type ControlMessage = heapless::Vec<u8, MESSAGE_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionId(pub u8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    Connected(ConnectionId),
    Disconnected(ConnectionId),
    Message(ConnectionId, ControlMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PostError {
    PayloadTooLong,
    InboxFull,
}

/// What handling one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlOutcome {
    Opened,
    Closed,
    /// Passed to the sampler
    TareRequested,
    Dropped,
}

#[derive(Clone, Copy)]
pub struct ControlSender<'a> {
    inbox: &'a ControlInbox,
}

impl<'a> ControlSender<'a> {
    pub fn new(inbox: &'a ControlInbox) -> Self {
        Self { inbox }
    }

    pub fn connected(&self, id: ConnectionId) -> Result<(), PostError> {
        self.post(ControlEvent::Connected(id))
    }

    pub fn disconnected(&self, id: ConnectionId) -> Result<(), PostError> {
        self.post(ControlEvent::Disconnected(id))
    }

    pub fn message(&self, id: ConnectionId, payload: &[u8]) -> Result<(), PostError> {
        let payload = ControlMessage::from_slice(payload).map_err(|_| PostError::PayloadTooLong)?;
        self.post(ControlEvent::Message(id, payload))
    }

    fn post(&self, event: ControlEvent) -> Result<(), PostError> {
        self.inbox.try_send(event).map_err(|_| PostError::InboxFull)
    }
}

pub struct ControlChannel<'a> {
    inbox: &'a ControlInbox,
    tare_request: &'a TareRequestSignal,
    open: heapless::Vec<ConnectionId, MAX_CONNECTIONS>,
}

impl<'a> ControlChannel<'a> {
    pub fn new(inbox: &'a ControlInbox, tare_request: &'a TareRequestSignal) -> Self {
        Self {
            inbox,
            tare_request,
            open: heapless::Vec::new(),
        }
    }

    pub async fn next_event(&self) -> ControlEvent {
        self.inbox.receive().await
    }

    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.open.contains(&id)
    }

    pub async fn handle(&mut self, event: ControlEvent) -> ControlOutcome {
        match event {
            ControlEvent::Connected(id) => self.open_connection(id),
            ControlEvent::Disconnected(id) => self.close_connection(id),
            ControlEvent::Message(id, payload) => self.handle_message(id, &payload),
        }
    }

    pub async fn run(mut self) -> ! {
        info!("control channel started");
        loop {
            let event = self.next_event().await;
            self.handle(event).await;
        }
    }

    fn open_connection(&mut self, id: ConnectionId) -> ControlOutcome {
        if self.is_open(id) {
            debug!("connection {} already open", id.0);
            return ControlOutcome::Dropped;
        }
        match self.open.push(id) {
            Ok(()) => {
                info!("connection {} opened", id.0);
                ControlOutcome::Opened
            }
            Err(_) => {
                warn!("connection {} refused, {} already open", id.0, MAX_CONNECTIONS);
                ControlOutcome::Dropped
            }
        }
    }

    fn close_connection(&mut self, id: ConnectionId) -> ControlOutcome {
        match self.open.iter().position(|open| *open == id) {
            Some(index) => {
                self.open.swap_remove(index);
                info!("connection {} closed", id.0);
                ControlOutcome::Closed
            }
            None => {
                debug!("close for unknown connection {}", id.0);
                ControlOutcome::Dropped
            }
        }
    }

    fn handle_message(&mut self, id: ConnectionId, payload: &[u8]) -> ControlOutcome {
        if !self.is_open(id) {
            warn!("message from connection {} which is not open", id.0);
            return ControlOutcome::Dropped;
        }

        let command = match parse_command(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("connection {} sent an unusable command: {:?}", id.0, e);
                return ControlOutcome::Dropped;
            }
        };

        match command {
            ControlCommand::Tare => {
                debug!("tare requested by connection {}", id.0);
                self.tare_request.signal(());
                ControlOutcome::TareRequested
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::CONTROL_INBOX_DEPTH;
    use embassy_futures::block_on;

    const CLIENT: ConnectionId = ConnectionId(1);

    fn message(id: ConnectionId, payload: &[u8]) -> ControlEvent {
        ControlEvent::Message(id, ControlMessage::from_slice(payload).unwrap())
    }

    #[test]
    fn tare_from_open_connection_is_requested() {
        let inbox = ControlInbox::new();
        let tare = TareRequestSignal::new();
        let mut channel = ControlChannel::new(&inbox, &tare);

        block_on(async {
            assert_eq!(channel.handle(ControlEvent::Connected(CLIENT)).await, ControlOutcome::Opened);
            assert_eq!(
                channel.handle(message(CLIENT, b"Taring the Scale")).await,
                ControlOutcome::TareRequested
            );
        });
        assert!(tare.signaled());
    }

    #[test]
    fn repeated_tares_collapse_into_one_request() {
        let inbox = ControlInbox::new();
        let tare = TareRequestSignal::new();
        let mut channel = ControlChannel::new(&inbox, &tare);

        block_on(async {
            channel.handle(ControlEvent::Connected(CLIENT)).await;
            for _ in 0..3 {
                channel.handle(message(CLIENT, b" TARE \r")).await;
            }
        });
        assert_eq!(tare.try_take(), Some(()));
        assert_eq!(tare.try_take(), None);
    }

    #[test]
    fn unusable_messages_change_nothing() {
        let inbox = ControlInbox::new();
        let tare = TareRequestSignal::new();
        let mut channel = ControlChannel::new(&inbox, &tare);

        block_on(async {
            channel.handle(ControlEvent::Connected(CLIENT)).await;
            let payloads: [&[u8]; 3] = [b"reboot", b"{\"command\"", b""];
            for payload in payloads {
                assert_eq!(channel.handle(message(CLIENT, payload)).await, ControlOutcome::Dropped);
            }
            assert!(channel.is_open(CLIENT));
        });
        assert!(!tare.signaled());
    }

    #[test]
    fn messages_outside_a_connection_are_dropped() {
        let inbox = ControlInbox::new();
        let tare = TareRequestSignal::new();
        let mut channel = ControlChannel::new(&inbox, &tare);

        block_on(async {
            // before connect
            assert_eq!(channel.handle(message(CLIENT, b"tare")).await, ControlOutcome::Dropped);

            channel.handle(ControlEvent::Connected(CLIENT)).await;
            assert_eq!(
                channel.handle(ControlEvent::Disconnected(CLIENT)).await,
                ControlOutcome::Closed
            );

            // after disconnect
            assert_eq!(channel.handle(message(CLIENT, b"tare")).await, ControlOutcome::Dropped);
            assert_eq!(
                channel.handle(ControlEvent::Disconnected(CLIENT)).await,
                ControlOutcome::Dropped
            );
        });
        assert!(!tare.signaled());
    }

    #[test]
    fn connection_set_is_bounded() {
        let inbox = ControlInbox::new();
        let tare = TareRequestSignal::new();
        let mut channel = ControlChannel::new(&inbox, &tare);

        block_on(async {
            for id in 0..MAX_CONNECTIONS as u8 {
                assert_eq!(
                    channel.handle(ControlEvent::Connected(ConnectionId(id))).await,
                    ControlOutcome::Opened
                );
            }
            let extra = ConnectionId(MAX_CONNECTIONS as u8);
            assert_eq!(channel.handle(ControlEvent::Connected(extra)).await, ControlOutcome::Dropped);
            assert!(!channel.is_open(extra));
            assert_eq!(
                channel.handle(ControlEvent::Connected(ConnectionId(0))).await,
                ControlOutcome::Dropped
            );
        });
    }

    #[test]
    fn sender_rejects_long_payloads_and_full_inbox() {
        let inbox = ControlInbox::new();
        let sender = ControlSender::new(&inbox);

        assert_eq!(
            sender.message(CLIENT, &[b'a'; MESSAGE_CAPACITY + 1]),
            Err(PostError::PayloadTooLong)
        );
        for _ in 0..CONTROL_INBOX_DEPTH {
            sender.connected(CLIENT).unwrap();
        }
        assert_eq!(sender.disconnected(CLIENT), Err(PostError::InboxFull));
    }

    #[test]
    fn events_are_handled_in_order() {
        let inbox = ControlInbox::new();
        let tare = TareRequestSignal::new();
        let sender = ControlSender::new(&inbox);
        let mut channel = ControlChannel::new(&inbox, &tare);

        sender.connected(CLIENT).unwrap();
        sender.message(CLIENT, br#"{"command":"tare"}"#).unwrap();
        sender.disconnected(CLIENT).unwrap();

        block_on(async {
            let mut outcomes = [ControlOutcome::Dropped; 3];
            for outcome in outcomes.iter_mut() {
                let event = channel.next_event().await;
                *outcome = channel.handle(event).await;
            }
            assert_eq!(
                outcomes,
                [ControlOutcome::Opened, ControlOutcome::TareRequested, ControlOutcome::Closed]
            );
        });
    }
}
