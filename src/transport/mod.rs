// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

//! Byte and packet transports that are driven by the router.
//!
//! Implementations wrap a UART, a USB device stack, or a queue that is
//! shared with another execution context. All operations must return
//! immediately.

use std::ops::{Deref, DerefMut};

use thiserror::Error;

use crate::EventPacket;

pub mod channel;

/// The transport cannot accept more data right now.
///
/// The caller keeps the data and retries later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transport not ready")]
pub struct TransportBackpressure;

/// A serial MIDI line.
pub trait DinLine {
    /// Receive the next byte, if available.
    fn read_byte(&mut self) -> Option<u8>;

    /// Transmit a single byte.
    fn write_byte(&mut self, byte: u8) -> Result<(), TransportBackpressure>;
}

impl<D> DinLine for D
where
    D: DerefMut,
    <D as Deref>::Target: DinLine,
{
    fn read_byte(&mut self) -> Option<u8> {
        self.deref_mut().read_byte()
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), TransportBackpressure> {
        self.deref_mut().write_byte(byte)
    }
}

/// The pair of bulk endpoints of a USB MIDI-Streaming interface.
///
/// Packets of all virtual cables share these endpoints.
pub trait UsbEndpoint {
    /// Receive the next packet from the host (OUT endpoint), if available.
    fn read_packet(&mut self) -> Option<EventPacket>;

    /// Queue a packet for the host (IN endpoint).
    fn write_packet(&mut self, packet: EventPacket) -> Result<(), TransportBackpressure>;
}

impl<D> UsbEndpoint for D
where
    D: DerefMut,
    <D as Deref>::Target: UsbEndpoint,
{
    fn read_packet(&mut self) -> Option<EventPacket> {
        self.deref_mut().read_packet()
    }

    fn write_packet(&mut self, packet: EventPacket) -> Result<(), TransportBackpressure> {
        self.deref_mut().write_packet(packet)
    }
}
