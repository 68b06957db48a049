// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

//! Transports backed by bounded channels.
//!
//! Each constructor returns two crossed ends. One end is handed to the
//! router, the other one to the interrupt handler, driver thread, or test
//! that services the physical interface. Both ends implement the same
//! transport trait with reading and writing swapped.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::{DinLine, TransportBackpressure, UsbEndpoint};
use crate::EventPacket;

/// One end of a queue-backed serial line.
#[derive(Debug, Clone)]
pub struct ChannelDinLine {
    rx: Receiver<u8>,
    tx: Sender<u8>,
}

/// Create both ends of a queue-backed serial line.
///
/// Each direction buffers at most `capacity` bytes.
#[must_use]
pub fn din_line(capacity: usize) -> (ChannelDinLine, ChannelDinLine) {
    let (tx_a, rx_b) = bounded(capacity);
    let (tx_b, rx_a) = bounded(capacity);
    (
        ChannelDinLine { rx: rx_a, tx: tx_a },
        ChannelDinLine { rx: rx_b, tx: tx_b },
    )
}

impl ChannelDinLine {
    /// Block until a byte is received or the timeout expires.
    pub fn recv_byte_timeout(&self, timeout: Duration) -> Option<u8> {
        recv_timeout(&self.rx, timeout)
    }

    /// Write as many bytes as possible.
    ///
    /// Returns the number of bytes that have been accepted.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        bytes
            .iter()
            .take_while(|&&byte| self.write_byte(byte).is_ok())
            .count()
    }

    /// Drain all bytes that are currently available.
    #[must_use]
    pub fn read_available(&mut self) -> Vec<u8> {
        self.rx.try_iter().collect()
    }
}

impl DinLine for ChannelDinLine {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.try_recv().ok()
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), TransportBackpressure> {
        try_send(&self.tx, byte)
    }
}

/// One end of a queue-backed pair of USB endpoints.
#[derive(Debug, Clone)]
pub struct ChannelUsbEndpoint {
    rx: Receiver<EventPacket>,
    tx: Sender<EventPacket>,
}

/// Create both ends of a queue-backed pair of USB endpoints.
///
/// Each direction buffers at most `capacity` packets.
#[must_use]
pub fn usb_endpoint(capacity: usize) -> (ChannelUsbEndpoint, ChannelUsbEndpoint) {
    let (tx_a, rx_b) = bounded(capacity);
    let (tx_b, rx_a) = bounded(capacity);
    (
        ChannelUsbEndpoint { rx: rx_a, tx: tx_a },
        ChannelUsbEndpoint { rx: rx_b, tx: tx_b },
    )
}

impl ChannelUsbEndpoint {
    /// Block until a packet is received or the timeout expires.
    pub fn recv_packet_timeout(&self, timeout: Duration) -> Option<EventPacket> {
        recv_timeout(&self.rx, timeout)
    }

    /// Drain all packets that are currently available.
    #[must_use]
    pub fn read_available(&mut self) -> Vec<EventPacket> {
        self.rx.try_iter().collect()
    }
}

impl UsbEndpoint for ChannelUsbEndpoint {
    fn read_packet(&mut self) -> Option<EventPacket> {
        self.rx.try_recv().ok()
    }

    fn write_packet(&mut self, packet: EventPacket) -> Result<(), TransportBackpressure> {
        try_send(&self.tx, packet)
    }
}

fn try_send<T>(tx: &Sender<T>, item: T) -> Result<(), TransportBackpressure> {
    match tx.try_send(item) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => Err(TransportBackpressure),
        Err(TrySendError::Disconnected(_)) => {
            log::warn!("Channel transport disconnected");
            Err(TransportBackpressure)
        }
    }
}

fn recv_timeout<T>(rx: &Receiver<T>, timeout: Duration) -> Option<T> {
    match rx.recv_timeout(timeout) {
        Ok(item) => Some(item),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => {
            log::debug!("Channel transport disconnected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossed_din_line_ends() {
        let (mut device, mut host) = din_line(2);
        assert_eq!(2, host.write_bytes(&[0x90, 0x40, 0x7f]));
        assert_eq!(Some(0x90), device.read_byte());
        assert_eq!(Some(0x40), device.read_byte());
        assert_eq!(None, device.read_byte());
        device.write_byte(0xf8).unwrap();
        assert_eq!(vec![0xf8], host.read_available());
    }

    #[test]
    fn full_usb_endpoint_signals_backpressure() {
        let (mut device, mut host) = usb_endpoint(1);
        let packet = EventPacket::from_bytes([0x0f, 0xf8, 0x00, 0x00]);
        device.write_packet(packet).unwrap();
        assert_eq!(Err(TransportBackpressure), device.write_packet(packet));
        assert_eq!(Some(packet), host.read_packet());
        assert!(device.write_packet(packet).is_ok());
    }

    #[test]
    fn disconnected_end_signals_backpressure() {
        let (mut device, host) = din_line(1);
        drop(host);
        assert_eq!(Err(TransportBackpressure), device.write_byte(0x00));
        assert_eq!(None, device.read_byte());
    }
}
