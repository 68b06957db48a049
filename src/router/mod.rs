// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

//! Cooperative round-robin scheduling of all ports.

use std::collections::VecDeque;

use crate::{
    encode_message, is_real_time_status, CableNumber, CodeIndexNumber, ConfigurationError,
    DecodeError, DinDecoder, DinEncoder, DinEncoderConfig, DinLine, DinLineIndex, Direction,
    Error, EventPacket, Message, Port, PortId, PortTable, TransportBackpressure, UsbDecoder,
    UsbEndpoint, DEFAULT_MAX_SYS_EX_LEN,
};

#[cfg(feature = "router-thread")]
pub mod thread;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Upper bound of a reassembled SysEx body, in bytes.
    pub max_sys_ex_len: usize,

    /// Packets per output port that are buffered between
    /// demultiplexing the shared USB OUT endpoint and decoding.
    pub usb_staging_capacity: usize,

    /// Encoded units (packets or bytes) per port that are buffered
    /// while the transport is not ready.
    ///
    /// A single message is always accepted into an empty outbox,
    /// even if it exceeds this capacity.
    pub outbox_capacity: usize,

    /// System Real-Time units per port and pass that are processed
    /// in addition to the regular unit.
    pub real_time_burst: usize,

    pub din_encoder: DinEncoderConfig,
}

impl RouterConfig {
    pub const DEFAULT_USB_STAGING_CAPACITY: usize = 16;
    pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;
    pub const DEFAULT_REAL_TIME_BURST: usize = 8;
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_sys_ex_len: DEFAULT_MAX_SYS_EX_LEN,
            usb_staging_capacity: Self::DEFAULT_USB_STAGING_CAPACITY,
            outbox_capacity: Self::DEFAULT_OUTBOX_CAPACITY,
            real_time_burst: Self::DEFAULT_REAL_TIME_BURST,
            din_encoder: DinEncoderConfig::default(),
        }
    }
}

/// Counters of a single port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    /// Transport units (bytes or packets) that have been decoded.
    pub units: u64,

    /// Decoded messages that have been forwarded.
    pub messages: u64,

    pub decode_errors: u64,

    /// System Real-Time messages that have been rejected by a transport.
    pub real_time_dropped: u64,

    /// Passes in which pending input of the port was held back,
    /// because a target still had pending output.
    pub backpressure_stalls: u64,
}

/// Receives messages that have no outgoing transport.
///
/// Invoked for messages decoded from output ports that are neither
/// connected to a DIN line nor paired with an input port.
pub trait MessageHandler {
    fn handle_message(&mut self, port: &Port, message: &Message);
}

impl<F> MessageHandler for F
where
    F: FnMut(&Port, &Message),
{
    fn handle_message(&mut self, port: &Port, message: &Message) {
        self(port, message);
    }
}

pub type BoxedMessageHandler = Box<dyn MessageHandler + Send>;

#[derive(Debug)]
enum Source {
    /// Only fed by the application.
    None,
    Din {
        line: usize,
        decoder: DinDecoder,
        /// Byte that has been read ahead while looking for
        /// System Real-Time input.
        held_byte: Option<u8>,
    },
    Usb {
        staging: VecDeque<EventPacket>,
        decoder: UsbDecoder,
    },
}

impl Source {
    fn reset_decoder(&mut self) {
        match self {
            Self::None => (),
            Self::Din { decoder, .. } => decoder.reset(),
            Self::Usb { decoder, .. } => decoder.reset(),
        }
    }
}

fn is_real_time_packet(packet: &EventPacket) -> bool {
    let [status, ..] = packet.payload();
    packet.code_index_number() == CodeIndexNumber::SingleByte && is_real_time_status(status)
}

#[derive(Debug)]
enum Sink {
    Usb {
        cable: CableNumber,
        outbox: VecDeque<EventPacket>,
    },
    Din {
        line: usize,
        encoder: DinEncoder,
        outbox: VecDeque<u8>,
    },
}

impl Sink {
    fn has_backlog(&self) -> bool {
        match self {
            Self::Usb { outbox, .. } => !outbox.is_empty(),
            Self::Din { outbox, .. } => !outbox.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    source: Source,
    sink: Option<Sink>,
    /// Slots whose sinks receive the decoded messages.
    targets: Vec<usize>,
    stats: PortStats,
}

/// Translates between the USB endpoint and the DIN lines of all ports.
///
/// The router never blocks. It must be driven by calling [`Router::run_pass`]
/// repeatedly, either periodically or whenever a transport has new data.
#[allow(missing_debug_implementations)]
pub struct Router<U, D> {
    table: PortTable,
    config: RouterConfig,
    usb: U,
    din_lines: Vec<D>,
    slots: Vec<Slot>,
    /// Packet from the USB OUT endpoint that did not fit into its
    /// staging queue.
    held_packet: Option<EventPacket>,
    handler: Option<BoxedMessageHandler>,
    unknown_cable_packets: u64,
}

impl<U, D> Router<U, D>
where
    U: UsbEndpoint,
    D: DinLine,
{
    /// Set up the codec state of all ports.
    ///
    /// The DIN lines are indexed by [`DinLineIndex`].
    pub fn new(
        table: PortTable,
        config: RouterConfig,
        usb: U,
        din_lines: Vec<D>,
    ) -> Result<Self, ConfigurationError> {
        let mut slots = Vec::with_capacity(table.ports().len());
        for port in table.ports() {
            let line = port
                .din_line()
                .map(|din_line| {
                    let line = din_line.index();
                    if line < din_lines.len() {
                        Ok(line)
                    } else {
                        Err(ConfigurationError::MissingDinLine {
                            port: port.id(),
                            din_line,
                        })
                    }
                })
                .transpose()?;
            let (source, sink) = match port.direction() {
                Direction::Input => {
                    let source = line.map_or(Source::None, |line| Source::Din {
                        line,
                        decoder: DinDecoder::new(config.max_sys_ex_len),
                        held_byte: None,
                    });
                    let sink = Sink::Usb {
                        cable: port.cable(),
                        outbox: VecDeque::new(),
                    };
                    (source, Some(sink))
                }
                Direction::Output => {
                    let source = Source::Usb {
                        staging: VecDeque::with_capacity(config.usb_staging_capacity),
                        decoder: UsbDecoder::new(config.max_sys_ex_len),
                    };
                    let sink = line.map(|line| Sink::Din {
                        line,
                        encoder: DinEncoder::new(config.din_encoder),
                        outbox: VecDeque::new(),
                    });
                    (source, sink)
                }
            };
            slots.push(Slot {
                source,
                sink,
                targets: Vec::new(),
                stats: PortStats::default(),
            });
        }
        for (index, port) in table.ports().iter().enumerate() {
            let mut targets = Vec::with_capacity(2);
            match port.direction() {
                Direction::Input => {
                    targets.push(index);
                }
                Direction::Output => {
                    if slots[index].sink.is_some() {
                        targets.push(index);
                    }
                    if let Some(paired) = table.paired_port(port) {
                        if let Some(paired_index) = table.position(paired.id()) {
                            targets.push(paired_index);
                        }
                    }
                }
            }
            slots[index].targets = targets;
        }
        Ok(Self {
            table,
            config,
            usb,
            din_lines,
            slots,
            held_packet: None,
            handler: None,
            unknown_cable_packets: 0,
        })
    }

    #[must_use]
    pub const fn table(&self) -> &PortTable {
        &self.table
    }

    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn set_message_handler(&mut self, handler: impl MessageHandler + Send + 'static) {
        self.handler = Some(Box::new(handler));
    }

    pub fn take_message_handler(&mut self) -> Option<BoxedMessageHandler> {
        self.handler.take()
    }

    #[must_use]
    pub fn port_stats(&self, port: PortId) -> Option<&PortStats> {
        self.table
            .position(port)
            .map(|index| &self.slots[index].stats)
    }

    /// Packets from the host that have been dropped, because their
    /// cable number is not assigned to any output port.
    #[must_use]
    pub const fn unknown_cable_packets(&self) -> u64 {
        self.unknown_cable_packets
    }

    #[must_use]
    pub const fn usb(&self) -> &U {
        &self.usb
    }

    pub fn usb_mut(&mut self) -> &mut U {
        &mut self.usb
    }

    #[must_use]
    pub fn din_line(&self, index: DinLineIndex) -> Option<&D> {
        self.din_lines.get(index.index())
    }

    pub fn din_line_mut(&mut self, index: DinLineIndex) -> Option<&mut D> {
        self.din_lines.get_mut(index.index())
    }

    /// Check if any port has encoded output that is still waiting
    /// for its transport.
    #[must_use]
    pub fn has_backlog(&self) -> bool {
        self.held_packet.is_some()
            || self
                .slots
                .iter()
                .any(|slot| slot.sink.as_ref().is_some_and(Sink::has_backlog))
    }

    #[must_use]
    pub fn into_parts(self) -> (U, Vec<D>) {
        let Self { usb, din_lines, .. } = self;
        (usb, din_lines)
    }

    /// Visit every port once.
    ///
    /// Returns the number of transport units that have been decoded.
    pub fn run_pass(&mut self) -> usize {
        self.demux_usb();
        let mut units = 0;
        for index in 0..self.slots.len() {
            units += self.visit(index);
        }
        units
    }

    /// Inject a message into the outgoing transport of a port.
    ///
    /// Only returns [`Error::Backpressure`] if the message could not even
    /// be queued. Queued output is transmitted during the following passes.
    pub fn send(&mut self, port: PortId, message: &Message) -> crate::Result<()> {
        let index = self.table.position(port).ok_or(Error::UnknownPort(port))?;
        if self.slots[index].sink.is_none() {
            return Err(Error::NoOutgoingTransport(port));
        }
        if message.is_real_time() {
            self.write_real_time(index, message.status())?;
            return Ok(());
        }
        self.flush(index);
        self.enqueue(index, message)?;
        self.flush(index);
        Ok(())
    }

    fn demux_usb(&mut self) {
        let capacity = self.config.usb_staging_capacity.max(1);
        let max_packets = capacity * self.table.count(Direction::Output);
        for _ in 0..max_packets {
            let Some(packet) = self.held_packet.take().or_else(|| self.usb.read_packet()) else {
                break;
            };
            let Some(index) = self.table.position_for(Direction::Output, packet.cable()) else {
                self.unknown_cable_packets += 1;
                log::warn!(
                    "Dropping USB packet {packet:02x?} for unknown cable {cable}",
                    cable = packet.cable()
                );
                continue;
            };
            let Source::Usb { staging, .. } = &mut self.slots[index].source else {
                continue;
            };
            if staging.len() >= capacity {
                log::trace!(
                    "Staging queue of cable {cable} is full",
                    cable = packet.cable()
                );
                self.held_packet = Some(packet);
                break;
            }
            staging.push_back(packet);
        }
    }

    fn visit(&mut self, index: usize) -> usize {
        // System Real-Time input overtakes both the pending output
        // of the targets and the regular unit of this pass.
        let mut units = self.serve_real_time(index);
        self.flush_targets(index);
        if self.has_target_backlog(index) {
            if self.has_pending_input(index) {
                self.slots[index].stats.backpressure_stalls += 1;
            }
            self.slots[index].stats.units += units as u64;
            return units;
        }
        let mut real_time_units = units;
        while let Some(decoded) = self.pull_unit(index) {
            units += 1;
            match decoded {
                Ok(Some(message)) if message.is_real_time() => {
                    self.route_real_time(index, &message);
                    real_time_units += 1;
                    if real_time_units >= self.config.real_time_burst {
                        break;
                    }
                }
                Ok(Some(message)) => {
                    self.route(index, &message);
                    break;
                }
                Ok(None) => break,
                Err(err) => {
                    self.slots[index].stats.decode_errors += 1;
                    log::debug!(
                        "Decoding input of port {port} failed: {err}",
                        port = self.table.ports()[index].id()
                    );
                    // The decoder skips the remainder of an oversized
                    // SysEx on its own
                    if !matches!(err, DecodeError::SysExBufferOverflow { .. }) {
                        self.slots[index].source.reset_decoder();
                    }
                    break;
                }
            }
        }
        self.slots[index].stats.units += units as u64;
        self.flush_targets(index);
        units
    }

    /// Forward pending System Real-Time input of a port, up to
    /// [`RouterConfig::real_time_burst`] messages.
    fn serve_real_time(&mut self, index: usize) -> usize {
        let mut units = 0;
        while units < self.config.real_time_burst {
            let Some(message) = self.pull_real_time(index) else {
                break;
            };
            units += 1;
            self.route_real_time(index, &message);
        }
        units
    }

    fn pull_real_time(&mut self, index: usize) -> Option<Message> {
        match &mut self.slots[index].source {
            Source::None => None,
            Source::Din {
                line,
                decoder,
                held_byte,
            } => {
                if held_byte.is_some() {
                    return None;
                }
                let byte = self.din_lines[*line].read_byte()?;
                if !is_real_time_status(byte) {
                    *held_byte = Some(byte);
                    return None;
                }
                log::trace!("Received DIN byte {byte:#04x} on line {line}");
                decoder.decode_byte(byte).ok().flatten()
            }
            Source::Usb { staging, decoder } => {
                let position = staging.iter().position(is_real_time_packet)?;
                let packet = staging.remove(position)?;
                log::trace!("Received USB packet {packet:02x?}");
                decoder.decode_packet(packet).ok().flatten()
            }
        }
    }

    fn has_target_backlog(&self, index: usize) -> bool {
        self.slots[index].targets.iter().any(|&target| {
            self.slots[target]
                .sink
                .as_ref()
                .is_some_and(Sink::has_backlog)
        })
    }

    fn flush_targets(&mut self, index: usize) {
        for target_index in 0..self.slots[index].targets.len() {
            let target = self.slots[index].targets[target_index];
            self.flush(target);
        }
    }

    fn has_pending_input(&self, index: usize) -> bool {
        match &self.slots[index].source {
            Source::None => false,
            Source::Din { held_byte, .. } => held_byte.is_some(),
            Source::Usb { staging, .. } => !staging.is_empty(),
        }
    }

    fn pull_unit(&mut self, index: usize) -> Option<Result<Option<Message>, DecodeError>> {
        match &mut self.slots[index].source {
            Source::None => None,
            Source::Din {
                line,
                decoder,
                held_byte,
            } => {
                let byte = match held_byte.take() {
                    Some(byte) => byte,
                    None => self.din_lines[*line].read_byte()?,
                };
                log::trace!("Received DIN byte {byte:#04x} on line {line}");
                Some(decoder.decode_byte(byte))
            }
            Source::Usb { staging, decoder } => {
                let packet = staging.pop_front()?;
                log::trace!("Received USB packet {packet:02x?}");
                Some(decoder.decode_packet(packet))
            }
        }
    }

    fn route(&mut self, index: usize, message: &Message) {
        self.slots[index].stats.messages += 1;
        if self.slots[index].targets.is_empty() {
            self.handle_unrouted(index, message);
            return;
        }
        for target_index in 0..self.slots[index].targets.len() {
            let target = self.slots[index].targets[target_index];
            if let Err(err) = self.enqueue(target, message) {
                // Only happens for a full outbox that has been flushed
                // by another source of the same target in this pass
                log::warn!(
                    "Dropping message for port {port}: {err}",
                    port = self.table.ports()[target].id()
                );
            }
        }
    }

    fn route_real_time(&mut self, index: usize, message: &Message) {
        self.slots[index].stats.messages += 1;
        if self.slots[index].targets.is_empty() {
            self.handle_unrouted(index, message);
            return;
        }
        for target_index in 0..self.slots[index].targets.len() {
            let target = self.slots[index].targets[target_index];
            if self.write_real_time(target, message.status()).is_err() {
                self.slots[index].stats.real_time_dropped += 1;
                log::debug!(
                    "Dropping System Real-Time {status:#04x} for port {port}",
                    status = message.status(),
                    port = self.table.ports()[target].id()
                );
            }
        }
    }

    fn handle_unrouted(&mut self, index: usize, message: &Message) {
        let port = self.table.ports()[index];
        if let Some(handler) = &mut self.handler {
            handler.handle_message(&port, message);
        } else {
            log::trace!("Discarding message from port {port_id}", port_id = port.id());
        }
    }

    /// Bypasses the outbox.
    fn write_real_time(
        &mut self,
        index: usize,
        status: u8,
    ) -> Result<(), TransportBackpressure> {
        match &self.slots[index].sink {
            Some(Sink::Usb { cable, .. }) => {
                let packet = EventPacket::new(*cable, CodeIndexNumber::SingleByte, [status, 0, 0]);
                self.usb.write_packet(packet)
            }
            Some(Sink::Din { line, .. }) => self.din_lines[*line].write_byte(status),
            None => Ok(()),
        }
    }

    fn enqueue(
        &mut self,
        index: usize,
        message: &Message,
    ) -> Result<(), TransportBackpressure> {
        let capacity = self.config.outbox_capacity;
        match &mut self.slots[index].sink {
            Some(Sink::Usb { cable, outbox }) => {
                let packets = encode_message(message, *cable);
                if !outbox.is_empty() && outbox.len() + packets.len() > capacity {
                    return Err(TransportBackpressure);
                }
                outbox.extend(packets);
            }
            Some(Sink::Din {
                encoder, outbox, ..
            }) => {
                // Upper bound, running status might save a byte
                let max_len = match message {
                    Message::Short(short) => 1 + short.data().len(),
                    Message::SysEx(sys_ex) => 2 + sys_ex.len(),
                };
                if !outbox.is_empty() && outbox.len() + max_len > capacity {
                    return Err(TransportBackpressure);
                }
                encoder.encode(message, outbox);
            }
            None => (),
        }
        Ok(())
    }

    fn flush(&mut self, index: usize) {
        match &mut self.slots[index].sink {
            Some(Sink::Usb { outbox, .. }) => {
                while let Some(&packet) = outbox.front() {
                    if self.usb.write_packet(packet).is_err() {
                        break;
                    }
                    outbox.pop_front();
                }
            }
            Some(Sink::Din { line, outbox, .. }) => {
                let din_line = &mut self.din_lines[*line];
                while let Some(&byte) = outbox.front() {
                    if din_line.write_byte(byte).is_err() {
                        break;
                    }
                    outbox.pop_front();
                }
            }
            None => (),
        }
    }
}
