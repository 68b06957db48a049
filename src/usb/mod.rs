// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

//! USB-MIDI 1.0 event packets.
//!
//! Every MIDI message except SysEx maps onto a single 4-byte packet. SysEx
//! is cut into 3-byte segments, each in a packet of its own, that share the
//! cable number of the stream.

use crate::{
    data_len, is_data_byte, is_real_time_status, DecodeError, Message, MessageKind, ShortMessage,
    SysEx, DEFAULT_MAX_SYS_EX_LEN, SYS_EX_END, SYS_EX_START,
};

mod packet;
pub use self::packet::{split_packets, CableNumber, CodeIndexNumber, EventPacket, EVENT_PACKET_LEN};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SysExState {
    Idle,
    Receiving { cable: CableNumber },
    /// Overflowed, skipping segments until the run ends.
    Discarding { cable: CableNumber },
}

/// SysEx reassembly state of a USB packet stream.
#[derive(Debug, Clone)]
pub struct UsbDecoder {
    max_sys_ex_len: usize,
    sys_ex_state: SysExState,
    sys_ex: Vec<u8>,
}

impl Default for UsbDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SYS_EX_LEN)
    }
}

impl UsbDecoder {
    #[must_use]
    pub const fn new(max_sys_ex_len: usize) -> Self {
        Self {
            max_sys_ex_len,
            sys_ex_state: SysExState::Idle,
            sys_ex: Vec::new(),
        }
    }

    /// Cable of the SysEx run in progress.
    #[must_use]
    pub const fn sys_ex_cable(&self) -> Option<CableNumber> {
        match self.sys_ex_state {
            SysExState::Idle => None,
            SysExState::Receiving { cable } | SysExState::Discarding { cable } => Some(cable),
        }
    }

    pub fn reset(&mut self) {
        self.abandon_sys_ex();
    }

    fn abandon_sys_ex(&mut self) {
        self.sys_ex_state = SysExState::Idle;
        self.sys_ex.clear();
    }

    /// Decode a single packet.
    ///
    /// Returns `None` for SysEx segments that do not end the run.
    pub fn decode_packet(&mut self, packet: EventPacket) -> Result<Option<Message>, DecodeError> {
        let cin = packet.code_index_number();
        let cable = packet.cable();
        let payload = packet.payload();
        match cin {
            CodeIndexNumber::Miscellaneous | CodeIndexNumber::CableEvent => {
                Err(DecodeError::UnknownCodeIndexNumber { cin: cin as u8 })
            }
            CodeIndexNumber::SysExStart => self.decode_sys_ex(cable, &payload, false),
            CodeIndexNumber::SysExEnd2 => self.decode_sys_ex(cable, &payload[..2], true),
            CodeIndexNumber::SysExEnd3 => self.decode_sys_ex(cable, &payload, true),
            CodeIndexNumber::SystemCommonOrSysExEnd1 => {
                let [status, ..] = payload;
                if status == SYS_EX_END {
                    return self.decode_sys_ex(cable, &payload[..1], true);
                }
                if data_len(status) != Some(0) {
                    return Err(malformed(status));
                }
                decode_short(status, &[])
            }
            CodeIndexNumber::SingleByte => {
                let [byte, ..] = payload;
                if !is_real_time_status(byte) && data_len(byte) != Some(0) {
                    return Err(malformed(byte));
                }
                decode_short(byte, &[])
            }
            CodeIndexNumber::SystemCommon2 | CodeIndexNumber::SystemCommon3 => {
                let [status, data @ ..] = payload;
                let expected_len = cin.payload_len().map(|len| len - 1);
                if MessageKind::from_status(status) != Some(MessageKind::SystemCommon)
                    || data_len(status) != expected_len
                {
                    return Err(malformed(status));
                }
                decode_short(status, &data[..expected_len.unwrap_or(0)])
            }
            CodeIndexNumber::NoteOff
            | CodeIndexNumber::NoteOn
            | CodeIndexNumber::PolyPressure
            | CodeIndexNumber::ControlChange
            | CodeIndexNumber::ProgramChange
            | CodeIndexNumber::ChannelPressure
            | CodeIndexNumber::PitchBend => {
                let [status, data @ ..] = payload;
                if status >> 4 != cin as u8 {
                    return Err(malformed(status));
                }
                let len = data_len(status).unwrap_or(0);
                decode_short(status, &data[..len])
            }
        }
    }

    /// Decode multiple packets, collecting all decoded messages.
    ///
    /// Decode errors are logged and skipped.
    pub fn decode_packets(
        &mut self,
        packets: impl IntoIterator<Item = EventPacket>,
        messages: &mut impl Extend<Message>,
    ) {
        for packet in packets {
            match self.decode_packet(packet) {
                Ok(Some(message)) => messages.extend(Some(message)),
                Ok(None) => (),
                Err(err) => {
                    log::debug!("Skipping USB packet {packet:02x?}: {err}");
                }
            }
        }
    }

    fn decode_sys_ex(
        &mut self,
        cable: CableNumber,
        segment: &[u8],
        last: bool,
    ) -> Result<Option<Message>, DecodeError> {
        let (start, segment) = match segment.split_first() {
            Some((&SYS_EX_START, rest)) => (true, rest),
            _ => (false, segment),
        };
        let segment = if last {
            let Some((&SYS_EX_END, body)) = segment.split_last() else {
                self.abandon_sys_ex();
                return Err(malformed(segment.last().copied().unwrap_or(SYS_EX_START)));
            };
            body
        } else {
            segment
        };
        if start {
            if let Some(previous) = self.sys_ex_cable() {
                log::debug!(
                    "Abandoning SysEx on cable {previous} after {len} byte(s)",
                    len = self.sys_ex.len()
                );
            }
            self.sys_ex.clear();
            self.sys_ex_state = SysExState::Receiving { cable };
        } else {
            match self.sys_ex_cable() {
                None => {
                    return Err(malformed(segment.first().copied().unwrap_or(SYS_EX_END)));
                }
                Some(previous) if previous != cable => {
                    log::debug!(
                        "SysEx on cable {previous} interrupted by continuation on cable {cable}"
                    );
                    self.abandon_sys_ex();
                    return Err(malformed(segment.first().copied().unwrap_or(SYS_EX_END)));
                }
                Some(_) => (),
            }
        }
        if matches!(self.sys_ex_state, SysExState::Discarding { .. }) {
            if last {
                self.abandon_sys_ex();
            }
            return Ok(None);
        }
        if let Some(&byte) = segment.iter().find(|&&byte| !is_data_byte(byte)) {
            self.abandon_sys_ex();
            return Err(malformed(byte));
        }
        if self.sys_ex.len() + segment.len() > self.max_sys_ex_len {
            self.sys_ex.clear();
            self.sys_ex_state = if last {
                SysExState::Idle
            } else {
                SysExState::Discarding { cable }
            };
            return Err(DecodeError::SysExBufferOverflow {
                max_len: self.max_sys_ex_len,
            });
        }
        self.sys_ex.extend_from_slice(segment);
        if !last {
            return Ok(None);
        }
        self.sys_ex_state = SysExState::Idle;
        let body = std::mem::take(&mut self.sys_ex);
        Ok(Some(SysEx::from_body_unchecked(body).into()))
    }
}

fn decode_short(status: u8, data: &[u8]) -> Result<Option<Message>, DecodeError> {
    match ShortMessage::new(status, data) {
        Ok(message) => Ok(Some(message.into())),
        Err(err) => {
            log::debug!("Invalid message in USB packet: {err}");
            let byte = data
                .iter()
                .copied()
                .find(|&byte| !is_data_byte(byte))
                .unwrap_or(status);
            Err(malformed(byte))
        }
    }
}

const fn malformed(byte: u8) -> DecodeError {
    DecodeError::MalformedByteSequence { byte }
}

/// Code index number of a single-packet message.
#[must_use]
pub fn code_index_number(message: &ShortMessage) -> CodeIndexNumber {
    let status = message.status();
    if message.kind().is_channel_voice() {
        return CodeIndexNumber::from_repr(status >> 4).unwrap_or(CodeIndexNumber::SingleByte);
    }
    match data_len(status) {
        Some(1) if !is_real_time_status(status) => CodeIndexNumber::SystemCommon2,
        Some(2) => CodeIndexNumber::SystemCommon3,
        Some(0) if !is_real_time_status(status) => CodeIndexNumber::SystemCommonOrSysExEnd1,
        _ => CodeIndexNumber::SingleByte,
    }
}

/// Encode a message into the packets for a virtual cable.
#[must_use]
pub fn encode_message(message: &Message, cable: CableNumber) -> EventPackets<'_> {
    let inner = match message {
        Message::Short(short) => {
            let mut payload = [0; 3];
            payload[0] = short.status();
            payload[1..=short.data().len()].copy_from_slice(short.data());
            let packet = EventPacket::new(cable, code_index_number(short), payload);
            EventPacketsInner::Short(Some(packet))
        }
        Message::SysEx(sys_ex) => EventPacketsInner::SysEx {
            body: sys_ex.body(),
            pos: 0,
        },
    };
    EventPackets { cable, inner }
}

#[derive(Debug, Clone)]
enum EventPacketsInner<'a> {
    Short(Option<EventPacket>),
    SysEx {
        body: &'a [u8],
        /// Position in the framed byte sequence `F0 body F7`.
        pos: usize,
    },
}

/// Packets of a single message.
#[derive(Debug, Clone)]
pub struct EventPackets<'a> {
    cable: CableNumber,
    inner: EventPacketsInner<'a>,
}

impl Iterator for EventPackets<'_> {
    type Item = EventPacket;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            EventPacketsInner::Short(packet) => packet.take(),
            EventPacketsInner::SysEx { body, pos } => {
                let framed_len = body.len() + 2;
                let remaining = framed_len.checked_sub(*pos).filter(|&len| len > 0)?;
                let (cin, len) = match remaining {
                    1 => (CodeIndexNumber::SystemCommonOrSysExEnd1, 1),
                    2 => (CodeIndexNumber::SysExEnd2, 2),
                    3 => (CodeIndexNumber::SysExEnd3, 3),
                    _ => (CodeIndexNumber::SysExStart, 3),
                };
                let mut payload = [0; 3];
                for (offset, byte) in payload[..len].iter_mut().enumerate() {
                    let index = *pos + offset;
                    *byte = if index == 0 {
                        SYS_EX_START
                    } else if index == framed_len - 1 {
                        SYS_EX_END
                    } else {
                        body[index - 1]
                    };
                }
                *pos += len;
                Some(EventPacket::new(self.cable, cin, payload))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = match &self.inner {
            EventPacketsInner::Short(packet) => usize::from(packet.is_some()),
            EventPacketsInner::SysEx { body, pos } => (body.len() + 2 - *pos).div_ceil(3),
        };
        (len, Some(len))
    }
}

impl ExactSizeIterator for EventPackets<'_> {}
