// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

//! Canonical MIDI messages, independent of the wire encoding.
//!
//! A [`Message`] is fully self-describing: the status byte is always kept
//! and determines both the kind and the number of data bytes. Codecs never
//! need their own state to interpret a message once it has been built.

use enum_as_inner::EnumAsInner;
use strum::{EnumCount, EnumIter, FromRepr, IntoStaticStr};
use thiserror::Error;


/// Opens a System Exclusive run.
pub const SYS_EX_START: u8 = 0xf0;

/// Closes a System Exclusive run (EOX).
pub const SYS_EX_END: u8 = 0xf7;

/// Default upper bound for the body of a reassembled SysEx message.
pub const DEFAULT_MAX_SYS_EX_LEN: usize = 1024;

#[must_use]
pub const fn is_status_byte(byte: u8) -> bool {
    byte & 0x80 != 0
}

#[must_use]
pub const fn is_data_byte(byte: u8) -> bool {
    !is_status_byte(byte)
}

#[must_use]
pub const fn is_real_time_status(byte: u8) -> bool {
    byte >= 0xf8
}

/// Number of data bytes that follow the given status byte.
///
/// Returns `None` for data bytes and for the SysEx markers, which are
/// followed by a variable number of bytes or none at all.
#[must_use]
pub const fn data_len(status: u8) -> Option<usize> {
    match status {
        0x80..=0xbf | 0xe0..=0xef | 0xf2 => Some(2),
        0xc0..=0xdf | 0xf1 | 0xf3 => Some(1),
        0xf4..=0xf6 | 0xf8..=0xff => Some(0),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMessage {
    #[error("empty message")]
    Empty,

    #[error("invalid status byte {0:#04x}")]
    Status(u8),

    #[error("invalid data byte {0:#04x}")]
    DataByte(u8),

    #[error("status {status:#04x} expects {expected} data byte(s) instead of {actual}")]
    DataLength {
        status: u8,
        expected: usize,
        actual: usize,
    },

    #[error("invalid channel {0}")]
    Channel(u8),

    #[error("pitch bend value {0} exceeds 14 bits")]
    PitchBend(u16),

    #[error("unterminated SysEx")]
    UnterminatedSysEx,
}

/// Zero-based MIDI channel, i.e. the lower nibble of a channel voice status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, derive_more::Display,
)]
#[repr(transparent)]
pub struct Channel(u8);

impl Channel {
    pub const COUNT: usize = 16;

    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < Self::COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        let Self(index) = self;
        index
    }

    const fn from_status(status: u8) -> Self {
        Self(status & 0x0f)
    }
}

impl TryFrom<u8> for Channel {
    type Error = InvalidMessage;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index).ok_or(InvalidMessage::Channel(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum MessageKind {
    NoteOff,
    NoteOn,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    SystemCommon,
    SystemRealTime,
    /// A complete System Exclusive body.
    ///
    /// The markers are implied and never part of the body.
    SysEx,
}

impl MessageKind {
    /// Classify a status byte.
    ///
    /// Returns `None` for data bytes and for a lone EOX.
    #[must_use]
    pub const fn from_status(status: u8) -> Option<Self> {
        let kind = match status {
            0x80..=0x8f => Self::NoteOff,
            0x90..=0x9f => Self::NoteOn,
            0xa0..=0xaf => Self::PolyPressure,
            0xb0..=0xbf => Self::ControlChange,
            0xc0..=0xcf => Self::ProgramChange,
            0xd0..=0xdf => Self::ChannelPressure,
            0xe0..=0xef => Self::PitchBend,
            SYS_EX_START => Self::SysEx,
            0xf1..=0xf6 => Self::SystemCommon,
            0xf8..=0xff => Self::SystemRealTime,
            _ => return None,
        };
        Some(kind)
    }

    #[must_use]
    pub const fn is_channel_voice(self) -> bool {
        self.status_nibble().is_some()
    }

    /// Upper nibble of the status byte for channel voice messages.
    #[must_use]
    pub const fn status_nibble(self) -> Option<u8> {
        let nibble = match self {
            Self::NoteOff => 0x8,
            Self::NoteOn => 0x9,
            Self::PolyPressure => 0xa,
            Self::ControlChange => 0xb,
            Self::ProgramChange => 0xc,
            Self::ChannelPressure => 0xd,
            Self::PitchBend => 0xe,
            Self::SystemCommon | Self::SystemRealTime | Self::SysEx => return None,
        };
        Some(nibble)
    }
}

/// Single-byte messages that may appear anywhere in a byte stream,
/// even between the data bytes of other messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumIter, EnumCount)]
#[repr(u8)]
pub enum RealTime {
    /// Sent 24 times per quarter note.
    TimingClock = 0xf8,
    /// Reserved, formerly used as a 10 ms tick.
    Tick = 0xf9,
    Start = 0xfa,
    Continue = 0xfb,
    Stop = 0xfc,
    /// Reserved
    Undefined = 0xfd,
    ActiveSensing = 0xfe,
    Reset = 0xff,
}

impl RealTime {
    #[must_use]
    pub const fn status(self) -> u8 {
        self as u8
    }
}

/// Channel voice, System Common, or System Real-Time message
/// with at most two data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortMessage {
    status: u8,
    len: u8,
    data: [u8; 2],
}

impl ShortMessage {
    pub fn new(status: u8, data: &[u8]) -> Result<Self, InvalidMessage> {
        let Some(expected) = data_len(status) else {
            return Err(InvalidMessage::Status(status));
        };
        if data.len() != expected {
            return Err(InvalidMessage::DataLength {
                status,
                expected,
                actual: data.len(),
            });
        }
        if let Some(&byte) = data.iter().find(|&&byte| is_status_byte(byte)) {
            return Err(InvalidMessage::DataByte(byte));
        }
        let mut bytes = [0; 2];
        bytes[..expected].copy_from_slice(data);
        #[allow(clippy::cast_possible_truncation)]
        let len = expected as u8;
        Ok(Self {
            status,
            len,
            data: bytes,
        })
    }

    #[must_use]
    pub const fn status(&self) -> u8 {
        self.status
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        // Only valid message starts pass the constructor.
        MessageKind::from_status(self.status).unwrap_or(MessageKind::SystemCommon)
    }
}

/// Body of a System Exclusive message without the enclosing markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SysEx {
    body: Vec<u8>,
}

impl SysEx {
    pub fn new(body: impl Into<Vec<u8>>) -> Result<Self, InvalidMessage> {
        let body = body.into();
        if let Some(&byte) = body.iter().find(|&&byte| is_status_byte(byte)) {
            return Err(InvalidMessage::DataByte(byte));
        }
        Ok(Self { body })
    }

    /// The caller guarantees that all bytes are data bytes.
    pub(crate) fn from_body_unchecked(body: Vec<u8>) -> Self {
        debug_assert!(body.iter().copied().all(is_data_byte));
        Self { body }
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// A MIDI event in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumAsInner, derive_more::From)]
pub enum Message {
    Short(ShortMessage),
    SysEx(SysEx),
}

impl Message {
    /// Parse a single, complete message from its raw bytes.
    ///
    /// SysEx messages must include both markers.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidMessage> {
        let Some((&status, data)) = bytes.split_first() else {
            return Err(InvalidMessage::Empty);
        };
        if status != SYS_EX_START {
            return ShortMessage::new(status, data).map(Into::into);
        }
        let Some((&SYS_EX_END, body)) = data.split_last() else {
            return Err(InvalidMessage::UnterminatedSysEx);
        };
        SysEx::new(body).map(Into::into)
    }

    fn channel_voice(
        kind: MessageKind,
        channel: Channel,
        data: &[u8],
    ) -> Result<Self, InvalidMessage> {
        debug_assert!(kind.is_channel_voice());
        let nibble = kind.status_nibble().unwrap_or_default();
        ShortMessage::new(nibble << 4 | channel.index(), data).map(Into::into)
    }

    pub fn note_off(channel: Channel, note: u8, velocity: u8) -> Result<Self, InvalidMessage> {
        Self::channel_voice(MessageKind::NoteOff, channel, &[note, velocity])
    }

    pub fn note_on(channel: Channel, note: u8, velocity: u8) -> Result<Self, InvalidMessage> {
        Self::channel_voice(MessageKind::NoteOn, channel, &[note, velocity])
    }

    pub fn poly_pressure(channel: Channel, note: u8, pressure: u8) -> Result<Self, InvalidMessage> {
        Self::channel_voice(MessageKind::PolyPressure, channel, &[note, pressure])
    }

    pub fn control_change(
        channel: Channel,
        controller: u8,
        value: u8,
    ) -> Result<Self, InvalidMessage> {
        Self::channel_voice(MessageKind::ControlChange, channel, &[controller, value])
    }

    pub fn program_change(channel: Channel, program: u8) -> Result<Self, InvalidMessage> {
        Self::channel_voice(MessageKind::ProgramChange, channel, &[program])
    }

    pub fn channel_pressure(channel: Channel, pressure: u8) -> Result<Self, InvalidMessage> {
        Self::channel_voice(MessageKind::ChannelPressure, channel, &[pressure])
    }

    /// Pitch bend with a 14-bit value, centered at `0x2000`.
    pub fn pitch_bend(channel: Channel, value: u16) -> Result<Self, InvalidMessage> {
        if value > 0x3fff {
            return Err(InvalidMessage::PitchBend(value));
        }
        #[allow(clippy::cast_possible_truncation)]
        let (lsb, msb) = ((value & 0x7f) as u8, (value >> 7) as u8);
        Self::channel_voice(MessageKind::PitchBend, channel, &[lsb, msb])
    }

    /// System Common message `0xF1..=0xF6`.
    pub fn system_common(status: u8, data: &[u8]) -> Result<Self, InvalidMessage> {
        if !matches!(status, 0xf1..=0xf6) {
            return Err(InvalidMessage::Status(status));
        }
        ShortMessage::new(status, data).map(Into::into)
    }

    #[must_use]
    pub const fn real_time(real_time: RealTime) -> Self {
        Self::Short(ShortMessage {
            status: real_time.status(),
            len: 0,
            data: [0; 2],
        })
    }

    pub fn sys_ex(body: impl Into<Vec<u8>>) -> Result<Self, InvalidMessage> {
        SysEx::new(body).map(Into::into)
    }

    /// The original first byte on the wire.
    #[must_use]
    pub const fn status(&self) -> u8 {
        match self {
            Self::Short(short) => short.status(),
            Self::SysEx(_) => SYS_EX_START,
        }
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Short(short) => short.kind(),
            Self::SysEx(_) => MessageKind::SysEx,
        }
    }

    /// Present iff the message is a channel voice message.
    #[must_use]
    pub fn channel(&self) -> Option<Channel> {
        self.kind()
            .is_channel_voice()
            .then(|| Channel::from_status(self.status()))
    }

    /// Data bytes following the status, or the SysEx body.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match self {
            Self::Short(short) => short.data(),
            Self::SysEx(sys_ex) => sys_ex.body(),
        }
    }

    #[must_use]
    pub const fn is_real_time(&self) -> bool {
        is_real_time_status(self.status())
    }

    #[must_use]
    pub fn to_real_time(&self) -> Option<RealTime> {
        RealTime::from_repr(self.status())
    }

    /// 14-bit value of a pitch bend message.
    #[must_use]
    pub fn pitch_bend_value(&self) -> Option<u16> {
        if self.kind() != MessageKind::PitchBend {
            return None;
        }
        let [lsb, msb] = *self.data() else {
            return None;
        };
        Some(u16::from(msb) << 7 | u16::from(lsb))
    }

    /// Standalone wire representation without running status.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Short(short) => {
                let mut bytes = Vec::with_capacity(1 + short.data().len());
                bytes.push(short.status());
                bytes.extend_from_slice(short.data());
                bytes
            }
            Self::SysEx(sys_ex) => {
                let mut bytes = Vec::with_capacity(sys_ex.len() + 2);
                bytes.push(SYS_EX_START);
                bytes.extend_from_slice(sys_ex.body());
                bytes.push(SYS_EX_END);
                bytes
            }
        }
    }
}

impl From<RealTime> for Message {
    fn from(from: RealTime) -> Self {
        Self::real_time(from)
    }
}
