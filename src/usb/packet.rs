// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

use strum::{EnumCount, EnumIter, FromRepr};

/// Size of a USB-MIDI 1.0 event packet in bytes.
pub const EVENT_PACKET_LEN: usize = 4;

/// Virtual cable number of an event packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub struct CableNumber(u8);

impl CableNumber {
    pub const COUNT: usize = 16;

    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(15);

    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if (value as usize) < Self::COUNT {
            Some(Self(value))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Code index number (CIN), the lower nibble of the packet header.
///
/// Determines how many of the three payload bytes are meaningful
/// and how they are to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumIter, EnumCount)]
#[repr(u8)]
pub enum CodeIndexNumber {
    /// Reserved for future extensions.
    Miscellaneous = 0x0,
    /// Reserved for future expansion.
    CableEvent = 0x1,
    /// Two-byte System Common message.
    SystemCommon2 = 0x2,
    /// Three-byte System Common message.
    SystemCommon3 = 0x3,
    /// SysEx starts or continues.
    SysExStart = 0x4,
    /// Single-byte System Common message or SysEx ends with one byte.
    SystemCommonOrSysExEnd1 = 0x5,
    /// SysEx ends with two bytes.
    SysExEnd2 = 0x6,
    /// SysEx ends with three bytes.
    SysExEnd3 = 0x7,
    NoteOff = 0x8,
    NoteOn = 0x9,
    PolyPressure = 0xa,
    ControlChange = 0xb,
    ProgramChange = 0xc,
    ChannelPressure = 0xd,
    PitchBend = 0xe,
    /// Single byte, used for System Real-Time.
    SingleByte = 0xf,
}

impl CodeIndexNumber {
    /// Number of meaningful payload bytes.
    ///
    /// `None` for the reserved CINs.
    #[must_use]
    pub const fn payload_len(self) -> Option<usize> {
        let len = match self {
            Self::Miscellaneous | Self::CableEvent => return None,
            Self::SystemCommonOrSysExEnd1 | Self::SingleByte => 1,
            Self::SystemCommon2
            | Self::SysExEnd2
            | Self::ProgramChange
            | Self::ChannelPressure => 2,
            Self::SystemCommon3
            | Self::SysExStart
            | Self::SysExEnd3
            | Self::NoteOff
            | Self::NoteOn
            | Self::PolyPressure
            | Self::ControlChange
            | Self::PitchBend => 3,
        };
        Some(len)
    }

    #[must_use]
    pub const fn is_channel_voice(self) -> bool {
        (self as u8) >= Self::NoteOff as u8 && (self as u8) <= Self::PitchBend as u8
    }

    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::Miscellaneous | Self::CableEvent)
    }
}

/// A raw 4-byte USB-MIDI 1.0 event packet.
///
/// Byte 0 carries the cable number in the upper and the code index number
/// in the lower nibble. Bytes 1..=3 are the MIDI payload, padded with zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventPacket([u8; EVENT_PACKET_LEN]);

impl EventPacket {
    #[must_use]
    pub const fn new(cable: CableNumber, cin: CodeIndexNumber, payload: [u8; 3]) -> Self {
        let [b1, b2, b3] = payload;
        Self([cable.value() << 4 | cin as u8, b1, b2, b3])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; EVENT_PACKET_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; EVENT_PACKET_LEN] {
        self.0
    }

    #[must_use]
    pub const fn header(self) -> u8 {
        self.0[0]
    }

    #[must_use]
    pub const fn cable(self) -> CableNumber {
        CableNumber(self.0[0] >> 4)
    }

    #[must_use]
    pub const fn cin_nibble(self) -> u8 {
        self.0[0] & 0x0f
    }

    #[must_use]
    pub fn code_index_number(self) -> CodeIndexNumber {
        // All 16 nibble values are mapped
        CodeIndexNumber::from_repr(self.cin_nibble()).unwrap_or(CodeIndexNumber::SingleByte)
    }

    /// All three payload bytes, including padding.
    #[must_use]
    pub const fn payload(self) -> [u8; 3] {
        [self.0[1], self.0[2], self.0[3]]
    }

    /// Only the meaningful payload bytes.
    #[must_use]
    pub fn message_bytes(&self) -> &[u8] {
        let len = self.code_index_number().payload_len().unwrap_or(0);
        &self.0[1..=len]
    }

    /// Same packet on another virtual cable.
    #[must_use]
    pub const fn with_cable(self, cable: CableNumber) -> Self {
        let [header, b1, b2, b3] = self.0;
        Self([cable.value() << 4 | (header & 0x0f), b1, b2, b3])
    }
}

impl From<[u8; EVENT_PACKET_LEN]> for EventPacket {
    fn from(bytes: [u8; EVENT_PACKET_LEN]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<EventPacket> for [u8; EVENT_PACKET_LEN] {
    fn from(packet: EventPacket) -> Self {
        packet.to_bytes()
    }
}

/// Split a USB transfer buffer into event packets.
///
/// Trailing bytes that do not fill a whole packet are ignored.
pub fn split_packets(buffer: &[u8]) -> impl Iterator<Item = EventPacket> + '_ {
    let chunks = buffer.chunks_exact(EVENT_PACKET_LEN);
    if !chunks.remainder().is_empty() {
        log::debug!(
            "Ignoring {len} trailing byte(s) of USB transfer",
            len = chunks.remainder().len()
        );
    }
    chunks.map(|chunk| {
        let mut bytes = [0; EVENT_PACKET_LEN];
        bytes.copy_from_slice(chunk);
        EventPacket(bytes)
    })
}
