// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

use crate::{ConfigurationError, InvalidMessage, PortId, TransportBackpressure};

/// Recoverable decode failures of both codecs.
///
/// None of them is fatal. The decoder has already resynchronized or
/// discarded the offending input when the error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected byte, dropped until the next status byte.
    #[error("malformed byte sequence at {byte:#04x}")]
    MalformedByteSequence { byte: u8 },

    /// Reserved or unsupported USB-MIDI code index number, packet dropped.
    #[error("unknown code index number {cin:#x}")]
    UnknownCodeIndexNumber { cin: u8 },

    /// SysEx reassembly abandoned until the next start marker.
    #[error("SysEx exceeds {max_len} bytes")]
    SysExBufferOverflow { max_len: usize },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    InvalidMessage(#[from] InvalidMessage),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Backpressure(#[from] TransportBackpressure),

    #[error("unknown port {0}")]
    UnknownPort(PortId),

    #[error("port {0} has no outgoing transport")]
    NoOutgoingTransport(PortId),
}

pub type Result<T> = std::result::Result<T, Error>;
