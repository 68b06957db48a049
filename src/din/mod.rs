// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

//! Serial (DIN) MIDI byte streams.
//!
//! The stream carries no framing below the message level. Messages are
//! delimited only by their status bytes and the fixed number of data bytes
//! that follow, with two complications:
//!
//! - Running status: the status byte of a channel voice message may be
//!   omitted if it equals the previous one.
//! - System Real-Time bytes may appear anywhere, even between the data
//!   bytes of another message or inside a SysEx run, and must not disturb
//!   the surrounding message.

use crate::{
    data_len, is_real_time_status, is_status_byte, DecodeError, Message, MessageKind,
    ShortMessage, SysEx, DEFAULT_MAX_SYS_EX_LEN, SYS_EX_END, SYS_EX_START,
};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receiving {
    /// Waiting for a status byte or a data byte that continues
    /// the running status.
    Idle,
    /// Collecting the data bytes of a channel voice or System Common message.
    Data {
        status: u8,
        received: usize,
        data: [u8; 2],
    },
    /// Collecting the body of a SysEx message.
    SysEx {
        /// The body exceeded the bound and is discarded until the run ends.
        overflowed: bool,
    },
}

/// Decoder state of a single DIN input line.
#[derive(Debug, Clone)]
pub struct DinDecoder {
    max_sys_ex_len: usize,
    running_status: Option<u8>,
    receiving: Receiving,
    sys_ex: Vec<u8>,
}

impl Default for DinDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SYS_EX_LEN)
    }
}

impl DinDecoder {
    #[must_use]
    pub const fn new(max_sys_ex_len: usize) -> Self {
        Self {
            max_sys_ex_len,
            running_status: None,
            receiving: Receiving::Idle,
            sys_ex: Vec::new(),
        }
    }

    /// The last channel voice status byte, if any.
    #[must_use]
    pub const fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    #[must_use]
    pub const fn is_sys_ex_in_progress(&self) -> bool {
        matches!(self.receiving, Receiving::SysEx { .. })
    }

    /// Return to the power-on state, dropping any partial message.
    pub fn reset(&mut self) {
        self.running_status = None;
        self.receiving = Receiving::Idle;
        self.sys_ex.clear();
    }

    /// Feed a single byte.
    ///
    /// Returns a message as soon as its last byte has been received.
    /// System Real-Time bytes are returned immediately without affecting
    /// the message or SysEx run that they interrupt.
    pub fn decode_byte(&mut self, byte: u8) -> Result<Option<Message>, DecodeError> {
        if is_real_time_status(byte) {
            let message = ShortMessage::new(byte, &[]).map_err(|_| malformed(byte))?;
            return Ok(Some(message.into()));
        }
        if is_status_byte(byte) {
            self.decode_status(byte)
        } else {
            self.decode_data(byte)
        }
    }

    /// Feed multiple bytes, collecting all decoded messages.
    ///
    /// Decode errors are logged and skipped.
    pub fn decode_bytes(&mut self, bytes: &[u8], messages: &mut impl Extend<Message>) {
        for &byte in bytes {
            match self.decode_byte(byte) {
                Ok(Some(message)) => messages.extend(Some(message)),
                Ok(None) => (),
                Err(err) => {
                    log::debug!("Skipping DIN input: {err}");
                }
            }
        }
    }

    fn decode_status(&mut self, status: u8) -> Result<Option<Message>, DecodeError> {
        match self.receiving {
            Receiving::SysEx { overflowed } => {
                self.receiving = Receiving::Idle;
                let body = std::mem::take(&mut self.sys_ex);
                if status == SYS_EX_END {
                    if overflowed {
                        return Ok(None);
                    }
                    return Ok(Some(SysEx::from_body_unchecked(body).into()));
                }
                log::debug!(
                    "SysEx interrupted by status {status:#04x}, discarding {len} byte(s)",
                    len = body.len()
                );
            }
            Receiving::Data {
                status: pending,
                received,
                ..
            } => {
                self.receiving = Receiving::Idle;
                log::debug!(
                    "Incomplete message {pending:#04x} interrupted by status {status:#04x} after \
                     {received} data byte(s)"
                );
            }
            Receiving::Idle => (),
        }
        match status {
            SYS_EX_END => {
                // Stray end of SysEx
                self.running_status = None;
                Err(malformed(status))
            }
            SYS_EX_START => {
                self.running_status = None;
                self.sys_ex.clear();
                self.receiving = Receiving::SysEx { overflowed: false };
                Ok(None)
            }
            _ => {
                if MessageKind::from_status(status).is_some_and(MessageKind::is_channel_voice) {
                    self.running_status = Some(status);
                } else {
                    // System Common
                    self.running_status = None;
                }
                self.begin_message(status)
            }
        }
    }

    fn begin_message(&mut self, status: u8) -> Result<Option<Message>, DecodeError> {
        if data_len(status) == Some(0) {
            let message = ShortMessage::new(status, &[]).map_err(|_| malformed(status))?;
            return Ok(Some(message.into()));
        }
        self.receiving = Receiving::Data {
            status,
            received: 0,
            data: [0; 2],
        };
        Ok(None)
    }

    fn decode_data(&mut self, byte: u8) -> Result<Option<Message>, DecodeError> {
        match &mut self.receiving {
            Receiving::SysEx { overflowed: true } => Ok(None),
            Receiving::SysEx { overflowed } => {
                if self.sys_ex.len() >= self.max_sys_ex_len {
                    *overflowed = true;
                    self.sys_ex.clear();
                    return Err(DecodeError::SysExBufferOverflow {
                        max_len: self.max_sys_ex_len,
                    });
                }
                self.sys_ex.push(byte);
                Ok(None)
            }
            Receiving::Data {
                status,
                received,
                data,
            } => {
                let status = *status;
                data[*received] = byte;
                *received += 1;
                let received = *received;
                let data = *data;
                if Some(received) != data_len(status) {
                    return Ok(None);
                }
                self.receiving = Receiving::Idle;
                ShortMessage::new(status, &data[..received])
                    .map(|message| Some(message.into()))
                    .map_err(|_| malformed(byte))
            }
            Receiving::Idle => {
                let Some(status) = self.running_status else {
                    return Err(malformed(byte));
                };
                self.receiving = Receiving::Data {
                    status,
                    received: 0,
                    data: [0; 2],
                };
                self.decode_data(byte)
            }
        }
    }
}

const fn malformed(byte: u8) -> DecodeError {
    DecodeError::MalformedByteSequence { byte }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DinEncoderConfig {
    /// Omit repeated channel voice status bytes.
    ///
    /// Enabled by default. Disable for receivers that cannot handle
    /// running status.
    pub running_status: bool,
}

impl Default for DinEncoderConfig {
    fn default() -> Self {
        Self {
            running_status: true,
        }
    }
}

/// Encoder state of a single DIN output line.
#[derive(Debug, Clone, Default)]
pub struct DinEncoder {
    config: DinEncoderConfig,
    running_status: Option<u8>,
}

impl DinEncoder {
    #[must_use]
    pub const fn new(config: DinEncoderConfig) -> Self {
        Self {
            config,
            running_status: None,
        }
    }

    #[must_use]
    pub const fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    pub fn reset(&mut self) {
        self.running_status = None;
    }

    /// Append the wire bytes of a message.
    pub fn encode<E>(&mut self, message: &Message, out: &mut E)
    where
        E: Extend<u8> + ?Sized,
    {
        match message {
            Message::Short(short) => {
                let status = short.status();
                if is_real_time_status(status) {
                    out.extend([status]);
                    return;
                }
                if short.kind().is_channel_voice() {
                    let suppress = self.config.running_status && self.running_status == Some(status);
                    if !suppress {
                        out.extend([status]);
                    }
                    self.running_status = Some(status);
                } else {
                    self.running_status = None;
                    out.extend([status]);
                }
                out.extend(short.data().iter().copied());
            }
            Message::SysEx(sys_ex) => {
                self.running_status = None;
                out.extend([SYS_EX_START]);
                out.extend(sys_ex.body().iter().copied());
                out.extend([SYS_EX_END]);
            }
        }
    }

    #[must_use]
    pub fn encode_to_vec(&mut self, message: &Message) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(3);
        self.encode(message, &mut bytes);
        bytes
    }
}
