// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

#![allow(rustdoc::invalid_rust_codeblocks)]
#![doc = include_str!("../README.md")]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::pedantic)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(rustdoc::broken_intra_doc_links)]
// Repetitions of module/type names occur frequently when using many
// modules for keeping the size of the source files handy. Often
// types have the same name as their parent module.
#![allow(clippy::module_name_repetitions)]
// Repeating the type name in `..Default::default()` expressions
// is not needed since the context is obvious.
#![allow(clippy::default_trait_access)]

pub mod din;
pub use self::din::{DinDecoder, DinEncoder, DinEncoderConfig};

mod error;
pub use self::error::{DecodeError, Error, Result};

pub mod message;
pub use self::message::{
    data_len, is_data_byte, is_real_time_status, is_status_byte, Channel, InvalidMessage,
    Message, MessageKind, RealTime, ShortMessage, SysEx, DEFAULT_MAX_SYS_EX_LEN, SYS_EX_END,
    SYS_EX_START,
};

pub mod port;
pub use self::port::{
    ConfigurationError, DinLineIndex, Direction, JackIds, JackKind, JackLayout, Port, PortConfig,
    PortId, PortJacks, PortTable,
};

pub mod router;
#[cfg(feature = "router-thread")]
pub use self::router::thread::RouterThread;
pub use self::router::{BoxedMessageHandler, MessageHandler, PortStats, Router, RouterConfig};

pub mod transport;
pub use self::transport::{DinLine, TransportBackpressure, UsbEndpoint};

pub mod usb;
pub use self::usb::{
    code_index_number, encode_message, split_packets, CableNumber, CodeIndexNumber, EventPacket,
    EventPackets, UsbDecoder, EVENT_PACKET_LEN,
};
