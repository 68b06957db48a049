// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

use super::{Direction, Port, PortId};
use crate::CableNumber;

/// USB-MIDI jack topology of a port.
///
/// Both variants behave the same on the wire. They only differ in the
/// descriptors a USB device stack would generate for the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::IntoStaticStr)]
pub enum JackKind {
    /// A single Embedded jack bound to the endpoint.
    Embedded,
    /// An Embedded jack bound to the endpoint and connected to an
    /// External jack that represents the physical connector.
    EmbeddedExternal,
}

impl JackKind {
    #[must_use]
    pub const fn jack_count(self) -> u8 {
        match self {
            Self::Embedded => 1,
            Self::EmbeddedExternal => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JackIds {
    /// Embedded jack, associated with the endpoint.
    ///
    /// An Embedded IN jack for [`Direction::Output`] ports (fed by the OUT
    /// endpoint) and an Embedded OUT jack for [`Direction::Input`] ports
    /// (feeding the IN endpoint).
    pub embedded: u8,

    /// External jack connected to the Embedded jack.
    pub external: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortJacks {
    pub port: PortId,
    pub direction: Direction,
    pub cable: CableNumber,
    pub jack: JackKind,
    pub ids: JackIds,
}

/// Jack id assignment for the descriptors of a MIDI-Streaming interface.
///
/// Ids are assigned consecutively starting at 1 in port table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JackLayout {
    ports: Vec<PortJacks>,
}

impl JackLayout {
    pub(super) fn new(ports: &[Port]) -> Self {
        let mut next_id = 1u8;
        let mut take_id = || {
            let id = next_id;
            next_id += 1;
            id
        };
        let ports = ports
            .iter()
            .map(|port| {
                let embedded = take_id();
                let external = match port.jack() {
                    JackKind::Embedded => None,
                    JackKind::EmbeddedExternal => Some(take_id()),
                };
                PortJacks {
                    port: port.id(),
                    direction: port.direction(),
                    cable: port.cable(),
                    jack: port.jack(),
                    ids: JackIds { embedded, external },
                }
            })
            .collect();
        Self { ports }
    }

    #[must_use]
    pub fn ports(&self) -> &[PortJacks] {
        &self.ports
    }

    #[must_use]
    pub fn jack_ids(&self, port: PortId) -> Option<JackIds> {
        self.ports
            .iter()
            .find(|jacks| jacks.port == port)
            .map(|jacks| jacks.ids)
    }

    /// Total number of jacks.
    #[must_use]
    pub fn jack_count(&self) -> usize {
        self.ports
            .iter()
            .map(|jacks| usize::from(jacks.jack.jack_count()))
            .sum()
    }

    /// Embedded jack ids associated with the endpoint of a direction,
    /// ordered by cable number.
    ///
    /// The n-th entry is the jack of virtual cable n.
    #[must_use]
    pub fn endpoint_jack_ids(&self, direction: Direction) -> Vec<u8> {
        let mut ports = self
            .ports
            .iter()
            .filter(|jacks| jacks.direction == direction)
            .collect::<Vec<_>>();
        ports.sort_unstable_by_key(|jacks| jacks.cable);
        ports.into_iter().map(|jacks| jacks.ids.embedded).collect()
    }
}
