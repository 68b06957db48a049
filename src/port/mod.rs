// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

//! Logical ports and their static configuration.
//!
//! All ports share a single USB MIDI-Streaming interface. They are
//! multiplexed as virtual cables, one cable number per port and direction.

use thiserror::Error;

use crate::CableNumber;

mod jack;
pub use self::jack::{JackIds, JackKind, JackLayout, PortJacks};


#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
)]
pub struct PortId(u16);

impl PortId {
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

/// Index of a physical serial MIDI line.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
)]
pub struct DinLineIndex(u8);

impl DinLineIndex {
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Data direction, from the perspective of the USB host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Direction {
    /// Device to host.
    ///
    /// Sent through the USB IN endpoint, usually fed by a DIN input line.
    #[display("input")]
    Input,
    /// Host to device.
    ///
    /// Received from the USB OUT endpoint, usually feeding a DIN output line.
    #[display("output")]
    Output,
}

impl Direction {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Input => 0,
            Self::Output => 1,
        }
    }
}

/// A row of the port table.
///
/// Meant to be used in `const` or `static` tables:
///
/// ```
/// use midimux::{JackKind, PortConfig};
///
/// const PORTS: &[PortConfig] = &[
///     PortConfig::input(1, 0, JackKind::EmbeddedExternal).with_din_line(0),
///     PortConfig::output(2, 0, JackKind::EmbeddedExternal).with_din_line(0),
///     PortConfig::output(3, 1, JackKind::Embedded).paired_with(4),
///     PortConfig::input(4, 1, JackKind::Embedded).paired_with(3),
/// ];
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub id: PortId,
    pub direction: Direction,
    /// Virtual cable number, 0..=15.
    pub cable: u8,
    pub jack: JackKind,
    /// Physical serial line, `None` for purely virtual ports.
    pub din_line: Option<DinLineIndex>,
    /// Counterpart of the opposite direction.
    pub paired: Option<PortId>,
}

impl PortConfig {
    #[must_use]
    pub const fn new(id: u16, direction: Direction, cable: u8, jack: JackKind) -> Self {
        Self {
            id: PortId(id),
            direction,
            cable,
            jack,
            din_line: None,
            paired: None,
        }
    }

    #[must_use]
    pub const fn input(id: u16, cable: u8, jack: JackKind) -> Self {
        Self::new(id, Direction::Input, cable, jack)
    }

    #[must_use]
    pub const fn output(id: u16, cable: u8, jack: JackKind) -> Self {
        Self::new(id, Direction::Output, cable, jack)
    }

    #[must_use]
    pub const fn with_din_line(mut self, din_line: u8) -> Self {
        self.din_line = Some(DinLineIndex(din_line));
        self
    }

    #[must_use]
    pub const fn paired_with(mut self, paired: u16) -> Self {
        self.paired = Some(PortId(paired));
        self
    }
}

/// A validated port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    id: PortId,
    direction: Direction,
    cable: CableNumber,
    jack: JackKind,
    din_line: Option<DinLineIndex>,
    paired: Option<PortId>,
}

impl Port {
    #[must_use]
    pub const fn id(&self) -> PortId {
        self.id
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub const fn cable(&self) -> CableNumber {
        self.cable
    }

    #[must_use]
    pub const fn jack(&self) -> JackKind {
        self.jack
    }

    #[must_use]
    pub const fn din_line(&self) -> Option<DinLineIndex> {
        self.din_line
    }

    #[must_use]
    pub const fn paired(&self) -> Option<PortId> {
        self.paired
    }
}

/// Rejected port table.
///
/// Only ever returned during initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("duplicate port id {0}")]
    DuplicatePortId(PortId),

    #[error("cable number {cable} of port {port} is out of range")]
    CableNumberOutOfRange { port: PortId, cable: u8 },

    #[error("{direction} cable number {cable} is used by more than one port")]
    DuplicateCableNumber {
        direction: Direction,
        cable: CableNumber,
    },

    #[error("{direction} cable numbers are not contiguous, missing {missing}")]
    NonContiguousCableNumbers {
        direction: Direction,
        missing: CableNumber,
    },

    #[error("unsupported number of {direction} ports: {count}")]
    PortCount { direction: Direction, count: usize },

    #[error("{direction} DIN line {din_line} is used by more than one port")]
    DuplicateDinLine {
        direction: Direction,
        din_line: DinLineIndex,
    },

    #[error("port {port} is paired with unknown port {paired}")]
    DanglingPairing { port: PortId, paired: PortId },

    #[error("port {port} is paired with port {paired} of the same direction")]
    PairingDirection { port: PortId, paired: PortId },

    #[error("port {port} is paired with port {paired} that is paired with another port")]
    AsymmetricPairing { port: PortId, paired: PortId },

    #[error("DIN line {din_line} of port {port} is not available")]
    MissingDinLine {
        port: PortId,
        din_line: DinLineIndex,
    },
}

/// Immutable set of validated ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortTable {
    ports: Vec<Port>,
    /// Port indices per direction, indexed by cable number.
    cables: [Vec<usize>; 2],
}

impl PortTable {
    pub fn new(configs: &[PortConfig]) -> Result<Self, ConfigurationError> {
        let mut ports = Vec::<Port>::with_capacity(configs.len());
        for config in configs {
            let PortConfig {
                id,
                direction,
                cable,
                jack,
                din_line,
                paired,
            } = *config;
            if ports.iter().any(|port| port.id == id) {
                return Err(ConfigurationError::DuplicatePortId(id));
            }
            let cable = CableNumber::new(cable)
                .ok_or(ConfigurationError::CableNumberOutOfRange { port: id, cable })?;
            if let Some(din_line) = din_line {
                if ports
                    .iter()
                    .any(|port| port.direction == direction && port.din_line == Some(din_line))
                {
                    return Err(ConfigurationError::DuplicateDinLine {
                        direction,
                        din_line,
                    });
                }
            }
            ports.push(Port {
                id,
                direction,
                cable,
                jack,
                din_line,
                paired,
            });
        }
        let cables = [
            cable_index(&ports, Direction::Input)?,
            cable_index(&ports, Direction::Output)?,
        ];
        for port in &ports {
            validate_pairing(&ports, port)?;
        }
        Ok(Self { ports, cables })
    }

    /// Purely virtual ports without DIN lines.
    ///
    /// Input ports get ids `0..num_inputs`, output ports get the ids that
    /// follow. The cable number of each port equals its index within
    /// its direction.
    pub fn virtual_cables(
        num_inputs: usize,
        num_outputs: usize,
        jack: JackKind,
    ) -> Result<Self, ConfigurationError> {
        let mut configs = Vec::with_capacity(num_inputs + num_outputs);
        for (direction, count) in [
            (Direction::Input, num_inputs),
            (Direction::Output, num_outputs),
        ] {
            if !(1..=CableNumber::COUNT).contains(&count) {
                return Err(ConfigurationError::PortCount { direction, count });
            }
            for cable in 0..count {
                #[allow(clippy::cast_possible_truncation)]
                let id = configs.len() as u16;
                #[allow(clippy::cast_possible_truncation)]
                let cable = cable as u8;
                configs.push(PortConfig::new(id, direction, cable, jack));
            }
        }
        Self::new(&configs)
    }

    /// All ports in table order.
    #[must_use]
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    #[must_use]
    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.iter().find(|port| port.id == id)
    }

    #[must_use]
    pub(crate) fn position(&self, id: PortId) -> Option<usize> {
        self.ports.iter().position(|port| port.id == id)
    }

    /// Number of ports of a direction.
    #[must_use]
    pub fn count(&self, direction: Direction) -> usize {
        self.cables[direction.index()].len()
    }

    /// Look up the port of a virtual cable.
    #[must_use]
    pub fn port_for(&self, direction: Direction, cable: CableNumber) -> Option<&Port> {
        self.position_for(direction, cable)
            .map(|index| &self.ports[index])
    }

    #[must_use]
    pub(crate) fn position_for(&self, direction: Direction, cable: CableNumber) -> Option<usize> {
        self.cables[direction.index()].get(cable.index()).copied()
    }

    /// The counterpart of the opposite direction, if any.
    #[must_use]
    pub fn paired_port(&self, port: &Port) -> Option<&Port> {
        port.paired
            .and_then(|paired| self.port(paired))
            .or_else(|| {
                // Pairing may be declared on only one side
                self.ports
                    .iter()
                    .find(|other| other.paired == Some(port.id))
            })
    }

    #[must_use]
    pub fn jack_layout(&self) -> JackLayout {
        JackLayout::new(&self.ports)
    }
}

fn cable_index(ports: &[Port], direction: Direction) -> Result<Vec<usize>, ConfigurationError> {
    let mut slots = [None; CableNumber::COUNT];
    let mut count = 0;
    for (index, port) in ports.iter().enumerate() {
        if port.direction != direction {
            continue;
        }
        count += 1;
        let slot = &mut slots[port.cable.index()];
        if slot.is_some() {
            return Err(ConfigurationError::DuplicateCableNumber {
                direction,
                cable: port.cable,
            });
        }
        *slot = Some(index);
    }
    if count == 0 {
        return Err(ConfigurationError::PortCount { direction, count });
    }
    slots[..count]
        .iter()
        .enumerate()
        .map(|(cable, slot)| {
            slot.ok_or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                let missing = CableNumber::new(cable as u8).unwrap_or(CableNumber::MAX);
                ConfigurationError::NonContiguousCableNumbers { direction, missing }
            })
        })
        .collect()
}

fn validate_pairing(ports: &[Port], port: &Port) -> Result<(), ConfigurationError> {
    let Some(paired) = port.paired else {
        return Ok(());
    };
    let Some(other) = ports.iter().find(|other| other.id == paired) else {
        return Err(ConfigurationError::DanglingPairing {
            port: port.id,
            paired,
        });
    };
    if other.direction == port.direction {
        return Err(ConfigurationError::PairingDirection {
            port: port.id,
            paired,
        });
    }
    if other.paired.is_some_and(|id| id != port.id) {
        return Err(ConfigurationError::AsymmetricPairing {
            port: port.id,
            paired,
        });
    }
    Ok(())
}
