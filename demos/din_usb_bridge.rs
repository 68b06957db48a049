// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

//! Two DIN ports and one virtual port, driven by a router thread.
//!
//! The main thread plays both the USB host and the devices on the
//! serial lines.

use std::time::Duration;

use midimux::{
    encode_message,
    transport::channel::{din_line, usb_endpoint},
    CableNumber, Channel, DinDecoder, JackKind, Message, Port, PortConfig, PortTable, RealTime,
    Router, RouterConfig, RouterThread, UsbDecoder, UsbEndpoint as _,
};

const PORTS: &[PortConfig] = &[
    PortConfig::input(1, 0, JackKind::EmbeddedExternal).with_din_line(0),
    PortConfig::input(2, 1, JackKind::EmbeddedExternal).with_din_line(1),
    PortConfig::output(3, 0, JackKind::EmbeddedExternal).with_din_line(0),
    PortConfig::output(4, 1, JackKind::EmbeddedExternal).with_din_line(1),
    PortConfig::output(5, 2, JackKind::Embedded),
];

const TICK_PERIOD: Duration = Duration::from_millis(1);

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

fn main() {
    pretty_env_logger::init();
    match run() {
        Ok(()) => (),
        Err(err) => println!("Error: {err}"),
    }
}

fn run() -> anyhow::Result<()> {
    let table = PortTable::new(PORTS)?;
    for jacks in table.jack_layout().ports() {
        println!(
            "Port {port} ({direction}, cable {cable}): {ids:?}",
            port = jacks.port,
            direction = jacks.direction,
            cable = jacks.cable,
            ids = jacks.ids,
        );
    }

    let (usb, mut host) = usb_endpoint(64);
    let (line_a, mut wire_a) = din_line(256);
    let (line_b, mut wire_b) = din_line(256);
    let mut router = Router::new(table, RouterConfig::default(), usb, vec![line_a, line_b])?;
    router.set_message_handler(|port: &Port, message: &Message| {
        println!(
            "Virtual port {port_id} received {bytes:02x?}",
            port_id = port.id(),
            bytes = message.to_bytes(),
        );
    });
    let router_thread = RouterThread::spawn(router, TICK_PERIOD);

    // Host to devices
    let ch = Channel::new(0).ok_or_else(|| anyhow::anyhow!("invalid channel"))?;
    let outgoing = [
        (0, Message::note_on(ch, 0x3c, 0x64)?),
        (1, Message::control_change(ch, 0x07, 0x50)?),
        (2, Message::program_change(ch, 0x03)?),
        (0, Message::sys_ex([0x7e, 0x7f, 0x06, 0x01])?),
    ];
    for (cable, message) in &outgoing {
        let cable = CableNumber::new(*cable).ok_or_else(|| anyhow::anyhow!("invalid cable"))?;
        for packet in encode_message(message, cable) {
            while host.write_packet(packet).is_err() {
                std::thread::sleep(TICK_PERIOD);
            }
        }
    }
    for (name, wire) in [("A", &wire_a), ("B", &wire_b)] {
        let mut decoder = DinDecoder::default();
        while let Some(byte) = wire.recv_byte_timeout(RECV_TIMEOUT) {
            if let Some(message) = decoder.decode_byte(byte)? {
                println!("DIN line {name} transmitted {bytes:02x?}", bytes = message.to_bytes());
            }
        }
    }

    // Devices to host, with a clock interleaved into a note
    wire_a.write_bytes(&[0x90, 0x40, RealTime::TimingClock.status(), 0x7f, 0x40, 0x00]);
    wire_b.write_bytes(&[0xf0, 0x43, 0x10, 0x4c, 0xf7]);
    let mut decoder = UsbDecoder::default();
    while let Some(packet) = host.recv_packet_timeout(RECV_TIMEOUT) {
        if let Some(message) = decoder.decode_packet(packet)? {
            println!(
                "Host received {bytes:02x?} on cable {cable}",
                bytes = message.to_bytes(),
                cable = packet.cable(),
            );
        }
    }

    let router = router_thread.abort_and_join()?;
    for port in router.table().ports() {
        if let Some(stats) = router.port_stats(port.id()) {
            println!("Port {port_id}: {stats:?}", port_id = port.id());
        }
    }
    Ok(())
}
