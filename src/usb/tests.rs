// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

use strum::{EnumCount as _, IntoEnumIterator as _};

use crate::{Channel, RealTime};

use super::*;

fn cable(value: u8) -> CableNumber {
    CableNumber::new(value).unwrap()
}

fn packets(message: &Message, cable: CableNumber) -> Vec<[u8; 4]> {
    encode_message(message, cable)
        .map(EventPacket::to_bytes)
        .collect()
}

fn decode_all(
    decoder: &mut UsbDecoder,
    packets: &[[u8; 4]],
) -> Vec<Result<Message, DecodeError>> {
    packets
        .iter()
        .filter_map(|&bytes| decoder.decode_packet(bytes.into()).transpose())
        .collect()
}

#[test]
fn cable_number_range() {
    assert_eq!(Some(15), CableNumber::new(15).map(CableNumber::value));
    assert!(CableNumber::new(16).is_none());
}

#[test]
fn packet_header_nibbles() {
    let packet = EventPacket::from_bytes([0x39, 0x93, 0x40, 0x7f]);
    assert_eq!(cable(3), packet.cable());
    assert_eq!(CodeIndexNumber::NoteOn, packet.code_index_number());
    assert_eq!(&[0x93, 0x40, 0x7f], packet.message_bytes());
    assert_eq!([0x59, 0x93, 0x40, 0x7f], packet.with_cable(cable(5)).to_bytes());
}

#[test]
fn every_code_index_number_is_mapped() {
    assert_eq!(16, CodeIndexNumber::COUNT);
    for cin in CodeIndexNumber::iter() {
        let packet = EventPacket::new(cable(0), cin, [0; 3]);
        assert_eq!(cin, packet.code_index_number());
        assert_eq!(cin.is_reserved(), cin.payload_len().is_none());
    }
}

#[test]
fn decode_note_on_on_cable_0() {
    let mut decoder = UsbDecoder::default();
    let message = decoder
        .decode_packet([0x09, 0x90, 0x40, 0x7f].into())
        .unwrap()
        .unwrap();
    assert_eq!(MessageKind::NoteOn, message.kind());
    assert_eq!(Channel::new(0), message.channel());
    assert_eq!(&[0x40, 0x7f], message.data());
}

#[test]
fn encode_short_messages() {
    let ch = Channel::new(1).unwrap();
    assert_eq!(
        vec![[0x2b, 0xb1, 0x07, 0x64]],
        packets(&Message::control_change(ch, 0x07, 0x64).unwrap(), cable(2))
    );
    assert_eq!(
        vec![[0x0c, 0xc1, 0x05, 0x00]],
        packets(&Message::program_change(ch, 0x05).unwrap(), cable(0))
    );
    assert_eq!(
        vec![[0x12, 0xf3, 0x01, 0x00]],
        packets(&Message::system_common(0xf3, &[0x01]).unwrap(), cable(1))
    );
    assert_eq!(
        vec![[0x13, 0xf2, 0x10, 0x20]],
        packets(&Message::system_common(0xf2, &[0x10, 0x20]).unwrap(), cable(1))
    );
    assert_eq!(
        vec![[0x15, 0xf6, 0x00, 0x00]],
        packets(&Message::system_common(0xf6, &[]).unwrap(), cable(1))
    );
    assert_eq!(
        vec![[0xff, 0xf8, 0x00, 0x00]],
        packets(&Message::real_time(RealTime::TimingClock), cable(15))
    );
}

#[test]
fn sys_ex_fragmentation() {
    let cable = cable(1);
    assert_eq!(
        vec![[0x16, 0xf0, 0xf7, 0x00]],
        packets(&Message::sys_ex(Vec::new()).unwrap(), cable)
    );
    assert_eq!(
        vec![[0x17, 0xf0, 0x01, 0xf7]],
        packets(&Message::sys_ex([0x01]).unwrap(), cable)
    );
    assert_eq!(
        vec![[0x14, 0xf0, 0x01, 0x02], [0x15, 0xf7, 0x00, 0x00]],
        packets(&Message::sys_ex([0x01, 0x02]).unwrap(), cable)
    );
    assert_eq!(
        vec![
            [0x14, 0xf0, 0x7e, 0x7f],
            [0x14, 0x06, 0x01, 0x02],
            [0x16, 0x03, 0xf7, 0x00],
        ],
        packets(
            &Message::sys_ex([0x7e, 0x7f, 0x06, 0x01, 0x02, 0x03]).unwrap(),
            cable
        )
    );
}

#[test]
fn packet_count_is_exact() {
    for len in 0..10 {
        let message = Message::sys_ex(vec![0x11; len]).unwrap();
        let packets = encode_message(&message, cable(0));
        let expected = packets.len();
        assert_eq!(expected, packets.count());
        assert_eq!((len + 2).div_ceil(3), expected);
    }
}

#[test]
fn sys_ex_reassembly() {
    let message = Message::sys_ex((0..20).collect::<Vec<u8>>()).unwrap();
    let mut decoder = UsbDecoder::default();
    let mut decoded = Vec::new();
    decoder.decode_packets(encode_message(&message, cable(4)), &mut decoded);
    assert_eq!(vec![message], decoded);
    assert_eq!(None, decoder.sys_ex_cable());
}

#[test]
fn real_time_during_sys_ex() {
    let mut decoder = UsbDecoder::default();
    let results = decode_all(
        &mut decoder,
        &[
            [0x04, 0xf0, 0x01, 0x02],
            [0x0f, 0xf8, 0x00, 0x00],
            [0x06, 0x03, 0xf7, 0x00],
        ],
    );
    assert_eq!(
        vec![
            Ok(Message::real_time(RealTime::TimingClock)),
            Ok(Message::sys_ex([0x01, 0x02, 0x03]).unwrap()),
        ],
        results
    );
}

#[test]
fn reserved_code_index_numbers() {
    let mut decoder = UsbDecoder::default();
    assert_eq!(
        Err(DecodeError::UnknownCodeIndexNumber { cin: 0x0 }),
        decoder.decode_packet([0x00, 0x90, 0x40, 0x7f].into())
    );
    assert_eq!(
        Err(DecodeError::UnknownCodeIndexNumber { cin: 0x1 }),
        decoder.decode_packet([0x31, 0x90, 0x40, 0x7f].into())
    );
}

#[test]
fn status_must_match_code_index_number() {
    let mut decoder = UsbDecoder::default();
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: 0x80 }),
        decoder.decode_packet([0x09, 0x80, 0x40, 0x7f].into())
    );
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: 0xf2 }),
        decoder.decode_packet([0x02, 0xf2, 0x10, 0x20].into())
    );
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: 0x40 }),
        decoder.decode_packet([0x0f, 0x40, 0x00, 0x00].into())
    );
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: 0x90 }),
        decoder.decode_packet([0x09, 0x90, 0x90, 0x7f].into())
    );
}

#[test]
fn padding_is_ignored() {
    let mut decoder = UsbDecoder::default();
    assert_eq!(
        Ok(Some(Message::program_change(Channel::new(0).unwrap(), 0x05).unwrap())),
        decoder.decode_packet([0x0c, 0xc0, 0x05, 0xff].into())
    );
}

#[test]
fn continuation_without_start() {
    let mut decoder = UsbDecoder::default();
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: 0x01 }),
        decoder.decode_packet([0x04, 0x01, 0x02, 0x03].into())
    );
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: SYS_EX_END }),
        decoder.decode_packet([0x05, 0xf7, 0x00, 0x00].into())
    );
}

#[test]
fn cable_switch_abandons_sys_ex() {
    let mut decoder = UsbDecoder::default();
    let results = decode_all(
        &mut decoder,
        &[
            [0x04, 0xf0, 0x01, 0x02],
            [0x14, 0x03, 0x04, 0x05],
            [0x06, 0x06, 0xf7, 0x00],
        ],
    );
    assert_eq!(
        vec![
            Err(DecodeError::MalformedByteSequence { byte: 0x03 }),
            Err(DecodeError::MalformedByteSequence { byte: 0x06 }),
        ],
        results
    );
    // A new start on another cable replaces the run in progress
    let results = decode_all(
        &mut decoder,
        &[
            [0x04, 0xf0, 0x01, 0x02],
            [0x17, 0xf0, 0x03, 0xf7],
        ],
    );
    assert_eq!(vec![Ok(Message::sys_ex([0x03]).unwrap())], results);
}

#[test]
fn sys_ex_overflow_resumes_at_next_start() {
    let mut decoder = UsbDecoder::new(4);
    let results = decode_all(
        &mut decoder,
        &[
            [0x04, 0xf0, 0x01, 0x02],
            [0x04, 0x03, 0x04, 0x05],
            [0x04, 0x06, 0x07, 0x08],
            [0x05, 0xf7, 0x00, 0x00],
            [0x07, 0xf0, 0x09, 0xf7],
        ],
    );
    assert_eq!(
        vec![
            Err(DecodeError::SysExBufferOverflow { max_len: 4 }),
            Ok(Message::sys_ex([0x09]).unwrap()),
        ],
        results
    );
}

#[test]
fn split_transfer_buffer() {
    let buffer = [0x09, 0x90, 0x40, 0x7f, 0x08, 0x80, 0x40, 0x00, 0x0f];
    let packets = split_packets(&buffer).collect::<Vec<_>>();
    assert_eq!(2, packets.len());
    assert_eq!(CodeIndexNumber::NoteOff, packets[1].code_index_number());
}

#[test]
fn encoded_packets_decode_to_the_same_messages() {
    let ch = Channel::new(7).unwrap();
    let messages = vec![
        Message::note_off(ch, 0x30, 0x10).unwrap(),
        Message::poly_pressure(ch, 0x30, 0x20).unwrap(),
        Message::channel_pressure(ch, 0x7f).unwrap(),
        Message::pitch_bend(ch, 0x1234).unwrap(),
        Message::system_common(0xf1, &[0x31]).unwrap(),
        Message::real_time(RealTime::Reset),
        Message::sys_ex([0x41, 0x10, 0x42, 0x12, 0x40]).unwrap(),
    ];
    let mut decoder = UsbDecoder::default();
    let mut decoded = Vec::new();
    for message in &messages {
        decoder.decode_packets(encode_message(message, cable(9)), &mut decoded);
    }
    assert_eq!(messages, decoded);
}
