// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

use crate::{Channel, RealTime};

use super::*;

fn ch(index: u8) -> Channel {
    Channel::new(index).unwrap()
}

fn decode_all(decoder: &mut DinDecoder, bytes: &[u8]) -> Vec<Result<Message, DecodeError>> {
    bytes
        .iter()
        .filter_map(|&byte| decoder.decode_byte(byte).transpose())
        .collect()
}

fn decode_ok(bytes: &[u8]) -> Vec<Message> {
    let mut decoder = DinDecoder::default();
    let mut messages = Vec::new();
    decoder.decode_bytes(bytes, &mut messages);
    messages
}

#[test]
fn running_status_expands_to_full_messages() {
    let messages = decode_ok(&[0x90, 0x40, 0x7f, 0x40, 0x00]);
    assert_eq!(
        vec![
            Message::note_on(ch(0), 0x40, 0x7f).unwrap(),
            Message::note_on(ch(0), 0x40, 0x00).unwrap(),
        ],
        messages
    );
}

#[test]
fn message_is_emitted_with_its_last_byte() {
    let mut decoder = DinDecoder::default();
    assert_eq!(Ok(None), decoder.decode_byte(0xb1));
    assert_eq!(Ok(None), decoder.decode_byte(0x07));
    assert_eq!(
        Ok(Some(Message::control_change(ch(1), 0x07, 0x64).unwrap())),
        decoder.decode_byte(0x64)
    );
    assert_eq!(Some(0xb1), decoder.running_status());
}

#[test]
fn real_time_between_data_bytes() {
    let messages = decode_ok(&[0x90, 0x3c, 0xf8, 0x64, 0xfe]);
    assert_eq!(
        vec![
            Message::real_time(RealTime::TimingClock),
            Message::note_on(ch(0), 0x3c, 0x64).unwrap(),
            Message::real_time(RealTime::ActiveSensing),
        ],
        messages
    );
}

#[test]
fn real_time_inside_sys_ex() {
    let mut decoder = DinDecoder::default();
    let results = decode_all(&mut decoder, &[0xf0, 0x7e, 0xf8, 0x7f, 0xfa, 0xf7]);
    assert_eq!(
        vec![
            Ok(Message::real_time(RealTime::TimingClock)),
            Ok(Message::real_time(RealTime::Start)),
            Ok(Message::sys_ex([0x7e, 0x7f]).unwrap()),
        ],
        results
    );
    assert!(!decoder.is_sys_ex_in_progress());
}

#[test]
fn real_time_does_not_affect_running_status() {
    let messages = decode_ok(&[0x80, 0x40, 0x00, 0xfc, 0x41, 0x00]);
    assert_eq!(
        vec![
            Message::note_off(ch(0), 0x40, 0x00).unwrap(),
            Message::real_time(RealTime::Stop),
            Message::note_off(ch(0), 0x41, 0x00).unwrap(),
        ],
        messages
    );
}

#[test]
fn system_common_clears_running_status() {
    let mut decoder = DinDecoder::default();
    let results = decode_all(&mut decoder, &[0x90, 0x40, 0x7f, 0xf3, 0x02, 0x40]);
    assert_eq!(
        vec![
            Ok(Message::note_on(ch(0), 0x40, 0x7f).unwrap()),
            Ok(Message::system_common(0xf3, &[0x02]).unwrap()),
            Err(DecodeError::MalformedByteSequence { byte: 0x40 }),
        ],
        results
    );
    assert_eq!(None, decoder.running_status());
}

#[test]
fn tune_request_without_data() {
    let messages = decode_ok(&[0xf6]);
    assert_eq!(vec![Message::system_common(0xf6, &[]).unwrap()], messages);
}

#[test]
fn data_without_status_is_malformed() {
    let mut decoder = DinDecoder::default();
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: 0x12 }),
        decoder.decode_byte(0x12)
    );
    // Resynchronized by the next status byte
    let results = decode_all(&mut decoder, &[0xc5, 0x03]);
    assert_eq!(vec![Ok(Message::program_change(ch(5), 0x03).unwrap())], results);
}

#[test]
fn stray_sys_ex_end_is_malformed() {
    let mut decoder = DinDecoder::default();
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: SYS_EX_END }),
        decoder.decode_byte(SYS_EX_END)
    );
}

#[test]
fn stray_sys_ex_end_clears_running_status() {
    let mut decoder = DinDecoder::default();
    let results = decode_all(&mut decoder, &[0x90, 0x40, 0x7f, 0xf7, 0x41, 0x00]);
    assert_eq!(
        vec![
            Ok(Message::note_on(ch(0), 0x40, 0x7f).unwrap()),
            Err(DecodeError::MalformedByteSequence { byte: SYS_EX_END }),
            Err(DecodeError::MalformedByteSequence { byte: 0x41 }),
            Err(DecodeError::MalformedByteSequence { byte: 0x00 }),
        ],
        results
    );
    assert_eq!(None, decoder.running_status());
}

#[test]
fn incomplete_message_is_dropped_by_next_status() {
    let messages = decode_ok(&[0x90, 0x40, 0xe0, 0x00, 0x40]);
    assert_eq!(vec![Message::pitch_bend(ch(0), 0x2000).unwrap()], messages);
}

#[test]
fn interrupted_sys_ex_is_discarded() {
    let messages = decode_ok(&[0xf0, 0x01, 0x02, 0x91, 0x30, 0x40]);
    assert_eq!(vec![Message::note_on(ch(1), 0x30, 0x40).unwrap()], messages);
}

#[test]
fn sys_ex_overflow_resynchronizes() {
    let mut decoder = DinDecoder::new(2);
    let results = decode_all(
        &mut decoder,
        &[0xf0, 0x01, 0x02, 0x03, 0x04, 0xf7, 0xf0, 0x05, 0xf7],
    );
    assert_eq!(
        vec![
            Err(DecodeError::SysExBufferOverflow { max_len: 2 }),
            Ok(Message::sys_ex([0x05]).unwrap()),
        ],
        results
    );
}

#[test]
fn reset_drops_partial_state() {
    let mut decoder = DinDecoder::default();
    assert_eq!(Ok(None), decoder.decode_byte(0x90));
    assert_eq!(Ok(None), decoder.decode_byte(0x40));
    decoder.reset();
    assert_eq!(None, decoder.running_status());
    assert_eq!(
        Err(DecodeError::MalformedByteSequence { byte: 0x7f }),
        decoder.decode_byte(0x7f)
    );
}

#[test]
fn encoder_suppresses_repeated_status() {
    let mut encoder = DinEncoder::default();
    let mut bytes = Vec::new();
    for velocity in [0x7f, 0x00] {
        encoder.encode(&Message::note_on(ch(0), 0x40, velocity).unwrap(), &mut bytes);
    }
    assert_eq!(vec![0x90, 0x40, 0x7f, 0x40, 0x00], bytes);
}

#[test]
fn encoder_real_time_keeps_running_status() {
    let mut encoder = DinEncoder::default();
    let mut bytes = Vec::new();
    encoder.encode(&Message::note_on(ch(0), 0x40, 0x7f).unwrap(), &mut bytes);
    encoder.encode(&Message::real_time(RealTime::TimingClock), &mut bytes);
    encoder.encode(&Message::note_on(ch(0), 0x41, 0x7f).unwrap(), &mut bytes);
    assert_eq!(vec![0x90, 0x40, 0x7f, 0xf8, 0x41, 0x7f], bytes);
}

#[test]
fn encoder_repeats_status_after_system_messages() {
    let mut encoder = DinEncoder::default();
    let note_on = Message::note_on(ch(0), 0x40, 0x7f).unwrap();
    let mut bytes = encoder.encode_to_vec(&note_on);
    encoder.encode(&Message::sys_ex([0x01]).unwrap(), &mut bytes);
    encoder.encode(&note_on, &mut bytes);
    encoder.encode(&Message::system_common(0xf1, &[0x10]).unwrap(), &mut bytes);
    encoder.encode(&note_on, &mut bytes);
    assert_eq!(
        vec![0x90, 0x40, 0x7f, 0xf0, 0x01, 0xf7, 0x90, 0x40, 0x7f, 0xf1, 0x10, 0x90, 0x40, 0x7f],
        bytes
    );
}

#[test]
fn encoder_without_running_status() {
    let mut encoder = DinEncoder::new(DinEncoderConfig {
        running_status: false,
    });
    let mut bytes = Vec::new();
    for note in [0x40, 0x41] {
        encoder.encode(&Message::note_off(ch(9), note, 0x00).unwrap(), &mut bytes);
    }
    assert_eq!(vec![0x89, 0x40, 0x00, 0x89, 0x41, 0x00], bytes);
}

#[test]
fn encoded_stream_decodes_to_the_same_messages() {
    let messages = vec![
        Message::control_change(ch(2), 0x01, 0x10).unwrap(),
        Message::control_change(ch(2), 0x01, 0x11).unwrap(),
        Message::real_time(RealTime::Continue),
        Message::channel_pressure(ch(2), 0x33).unwrap(),
        Message::sys_ex([0x7d, 0x01, 0x02, 0x03]).unwrap(),
        Message::system_common(0xf2, &[0x00, 0x10]).unwrap(),
    ];
    let mut encoder = DinEncoder::default();
    let mut bytes = Vec::new();
    for message in &messages {
        encoder.encode(message, &mut bytes);
    }
    assert_eq!(messages, decode_ok(&bytes));
}
