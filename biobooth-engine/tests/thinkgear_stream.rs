//! Streaming test for the ThinkGear parser: a long interleaved byte
//! stream fed in awkward chunk sizes must yield every sample, in order.

use biobooth_engine::cardiac::{ThinkGearParser, LEAD_OFF_CODE, LEAD_ON_CODE};

fn packet(payload: &[u8]) -> Vec<u8> {
    let sum: u32 = payload.iter().map(|&b| u32::from(b)).sum();
    let mut bytes = vec![0xAA, 0xAA, payload.len() as u8];
    bytes.extend_from_slice(payload);
    bytes.push(!(sum as u8));
    bytes
}

fn raw_row(value: i16) -> Vec<u8> {
    let be = value.to_be_bytes();
    vec![0x80, 2, be[0], be[1]]
}

fn leadoff_row(code: u8) -> Vec<u8> {
    vec![0x02, code]
}

#[test]
fn chunked_stream_yields_every_sample_in_order() {
    // 200 samples with a lead transition halfway through
    let mut stream = Vec::new();
    stream.extend(packet(&leadoff_row(LEAD_ON_CODE)));
    for i in 0..100i16 {
        stream.extend(packet(&raw_row(i)));
    }
    stream.extend(packet(&leadoff_row(LEAD_OFF_CODE)));
    for i in 100..200i16 {
        stream.extend(packet(&raw_row(i)));
    }

    let mut parser = ThinkGearParser::new();
    let mut frames = Vec::new();
    // Chunk size 7 never aligns with the 8-byte packet framing
    for chunk in stream.chunks(7) {
        frames.extend(parser.push_bytes(chunk, 0.0));
    }

    assert_eq!(frames.len(), 200);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.raw, i as i32, "sample {i} out of order");
        let expected = if i < 100 { LEAD_ON_CODE } else { LEAD_OFF_CODE };
        assert_eq!(frame.leadoff, expected, "lead state at sample {i}");
    }
}

#[test]
fn stream_with_corruption_drops_only_the_damaged_packet() {
    let mut stream = Vec::new();
    stream.extend(packet(&leadoff_row(LEAD_ON_CODE)));
    stream.extend(packet(&raw_row(1)));
    let mut damaged = packet(&raw_row(2));
    damaged[3] ^= 0xFF; // payload corruption fails the checksum
    stream.extend(damaged);
    stream.extend(packet(&raw_row(3)));

    let mut parser = ThinkGearParser::new();
    let frames = parser.push_bytes(&stream, 0.0);

    let raws: Vec<i32> = frames.iter().map(|f| f.raw).collect();
    assert_eq!(raws, vec![1, 3]);
}
