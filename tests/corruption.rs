//! Decoding truncated and damaged segments

mod common;

use hevc_cabac::hevc::residual::code_exp_golomb;
use hevc_cabac::{
    CabacDecoder, CabacError, CodingConfig, Component, ScanOrder, SegmentDecoder, SegmentEncoder, SliceParams,
    SliceType, TransformBlock,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::random_block;

fn encoded_blocks(seed: u64) -> (Vec<u8>, Vec<TransformBlock>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = CodingConfig::default().with_sign_data_hiding(true);
    let mut enc = SegmentEncoder::new(SliceParams::new(SliceType::I, 30), config.clone());
    let mut blocks = Vec::new();
    for _ in 0..8 {
        let block = random_block(&mut rng, &config, 4, Component::Luma, ScanOrder::Diagonal, false);
        enc.encode_residual(&block);
        blocks.push(block);
    }
    (enc.finish(), blocks)
}

fn decode_all(bytes: &[u8], count: usize) -> Result<usize, CabacError> {
    let config = CodingConfig::default().with_sign_data_hiding(true);
    let mut dec = SegmentDecoder::new(bytes, SliceParams::new(SliceType::I, 30), config)?;
    for _ in 0..count {
        dec.decode_residual(TransformBlock::new(4, Component::Luma, ScanOrder::Diagonal))?;
    }
    dec.finish()
}

#[test]
fn test_every_truncation_fails_cleanly() {
    let (bytes, blocks) = encoded_blocks(3);
    assert_eq!(decode_all(&bytes, blocks.len()), Ok(bytes.len()));

    for len in 0..bytes.len() {
        let err = decode_all(&bytes[..len], blocks.len()).unwrap_err();
        assert!(err.is_corrupt(), "len {len}: {err:?}");
        if len < 2 {
            assert_eq!(err, CabacError::SegmentTooShort { len });
        }
    }
}

#[test]
fn test_decoder_is_poisoned_after_error() {
    let (bytes, _) = encoded_blocks(9);
    let short = &bytes[..bytes.len() / 3];
    let config = CodingConfig::default().with_sign_data_hiding(true);
    let mut dec = SegmentDecoder::new(short, SliceParams::new(SliceType::I, 30), config).unwrap();

    let first = loop {
        match dec.decode_residual(TransformBlock::new(4, Component::Luma, ScanOrder::Diagonal)) {
            Ok(_) => continue,
            Err(e) => break e,
        }
    };
    let (coder, _) = dec.parts();
    for _ in 0..10 {
        assert_eq!(coder.decode_bypass(), Err(first));
        assert_eq!(coder.decode_terminate(), Err(first));
    }
}

#[test]
fn test_random_bytes_never_panic() {
    let mut rng = StdRng::seed_from_u64(0xbad);
    let config = CodingConfig::default().with_sign_data_hiding(true).with_transform_skip(true);
    for _ in 0..500 {
        let len = rng.gen_range(0..64);
        let bytes: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
        let Ok(mut dec) = SegmentDecoder::new(&bytes, SliceParams::new(SliceType::P, 27), config.clone()) else {
            continue;
        };
        for _ in 0..4 {
            let log2 = rng.gen_range(2..=5);
            let block = TransformBlock::new(log2, Component::Luma, ScanOrder::Diagonal);
            if dec.decode_residual(block).is_err() {
                break;
            }
        }
        let (coder, _) = dec.parts();
        let (bytes_read, _) = coder.position();
        assert!(bytes_read <= bytes.len());
    }
}

#[test]
fn test_overlong_escape_is_rejected() {
    // A run of one bits longer than any legal Exp-Golomb prefix
    let mut enc = hevc_cabac::CabacEncoder::new();
    enc.encode_bypass_bits(u32::MAX, 32);
    enc.encode_bypass_bits(0, 32);
    let bytes = enc.finish();

    let mut dec = CabacDecoder::new(&bytes).unwrap();
    let err = code_exp_golomb(&mut dec, 0, 0).unwrap_err();
    assert!(matches!(err, CabacError::BitstreamCorrupt(_)));
}

#[test]
fn test_segment_end_offset() {
    let mut enc = SegmentEncoder::new(SliceParams::new(SliceType::I, 30), CodingConfig::default());
    enc.encode_cbf(Component::Luma, 0, true);
    enc.encode_end_of_slice_segment_flag(false);
    let bytes = enc.finish();

    let mut dec = SegmentDecoder::new(&bytes, SliceParams::new(SliceType::I, 30), CodingConfig::default()).unwrap();
    assert!(dec.decode_cbf(Component::Luma, 0).unwrap());
    assert!(!dec.decode_end_of_slice_segment_flag().unwrap());
    assert_eq!(dec.finish(), Ok(bytes.len()));

    // Bytes after the stop bit are not consumed
    let mut padded = bytes.clone();
    padded.extend_from_slice(&[0xaa, 0x55]);
    let mut dec = SegmentDecoder::new(&padded, SliceParams::new(SliceType::I, 30), CodingConfig::default()).unwrap();
    assert!(dec.decode_cbf(Component::Luma, 0).unwrap());
    assert!(!dec.decode_end_of_slice_segment_flag().unwrap());
    assert_eq!(dec.finish(), Ok(bytes.len()));
}
