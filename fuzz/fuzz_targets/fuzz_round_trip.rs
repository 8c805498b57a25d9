#![no_main]

use hevc_cabac::{
    CodingConfig, Component, ScanOrder, SegmentDecoder, SegmentEncoder, SliceParams, SliceType, TransformBlock,
};
use libfuzzer_sys::fuzz_target;

/// Fuzzer-chosen coefficients must decode to exactly what was encoded
fuzz_target!(|data: &[u8]| {
    let Some((&header, levels)) = data.split_first() else {
        return;
    };
    let log2 = 2 + header % 4;
    let scan = [ScanOrder::Diagonal, ScanOrder::Horizontal, ScanOrder::Vertical][usize::from(header >> 2) % 3];
    let mut block = TransformBlock::new(log2, Component::Luma, scan);
    let size = 1u32 << log2;
    for (n, pair) in levels.chunks_exact(2).take((size * size) as usize).enumerate() {
        let n = n as u32;
        block.set(n % size, n / size, i32::from(i16::from_le_bytes([pair[0], pair[1]])));
    }
    if block.is_zero() {
        return;
    }

    let params = SliceParams::new(SliceType::I, 32);
    let config = CodingConfig::default();
    let mut enc = SegmentEncoder::new(params, config.clone());
    enc.encode_cbf(Component::Luma, 0, true);
    enc.encode_residual(&block);
    let bytes = enc.finish();

    let mut dec = SegmentDecoder::new(&bytes, params, config).expect("encoder output decodes");
    assert!(dec.decode_cbf(Component::Luma, 0).expect("cbf"));
    let out = dec
        .decode_residual(TransformBlock::new(log2, Component::Luma, scan))
        .expect("residual");
    assert_eq!(out, block);
    assert_eq!(dec.finish(), Ok(bytes.len()));
});
