#![no_main]

use hevc_cabac::{CodingConfig, Component, ScanOrder, SegmentDecoder, SliceParams, SliceType, TransformBlock};
use libfuzzer_sys::fuzz_target;

/// Arbitrary bytes as a residual segment: any panic is a bug
fuzz_target!(|data: &[u8]| {
    let Some((&header, segment)) = data.split_first() else {
        return;
    };
    let config = CodingConfig::default()
        .with_sign_data_hiding(header & 1 != 0)
        .with_transform_skip(header & 2 != 0);
    let slice_type = [SliceType::I, SliceType::P, SliceType::B][usize::from(header >> 2) % 3];
    let params = SliceParams::new(slice_type, i32::from(header >> 2) % 52);

    let Ok(mut dec) = SegmentDecoder::new(segment, params, config) else {
        return;
    };
    for n in 0..16u8 {
        let log2 = 2 + (header.wrapping_add(n) % 4);
        let component = if n % 3 == 0 { Component::Cb } else { Component::Luma };
        let log2 = if component.is_luma() { log2 } else { log2.min(4) };
        let block = TransformBlock::new(log2, component, ScanOrder::Diagonal);
        if dec.decode_residual(block).is_err() {
            return;
        }
    }
    let _ = dec.finish();
});
