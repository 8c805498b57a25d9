//! Random coefficient data shared by the integration tests
#![allow(dead_code)]

use hevc_cabac::hevc::residual::MAX_ABS_LEVEL;
use hevc_cabac::{CodingConfig, Component, ScanOrder, TransformBlock};
use rand::Rng;
use rand::rngs::StdRng;

/// Level with a roughly residual-like magnitude distribution
pub fn random_level(rng: &mut StdRng) -> i32 {
    let magnitude = match rng.gen_range(0..100) {
        0..=59 => 1,
        60..=84 => rng.gen_range(2..4),
        85..=97 => rng.gen_range(4..200),
        _ => rng.gen_range(200..=MAX_ABS_LEVEL),
    } as i32;
    if rng.gen_bool(0.5) { -magnitude } else { magnitude }
}

/// Set the sign of the first coefficient of every group that hides one so
/// that it matches the parity of the group's level sum
pub fn hide_signs(block: &mut TransformBlock) {
    for i in 0..block.num_groups() {
        let mut group = block.group(i);
        let first = group.levels.iter().position(|&l| l != 0);
        let last = group.levels.iter().rposition(|&l| l != 0);
        if let (Some(first), Some(last)) = (first, last) {
            if last - first > 3 {
                let sum: u32 = group.levels.iter().map(|l| l.unsigned_abs()).sum();
                let magnitude = group.levels[first].abs();
                group.levels[first] = if sum % 2 == 1 { -magnitude } else { magnitude };
                block.set_group(&group);
            }
        }
    }
}

/// Non-zero block that `config` can code
pub fn random_block(
    rng: &mut StdRng,
    config: &CodingConfig,
    log2_size: u8,
    component: Component,
    scan: ScanOrder,
    transquant_bypass: bool,
) -> TransformBlock {
    let mut block = TransformBlock::new(log2_size, component, scan).with_transquant_bypass(transquant_bypass);
    if config.transform_skip_enabled && !transquant_bypass && log2_size == 2 {
        block = block.with_transform_skip(rng.gen_bool(0.5));
    }

    let size = 1u32 << log2_size;
    let density = [0.05, 0.3, 0.8][rng.gen_range(0..3)];
    for y in 0..size {
        for x in 0..size {
            if rng.gen_bool(density) {
                block.set(x, y, random_level(rng));
            }
        }
    }
    if block.is_zero() {
        block.set(rng.gen_range(0..size), rng.gen_range(0..size), 1);
    }
    if config.sign_data_hiding_enabled && !transquant_bypass {
        hide_signs(&mut block);
    }
    block
}

/// Random scan order
pub fn random_scan(rng: &mut StdRng) -> ScanOrder {
    [ScanOrder::Diagonal, ScanOrder::Horizontal, ScanOrder::Vertical][rng.gen_range(0..3)]
}
