//! Sample Adaptive Offset syntax (H.265 Section 7.3.8.3)
//!
//! Per-CTB SAO parameters: merge flags, type, offsets, band position and
//! edge class. Only the entropy coding lives here; applying the filter is
//! the reconstruction layer's job.

use alloc::vec;
use alloc::vec::Vec;

use super::cabac::BinCoder;
use super::context::{ContextBank, ContextSet};
use super::ctx_select::Component;
use super::params::CodingConfig;

/// SAO parameters for one CTB
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaoInfo {
    /// SAO type per component: 0=off, 1=band offset, 2=edge offset
    /// [0]=Y, [1]=Cb, [2]=Cr (Cr always equals Cb)
    pub sao_type_idx: [u8; 3],
    /// Edge offset class per component (0-3, only used when type==2)
    pub sao_eo_class: [u8; 3],
    /// Band position per component (0-31, only used when type==1)
    pub sao_band_position: [u8; 3],
    /// Signed offset values per component, 4 values each
    /// For edge offset: [0] and [1] are >= 0, [2] and [3] are <= 0
    pub sao_offset_val: [[i8; 4]; 3],
}

/// SAO map for the entire frame, stored at CTB granularity
#[derive(Debug, Clone)]
pub struct SaoMap {
    data: Vec<SaoInfo>,
    width_ctbs: u32,
}

impl SaoMap {
    /// Map of all-off parameters for the configured picture
    pub fn new(config: &CodingConfig) -> Self {
        let width_ctbs = config.pic_width_in_ctbs();
        Self {
            data: vec![SaoInfo::default(); (width_ctbs * config.pic_height_in_ctbs()) as usize],
            width_ctbs,
        }
    }

    /// Parameters of a CTB
    #[inline]
    pub fn get(&self, ctb_x: u32, ctb_y: u32) -> &SaoInfo {
        &self.data[(ctb_y * self.width_ctbs + ctb_x) as usize]
    }

    /// Mutable parameters of a CTB
    #[inline]
    pub fn get_mut(&mut self, ctb_x: u32, ctb_y: u32) -> &mut SaoInfo {
        &mut self.data[(ctb_y * self.width_ctbs + ctb_x) as usize]
    }
}

/// How a CTB's parameters were signalled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaoMerge {
    /// Coded explicitly
    None,
    /// Copied from the left CTB
    Left,
    /// Copied from the CTB above
    Up,
}

/// cMax of sao_offset_abs
fn offset_abs_max(bit_depth: u8) -> u32 {
    (1 << (bit_depth.min(10) - 5)) - 1
}

fn component_enabled(config: &CodingConfig, c_idx: usize) -> bool {
    if c_idx == 0 {
        config.sao_luma_enabled
    } else {
        config.sao_chroma_enabled
    }
}

const COMPONENTS: [Component; 3] = [Component::Luma, Component::Cb, Component::Cr];

/// cMax of sao_offset_abs for one colour component
fn component_offset_max(config: &CodingConfig, c_idx: usize) -> u32 {
    offset_abs_max(config.component_bit_depth(COMPONENTS[c_idx]))
}

fn check_info(config: &CodingConfig, info: &SaoInfo) {
    assert_eq!(
        info.sao_type_idx[2], info.sao_type_idx[1],
        "Cr shares the SAO type of Cb"
    );
    if info.sao_type_idx[1] == 2 {
        assert_eq!(info.sao_eo_class[2], info.sao_eo_class[1], "Cr shares the edge class of Cb");
    }
    for c_idx in 0..3 {
        let ty = info.sao_type_idx[c_idx];
        assert!(ty <= 2, "sao_type_idx {ty}");
        assert!(
            ty == 0 || component_enabled(config, c_idx),
            "configuration mismatch: SAO parameters for a disabled component"
        );
        if ty == 0 {
            continue;
        }
        let max = component_offset_max(config, c_idx);
        let offsets = info.sao_offset_val[c_idx];
        assert!(
            offsets.iter().all(|o| u32::from(o.unsigned_abs()) <= max),
            "SAO offset beyond {max}"
        );
        if ty == 2 {
            assert!(
                offsets[0] >= 0 && offsets[1] >= 0 && offsets[2] <= 0 && offsets[3] <= 0,
                "edge offset signs are fixed by category"
            );
        }
    }
}

impl SaoInfo {
    /// Copy holding only the fields sao() signals: fields of switched-off
    /// components and the class or position the type does not use are zeroed
    pub fn coded_fields(&self) -> SaoInfo {
        let mut out = SaoInfo::default();
        for c_idx in 0..3 {
            let ty = self.sao_type_idx[c_idx];
            if ty == 0 {
                continue;
            }
            out.sao_type_idx[c_idx] = ty;
            out.sao_offset_val[c_idx] = self.sao_offset_val[c_idx];
            if ty == 1 {
                out.sao_band_position[c_idx] = self.sao_band_position[c_idx];
            } else {
                out.sao_eo_class[c_idx] = self.sao_eo_class[c_idx];
            }
        }
        out
    }
}

/// Code the sao() syntax of one CTB against the parameters stored in `map`.
///
/// When encoding, a merge flag is coded as 1 whenever the CTB's coded
/// parameters equal the available left or upper CTB's; fields sao() does
/// not signal are dropped and the map holds the coded form afterwards.
/// When decoding, the result is written to `map`. `left_available` / `up_available` tell whether the
/// neighbouring CTB lies in the same slice and tile.
pub fn code_sao<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    map: &mut SaoMap,
    ctb_x: u32,
    ctb_y: u32,
    left_available: bool,
    up_available: bool,
) -> Result<SaoMerge, C::Error> {
    assert!(
        config.sao_luma_enabled || config.sao_chroma_enabled,
        "configuration mismatch: sao() coded with SAO disabled in the slice"
    );
    let current = if C::DECODING {
        SaoInfo::default()
    } else {
        let stored = map.get(ctb_x, ctb_y);
        check_info(config, stored);
        stored.coded_fields()
    };
    let merge_ctx = ContextSet::SaoMergeFlag.at(0);

    // sao_merge_left_flag only present if the left CTB is available
    if left_available && ctb_x > 0 {
        let left = *map.get(ctb_x - 1, ctb_y);
        if coder.regular(bank.model_mut(merge_ctx), u8::from(current == left.coded_fields()))? == 1 {
            *map.get_mut(ctb_x, ctb_y) = left;
            return Ok(SaoMerge::Left);
        }
    }
    if up_available && ctb_y > 0 {
        let up = *map.get(ctb_x, ctb_y - 1);
        if coder.regular(bank.model_mut(merge_ctx), u8::from(current == up.coded_fields()))? == 1 {
            *map.get_mut(ctb_x, ctb_y) = up;
            return Ok(SaoMerge::Up);
        }
    }

    let mut info = SaoInfo::default();
    for c_idx in 0..3 {
        if !component_enabled(config, c_idx) {
            continue;
        }
        let max = component_offset_max(config, c_idx);

        // Type index: only coded for c_idx < 2, Cr inherits from Cb
        if c_idx < 2 {
            let want = current.sao_type_idx[c_idx];
            let on = coder.regular(bank.model_mut(ContextSet::SaoTypeIdx.at(0)), u8::from(want != 0))?;
            info.sao_type_idx[c_idx] = if on == 0 {
                0
            } else if coder.bypass(u8::from(want == 2))? == 1 {
                2
            } else {
                1
            };
        } else {
            info.sao_type_idx[2] = info.sao_type_idx[1];
        }

        let ty = info.sao_type_idx[c_idx];
        if ty == 0 {
            continue;
        }

        let want = current.sao_offset_val[c_idx];
        let mut abs = [0u8; 4];
        for i in 0..4 {
            let value = u32::from(want[i].unsigned_abs());
            let mut v = 0;
            while v < max {
                if coder.bypass(u8::from(value > v))? == 0 {
                    break;
                }
                v += 1;
            }
            abs[i] = v as u8;
        }

        if ty == 1 {
            // Band offset: signs for non-zero offsets, then band_position
            for i in 0..4 {
                let magnitude = abs[i] as i8;
                info.sao_offset_val[c_idx][i] = if magnitude != 0 && coder.bypass(u8::from(want[i] < 0))? == 1 {
                    -magnitude
                } else {
                    magnitude
                };
            }
            let position = u32::from(current.sao_band_position[c_idx]);
            info.sao_band_position[c_idx] = coder.bypass_bits(position, 5)? as u8;
        } else {
            // Edge offset: categories 1-2 positive, 3-4 negative
            for i in 0..4 {
                let magnitude = abs[i] as i8;
                info.sao_offset_val[c_idx][i] = if i < 2 { magnitude } else { -magnitude };
            }
            info.sao_eo_class[c_idx] = if c_idx < 2 {
                coder.bypass_bits(u32::from(current.sao_eo_class[c_idx]), 2)? as u8
            } else {
                info.sao_eo_class[1]
            };
        }
    }

    if !C::DECODING {
        debug_assert_eq!(info, current);
    }
    *map.get_mut(ctb_x, ctb_y) = info;
    Ok(SaoMerge::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hevc::cabac::{CabacDecoder, CabacEncoder};
    use crate::hevc::params::{SliceParams, SliceType};

    fn band(position: u8) -> SaoInfo {
        SaoInfo {
            sao_type_idx: [1, 2, 2],
            sao_eo_class: [0, 3, 3],
            sao_band_position: [position, 0, 0],
            sao_offset_val: [[3, -7, 0, 1], [2, 1, 0, -4], [0, 0, -1, -1]],
        }
    }

    #[test]
    fn test_sao_round_trip_with_merges() {
        let config = CodingConfig::new(256, 128).with_sao(true, true);
        let mut enc_map = SaoMap::new(&config);
        *enc_map.get_mut(0, 0) = band(17);
        *enc_map.get_mut(1, 0) = band(17);
        *enc_map.get_mut(2, 0) = band(4);
        *enc_map.get_mut(2, 1) = band(4);

        let params = SliceParams::new(SliceType::P, 32);
        let ctbs = [(0, 0), (1, 0), (2, 0), (3, 0), (0, 1), (1, 1), (2, 1), (3, 1)];

        let mut bank = ContextBank::new(&params);
        let mut enc = CabacEncoder::new();
        let mut merges = Vec::new();
        for &(x, y) in &ctbs {
            let Ok(m) = code_sao(&mut enc, &mut bank, &config, &mut enc_map, x, y, true, true);
            merges.push(m);
        }
        assert_eq!(merges[1], SaoMerge::Left);
        assert_eq!(merges[6], SaoMerge::Up);
        let bytes = enc.finish();

        let mut dec_bank = ContextBank::new(&params);
        let mut dec = CabacDecoder::new(&bytes).unwrap();
        let mut dec_map = SaoMap::new(&config);
        for (i, &(x, y)) in ctbs.iter().enumerate() {
            let m = code_sao(&mut dec, &mut dec_bank, &config, &mut dec_map, x, y, true, true).unwrap();
            assert_eq!(m, merges[i]);
            assert_eq!(dec_map.get(x, y), enc_map.get(x, y));
        }
        assert_eq!(dec_bank, bank);
        dec.finish().unwrap();
    }

    #[test]
    fn test_offset_range_follows_bit_depth() {
        assert_eq!(offset_abs_max(8), 7);
        assert_eq!(offset_abs_max(10), 31);
        assert_eq!(offset_abs_max(12), 31);
    }

    fn round_trip(config: &CodingConfig, enc_map: &mut SaoMap, ctbs: &[(u32, u32)]) -> (Vec<SaoMerge>, SaoMap) {
        let params = SliceParams::new(SliceType::P, 32);
        let mut bank = ContextBank::new(&params);
        let mut enc = CabacEncoder::new();
        let mut merges = Vec::new();
        for &(x, y) in ctbs {
            let Ok(m) = code_sao(&mut enc, &mut bank, config, enc_map, x, y, true, true);
            merges.push(m);
        }
        let bytes = enc.finish();

        let mut dec_bank = ContextBank::new(&params);
        let mut dec = CabacDecoder::new(&bytes).unwrap();
        let mut dec_map = SaoMap::new(config);
        for (i, &(x, y)) in ctbs.iter().enumerate() {
            let m = code_sao(&mut dec, &mut dec_bank, config, &mut dec_map, x, y, true, true).unwrap();
            assert_eq!(m, merges[i]);
        }
        assert_eq!(dec_bank, bank);
        dec.finish().unwrap();
        (merges, dec_map)
    }

    #[test]
    fn test_uncoded_fields_are_dropped() {
        let config = CodingConfig::new(128, 64).with_sao(true, true);
        let stale = SaoInfo {
            sao_type_idx: [1, 0, 0],
            sao_eo_class: [2, 1, 3],
            sao_band_position: [9, 4, 4],
            sao_offset_val: [[1, 2, -3, 0], [5, 5, 5, 5], [-6, 0, 0, 6]],
        };
        let mut enc_map = SaoMap::new(&config);
        *enc_map.get_mut(0, 0) = stale;
        // Same coded parameters, different leftovers
        *enc_map.get_mut(1, 0) = SaoInfo {
            sao_eo_class: [0, 0, 0],
            sao_offset_val: [[1, 2, -3, 0], [0; 4], [0; 4]],
            ..stale
        };
        let (merges, dec_map) = round_trip(&config, &mut enc_map, &[(0, 0), (1, 0)]);
        assert_eq!(merges, [SaoMerge::None, SaoMerge::Left]);

        let expected = stale.coded_fields();
        assert_eq!(expected.sao_eo_class, [0; 3]);
        assert_eq!(expected.sao_band_position, [9, 0, 0]);
        assert_eq!(expected.sao_offset_val[1], [0; 4]);
        assert_eq!(*enc_map.get(0, 0), expected);
        assert_eq!(*dec_map.get(0, 0), expected);
        assert_eq!(*dec_map.get(1, 0), expected);
    }

    #[test]
    fn test_chroma_offsets_follow_chroma_bit_depth() {
        let config = CodingConfig::new(64, 64).with_sao(true, true).with_bit_depths(8, 10);
        let info = SaoInfo {
            sao_type_idx: [2, 1, 1],
            sao_eo_class: [1, 0, 0],
            sao_band_position: [0, 30, 2],
            sao_offset_val: [[7, 0, 0, -7], [31, -31, 0, 17], [-20, 0, 31, 1]],
        };
        let mut enc_map = SaoMap::new(&config);
        *enc_map.get_mut(0, 0) = info;
        let (_, dec_map) = round_trip(&config, &mut enc_map, &[(0, 0)]);
        assert_eq!(*dec_map.get(0, 0), info);
    }

    #[test]
    #[should_panic(expected = "SAO offset beyond 7")]
    fn test_luma_offsets_keep_luma_bit_depth() {
        let config = CodingConfig::new(64, 64).with_sao(true, true).with_bit_depths(8, 10);
        let mut map = SaoMap::new(&config);
        map.get_mut(0, 0).sao_type_idx = [1, 0, 0];
        map.get_mut(0, 0).sao_offset_val[0] = [8, 0, 0, 0];
        let mut bank = ContextBank::new(&SliceParams::new(SliceType::I, 30));
        let mut enc = CabacEncoder::new();
        let _ = code_sao(&mut enc, &mut bank, &config, &mut map, 0, 0, false, false);
    }

    #[test]
    #[should_panic(expected = "configuration mismatch")]
    fn test_chroma_parameters_with_chroma_disabled() {
        let config = CodingConfig::new(64, 64).with_sao(true, false);
        let mut map = SaoMap::new(&config);
        *map.get_mut(0, 0) = band(0);
        let mut bank = ContextBank::new(&SliceParams::new(SliceType::I, 30));
        let mut enc = CabacEncoder::new();
        let _ = code_sao(&mut enc, &mut bank, &config, &mut map, 0, 0, false, false);
    }
}
