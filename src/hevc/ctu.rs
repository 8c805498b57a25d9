//! Coding tree syntax elements (H.265 7.3.8.2-7.3.8.10)
//!
//! Binarization of the CTU / CU / PU / TU level syntax elements and a
//! generic coding quadtree walker. Like the residual functions, everything
//! here is generic over [`BinCoder`]: the encoder passes the value to code,
//! the decoder passes a placeholder and receives the decoded value.

use alloc::vec;
use alloc::vec::Vec;

use super::cabac::BinCoder;
use super::context::{ContextBank, ContextSet, CtxIdx};
use super::ctx_select::{self, NeighborCu};
use super::params::CodingConfig;
use super::residual::code_exp_golomb;

/// Prediction mode of a coding unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredMode {
    /// Intra prediction
    Intra,
    /// Inter prediction (including skipped CUs)
    Inter,
}

/// Partition mode (H.265 Table 7-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartMode {
    /// One PU covering the CU
    Part2Nx2N,
    /// Two horizontal halves
    Part2NxN,
    /// Two vertical halves
    PartNx2N,
    /// Four quarters
    PartNxN,
    /// Asymmetric, top quarter
    Part2NxnU,
    /// Asymmetric, bottom quarter
    Part2NxnD,
    /// Asymmetric, left quarter
    PartnLx2N,
    /// Asymmetric, right quarter
    PartnRx2N,
}

impl PartMode {
    fn is_horizontal(self) -> bool {
        matches!(self, PartMode::Part2NxN | PartMode::Part2NxnU | PartMode::Part2NxnD)
    }

    /// Whether this is an asymmetric motion partition
    pub fn is_amp(self) -> bool {
        matches!(
            self,
            PartMode::Part2NxnU | PartMode::Part2NxnD | PartMode::PartnLx2N | PartMode::PartnRx2N
        )
    }
}

/// inter_pred_idc (H.265 Table 7-15)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterPredIdc {
    /// List 0 only
    PredL0,
    /// List 1 only
    PredL1,
    /// Bi-prediction
    PredBi,
}

/// Position and neighbourhood of one coding quadtree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodingTreeNode {
    /// Luma x of the top-left sample
    pub x0: u32,
    /// Luma y of the top-left sample
    pub y0: u32,
    /// log2 of the node size
    pub log2_size: u8,
    /// Quadtree depth (0 at the CTB)
    pub depth: u8,
    /// Left neighbour CU, if available and already coded
    pub left: Option<NeighborCu>,
    /// Above neighbour CU, if available and already coded
    pub above: Option<NeighborCu>,
}

impl CodingTreeNode {
    /// Node without available neighbours
    pub fn new(x0: u32, y0: u32, log2_size: u8, depth: u8) -> Self {
        Self {
            x0,
            y0,
            log2_size,
            depth,
            left: None,
            above: None,
        }
    }

    /// Node size in luma samples
    pub fn size(&self) -> u32 {
        1 << self.log2_size
    }
}

/// Depth and skip flag of every coded CU on the minimum CB grid
///
/// Supplies the left/above neighbour state for split_cu_flag and
/// cu_skip_flag context selection. Cells not yet coded read as unavailable.
#[derive(Debug, Clone)]
pub struct CtDepthMap {
    /// ctDepth per min CB, 0xFF = not yet coded
    depth: Vec<u8>,
    skip: Vec<bool>,
    stride: u32,
    rows: u32,
    log2_min_cb_size: u8,
    pic_width: u32,
    pic_height: u32,
}

const NOT_CODED: u8 = 0xFF;

impl CtDepthMap {
    /// Empty map for the configured picture
    pub fn new(config: &CodingConfig) -> Self {
        let min_cb = 1u32 << config.log2_min_cb_size;
        let stride = config.pic_width.div_ceil(min_cb);
        let rows = config.pic_height.div_ceil(min_cb);
        let cells = (stride * rows) as usize;
        Self {
            depth: vec![NOT_CODED; cells],
            skip: vec![false; cells],
            stride,
            rows,
            log2_min_cb_size: config.log2_min_cb_size,
            pic_width: config.pic_width,
            pic_height: config.pic_height,
        }
    }

    /// Forget every coded CU (new picture or slice)
    pub fn clear(&mut self) {
        self.depth.fill(NOT_CODED);
        self.skip.fill(false);
    }

    /// Get the CU covering luma sample (x, y), if it is inside the picture
    /// and already coded
    pub fn get(&self, x: i64, y: i64) -> Option<NeighborCu> {
        if x < 0 || y < 0 || x >= i64::from(self.pic_width) || y >= i64::from(self.pic_height) {
            return None;
        }
        let idx = self.index(x as u32, y as u32)?;
        match self.depth[idx] {
            NOT_CODED => None,
            depth => Some(NeighborCu {
                depth,
                skip: self.skip[idx],
            }),
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        let map_x = x >> self.log2_min_cb_size;
        let map_y = y >> self.log2_min_cb_size;
        (map_x < self.stride && map_y < self.rows).then(|| (map_y * self.stride + map_x) as usize)
    }

    /// Record a coded CU
    pub fn set(&mut self, x0: u32, y0: u32, log2_cb_size: u8, depth: u8, skip: bool) {
        let units = 1u32 << log2_cb_size.saturating_sub(self.log2_min_cb_size);
        let min_cb = 1u32 << self.log2_min_cb_size;
        for dy in 0..units {
            for dx in 0..units {
                if let Some(idx) = self.index(x0 + dx * min_cb, y0 + dy * min_cb) {
                    self.depth[idx] = depth;
                    self.skip[idx] = skip;
                }
            }
        }
    }

    /// Node at (x0, y0) with its left and above neighbours filled in
    pub fn node(&self, x0: u32, y0: u32, log2_size: u8, depth: u8) -> CodingTreeNode {
        CodingTreeNode {
            x0,
            y0,
            log2_size,
            depth,
            left: self.get(i64::from(x0) - 1, i64::from(y0)),
            above: self.get(i64::from(x0), i64::from(y0) - 1),
        }
    }
}

/// One context-coded flag
fn flag<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    set: ContextSet,
    inc: usize,
    value: bool,
) -> Result<bool, C::Error> {
    Ok(coder.regular(bank.model_mut(set.at(inc)), u8::from(value))? == 1)
}

/// Truncated unary with a per-bin context (`None` = bypass)
fn truncated_unary<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    value: u32,
    c_max: u32,
    ctx: impl Fn(u32) -> Option<CtxIdx>,
) -> Result<u32, C::Error> {
    if !C::DECODING {
        assert!(value <= c_max, "value {value} exceeds cMax {c_max}");
    }
    let mut v = 0;
    while v < c_max {
        let bin = u8::from(value > v);
        let got = match ctx(v) {
            Some(idx) => coder.regular(bank.model_mut(idx), bin)?,
            None => coder.bypass(bin)?,
        };
        if got == 0 {
            break;
        }
        v += 1;
    }
    Ok(v)
}

/// Whether split_cu_flag is present for the node; when absent the split is
/// inferred from the picture boundary
pub fn split_cu_flag_present(config: &CodingConfig, node: &CodingTreeNode) -> bool {
    node.x0 + node.size() <= config.pic_width
        && node.y0 + node.size() <= config.pic_height
        && node.log2_size > config.log2_min_cb_size
}

/// split_cu_flag, or its inferred value when not present
pub fn code_split_cu_flag<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    node: &CodingTreeNode,
    split: bool,
) -> Result<bool, C::Error> {
    if !split_cu_flag_present(config, node) {
        let inferred = node.log2_size > config.log2_min_cb_size;
        if !C::DECODING {
            assert_eq!(
                split, inferred,
                "configuration mismatch: split_cu_flag at ({}, {}) is inferred",
                node.x0, node.y0
            );
        }
        return Ok(inferred);
    }
    let inc = ctx_select::split_cu_flag_ctx(node.depth, node.left, node.above);
    flag(coder, bank, ContextSet::SplitCuFlag, inc, split)
}

/// cu_transquant_bypass_flag
pub fn code_cu_transquant_bypass_flag<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    bypass: bool,
) -> Result<bool, C::Error> {
    assert!(
        config.transquant_bypass_enabled,
        "configuration mismatch: cu_transquant_bypass_flag with transquant bypass disabled"
    );
    flag(coder, bank, ContextSet::CuTransquantBypassFlag, 0, bypass)
}

/// cu_skip_flag
pub fn code_cu_skip_flag<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    node: &CodingTreeNode,
    skip: bool,
) -> Result<bool, C::Error> {
    let inc = ctx_select::cu_skip_flag_ctx(node.left, node.above);
    flag(coder, bank, ContextSet::CuSkipFlag, inc, skip)
}

/// pred_mode_flag (1 = intra)
pub fn code_pred_mode_flag<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    pred_mode: PredMode,
) -> Result<PredMode, C::Error> {
    let intra = flag(coder, bank, ContextSet::PredModeFlag, 0, pred_mode == PredMode::Intra)?;
    Ok(if intra { PredMode::Intra } else { PredMode::Inter })
}

/// Whether `part` can be signalled for a CU of this mode and size
pub fn part_mode_allowed(
    config: &CodingConfig,
    pred_mode: PredMode,
    log2_cb_size: u8,
    part: PartMode,
) -> bool {
    let at_min = log2_cb_size == config.log2_min_cb_size;
    match (pred_mode, part) {
        (_, PartMode::Part2Nx2N) => true,
        (PredMode::Intra, PartMode::PartNxN) => at_min,
        (PredMode::Intra, _) => false,
        (PredMode::Inter, PartMode::Part2NxN | PartMode::PartNx2N) => true,
        (PredMode::Inter, PartMode::PartNxN) => at_min && log2_cb_size > 3,
        (PredMode::Inter, _) => !at_min && config.amp_enabled,
    }
}

/// part_mode (H.265 Table 9-43 binarization)
pub fn code_part_mode<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    pred_mode: PredMode,
    log2_cb_size: u8,
    part: PartMode,
) -> Result<PartMode, C::Error> {
    if !C::DECODING {
        assert!(
            part_mode_allowed(config, pred_mode, log2_cb_size, part),
            "configuration mismatch: {part:?} not allowed for a {pred_mode:?} CU of size 2^{log2_cb_size}"
        );
    }
    let set = ContextSet::PartMode;
    let at_min = log2_cb_size == config.log2_min_cb_size;

    if pred_mode == PredMode::Intra {
        if !at_min {
            return Ok(PartMode::Part2Nx2N);
        }
        let whole = flag(coder, bank, set, 0, part == PartMode::Part2Nx2N)?;
        return Ok(if whole { PartMode::Part2Nx2N } else { PartMode::PartNxN });
    }

    if flag(coder, bank, set, 0, part == PartMode::Part2Nx2N)? {
        return Ok(PartMode::Part2Nx2N);
    }
    let horizontal = flag(coder, bank, set, 1, part.is_horizontal())?;

    if at_min {
        if horizontal {
            return Ok(PartMode::Part2NxN);
        }
        if log2_cb_size == 3 {
            return Ok(PartMode::PartNx2N);
        }
        let vertical = flag(coder, bank, set, 2, part == PartMode::PartNx2N)?;
        return Ok(if vertical { PartMode::PartNx2N } else { PartMode::PartNxN });
    }

    let symmetric = if config.amp_enabled {
        flag(coder, bank, set, 3, !part.is_amp())?
    } else {
        true
    };
    if symmetric {
        return Ok(if horizontal { PartMode::Part2NxN } else { PartMode::PartNx2N });
    }
    let far = coder.bypass(u8::from(matches!(part, PartMode::Part2NxnD | PartMode::PartnRx2N)))? == 1;
    Ok(match (horizontal, far) {
        (true, false) => PartMode::Part2NxnU,
        (true, true) => PartMode::Part2NxnD,
        (false, false) => PartMode::PartnLx2N,
        (false, true) => PartMode::PartnRx2N,
    })
}

/// prev_intra_luma_pred_flag
pub fn code_prev_intra_luma_pred_flag<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    flag_value: bool,
) -> Result<bool, C::Error> {
    flag(coder, bank, ContextSet::PrevIntraLumaPredFlag, 0, flag_value)
}

/// mpm_idx (truncated unary, cMax 2, bypass)
pub fn code_mpm_idx<C: BinCoder>(coder: &mut C, bank: &mut ContextBank, mpm_idx: u8) -> Result<u8, C::Error> {
    Ok(truncated_unary(coder, bank, u32::from(mpm_idx), 2, |_| None)? as u8)
}

/// rem_intra_luma_pred_mode (5 bypass bits)
pub fn code_rem_intra_luma_pred_mode<C: BinCoder>(coder: &mut C, rem: u8) -> Result<u8, C::Error> {
    if !C::DECODING {
        assert!(rem < 32, "rem_intra_luma_pred_mode {rem} out of range");
    }
    Ok(coder.bypass_bits(u32::from(rem), 5)? as u8)
}

/// intra_chroma_pred_mode: "0" for 4 (derived from luma), "1xx" for 0-3
pub fn code_intra_chroma_pred_mode<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    mode: u8,
) -> Result<u8, C::Error> {
    if !C::DECODING {
        assert!(mode <= 4, "intra_chroma_pred_mode {mode} out of range");
    }
    if !flag(coder, bank, ContextSet::IntraChromaPredMode, 0, mode != 4)? {
        return Ok(4);
    }
    Ok(coder.bypass_bits(u32::from(mode), 2)? as u8)
}

/// merge_flag
pub fn code_merge_flag<C: BinCoder>(coder: &mut C, bank: &mut ContextBank, merge: bool) -> Result<bool, C::Error> {
    flag(coder, bank, ContextSet::MergeFlag, 0, merge)
}

/// merge_idx: truncated unary with cMax MaxNumMergeCand - 1, first bin
/// context coded; absent (0) with a single candidate
pub fn code_merge_idx<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    merge_idx: u8,
) -> Result<u8, C::Error> {
    let n = config.max_num_merge_cand;
    let Some(c_max) = u32::from(n).checked_sub(1).filter(|&c| c < 5) else {
        panic!("configuration mismatch: MaxNumMergeCand {n} outside 1..=5");
    };
    let first = ContextSet::MergeIdx.at(0);
    let v = truncated_unary(coder, bank, u32::from(merge_idx), c_max, |bin| (bin == 0).then_some(first))?;
    Ok(v as u8)
}

/// inter_pred_idc; `ct_depth` selects the first bin's context
pub fn code_inter_pred_idc<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    pb_width: u32,
    pb_height: u32,
    ct_depth: u8,
    idc: InterPredIdc,
) -> Result<InterPredIdc, C::Error> {
    let set = ContextSet::InterPredIdc;
    if pb_width + pb_height != 12 {
        if !C::DECODING {
            assert!(ct_depth < 4, "ct_depth {ct_depth} out of range");
        }
        if flag(coder, bank, set, usize::from(ct_depth.min(3)), idc == InterPredIdc::PredBi)? {
            return Ok(InterPredIdc::PredBi);
        }
    } else if !C::DECODING {
        assert!(idc != InterPredIdc::PredBi, "bi-prediction is not allowed for 8x4 / 4x8 PUs");
    }
    let l1 = flag(coder, bank, set, 4, idc == InterPredIdc::PredL1)?;
    Ok(if l1 { InterPredIdc::PredL1 } else { InterPredIdc::PredL0 })
}

/// ref_idx_l0 / ref_idx_l1: truncated unary, two context-coded bins then
/// bypass
pub fn code_ref_idx<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    num_ref_idx_active: u8,
    ref_idx: u8,
) -> Result<u8, C::Error> {
    let c_max = u32::from(num_ref_idx_active.saturating_sub(1));
    let v = truncated_unary(coder, bank, u32::from(ref_idx), c_max, |bin| {
        (bin < 2).then(|| ContextSet::RefIdx.at(bin as usize))
    })?;
    Ok(v as u8)
}

/// mvp_l0_flag / mvp_l1_flag
pub fn code_mvp_flag<C: BinCoder>(coder: &mut C, bank: &mut ContextBank, mvp: bool) -> Result<bool, C::Error> {
    flag(coder, bank, ContextSet::MvpLxFlag, 0, mvp)
}

/// Largest |mvd| component
const MAX_MVD: u32 = 1 << 15;

/// mvd_coding (7.3.8.9): greater0 flags, greater1 flags, then per component
/// abs_mvd_minus2 (EG1) and sign
pub fn code_mvd<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    mvd: (i32, i32),
) -> Result<(i32, i32), C::Error> {
    let abs = [mvd.0.unsigned_abs(), mvd.1.unsigned_abs()];
    if !C::DECODING {
        assert!(abs.iter().all(|&a| a <= MAX_MVD), "mvd {mvd:?} out of range");
    }
    let mut greater0 = [false; 2];
    for (c, g) in greater0.iter_mut().enumerate() {
        *g = flag(coder, bank, ContextSet::AbsMvdGreater0, 0, abs[c] > 0)?;
    }
    let mut greater1 = [false; 2];
    for c in 0..2 {
        if greater0[c] {
            greater1[c] = flag(coder, bank, ContextSet::AbsMvdGreater1, 0, abs[c] > 1)?;
        }
    }

    let signs = [mvd.0 < 0, mvd.1 < 0];
    let mut out = [0i32; 2];
    for c in 0..2 {
        if !greater0[c] {
            continue;
        }
        let magnitude = if greater1[c] {
            let minus2 = code_exp_golomb(coder, abs[c].saturating_sub(2), 1)?;
            match minus2.checked_add(2).filter(|&m| m <= MAX_MVD) {
                Some(m) => m,
                None => return Err(coder.invalid("motion vector difference out of range")),
            }
        } else {
            1
        };
        let negative = coder.bypass(u8::from(signs[c]))? == 1;
        out[c] = if negative { -(magnitude as i32) } else { magnitude as i32 };
    }
    Ok((out[0], out[1]))
}

/// rqt_root_cbf
pub fn code_rqt_root_cbf<C: BinCoder>(coder: &mut C, bank: &mut ContextBank, cbf: bool) -> Result<bool, C::Error> {
    flag(coder, bank, ContextSet::RqtRootCbf, 0, cbf)
}

/// split_transform_flag
pub fn code_split_transform_flag<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    log2_trafo_size: u8,
    split: bool,
) -> Result<bool, C::Error> {
    let inc = ctx_select::split_transform_flag_ctx(log2_trafo_size);
    flag(coder, bank, ContextSet::SplitTransformFlag, inc, split)
}

/// cbf_luma
pub fn code_cbf_luma<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    trafo_depth: u8,
    cbf: bool,
) -> Result<bool, C::Error> {
    flag(coder, bank, ContextSet::CbfLuma, ctx_select::cbf_luma_ctx(trafo_depth), cbf)
}

/// cbf_cb / cbf_cr
pub fn code_cbf_chroma<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    trafo_depth: u8,
    cbf: bool,
) -> Result<bool, C::Error> {
    flag(coder, bank, ContextSet::CbfChroma, ctx_select::cbf_chroma_ctx(trafo_depth), cbf)
}

/// Largest |CuQpDeltaVal| for 16-bit video
const MAX_CU_QP_DELTA: u32 = 26 + 48;

/// cu_qp_delta_abs and cu_qp_delta_sign_flag: prefix TU cMax 5 (first bin
/// context 0, rest context 1), EG0 suffix, bypass sign
pub fn code_cu_qp_delta<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    delta: i32,
) -> Result<i32, C::Error> {
    assert!(
        config.cu_qp_delta_enabled,
        "configuration mismatch: cu_qp_delta_abs with cu_qp_delta disabled"
    );
    let abs = delta.unsigned_abs();
    if !C::DECODING {
        assert!(abs <= MAX_CU_QP_DELTA, "cu_qp_delta {delta} out of range");
    }
    let prefix = truncated_unary(coder, bank, abs.min(5), 5, |bin| {
        Some(ContextSet::CuQpDeltaAbs.at(usize::from(bin > 0)))
    })?;
    let abs = if prefix == 5 {
        let suffix = code_exp_golomb(coder, abs.saturating_sub(5), 0)?;
        match suffix.checked_add(5).filter(|&v| v <= MAX_CU_QP_DELTA) {
            Some(v) => v,
            None => return Err(coder.invalid("cu_qp_delta_abs out of range")),
        }
    } else {
        prefix
    };
    if abs == 0 {
        return Ok(0);
    }
    let negative = coder.bypass(u8::from(delta < 0))? == 1;
    Ok(if negative { -(abs as i32) } else { abs as i32 })
}

/// end_of_slice_segment_flag / end_of_subset_one_bit
pub fn code_end_of_slice_segment_flag<C: BinCoder>(coder: &mut C, end: bool) -> Result<bool, C::Error> {
    Ok(coder.terminate(u8::from(end))? == 1)
}

/// pcm_flag (terminating bin)
pub fn code_pcm_flag<C: BinCoder>(coder: &mut C, config: &CodingConfig, pcm: bool) -> Result<bool, C::Error> {
    assert!(config.pcm_enabled, "configuration mismatch: pcm_flag with PCM disabled");
    Ok(coder.terminate(u8::from(pcm))? == 1)
}

/// ic_flag (multi-view illumination compensation)
pub fn code_ic_flag<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    ic: bool,
) -> Result<bool, C::Error> {
    assert!(config.multi_view, "configuration mismatch: ic_flag without multi-view coding");
    flag(coder, bank, ContextSet::IcFlag, 0, ic)
}

/// iv_res_pred_weight_idx (0-2): truncated unary; the first bin's context
/// depends on the left PU's weight, the second bin uses context 2
pub fn code_iv_res_pred_weight_idx<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    left_weight_nonzero: bool,
    weight_idx: u8,
) -> Result<u8, C::Error> {
    assert!(
        config.multi_view,
        "configuration mismatch: iv_res_pred_weight_idx without multi-view coding"
    );
    let first = ctx_select::iv_res_pred_weight_ctx(left_weight_nonzero);
    let v = truncated_unary(coder, bank, u32::from(weight_idx), 2, |bin| {
        Some(ContextSet::IvResPredWeightIdx.at(if bin == 0 { first } else { 2 }))
    })?;
    Ok(v as u8)
}

/// Callbacks of [`code_coding_quadtree`]
pub trait CodingTreeVisitor<C: BinCoder> {
    /// Split decision to encode at a node where split_cu_flag is present;
    /// not called when decoding
    fn split(&mut self, node: &CodingTreeNode) -> bool;

    /// Code one coding unit; returns its cu_skip_flag
    fn coding_unit(
        &mut self,
        coder: &mut C,
        bank: &mut ContextBank,
        node: &CodingTreeNode,
    ) -> Result<bool, C::Error>;
}

/// Walk one coding quadtree in pre-order from (x0, y0): code split_cu_flag
/// at every node, recurse into the in-picture quadrants of split nodes and
/// hand every leaf to the visitor
pub fn code_coding_quadtree<C: BinCoder, V: CodingTreeVisitor<C>>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    map: &mut CtDepthMap,
    visitor: &mut V,
    x0: u32,
    y0: u32,
    log2_size: u8,
    depth: u8,
) -> Result<(), C::Error> {
    let node = map.node(x0, y0, log2_size, depth);
    let want = if C::DECODING {
        false
    } else if split_cu_flag_present(config, &node) {
        visitor.split(&node)
    } else {
        log2_size > config.log2_min_cb_size
    };
    let split = code_split_cu_flag(coder, bank, config, &node, want)?;

    if split {
        let half = node.size() / 2;
        for (dx, dy) in [(0, 0), (half, 0), (0, half), (half, half)] {
            let (x, y) = (x0 + dx, y0 + dy);
            if x < config.pic_width && y < config.pic_height {
                code_coding_quadtree(coder, bank, config, map, visitor, x, y, log2_size - 1, depth + 1)?;
            }
        }
    } else {
        let skip = visitor.coding_unit(coder, bank, &node)?;
        map.set(x0, y0, log2_size, depth, skip);
    }
    Ok(())
}
