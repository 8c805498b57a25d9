//! Residual (transform coefficient) coding
//!
//! This module binarizes quantized transform coefficients (H.265 7.3.8.11):
//! the last significant position, then for each 4x4 coefficient group in
//! reverse scan order the coded_sub_block_flag, significance map,
//! greater1/greater2 flags, signs and remaining levels.
//!
//! Every function is generic over [`BinCoder`], so one body drives both the
//! encoder and the decoder.

use alloc::vec;
use alloc::vec::Vec;

use super::cabac::BinCoder;
use super::context::{ContextBank, ContextSet};
use super::ctx_select::{self, Component, Greater1Ctx};
use super::params::CodingConfig;

/// Largest coefficient magnitude without extended precision
pub const MAX_ABS_LEVEL: u32 = 32768;

/// Longest Exp-Golomb escape prefix accepted when decoding; 32768 needs 15
const MAX_ESCAPE_PREFIX: u32 = 20;

/// Ones of the truncated Rice prefix before the escape (COEF_REMAIN_BIN_REDUCTION)
const RICE_PREFIX_BINS: u32 = 3;

/// How coefficient levels are binarized, as selected by the range extension
/// flags for one component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCoding {
    /// log2 of the coefficient range; magnitudes go up to `1 << log2_range`
    pub log2_range: u8,
    /// Escape prefix bounded by the range (extended_precision_processing_flag)
    pub limited_prefix: bool,
    /// Rice parameter seeded from StatCoeff and not capped at 4
    pub persistent_rice: bool,
    /// Range forced to 256 before the bypass bins of groups with escape data
    pub bypass_alignment: bool,
}

impl Default for LevelCoding {
    fn default() -> Self {
        Self {
            log2_range: 15,
            limited_prefix: false,
            persistent_rice: false,
            bypass_alignment: false,
        }
    }
}

impl LevelCoding {
    /// Level coding of `component` under `config`
    pub fn for_component(config: &CodingConfig, component: Component) -> Self {
        Self {
            log2_range: config.log2_transform_range(component),
            limited_prefix: config.extended_precision_processing,
            persistent_rice: config.persistent_rice_adaptation,
            bypass_alignment: config.cabac_bypass_alignment,
        }
    }

    /// Largest coefficient magnitude
    pub fn max_level(self) -> u32 {
        1 << self.log2_range
    }
}

/// Scan order types for coefficient scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanOrder {
    /// Up-right diagonal scan (default)
    Diagonal = 0,
    /// Horizontal scan (for vertical-ish intra modes)
    Horizontal = 1,
    /// Vertical scan (for horizontal-ish intra modes)
    Vertical = 2,
}

/// Get scan order for an intra block (H.265 7.4.9.11, 4:2:0)
pub fn get_scan_order(log2_size: u8, component: Component, intra_mode: u8) -> ScanOrder {
    // Mode-dependent scans apply to 4x4 blocks and to 8x8 luma
    if log2_size == 2 || (log2_size == 3 && component.is_luma()) {
        if (6..=14).contains(&intra_mode) {
            ScanOrder::Vertical
        } else if (22..=30).contains(&intra_mode) {
            ScanOrder::Horizontal
        } else {
            ScanOrder::Diagonal
        }
    } else {
        ScanOrder::Diagonal
    }
}

const fn build_scan(order: u8, blk: usize) -> [(u8, u8); 64] {
    let mut out = [(0u8, 0u8); 64];
    let mut i = 0;
    match order {
        // Up-right diagonal (6.5.3): walk anti-diagonals bottom-left to top-right
        0 => {
            let mut x: isize = 0;
            let mut y: isize = 0;
            while i < blk * blk {
                while y >= 0 {
                    if (x as usize) < blk && (y as usize) < blk {
                        out[i] = (x as u8, y as u8);
                        i += 1;
                    }
                    y -= 1;
                    x += 1;
                }
                y = x;
                x = 0;
            }
        }
        // Horizontal (6.5.4)
        1 => {
            while i < blk * blk {
                out[i] = ((i % blk) as u8, (i / blk) as u8);
                i += 1;
            }
        }
        // Vertical (6.5.5)
        _ => {
            while i < blk * blk {
                out[i] = ((i / blk) as u8, (i % blk) as u8);
                i += 1;
            }
        }
    }
    out
}

const fn build_all_scans() -> [[[(u8, u8); 64]; 4]; 3] {
    let mut all = [[[(0u8, 0u8); 64]; 4]; 3];
    let mut order = 0;
    while order < 3 {
        let mut log2 = 0;
        while log2 < 4 {
            all[order][log2] = build_scan(order as u8, 1 << log2);
            log2 += 1;
        }
        order += 1;
    }
    all
}

/// Scan tables for 1x1, 2x2, 4x4 and 8x8 grids, as (x, y)
static SCANS: [[[(u8, u8); 64]; 4]; 3] = build_all_scans();

/// Scan positions of a `2^log2_blk` square grid (`log2_blk` 0-3)
pub fn get_scan(order: ScanOrder, log2_blk: u8) -> &'static [(u8, u8)] {
    &SCANS[order as usize][log2_blk as usize][..1 << (2 * log2_blk)]
}

/// Get scan order table for positions inside a 4x4 sub-block
pub fn get_scan_4x4(order: ScanOrder) -> &'static [(u8, u8)] {
    get_scan(order, 2)
}

/// Prefix group of each last-position coordinate (Table 9-38 binarization)
static GROUP_IDX: [u8; 32] = [
    0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9, 9,
];

/// Smallest coordinate of each prefix group
static MIN_IN_GROUP: [u32; 10] = [0, 1, 2, 3, 4, 6, 8, 12, 16, 24];

/// One 4x4 coefficient group: sixteen levels in scan order plus its
/// coded_sub_block_flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoefficientGroup {
    /// Index of the group in the block's sub-block scan
    pub sub_block: usize,
    /// Whether the group carries coefficients (coded or inferred)
    pub coded: bool,
    /// Levels indexed by scan position inside the group
    pub levels: [i32; 16],
}

impl CoefficientGroup {
    /// Group with the given levels; `coded` follows from them
    pub fn new(sub_block: usize, levels: [i32; 16]) -> Self {
        Self {
            sub_block,
            coded: levels.iter().any(|&l| l != 0),
            levels,
        }
    }

    /// All-zero group, the starting point for decoding
    pub fn empty(sub_block: usize) -> Self {
        Self::new(sub_block, [0; 16])
    }

    /// Number of non-zero levels
    pub fn num_significant(&self) -> usize {
        self.levels.iter().filter(|&&l| l != 0).count()
    }

    /// (scan position, level) pairs of the non-zero levels
    pub fn significant(&self) -> impl Iterator<Item = (usize, i32)> + '_ {
        self.levels.iter().copied().enumerate().filter(|&(_, l)| l != 0)
    }
}

/// Coefficients of one transform block in raster order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformBlock {
    /// Transform size (log2, 2-5)
    pub log2_size: u8,
    /// Colour component
    pub component: Component,
    /// Coefficient scan
    pub scan: ScanOrder,
    /// cu_transquant_bypass_flag of the containing CU
    pub transquant_bypass: bool,
    /// transform_skip_flag
    pub transform_skip: bool,
    /// Levels, row-major
    pub coeffs: Vec<i32>,
}

impl TransformBlock {
    /// All-zero block
    pub fn new(log2_size: u8, component: Component, scan: ScanOrder) -> Self {
        assert!(
            (2..=5).contains(&log2_size),
            "configuration mismatch: transform size 2^{log2_size}"
        );
        Self {
            log2_size,
            component,
            scan,
            transquant_bypass: false,
            transform_skip: false,
            coeffs: vec![0; 1 << (2 * log2_size)],
        }
    }

    /// Set cu_transquant_bypass_flag
    pub fn with_transquant_bypass(mut self, bypass: bool) -> Self {
        self.transquant_bypass = bypass;
        self
    }

    /// Set transform_skip_flag
    pub fn with_transform_skip(mut self, skip: bool) -> Self {
        self.transform_skip = skip;
        self
    }

    /// Block width in samples
    pub fn size(&self) -> usize {
        1 << self.log2_size
    }

    /// Level at (x, y)
    pub fn get(&self, x: u32, y: u32) -> i32 {
        self.coeffs[y as usize * self.size() + x as usize]
    }

    /// Set the level at (x, y)
    pub fn set(&mut self, x: u32, y: u32, level: i32) {
        let size = self.size();
        self.coeffs[y as usize * size + x as usize] = level;
    }

    /// Number of 4x4 groups in the block
    pub fn num_groups(&self) -> usize {
        1 << (2 * (self.log2_size - 2))
    }

    fn group_positions(&self, sub_block: usize) -> impl Iterator<Item = usize> + '_ {
        let (xs, ys) = get_scan(self.scan, self.log2_size - 2)[sub_block];
        let size = self.size();
        get_scan_4x4(self.scan).iter().map(move |&(xp, yp)| {
            (usize::from(ys) * 4 + usize::from(yp)) * size + usize::from(xs) * 4 + usize::from(xp)
        })
    }

    /// Copy out the group at `sub_block` in scan order
    pub fn group(&self, sub_block: usize) -> CoefficientGroup {
        let mut levels = [0; 16];
        for (n, pos) in self.group_positions(sub_block).enumerate() {
            levels[n] = self.coeffs[pos];
        }
        CoefficientGroup::new(sub_block, levels)
    }

    /// Write a group back into the block
    pub fn set_group(&mut self, group: &CoefficientGroup) {
        let positions: [usize; 16] = {
            let mut p = [0; 16];
            for (n, pos) in self.group_positions(group.sub_block).enumerate() {
                p[n] = pos;
            }
            p
        };
        for (n, pos) in positions.into_iter().enumerate() {
            self.coeffs[pos] = group.levels[n];
        }
    }

    /// Position of the last non-zero level in scan order
    pub fn last_significant(&self) -> Option<(u32, u32)> {
        (0..self.num_groups()).rev().find_map(|i| {
            let (xs, ys) = get_scan(self.scan, self.log2_size - 2)[i];
            let group = self.group(i);
            (0..16).rev().find(|&n| group.levels[n] != 0).map(|n| {
                let (xp, yp) = get_scan_4x4(self.scan)[n];
                (u32::from(xs) * 4 + u32::from(xp), u32::from(ys) * 4 + u32::from(yp))
            })
        })
    }

    /// Whether every level is zero
    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }
}

/// Coding state of one transform block between coefficient groups
///
/// Created per block; [`code_last_position`](Self::code_last_position) comes
/// first, then [`code_group`](Self::code_group) once per group from the
/// group holding the last position down to group 0.
#[derive(Debug, Clone)]
pub struct ResidualScan {
    component: Component,
    log2_size: u8,
    scan: ScanOrder,
    sign_hiding: bool,
    transform_skip: bool,
    transquant_bypass: bool,
    levels: LevelCoding,
    last: (u32, u32),
    last_sub_block: usize,
    last_pos: usize,
    next_sub_block: Option<usize>,
    /// coded_sub_block_flag per sub-block, raster order
    coded: [bool; 64],
    greater1: Greater1Ctx,
}

impl ResidualScan {
    /// Start a block. `sign_hiding` is sign_data_hiding_enabled_flag with
    /// cu_transquant_bypass_flag already taken into account.
    pub fn new(component: Component, log2_size: u8, scan: ScanOrder, sign_hiding: bool) -> Self {
        assert!(
            (2..=5).contains(&log2_size),
            "configuration mismatch: transform size 2^{log2_size}"
        );
        Self {
            component,
            log2_size,
            scan,
            sign_hiding,
            transform_skip: false,
            transquant_bypass: false,
            levels: LevelCoding::default(),
            last: (0, 0),
            last_sub_block: 0,
            last_pos: 0,
            next_sub_block: None,
            coded: [false; 64],
            greater1: Greater1Ctx::new(component),
        }
    }

    /// Start a block with sign hiding and level coding derived from the
    /// configuration
    pub fn for_block(config: &CodingConfig, block: &TransformBlock) -> Self {
        let mut scan = Self::new(
            block.component,
            block.log2_size,
            block.scan,
            config.sign_data_hiding_enabled && !block.transquant_bypass,
        )
        .with_level_coding(LevelCoding::for_component(config, block.component));
        scan.transquant_bypass = block.transquant_bypass;
        scan
    }

    /// Use range extension level coding
    pub fn with_level_coding(mut self, levels: LevelCoding) -> Self {
        self.levels = levels;
        self
    }

    /// Rice statistics class (sbType) of the block
    fn rice_stat_class(&self) -> usize {
        2 * usize::from(self.component.is_luma()) + usize::from(self.transform_skip || self.transquant_bypass)
    }

    /// Sub-block the next call to [`code_group`](Self::code_group) codes
    pub fn next_sub_block(&self) -> Option<usize> {
        self.next_sub_block
    }

    /// Index of the sub-block holding the last significant coefficient
    pub fn last_sub_block(&self) -> usize {
        self.last_sub_block
    }

    /// Position of the last significant coefficient, once coded
    pub fn last_position(&self) -> (u32, u32) {
        self.last
    }

    /// transform_skip_flag of the block
    pub fn transform_skip(&self) -> bool {
        self.transform_skip
    }

    /// Colour component of the block
    pub fn component(&self) -> Component {
        self.component
    }

    /// Scan order of the block
    pub fn scan(&self) -> ScanOrder {
        self.scan
    }

    fn sub_block_width(&self) -> usize {
        1 << (self.log2_size - 2)
    }

    fn sub_block_pos(&self, sub_block: usize) -> (usize, usize) {
        let (xs, ys) = get_scan(self.scan, self.log2_size - 2)[sub_block];
        (usize::from(xs), usize::from(ys))
    }

    /// Code last_sig_coeff_{x,y}_{prefix,suffix}. `last` is the position of
    /// the last significant coefficient (ignored when decoding); returns the
    /// coded position.
    pub fn code_last_position<C: BinCoder>(
        &mut self,
        coder: &mut C,
        bank: &mut ContextBank,
        last: (u32, u32),
    ) -> Result<(u32, u32), C::Error> {
        let size = 1u32 << self.log2_size;
        if !C::DECODING {
            assert!(
                last.0 < size && last.1 < size,
                "last position {last:?} outside a {size}x{size} block"
            );
        }

        // Vertical scan codes the coordinates swapped
        let (cx, cy) = if self.scan == ScanOrder::Vertical {
            (last.1, last.0)
        } else {
            last
        };
        let (offset, shift) = ctx_select::last_sig_coeff_prefix_ctx(self.component, self.log2_size);
        let c_max = u32::from(2 * self.log2_size - 1);

        let prefix_x = code_last_prefix(
            coder,
            bank,
            ContextSet::LastSigCoeffXPrefix,
            offset,
            shift,
            c_max,
            u32::from(GROUP_IDX[(cx & 31) as usize]),
        )?;
        let prefix_y = code_last_prefix(
            coder,
            bank,
            ContextSet::LastSigCoeffYPrefix,
            offset,
            shift,
            c_max,
            u32::from(GROUP_IDX[(cy & 31) as usize]),
        )?;
        let x = code_last_suffix(coder, prefix_x, cx)?;
        let y = code_last_suffix(coder, prefix_y, cy)?;

        let (x, y) = if self.scan == ScanOrder::Vertical {
            (y, x)
        } else {
            (x, y)
        };
        self.set_last(x, y);
        Ok((x, y))
    }

    fn set_last(&mut self, x: u32, y: u32) {
        self.last = (x, y);
        let sub_scan = get_scan(self.scan, self.log2_size - 2);
        let target = ((x >> 2) as u8, (y >> 2) as u8);
        self.last_sub_block = sub_scan.iter().position(|&p| p == target).unwrap_or(0);
        let inner = ((x & 3) as u8, (y & 3) as u8);
        self.last_pos = get_scan_4x4(self.scan)
            .iter()
            .position(|&p| p == inner)
            .unwrap_or(0);
        self.next_sub_block = Some(self.last_sub_block);
        self.coded = [false; 64];
        self.greater1 = Greater1Ctx::new(self.component);
    }

    fn check_group(&self, group: &CoefficientGroup, sub_block: usize) {
        let max = self.levels.max_level();
        if let Some(&bad) = group.levels.iter().find(|l| l.unsigned_abs() > max) {
            panic!("coefficient level {bad} exceeds {max}");
        }
        if sub_block == self.last_sub_block {
            assert!(
                group.levels[self.last_pos] != 0
                    && group.levels[self.last_pos + 1..].iter().all(|&l| l == 0),
                "configuration mismatch: group {sub_block} disagrees with the coded last position"
            );
        }
    }

    /// Code the next coefficient group. When encoding, `group` holds the
    /// levels to code; when decoding, it is overwritten with the result.
    pub fn code_group<C: BinCoder>(
        &mut self,
        coder: &mut C,
        bank: &mut ContextBank,
        group: &mut CoefficientGroup,
    ) -> Result<(), C::Error> {
        let Some(i) = self.next_sub_block else {
            panic!("configuration mismatch: no coefficient group left in this block");
        };
        assert_eq!(
            group.sub_block, i,
            "configuration mismatch: groups must follow reverse scan order"
        );
        if !C::DECODING {
            self.check_group(group, i);
        }
        let levels = group.levels;

        let sb_width = self.sub_block_width();
        let (xs, ys) = self.sub_block_pos(i);
        let right = xs + 1 < sb_width && self.coded[ys * sb_width + xs + 1];
        let below = ys + 1 < sb_width && self.coded[(ys + 1) * sb_width + xs];

        // 1. coded_sub_block_flag, inferred for the first and last groups
        let coded = if i > 0 && i < self.last_sub_block {
            let inc = ctx_select::coded_sub_block_flag_ctx(self.component, right, below);
            let ctx = ContextSet::CodedSubBlockFlag.at(inc);
            let any = levels.iter().any(|&l| l != 0);
            coder.regular(bank.model_mut(ctx), u8::from(any))? == 1
        } else {
            true
        };
        self.coded[ys * sb_width + xs] = coded;
        self.next_sub_block = i.checked_sub(1);
        group.coded = coded;
        if !coded {
            group.levels = [0; 16];
            return Ok(());
        }

        // 2. sig_coeff_flag, from the highest scan position down
        let prev_csbf = u8::from(right) | (u8::from(below) << 1);
        let scan_pos = get_scan_4x4(self.scan);
        let mut sig_pos = [0usize; 16];
        let mut num_sig = 0;
        let top = if i == self.last_sub_block {
            sig_pos[0] = self.last_pos;
            num_sig = 1;
            self.last_pos
        } else {
            16
        };
        let mut infer_dc = i > 0 && i < self.last_sub_block;
        for n in (0..top).rev() {
            if n == 0 && infer_dc {
                sig_pos[num_sig] = 0;
                num_sig += 1;
                break;
            }
            let (xp, yp) = scan_pos[n];
            let x_c = (xs as u32) * 4 + u32::from(xp);
            let y_c = (ys as u32) * 4 + u32::from(yp);
            let inc = ctx_select::sig_coeff_flag_ctx(
                self.component,
                self.log2_size,
                self.scan,
                x_c,
                y_c,
                prev_csbf,
            );
            let ctx = ContextSet::SigCoeffFlag.at(inc);
            if coder.regular(bank.model_mut(ctx), u8::from(levels[n] != 0))? == 1 {
                sig_pos[num_sig] = n;
                num_sig += 1;
                infer_dc = false;
            }
        }

        if num_sig == 0 {
            group.levels = [0; 16];
            return Ok(());
        }

        // 3. coeff_abs_level_greater1_flag for the first eight
        self.greater1.start_sub_block(i);
        let mut abs = [1u32; 16];
        let mut first_g1 = None;
        let mut escape_data = num_sig > 8;
        for k in 0..num_sig.min(8) {
            let ctx = ContextSet::CoeffAbsLevelGreater1.at(self.greater1.greater1_ctx());
            let want = u8::from(levels[sig_pos[k]].unsigned_abs() > 1);
            let g1 = coder.regular(bank.model_mut(ctx), want)? == 1;
            self.greater1.update(g1);
            if g1 {
                abs[k] = 2;
                escape_data |= first_g1.is_some();
                first_g1.get_or_insert(k);
            }
        }

        // 4. coeff_abs_level_greater2_flag for the first greater-than-one
        if let Some(k) = first_g1 {
            let ctx = ContextSet::CoeffAbsLevelGreater2.at(self.greater1.greater2_ctx());
            let want = u8::from(levels[sig_pos[k]].unsigned_abs() > 2);
            if coder.regular(bank.model_mut(ctx), want)? == 1 {
                abs[k] = 3;
                escape_data = true;
            }
        }

        if escape_data && self.levels.bypass_alignment {
            coder.align_bypass();
        }

        // 5. coeff_sign_flag; the sign at the lowest scan position may be hidden
        let hide = self.sign_hiding && sig_pos[0] - sig_pos[num_sig - 1] > 3;
        let num_signs = if hide { num_sig - 1 } else { num_sig };
        let want_signs = sig_pos[..num_signs]
            .iter()
            .fold(0u32, |acc, &n| (acc << 1) | u32::from(levels[n] < 0));
        let signs = coder.bypass_bits(want_signs, num_signs as u8)?;

        // 6. coeff_abs_level_remaining
        let coding = self.levels;
        let stat_class = self.rice_stat_class();
        let mut rice = if coding.persistent_rice { bank.rice_stat(stat_class) / 4 } else { 0 };
        let mut update_stat = coding.persistent_rice;
        let mut sum_abs = 0u32;
        for k in 0..num_sig {
            let base = abs[k];
            let threshold = match (k < 8, first_g1 == Some(k)) {
                (true, true) => 3,
                (true, false) => 2,
                (false, _) => 1,
            };
            if base == threshold {
                let want = levels[sig_pos[k]].unsigned_abs().saturating_sub(base);
                let remaining = code_abs_level_remaining(coder, want, rice, coding)?;
                let level = match base.checked_add(remaining) {
                    Some(level) if level <= coding.max_level() => level,
                    _ => return Err(coder.invalid("coefficient level exceeds the coefficient range")),
                };
                abs[k] = level;
                if update_stat {
                    update_rice_stat(bank.rice_stat_mut(stat_class), remaining);
                    update_stat = false;
                }
                if level > 3 << rice {
                    rice = if coding.persistent_rice { rice + 1 } else { (rice + 1).min(4) };
                }
            }
            sum_abs += abs[k];
        }

        let mut out = [0i32; 16];
        for k in 0..num_sig {
            let negative = if k < num_signs {
                (signs >> (num_signs - 1 - k)) & 1 == 1
            } else {
                sum_abs % 2 == 1
            };
            let magnitude = abs[k] as i32;
            out[sig_pos[k]] = if negative { -magnitude } else { magnitude };
        }

        if !C::DECODING && out != levels {
            panic!(
                "configuration mismatch: sign of the coefficient at scan position {} is hidden \
                 but the level sum parity disagrees with it",
                sig_pos[num_sig - 1]
            );
        }
        group.levels = out;
        Ok(())
    }
}

/// Truncated unary last_sig_coeff prefix
fn code_last_prefix<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    set: ContextSet,
    offset: usize,
    shift: u8,
    c_max: u32,
    prefix: u32,
) -> Result<u32, C::Error> {
    let mut v = 0;
    while v < c_max {
        let ctx = set.at(offset + (v >> shift) as usize);
        if coder.regular(bank.model_mut(ctx), u8::from(prefix > v))? == 0 {
            break;
        }
        v += 1;
    }
    Ok(v)
}

/// Fixed-length bypass last_sig_coeff suffix; returns the coordinate
fn code_last_suffix<C: BinCoder>(coder: &mut C, prefix: u32, value: u32) -> Result<u32, C::Error> {
    if prefix <= 3 {
        return Ok(prefix);
    }
    let len = (prefix >> 1) - 1;
    let min = MIN_IN_GROUP[prefix as usize];
    let suffix = coder.bypass_bits(value.saturating_sub(min), len as u8)?;
    Ok(min + suffix)
}

/// StatCoeff update from the first coeff_abs_level_remaining of a group
fn update_rice_stat(stat: &mut u8, remaining: u32) {
    let k = u32::from(*stat / 4);
    if remaining >= 3 << k {
        *stat = stat.saturating_add(1);
    } else if 2 * remaining < 1 << k && *stat > 0 {
        *stat -= 1;
    }
}

/// coeff_abs_level_remaining (H.265 9.3.3.11): a truncated Rice prefix of at
/// most four ones with a `rice`-bit suffix, escaping to Exp-Golomb of order
/// `rice + 1` for values of `4 << rice` and above. With a limited prefix the
/// escape follows 9.3.3.12 instead.
pub fn code_abs_level_remaining<C: BinCoder>(
    coder: &mut C,
    value: u32,
    rice: u8,
    coding: LevelCoding,
) -> Result<u32, C::Error> {
    if rice >= coding.log2_range {
        return Err(coder.invalid("rice parameter exceeds the coefficient range"));
    }
    let mut prefix = 0u32;
    while prefix <= RICE_PREFIX_BINS {
        if coder.bypass(u8::from((value >> rice) > prefix))? == 0 {
            break;
        }
        prefix += 1;
    }

    if prefix <= RICE_PREFIX_BINS {
        let suffix = coder.bypass_bits(value & ((1 << rice) - 1), rice)?;
        return Ok((prefix << rice) + suffix);
    }

    if coding.limited_prefix {
        return code_limited_escape(coder, value, rice, coding.log2_range);
    }
    let escape = code_exp_golomb(coder, value.saturating_sub(4 << rice), rice + 1)?;
    match (4u32 << rice).checked_add(escape) {
        Some(v) => Ok(v),
        None => Err(coder.invalid("coefficient level exceeds the coefficient range")),
    }
}

/// Escape of a remaining level once four prefix ones are coded, with the
/// prefix length bounded by `log2_range` (H.265 9.3.3.12). The longest
/// prefix carries no terminating zero and a `log2_range`-bit suffix.
fn code_limited_escape<C: BinCoder>(coder: &mut C, value: u32, rice: u8, log2_range: u8) -> Result<u32, C::Error> {
    let max_prefix = 32 - (RICE_PREFIX_BINS + u32::from(log2_range));
    // codeValue of the escape, at least 1 here
    let code_value = (value >> rice).saturating_sub(RICE_PREFIX_BINS);
    let want_prefix = if code_value >= (1 << max_prefix) - 1 {
        max_prefix
    } else {
        let mut n = 1;
        while code_value > (2 << n) - 2 {
            n += 1;
        }
        n
    };

    // One prefix one is already coded by the Rice part
    let mut prefix = 1;
    while prefix < max_prefix {
        if coder.bypass(u8::from(want_prefix > prefix))? == 0 {
            break;
        }
        prefix += 1;
    }

    let suffix_len = if prefix == max_prefix {
        u32::from(log2_range)
    } else {
        prefix + u32::from(rice)
    };
    let offset = ((1u32 << prefix) - 1 + RICE_PREFIX_BINS) << rice;
    let suffix = coder.bypass_bits(value.wrapping_sub(offset), suffix_len as u8)?;
    match offset.checked_add(suffix) {
        Some(v) => Ok(v),
        None => Err(coder.invalid("coefficient level exceeds the coefficient range")),
    }
}

/// k-th order Exp-Golomb with bypass bins (H.265 9.3.3.3)
pub fn code_exp_golomb<C: BinCoder>(coder: &mut C, value: u32, k: u8) -> Result<u32, C::Error> {
    let mut order = u32::from(k);
    let mut rest = value;
    let mut base = 0u32;
    loop {
        if coder.bypass(u8::from(rest >= 1 << order))? == 0 {
            break;
        }
        rest = rest.saturating_sub(1 << order);
        base += 1 << order;
        order += 1;
        if order - u32::from(k) > MAX_ESCAPE_PREFIX || order >= 32 {
            return Err(coder.invalid("exp-golomb escape prefix too long"));
        }
    }
    let suffix = coder.bypass_bits(rest, order as u8)?;
    Ok(base + suffix)
}

/// Code the start of residual_coding(): transform_skip_flag (when present)
/// and the last significant position. Returns the scan that codes the
/// block's groups; its [`transform_skip`](ResidualScan::transform_skip) holds
/// the coded flag.
pub fn begin_residual<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    block: &TransformBlock,
) -> Result<ResidualScan, C::Error> {
    let transform_skip = if config.transform_skip_enabled
        && !block.transquant_bypass
        && block.log2_size == 2
    {
        let ctx = ContextSet::TransformSkipFlag.at(usize::from(!block.component.is_luma()));
        coder.regular(bank.model_mut(ctx), u8::from(block.transform_skip))? == 1
    } else {
        assert!(
            !block.transform_skip,
            "configuration mismatch: transform_skip_flag is not coded for this block"
        );
        false
    };

    let last = if C::DECODING {
        (0, 0)
    } else {
        match block.last_significant() {
            Some(last) => last,
            None => panic!("configuration mismatch: residual coded for an all-zero block"),
        }
    };

    let mut scan = ResidualScan::for_block(config, block);
    scan.transform_skip = transform_skip;
    scan.code_last_position(coder, bank, last)?;
    Ok(scan)
}

/// Code a whole residual_coding() syntax structure. When decoding, `block`
/// must start all-zero and receives the coefficients and transform_skip_flag.
pub fn code_residual<C: BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    config: &CodingConfig,
    block: &mut TransformBlock,
) -> Result<(), C::Error> {
    let mut scan = begin_residual(coder, bank, config, block)?;
    block.transform_skip = scan.transform_skip();
    while let Some(i) = scan.next_sub_block() {
        let mut group = block.group(i);
        scan.code_group(coder, bank, &mut group)?;
        if C::DECODING {
            block.set_group(&group);
        }
    }
    Ok(())
}
