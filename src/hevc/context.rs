//! Context model bank
//!
//! Every context-coded syntax element owns a contiguous range of adaptive
//! probability models. [`ContextSet`] names those ranges and carries their
//! initialization values (H.265 Tables 9-5 to 9-37); the ranges are laid out
//! back to back in one flat index space of [`NUM_CONTEXTS`] models.

use super::params::SliceParams;

/// State transition after coding the most probable symbol (H.265 Table 9-46)
static STATE_TRANS_MPS: [u8; 64] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50,
    51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

/// State transition after coding the least probable symbol (H.265 Table 9-46)
static STATE_TRANS_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12, 13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21,
    21, 22, 22, 23, 24, 24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33, 33, 33, 34,
    34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

/// One adaptive probability model: a 6-bit state and the most probable symbol,
/// packed as `(state << 1) | mps`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContextModel(u8);

impl ContextModel {
    /// Build a model from an explicit state (0-63) and MPS (0 or 1)
    pub const fn new(state: u8, mps: u8) -> Self {
        assert!(state < 64 && mps < 2, "context state out of range");
        Self((state << 1) | mps)
    }

    /// Derive the initial model from an 8-bit init value and the slice QP
    /// (H.265 9.3.2.2)
    pub const fn from_init_value(init_value: u8, slice_qp: i32) -> Self {
        let slope = (init_value >> 4) as i32 * 5 - 45;
        let offset = ((init_value & 15) << 3) as i32 - 16;
        let qp = if slice_qp < 0 {
            0
        } else if slice_qp > 51 {
            51
        } else {
            slice_qp
        };

        let mut pre = ((slope * qp) >> 4) + offset;
        if pre < 1 {
            pre = 1;
        } else if pre > 126 {
            pre = 126;
        }

        if pre >= 64 {
            Self::new((pre - 64) as u8, 1)
        } else {
            Self::new((63 - pre) as u8, 0)
        }
    }

    /// Probability state index (0-63)
    #[inline]
    pub const fn state(self) -> u8 {
        self.0 >> 1
    }

    /// Most probable symbol
    #[inline]
    pub const fn mps(self) -> u8 {
        self.0 & 1
    }

    /// Advance after an MPS bin
    #[inline]
    pub fn update_mps(&mut self) {
        let state = STATE_TRANS_MPS[self.state() as usize];
        self.0 = (state << 1) | self.mps();
    }

    /// Advance after an LPS bin; the MPS flips when leaving state 0
    #[inline]
    pub fn update_lps(&mut self) {
        let mps = if self.state() == 0 { 1 - self.mps() } else { self.mps() };
        let state = STATE_TRANS_LPS[self.state() as usize];
        self.0 = (state << 1) | mps;
    }
}

impl core::fmt::Debug for ContextModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.state(), self.mps())
    }
}

/// "Context not used" init value
const CNU: u8 = 154;

macro_rules! context_sets {
    ($($(#[$doc:meta])* $name:ident => $table:expr,)*) => {
        /// A syntax element's block of context models
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum ContextSet {
            $($(#[$doc])* $name,)*
        }

        impl ContextSet {
            /// Every set, in flat index order
            pub const ALL: &'static [ContextSet] = &[$(ContextSet::$name,)*];

            /// Init values for init types 0, 1 and 2
            pub const fn init_values(self) -> [&'static [u8]; 3] {
                match self {
                    $(ContextSet::$name => {
                        const TABLE: &[&[u8]; 3] = &$table;
                        *TABLE
                    })*
                }
            }
        }
    };
}

context_sets! {
    /// sao_merge_left_flag / sao_merge_up_flag
    SaoMergeFlag => [&[153], &[153], &[153]],
    /// sao_type_idx_luma / sao_type_idx_chroma, first bin
    SaoTypeIdx => [&[200], &[185], &[160]],
    /// split_cu_flag
    SplitCuFlag => [&[139, 141, 157], &[107, 139, 126], &[107, 139, 126]],
    /// cu_transquant_bypass_flag
    CuTransquantBypassFlag => [&[154], &[154], &[154]],
    /// cu_skip_flag
    CuSkipFlag => [&[CNU, CNU, CNU], &[197, 185, 201], &[197, 185, 201]],
    /// pred_mode_flag
    PredModeFlag => [&[CNU], &[149], &[134]],
    /// part_mode
    PartMode => [&[184, CNU, CNU, CNU], &[154, 139, 154, 154], &[154, 139, 154, 154]],
    /// prev_intra_luma_pred_flag
    PrevIntraLumaPredFlag => [&[184], &[154], &[183]],
    /// intra_chroma_pred_mode, first bin
    IntraChromaPredMode => [&[63], &[152], &[152]],
    /// rqt_root_cbf
    RqtRootCbf => [&[CNU], &[79], &[79]],
    /// merge_flag
    MergeFlag => [&[CNU], &[110], &[154]],
    /// merge_idx, first bin
    MergeIdx => [&[CNU], &[122], &[137]],
    /// inter_pred_idc
    InterPredIdc => [&[CNU; 5], &[95, 79, 63, 31, 31], &[95, 79, 63, 31, 31]],
    /// ref_idx_l0 / ref_idx_l1
    RefIdx => [&[CNU, CNU], &[153, 153], &[153, 153]],
    /// mvp_l0_flag / mvp_l1_flag
    MvpLxFlag => [&[CNU], &[168], &[168]],
    /// split_transform_flag
    SplitTransformFlag => [&[153, 138, 138], &[124, 138, 94], &[224, 167, 122]],
    /// cbf_luma
    CbfLuma => [&[111, 141], &[153, 111], &[153, 111]],
    /// cbf_cb / cbf_cr
    CbfChroma => [
        &[94, 138, 182, 154, 154],
        &[149, 107, 167, 154, 154],
        &[149, 92, 167, 154, 154],
    ],
    /// abs_mvd_greater0_flag
    AbsMvdGreater0 => [&[CNU], &[140], &[169]],
    /// abs_mvd_greater1_flag
    AbsMvdGreater1 => [&[CNU], &[198], &[198]],
    /// cu_qp_delta_abs prefix
    CuQpDeltaAbs => [&[154, 154], &[154, 154], &[154, 154]],
    /// transform_skip_flag (luma, chroma)
    TransformSkipFlag => [&[139, 139], &[139, 139], &[139, 139]],
    /// last_sig_coeff_x_prefix
    LastSigCoeffXPrefix => [
        &[110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127, 111, 79, 108, 123, 63],
        &[125, 110, 94, 110, 95, 79, 125, 111, 110, 78, 110, 111, 111, 95, 94, 108, 123, 108],
        &[125, 110, 124, 110, 95, 94, 125, 111, 111, 79, 125, 126, 111, 111, 79, 108, 123, 93],
    ],
    /// last_sig_coeff_y_prefix
    LastSigCoeffYPrefix => [
        &[110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127, 111, 79, 108, 123, 63],
        &[125, 110, 94, 110, 95, 79, 125, 111, 110, 78, 110, 111, 111, 95, 94, 108, 123, 108],
        &[125, 110, 124, 110, 95, 94, 125, 111, 111, 79, 125, 126, 111, 111, 79, 108, 123, 93],
    ],
    /// coded_sub_block_flag (luma 0-1, chroma 2-3)
    CodedSubBlockFlag => [&[91, 171, 134, 141], &[121, 140, 61, 154], &[121, 140, 61, 154]],
    /// sig_coeff_flag (luma 0-26, chroma 27-41)
    SigCoeffFlag => [
        &[
            111, 111, 125, 110, 110, 94, 124, 108, 124, 107, 125, 141, 179, 153, 125, 107, 125,
            141, 179, 153, 125, 107, 125, 141, 179, 153, 125, 140, 139, 182, 182, 152, 136, 152,
            136, 153, 136, 139, 111, 136, 139, 111,
        ],
        &[
            155, 154, 139, 153, 139, 123, 123, 63, 153, 166, 183, 140, 136, 153, 154, 166, 183,
            140, 136, 153, 154, 166, 183, 140, 136, 153, 154, 170, 153, 123, 123, 107, 121, 107,
            121, 167, 151, 183, 140, 151, 183, 140,
        ],
        &[
            170, 154, 139, 153, 139, 123, 123, 63, 124, 166, 183, 140, 136, 153, 154, 166, 183,
            140, 136, 153, 154, 166, 183, 140, 136, 153, 154, 170, 153, 138, 138, 122, 121, 122,
            121, 167, 151, 183, 140, 151, 183, 140,
        ],
    ],
    /// coeff_abs_level_greater1_flag (luma 0-15, chroma 16-23)
    CoeffAbsLevelGreater1 => [
        &[
            140, 92, 137, 138, 140, 152, 138, 139, 153, 74, 149, 92, 139, 107, 122, 152, 140, 179,
            166, 182, 140, 227, 122, 197,
        ],
        &[
            154, 196, 196, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 137, 169,
            194, 166, 167, 154, 167, 137, 182,
        ],
        &[
            154, 196, 167, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 122, 169,
            208, 166, 167, 154, 152, 167, 182,
        ],
    ],
    /// coeff_abs_level_greater2_flag (luma 0-3, chroma 4-5)
    CoeffAbsLevelGreater2 => [
        &[138, 153, 136, 167, 152, 152],
        &[107, 167, 91, 122, 107, 167],
        &[107, 167, 91, 107, 107, 167],
    ],
    /// ic_flag (multi-view illumination compensation)
    IcFlag => [&[CNU, CNU, CNU], &[197, 185, 201], &[197, 185, 201]],
    /// iv_res_pred_weight_idx (multi-view advanced residual prediction)
    IvResPredWeightIdx => [&[CNU; 4], &[CNU; 4], &[CNU; 4]],
}

impl ContextSet {
    /// Number of models in this set
    pub const fn len(self) -> usize {
        self.init_values()[0].len()
    }

    /// First flat index of this set
    pub const fn offset(self) -> usize {
        let mut offset = 0;
        let mut i = 0;
        while i < self as usize {
            offset += Self::ALL[i].len();
            i += 1;
        }
        offset
    }

    /// Flat index of model `inc` within this set
    ///
    /// Panics when `inc` is outside the set, so a context rule can never
    /// silently touch a neighbouring element's models.
    #[inline]
    pub fn at(self, inc: usize) -> CtxIdx {
        assert!(
            inc < self.len(),
            "context increment {inc} out of range for {self:?}"
        );
        CtxIdx((self.offset() + inc) as u16)
    }

    /// Flat index range covered by this set
    pub fn range(self) -> core::ops::Range<usize> {
        self.offset()..self.offset() + self.len()
    }
}

/// Total number of context models
pub const NUM_CONTEXTS: usize = {
    let mut total = 0;
    let mut i = 0;
    while i < ContextSet::ALL.len() {
        total += ContextSet::ALL[i].len();
        i += 1;
    }
    total
};

/// Index of one model in the flat context space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CtxIdx(u16);

impl CtxIdx {
    /// Flat index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Number of StatCoeff counters kept for persistent Rice adaptation
pub const RICE_STAT_SETS: usize = 4;

/// The per-segment bank of context models
///
/// Besides the models the bank carries the StatCoeff counters of persistent
/// Rice adaptation (H.265 9.3.3.11); they are reset, saved and synchronized
/// together with the models.
#[derive(Clone, PartialEq, Eq)]
pub struct ContextBank {
    models: [ContextModel; NUM_CONTEXTS],
    rice_stats: [u8; RICE_STAT_SETS],
}

/// A saved copy of a whole [`ContextBank`]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ContextSnapshot {
    models: [ContextModel; NUM_CONTEXTS],
    rice_stats: [u8; RICE_STAT_SETS],
}

impl ContextBank {
    /// Create a bank initialized for a slice
    pub fn new(params: &SliceParams) -> Self {
        let mut bank = Self {
            models: [ContextModel::default(); NUM_CONTEXTS],
            rice_stats: [0; RICE_STAT_SETS],
        };
        bank.init_for_slice(params);
        bank
    }

    /// Reset every model from the init tables for the slice's init type and QP
    pub fn init_for_slice(&mut self, params: &SliceParams) {
        let init_type = params.init_type();
        for &set in ContextSet::ALL {
            self.init_set(set, init_type, params.slice_qp);
        }
        self.rice_stats = [0; RICE_STAT_SETS];
        tracing::debug!(
            slice_type = ?params.slice_type,
            qp = params.slice_qp,
            init_type,
            "context bank initialized"
        );
    }

    /// Reset one set from its init table
    pub fn init_set(&mut self, set: ContextSet, init_type: usize, slice_qp: i32) {
        let values = set.init_values()[init_type];
        let base = set.offset();
        for (i, &value) in values.iter().enumerate() {
            self.models[base + i] = ContextModel::from_init_value(value, slice_qp);
        }
    }

    /// Current model at `idx`
    #[inline]
    pub fn model(&self, idx: CtxIdx) -> ContextModel {
        self.models[idx.index()]
    }

    /// Mutable access for the arithmetic coder
    #[inline]
    pub fn model_mut(&mut self, idx: CtxIdx) -> &mut ContextModel {
        &mut self.models[idx.index()]
    }

    /// Overwrite the model at `idx`
    pub fn set_model(&mut self, idx: CtxIdx, model: ContextModel) {
        self.models[idx.index()] = model;
    }

    /// Models of one set
    pub fn set_models(&self, set: ContextSet) -> &[ContextModel] {
        &self.models[set.range()]
    }

    /// Apply the MPS transition to the model at `idx`
    pub fn update_mps(&mut self, idx: CtxIdx) {
        self.models[idx.index()].update_mps();
    }

    /// Apply the LPS transition to the model at `idx`
    pub fn update_lps(&mut self, idx: CtxIdx) {
        self.models[idx.index()].update_lps();
    }

    /// StatCoeff counter of a Rice statistics class (sbType 0-3)
    pub fn rice_stat(&self, sb_type: usize) -> u8 {
        self.rice_stats[sb_type]
    }

    /// Mutable StatCoeff counter of a Rice statistics class
    pub fn rice_stat_mut(&mut self, sb_type: usize) -> &mut u8 {
        &mut self.rice_stats[sb_type]
    }

    /// Take a snapshot of every model and the Rice statistics
    pub fn save(&self) -> ContextSnapshot {
        ContextSnapshot {
            models: self.models,
            rice_stats: self.rice_stats,
        }
    }

    /// Return every model and the Rice statistics to a previously saved state
    pub fn restore(&mut self, snapshot: &ContextSnapshot) {
        self.models = snapshot.models;
        self.rice_stats = snapshot.rice_stats;
    }

    /// Copy the Rice statistics from `snapshot`
    pub fn merge_rice_stats(&mut self, snapshot: &ContextSnapshot) {
        self.rice_stats = snapshot.rice_stats;
    }

    /// Copy the listed sets from `snapshot`, leaving the rest untouched.
    /// The Rice statistics are not part of any set.
    pub fn merge_from(&mut self, snapshot: &ContextSnapshot, sets: &[ContextSet]) {
        for &set in sets {
            self.merge_set(set, snapshot);
        }
    }

    /// Copy one set from `snapshot`
    pub fn merge_set(&mut self, set: ContextSet, snapshot: &ContextSnapshot) {
        let range = set.range();
        self.models[range.clone()].copy_from_slice(&snapshot.models[range]);
    }
}

impl ContextSnapshot {
    /// Model at `idx` in the snapshot
    pub fn model(&self, idx: CtxIdx) -> ContextModel {
        self.models[idx.index()]
    }

    /// Models of one set in the snapshot
    pub fn set_models(&self, set: ContextSet) -> &[ContextModel] {
        &self.models[set.range()]
    }

    /// StatCoeff counter of a Rice statistics class in the snapshot
    pub fn rice_stat(&self, sb_type: usize) -> u8 {
        self.rice_stats[sb_type]
    }
}

impl core::fmt::Debug for ContextBank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(ContextSet::ALL.iter().map(|&set| (set, self.set_models(set))))
            .entry(&"rice_stats", &self.rice_stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hevc::params::SliceType;

    #[test]
    fn test_layout_is_contiguous() {
        let mut expected = 0;
        for &set in ContextSet::ALL {
            assert_eq!(set.offset(), expected, "{set:?}");
            let [i, p, b] = set.init_values();
            assert_eq!(i.len(), p.len());
            assert_eq!(i.len(), b.len());
            expected += set.len();
        }
        assert_eq!(expected, NUM_CONTEXTS);
        assert_eq!(ContextSet::SplitCuFlag.len(), 3);
        assert_eq!(ContextSet::SigCoeffFlag.len(), 42);
        assert_eq!(ContextSet::CoeffAbsLevelGreater1.len(), 24);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_increment_checked() {
        let _ = ContextSet::SplitCuFlag.at(3);
    }

    #[test]
    fn test_init_value_derivation() {
        // 154: slope 0, offset 64 at every QP
        for qp in [0, 22, 26, 37, 51] {
            let m = ContextModel::from_init_value(154, qp);
            assert_eq!((m.state(), m.mps()), (0, 1));
        }
        // 139 at QP 32: slope -5, offset 72, pre = (-160 >> 4) + 72 = 62
        let m = ContextModel::from_init_value(139, 32);
        assert_eq!((m.state(), m.mps()), (1, 0));
        // 227 at QP 40: slope 25, offset 8, pre = (1000 >> 4) + 8 = 70
        let m = ContextModel::from_init_value(227, 40);
        assert_eq!((m.state(), m.mps()), (6, 1));
        // QP is clipped to 0..=51
        assert_eq!(
            ContextModel::from_init_value(63, -10),
            ContextModel::from_init_value(63, 0)
        );
        assert_eq!(
            ContextModel::from_init_value(227, 70),
            ContextModel::from_init_value(227, 51)
        );
    }

    #[test]
    fn test_lps_at_state_zero_flips_mps() {
        let mut m = ContextModel::new(0, 0);
        m.update_lps();
        assert_eq!((m.state(), m.mps()), (0, 1));
        m.update_lps();
        assert_eq!((m.state(), m.mps()), (0, 0));
    }

    #[test]
    fn test_state_63_is_absorbing() {
        let mut m = ContextModel::new(63, 1);
        m.update_mps();
        assert_eq!((m.state(), m.mps()), (63, 1));
        m.update_lps();
        assert_eq!((m.state(), m.mps()), (63, 1));

        let mut m = ContextModel::new(62, 0);
        for _ in 0..10 {
            m.update_mps();
        }
        assert_eq!((m.state(), m.mps()), (62, 0));
    }

    #[test]
    fn test_merge_set_only_touches_set() {
        let params = SliceParams::new(SliceType::P, 30);
        let mut a = ContextBank::new(&params);
        let mut b = a.clone();
        for _ in 0..5 {
            b.update_lps(ContextSet::SplitCuFlag.at(0));
            b.update_mps(ContextSet::CbfLuma.at(1));
        }
        let snap = b.save();
        a.merge_set(ContextSet::SplitCuFlag, &snap);
        assert_eq!(a.set_models(ContextSet::SplitCuFlag), b.set_models(ContextSet::SplitCuFlag));
        assert_ne!(a.set_models(ContextSet::CbfLuma), b.set_models(ContextSet::CbfLuma));

        a.merge_from(&snap, ContextSet::ALL);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rice_stats_follow_save_and_init() {
        let params = SliceParams::new(SliceType::B, 33);
        let mut bank = ContextBank::new(&params);
        *bank.rice_stat_mut(2) = 9;
        let snap = bank.save();
        assert_eq!(snap.rice_stat(2), 9);

        let mut other = ContextBank::new(&params);
        other.merge_from(&snap, ContextSet::ALL);
        assert_eq!(other.rice_stat(2), 0);
        other.merge_rice_stats(&snap);
        assert_eq!(other, bank);

        *bank.rice_stat_mut(2) = 3;
        bank.restore(&snap);
        assert_eq!(bank.rice_stat(2), 9);
        bank.init_for_slice(&params);
        assert_eq!(bank.rice_stat(2), 0);
    }

    #[test]
    fn test_init_type_changes_models() {
        let i = ContextBank::new(&SliceParams::new(SliceType::I, 32));
        let p = ContextBank::new(&SliceParams::new(SliceType::P, 32));
        let b = ContextBank::new(&SliceParams::new(SliceType::B, 32).with_cabac_init_flag(true));
        assert_ne!(i.set_models(ContextSet::SplitCuFlag), p.set_models(ContextSet::SplitCuFlag));
        // cabac_init_flag swaps the P and B tables
        assert_eq!(b.save(), p.save());
    }
}
