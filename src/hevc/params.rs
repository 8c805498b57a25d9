//! Slice and sequence parameters consumed by the entropy coder
//!
//! These are the few SPS/PPS/slice-header values that change how bins are
//! produced. They are read-only for the lifetime of a segment.

use super::ctx_select::Component;

/// Slice type (H.265 Table 7-7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    /// B slice (bi-predictive)
    B = 0,
    /// P slice (predictive)
    P = 1,
    /// I slice (intra only)
    I = 2,
}

impl SliceType {
    /// Parse from slice_type value
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(SliceType::B),
            1 => Some(SliceType::P),
            2 => Some(SliceType::I),
            _ => None,
        }
    }

    /// Check if this is an intra slice
    pub fn is_intra(self) -> bool {
        self == SliceType::I
    }
}

/// Slice-level inputs to context initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceParams {
    /// Slice type
    pub slice_type: SliceType,
    /// SliceQpY; clipped to 0..=51 during initialization
    pub slice_qp: i32,
    /// cabac_init_flag: swaps the P and B init tables
    pub cabac_init_flag: bool,
}

impl SliceParams {
    /// Parameters for a slice without `cabac_init_flag`
    pub fn new(slice_type: SliceType, slice_qp: i32) -> Self {
        Self {
            slice_type,
            slice_qp,
            cabac_init_flag: false,
        }
    }

    /// Set cabac_init_flag
    pub fn with_cabac_init_flag(mut self, flag: bool) -> Self {
        self.cabac_init_flag = flag;
        self
    }

    /// initType (H.265 9.3.2.2, eq. 9-7)
    pub fn init_type(&self) -> usize {
        match (self.slice_type, self.cabac_init_flag) {
            (SliceType::I, _) => 0,
            (SliceType::P, false) | (SliceType::B, true) => 1,
            (SliceType::P, true) | (SliceType::B, false) => 2,
        }
    }
}

/// Sequence and picture level switches that select binarization paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingConfig {
    /// Picture width in luma samples
    pub pic_width: u32,
    /// Picture height in luma samples
    pub pic_height: u32,
    /// log2 of the coding tree block size
    pub log2_ctb_size: u8,
    /// log2 of the minimum coding block size
    pub log2_min_cb_size: u8,
    /// sign_data_hiding_enabled_flag (PPS)
    pub sign_data_hiding_enabled: bool,
    /// transform_skip_enabled_flag (PPS)
    pub transform_skip_enabled: bool,
    /// transquant_bypass_enabled_flag (PPS)
    pub transquant_bypass_enabled: bool,
    /// amp_enabled_flag (SPS)
    pub amp_enabled: bool,
    /// MaxNumMergeCand (1-5)
    pub max_num_merge_cand: u8,
    /// entropy_coding_sync_enabled_flag (PPS)
    pub entropy_coding_sync_enabled: bool,
    /// Multi-view extension syntax (ic_flag, iv_res_pred_weight_idx)
    pub multi_view: bool,
    /// BitDepthY; bounds the luma SAO offsets and coefficient range
    pub bit_depth: u8,
    /// BitDepthC; bounds the chroma SAO offsets and coefficient range
    pub bit_depth_chroma: u8,
    /// slice_sao_luma_flag
    pub sao_luma_enabled: bool,
    /// slice_sao_chroma_flag
    pub sao_chroma_enabled: bool,
    /// cu_qp_delta_enabled_flag (PPS)
    pub cu_qp_delta_enabled: bool,
    /// pcm_enabled_flag (SPS)
    pub pcm_enabled: bool,
    /// extended_precision_processing_flag (SPS range extension)
    pub extended_precision_processing: bool,
    /// persistent_rice_adaptation_enabled_flag (SPS range extension)
    pub persistent_rice_adaptation: bool,
    /// cabac_bypass_alignment_enabled_flag (SPS range extension)
    pub cabac_bypass_alignment: bool,
}

impl Default for CodingConfig {
    fn default() -> Self {
        Self {
            pic_width: 1920,
            pic_height: 1080,
            log2_ctb_size: 6,
            log2_min_cb_size: 3,
            sign_data_hiding_enabled: false,
            transform_skip_enabled: false,
            transquant_bypass_enabled: false,
            amp_enabled: false,
            max_num_merge_cand: 5,
            entropy_coding_sync_enabled: false,
            multi_view: false,
            bit_depth: 8,
            bit_depth_chroma: 8,
            sao_luma_enabled: false,
            sao_chroma_enabled: false,
            cu_qp_delta_enabled: false,
            pcm_enabled: false,
            extended_precision_processing: false,
            persistent_rice_adaptation: false,
            cabac_bypass_alignment: false,
        }
    }
}

impl CodingConfig {
    /// Configuration for a picture of the given size with default tools
    pub fn new(pic_width: u32, pic_height: u32) -> Self {
        Self {
            pic_width,
            pic_height,
            ..Self::default()
        }
    }

    /// Set the CTB and minimum CB sizes (log2)
    pub fn with_block_sizes(mut self, log2_ctb_size: u8, log2_min_cb_size: u8) -> Self {
        assert!(
            (3..=6).contains(&log2_min_cb_size) && log2_min_cb_size <= log2_ctb_size,
            "configuration mismatch: invalid block sizes {log2_ctb_size}/{log2_min_cb_size}"
        );
        self.log2_ctb_size = log2_ctb_size;
        self.log2_min_cb_size = log2_min_cb_size;
        self
    }

    /// Enable or disable sign data hiding
    pub fn with_sign_data_hiding(mut self, enabled: bool) -> Self {
        self.sign_data_hiding_enabled = enabled;
        self
    }

    /// Enable or disable transform skip
    pub fn with_transform_skip(mut self, enabled: bool) -> Self {
        self.transform_skip_enabled = enabled;
        self
    }

    /// Enable or disable cu_transquant_bypass_flag
    pub fn with_transquant_bypass(mut self, enabled: bool) -> Self {
        self.transquant_bypass_enabled = enabled;
        self
    }

    /// Enable or disable asymmetric motion partitions
    pub fn with_amp(mut self, enabled: bool) -> Self {
        self.amp_enabled = enabled;
        self
    }

    /// Set MaxNumMergeCand
    pub fn with_max_num_merge_cand(mut self, n: u8) -> Self {
        assert!(
            (1..=5).contains(&n),
            "configuration mismatch: MaxNumMergeCand {n} outside 1..=5"
        );
        self.max_num_merge_cand = n;
        self
    }

    /// Enable or disable wavefront parallel processing
    pub fn with_entropy_coding_sync(mut self, enabled: bool) -> Self {
        self.entropy_coding_sync_enabled = enabled;
        self
    }

    /// Enable multi-view extension syntax
    pub fn with_multi_view(mut self, enabled: bool) -> Self {
        self.multi_view = enabled;
        self
    }

    /// Set the sample bit depth of every component
    pub fn with_bit_depth(self, bit_depth: u8) -> Self {
        self.with_bit_depths(bit_depth, bit_depth)
    }

    /// Set separate luma and chroma sample bit depths
    pub fn with_bit_depths(mut self, luma: u8, chroma: u8) -> Self {
        for depth in [luma, chroma] {
            assert!((8..=16).contains(&depth), "configuration mismatch: bit depth {depth}");
        }
        self.bit_depth = luma;
        self.bit_depth_chroma = chroma;
        self
    }

    /// Enable extended_precision_processing_flag
    pub fn with_extended_precision(mut self, enabled: bool) -> Self {
        self.extended_precision_processing = enabled;
        self
    }

    /// Enable persistent_rice_adaptation_enabled_flag
    pub fn with_persistent_rice_adaptation(mut self, enabled: bool) -> Self {
        self.persistent_rice_adaptation = enabled;
        self
    }

    /// Enable cabac_bypass_alignment_enabled_flag
    pub fn with_cabac_bypass_alignment(mut self, enabled: bool) -> Self {
        self.cabac_bypass_alignment = enabled;
        self
    }

    /// Sample bit depth of a component
    pub fn component_bit_depth(&self, component: Component) -> u8 {
        if component.is_luma() { self.bit_depth } else { self.bit_depth_chroma }
    }

    /// log2 of the coefficient range of a component (CoeffMinY/C =
    /// -(1 << n)); 15 unless extended precision widens it with the bit depth
    pub fn log2_transform_range(&self, component: Component) -> u8 {
        if self.extended_precision_processing {
            15.max(self.component_bit_depth(component) + 6)
        } else {
            15
        }
    }

    /// Enable SAO syntax for luma and/or chroma
    pub fn with_sao(mut self, luma: bool, chroma: bool) -> Self {
        self.sao_luma_enabled = luma;
        self.sao_chroma_enabled = chroma;
        self
    }

    /// Enable or disable cu_qp_delta_abs
    pub fn with_cu_qp_delta(mut self, enabled: bool) -> Self {
        self.cu_qp_delta_enabled = enabled;
        self
    }

    /// Enable or disable PCM coding units
    pub fn with_pcm(mut self, enabled: bool) -> Self {
        self.pcm_enabled = enabled;
        self
    }

    /// CTB size in luma samples
    pub fn ctb_size(&self) -> u32 {
        1 << self.log2_ctb_size
    }

    /// Picture width in CTBs
    pub fn pic_width_in_ctbs(&self) -> u32 {
        self.pic_width.div_ceil(self.ctb_size())
    }

    /// Picture height in CTBs
    pub fn pic_height_in_ctbs(&self) -> u32 {
        self.pic_height.div_ceil(self.ctb_size())
    }
}
