//! Context index selection (H.265 9.3.4.2)
//!
//! Pure functions from syntax-element position and neighbour state to the
//! context increment within the element's [`ContextSet`](super::context::ContextSet).

use super::residual::ScanOrder;

/// Colour component of a transform block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Luma (Y)
    Luma,
    /// Blue-difference chroma
    Cb,
    /// Red-difference chroma
    Cr,
}

impl Component {
    /// cIdx as used in the syntax tables
    pub fn index(self) -> usize {
        match self {
            Component::Luma => 0,
            Component::Cb => 1,
            Component::Cr => 2,
        }
    }

    /// Check if this is the luma component
    pub fn is_luma(self) -> bool {
        self == Component::Luma
    }
}

/// What the context rules need to know about an already coded neighbouring CU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborCu {
    /// Coding quadtree depth of the neighbour
    pub depth: u8,
    /// cu_skip_flag of the neighbour
    pub skip: bool,
}

/// split_cu_flag: one for each available neighbour coded deeper than `depth`
pub fn split_cu_flag_ctx(depth: u8, left: Option<NeighborCu>, above: Option<NeighborCu>) -> usize {
    let cond = |n: Option<NeighborCu>| usize::from(n.is_some_and(|n| n.depth > depth));
    cond(left) + cond(above)
}

/// cu_skip_flag: one for each available skipped neighbour
pub fn cu_skip_flag_ctx(left: Option<NeighborCu>, above: Option<NeighborCu>) -> usize {
    let cond = |n: Option<NeighborCu>| usize::from(n.is_some_and(|n| n.skip));
    cond(left) + cond(above)
}

/// split_transform_flag: 5 - log2TrafoSize
pub fn split_transform_flag_ctx(log2_trafo_size: u8) -> usize {
    debug_assert!((3..=5).contains(&log2_trafo_size));
    usize::from(5 - log2_trafo_size)
}

/// cbf_luma: 1 at the root of the transform tree, 0 below it
pub fn cbf_luma_ctx(trafo_depth: u8) -> usize {
    usize::from(trafo_depth == 0)
}

/// cbf_cb / cbf_cr: the transform depth
pub fn cbf_chroma_ctx(trafo_depth: u8) -> usize {
    debug_assert!(trafo_depth < 5);
    usize::from(trafo_depth)
}

/// iv_res_pred_weight_idx first bin: 1 when the left PU uses a non-zero weight
pub fn iv_res_pred_weight_ctx(left_weight_nonzero: bool) -> usize {
    usize::from(left_weight_nonzero)
}

/// last_sig_coeff_{x,y}_prefix: (ctxOffset, ctxShift) for the block;
/// bin `i` of the prefix uses `ctxOffset + (i >> ctxShift)`
pub fn last_sig_coeff_prefix_ctx(component: Component, log2_size: u8) -> (usize, u8) {
    if component.is_luma() {
        let offset = 3 * usize::from(log2_size - 2) + usize::from((log2_size - 1) >> 2);
        (offset, (log2_size + 1) >> 2)
    } else {
        (15, log2_size - 2)
    }
}

/// coded_sub_block_flag from the right and below sub-blocks
pub fn coded_sub_block_flag_ctx(component: Component, right: bool, below: bool) -> usize {
    let csbf = usize::from(right || below);
    if component.is_luma() { csbf } else { csbf + 2 }
}

/// ctxIdxMap for 4x4 transform blocks, indexed by (yC << 2) + xC
static CTX_IDX_MAP: [u8; 16] = [0, 1, 4, 5, 2, 3, 4, 5, 6, 6, 8, 8, 7, 7, 8, 8];

/// sig_coeff_flag at block position (`x_c`, `y_c`)
///
/// `prev_csbf` is `right | (below << 1)` of the coded_sub_block_flags next
/// to the containing sub-block.
pub fn sig_coeff_flag_ctx(
    component: Component,
    log2_size: u8,
    scan: ScanOrder,
    x_c: u32,
    y_c: u32,
    prev_csbf: u8,
) -> usize {
    let sig_ctx = if log2_size == 2 {
        usize::from(CTX_IDX_MAP[((y_c << 2) + x_c) as usize])
    } else if x_c + y_c == 0 {
        0
    } else {
        let (x_p, y_p) = (x_c & 3, y_c & 3);
        let mut sig_ctx = match prev_csbf {
            0 => match x_p + y_p {
                0 => 2,
                1 | 2 => 1,
                _ => 0,
            },
            1 => match y_p {
                0 => 2,
                1 => 1,
                _ => 0,
            },
            2 => match x_p {
                0 => 2,
                1 => 1,
                _ => 0,
            },
            _ => 2,
        };

        let (x_s, y_s) = (x_c >> 2, y_c >> 2);
        if component.is_luma() {
            if x_s + y_s > 0 {
                sig_ctx += 3;
            }
            if log2_size == 3 {
                sig_ctx += if scan == ScanOrder::Diagonal { 9 } else { 15 };
            } else {
                sig_ctx += 21;
            }
        } else if log2_size == 3 {
            sig_ctx += 9;
        } else {
            sig_ctx += 12;
        }
        sig_ctx
    };

    if component.is_luma() { sig_ctx } else { sig_ctx + 27 }
}

/// Per-transform-block state of the coeff_abs_level_greater1_flag contexts
///
/// `greater1Ctx` restarts at 1 in each sub-block; the context set of a
/// sub-block depends on whether the previous coded greater1 flag of the
/// block was reached with `greater1Ctx == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Greater1Ctx {
    ctx_set: usize,
    greater1_ctx: u8,
    chroma: bool,
}

impl Greater1Ctx {
    /// State before the first sub-block of a transform block
    pub fn new(component: Component) -> Self {
        Self {
            ctx_set: 0,
            greater1_ctx: 1,
            chroma: !component.is_luma(),
        }
    }

    /// Enter a sub-block that has at least one significant coefficient
    pub fn start_sub_block(&mut self, sub_block: usize) {
        self.ctx_set = if sub_block > 0 && !self.chroma { 2 } else { 0 };
        if self.greater1_ctx == 0 {
            self.ctx_set += 1;
        }
        self.greater1_ctx = 1;
    }

    /// Context increment for the next greater1 flag
    pub fn greater1_ctx(&self) -> usize {
        let inc = self.ctx_set * 4 + usize::from(self.greater1_ctx.min(3));
        if self.chroma { inc + 16 } else { inc }
    }

    /// Advance after a greater1 flag
    pub fn update(&mut self, greater1: bool) {
        if greater1 {
            self.greater1_ctx = 0;
        } else if self.greater1_ctx > 0 && self.greater1_ctx < 3 {
            self.greater1_ctx += 1;
        }
    }

    /// Context increment for the sub-block's greater2 flag
    pub fn greater2_ctx(&self) -> usize {
        if self.chroma { self.ctx_set + 4 } else { self.ctx_set }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cu_flag_ctx() {
        let deep = Some(NeighborCu { depth: 2, skip: false });
        let shallow = Some(NeighborCu { depth: 1, skip: true });
        assert_eq!(split_cu_flag_ctx(1, None, None), 0);
        assert_eq!(split_cu_flag_ctx(1, deep, None), 1);
        assert_eq!(split_cu_flag_ctx(1, deep, deep), 2);
        assert_eq!(split_cu_flag_ctx(1, shallow, deep), 1);
        assert_eq!(cu_skip_flag_ctx(shallow, shallow), 2);
        assert_eq!(cu_skip_flag_ctx(deep, None), 0);
    }

    #[test]
    fn test_last_prefix_ctx() {
        assert_eq!(last_sig_coeff_prefix_ctx(Component::Luma, 2), (0, 0));
        assert_eq!(last_sig_coeff_prefix_ctx(Component::Luma, 3), (3, 1));
        assert_eq!(last_sig_coeff_prefix_ctx(Component::Luma, 4), (6, 1));
        assert_eq!(last_sig_coeff_prefix_ctx(Component::Luma, 5), (10, 1));
        assert_eq!(last_sig_coeff_prefix_ctx(Component::Cb, 2), (15, 0));
        assert_eq!(last_sig_coeff_prefix_ctx(Component::Cr, 4), (15, 2));
    }

    #[test]
    fn test_sig_ctx_ranges() {
        for log2 in 2..=5u8 {
            let size = 1u32 << log2;
            for scan in [ScanOrder::Diagonal, ScanOrder::Horizontal, ScanOrder::Vertical] {
                for prev in 0..4 {
                    for y in 0..size {
                        for x in 0..size {
                            let l = sig_coeff_flag_ctx(Component::Luma, log2, scan, x, y, prev);
                            let c = sig_coeff_flag_ctx(Component::Cb, log2, scan, x, y, prev);
                            assert!(l < 27, "luma {l}");
                            assert!((27..42).contains(&c), "chroma {c}");
                        }
                    }
                }
            }
        }
        // DC of larger blocks always uses context 0
        assert_eq!(sig_coeff_flag_ctx(Component::Luma, 4, ScanOrder::Diagonal, 0, 0, 3), 0);
        assert_eq!(sig_coeff_flag_ctx(Component::Cr, 3, ScanOrder::Diagonal, 0, 0, 1), 27);
        // 8x8 luma, first sub-block, diagonal, no coded neighbours
        assert_eq!(sig_coeff_flag_ctx(Component::Luma, 3, ScanOrder::Diagonal, 1, 0, 0), 10);
        assert_eq!(sig_coeff_flag_ctx(Component::Luma, 3, ScanOrder::Horizontal, 1, 0, 0), 16);
        // 16x16 luma, second sub-block, both neighbours coded
        assert_eq!(sig_coeff_flag_ctx(Component::Luma, 4, ScanOrder::Diagonal, 6, 1, 3), 26);
    }

    #[test]
    fn test_greater1_state_machine() {
        let mut g = Greater1Ctx::new(Component::Luma);
        g.start_sub_block(1);
        assert_eq!(g.greater1_ctx(), 9);
        g.update(false);
        assert_eq!(g.greater1_ctx(), 10);
        g.update(false);
        g.update(false);
        assert_eq!(g.greater1_ctx(), 11);
        g.update(true);
        assert_eq!(g.greater1_ctx(), 8);
        g.update(false);
        assert_eq!(g.greater1_ctx(), 8);
        assert_eq!(g.greater2_ctx(), 2);

        // Previous sub-block ended with greater1Ctx == 0
        g.start_sub_block(0);
        assert_eq!(g.greater1_ctx(), 5);
        assert_eq!(g.greater2_ctx(), 1);

        let mut c = Greater1Ctx::new(Component::Cb);
        c.start_sub_block(3);
        assert_eq!(c.greater1_ctx(), 17);
        assert_eq!(c.greater2_ctx(), 4);
    }
}
