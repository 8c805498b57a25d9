//! HEVC/H.265 entropy coding
//!
//! The CABAC engine ([`cabac`]), its context models ([`context`],
//! [`ctx_select`]) and the binarizations built on them: coefficient coding
//! ([`residual`]), coding-tree syntax ([`ctu`]) and SAO parameters ([`sao`]).
//! [`segment`] ties one coder and one bank together for a slice segment and
//! [`wavefront`] runs CTU rows in parallel.

pub mod bitstream;
pub mod cabac;
pub mod context;
pub mod ctu;
pub mod ctx_select;
pub mod params;
pub mod residual;
pub mod sao;
pub mod segment;
#[cfg(feature = "std")]
pub mod wavefront;

pub use cabac::{BinCoder, CabacDecoder, CabacEncoder};
pub use context::{ContextBank, ContextModel, ContextSet, ContextSnapshot, CtxIdx};
pub use ctu::{CodingTreeNode, CtDepthMap, PartMode, PredMode};
pub use ctx_select::Component;
pub use params::{CodingConfig, SliceParams, SliceType};
pub use residual::{CoefficientGroup, ScanOrder, TransformBlock};
pub use segment::{Checkpoint, SegmentDecoder, SegmentEncoder};
