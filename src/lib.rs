//! Bit-exact HEVC CABAC entropy coding
//!
//! This crate provides the context-adaptive binary arithmetic coder of
//! H.265 in both directions, the context model bank with its slice
//! initialisation, and the binarizations of residual and coding-tree syntax
//! built on top of it. Encoder and decoder share one implementation of every
//! binarization, so a stream produced here decodes to the same symbols and
//! the same final context state.
//!
//! # Example
//!
//! ```
//! use hevc_cabac::{CodingConfig, Component, ScanOrder, SegmentDecoder, SegmentEncoder};
//! use hevc_cabac::{SliceParams, SliceType, TransformBlock};
//!
//! let params = SliceParams::new(SliceType::I, 32);
//! let config = CodingConfig::new(64, 64);
//!
//! let mut block = TransformBlock::new(3, Component::Luma, ScanOrder::Diagonal);
//! block.set(0, 0, 5);
//! block.set(2, 1, -1);
//!
//! let mut enc = SegmentEncoder::new(params, config.clone());
//! enc.encode_cbf(Component::Luma, 0, true);
//! enc.encode_residual(&block);
//! let bytes = enc.finish();
//!
//! let mut dec = SegmentDecoder::new(&bytes, params, config)?;
//! assert!(dec.decode_cbf(Component::Luma, 0)?);
//! let decoded = dec.decode_residual(TransformBlock::new(3, Component::Luma, ScanOrder::Diagonal))?;
//! assert_eq!(decoded, block);
//! assert_eq!(dec.finish()?, bytes.len());
//! # Ok::<(), hevc_cabac::CabacError>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

mod error;
pub mod hevc;

pub use error::{CabacError, Result};
pub use hevc::{
    BinCoder, CabacDecoder, CabacEncoder, Checkpoint, CodingConfig, CoefficientGroup, Component,
    ContextBank, ContextSet, ContextSnapshot, ScanOrder, SegmentDecoder, SegmentEncoder, SliceParams,
    SliceType, TransformBlock,
};
