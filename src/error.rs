//! Error types for CABAC coding

use core::fmt;

/// Result type for CABAC operations
pub type Result<T> = core::result::Result<T, CabacError>;

/// Errors that can occur while decoding an entropy-coded segment
///
/// Encoding never fails with a value: caller errors such as coding a syntax
/// element the active [`CodingConfig`](crate::CodingConfig) disables are
/// configuration mismatches and panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CabacError {
    /// The bitstream is corrupt or truncated; the segment cannot be decoded further
    BitstreamCorrupt(&'static str),
    /// Fewer bytes than the arithmetic decoder needs to initialise
    SegmentTooShort {
        /// Number of bytes supplied
        len: usize,
    },
    /// A wavefront row finished without publishing its context state
    HandoffClosed,
}

impl CabacError {
    /// Whether this error means the segment data itself is bad
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::BitstreamCorrupt(_) | Self::SegmentTooShort { .. })
    }
}

impl fmt::Display for CabacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BitstreamCorrupt(msg) => write!(f, "bitstream corrupt: {msg}"),
            Self::SegmentTooShort { len } => {
                write!(f, "segment too short: {len} bytes, need at least 2")
            }
            Self::HandoffClosed => write!(f, "wavefront handoff closed before sync"),
        }
    }
}

impl core::error::Error for CabacError {}
