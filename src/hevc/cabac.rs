//! CABAC (Context-Adaptive Binary Arithmetic Coding) engine
//!
//! CABAC is the entropy coding method used in HEVC. It uses arithmetic coding
//! with context models that adapt based on previously coded symbols.
//!
//! [`CabacDecoder`] and [`CabacEncoder`] are the two directions of the same
//! state machine (H.265 9.3.4.3). Both implement [`BinCoder`], which lets
//! every binarization in this crate be written once and run either way.

use alloc::vec::Vec;
use core::convert::Infallible;

use super::bitstream::BitWriter;
use super::context::ContextModel;
use crate::error::CabacError;

type Result<T> = core::result::Result<T, CabacError>;

/// CABAC state tables from H.265 Table 9-43
pub(crate) static LPS_TABLE: [[u8; 4]; 64] = [
    [128, 176, 208, 240],
    [128, 167, 197, 227],
    [128, 158, 187, 216],
    [123, 150, 178, 205],
    [116, 142, 169, 195],
    [111, 135, 160, 185],
    [105, 128, 152, 175],
    [100, 122, 144, 166],
    [95, 116, 137, 158],
    [90, 110, 130, 150],
    [85, 104, 123, 142],
    [81, 99, 117, 135],
    [77, 94, 111, 128],
    [73, 89, 105, 122],
    [69, 85, 100, 116],
    [66, 80, 95, 110],
    [62, 76, 90, 104],
    [59, 72, 86, 99],
    [56, 69, 81, 94],
    [53, 65, 77, 89],
    [51, 62, 73, 85],
    [48, 59, 69, 80],
    [46, 56, 66, 76],
    [43, 53, 63, 72],
    [41, 50, 59, 69],
    [39, 48, 56, 65],
    [37, 45, 54, 62],
    [35, 43, 51, 59],
    [33, 41, 48, 56],
    [32, 39, 46, 53],
    [30, 37, 43, 50],
    [29, 35, 41, 48],
    [27, 33, 39, 45],
    [26, 31, 37, 43],
    [24, 30, 35, 41],
    [23, 28, 33, 39],
    [22, 27, 32, 37],
    [21, 26, 30, 35],
    [20, 24, 29, 33],
    [19, 23, 27, 31],
    [18, 22, 26, 30],
    [17, 21, 25, 28],
    [16, 20, 23, 27],
    [15, 19, 22, 25],
    [14, 18, 21, 24],
    [14, 17, 20, 23],
    [13, 16, 19, 22],
    [12, 15, 18, 21],
    [12, 14, 17, 20],
    [11, 14, 16, 19],
    [11, 13, 15, 18],
    [10, 12, 15, 17],
    [10, 12, 14, 16],
    [9, 11, 13, 15],
    [9, 11, 12, 14],
    [8, 10, 12, 14],
    [8, 9, 11, 13],
    [7, 9, 11, 12],
    [7, 9, 10, 12],
    [7, 8, 10, 11],
    [6, 8, 9, 11],
    [6, 7, 9, 10],
    [6, 7, 8, 9],
    [2, 2, 2, 2],
];

/// rangeTabLps lookup for a model at the current range
#[inline]
fn lps_range(ctx: ContextModel, range: u32) -> u32 {
    u32::from(LPS_TABLE[ctx.state() as usize][((range >> 6) & 3) as usize])
}

/// Renormalization shift that brings `range` back to at least 256
#[inline]
fn renorm_shift(range: u32) -> u32 {
    range.leading_zeros().saturating_sub(23)
}

/// One direction of the arithmetic coder
///
/// Binarizations call these methods with the symbol they would encode. The
/// encoder codes that symbol and hands it back; the decoder ignores it and
/// returns what it read. Code that only compares the returned values
/// therefore behaves identically in both directions.
pub trait BinCoder {
    /// Error produced by this direction
    type Error;

    /// True for the decoder; symbol arguments are ignored
    const DECODING: bool;

    /// Code one context-coded bin
    fn regular(&mut self, ctx: &mut ContextModel, bin: u8) -> core::result::Result<u8, Self::Error>;

    /// Code one equiprobable bin
    fn bypass(&mut self, bin: u8) -> core::result::Result<u8, Self::Error>;

    /// Code the low `n` bits of `value` as bypass bins, most significant first
    fn bypass_bits(&mut self, value: u32, n: u8) -> core::result::Result<u32, Self::Error>;

    /// Code a terminating bin
    fn terminate(&mut self, bin: u8) -> core::result::Result<u8, Self::Error>;

    /// Force the range to 256 so the following bypass bins map one to one
    /// onto stream bits (cabac_bypass_alignment_enabled_flag)
    fn align_bypass(&mut self);

    /// Report a symbol outside its syntax element's legal range
    fn invalid(&mut self, msg: &'static str) -> Self::Error;
}

/// CABAC decoder (libde265-compatible implementation)
///
/// This uses the same byte-at-a-time approach as libde265, with a 16-bit value
/// window and scaled comparisons. A byte is fetched exactly when the coder
/// needs its first bit, so a well-formed segment is never read past its end
/// and a truncated one fails at the first missing bit.
pub struct CabacDecoder<'a> {
    /// Input data
    data: &'a [u8],
    /// Current byte position
    byte_pos: usize,
    /// Range register (9 bits, 256-510)
    range: u32,
    /// Offset register scaled by 2^7, with up to 7 lookahead bits below it
    value: u32,
    /// Bits needed before next byte read (negative means bits available)
    bits_needed: i32,
    /// A terminating bin equal to 1 has been decoded
    terminated: bool,
    /// Set on the first error; every later call fails the same way
    corrupt: Option<&'static str>,
}

impl<'a> CabacDecoder<'a> {
    /// Create a new CABAC decoder and read the initial 9-bit offset
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut decoder = Self {
            data,
            byte_pos: 0,
            range: 510,
            value: 0,
            bits_needed: -8,
            terminated: false,
            corrupt: None,
        };
        decoder.start(0)?;
        Ok(decoder)
    }

    /// (Re)initialize the engine at byte `pos` (H.265 9.3.2.5)
    fn start(&mut self, pos: usize) -> Result<()> {
        let Some(&[b0, b1]) = self.data.get(pos..pos.saturating_add(2)) else {
            return Err(CabacError::SegmentTooShort {
                len: self.data.len().saturating_sub(pos),
            });
        };
        self.value = (u32::from(b0) << 8) | u32::from(b1);
        self.byte_pos = pos + 2;
        self.range = 510;
        self.bits_needed = -8;
        self.terminated = false;
        self.corrupt = None;
        Ok(())
    }

    /// Restart the engine at a byte offset, after a raw PCM section
    pub fn restart_at(&mut self, pos: usize) -> Result<()> {
        self.check()?;
        self.start(pos)
    }

    /// Current (range, 9-bit offset) for debugging
    pub fn state(&self) -> (u32, u32) {
        (self.range, self.value >> 7)
    }

    /// Bytes fetched so far and total bits consumed by the engine
    pub fn position(&self) -> (usize, u64) {
        let unread = (-self.bits_needed - 1) as u64;
        (self.byte_pos, self.byte_pos as u64 * 8 - unread)
    }

    /// The whole segment this decoder reads from
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn check(&self) -> Result<()> {
        match self.corrupt {
            Some(msg) => Err(CabacError::BitstreamCorrupt(msg)),
            None => Ok(()),
        }
    }

    fn fail(&mut self, msg: &'static str) -> CabacError {
        if self.corrupt.is_none() {
            tracing::warn!(byte_pos = self.byte_pos, len = self.data.len(), msg, "CABAC decode failed");
            self.corrupt = Some(msg);
        }
        CabacError::BitstreamCorrupt(msg)
    }

    #[inline]
    fn next_byte(&mut self) -> Result<u32> {
        match self.data.get(self.byte_pos) {
            Some(&byte) => {
                self.byte_pos += 1;
                Ok(u32::from(byte))
            }
            None => Err(self.fail("segment data exhausted mid-symbol")),
        }
    }

    /// Decode a single bin using context model
    pub fn decode_bin(&mut self, ctx: &mut ContextModel) -> Result<u8> {
        self.check()?;
        let lps = lps_range(*ctx, self.range);
        self.range -= lps;

        // Scale for comparison
        let scaled_range = self.range << 7;

        let bin_val;
        if self.value < scaled_range {
            // MPS path: at most one renormalization step
            bin_val = ctx.mps();
            ctx.update_mps();
            if self.range < 256 {
                self.range <<= 1;
                self.value <<= 1;
                self.bits_needed += 1;
                if self.bits_needed == 0 {
                    self.value |= self.next_byte()?;
                    self.bits_needed = -8;
                }
            }
        } else {
            // LPS path
            self.value -= scaled_range;
            if self.value >= lps << 7 {
                return Err(self.fail("arithmetic decoder offset exceeds range"));
            }
            bin_val = 1 - ctx.mps();
            ctx.update_lps();

            let num_bits = renorm_shift(lps);
            self.value <<= num_bits;
            self.range = lps << num_bits;
            self.bits_needed += num_bits as i32;
            if self.bits_needed >= 0 {
                self.value |= self.next_byte()? << self.bits_needed;
                self.bits_needed -= 8;
            }
        }

        #[cfg(feature = "trace-bins")]
        tracing::trace!(bin = bin_val, state = ctx.state(), mps = ctx.mps(), range = self.range, "decode bin");

        // Invariant: after renormalization, range >= 256
        debug_assert!((256..=510).contains(&self.range), "range {} after renorm", self.range);
        Ok(bin_val)
    }

    /// Decode a bypass bin (equal probability)
    pub fn decode_bypass(&mut self) -> Result<u8> {
        self.check()?;
        self.value <<= 1;
        self.bits_needed += 1;

        if self.bits_needed >= 0 {
            self.value |= self.next_byte()?;
            self.bits_needed = -8;
        }

        let scaled_range = self.range << 7;
        if self.value >= scaled_range {
            self.value -= scaled_range;
            if self.value >= scaled_range {
                return Err(self.fail("arithmetic decoder offset exceeds range"));
            }
            Ok(1)
        } else {
            Ok(0)
        }
    }

    /// Align the range before a run of bypass bins
    pub fn align_bypass(&mut self) {
        self.range = 256;
    }

    /// Decode multiple bypass bins, first bin in the most significant position
    pub fn decode_bypass_bits(&mut self, n: u8) -> Result<u32> {
        debug_assert!(n <= 32);
        let mut result = 0u32;
        for _ in 0..n {
            result = (result << 1) | u32::from(self.decode_bypass()?);
        }
        Ok(result)
    }

    /// Decode a terminate bin (end of slice segment, end of substream, pcm_flag)
    pub fn decode_terminate(&mut self) -> Result<u8> {
        self.check()?;
        self.range -= 2;

        let scaled_range = self.range << 7;
        if self.value >= scaled_range {
            self.terminated = true;
            Ok(1)
        } else {
            if self.range < 256 {
                self.range <<= 1;
                self.value <<= 1;
                self.bits_needed += 1;
                if self.bits_needed == 0 {
                    self.value |= self.next_byte()?;
                    self.bits_needed = -8;
                }
            }
            Ok(0)
        }
    }

    /// After a terminating bin of 1: check the stop bit and zero alignment
    /// bits and return the byte offset where the arithmetic-coded data ends
    pub fn align_after_terminate(&mut self) -> Result<usize> {
        self.check()?;
        assert!(
            self.terminated,
            "configuration mismatch: alignment requested before a terminating bin of 1"
        );
        // The last consumed bit is the stop bit; the unread lookahead bits
        // of the last fetched byte must be zero.
        let unread = (-self.bits_needed - 1) as u32;
        let last = u32::from(self.data[self.byte_pos - 1]);
        if last & ((2 << unread) - 1) != 1 << unread {
            return Err(self.fail("missing stop bit after terminating bin"));
        }
        Ok(self.byte_pos)
    }

    /// Decode end_of_slice_segment_flag (or end_of_subset_one_bit) if not
    /// already seen, require it to be 1, and return the segment's end offset
    pub fn finish(mut self) -> Result<usize> {
        if !self.terminated && self.decode_terminate()? != 1 {
            return Err(self.fail("segment does not end with a terminating bin"));
        }
        let end = self.align_after_terminate()?;
        tracing::debug!(bytes = end, trailing = self.data.len() - end, "segment decoded");
        Ok(end)
    }
}

impl BinCoder for CabacDecoder<'_> {
    type Error = CabacError;
    const DECODING: bool = true;

    #[inline]
    fn regular(&mut self, ctx: &mut ContextModel, _bin: u8) -> Result<u8> {
        self.decode_bin(ctx)
    }

    #[inline]
    fn bypass(&mut self, _bin: u8) -> Result<u8> {
        self.decode_bypass()
    }

    #[inline]
    fn bypass_bits(&mut self, _value: u32, n: u8) -> Result<u32> {
        self.decode_bypass_bits(n)
    }

    #[inline]
    fn terminate(&mut self, _bin: u8) -> Result<u8> {
        self.decode_terminate()
    }

    fn align_bypass(&mut self) {
        CabacDecoder::align_bypass(self);
    }

    fn invalid(&mut self, msg: &'static str) -> CabacError {
        self.fail(msg)
    }
}

/// CABAC encoder (H.265 9.3.4.3 arithmetic encoding with outstanding-bit
/// carry resolution)
///
/// Cloning an encoder together with a [`ContextSnapshot`](super::context::ContextSnapshot)
/// captures a complete rollback point for rate-distortion search.
#[derive(Debug, Clone)]
pub struct CabacEncoder {
    writer: BitWriter,
    /// Low register (10 bits between renormalizations)
    low: u32,
    /// Range register (9 bits, 256-510)
    range: u32,
    /// Bits whose value waits on a possible carry
    bits_outstanding: u32,
    /// The first bit out of the renormalizer is a placeholder and is dropped
    first_bit: bool,
    /// A terminating bin of 1 has flushed the coder
    flushed: bool,
}

impl Default for CabacEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CabacEncoder {
    /// Create an encoder at the start of a segment
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an encoder with room for `bytes` of output
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            writer: BitWriter::with_capacity(bytes),
            low: 0,
            range: 510,
            bits_outstanding: 0,
            first_bit: true,
            flushed: false,
        }
    }

    /// Current range register
    pub fn range(&self) -> u32 {
        self.range
    }

    /// Bits committed so far, including carry-pending bits
    pub fn bits_written(&self) -> u64 {
        self.writer.bit_len() + u64::from(self.bits_outstanding)
    }

    /// Whether a terminating bin of 1 has flushed the coder
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    #[inline]
    fn put_bit(&mut self, bit: u32) {
        if self.first_bit {
            self.first_bit = false;
        } else {
            self.writer.put_bit(bit);
        }
        while self.bits_outstanding > 0 {
            self.writer.put_bit(1 - bit);
            self.bits_outstanding -= 1;
        }
    }

    #[inline]
    fn renormalize(&mut self) {
        while self.range < 256 {
            if self.low < 256 {
                self.put_bit(0);
            } else if self.low >= 512 {
                self.low -= 512;
                self.put_bit(1);
            } else {
                self.low -= 256;
                self.bits_outstanding += 1;
            }
            self.range <<= 1;
            self.low <<= 1;
        }
    }

    /// Encode a single bin using context model
    pub fn encode_bin(&mut self, ctx: &mut ContextModel, bin: u8) {
        debug_assert!(bin <= 1 && !self.flushed);
        let lps = lps_range(*ctx, self.range);
        self.range -= lps;

        if bin != ctx.mps() {
            self.low += self.range;
            self.range = lps;
            ctx.update_lps();
        } else {
            ctx.update_mps();
        }

        #[cfg(feature = "trace-bins")]
        tracing::trace!(bin, state = ctx.state(), mps = ctx.mps(), range = self.range, "encode bin");

        self.renormalize();
    }

    /// Encode a bypass bin
    pub fn encode_bypass(&mut self, bin: u8) {
        debug_assert!(bin <= 1 && !self.flushed);
        self.low <<= 1;
        if bin != 0 {
            self.low += self.range;
        }

        if self.low >= 1024 {
            self.put_bit(1);
            self.low -= 1024;
        } else if self.low < 512 {
            self.put_bit(0);
        } else {
            self.low -= 512;
            self.bits_outstanding += 1;
        }
    }

    /// Align the range before a run of bypass bins
    pub fn align_bypass(&mut self) {
        self.range = 256;
    }

    /// Encode the low `n` bits of `value` as bypass bins, MSB first
    pub fn encode_bypass_bits(&mut self, value: u32, n: u8) {
        debug_assert!(n <= 32);
        for i in (0..u32::from(n)).rev() {
            self.encode_bypass(((value >> i) & 1) as u8);
        }
    }

    /// Encode a terminating bin; a 1 flushes the coder
    pub fn encode_terminate(&mut self, bin: u8) {
        debug_assert!(!self.flushed);
        self.range -= 2;
        if bin != 0 {
            self.low += self.range;
            self.flush();
        } else {
            self.renormalize();
        }
    }

    /// EncodeFlush: emit the remaining low bits and the stop bit
    fn flush(&mut self) {
        self.range = 2;
        self.renormalize();
        self.put_bit((self.low >> 9) & 1);
        self.writer.write_bits(((self.low >> 7) & 3) | 1, 2);
        self.flushed = true;
    }

    /// After a terminating bin of 1: pad to a byte boundary so raw data
    /// (PCM samples) can follow
    pub fn align_after_terminate(&mut self) {
        assert!(
            self.flushed,
            "configuration mismatch: alignment requested before a terminating bin of 1"
        );
        self.writer.align_zero();
    }

    /// Write raw bits between [`align_after_terminate`](Self::align_after_terminate)
    /// and [`restart`](Self::restart)
    pub fn write_raw_bits(&mut self, value: u32, n: u8) {
        assert!(self.flushed, "configuration mismatch: raw bits inside arithmetic-coded data");
        self.writer.write_bits(value, n);
    }

    /// Reinitialize the engine after a raw section (H.265 9.3.2.5)
    pub fn restart(&mut self) {
        assert!(self.flushed, "configuration mismatch: restart without a terminating bin of 1");
        self.writer.align_zero();
        self.low = 0;
        self.range = 510;
        self.bits_outstanding = 0;
        self.first_bit = true;
        self.flushed = false;
    }

    /// Byte offset the engine would restart at
    pub fn byte_len(&self) -> usize {
        self.writer.bytes().len()
    }

    /// Code the final terminating bin if not yet coded, byte-align with
    /// zeros and return the segment bytes
    pub fn finish(mut self) -> Vec<u8> {
        if !self.flushed {
            self.encode_terminate(1);
        }
        let bytes = self.writer.into_bytes();
        tracing::debug!(bytes = bytes.len(), "segment encoded");
        bytes
    }
}

impl BinCoder for CabacEncoder {
    type Error = Infallible;
    const DECODING: bool = false;

    #[inline]
    fn regular(&mut self, ctx: &mut ContextModel, bin: u8) -> core::result::Result<u8, Infallible> {
        self.encode_bin(ctx, bin);
        Ok(bin)
    }

    #[inline]
    fn bypass(&mut self, bin: u8) -> core::result::Result<u8, Infallible> {
        self.encode_bypass(bin);
        Ok(bin)
    }

    #[inline]
    fn bypass_bits(&mut self, value: u32, n: u8) -> core::result::Result<u32, Infallible> {
        self.encode_bypass_bits(value, n);
        Ok(if n >= 32 { value } else { value & ((1 << n) - 1) })
    }

    #[inline]
    fn terminate(&mut self, bin: u8) -> core::result::Result<u8, Infallible> {
        self.encode_terminate(bin);
        Ok(bin)
    }

    fn align_bypass(&mut self) {
        CabacEncoder::align_bypass(self);
    }

    fn invalid(&mut self, msg: &'static str) -> Infallible {
        panic!("symbol cannot be encoded: {msg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_scenario() {
        let mut enc_ctx = ContextModel::new(0, 0);
        let mut enc = CabacEncoder::new();

        // LPS at state 0: range becomes rangeTabLps[0][(510 >> 6) & 3] = 240,
        // then one renormalization step
        assert_eq!(LPS_TABLE[0][(510 >> 6) & 3], 240);
        enc.encode_bin(&mut enc_ctx, 1);
        assert_eq!(enc.range(), 480);
        assert_eq!((enc_ctx.state(), enc_ctx.mps()), (0, 1));

        enc.encode_bypass(0);
        enc.encode_bypass(1);
        enc.encode_terminate(0);
        let bytes = enc.finish();

        let mut dec_ctx = ContextModel::new(0, 0);
        let mut dec = CabacDecoder::new(&bytes).unwrap();
        let bins = [
            dec.decode_bin(&mut dec_ctx).unwrap(),
            dec.decode_bypass().unwrap(),
            dec.decode_bypass().unwrap(),
            dec.decode_terminate().unwrap(),
        ];
        assert_eq!(bins, [1, 0, 1, 0]);
        assert_eq!(dec_ctx, enc_ctx);
        assert_eq!(dec.finish().unwrap(), bytes.len());
    }

    #[test]
    fn test_empty_segment() {
        let bytes = CabacEncoder::new().finish();
        assert_eq!(bytes, [0xff, 0x80]);
        assert_eq!(CabacDecoder::new(&bytes).unwrap().finish().unwrap(), 2);
    }

    #[test]
    fn test_alignment_bits_checked() {
        let mut bytes = CabacEncoder::new().finish();
        bytes[1] |= 1;
        let err = CabacDecoder::new(&bytes).unwrap().finish().unwrap_err();
        assert!(matches!(err, CabacError::BitstreamCorrupt(_)));
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            CabacDecoder::new(&[0x12]).err(),
            Some(CabacError::SegmentTooShort { len: 1 })
        );
    }

    #[test]
    fn test_mixed_round_trip() {
        // Deterministic pseudo-random mix of regular, bypass and terminate bins
        let mut seed = 0x1234_5678u32;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };
        let ops: Vec<(u32, u8, usize)> = (0..5000)
            .map(|_| {
                let r = next();
                // skewed bins so contexts actually adapt
                let bin = u8::from(r % 7 == 0);
                (r % 10, bin, (r >> 8) as usize % 4)
            })
            .collect();

        let mut enc_ctx = [ContextModel::new(10, 0); 4];
        let mut enc = CabacEncoder::new();
        for &(kind, bin, c) in &ops {
            match kind {
                0..=6 => enc.encode_bin(&mut enc_ctx[c], bin),
                7 | 8 => enc.encode_bypass(bin),
                _ => enc.encode_terminate(0),
            }
        }
        let bytes = enc.finish();

        let mut dec_ctx = [ContextModel::new(10, 0); 4];
        let mut dec = CabacDecoder::new(&bytes).unwrap();
        for &(kind, bin, c) in &ops {
            let got = match kind {
                0..=6 => dec.decode_bin(&mut dec_ctx[c]).unwrap(),
                7 | 8 => dec.decode_bypass().unwrap(),
                _ => dec.decode_terminate().unwrap(),
            };
            let want = if kind == 9 { 0 } else { bin };
            assert_eq!(got, want);
        }
        assert_eq!(dec_ctx, enc_ctx);
        dec.finish().unwrap();
    }

    #[test]
    fn test_long_carry_chain() {
        // Alternating bypass values around the midpoint produce outstanding bits
        let mut enc = CabacEncoder::new();
        let pattern: Vec<u8> = (0..2000).map(|i| u8::from(i % 3 != 1)).collect();
        for &b in &pattern {
            enc.encode_bypass(b);
        }
        enc.encode_bypass_bits(0xdead_beef, 32);
        let bytes = enc.finish();

        let mut dec = CabacDecoder::new(&bytes).unwrap();
        for &b in &pattern {
            assert_eq!(dec.decode_bypass().unwrap(), b);
        }
        assert_eq!(dec.decode_bypass_bits(32).unwrap(), 0xdead_beef);
        dec.finish().unwrap();
    }

    #[test]
    fn test_truncation_poisons_decoder() {
        let mut ctx = ContextModel::new(20, 1);
        let mut enc = CabacEncoder::new();
        for i in 0..400 {
            enc.encode_bin(&mut ctx, u8::from(i % 5 == 0));
        }
        let bytes = enc.finish();
        let short = &bytes[..bytes.len() - 1];

        let mut ctx = ContextModel::new(20, 1);
        let mut dec = CabacDecoder::new(short).unwrap();
        let mut failed = None;
        for _ in 0..400 {
            if let Err(e) = dec.decode_bin(&mut ctx) {
                failed = Some(e);
                break;
            }
        }
        let err = failed.expect("truncated segment must not decode");
        assert!(matches!(err, CabacError::BitstreamCorrupt(_)));
        assert_eq!(dec.decode_bypass(), Err(err));
    }

    #[test]
    fn test_state_63_never_leaves_range() {
        // State 63 is reserved for termination but must still keep the
        // coder consistent when used for a regular bin
        let mut enc_ctx = ContextModel::new(63, 0);
        let mut enc = CabacEncoder::new();
        for b in [1, 0, 1, 1, 0] {
            enc.encode_bin(&mut enc_ctx, b);
        }
        let bytes = enc.finish();
        let mut dec_ctx = ContextModel::new(63, 0);
        let mut dec = CabacDecoder::new(&bytes).unwrap();
        for b in [1, 0, 1, 1, 0] {
            assert_eq!(dec.decode_bin(&mut dec_ctx).unwrap(), b);
        }
        assert_eq!((dec_ctx.state(), dec_ctx.mps()), (63, 0));
        dec.finish().unwrap();
    }

    #[test]
    fn test_aligned_bypass_run() {
        let pattern = 0x00b5_3c9e;
        let mut ctx = ContextModel::new(12, 0);
        let mut enc = CabacEncoder::new();
        for b in [0, 0, 1, 0] {
            enc.encode_bin(&mut ctx, b);
        }
        enc.align_bypass();
        assert_eq!(enc.range(), 256);
        enc.encode_bypass_bits(pattern, 24);
        enc.encode_bin(&mut ctx, 1);
        let bytes = enc.finish();

        let mut ctx = ContextModel::new(12, 0);
        let mut dec = CabacDecoder::new(&bytes).unwrap();
        for b in [0, 0, 1, 0] {
            assert_eq!(dec.decode_bin(&mut ctx).unwrap(), b);
        }
        dec.align_bypass();
        assert_eq!(dec.decode_bypass_bits(24).unwrap(), pattern);
        assert_eq!(dec.decode_bin(&mut ctx).unwrap(), 1);
        dec.finish().unwrap();
    }

    #[test]
    fn test_pcm_restart() {
        let mut ctx = ContextModel::new(5, 1);
        let mut enc = CabacEncoder::new();
        enc.encode_bin(&mut ctx, 0);
        enc.encode_terminate(1);
        enc.align_after_terminate();
        enc.write_raw_bits(0xa5, 8);
        enc.restart();
        enc.encode_bin(&mut ctx, 1);
        let bytes = enc.finish();

        let mut ctx = ContextModel::new(5, 1);
        let mut dec = CabacDecoder::new(&bytes).unwrap();
        assert_eq!(dec.decode_bin(&mut ctx).unwrap(), 0);
        assert_eq!(dec.decode_terminate().unwrap(), 1);
        let pos = dec.align_after_terminate().unwrap();
        assert_eq!(bytes[pos], 0xa5);
        dec.restart_at(pos + 1).unwrap();
        assert_eq!(dec.decode_bin(&mut ctx).unwrap(), 1);
        assert_eq!(dec.finish().unwrap(), bytes.len());
    }
}
