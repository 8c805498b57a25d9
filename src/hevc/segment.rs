//! Entropy-coded segment facades
//!
//! A [`SegmentEncoder`] or [`SegmentDecoder`] owns everything one slice
//! segment (or one wavefront substream) needs: the arithmetic coder, its
//! context bank and the read-only slice/sequence configuration. The coding
//! tree walker drives it through the `encode_*` / `decode_*` methods; the
//! lower-level generic syntax functions in [`ctu`](super::ctu),
//! [`residual`](super::residual) and [`sao`](super::sao) are reachable
//! through [`SegmentEncoder::parts`] / [`SegmentDecoder::parts`].

use alloc::vec::Vec;

use super::bitstream::BitReader;
use super::cabac::{CabacDecoder, CabacEncoder};
use super::context::{ContextBank, ContextSnapshot};
use super::ctu::{self, CodingTreeNode};
use super::ctx_select::Component;
use super::params::{CodingConfig, SliceParams};
use super::residual::{self, CoefficientGroup, ResidualScan, TransformBlock};
use crate::error::{CabacError, Result};

fn no_residual() -> ! {
    panic!("configuration mismatch: no residual block in progress")
}

fn cbf<C: super::cabac::BinCoder>(
    coder: &mut C,
    bank: &mut ContextBank,
    component: Component,
    trafo_depth: u8,
    value: bool,
) -> core::result::Result<bool, C::Error> {
    if component.is_luma() {
        ctu::code_cbf_luma(coder, bank, trafo_depth, value)
    } else {
        ctu::code_cbf_chroma(coder, bank, trafo_depth, value)
    }
}

/// Encoder state rolled back to by [`SegmentEncoder::rollback`]
#[derive(Debug, Clone)]
pub struct Checkpoint {
    coder: CabacEncoder,
    bank: ContextSnapshot,
    residual: Option<ResidualScan>,
}

/// Encoding side of one entropy-coded segment
#[derive(Debug, Clone)]
pub struct SegmentEncoder {
    coder: CabacEncoder,
    bank: ContextBank,
    params: SliceParams,
    config: CodingConfig,
    residual: Option<ResidualScan>,
}

impl SegmentEncoder {
    /// Start a segment with a freshly initialised bank
    pub fn new(params: SliceParams, config: CodingConfig) -> Self {
        let bank = ContextBank::new(&params);
        Self::with_bank(params, config, bank)
    }

    /// Start a segment with an explicit bank
    pub fn with_bank(params: SliceParams, config: CodingConfig, bank: ContextBank) -> Self {
        tracing::debug!(slice_type = ?params.slice_type, qp = params.slice_qp, "segment encoder started");
        Self {
            coder: CabacEncoder::new(),
            bank,
            params,
            config,
            residual: None,
        }
    }

    /// Start a dependent slice segment from the bank state saved at the end
    /// of the previous segment
    pub fn resume(params: SliceParams, config: CodingConfig, state: &ContextSnapshot) -> Self {
        let mut bank = ContextBank::new(&params);
        bank.restore(state);
        tracing::debug!("dependent segment resumed");
        Self::with_bank(params, config, bank)
    }

    /// Slice parameters of this segment
    pub fn params(&self) -> &SliceParams {
        &self.params
    }

    /// Coding configuration of this segment
    pub fn config(&self) -> &CodingConfig {
        &self.config
    }

    /// The context bank
    pub fn bank(&self) -> &ContextBank {
        &self.bank
    }

    /// Coder and bank, for the generic syntax functions
    pub fn parts(&mut self) -> (&mut CabacEncoder, &mut ContextBank) {
        (&mut self.coder, &mut self.bank)
    }

    /// Bits produced so far
    pub fn bits_written(&self) -> u64 {
        self.coder.bits_written()
    }

    /// Save the complete coder state for rate-distortion trials
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            coder: self.coder.clone(),
            bank: self.bank.save(),
            residual: self.residual.clone(),
        }
    }

    /// Return to a checkpoint, discarding everything coded since
    pub fn rollback(&mut self, checkpoint: &Checkpoint) {
        self.coder = checkpoint.coder.clone();
        self.bank.restore(&checkpoint.bank);
        self.residual = checkpoint.residual.clone();
    }

    /// Snapshot of the context bank (wavefront sync point)
    pub fn snapshot(&self) -> ContextSnapshot {
        self.bank.save()
    }

    /// split_cu_flag for a coding quadtree node
    pub fn encode_split_flag(&mut self, node: &CodingTreeNode, split: bool) {
        let Ok(_) = ctu::code_split_cu_flag(&mut self.coder, &mut self.bank, &self.config, node, split);
    }

    /// cbf_luma / cbf_cb / cbf_cr at a transform depth
    pub fn encode_cbf(&mut self, component: Component, trafo_depth: u8, value: bool) {
        let Ok(_) = cbf(&mut self.coder, &mut self.bank, component, trafo_depth, value);
    }

    /// Start residual_coding() for a block: transform_skip_flag and last
    /// position. Follow with [`encode_coeff_group`](Self::encode_coeff_group)
    /// for each group from [`next_coeff_group`](Self::next_coeff_group) down.
    pub fn begin_residual(&mut self, block: &TransformBlock) {
        let Ok(scan) = residual::begin_residual(&mut self.coder, &mut self.bank, &self.config, block);
        self.residual = Some(scan);
    }

    /// Sub-block index the next coefficient group must have
    pub fn next_coeff_group(&self) -> Option<usize> {
        self.residual.as_ref().and_then(ResidualScan::next_sub_block)
    }

    /// Code one coefficient group of the current block
    pub fn encode_coeff_group(&mut self, group: &CoefficientGroup) {
        let Some(scan) = self.residual.as_mut() else { no_residual() };
        let mut group = *group;
        let Ok(()) = scan.code_group(&mut self.coder, &mut self.bank, &mut group);
        if scan.next_sub_block().is_none() {
            self.residual = None;
        }
    }

    /// Code a complete residual_coding() for a block with at least one
    /// non-zero coefficient
    pub fn encode_residual(&mut self, block: &TransformBlock) {
        self.begin_residual(block);
        while let Some(i) = self.next_coeff_group() {
            self.encode_coeff_group(&block.group(i));
        }
    }

    /// end_of_slice_segment_flag / end_of_subset_one_bit; a 1 ends the
    /// arithmetic-coded data
    pub fn encode_end_of_slice_segment_flag(&mut self, end: bool) {
        let Ok(_) = ctu::code_end_of_slice_segment_flag(&mut self.coder, end);
    }

    /// pcm_flag = 1, then the raw PCM samples, then restart the engine
    pub fn encode_pcm(&mut self, samples: &[u16], bit_depth: u8) {
        let Ok(_) = ctu::code_pcm_flag(&mut self.coder, &self.config, true);
        self.coder.align_after_terminate();
        for &sample in samples {
            assert!(u32::from(sample) >> bit_depth == 0, "PCM sample {sample} exceeds {bit_depth} bits");
            self.coder.write_raw_bits(u32::from(sample), bit_depth);
        }
        self.coder.restart();
    }

    /// Finish the segment and return its bytes
    pub fn finish(self) -> Vec<u8> {
        assert!(self.residual.is_none(), "configuration mismatch: segment ends inside a residual block");
        self.coder.finish()
    }

    /// Finish the segment, returning its bytes and the bank state a
    /// dependent segment resumes from
    pub fn into_resume_state(self) -> (Vec<u8>, ContextSnapshot) {
        let state = self.bank.save();
        (self.finish(), state)
    }
}

/// Decoding side of one entropy-coded segment
pub struct SegmentDecoder<'a> {
    coder: CabacDecoder<'a>,
    bank: ContextBank,
    params: SliceParams,
    config: CodingConfig,
    residual: Option<ResidualScan>,
}

impl<'a> SegmentDecoder<'a> {
    /// Start decoding a segment with a freshly initialised bank
    pub fn new(data: &'a [u8], params: SliceParams, config: CodingConfig) -> Result<Self> {
        let bank = ContextBank::new(&params);
        Self::with_bank(data, params, config, bank)
    }

    /// Start decoding with an explicit bank
    pub fn with_bank(data: &'a [u8], params: SliceParams, config: CodingConfig, bank: ContextBank) -> Result<Self> {
        let coder = CabacDecoder::new(data)?;
        tracing::debug!(bytes = data.len(), slice_type = ?params.slice_type, qp = params.slice_qp, "segment decoder started");
        Ok(Self {
            coder,
            bank,
            params,
            config,
            residual: None,
        })
    }

    /// Start a dependent slice segment from the previous segment's final
    /// bank state
    pub fn resume(
        data: &'a [u8],
        params: SliceParams,
        config: CodingConfig,
        state: &ContextSnapshot,
    ) -> Result<Self> {
        let mut bank = ContextBank::new(&params);
        bank.restore(state);
        tracing::debug!("dependent segment resumed");
        Self::with_bank(data, params, config, bank)
    }

    /// Slice parameters of this segment
    pub fn params(&self) -> &SliceParams {
        &self.params
    }

    /// Coding configuration of this segment
    pub fn config(&self) -> &CodingConfig {
        &self.config
    }

    /// The context bank
    pub fn bank(&self) -> &ContextBank {
        &self.bank
    }

    /// Coder and bank, for the generic syntax functions
    pub fn parts(&mut self) -> (&mut CabacDecoder<'a>, &mut ContextBank) {
        (&mut self.coder, &mut self.bank)
    }

    /// Snapshot of the context bank (wavefront sync point)
    pub fn snapshot(&self) -> ContextSnapshot {
        self.bank.save()
    }

    /// split_cu_flag for a coding quadtree node (inferred when absent)
    pub fn decode_split_flag(&mut self, node: &CodingTreeNode) -> Result<bool> {
        ctu::code_split_cu_flag(&mut self.coder, &mut self.bank, &self.config, node, false)
    }

    /// cbf_luma / cbf_cb / cbf_cr at a transform depth
    pub fn decode_cbf(&mut self, component: Component, trafo_depth: u8) -> Result<bool> {
        cbf(&mut self.coder, &mut self.bank, component, trafo_depth, false)
    }

    /// Start residual_coding() for `block` (all-zero, with size, component,
    /// scan and transquant bypass set). Sets its transform_skip_flag and
    /// returns the last significant position.
    pub fn begin_residual(&mut self, block: &mut TransformBlock) -> Result<(u32, u32)> {
        let scan = residual::begin_residual(&mut self.coder, &mut self.bank, &self.config, block)?;
        block.transform_skip = scan.transform_skip();
        let last = scan.last_position();
        self.residual = Some(scan);
        Ok(last)
    }

    /// Sub-block index of the next coefficient group
    pub fn next_coeff_group(&self) -> Option<usize> {
        self.residual.as_ref().and_then(ResidualScan::next_sub_block)
    }

    /// Decode the next coefficient group of the current block
    pub fn decode_coeff_group(&mut self) -> Result<CoefficientGroup> {
        let Some(scan) = self.residual.as_mut() else { no_residual() };
        let Some(i) = scan.next_sub_block() else { no_residual() };
        let mut group = CoefficientGroup::empty(i);
        scan.code_group(&mut self.coder, &mut self.bank, &mut group)?;
        if scan.next_sub_block().is_none() {
            self.residual = None;
        }
        Ok(group)
    }

    /// Decode a complete residual_coding()
    pub fn decode_residual(&mut self, mut block: TransformBlock) -> Result<TransformBlock> {
        self.begin_residual(&mut block)?;
        while self.next_coeff_group().is_some() {
            let group = self.decode_coeff_group()?;
            block.set_group(&group);
        }
        Ok(block)
    }

    /// end_of_slice_segment_flag / end_of_subset_one_bit
    pub fn decode_end_of_slice_segment_flag(&mut self) -> Result<bool> {
        ctu::code_end_of_slice_segment_flag(&mut self.coder, false)
    }

    /// pcm_flag; when 1, reads `count` raw samples and restarts the engine
    pub fn decode_pcm(&mut self, count: usize, bit_depth: u8) -> Result<Option<Vec<u16>>> {
        if !ctu::code_pcm_flag(&mut self.coder, &self.config, false)? {
            return Ok(None);
        }
        let start = self.coder.align_after_terminate()?;
        let data = self.coder.data();
        let mut reader = BitReader::new(data.get(start..).unwrap_or_default());
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            samples.push(reader.read_bits(bit_depth)? as u16);
        }
        let restart = start + reader.byte_position();
        self.coder.restart_at(restart).map_err(|e| match e {
            CabacError::SegmentTooShort { .. } => CabacError::BitstreamCorrupt("segment ends after PCM samples"),
            other => other,
        })?;
        Ok(Some(samples))
    }

    /// Decode the final end_of_slice_segment_flag if still pending, check the
    /// stop bit and return the number of bytes the segment used
    pub fn finish(self) -> Result<usize> {
        assert!(self.residual.is_none(), "configuration mismatch: segment ends inside a residual block");
        self.coder.finish()
    }

    /// Finish the segment, returning its length and the bank state a
    /// dependent segment resumes from
    pub fn into_resume_state(self) -> Result<(usize, ContextSnapshot)> {
        let state = self.bank.save();
        Ok((self.finish()?, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hevc::params::SliceType;
    use crate::hevc::residual::ScanOrder;

    fn setup() -> (SliceParams, CodingConfig) {
        (
            SliceParams::new(SliceType::P, 27),
            CodingConfig::new(128, 128).with_sign_data_hiding(true).with_pcm(true),
        )
    }

    #[test]
    fn test_step_by_step_residual() {
        let (params, config) = setup();
        let mut block = TransformBlock::new(4, Component::Luma, ScanOrder::Diagonal);
        block.set(0, 0, -12);
        block.set(5, 2, 1);
        block.set(9, 9, 2);

        let mut enc = SegmentEncoder::new(params, config.clone());
        enc.begin_residual(&block);
        let mut sent = Vec::new();
        while let Some(i) = enc.next_coeff_group() {
            let group = block.group(i);
            enc.encode_coeff_group(&group);
            sent.push(group);
        }
        let bank = enc.bank().clone();
        let bytes = enc.finish();

        let mut dec = SegmentDecoder::new(&bytes, params, config).unwrap();
        let mut out = TransformBlock::new(4, Component::Luma, ScanOrder::Diagonal);
        assert_eq!(dec.begin_residual(&mut out).unwrap(), (9, 9));
        for want in &sent {
            assert_eq!(&dec.decode_coeff_group().unwrap(), want);
        }
        assert_eq!(dec.next_coeff_group(), None);
        assert_eq!(dec.bank(), &bank);
        dec.finish().unwrap();
    }

    #[test]
    fn test_checkpoint_rollback() {
        let (params, config) = setup();
        let mut enc = SegmentEncoder::new(params, config.clone());
        enc.encode_cbf(Component::Luma, 0, true);
        let cp = enc.checkpoint();
        let reference = enc.clone();

        for d in 0..5 {
            enc.encode_cbf(Component::Cb, d % 3, d % 2 == 0);
        }
        enc.rollback(&cp);
        assert_eq!(enc.bank(), reference.bank());
        assert_eq!(enc.bits_written(), reference.bits_written());

        enc.encode_cbf(Component::Cr, 1, false);
        let mut expected = reference;
        expected.encode_cbf(Component::Cr, 1, false);
        assert_eq!(enc.finish(), expected.finish());
    }

    #[test]
    fn test_pcm_section() {
        let (params, config) = setup();
        let samples: Vec<u16> = (0..64).map(|i| (i * 37 % 256) as u16).collect();

        let mut enc = SegmentEncoder::new(params, config.clone());
        enc.encode_cbf(Component::Luma, 0, true);
        enc.encode_pcm(&samples, 8);
        enc.encode_cbf(Component::Luma, 0, false);
        let bytes = enc.finish();

        let mut dec = SegmentDecoder::new(&bytes, params, config).unwrap();
        assert!(dec.decode_cbf(Component::Luma, 0).unwrap());
        assert_eq!(dec.decode_pcm(64, 8).unwrap(), Some(samples));
        assert!(!dec.decode_cbf(Component::Luma, 0).unwrap());
        assert_eq!(dec.finish().unwrap(), bytes.len());
    }

    #[test]
    fn test_dependent_segment_resume() {
        let (params, config) = setup();
        let mut first = SegmentEncoder::new(params, config.clone());
        for i in 0..40 {
            first.encode_cbf(Component::Luma, 1, i % 7 != 0);
        }
        let (bytes_a, state) = first.into_resume_state();

        let mut second = SegmentEncoder::resume(params, config.clone(), &state);
        second.encode_cbf(Component::Luma, 1, true);
        let bytes_b = second.finish();

        let mut dec = SegmentDecoder::new(&bytes_a, params, config.clone()).unwrap();
        for i in 0..40 {
            assert_eq!(dec.decode_cbf(Component::Luma, 1).unwrap(), i % 7 != 0);
        }
        let (len, dec_state) = dec.into_resume_state().unwrap();
        assert_eq!(len, bytes_a.len());
        assert_eq!(dec_state, state);

        let mut dec = SegmentDecoder::resume(&bytes_b, params, config, &dec_state).unwrap();
        assert!(dec.decode_cbf(Component::Luma, 1).unwrap());
        dec.finish().unwrap();
    }
}
