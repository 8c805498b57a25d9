//! Wavefront parallel entropy coding (H.265 9.3.1, 9.3.2.4)
//!
//! With entropy_coding_sync_enabled_flag each CTU row is its own substream.
//! Row N+1 starts from the context state row N had after its second CTU, so
//! rows run on separate threads with a single one-shot handoff between
//! neighbours. Nothing else is shared. In a picture one CTU wide the
//! upper-right CTU never exists and every row starts from the slice
//! initialisation.

use alloc::vec::Vec;
use std::panic;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};

use super::context::{ContextBank, ContextSnapshot};
use super::params::{CodingConfig, SliceParams};
use super::segment::{SegmentDecoder, SegmentEncoder};
use crate::error::{CabacError, Result};

/// Column after which a row publishes its context state, or `None` when
/// the picture is too narrow for the upper-right CTU to be available
pub fn sync_column(width_ctbs: u32) -> Option<u32> {
    (width_ctbs >= 2).then_some(1)
}

/// Sending half of a row-to-row context handoff
#[derive(Debug)]
pub struct RowPublisher {
    tx: Option<Sender<ContextSnapshot>>,
}

impl RowPublisher {
    /// Publish the row's bank. Only the first call sends; a consumer that
    /// has already gone away is not an error.
    pub fn publish(&mut self, snapshot: ContextSnapshot) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(snapshot);
        }
    }

    /// True once the snapshot has been sent
    pub fn is_published(&self) -> bool {
        self.tx.is_none()
    }
}

/// Receiving half of a row-to-row context handoff
#[derive(Debug)]
pub struct RowSubscriber {
    rx: Receiver<ContextSnapshot>,
}

impl RowSubscriber {
    /// Block until the row above has published its state
    pub fn wait(&self) -> Result<ContextSnapshot> {
        self.rx.recv().map_err(|_| CabacError::HandoffClosed)
    }
}

/// One-shot handoff between two neighbouring rows
pub fn row_handoff() -> (RowPublisher, RowSubscriber) {
    let (tx, rx) = bounded(1);
    (RowPublisher { tx: Some(tx) }, RowSubscriber { rx })
}

/// Initial bank of a row: the slice initialisation for the first row, the
/// state inherited from the row above otherwise
fn row_bank(params: &SliceParams, inherited: Option<&ContextSnapshot>) -> ContextBank {
    let mut bank = ContextBank::new(params);
    if let Some(snapshot) = inherited {
        bank.restore(snapshot);
    }
    bank
}

fn handoffs(rows: u32, synced: bool) -> (Vec<Option<RowPublisher>>, Vec<Option<RowSubscriber>>) {
    let mut publishers = Vec::with_capacity(rows as usize);
    let mut subscribers = Vec::with_capacity(rows as usize);
    subscribers.push(None);
    for _ in 1..rows {
        if synced {
            let (tx, rx) = row_handoff();
            publishers.push(Some(tx));
            subscribers.push(Some(rx));
        } else {
            publishers.push(None);
            subscribers.push(None);
        }
    }
    publishers.push(None);
    (publishers, subscribers)
}

fn join_rows<T>(handles: Vec<thread::ScopedJoinHandle<'_, Result<T>>>) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(handles.len());
    let mut first_err = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(row)) => out.push(row),
            // Rows below a failed row only report the closed handoff
            Ok(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            Err(payload) => panic::resume_unwind(payload),
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

/// Encode a slice with one substream per CTU row.
///
/// `encode_ctu` codes the coding_tree_unit() (including its SAO syntax) at
/// `(ctb_x, ctb_y)`; the end_of_slice_segment_flag and end_of_subset_one_bit
/// that follow are coded here. The slice spans the whole picture. Returns the
/// substream bytes in row order.
pub fn encode_rows<F>(params: SliceParams, config: &CodingConfig, encode_ctu: F) -> Result<Vec<Vec<u8>>>
where
    F: Fn(&mut SegmentEncoder, u32, u32) + Sync,
{
    assert!(
        config.entropy_coding_sync_enabled,
        "configuration mismatch: wavefront coding with entropy_coding_sync disabled"
    );
    let width = config.pic_width_in_ctbs();
    let rows = config.pic_height_in_ctbs();
    let sync = sync_column(width);
    let (publishers, subscribers) = handoffs(rows, sync.is_some());
    let encode_ctu = &encode_ctu;

    thread::scope(|s| {
        let handles = publishers
            .into_iter()
            .zip(subscribers)
            .enumerate()
            .map(|(y, (publisher, subscriber))| {
                let y = y as u32;
                let config = config.clone();
                s.spawn(move || -> Result<Vec<u8>> {
                    let inherited = subscriber.as_ref().map(RowSubscriber::wait).transpose()?;
                    if inherited.is_some() {
                        tracing::debug!(row = y, "row synced from row above");
                    }
                    let bank = row_bank(&params, inherited.as_ref());
                    let mut enc = SegmentEncoder::with_bank(params, config, bank);
                    let mut publisher = publisher;
                    for x in 0..width {
                        encode_ctu(&mut enc, x, y);
                        if Some(x) == sync {
                            if let Some(p) = publisher.as_mut() {
                                p.publish(enc.snapshot());
                            }
                        }
                        let last_in_row = x + 1 == width;
                        let last_in_slice = last_in_row && y + 1 == rows;
                        enc.encode_end_of_slice_segment_flag(last_in_slice);
                        if last_in_row && !last_in_slice {
                            enc.encode_end_of_slice_segment_flag(true);
                        }
                    }
                    Ok(enc.finish())
                })
            })
            .collect::<Vec<_>>();
        join_rows(handles)
    })
}

/// Decode a slice coded with one substream per CTU row.
///
/// `decode_ctu` decodes the coding_tree_unit() at `(ctb_x, ctb_y)`. Every
/// substream must end exactly where its CTUs do. Returns the bytes consumed
/// per row.
pub fn decode_rows<F>(
    substreams: &[&[u8]],
    params: SliceParams,
    config: &CodingConfig,
    decode_ctu: F,
) -> Result<Vec<usize>>
where
    F: Fn(&mut SegmentDecoder<'_>, u32, u32) -> Result<()> + Sync,
{
    assert!(
        config.entropy_coding_sync_enabled,
        "configuration mismatch: wavefront coding with entropy_coding_sync disabled"
    );
    let width = config.pic_width_in_ctbs();
    let rows = config.pic_height_in_ctbs();
    if substreams.len() != rows as usize {
        return Err(CabacError::BitstreamCorrupt("substream count differs from CTU row count"));
    }
    let sync = sync_column(width);
    let (publishers, subscribers) = handoffs(rows, sync.is_some());
    let decode_ctu = &decode_ctu;

    thread::scope(|s| {
        let handles = publishers
            .into_iter()
            .zip(subscribers)
            .zip(substreams.iter().copied())
            .enumerate()
            .map(|(y, ((publisher, subscriber), data))| {
                let y = y as u32;
                let config = config.clone();
                s.spawn(move || -> Result<usize> {
                    // Dropping the publisher on any early return wakes the
                    // row below with HandoffClosed
                    let mut publisher = publisher;
                    let inherited = subscriber.as_ref().map(RowSubscriber::wait).transpose()?;
                    if inherited.is_some() {
                        tracing::debug!(row = y, "row synced from row above");
                    }
                    let bank = row_bank(&params, inherited.as_ref());
                    let mut dec = SegmentDecoder::with_bank(data, params, config, bank)?;
                    for x in 0..width {
                        decode_ctu(&mut dec, x, y)?;
                        if Some(x) == sync {
                            if let Some(p) = publisher.as_mut() {
                                p.publish(dec.snapshot());
                            }
                        }
                        let last_in_row = x + 1 == width;
                        let last_in_slice = last_in_row && y + 1 == rows;
                        if last_in_slice {
                            break;
                        }
                        if dec.decode_end_of_slice_segment_flag()? {
                            return Err(CabacError::BitstreamCorrupt("slice ends before its last CTU"));
                        }
                    }
                    // end_of_subset_one_bit, or the final end_of_slice_segment_flag
                    dec.finish()
                })
            })
            .collect::<Vec<_>>();
        join_rows(handles)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hevc::ctx_select::Component;
    use crate::hevc::params::SliceType;

    #[test]
    fn test_sync_column() {
        assert_eq!(sync_column(1), None);
        assert_eq!(sync_column(2), Some(1));
        assert_eq!(sync_column(30), Some(1));
    }

    #[test]
    fn test_publish_once() {
        let (mut tx, rx) = row_handoff();
        let bank = ContextBank::new(&SliceParams::new(SliceType::I, 30));
        assert!(!tx.is_published());
        tx.publish(bank.save());
        assert!(tx.is_published());
        // A second publish is a no-op and must not block on the full channel
        tx.publish(bank.save());
        assert_eq!(rx.wait().unwrap(), bank.save());
        drop(tx);
        assert_eq!(rx.wait(), Err(CabacError::HandoffClosed));
    }

    #[test]
    fn test_dropped_publisher_closes_handoff() {
        let (tx, rx) = row_handoff();
        drop(tx);
        assert_eq!(rx.wait(), Err(CabacError::HandoffClosed));
    }

    #[test]
    fn test_single_ctu_rows_start_from_slice_init() {
        // No upper-right CTU: row 1 must not inherit row 0's adapted state
        let params = SliceParams::new(SliceType::I, 32);
        let config = CodingConfig::new(64, 128).with_entropy_coding_sync(true);
        let streams = encode_rows(params, &config, |enc, _x, y| {
            let coded = if y == 0 { 200 } else { 1 };
            for _ in 0..coded {
                enc.encode_cbf(Component::Luma, 0, true);
            }
        })
        .unwrap();
        assert_eq!(streams.len(), 2);

        let mut fresh = SegmentEncoder::new(params, config.clone());
        fresh.encode_cbf(Component::Luma, 0, true);
        fresh.encode_end_of_slice_segment_flag(true);
        assert_eq!(streams[1], fresh.finish());

        let refs: Vec<&[u8]> = streams.iter().map(Vec::as_slice).collect();
        let used = decode_rows(&refs, params, &config, |dec, _x, y| {
            let coded = if y == 0 { 200 } else { 1 };
            for _ in 0..coded {
                assert!(dec.decode_cbf(Component::Luma, 0)?);
            }
            Ok(())
        })
        .unwrap();
        let lens: Vec<usize> = streams.iter().map(Vec::len).collect();
        assert_eq!(used, lens);
    }
}
