// Ordered writer: re-sequences transformed frames before they reach the sink

use crate::pipeline::types::{FailurePolicy, Handoff, IndexedItem, Outcome, WriterSummary};
use anyhow::Result;
use crossbeam::channel::Receiver;
use indicatif::ProgressBar;
use std::collections::{BTreeMap, BTreeSet};

/// Destination for frames once they are back in order.
pub trait FrameSink<R> {
    fn write(&mut self, frame: R) -> Result<()>;

    /// Called once after the last frame. Release files or devices here.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameSink.
impl<R, F> FrameSink<R> for F
where
    F: FnMut(R) -> Result<()>,
{
    fn write(&mut self, frame: R) -> Result<()> {
        self(frame)
    }
}

/// Accepts outcomes in any order and emits completed frames to the sink
/// strictly by ascending index.
pub struct OrderedWriter<R, S> {
    sink: S,
    policy: FailurePolicy,
    next_expected: usize,
    pending: BTreeMap<usize, Outcome<R>>,
    // Indices that arrived after a halt; recorded but never buffered
    settled: BTreeSet<usize>,
    summary: WriterSummary,
    pb: ProgressBar,
}

impl<R, S> OrderedWriter<R, S>
where
    S: FrameSink<R>,
{
    pub fn new(sink: S, policy: FailurePolicy) -> Self {
        Self {
            sink,
            policy,
            next_expected: 0,
            pending: BTreeMap::new(),
            settled: BTreeSet::new(),
            summary: WriterSummary::default(),
            pb: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn next_expected(&self) -> usize {
        self.next_expected
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Buffers one outcome and flushes every frame that is now contiguous.
    ///
    /// After a fail-fast halt nothing more can be written, so outcomes are
    /// recorded in the summary and their payloads dropped on arrival.
    pub fn accept(&mut self, item: IndexedItem<Outcome<R>>) -> Result<()> {
        let index = item.index;
        if index < self.next_expected
            || self.pending.contains_key(&index)
            || self.settled.contains(&index)
            || self.summary.halted_at == Some(index)
        {
            tracing::warn!("Ordered writer: ignoring duplicate frame {}", index);
            return Ok(());
        }

        if self.summary.halted_at.is_some() {
            self.settle(index, &item.payload);
            return Ok(());
        }

        self.pending.insert(index, item.payload);
        self.flush_ready()
    }

    fn settle(&mut self, index: usize, outcome: &Outcome<R>) {
        match outcome {
            Outcome::Completed(_) => self.summary.discarded.push(index),
            Outcome::Failed(_) => self.summary.failed.push(index),
        }
        self.settled.insert(index);
    }

    fn flush_ready(&mut self) -> Result<()> {
        while self.summary.halted_at.is_none() {
            let Some(outcome) = self.pending.remove(&self.next_expected) else {
                break;
            };

            match outcome {
                Outcome::Completed(frame) => {
                    self.sink.write(frame)?;
                    self.summary.written += 1;
                    self.pb.inc(1);
                }
                Outcome::Failed(reason) => {
                    self.summary.failed.push(self.next_expected);
                    match self.policy {
                        FailurePolicy::SkipAndReport => {
                            tracing::warn!(
                                "Frame {} failed and was skipped: {}",
                                self.next_expected,
                                reason
                            );
                        }
                        FailurePolicy::FailFast => {
                            tracing::error!(
                                "Frame {} failed, halting output: {}",
                                self.next_expected,
                                reason
                            );
                            self.summary.halted_at = Some(self.next_expected);
                            for (idx, outcome) in std::mem::take(&mut self.pending) {
                                self.settle(idx, &outcome);
                            }
                            break;
                        }
                    }
                }
            }

            self.next_expected += 1;
        }

        Ok(())
    }

    /// Handles the completion marker. Nothing else will arrive, so whatever is
    /// still buffered sits behind a gap and cannot be written.
    ///
    /// `total` is the number of submitted items when known; otherwise the end
    /// is taken to be one past the highest buffered index.
    pub fn finish(mut self, total: Option<usize>) -> Result<WriterSummary> {
        self.flush_ready()?;

        let last_seen = self
            .pending
            .keys()
            .next_back()
            .into_iter()
            .chain(self.settled.iter().next_back())
            .max()
            .copied();
        let end = total
            .or_else(|| last_seen.map(|last| last + 1))
            .unwrap_or(self.next_expected);

        // A halted writer has already consumed the failed index itself
        let first_unseen = match self.summary.halted_at {
            Some(idx) => idx + 1,
            None => self.next_expected,
        };
        self.summary.missing = (first_unseen..end)
            .filter(|idx| !self.pending.contains_key(idx) && !self.settled.contains(idx))
            .collect();

        for (idx, outcome) in std::mem::take(&mut self.pending) {
            self.settle(idx, &outcome);
        }
        self.summary.discarded.sort_unstable();
        self.summary.failed.sort_unstable();

        if !self.summary.missing.is_empty() {
            tracing::error!(
                "Ordered writer: frames never arrived: {:?}",
                self.summary.missing
            );
        }
        if !self.summary.discarded.is_empty() {
            tracing::error!(
                "Ordered writer: discarding {} completed frames that could not be written: {:?}",
                self.summary.discarded.len(),
                self.summary.discarded
            );
        }

        self.sink.finish()?;
        self.pb.finish_with_message("Done");

        Ok(self.summary)
    }
}

/// Writer thread body: drains the output hand-off until the completion marker.
pub fn writer_worker<R, S>(
    rx: Receiver<Handoff<Outcome<R>>>,
    mut writer: OrderedWriter<R, S>,
) -> Result<WriterSummary>
where
    S: FrameSink<R>,
{
    for message in rx.iter() {
        match message {
            Handoff::Item(item) => writer.accept(item)?,
            Handoff::Done { total } => return writer.finish(total),
        }
    }

    tracing::warn!("Ordered writer: output hand-off closed without a completion marker");
    writer.finish(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    fn collecting_writer(
        policy: FailurePolicy,
    ) -> (
        OrderedWriter<usize, impl FrameSink<usize>>,
        channel::Receiver<usize>,
    ) {
        let (tx, rx) = channel::unbounded();
        let sink = move |frame: usize| -> Result<()> {
            tx.send(frame)?;
            Ok(())
        };
        (OrderedWriter::new(sink, policy), rx)
    }

    fn done(index: usize) -> IndexedItem<Outcome<usize>> {
        IndexedItem::new(index, Outcome::Completed(index * 10))
    }

    fn failed(index: usize) -> IndexedItem<Outcome<usize>> {
        IndexedItem::new(index, Outcome::Failed("inference error".to_string()))
    }

    #[test]
    fn test_reorders_out_of_order_arrivals() {
        let (mut writer, rx) = collecting_writer(FailurePolicy::SkipAndReport);

        for idx in [3, 1, 0, 2, 5, 4] {
            writer.accept(done(idx)).unwrap();
        }
        assert_eq!(writer.next_expected(), 6);
        assert_eq!(writer.pending_len(), 0);

        let summary = writer.finish(Some(6)).unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.written, 6);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_holds_frames_until_gap_fills() {
        let (mut writer, rx) = collecting_writer(FailurePolicy::SkipAndReport);

        writer.accept(done(1)).unwrap();
        writer.accept(done(2)).unwrap();
        assert_eq!(writer.next_expected(), 0);
        assert_eq!(writer.pending_len(), 2);
        assert!(rx.try_recv().is_err());

        writer.accept(done(0)).unwrap();
        assert_eq!(writer.next_expected(), 3);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 10, 20]);
    }

    #[test]
    fn test_duplicates_are_not_emitted_twice() {
        let (mut writer, rx) = collecting_writer(FailurePolicy::SkipAndReport);

        writer.accept(done(0)).unwrap();
        writer.accept(done(0)).unwrap();
        writer.accept(done(2)).unwrap();
        writer.accept(done(2)).unwrap();
        writer.accept(done(1)).unwrap();

        let summary = writer.finish(Some(3)).unwrap();
        assert_eq!(summary.written, 3);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 10, 20]);
    }

    #[test]
    fn test_failed_frame_is_skipped_and_reported() {
        let (mut writer, rx) = collecting_writer(FailurePolicy::SkipAndReport);

        for idx in (0..10).rev() {
            if idx == 5 {
                writer.accept(failed(idx)).unwrap();
            } else {
                writer.accept(done(idx)).unwrap();
            }
        }

        let summary = writer.finish(Some(10)).unwrap();
        assert_eq!(summary.written, 9);
        assert_eq!(summary.failed, vec![5]);
        assert!(summary.missing.is_empty());
        assert!(summary.discarded.is_empty());

        let emitted: Vec<usize> = rx.try_iter().collect();
        assert_eq!(emitted, vec![0, 10, 20, 30, 40, 60, 70, 80, 90]);
    }

    #[test]
    fn test_fail_fast_halts_at_failed_frame() {
        let (mut writer, rx) = collecting_writer(FailurePolicy::FailFast);

        for idx in 0..10 {
            if idx == 5 {
                writer.accept(failed(idx)).unwrap();
            } else {
                writer.accept(done(idx)).unwrap();
            }
        }

        let summary = writer.finish(Some(10)).unwrap();
        assert_eq!(summary.halted_at, Some(5));
        assert_eq!(summary.written, 5);
        assert_eq!(summary.failed, vec![5]);
        assert_eq!(summary.discarded, vec![6, 7, 8, 9]);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_fail_fast_drops_late_frames_and_reports_gaps() {
        let (mut writer, rx) = collecting_writer(FailurePolicy::FailFast);

        writer.accept(done(2)).unwrap();
        writer.accept(failed(0)).unwrap();
        assert_eq!(writer.pending_len(), 0);

        for idx in (1..1000).filter(|idx| *idx != 2) {
            writer.accept(done(idx)).unwrap();
        }
        writer.accept(failed(1000)).unwrap();
        writer.accept(done(0)).unwrap();
        writer.accept(done(7)).unwrap();
        assert_eq!(writer.pending_len(), 0);

        let summary = writer.finish(Some(1010)).unwrap();
        assert_eq!(summary.halted_at, Some(0));
        assert_eq!(summary.written, 0);
        assert_eq!(summary.failed, vec![0, 1000]);
        assert_eq!(summary.discarded, (1..1000).collect::<Vec<_>>());
        assert_eq!(summary.missing, (1001..1010).collect::<Vec<_>>());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_index_stops_flush_and_is_reported() {
        let (mut writer, rx) = collecting_writer(FailurePolicy::SkipAndReport);

        for idx in [0, 1, 2, 4, 6] {
            writer.accept(done(idx)).unwrap();
        }

        let summary = writer.finish(Some(8)).unwrap();
        assert_eq!(summary.written, 3);
        assert_eq!(summary.missing, vec![3, 5, 7]);
        assert_eq!(summary.discarded, vec![4, 6]);
        assert!(!summary.is_complete());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 10, 20]);
    }

    #[test]
    fn test_finish_without_total_uses_highest_index() {
        let (mut writer, _rx) = collecting_writer(FailurePolicy::SkipAndReport);

        writer.accept(done(0)).unwrap();
        writer.accept(done(3)).unwrap();

        let summary = writer.finish(None).unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.missing, vec![1, 2]);
        assert_eq!(summary.discarded, vec![3]);
    }

    #[test]
    fn test_writer_worker_stops_on_marker() {
        let (tx, rx) = channel::unbounded();
        let (writer, out) = collecting_writer(FailurePolicy::SkipAndReport);

        tx.send(Handoff::Item(done(1))).unwrap();
        tx.send(Handoff::Item(done(0))).unwrap();
        tx.send(Handoff::Done { total: Some(2) }).unwrap();
        // Anything after the marker is never read
        tx.send(Handoff::Item(done(2))).unwrap();

        let summary = writer_worker(rx, writer).unwrap();
        assert_eq!(summary.written, 2);
        assert_eq!(out.try_iter().collect::<Vec<_>>(), vec![0, 10]);
    }

    #[test]
    fn test_sink_error_propagates() {
        let mut writer: OrderedWriter<usize, _> = OrderedWriter::new(
            |_frame: usize| -> Result<()> { anyhow::bail!("disk full") },
            FailurePolicy::SkipAndReport,
        );
        assert!(writer.accept(done(0)).is_err());
    }
}
