use crate::pipeline::types::{Handoff, IndexedItem, Outcome, WorkerStats};
use anyhow::Result;
use crossbeam::channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// The fixed per-frame transformation a worker applies.
pub trait FrameTransform<T, R> {
    fn apply(&mut self, frame: T) -> Result<R>;
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameTransform.
impl<T, R, F> FrameTransform<T, R> for F
where
    F: FnMut(T) -> Result<R>,
{
    fn apply(&mut self, frame: T) -> Result<R> {
        self(frame)
    }
}

/// Runs the transformation and turns both errors and panics into a failed outcome.
pub fn apply_isolated<T, R, Tr>(transform: &mut Tr, frame: T) -> Outcome<R>
where
    Tr: FrameTransform<T, R>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| transform.apply(frame))) {
        Ok(Ok(result)) => Outcome::Completed(result),
        Ok(Err(e)) => Outcome::Failed(format!("{:#}", e)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Outcome::Failed(format!("transformation panicked: {}", message))
        }
    }
}

/// Worker: takes indexed frames from the input hand-off, transforms them and
/// passes the outcome on under the same index.
///
/// Exits on its completion marker, or when either hand-off is disconnected.
/// A failing frame never stops the worker.
pub fn transform_worker<T, R, Tr>(
    worker_id: usize,
    rx: Receiver<Handoff<T>>,
    tx: Sender<Handoff<Outcome<R>>>,
    mut transform: Tr,
) -> WorkerStats
where
    Tr: FrameTransform<T, R>,
{
    let mut stats = WorkerStats::new(worker_id);

    for message in rx.iter() {
        let item = match message {
            Handoff::Item(item) => item,
            Handoff::Done { .. } => break,
        };

        let start_inst = Instant::now();
        let outcome = apply_isolated(&mut transform, item.payload);
        let duration_ms = start_inst.elapsed().as_secs_f64() * 1000.0;

        stats.processed += 1;
        stats.record(duration_ms);
        if let Outcome::Failed(reason) = &outcome {
            stats.failed += 1;
            tracing::warn!(worker_id, "Frame {} failed: {}", item.index, reason);
        }

        if tx
            .send(Handoff::Item(IndexedItem::new(item.index, outcome)))
            .is_err()
        {
            tracing::warn!(worker_id, "Output hand-off closed, worker stopping");
            break;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    #[test]
    fn test_worker_preserves_index_and_stops_on_marker() {
        let (tx_in, rx_in) = channel::unbounded();
        let (tx_out, rx_out) = channel::unbounded();

        for idx in 0..3 {
            tx_in.send(Handoff::Item(IndexedItem::new(idx, idx * 2))).unwrap();
        }
        tx_in.send(Handoff::Done { total: Some(3) }).unwrap();
        // Left for another worker
        tx_in.send(Handoff::Item(IndexedItem::new(3, 6))).unwrap();

        let stats = transform_worker(0, rx_in.clone(), tx_out, |x: usize| -> Result<usize> {
            Ok(x + 1)
        });
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.failed, 0);

        let results: Vec<(usize, usize)> = rx_out
            .try_iter()
            .map(|m| match m {
                Handoff::Item(IndexedItem {
                    index,
                    payload: Outcome::Completed(v),
                }) => (index, v),
                _ => panic!("unexpected message"),
            })
            .collect();
        assert_eq!(results, vec![(0, 1), (1, 3), (2, 5)]);
        assert_eq!(rx_in.len(), 1);
    }

    #[test]
    fn test_worker_survives_errors_and_panics() {
        let (tx_in, rx_in) = channel::unbounded();
        let (tx_out, rx_out) = channel::unbounded();

        for idx in 0..4 {
            tx_in.send(Handoff::Item(IndexedItem::new(idx, idx))).unwrap();
        }
        drop(tx_in);

        let stats = transform_worker(1, rx_in, tx_out, |x: usize| -> Result<usize> {
            match x {
                1 => anyhow::bail!("bad frame"),
                2 => panic!("model exploded"),
                _ => Ok(x),
            }
        });
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.failed, 2);

        let outcomes: Vec<_> = rx_out.try_iter().collect();
        assert_eq!(outcomes.len(), 4);
        match &outcomes[2] {
            Handoff::Item(IndexedItem {
                index: 2,
                payload: Outcome::Failed(reason),
            }) => assert!(reason.contains("model exploded")),
            _ => panic!("expected failure for frame 2"),
        }
        assert!(matches!(
            &outcomes[3],
            Handoff::Item(IndexedItem {
                index: 3,
                payload: Outcome::Completed(3)
            })
        ));
    }
}
