use crate::pipeline::types::{Handoff, IndexedItem};
use anyhow::{anyhow, Result};
use crossbeam::channel::Sender;

/// Tags each frame with its sequence index and pushes it onto the input hand-off,
/// followed by one completion marker per worker.
///
/// Returns the number of frames submitted. Fails if every worker has already
/// exited, since nothing would ever consume the remaining frames.
pub fn distribute<T, I>(frames: I, tx: &Sender<Handoff<T>>, workers: usize) -> Result<usize>
where
    I: IntoIterator<Item = T>,
{
    let mut submitted = 0;

    for (index, frame) in frames.into_iter().enumerate() {
        if tx.send(Handoff::Item(IndexedItem::new(index, frame))).is_err() {
            return Err(anyhow!(
                "All workers exited before frame {} could be submitted",
                index
            ));
        }
        submitted += 1;
    }

    for _ in 0..workers {
        if tx
            .send(Handoff::Done {
                total: Some(submitted),
            })
            .is_err()
        {
            // Nobody is left to receive the marker, so nobody needs it.
            break;
        }
    }

    tracing::debug!("Distributor: submitted {} frames to {} workers", submitted, workers);
    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    #[test]
    fn test_distribute_tags_in_order_and_sends_markers() {
        let (tx, rx) = channel::unbounded();
        let submitted = distribute(vec!["a", "b", "c"], &tx, 2).unwrap();
        assert_eq!(submitted, 3);

        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(messages.len(), 5);
        for (idx, message) in messages.iter().take(3).enumerate() {
            match message {
                Handoff::Item(item) => assert_eq!(item.index, idx),
                Handoff::Done { .. } => panic!("marker before items"),
            }
        }
        assert!(messages[3..]
            .iter()
            .all(|m| matches!(m, Handoff::Done { total: Some(3) })));
    }

    #[test]
    fn test_distribute_fails_without_workers() {
        let (tx, rx) = channel::bounded::<Handoff<u8>>(1);
        drop(rx);
        let err = distribute(vec![1, 2], &tx, 1).unwrap_err();
        assert!(err.to_string().contains("frame 0"));
    }
}
