//! Bounded hand-off between a patch producer thread and the reconstruction loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use crate::producer::{CancelToken, PatchBatch, Pulled};

/// How often blocked queue operations re-check cancellation and closure.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
#[error("Patch queue is closed")]
pub struct QueueClosed;

/// Creates a queue holding up to `queue_length` patches, grouped in batches of
/// `batch_size`.
pub fn patch_queue(queue_length: usize, batch_size: usize) -> (BatchSender, BatchReceiver) {
    let batches = (queue_length / batch_size.max(1)).max(1);
    let (tx, rx) = bounded(batches);
    let closed = Arc::new(AtomicBool::new(false));
    (
        BatchSender {
            tx,
            closed: closed.clone(),
        },
        BatchReceiver {
            rx: Some(rx),
            closed,
        },
    )
}

#[derive(Clone)]
pub struct BatchSender {
    tx: Sender<PatchBatch>,
    closed: Arc<AtomicBool>,
}

impl BatchSender {
    /// Blocks while the queue is full. Fails once the consumer closed the queue.
    pub fn push(&self, batch: PatchBatch) -> Result<(), QueueClosed> {
        let mut batch = batch;
        loop {
            if self.is_closed() {
                return Err(QueueClosed);
            }
            match self.tx.send_timeout(batch, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => batch = returned,
                Err(SendTimeoutError::Disconnected(_)) => return Err(QueueClosed),
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct BatchReceiver {
    rx: Option<Receiver<PatchBatch>>,
    closed: Arc<AtomicBool>,
}

impl BatchReceiver {
    /// Waits for the next batch. Returns [`Pulled::EndOfStream`] once every sender is
    /// gone or the queue was closed.
    pub fn pop(&self, cancel: &CancelToken) -> Pulled {
        let Some(rx) = self.rx.as_ref() else {
            return Pulled::EndOfStream;
        };
        loop {
            if cancel.is_cancelled() {
                return Pulled::Cancelled;
            }
            if self.is_closed() {
                return Pulled::EndOfStream;
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(batch) => return Pulled::Batch(batch),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Pulled::EndOfStream,
            }
        }
    }

    /// Marks the queue closed and drops the receiving end, which unblocks any sender
    /// waiting on a full queue.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
