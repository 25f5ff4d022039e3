//! Bounded frame queue between the receive context and the owning loop

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::trace;

use crate::Frame;

/// Create a queue holding at most `depth` undelivered frames
pub fn frame_queue(depth: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (FrameSender { tx }, FrameReceiver { rx })
}

/// Producer half, held by the transport's receive context
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
}

impl FrameSender {
    /// Enqueue without blocking. Returns false if the frame was dropped
    /// because the queue is full or the consumer is gone.
    pub fn offer(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                trace!(source = %frame.source, "Receive queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the engine loop
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Frame>,
}

impl FrameReceiver {
    /// Wait for the next frame; `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Take a frame if one is waiting
    pub fn try_recv(&mut self) -> Option<Frame> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take every frame currently waiting
    pub fn drain(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::HardwareAddress;

    fn frame(n: u8) -> Frame {
        Frame {
            source: HardwareAddress([n; 6]),
            bytes: vec![2],
        }
    }

    #[test]
    fn test_fifo_and_drop_when_full() {
        let (tx, mut rx) = frame_queue(2);
        assert!(tx.offer(frame(1)));
        assert!(tx.offer(frame(2)));
        assert!(!tx.offer(frame(3)));
        let drained = rx.drain();
        assert_eq!(drained, vec![frame(1), frame(2)]);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_offer_after_consumer_dropped() {
        let (tx, rx) = frame_queue(4);
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.offer(frame(1)));
    }

    #[tokio::test]
    async fn test_recv_from_another_task() {
        let (tx, mut rx) = frame_queue(4);
        let producer = tokio::spawn(async move {
            tx.offer(frame(7));
        });
        assert_eq!(rx.recv().await, Some(frame(7)));
        producer.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }
}
