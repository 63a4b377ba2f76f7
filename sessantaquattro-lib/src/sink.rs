//! Hand-off point between the session and whatever consumes decoded frames.

use crate::frame::DecodedFrame;
use tokio::sync::mpsc;
use tracing::warn;

/// Receives every successfully decoded frame, in stream order.
pub trait FrameSink {
    /// Deliver one frame. Returning `false` means the consumer has gone away
    /// and the session should stop.
    fn deliver(&mut self, frame: DecodedFrame) -> bool;
}

impl FrameSink for mpsc::UnboundedSender<DecodedFrame> {
    fn deliver(&mut self, frame: DecodedFrame) -> bool {
        self.send(frame).is_ok()
    }
}

/// A full bounded channel drops the frame rather than stall the socket reads.
impl FrameSink for mpsc::Sender<DecodedFrame> {
    fn deliver(&mut self, frame: DecodedFrame) -> bool {
        match self.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(sequence = frame.sequence, "Consumer queue full, dropping frame");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl FrameSink for Vec<DecodedFrame> {
    fn deliver(&mut self, frame: DecodedFrame) -> bool {
        self.push(frame);
        true
    }
}

/// Adapts a closure into a [`FrameSink`]
pub struct CallbackSink<F>(pub F);

impl<F> FrameSink for CallbackSink<F>
where
    F: FnMut(DecodedFrame),
{
    fn deliver(&mut self, frame: DecodedFrame) -> bool {
        (self.0)(frame);
        true
    }
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn deliver(&mut self, frame: DecodedFrame) -> bool {
        (**self).deliver(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelValue;

    fn frame(sequence: u64) -> DecodedFrame {
        DecodedFrame {
            sequence,
            values: vec![ChannelValue::Counts(sequence as i32)],
        }
    }

    #[test]
    fn test_bounded_sender_drops_when_full() {
        let (mut tx, mut rx) = mpsc::channel::<DecodedFrame>(1);
        assert!(tx.deliver(frame(0)));
        assert!(tx.deliver(frame(1)), "full queue keeps the session alive");
        assert_eq!(rx.try_recv().unwrap().sequence, 0);
        assert!(rx.try_recv().is_err());
        drop(rx);
        assert!(!tx.deliver(frame(2)));
    }

    #[test]
    fn test_unbounded_sender_reports_closed() {
        let (mut tx, rx) = mpsc::unbounded_channel::<DecodedFrame>();
        assert!(tx.deliver(frame(0)));
        drop(rx);
        assert!(!tx.deliver(frame(1)));
    }

    #[test]
    fn test_callback_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = CallbackSink(|f: DecodedFrame| seen.push(f.sequence));
            assert!(sink.deliver(frame(3)));
            assert!(sink.deliver(frame(4)));
        }
        assert_eq!(seen, vec![3, 4]);
    }
}
