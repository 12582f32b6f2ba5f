//! Capture source boundary
//!
//! The physical scanner is an external collaborator. The pipelines depend
//! only on the capability "deliver capture notifications": a
//! [`CaptureSource`] produces [`CaptureEvent`]s, and a [`CaptureListener`]
//! worker thread forwards them into a channel consumed by one session at a
//! time, strictly in arrival order.

pub mod replay;
pub mod simulated;

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread::JoinHandle;

use crate::biometric::{QualityFeedback, RawSample};

/// Notification from the capture device.
///
/// Decision logic reacts only to `SampleCaptured`; the remaining events are
/// observability hooks with no effect on session state.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    ReaderConnected(String),
    ReaderDisconnected(String),
    FingerTouched,
    FingerLifted,
    SampleQuality(QualityFeedback),
    SampleCaptured(RawSample),
}

/// A device (or device stand-in) that yields capture notifications.
///
/// `next_event` blocks until the next notification and returns `None` once
/// the source is exhausted or closed.
pub trait CaptureSource: Send {
    fn next_event(&mut self) -> Option<CaptureEvent>;
}

/// Dedicated listener thread bridging a capture source to a channel.
///
/// Sessions block on the receiver between notifications; a dropped
/// receiver stops the listener on its next send.
pub struct CaptureListener {
    _thread_handle: Option<JoinHandle<()>>,
}

impl CaptureListener {
    pub fn start(mut source: Box<dyn CaptureSource>) -> (Self, Receiver<CaptureEvent>) {
        let (tx, rx): (Sender<CaptureEvent>, Receiver<CaptureEvent>) = unbounded();

        let handle = std::thread::spawn(move || {
            while let Some(event) = source.next_event() {
                if tx.send(event).is_err() {
                    log::debug!("capture consumer gone, listener stopping");
                    return;
                }
            }
            log::debug!("capture source drained, listener stopping");
        });

        (
            Self {
                _thread_handle: Some(handle),
            },
            rx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedSource {
        events: Vec<CaptureEvent>,
    }

    impl CaptureSource for ScriptedSource {
        fn next_event(&mut self) -> Option<CaptureEvent> {
            if self.events.is_empty() {
                None
            } else {
                Some(self.events.remove(0))
            }
        }
    }

    #[test]
    fn test_listener_preserves_order_and_closes() {
        let source = ScriptedSource {
            events: vec![
                CaptureEvent::ReaderConnected("test".into()),
                CaptureEvent::FingerTouched,
                CaptureEvent::FingerLifted,
                CaptureEvent::ReaderDisconnected("test".into()),
            ],
        };

        let (_listener, rx) = CaptureListener::start(Box::new(source));

        assert!(matches!(rx.recv(), Ok(CaptureEvent::ReaderConnected(_))));
        assert!(matches!(rx.recv(), Ok(CaptureEvent::FingerTouched)));
        assert!(matches!(rx.recv(), Ok(CaptureEvent::FingerLifted)));
        assert!(matches!(rx.recv(), Ok(CaptureEvent::ReaderDisconnected(_))));
        // Source drained: the channel closes
        assert!(rx.recv().is_err());
    }
}
