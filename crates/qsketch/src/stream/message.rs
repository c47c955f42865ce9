use crate::{Error, Sketch};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub use tokio::sync::mpsc::error::TryRecvError;

/// A message of the sketch queue.
///
/// Within an epoch, item messages arrive in any order. Epochs never
/// interleave: every item of epoch `e` is delivered before
/// [`StreamMessage::EndOfEpoch`] for `e`, and nothing of epoch `e + 1` comes
/// before it.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    /// The sketch of module `id`.
    Sketch { id: usize, sketch: Sketch },
    /// Module `id` could not be sketched. The message still counts as one of
    /// the epoch's items.
    Failed { id: usize, error: Error },
    /// Every item of `epoch` has been delivered.
    EndOfEpoch { epoch: usize },
}

impl StreamMessage {
    /// The module id of an item message.
    pub fn id(&self) -> Option<usize> {
        match self {
            Self::Sketch { id, .. } | Self::Failed { id, .. } => Some(*id),
            Self::EndOfEpoch { .. } => None,
        }
    }

    pub fn is_end_of_epoch(&self) -> bool {
        matches!(self, Self::EndOfEpoch { .. })
    }
}

/// Consumer end of the sketch queue.
///
/// The queue closes, and receiving returns `None`, once every worker has
/// exited: after the last epoch, or after [`Sketcher::stop`].
///
/// [`Sketcher::stop`]: crate::Sketcher::stop
#[derive(Debug)]
pub struct SketchReceiver {
    rx: mpsc::Receiver<StreamMessage>,
}

impl SketchReceiver {
    pub(crate) fn new(rx: mpsc::Receiver<StreamMessage>) -> Self {
        Self { rx }
    }

    /// Waits for the next message.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        self.rx.recv().await
    }

    /// Blocks the current thread until the next message.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<StreamMessage> {
        self.rx.blocking_recv()
    }

    /// Takes a message if one is ready.
    ///
    /// # Errors
    ///
    /// [`TryRecvError::Empty`] when nothing is queued,
    /// [`TryRecvError::Disconnected`] once the stream is over.
    pub fn try_recv(&mut self) -> Result<StreamMessage, TryRecvError> {
        self.rx.try_recv()
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Capacity of the queue, twice the number of workers.
    pub fn capacity(&self) -> usize {
        self.rx.max_capacity()
    }

    pub fn into_stream(self) -> ReceiverStream<StreamMessage> {
        ReceiverStream::new(self.rx)
    }
}

/// Blocking iteration, see [`SketchReceiver::blocking_recv`].
impl Iterator for SketchReceiver {
    type Item = StreamMessage;

    fn next(&mut self) -> Option<StreamMessage> {
        self.blocking_recv()
    }
}
