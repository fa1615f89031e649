//! Channel-backed sink.
//!
//! # Usage
//!
//! ```rust,ignore
//! let (sink, mut rx) = tagtrack_activity::channel();
//! // hand `sink` to the correlator, drain `rx` elsewhere
//! while let Some(item) = rx.recv().await {
//!     // ship item
//! }
//! ```

use tokio::sync::mpsc;

use crate::events::Tracked;
use crate::sink::{EventSink, SinkError};

/// Sink that forwards every tracked item into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Tracked>,
}

impl EventSink for ChannelSink {
    fn emit(&self, item: Tracked) -> Result<(), SinkError> {
        self.tx.send(item).map_err(|_| SinkError::Closed)
    }
}

/// Create a channel sink and the receiver that drains it.
pub fn channel() -> (ChannelSink, mpsc::UnboundedReceiver<Tracked>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}
