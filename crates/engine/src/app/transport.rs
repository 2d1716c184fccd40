//! Seam between the event loop and whatever carries server messages.
//!
//! A [`Connector`] opens one connection per session generation. Inbound
//! traffic is pushed into the event loop through an [`InboundSink`];
//! outbound text goes through the returned [`OutboundLink`]. Events from a
//! superseded generation are discarded by the loop, so a reload never sees
//! stragglers from the old socket.

use thiserror::Error;
use winit::event_loop::EventLoopProxy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Text(String),
    /// The connection ended, cleanly or not.
    Closed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to start transport: {0}")]
    Start(String),
    #[error("connection is closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct InboundSink {
    proxy: EventLoopProxy<AppEvent>,
    generation: u64,
}

impl InboundSink {
    pub(crate) fn new(proxy: EventLoopProxy<AppEvent>, generation: u64) -> Self {
        Self { proxy, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the event loop has shut down.
    pub fn deliver(&self, event: TransportEvent) -> bool {
        self.proxy
            .send_event(AppEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

pub trait OutboundLink {
    fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Stops the connection. Later sends fail with [`TransportError::Closed`].
    fn close(&mut self);
}

pub trait Connector {
    fn connect(&mut self, inbound: InboundSink) -> Result<Box<dyn OutboundLink>, TransportError>;
}
