mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod transport;

pub use input::KeyCommand;
pub use loop_runner::{run_app, AppError, LoopConfig};
pub use metrics::LoopMetricsSnapshot;
pub use rendering::Renderer;
pub use transport::{AppEvent, Connector, InboundSink, OutboundLink, TransportError, TransportEvent};
