pub mod animation;
pub mod app;
pub mod camera;
pub mod config;
pub mod geometry;
pub mod gesture;
pub mod grid;
pub mod input;
pub mod protocol;
pub mod session;
pub mod state;
pub mod view;

pub use animation::{AnimationScheduler, AnimationTuning, LoopState};
pub use app::{
    run_app, AppError, AppEvent, Connector, InboundSink, KeyCommand, LoopConfig,
    LoopMetricsSnapshot, OutboundLink, Renderer, TransportError, TransportEvent,
};
pub use camera::{Camera, CameraTuning};
pub use config::{
    ClientConfig, ConfigError, CONFIG_ENV_VAR, SERVER_URL_ENV_VAR, VIEWER_ENV_VAR,
};
pub use geometry::{Coord, CoordParseError, Vec2};
pub use grid::{Grid, GridError, OccupancyMap};
pub use input::{ClickIntent, InputTuning, QuantityPrompt};
pub use protocol::{
    decode_server_message, ClientMessage, GameStateDto, PlayerDto, ProtocolError, ServerMessage,
    UpdateEntry,
};
pub use session::{
    ActionAvailability, ActionKind, GameSession, Notice, SessionError, SessionSettings,
    SessionStatus,
};
pub use state::{DiffOutcome, GamePhase, GameState, Player, StateError, StateStore};
pub use view::FrameView;
