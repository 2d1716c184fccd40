use std::sync::Arc;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{debug, info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, TouchPhase, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::window::WindowBuilder;

use crate::animation::LoopState;
use crate::geometry::Vec2;
use crate::session::{GameSession, SessionSettings, SessionStatus};
use crate::view::FrameView;

use super::input::{is_clickable_button, zoom_steps_from_scroll_delta, KeyCommand, KeyEdges};
use super::metrics::MetricsAccumulator;
use super::transport::{AppEvent, Connector, InboundSink, OutboundLink, TransportEvent};
use super::Renderer;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub viewer: Option<String>,
    pub session: SessionSettings,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Gridclash".to_string(),
            window_width: 1280,
            window_height: 720,
            viewer: None,
            session: SessionSettings::default(),
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// One connection attempt and the mirror it feeds. Reloading replaces the
/// whole thing under a new generation.
struct LiveSession {
    generation: u64,
    session: GameSession,
    link: Option<Box<dyn OutboundLink>>,
}

impl LiveSession {
    fn start(
        config: &LoopConfig,
        connector: &mut dyn Connector,
        proxy: &EventLoopProxy<AppEvent>,
        generation: u64,
        size: (u32, u32),
    ) -> Self {
        let mut session = GameSession::new(config.session, config.viewer.clone(), size.0, size.1);
        let link = match connector.connect(InboundSink::new(proxy.clone(), generation)) {
            Ok(link) => Some(link),
            Err(error) => {
                warn!(error = %error, generation, "connect_failed");
                session.connection_lost(&error.to_string());
                None
            }
        };
        info!(generation, viewer = config.viewer.as_deref().unwrap_or("spectator"), "session_started");
        Self {
            generation,
            session,
            link,
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Handled,
    Reload,
    Ignored,
}

pub fn run_app(config: LoopConfig, mut connector: Box<dyn Connector>) -> Result<(), AppError> {
    let event_loop = EventLoopBuilder::<AppEvent>::with_user_event()
        .build()
        .map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer = Renderer::new(Arc::clone(&window)).map_err(AppError::CreateRenderer)?;
    let proxy = event_loop.create_proxy();

    let size = window.inner_size();
    let mut live = LiveSession::start(
        &config,
        connector.as_mut(),
        &proxy,
        0,
        (size.width, size.height),
    );

    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    info!(
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        click_throttle_ms = config.session.input.click_throttle_ms,
        double_click_ms = config.session.input.double_click_ms,
        "loop_config"
    );

    let mut metrics = MetricsAccumulator::new(metrics_log_interval, Instant::now());
    let mut keys = KeyEdges::default();
    let mut cursor: Option<Vec2> = None;
    let mut last_applied_title: Option<String> = None;

    event_loop.set_control_flow(ControlFlow::Wait);
    event_loop
        .run(move |event, window_target| match event {
            Event::UserEvent(AppEvent { generation, event }) => {
                if generation != live.generation {
                    debug!(generation, current = live.generation, "stale_transport_event_ignored");
                    return;
                }
                match event {
                    TransportEvent::Opened => info!(generation, "connection_opened"),
                    TransportEvent::Text(text) => {
                        let result = live.session.handle_server_text(&text, Instant::now());
                        metrics.record_received(result.is_ok());
                        if let Err(error) = result {
                            warn!(error = %error, "server_message_rejected");
                        }
                    }
                    TransportEvent::Closed { reason } => {
                        live.link = None;
                        live.session.connection_lost(&reason);
                    }
                }
            }
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    live.session.resize(new_size.width, new_size.height);
                    if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = window.inner_size();
                    live.session.resize(size.width, size.height);
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::Focused(false) => {
                    keys.clear();
                    live.session.pointer_cancelled();
                }
                WindowEvent::CursorMoved { position, .. } => {
                    let pos = Vec2::new(position.x as f32, position.y as f32);
                    cursor = Some(pos);
                    live.session.pointer_moved(pos);
                }
                WindowEvent::CursorLeft { .. } => {
                    cursor = None;
                    live.session.pointer_cancelled();
                }
                WindowEvent::MouseInput { state, button, .. } => match state {
                    ElementState::Pressed => {
                        if let Some(pos) = cursor {
                            live.session.pointer_pressed(pos, is_clickable_button(button));
                        }
                    }
                    ElementState::Released => {
                        live.session.pointer_released(Instant::now());
                    }
                },
                WindowEvent::MouseWheel { delta, .. } => {
                    live.session.zoom_steps(zoom_steps_from_scroll_delta(delta));
                }
                WindowEvent::Touch(touch) => {
                    let pos = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                    match touch.phase {
                        TouchPhase::Started => live.session.touch_started(touch.id, pos),
                        TouchPhase::Moved => live.session.touch_moved(touch.id, pos),
                        TouchPhase::Ended => {
                            live.session.touch_ended(touch.id, Instant::now());
                        }
                        TouchPhase::Cancelled => live.session.touch_cancelled(touch.id),
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    let Some(command) = keys.handle(event.physical_key, event.state) else {
                        return;
                    };
                    if dispatch_key_command(&mut live.session, command, Instant::now())
                        == KeyOutcome::Reload
                    {
                        let next_generation = live.generation + 1;
                        info!(generation = next_generation, "reload_requested");
                        live.shutdown();
                        let size = window.inner_size();
                        live = LiveSession::start(
                            &config,
                            connector.as_mut(),
                            &proxy,
                            next_generation,
                            (size.width, size.height),
                        );
                    }
                }
                WindowEvent::RedrawRequested => {
                    let frame_start = Instant::now();
                    let loop_state = live.session.frame(frame_start);
                    let view = FrameView::capture(&live.session, frame_start);
                    if let Err(error) = renderer.render(&view) {
                        warn!(error = %error, "renderer_draw_failed");
                        window_target.exit();
                        return;
                    }
                    metrics.record_frame(frame_start.elapsed());
                    if loop_state == LoopState::Running {
                        window.request_redraw();
                    }

                    if let Some(snapshot) = metrics.maybe_snapshot(Instant::now()) {
                        info!(
                            fps = snapshot.fps,
                            frame_time_ms = snapshot.frame_time_ms,
                            received = snapshot.received,
                            rejected = snapshot.rejected,
                            sent = snapshot.sent,
                            status = live.session.status().label(),
                            "loop_metrics"
                        );
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                let now = Instant::now();
                live.session.poll_timers(now);
                metrics.record_sent(flush_outbound(&mut live.session, &mut live.link));

                if live.session.take_redraw_request() || live.session.is_animating() {
                    window.request_redraw();
                }

                let next_title = live.session.title(&config.window_title);
                if last_applied_title.as_deref() != Some(next_title.as_str()) {
                    window.set_title(&next_title);
                    last_applied_title = Some(next_title);
                }

                if let SessionStatus::Concluded { winner } = live.session.status() {
                    info!(winner = winner.as_deref().unwrap_or("none"), "game_concluded");
                    window_target.exit();
                    return;
                }

                match live.session.next_deadline() {
                    Some(deadline) => window_target.set_control_flow(ControlFlow::WaitUntil(deadline)),
                    None => window_target.set_control_flow(ControlFlow::Wait),
                }
            }
            Event::LoopExiting => {
                live.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn dispatch_key_command(session: &mut GameSession, command: KeyCommand, now: Instant) -> KeyOutcome {
    match command {
        KeyCommand::ZoomIn => {
            session.zoom_in();
        }
        KeyCommand::ZoomOut => {
            session.zoom_out();
        }
        KeyCommand::Action(kind) => {
            if !session.press_action(kind, now) {
                return KeyOutcome::Ignored;
            }
        }
        KeyCommand::Digit(digit) => {
            if session.prompt().is_some() {
                session.prompt_digit(digit);
            } else if digit == 0 {
                session.reset_zoom();
            } else {
                return KeyOutcome::Ignored;
            }
        }
        KeyCommand::Backspace => {
            if session.prompt().is_none() {
                return KeyOutcome::Ignored;
            }
            session.prompt_backspace();
        }
        KeyCommand::Submit => {
            if !session.submit_prompt(now) {
                return KeyOutcome::Ignored;
            }
        }
        KeyCommand::Cancel => {
            if !session.cancel_prompt() {
                session.clear_selection();
            }
        }
        KeyCommand::Reload => return KeyOutcome::Reload,
    }
    KeyOutcome::Handled
}

/// Sends every queued action. A failed send drops the link and fails the
/// session; anything still queued is discarded with it.
/// Hands queued actions to the link and returns how many it accepted.
fn flush_outbound(session: &mut GameSession, link: &mut Option<Box<dyn OutboundLink>>) -> usize {
    let mut sent = 0;
    for message in session.take_outbound() {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(error) => {
                warn!(kind = message.kind(), error = %error, "action_encode_failed");
                continue;
            }
        };
        let Some(active) = link.as_mut() else {
            warn!(kind = message.kind(), "action_dropped_disconnected");
            continue;
        };
        if let Err(error) = active.send(text) {
            warn!(kind = message.kind(), error = %error, "action_send_failed");
            *link = None;
            session.connection_lost(&error.to_string());
            break;
        }
        sent += 1;
    }
    sent
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
