//! One live game: the state mirror plus everything that reacts to it.
//!
//! [`GameSession`] is the single owner of the state store, animation
//! scheduler, camera and input state. Inbound messages, user input and frame
//! ticks all arrive as method calls on it; outbound messages queue up until
//! the caller drains them with [`GameSession::take_outbound`].

mod actions;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::animation::{normalize_angle, AnimationScheduler, AnimationTuning, LoopState};
use crate::camera::{Camera, CameraTuning};
use crate::geometry::{Coord, Vec2};
use crate::gesture::{PointerDrag, TouchGestures, TouchId};
use crate::input::{ClickDisambiguator, ClickThrottle, InputTuning, QuantityPrompt, Selection};
use crate::protocol::{
    decode_server_message, ClientMessage, GameStateDto, ProtocolError, ServerMessage, UpdateEntry,
};
use crate::state::{DiffOutcome, GamePhase, GameState, StateError, StateStore};

pub use actions::{ActionAvailability, ActionKind};

pub const CONNECTION_LOST_NOTICE: &str = "Connection lost. Press R to reload.";
const MAX_NOTICES: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub camera: CameraTuning,
    pub animation: AnimationTuning,
    pub input: InputTuning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    AwaitingSnapshot,
    Live,
    /// The mirror disagreed with a diff. Diffs are dropped until the next
    /// snapshot replaces the mirror.
    Desynchronized {
        reason: String,
    },
    Concluded {
        winner: Option<String>,
    },
    /// Transport gone. Only a full reload recovers.
    Failed {
        reason: String,
    },
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::AwaitingSnapshot => "awaiting_snapshot",
            SessionStatus::Live => "live",
            SessionStatus::Desynchronized { .. } => "desynchronized",
            SessionStatus::Concluded { .. } => "concluded",
            SessionStatus::Failed { .. } => "failed",
        }
    }
}

/// User-facing message surfaced in the title bar and the replay summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Server(String),
    Desync(String),
    ConnectionLost,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Server(message) => write!(f, "{message}"),
            Notice::Desync(reason) => write!(f, "Out of sync with server ({reason}), waiting for full state"),
            Notice::ConnectionLost => write!(f, "{CONNECTION_LOST_NOTICE}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug)]
pub struct GameSession {
    settings: SessionSettings,
    store: StateStore,
    animations: AnimationScheduler,
    /// Cell each in-flight position tween is heading for.
    move_targets: HashMap<String, Coord>,
    camera: Camera,
    touches: TouchGestures,
    drag: PointerDrag,
    click_throttle: ClickThrottle,
    action_clicks: [(ActionKind, ClickDisambiguator); 3],
    selection: Selection,
    prompt: Option<(ActionKind, QuantityPrompt)>,
    status: SessionStatus,
    notices: VecDeque<Notice>,
    outbound: VecDeque<ClientMessage>,
    redraw_requested: bool,
}

impl GameSession {
    pub fn new(settings: SessionSettings, viewer: Option<String>, width: u32, height: u32) -> Self {
        let input = settings.input;
        let double_click = Duration::from_millis(input.double_click_ms);
        Self {
            settings,
            store: StateStore::new(viewer),
            animations: AnimationScheduler::new(settings.animation),
            move_targets: HashMap::new(),
            camera: Camera::new(settings.camera, width, height),
            touches: TouchGestures::new(input.drag_threshold_px),
            drag: PointerDrag::new(input.drag_threshold_px),
            click_throttle: ClickThrottle::new(Duration::from_millis(input.click_throttle_ms)),
            action_clicks: ActionKind::QUANTIFIED
                .map(|kind| (kind, ClickDisambiguator::new(double_click))),
            selection: Selection::default(),
            prompt: None,
            status: SessionStatus::AwaitingSnapshot,
            notices: VecDeque::new(),
            outbound: VecDeque::new(),
            redraw_requested: true,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn state(&self) -> Option<&GameState> {
        self.store.state()
    }

    pub fn viewer(&self) -> Option<&str> {
        self.store.viewer()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn animations(&self) -> &AnimationScheduler {
        &self.animations
    }

    pub fn selection(&self) -> Option<Coord> {
        self.selection.cell()
    }

    pub fn prompt(&self) -> Option<(ActionKind, &QuantityPrompt)> {
        self.prompt.as_ref().map(|(kind, prompt)| (*kind, prompt))
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> + '_ {
        self.notices.iter()
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn take_outbound(&mut self) -> Vec<ClientMessage> {
        self.outbound.drain(..).collect()
    }

    /// True once per batch of visible changes.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }

    pub fn handle_server_text(&mut self, text: &str, now: Instant) -> Result<(), SessionError> {
        let message = decode_server_message(text)?;
        self.handle_message(message, now)
    }

    pub fn handle_message(&mut self, message: ServerMessage, now: Instant) -> Result<(), SessionError> {
        match message {
            ServerMessage::GameState { state } => {
                let dto = state.into_dto()?;
                self.apply_snapshot(dto)?;
            }
            ServerMessage::Updates { updates } => self.apply_updates(&updates, now)?,
            ServerMessage::Winner { winner } => self.conclude(winner),
            ServerMessage::Error { msg } => {
                warn!(message = %msg, "server_error");
                self.push_notice(Notice::Server(msg));
                self.request_redraw();
            }
            ServerMessage::Unknown => debug!("unknown_message_ignored"),
        }
        Ok(())
    }

    /// Replaces the mirror, recentres the camera and drops every in-flight
    /// animation. A rejected snapshot leaves the previous mirror in place
    /// and marks the session out of sync.
    pub fn apply_snapshot(&mut self, dto: GameStateDto) -> Result<(), SessionError> {
        let (dim, players, phase, winner) = match self.store.apply_snapshot(dto) {
            Ok(state) => (state.dim, state.players.len(), state.phase, state.winner.clone()),
            Err(err) => {
                self.desynchronize(&err);
                return Err(err.into());
            }
        };

        self.camera.set_dimension(dim);
        self.animations.clear();
        self.move_targets.clear();
        self.cancel_pending_input();
        if self.selection.cell().is_some_and(|cell| !cell.in_bounds(dim)) {
            self.selection.clear();
        }
        self.recenter();
        self.status = match phase {
            GamePhase::InProgress => SessionStatus::Live,
            GamePhase::Concluded => SessionStatus::Concluded { winner },
        };
        info!(dim, players, status = self.status.label(), "snapshot_applied");
        self.request_redraw();
        Ok(())
    }

    /// Applies a batch in order. The first rejected entry desynchronises
    /// the session and the rest of the batch is dropped.
    pub fn apply_updates(&mut self, entries: &[UpdateEntry], now: Instant) -> Result<(), SessionError> {
        if matches!(self.status, SessionStatus::Desynchronized { .. }) {
            debug!(updates = entries.len(), "diffs_dropped_until_snapshot");
            return Ok(());
        }

        for entry in entries {
            match self.store.apply_diff(entry) {
                Ok(outcome) => self.animate(outcome, now),
                Err(err) => {
                    warn!(player = %entry.player, stat = %entry.stat, error = %err, "diff_rejected");
                    self.desynchronize(&err);
                    return Err(err.into());
                }
            }
        }

        self.revalidate_prompt();
        self.request_redraw();
        Ok(())
    }

    pub fn connection_lost(&mut self, reason: &str) {
        if matches!(
            self.status,
            SessionStatus::Failed { .. } | SessionStatus::Concluded { .. }
        ) {
            return;
        }
        warn!(reason, "connection_lost");
        self.cancel_pending_input();
        self.status = SessionStatus::Failed {
            reason: reason.to_string(),
        };
        self.push_notice(Notice::ConnectionLost);
        self.request_redraw();
    }

    /// Advances animations to `now`.
    pub fn frame(&mut self, now: Instant) -> LoopState {
        self.animations.update(now)
    }

    pub fn is_animating(&self) -> bool {
        self.animations.frame_loop().is_running()
    }

    /// Earliest pending click-disambiguation deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.action_clicks
            .iter()
            .filter_map(|(_, clicks)| clicks.deadline())
            .min()
    }

    /// Selects (or deselects) the cell under `point`. Returns false when
    /// the click was throttled or missed the grid.
    pub fn click_at(&mut self, point: Vec2, now: Instant) -> bool {
        if !self.click_throttle.accept(now) {
            debug!("click_throttled");
            return false;
        }
        let Some(dim) = self.store.state().map(|state| state.dim) else {
            return false;
        };
        let coord = self.camera.screen_to_grid(point);
        if !coord.in_bounds(dim) {
            return false;
        }

        self.cancel_pending_input();
        let selected = self.selection.toggle(coord);
        if let Some(target) = selected {
            self.aim_at(target, now);
        }
        debug!(cell = %coord, selected = selected.is_some(), "cell_clicked");
        self.request_redraw();
        true
    }

    pub fn clear_selection(&mut self) {
        if self.selection.cell().is_some() {
            self.selection.clear();
            self.cancel_pending_input();
            self.request_redraw();
        }
    }

    pub fn zoom_steps(&mut self, steps: i32) -> bool {
        let changed = self.camera.zoom_by(steps);
        if changed {
            debug!(zoom = self.camera.zoom(), "zoom_changed");
            self.request_redraw();
        }
        changed
    }

    pub fn zoom_in(&mut self) -> bool {
        self.zoom_steps(1)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.zoom_steps(-1)
    }

    pub fn reset_zoom(&mut self) {
        self.camera.reset_zoom();
        self.request_redraw();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
        self.request_redraw();
    }

    pub fn pointer_pressed(&mut self, pos: Vec2, clickable: bool) {
        self.drag.press(pos, clickable, &self.camera);
    }

    pub fn pointer_moved(&mut self, pos: Vec2) {
        if self.drag.moved(pos, &mut self.camera) {
            self.request_redraw();
        }
    }

    /// Returns true when the release resolved to an accepted click.
    pub fn pointer_released(&mut self, now: Instant) -> bool {
        match self.drag.release() {
            Some(pos) => self.click_at(pos, now),
            None => false,
        }
    }

    pub fn pointer_cancelled(&mut self) {
        self.drag.cancel();
    }

    pub fn touch_started(&mut self, id: TouchId, pos: Vec2) {
        self.touches.touch_started(id, pos, &self.camera);
    }

    pub fn touch_moved(&mut self, id: TouchId, pos: Vec2) {
        if self.touches.touch_moved(id, pos, &mut self.camera) {
            self.request_redraw();
        }
    }

    pub fn touch_ended(&mut self, id: TouchId, now: Instant) -> bool {
        match self.touches.touch_ended(id) {
            Some(pos) => self.click_at(pos, now),
            None => false,
        }
    }

    pub fn touch_cancelled(&mut self, id: TouchId) {
        if self.touches.touch_cancelled(id, &mut self.camera) {
            self.request_redraw();
        }
    }

    /// Centre of `player` on screen, following an in-flight move.
    pub fn visual_center(&self, player: &str) -> Option<Vec2> {
        let half = self.camera.cell_size() * 0.5;
        if let Some(top_left) = self.animations.position_of(player) {
            return Some(top_left + Vec2::new(half, half));
        }
        let pos = self.store.state()?.player(player)?.position?;
        Some(self.camera.cell_center(pos))
    }

    pub fn title(&self, base: &str) -> String {
        let mut title = base.to_string();
        match self.store.viewer_player() {
            Some(viewer) if viewer.is_alive() => title.push_str(&format!(
                " | {} | HP {} | AP {} | range {}",
                viewer.name, viewer.hp, viewer.ap, viewer.range
            )),
            Some(viewer) => {
                title.push_str(&format!(" | {} (out)", viewer.name));
                if let Some(target) = &viewer.vote {
                    title.push_str(&format!(" | voting for {target}"));
                }
            }
            None => title.push_str(" | spectating"),
        }
        match &self.status {
            SessionStatus::AwaitingSnapshot => title.push_str(" | waiting for game state"),
            SessionStatus::Concluded { winner: Some(winner) } => {
                title.push_str(&format!(" | winner: {winner}"))
            }
            SessionStatus::Concluded { winner: None } => title.push_str(" | game over"),
            SessionStatus::Live | SessionStatus::Desynchronized { .. } | SessionStatus::Failed { .. } => {}
        }
        if let Some(notice) = self.latest_notice() {
            title.push_str(&format!(" | {notice}"));
        }
        title
    }

    fn animate(&mut self, outcome: DiffOutcome, now: Instant) {
        match outcome {
            DiffOutcome::Moved {
                player,
                from: Some(from),
                to,
            } => self.animate_move(&player, from, to, now),
            DiffOutcome::Removed { player, .. } => {
                if self.animations.abandon_move(&player) {
                    debug!(player = %player, "move_abandoned");
                }
            }
            DiffOutcome::HpChanged { player, old, new } if new < old && new > 0 => {
                if let Some(at) = self.visual_center(&player) {
                    let direction = self.animations.angle_of(&player);
                    self.animations.spawn_shot(at, direction, now);
                }
            }
            DiffOutcome::Moved { from: None, .. }
            | DiffOutcome::HpChanged { .. }
            | DiffOutcome::Updated { .. } => {}
        }
    }

    /// Position tween between cell corners, track marks between cell
    /// centres, and a turret turn toward the direction of travel.
    fn animate_move(&mut self, player: &str, from: Coord, to: Coord, now: Instant) {
        let heading_there = self.move_targets.get(player) == Some(&to);
        if heading_there && self.animations.move_of(player).is_some() {
            return;
        }
        self.move_targets.insert(player.to_string(), to);
        let end = self.camera.grid_to_screen(to);
        let duration = self
            .settings
            .animation
            .move_duration(self.store.viewer() == Some(player));
        self.animations
            .start_move(player, self.camera.grid_to_screen(from), end, duration, now);
        self.animations.spawn_tracks(
            self.camera.cell_center(from),
            self.camera.cell_center(to),
            self.camera.cell_size(),
            now,
        );
        self.animations.start_rotation(player, from.angle_to(to), now);
    }

    /// Turns the viewer's turret toward `target` and, when another player
    /// sits there, that player's turret back toward the viewer.
    fn aim_at(&mut self, target: Coord, now: Instant) {
        let Some(state) = self.store.state() else {
            return;
        };
        let Some((viewer, viewer_pos)) = self
            .store
            .viewer_player()
            .filter(|player| player.is_alive())
            .and_then(|player| player.position.map(|pos| (player.name.clone(), pos)))
        else {
            return;
        };
        if target == viewer_pos {
            return;
        }
        let other = state
            .player_at(target)
            .filter(|player| player.name != viewer)
            .map(|player| player.name.clone());

        self.turn_turret(&viewer, viewer_pos.angle_to(target), now);
        if let Some(other) = other {
            self.turn_turret(&other, target.angle_to(viewer_pos), now);
        }
    }

    fn turn_turret(&mut self, entity: &str, angle: f32, now: Instant) {
        let current = self.animations.angle_at(entity, now);
        if normalize_angle(angle - current).abs() > self.settings.input.aim_threshold_rad {
            self.animations.start_rotation(entity, angle, now);
        }
    }

    fn recenter(&mut self) {
        let Some(state) = self.store.state() else {
            return;
        };
        let focus = self
            .store
            .viewer_player()
            .filter(|player| player.is_alive())
            .and_then(|player| player.position)
            .or_else(|| living_centroid(state))
            .unwrap_or_else(|| {
                let mid = (state.dim / 2) as i32;
                Coord::new(mid, mid)
            });
        self.camera.center_on(focus);
    }

    fn conclude(&mut self, winner: Option<String>) {
        info!(winner = winner.as_deref().unwrap_or("none"), "game_concluded");
        self.cancel_pending_input();
        self.status = SessionStatus::Concluded { winner };
        self.request_redraw();
    }

    fn desynchronize(&mut self, err: &StateError) {
        error!(error = %err, "state_desynchronized");
        self.cancel_pending_input();
        self.status = SessionStatus::Desynchronized {
            reason: err.to_string(),
        };
        self.push_notice(Notice::Desync(err.to_string()));
        self.request_redraw();
    }

    fn push_notice(&mut self, notice: Notice) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    fn cancel_pending_input(&mut self) {
        for (_, clicks) in &mut self.action_clicks {
            clicks.cancel();
        }
        self.prompt = None;
    }

    fn send(&mut self, message: ClientMessage) {
        info!(action = message.kind(), "action_queued");
        self.outbound.push_back(message);
        self.request_redraw();
    }

    fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }
}

fn living_centroid(state: &GameState) -> Option<Coord> {
    let (count, rows, cols) = state
        .positioned_players()
        .filter(|(player, _)| player.is_alive())
        .fold((0_i64, 0_i64, 0_i64), |(count, rows, cols), (_, pos)| {
            (count + 1, rows + i64::from(pos.r), cols + i64::from(pos.c))
        });
    if count == 0 {
        return None;
    }
    let mean = |sum: i64| (sum as f64 / count as f64).round() as i32;
    Some(Coord::new(mean(rows), mean(cols)))
}
