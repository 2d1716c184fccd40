//! Everything a renderer needs for one frame, resolved to screen space.

use std::time::Instant;

use crate::animation::{fade_opacity, shot_scale};
use crate::geometry::{Coord, Vec2};
use crate::session::{ActionKind, GameSession, SessionStatus, CONNECTION_LOST_NOTICE};
use crate::state::Player;

#[derive(Debug, Clone, PartialEq)]
pub struct TankView {
    pub name: String,
    pub top_left: Vec2,
    pub turret_angle: f32,
    pub hp: i32,
    pub ap: i32,
    pub range: i32,
    pub is_viewer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackView {
    pub center: Vec2,
    pub angle: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotView {
    pub center: Vec2,
    pub direction: f32,
    pub scale: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptView {
    pub action: ActionKind,
    pub text: String,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    pub viewport: Vec2,
    pub origin: Vec2,
    pub cell_size: f32,
    pub dim: usize,
    /// Empty cells the viewer can move to this turn.
    pub reachable: Vec<Coord>,
    pub viewer_range: Vec<Coord>,
    pub target_range: Vec<Coord>,
    pub selected: Option<Coord>,
    pub tanks: Vec<TankView>,
    pub tracks: Vec<TrackView>,
    pub shots: Vec<ShotView>,
    pub prompt: Option<PromptView>,
    pub banner: Option<String>,
}

impl FrameView {
    pub fn capture(session: &GameSession, now: Instant) -> Self {
        let camera = session.camera();
        let animations = session.animations();
        let mut view = FrameView {
            viewport: camera.viewport(),
            origin: camera.origin(),
            cell_size: camera.cell_size(),
            dim: 0,
            reachable: Vec::new(),
            viewer_range: Vec::new(),
            target_range: Vec::new(),
            selected: session.selection(),
            tanks: Vec::new(),
            tracks: Vec::new(),
            shots: Vec::new(),
            prompt: session.prompt().map(|(action, prompt)| PromptView {
                action,
                text: prompt.text().to_string(),
                max: prompt.max(),
            }),
            banner: banner(session),
        };

        let tracks = animations.tracks();
        view.tracks = tracks
            .iter()
            .map(|mark| TrackView {
                center: mark.position,
                angle: mark.angle,
                opacity: fade_opacity(tracks.age_fraction(mark, now)),
            })
            .collect();
        let shots = animations.shots();
        view.shots = shots
            .iter()
            .map(|shot| {
                let age = shots.age_fraction(shot, now);
                ShotView {
                    center: shot.position,
                    direction: shot.direction,
                    scale: shot_scale(age),
                    opacity: fade_opacity(age),
                }
            })
            .collect();

        let Some(state) = session.state() else {
            return view;
        };
        view.dim = state.dim;

        let viewer = session
            .store()
            .viewer_player()
            .filter(|player| player.is_alive());
        if let Some(viewer) = viewer {
            if *session.status() == SessionStatus::Live {
                if let Some(reach) = session.store().reachability() {
                    view.reachable = reach
                        .iter()
                        .filter_map(|(coord, steps)| match *steps {
                            Some(steps) if steps > 0 && i64::from(steps) <= i64::from(viewer.ap) => {
                                Some(coord)
                            }
                            _ => None,
                        })
                        .collect();
                }
            }
            view.viewer_range = range_cells(viewer, state.dim);
        }
        if let Some(target) = session
            .selection()
            .and_then(|cell| state.player_at(cell))
            .filter(|player| Some(player.name.as_str()) != session.viewer())
        {
            view.target_range = range_cells(target, state.dim);
        }

        view.tanks = state
            .positioned_players()
            .map(|(player, pos)| TankView {
                name: player.name.clone(),
                top_left: animations
                    .move_of(&player.name)
                    .map_or_else(|| camera.grid_to_screen(pos), |tween| tween.sample(now)),
                turret_angle: animations.angle_at(&player.name, now),
                hp: player.hp,
                ap: player.ap,
                range: player.range,
                is_viewer: session.viewer() == Some(player.name.as_str()),
            })
            .collect();
        view
    }

    pub fn tank(&self, name: &str) -> Option<&TankView> {
        self.tanks.iter().find(|tank| tank.name == name)
    }
}

/// In-bounds cells within Chebyshev `range` of `player`, its own cell
/// excluded.
fn range_cells(player: &Player, dim: usize) -> Vec<Coord> {
    let Some(pos) = player.position else {
        return Vec::new();
    };
    if player.range < 0 || dim == 0 {
        return Vec::new();
    }
    let reach = i64::from(player.range);
    let last = (dim as i64 - 1).min(i64::from(i32::MAX));
    let span = |center: i32| {
        let center = i64::from(center);
        ((center - reach).max(0), (center + reach).min(last))
    };
    let (rows, cols) = (span(pos.r), span(pos.c));

    let mut cells = Vec::new();
    for r in rows.0..=rows.1 {
        for c in cols.0..=cols.1 {
            let cell = Coord::new(r as i32, c as i32);
            if cell != pos {
                cells.push(cell);
            }
        }
    }
    cells
}

fn banner(session: &GameSession) -> Option<String> {
    match session.status() {
        SessionStatus::AwaitingSnapshot => Some("Waiting for game state".to_string()),
        SessionStatus::Failed { .. } => Some(CONNECTION_LOST_NOTICE.to_string()),
        SessionStatus::Desynchronized { reason } => Some(format!("Out of sync: {reason}")),
        SessionStatus::Concluded { winner: Some(winner) } => Some(format!("{winner} wins")),
        SessionStatus::Concluded { winner: None } => Some("Game over".to_string()),
        SessionStatus::Live => {
            let viewer = session.store().viewer_player()?;
            if viewer.is_alive() {
                return None;
            }
            Some(match &viewer.vote {
                Some(target) => format!("You are out. Voting for {target}"),
                None => "You are out. Select a tank to vote".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::session::tests::{live_session, ms, updates_text};

    #[test]
    fn live_view_marks_reach_and_ranges() {
        let t0 = Instant::now();
        let mut session = live_session(
            "A",
            json!({
                "A": { "pos": "0,0", "hp": 10, "ap": 1, "range": 1 },
                "B": { "pos": "2,2", "hp": 10, "ap": 1, "range": 1 }
            }),
            t0,
        );
        session.click_at(Vec2::new(250.0, 250.0), t0);

        let view = FrameView::capture(&session, t0);
        assert_eq!(view.dim, 4);
        let mut reachable = view.reachable.clone();
        reachable.sort_by_key(|coord| (coord.r, coord.c));
        assert_eq!(reachable, vec![Coord::new(0, 1), Coord::new(1, 0)]);
        assert_eq!(view.viewer_range.len(), 3);
        assert_eq!(view.target_range.len(), 8);
        assert_eq!(view.selected, Some(Coord::new(2, 2)));
        assert!(view.banner.is_none());
        assert!(view.tank("A").expect("A").is_viewer);
    }

    #[test]
    fn huge_range_is_clamped_to_the_grid() {
        let t0 = Instant::now();
        let session = live_session(
            "A",
            json!({ "A": { "pos": "3,0", "hp": 10, "ap": 1, "range": i32::MAX } }),
            t0,
        );
        let view = FrameView::capture(&session, t0);
        assert_eq!(view.viewer_range.len(), 15);
        assert!(view.viewer_range.iter().all(|cell| cell.in_bounds(4)));
        assert!(!view.viewer_range.contains(&Coord::new(3, 0)));
    }

    #[test]
    fn tanks_follow_tweens_and_effects_fade() {
        let t0 = Instant::now();
        let mut session = live_session(
            "A",
            json!({ "A": { "pos": "0,0", "hp": 10, "ap": 3, "range": 1 } }),
            t0,
        );
        session
            .handle_server_text(
                &updates_text(json!([{ "player": "A", "stat": "pos", "val": "0,2" }])),
                t0,
            )
            .expect("move");

        let view = FrameView::capture(&session, t0 + ms(400));
        let tank = view.tank("A").expect("A");
        assert!((tank.top_left.x - 100.0).abs() < 1e-3);
        assert!((tank.turret_angle - 0.0).abs() < 1e-6);
        assert!(!view.tracks.is_empty());
        assert!(view
            .tracks
            .iter()
            .all(|track| (track.opacity - 0.92).abs() < 1e-3));
    }

    #[test]
    fn dead_viewer_gets_vote_banner() {
        let t0 = Instant::now();
        let session = live_session(
            "A",
            json!({
                "A": { "pos": null, "hp": 0, "ap": 0, "range": 1, "vote": "B" },
                "B": { "pos": "1,1", "hp": 5, "ap": 1, "range": 1 }
            }),
            t0,
        );
        let view = FrameView::capture(&session, t0);
        assert_eq!(view.banner.as_deref(), Some("You are out. Voting for B"));
        assert!(view.reachable.is_empty());
        assert!(view.viewer_range.is_empty());
        assert_eq!(view.tanks.len(), 1);
    }
}
