//! Local mirror of the authoritative game state.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::geometry::Coord;
use crate::grid::{Grid, GridError, OccupancyMap};
use crate::protocol::{GameStateDto, UpdateEntry};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("diff received before any game state snapshot")]
    NoSnapshot,
    #[error("diff references unknown player '{0}'")]
    UnknownPlayer(String),
    #[error("invalid value for {player}.{stat}: {reason}")]
    InvalidValue {
        player: String,
        stat: String,
        reason: String,
    },
    #[error("player '{player}' position {coord} is outside a {dim}x{dim} grid")]
    PositionOutOfBounds {
        player: String,
        coord: Coord,
        dim: usize,
    },
    #[error("player '{player}' cannot move to {coord}: occupied by '{occupant}'")]
    CellOccupied {
        player: String,
        coord: Coord,
        occupant: String,
    },
    #[error("snapshot occupancy at {coord} does not name player '{player}'")]
    SnapshotMismatch { player: String, coord: Coord },
    #[error(transparent)]
    Grid(#[from] GridError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub name: String,
    pub position: Option<Coord>,
    pub hp: i32,
    pub ap: i32,
    pub range: i32,
    pub vote: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

impl Player {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn in_range_of(&self, target: Coord) -> bool {
        match self.position {
            Some(pos) => i64::from(pos.chebyshev(target)) <= i64::from(self.range),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    InProgress,
    Concluded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub dim: usize,
    pub occupancy: OccupancyMap,
    pub players: BTreeMap<String, Player>,
    pub winner: Option<String>,
    pub phase: GamePhase,
}

impl GameState {
    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn player_at(&self, coord: Coord) -> Option<&Player> {
        self.occupancy
            .occupant(coord)
            .and_then(|name| self.players.get(name))
    }

    /// Positions of every player that still has a cell.
    pub fn positioned_players(&self) -> impl Iterator<Item = (&Player, Coord)> + '_ {
        self.players
            .values()
            .filter_map(|player| player.position.map(|pos| (player, pos)))
    }
}

/// What a single applied diff changed.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOutcome {
    Moved {
        player: String,
        from: Option<Coord>,
        to: Coord,
    },
    Removed {
        player: String,
        from: Option<Coord>,
    },
    HpChanged {
        player: String,
        old: i32,
        new: i32,
    },
    Updated {
        player: String,
        stat: String,
    },
}

#[derive(Debug, Default)]
pub struct StateStore {
    viewer: Option<String>,
    state: Option<GameState>,
    reachability: Option<Grid<Option<u32>>>,
}

impl StateStore {
    pub fn new(viewer: Option<String>) -> Self {
        Self {
            viewer,
            state: None,
            reachability: None,
        }
    }

    pub fn viewer(&self) -> Option<&str> {
        self.viewer.as_deref()
    }

    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn viewer_player(&self) -> Option<&Player> {
        let viewer = self.viewer.as_deref()?;
        self.state.as_ref()?.player(viewer)
    }

    /// Step counts from the viewer's cell, present while the viewer is alive
    /// and positioned.
    pub fn reachability(&self) -> Option<&Grid<Option<u32>>> {
        self.reachability.as_ref()
    }

    pub fn distance_to(&self, coord: Coord) -> Option<u32> {
        self.reachability
            .as_ref()
            .and_then(|grid| grid.get(coord).copied().flatten())
    }

    /// Replaces the mirror wholesale. On error the previous state is kept.
    pub fn apply_snapshot(&mut self, dto: GameStateDto) -> Result<&GameState, StateError> {
        let next = build_state(dto)?;
        debug!(
            dim = next.dim,
            players = next.players.len(),
            "snapshot_built"
        );
        self.state = Some(next);
        self.recompute_reachability();
        self.state.as_ref().ok_or(StateError::NoSnapshot)
    }

    pub fn apply_diff(&mut self, entry: &UpdateEntry) -> Result<DiffOutcome, StateError> {
        let state = self.state.as_mut().ok_or(StateError::NoSnapshot)?;
        let GameState {
            dim,
            occupancy,
            players,
            ..
        } = state;
        let player = players
            .get_mut(&entry.player)
            .ok_or_else(|| StateError::UnknownPlayer(entry.player.clone()))?;

        let outcome = match entry.stat.as_str() {
            "pos" => {
                let outcome = apply_position(player, occupancy, *dim, &entry.val)?;
                self.recompute_reachability();
                outcome
            }
            "hp" => {
                let new = int_value(entry)?;
                let old = std::mem::replace(&mut player.hp, new);
                self.recompute_reachability();
                DiffOutcome::HpChanged {
                    player: entry.player.clone(),
                    old,
                    new,
                }
            }
            "ap" => {
                player.ap = int_value(entry)?;
                updated(entry)
            }
            "range" => {
                player.range = int_value(entry)?;
                updated(entry)
            }
            "vote" => {
                player.vote = match &entry.val {
                    Value::Null => None,
                    Value::String(target) => Some(target.clone()),
                    other => return Err(invalid(entry, format!("expected name or null, got {other}"))),
                };
                updated(entry)
            }
            _ => {
                player.extra.insert(entry.stat.clone(), entry.val.clone());
                updated(entry)
            }
        };
        Ok(outcome)
    }

    /// Verifies that occupancy and player positions agree.
    pub fn check_consistency(&self) -> Result<(), StateError> {
        match self.state.as_ref() {
            Some(state) => verify_occupancy(&state.occupancy, &state.players),
            None => Ok(()),
        }
    }

    fn recompute_reachability(&mut self) {
        self.reachability = self.viewer_source().map(|(state, source)| {
            state.occupancy.distances_from(source)
        });
    }

    fn viewer_source(&self) -> Option<(&GameState, Coord)> {
        let state = self.state.as_ref()?;
        let viewer = state.player(self.viewer.as_deref()?)?;
        if !viewer.is_alive() {
            return None;
        }
        Some((state, viewer.position?))
    }
}

/// Occupancy and positions must describe the same placement in both
/// directions: every positioned player sits in its cell and every occupied
/// cell belongs to a player positioned exactly there.
fn verify_occupancy(
    occupancy: &OccupancyMap,
    players: &BTreeMap<String, Player>,
) -> Result<(), StateError> {
    for player in players.values() {
        if let Some(pos) = player.position {
            if occupancy.occupant(pos) != Some(player.name.as_str()) {
                return Err(StateError::SnapshotMismatch {
                    player: player.name.clone(),
                    coord: pos,
                });
            }
        }
    }
    for (coord, name) in occupancy.occupied_cells() {
        let placed = players
            .get(name)
            .is_some_and(|player| player.position == Some(coord));
        if !placed {
            return Err(StateError::SnapshotMismatch {
                player: name.to_string(),
                coord,
            });
        }
    }
    Ok(())
}

fn build_state(dto: GameStateDto) -> Result<GameState, StateError> {
    let dim = dto.dim;
    let grid_supplied = dto.grid.is_some();
    let mut occupancy = match &dto.grid {
        Some(raw) => OccupancyMap::deserialize(raw, dim)?,
        None => OccupancyMap::empty(dim),
    };

    let mut players = BTreeMap::new();
    for (name, raw) in dto.players {
        if let Some(pos) = raw.pos {
            if !pos.in_bounds(dim) {
                return Err(StateError::PositionOutOfBounds {
                    player: name,
                    coord: pos,
                    dim,
                });
            }
            if grid_supplied {
                if occupancy.occupant(pos) != Some(name.as_str()) {
                    return Err(StateError::SnapshotMismatch {
                        player: name,
                        coord: pos,
                    });
                }
            } else if let Some(occupant) = occupancy.occupant(pos) {
                return Err(StateError::CellOccupied {
                    player: name,
                    coord: pos,
                    occupant: occupant.to_string(),
                });
            } else {
                occupancy.place(pos, &name)?;
            }
        }
        players.insert(
            name.clone(),
            Player {
                name,
                position: raw.pos,
                hp: raw.hp,
                ap: raw.ap,
                range: raw.range,
                vote: raw.vote,
                extra: raw.extra,
            },
        );
    }

    verify_occupancy(&occupancy, &players)?;

    let concluded = dto.winner.is_some() || dto.phase.as_deref() == Some("post-game");
    Ok(GameState {
        dim,
        occupancy,
        players,
        winner: dto.winner,
        phase: if concluded {
            GamePhase::Concluded
        } else {
            GamePhase::InProgress
        },
    })
}

/// Clears the old cell before claiming the new one.
fn apply_position(
    player: &mut Player,
    occupancy: &mut OccupancyMap,
    dim: usize,
    val: &Value,
) -> Result<DiffOutcome, StateError> {
    if val.is_null() {
        let from = player.position.take();
        if let Some(old) = from {
            if occupancy.occupant(old) == Some(player.name.as_str()) {
                occupancy.clear(old)?;
            }
        }
        return Ok(DiffOutcome::Removed {
            player: player.name.clone(),
            from,
        });
    }

    let to: Coord = serde_json::from_value(val.clone()).map_err(|error| StateError::InvalidValue {
        player: player.name.clone(),
        stat: "pos".to_string(),
        reason: error.to_string(),
    })?;
    if !to.in_bounds(dim) {
        return Err(StateError::PositionOutOfBounds {
            player: player.name.clone(),
            coord: to,
            dim,
        });
    }
    if let Some(occupant) = occupancy.occupant(to) {
        if occupant != player.name {
            return Err(StateError::CellOccupied {
                player: player.name.clone(),
                coord: to,
                occupant: occupant.to_string(),
            });
        }
    }

    let from = player.position;
    if let Some(old) = from {
        if occupancy.occupant(old) == Some(player.name.as_str()) {
            occupancy.clear(old)?;
        }
    }
    player.position = Some(to);
    occupancy.place(to, &player.name)?;
    Ok(DiffOutcome::Moved {
        player: player.name.clone(),
        from,
        to,
    })
}

fn int_value(entry: &UpdateEntry) -> Result<i32, StateError> {
    let raw = entry.val.as_i64().or_else(|| {
        entry
            .val
            .as_f64()
            .filter(|value| value.fract() == 0.0)
            .map(|value| value as i64)
    });
    let raw = raw.ok_or_else(|| invalid(entry, format!("expected integer, got {}", entry.val)))?;
    i32::try_from(raw).map_err(|_| invalid(entry, format!("{raw} does not fit in i32")))
}

fn invalid(entry: &UpdateEntry, reason: String) -> StateError {
    StateError::InvalidValue {
        player: entry.player.clone(),
        stat: entry.stat.clone(),
        reason,
    }
}

fn updated(entry: &UpdateEntry) -> DiffOutcome {
    DiffOutcome::Updated {
        player: entry.player.clone(),
        stat: entry.stat.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn snapshot(value: Value) -> GameStateDto {
        serde_json::from_value(value).expect("snapshot dto")
    }

    fn entry(player: &str, stat: &str, val: Value) -> UpdateEntry {
        UpdateEntry {
            player: player.to_string(),
            stat: stat.to_string(),
            val,
        }
    }

    fn store_with_a_and_b() -> StateStore {
        let mut store = StateStore::new(Some("A".to_string()));
        store
            .apply_snapshot(snapshot(json!({
                "dim": 4,
                "players": {
                    "A": { "pos": "1,1", "hp": 10, "ap": 3, "range": 2 },
                    "B": { "pos": "3,3", "hp": 5, "ap": 1, "range": 1 }
                }
            })))
            .expect("snapshot");
        store
    }

    #[test]
    fn snapshot_builds_occupancy_from_positions_when_grid_missing() {
        let store = store_with_a_and_b();
        let state = store.state().expect("state");
        assert_eq!(state.dim, 4);
        assert_eq!(state.occupancy.occupant(Coord::new(1, 1)), Some("A"));
        assert_eq!(state.occupancy.occupant(Coord::new(3, 3)), Some("B"));
        assert_eq!(state.phase, GamePhase::InProgress);
        assert!(store.check_consistency().is_ok());
    }

    #[test]
    fn snapshot_with_grid_must_agree_with_positions() {
        let mut store = StateStore::new(None);
        let result = store.apply_snapshot(snapshot(json!({
            "dim": 2,
            "grid": [[null, "A"], [null, null]],
            "players": { "A": { "pos": "1,0", "hp": 1 } }
        })));
        assert_eq!(
            result.map(|_| ()),
            Err(StateError::SnapshotMismatch {
                player: "A".to_string(),
                coord: Coord::new(1, 0)
            })
        );
        assert!(store.state().is_none());
    }

    #[test]
    fn snapshot_grid_with_stray_occupants_is_rejected() {
        for (grid, stray, coord) in [
            (json!([["A", "B"], [null, "A"]]), "A", Coord::new(1, 1)),
            (json!([["A", "B"], ["Z", null]]), "Z", Coord::new(1, 0)),
        ] {
            let mut store = StateStore::new(Some("B".to_string()));
            let result = store.apply_snapshot(snapshot(json!({
                "dim": 2,
                "grid": grid,
                "players": {
                    "A": { "pos": "0,0", "hp": 1 },
                    "B": { "pos": "0,1", "hp": 1, "ap": 2 }
                }
            })));
            assert_eq!(
                result.map(|_| ()),
                Err(StateError::SnapshotMismatch {
                    player: stray.to_string(),
                    coord,
                })
            );
            assert!(store.state().is_none());
        }
    }

    #[test]
    fn grid_naming_an_unpositioned_player_is_rejected() {
        let mut store = StateStore::new(None);
        let result = store.apply_snapshot(snapshot(json!({
            "dim": 2,
            "grid": [[null, null], [null, "A"]],
            "players": { "A": { "pos": null, "hp": 0 } }
        })));
        assert!(matches!(result, Err(StateError::SnapshotMismatch { .. })));
    }

    #[test]
    fn failed_snapshot_keeps_previous_state() {
        let mut store = store_with_a_and_b();
        let result = store.apply_snapshot(snapshot(json!({
            "dim": 2,
            "players": { "A": { "pos": "5,5", "hp": 1 } }
        })));
        assert!(matches!(result, Err(StateError::PositionOutOfBounds { .. })));
        assert_eq!(store.state().expect("state").dim, 4);
    }

    #[test]
    fn position_diff_moves_occupancy() {
        let mut store = store_with_a_and_b();
        let outcome = store
            .apply_diff(&entry("A", "pos", json!("2,1")))
            .expect("move");

        assert_eq!(
            outcome,
            DiffOutcome::Moved {
                player: "A".to_string(),
                from: Some(Coord::new(1, 1)),
                to: Coord::new(2, 1)
            }
        );
        let state = store.state().expect("state");
        assert_eq!(state.occupancy.occupant(Coord::new(1, 1)), None);
        assert_eq!(state.occupancy.occupant(Coord::new(2, 1)), Some("A"));
        assert_eq!(
            state.player("A").expect("A").position,
            Some(Coord::new(2, 1))
        );
        assert!(store.check_consistency().is_ok());
    }

    #[test]
    fn null_position_removes_player_from_grid() {
        let mut store = store_with_a_and_b();
        store
            .apply_diff(&entry("A", "pos", json!("2,1")))
            .expect("move");
        let outcome = store
            .apply_diff(&entry("A", "pos", Value::Null))
            .expect("remove");

        assert_eq!(
            outcome,
            DiffOutcome::Removed {
                player: "A".to_string(),
                from: Some(Coord::new(2, 1))
            }
        );
        let state = store.state().expect("state");
        assert_eq!(state.occupancy.occupant(Coord::new(2, 1)), None);
        assert_eq!(state.player("A").expect("A").position, None);
        assert!(store.reachability().is_none());
    }

    #[test]
    fn move_onto_another_player_is_rejected_without_mutation() {
        let mut store = store_with_a_and_b();
        let result = store.apply_diff(&entry("A", "pos", json!({ "r": 3, "c": 3 })));
        assert_eq!(
            result,
            Err(StateError::CellOccupied {
                player: "A".to_string(),
                coord: Coord::new(3, 3),
                occupant: "B".to_string()
            })
        );
        let state = store.state().expect("state");
        assert_eq!(state.occupancy.occupant(Coord::new(1, 1)), Some("A"));
        assert_eq!(state.occupancy.occupant(Coord::new(3, 3)), Some("B"));
    }

    #[test]
    fn unknown_player_and_missing_snapshot_are_errors() {
        let mut empty = StateStore::new(None);
        assert_eq!(
            empty.apply_diff(&entry("A", "hp", json!(1))),
            Err(StateError::NoSnapshot)
        );

        let mut store = store_with_a_and_b();
        assert_eq!(
            store.apply_diff(&entry("Z", "hp", json!(1))),
            Err(StateError::UnknownPlayer("Z".to_string()))
        );
    }

    #[test]
    fn scalar_diffs_overwrite_attributes() {
        let mut store = store_with_a_and_b();
        let hp = store.apply_diff(&entry("B", "hp", json!(2))).expect("hp");
        assert_eq!(
            hp,
            DiffOutcome::HpChanged {
                player: "B".to_string(),
                old: 5,
                new: 2
            }
        );
        store.apply_diff(&entry("A", "ap", json!(7))).expect("ap");
        store.apply_diff(&entry("A", "range", json!(3.0))).expect("range");
        store.apply_diff(&entry("A", "vote", json!("B"))).expect("vote");
        store.apply_diff(&entry("A", "kills", json!(4))).expect("extra");

        let a = store.state().expect("state").player("A").expect("A").clone();
        assert_eq!(a.ap, 7);
        assert_eq!(a.range, 3);
        assert_eq!(a.vote.as_deref(), Some("B"));
        assert_eq!(a.extra.get("kills"), Some(&json!(4)));

        store.apply_diff(&entry("A", "vote", Value::Null)).expect("clear vote");
        assert_eq!(store.viewer_player().expect("A").vote, None);
        assert!(matches!(
            store.apply_diff(&entry("A", "ap", json!("lots"))),
            Err(StateError::InvalidValue { .. })
        ));
    }

    #[test]
    fn reachability_tracks_viewer_moves() {
        let mut store = store_with_a_and_b();
        assert_eq!(store.distance_to(Coord::new(1, 3)), Some(2));

        store
            .apply_diff(&entry("A", "pos", json!("1,3")))
            .expect("move");
        assert_eq!(store.distance_to(Coord::new(1, 3)), Some(0));
        assert_eq!(store.distance_to(Coord::new(3, 3)), None);
        assert_eq!(store.distance_to(Coord::new(0, 0)), Some(4));
    }

    #[test]
    fn fatal_hp_diff_clears_viewer_reachability() {
        let mut store = store_with_a_and_b();
        assert!(store.reachability().is_some());
        store.apply_diff(&entry("A", "hp", json!(0))).expect("hp");
        assert!(store.reachability().is_none());
        assert_eq!(store.distance_to(Coord::new(1, 1)), None);
    }

    #[test]
    fn dead_viewer_has_no_reachability() {
        let mut store = store_with_a_and_b();
        store.apply_diff(&entry("A", "hp", json!(0))).expect("hp");
        store
            .apply_diff(&entry("B", "pos", json!("3,2")))
            .expect("move B");
        assert!(store.reachability().is_none());
    }

    #[test]
    fn winner_or_post_game_phase_concludes() {
        let mut store = StateStore::new(None);
        store
            .apply_snapshot(snapshot(json!({ "dim": 1, "players": {}, "phase": "post-game" })))
            .expect("snapshot");
        assert_eq!(store.state().expect("state").phase, GamePhase::Concluded);

        store
            .apply_snapshot(snapshot(json!({ "dim": 1, "players": {}, "winner": "A" })))
            .expect("snapshot");
        assert_eq!(store.state().expect("state").phase, GamePhase::Concluded);
    }

    #[test]
    fn range_check_is_square() {
        let store = store_with_a_and_b();
        let a = store.viewer_player().expect("A");
        assert!(a.in_range_of(Coord::new(3, 3)));
        assert!(!a.in_range_of(Coord::new(1, 4)));
    }
}
