use std::time::Instant;

use tracing::{debug, info};

use super::{GameSession, SessionStatus};
use crate::geometry::Coord;
use crate::input::{ClickIntent, QuantityPrompt};
use crate::protocol::ClientMessage;
use crate::state::{GameState, Player};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Move,
    Attack,
    Give,
    Upgrade,
    Vote,
}

impl ActionKind {
    /// Actions that carry an amount and take single/double presses.
    pub const QUANTIFIED: [ActionKind; 3] = [ActionKind::Attack, ActionKind::Give, ActionKind::Upgrade];

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Attack => "attack",
            ActionKind::Give => "give",
            ActionKind::Upgrade => "upgrade",
            ActionKind::Vote => "vote",
        }
    }
}

/// Which actions the current selection allows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionAvailability {
    pub move_here: bool,
    pub attack: bool,
    pub give: bool,
    pub upgrade: bool,
    pub vote: bool,
    /// Voting again for the current vote target withdraws the vote.
    pub vote_clears: bool,
}

impl ActionAvailability {
    pub fn allows(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Move => self.move_here,
            ActionKind::Attack => self.attack,
            ActionKind::Give => self.give,
            ActionKind::Upgrade => self.upgrade,
            ActionKind::Vote => self.vote,
        }
    }
}

fn evaluate(
    state: &GameState,
    viewer: &Player,
    cell: Coord,
    distance: Option<u32>,
) -> ActionAvailability {
    let occupant = state.occupancy.occupant(cell);
    let is_self = occupant == Some(viewer.name.as_str());
    let other = occupant.filter(|name| *name != viewer.name);
    let acting = viewer.is_alive() && viewer.position.is_some();
    let can_hit = acting && other.is_some() && viewer.in_range_of(cell) && viewer.ap >= 1;
    let voting = !viewer.is_alive() && other.is_some();

    ActionAvailability {
        move_here: acting
            && occupant.is_none()
            && distance.is_some_and(|steps| steps > 0 && i64::from(steps) <= i64::from(viewer.ap)),
        attack: can_hit,
        give: can_hit,
        upgrade: acting && is_self && viewer.ap >= 2,
        vote: voting,
        vote_clears: voting && viewer.vote.as_deref() == other,
    }
}

struct ActionContext {
    viewer: String,
    viewer_pos: Option<Coord>,
    cell: Coord,
    occupant: Option<String>,
}

impl GameSession {
    pub fn available_actions(&self) -> ActionAvailability {
        if self.status != SessionStatus::Live {
            return ActionAvailability::default();
        }
        let (Some(state), Some(viewer), Some(cell)) = (
            self.store.state(),
            self.store.viewer_player(),
            self.selection.cell(),
        ) else {
            return ActionAvailability::default();
        };
        evaluate(state, viewer, cell, self.store.distance_to(cell))
    }

    /// Largest amount the viewer can currently spend on `kind`.
    pub fn max_amount(&self, kind: ActionKind) -> u32 {
        let ap = self
            .store
            .viewer_player()
            .map_or(0, |viewer| u32::try_from(viewer.ap).unwrap_or(0));
        match kind {
            ActionKind::Attack | ActionKind::Give => ap,
            ActionKind::Upgrade => ap / 2,
            ActionKind::Move | ActionKind::Vote => 0,
        }
    }

    /// Handles a press of an action control. Move and vote act at once;
    /// amount-taking actions wait to see whether a second press follows.
    /// Returns false when the press was refused.
    pub fn press_action(&mut self, kind: ActionKind, now: Instant) -> bool {
        match kind {
            ActionKind::Move => self.perform_move(now),
            ActionKind::Vote => self.perform_vote(),
            ActionKind::Attack | ActionKind::Give | ActionKind::Upgrade => {
                if !self.available_actions().allows(kind) {
                    debug!(action = kind.label(), "action_unavailable");
                    return false;
                }
                let Some(clicks) = self
                    .action_clicks
                    .iter_mut()
                    .find(|(candidate, _)| *candidate == kind)
                    .map(|(_, clicks)| clicks)
                else {
                    return false;
                };
                match clicks.press(now) {
                    None => true,
                    Some(ClickIntent::Double) => self.open_prompt(kind),
                    Some(ClickIntent::Single) => self.perform(kind, 1, now),
                }
            }
        }
    }

    /// Releases single presses whose double-press window has closed.
    /// Returns the number of actions performed.
    pub fn poll_timers(&mut self, now: Instant) -> usize {
        let due: Vec<ActionKind> = self
            .action_clicks
            .iter_mut()
            .filter_map(|(kind, clicks)| (clicks.poll(now) == Some(ClickIntent::Single)).then_some(*kind))
            .collect();
        due.into_iter()
            .filter(|kind| self.perform(*kind, 1, now))
            .count()
    }

    pub fn prompt_digit(&mut self, digit: u8) {
        if let Some((_, prompt)) = self.prompt.as_mut() {
            prompt.push_digit(digit);
            self.request_redraw();
        }
    }

    pub fn prompt_backspace(&mut self) {
        if let Some((_, prompt)) = self.prompt.as_mut() {
            prompt.backspace();
            self.request_redraw();
        }
    }

    pub fn cancel_prompt(&mut self) -> bool {
        let open = self.prompt.take().is_some();
        if open {
            self.request_redraw();
        }
        open
    }

    /// Performs the prompted action with the entered amount. An amount
    /// outside `1..=max` keeps the prompt open.
    pub fn submit_prompt(&mut self, now: Instant) -> bool {
        let Some((kind, amount)) = self
            .prompt
            .as_ref()
            .map(|(kind, prompt)| (*kind, prompt.amount()))
        else {
            return false;
        };
        let Some(amount) = amount else {
            debug!(action = kind.label(), "quantity_rejected");
            return false;
        };
        self.prompt = None;
        self.request_redraw();
        self.perform(kind, amount, now)
    }

    /// Closes the prompt when its action stopped being available.
    pub(super) fn revalidate_prompt(&mut self) {
        let Some(kind) = self.prompt.as_ref().map(|(kind, _)| *kind) else {
            return;
        };
        if !self.available_actions().allows(kind) {
            debug!(action = kind.label(), "quantity_prompt_closed");
            self.prompt = None;
        }
    }

    fn open_prompt(&mut self, kind: ActionKind) -> bool {
        let max = self.max_amount(kind);
        if max == 0 {
            return false;
        }
        debug!(action = kind.label(), max, "quantity_prompt_opened");
        self.prompt = Some((kind, QuantityPrompt::new(max)));
        self.request_redraw();
        true
    }

    fn action_context(&self) -> Option<ActionContext> {
        let viewer = self.store.viewer_player()?;
        let cell = self.selection.cell()?;
        let occupant = self
            .store
            .state()?
            .occupancy
            .occupant(cell)
            .map(str::to_string);
        Some(ActionContext {
            viewer: viewer.name.clone(),
            viewer_pos: viewer.position,
            cell,
            occupant,
        })
    }

    fn perform(&mut self, kind: ActionKind, amount: u32, now: Instant) -> bool {
        if !self.available_actions().allows(kind) || amount == 0 || amount > self.max_amount(kind) {
            debug!(action = kind.label(), amount, "action_precondition_failed");
            return false;
        }
        let Some(ActionContext {
            viewer,
            viewer_pos: Some(viewer_pos),
            cell,
            occupant,
        }) = self.action_context()
        else {
            return false;
        };

        let message = match (kind, occupant) {
            (ActionKind::Attack, Some(patient)) => {
                let angle = viewer_pos.angle_to(cell);
                let muzzle = self
                    .visual_center(&viewer)
                    .unwrap_or_else(|| self.camera.cell_center(viewer_pos));
                self.animations.start_rotation(&viewer, angle, now);
                self.animations.spawn_shot(muzzle, angle, now);
                ClientMessage::Attack { patient, amount }
            }
            (ActionKind::Give, Some(patient)) => {
                self.animations
                    .start_rotation(&viewer, viewer_pos.angle_to(cell), now);
                self.animations
                    .start_rotation(&patient, cell.angle_to(viewer_pos), now);
                ClientMessage::Give { patient, amount }
            }
            (ActionKind::Upgrade, _) => ClientMessage::Upgrade { amount },
            _ => return false,
        };
        self.send(message);
        true
    }

    fn perform_move(&mut self, now: Instant) -> bool {
        if !self.available_actions().move_here {
            debug!(action = "move", "action_precondition_failed");
            return false;
        }
        let Some(ActionContext {
            viewer,
            viewer_pos: Some(from),
            cell,
            ..
        }) = self.action_context()
        else {
            return false;
        };
        self.animate_move(&viewer, from, cell, now);
        self.send(ClientMessage::Move { coord: cell });
        true
    }

    fn perform_vote(&mut self) -> bool {
        let availability = self.available_actions();
        if !availability.vote {
            debug!(action = "vote", "action_precondition_failed");
            return false;
        }
        let Some(context) = self.action_context() else {
            return false;
        };
        let patient = if availability.vote_clears {
            None
        } else {
            context.occupant
        };
        info!(patient = patient.as_deref().unwrap_or("none"), "vote_cast");
        self.send(ClientMessage::Vote { patient });
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::super::tests::{live_session, ms, updates_text};
    use super::*;
    use crate::geometry::Vec2;

    fn duel() -> Value {
        json!({
            "A": { "pos": "1,1", "hp": 10, "ap": 4, "range": 2 },
            "B": { "pos": "1,3", "hp": 10, "ap": 2, "range": 2 },
            "C": { "pos": "3,3", "hp": 10, "ap": 2, "range": 1 }
        })
    }

    fn select(session: &mut GameSession, coord: Coord, now: Instant) {
        let center = session.camera().cell_center(coord);
        assert!(session.click_at(center, now), "click on {coord}");
    }

    #[test]
    fn single_press_attacks_for_one_after_window() {
        let t0 = Instant::now();
        let mut session = live_session("A", duel(), t0);
        select(&mut session, Coord::new(1, 3), t0);

        assert!(session.press_action(ActionKind::Attack, t0 + ms(10)));
        assert_eq!(session.poll_timers(t0 + ms(100)), 0);
        assert!(session.take_outbound().is_empty());
        assert_eq!(session.next_deadline(), Some(t0 + ms(260)));

        assert_eq!(session.poll_timers(t0 + ms(260)), 1);
        assert_eq!(
            session.take_outbound(),
            vec![ClientMessage::Attack {
                patient: "B".to_string(),
                amount: 1
            }]
        );
        assert_eq!(session.animations().shots().len(), 1);
        assert_eq!(session.animations().rotation_of("A").expect("aim").target, 0.0);
    }

    #[test]
    fn double_press_opens_bounded_prompt() {
        let t0 = Instant::now();
        let mut session = live_session("A", duel(), t0);
        select(&mut session, Coord::new(1, 3), t0);

        session.press_action(ActionKind::Give, t0 + ms(10));
        assert!(session.press_action(ActionKind::Give, t0 + ms(120)));
        let (kind, prompt) = session.prompt().expect("prompt");
        assert_eq!(kind, ActionKind::Give);
        assert_eq!(prompt.max(), 4);
        assert_eq!(session.poll_timers(t0 + ms(500)), 0);

        session.prompt_digit(7);
        assert!(!session.submit_prompt(t0 + ms(600)));
        assert!(session.prompt().is_some());
        session.prompt_backspace();
        session.prompt_digit(3);
        assert!(session.submit_prompt(t0 + ms(700)));
        assert!(session.prompt().is_none());
        assert_eq!(
            session.take_outbound(),
            vec![ClientMessage::Give {
                patient: "B".to_string(),
                amount: 3
            }]
        );
        assert!(session.animations().rotation_of("B").is_some());
    }

    #[test]
    fn out_of_range_target_sends_nothing() {
        let t0 = Instant::now();
        let mut session = live_session(
            "A",
            json!({
                "A": { "pos": "0,0", "hp": 10, "ap": 4, "range": 1 },
                "B": { "pos": "3,3", "hp": 10, "ap": 2, "range": 2 }
            }),
            t0,
        );
        select(&mut session, Coord::new(3, 3), t0);
        assert!(!session.press_action(ActionKind::Attack, t0));
        assert_eq!(session.poll_timers(t0 + ms(1_000)), 0);
        assert!(session.take_outbound().is_empty());
    }

    #[test]
    fn spent_action_points_block_at_send_time() {
        let t0 = Instant::now();
        let mut session = live_session("A", duel(), t0);
        select(&mut session, Coord::new(1, 3), t0);
        assert!(session.press_action(ActionKind::Attack, t0));
        session
            .handle_server_text(
                &updates_text(json!([{ "player": "A", "stat": "ap", "val": 0 }])),
                t0 + ms(50),
            )
            .expect("ap diff");
        assert_eq!(session.poll_timers(t0 + ms(300)), 0);
        assert!(session.take_outbound().is_empty());
    }

    #[test]
    fn move_requires_reachable_empty_cell_within_action_points() {
        let t0 = Instant::now();
        let mut session = live_session(
            "A",
            json!({
                "A": { "pos": "0,0", "hp": 10, "ap": 2, "range": 1 },
                "B": { "pos": "0,1", "hp": 10, "ap": 2, "range": 1 }
            }),
            t0,
        );
        select(&mut session, Coord::new(0, 2), t0);
        assert!(!session.available_actions().move_here);
        assert!(!session.press_action(ActionKind::Move, t0));

        select(&mut session, Coord::new(2, 0), t0 + ms(200));
        assert!(session.available_actions().move_here);
        assert!(session.press_action(ActionKind::Move, t0 + ms(200)));
        assert_eq!(
            session.take_outbound(),
            vec![ClientMessage::Move {
                coord: Coord::new(2, 0)
            }]
        );
        let tween = session.animations().move_of("A").expect("optimistic move");
        assert_eq!(tween.end, Vec2::new(0.0, 200.0));

        session
            .handle_server_text(
                &updates_text(json!([{ "player": "A", "stat": "pos", "val": "2,0" }])),
                t0 + ms(300),
            )
            .expect("confirmation");
        let tween = session.animations().move_of("A").expect("still moving");
        assert_eq!(tween.started_at, t0 + ms(200));
    }

    #[test]
    fn confirmation_after_zoom_keeps_the_optimistic_tween() {
        let t0 = Instant::now();
        let mut session = live_session(
            "A",
            json!({ "A": { "pos": "0,0", "hp": 10, "ap": 2, "range": 1 } }),
            t0,
        );
        select(&mut session, Coord::new(1, 0), t0);
        assert!(session.press_action(ActionKind::Move, t0));
        let before = *session.animations().move_of("A").expect("optimistic move");

        assert!(session.zoom_in());
        assert_ne!(session.camera().grid_to_screen(Coord::new(1, 0)), before.end);
        session
            .handle_server_text(
                &updates_text(json!([{ "player": "A", "stat": "pos", "val": "1,0" }])),
                t0 + ms(100),
            )
            .expect("confirmation");

        let tween = session.animations().move_of("A").expect("still moving");
        assert_eq!(tween.started_at, before.started_at);
        assert_eq!(tween.end, before.end);
    }

    #[test]
    fn upgrade_needs_self_selected_and_two_points() {
        let t0 = Instant::now();
        let mut session = live_session("A", duel(), t0);
        select(&mut session, Coord::new(1, 1), t0);
        assert!(session.available_actions().upgrade);
        assert_eq!(session.max_amount(ActionKind::Upgrade), 2);

        session.press_action(ActionKind::Upgrade, t0);
        session.poll_timers(t0 + ms(250));
        assert_eq!(
            session.take_outbound(),
            vec![ClientMessage::Upgrade { amount: 1 }]
        );

        session
            .handle_server_text(
                &updates_text(json!([{ "player": "A", "stat": "ap", "val": 1 }])),
                t0 + ms(300),
            )
            .expect("ap diff");
        assert!(!session.available_actions().upgrade);
    }

    #[test]
    fn dead_viewer_votes_and_withdraws() {
        let t0 = Instant::now();
        let mut session = live_session(
            "A",
            json!({
                "A": { "pos": null, "hp": 0, "ap": 0, "range": 1, "vote": "B" },
                "B": { "pos": "1,3", "hp": 10, "ap": 2, "range": 2 },
                "C": { "pos": "3,3", "hp": 10, "ap": 2, "range": 1 }
            }),
            t0,
        );
        select(&mut session, Coord::new(3, 3), t0);
        assert!(!session.available_actions().attack);
        assert!(session.press_action(ActionKind::Vote, t0));

        select(&mut session, Coord::new(1, 3), t0 + ms(200));
        assert!(session.available_actions().vote_clears);
        assert!(session.press_action(ActionKind::Vote, t0 + ms(200)));
        assert_eq!(
            session.take_outbound(),
            vec![
                ClientMessage::Vote {
                    patient: Some("C".to_string())
                },
                ClientMessage::Vote { patient: None }
            ]
        );
    }

    #[test]
    fn reselecting_cancels_pending_press() {
        let t0 = Instant::now();
        let mut session = live_session("A", duel(), t0);
        select(&mut session, Coord::new(1, 3), t0);
        session.press_action(ActionKind::Attack, t0);
        select(&mut session, Coord::new(3, 3), t0 + ms(150));
        assert_eq!(session.next_deadline(), None);
        assert_eq!(session.poll_timers(t0 + ms(500)), 0);
    }
}
