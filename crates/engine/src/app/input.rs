use std::collections::HashSet;

use winit::event::{ElementState, MouseButton, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::session::ActionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    ZoomIn,
    ZoomOut,
    Action(ActionKind),
    /// Quantity digit while a prompt is open; `0` resets zoom otherwise.
    Digit(u8),
    Backspace,
    Submit,
    /// Closes the prompt, or clears the selection when none is open.
    Cancel,
    Reload,
}

/// Turns raw key events into one command per physical press. Held keys
/// and OS auto-repeat do not retrigger until released.
#[derive(Debug, Default)]
pub(crate) struct KeyEdges {
    held: HashSet<KeyCode>,
}

impl KeyEdges {
    pub(crate) fn handle(&mut self, key: PhysicalKey, state: ElementState) -> Option<KeyCommand> {
        let PhysicalKey::Code(code) = key else {
            return None;
        };
        match state {
            ElementState::Pressed => {
                if !self.held.insert(code) {
                    return None;
                }
                command_for_key(code)
            }
            ElementState::Released => {
                self.held.remove(&code);
                None
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.held.clear();
    }
}

pub(crate) fn command_for_key(code: KeyCode) -> Option<KeyCommand> {
    let command = match code {
        KeyCode::Equal | KeyCode::NumpadAdd => KeyCommand::ZoomIn,
        KeyCode::Minus | KeyCode::NumpadSubtract => KeyCommand::ZoomOut,
        KeyCode::KeyA => KeyCommand::Action(ActionKind::Attack),
        KeyCode::KeyG => KeyCommand::Action(ActionKind::Give),
        KeyCode::KeyU => KeyCommand::Action(ActionKind::Upgrade),
        KeyCode::KeyM => KeyCommand::Action(ActionKind::Move),
        KeyCode::KeyV => KeyCommand::Action(ActionKind::Vote),
        KeyCode::Backspace => KeyCommand::Backspace,
        KeyCode::Enter | KeyCode::NumpadEnter => KeyCommand::Submit,
        KeyCode::Escape => KeyCommand::Cancel,
        KeyCode::KeyR => KeyCommand::Reload,
        other => return digit_for_key(other).map(KeyCommand::Digit),
    };
    Some(command)
}

fn digit_for_key(code: KeyCode) -> Option<u8> {
    let digit = match code {
        KeyCode::Digit0 | KeyCode::Numpad0 => 0,
        KeyCode::Digit1 | KeyCode::Numpad1 => 1,
        KeyCode::Digit2 | KeyCode::Numpad2 => 2,
        KeyCode::Digit3 | KeyCode::Numpad3 => 3,
        KeyCode::Digit4 | KeyCode::Numpad4 => 4,
        KeyCode::Digit5 | KeyCode::Numpad5 => 5,
        KeyCode::Digit6 | KeyCode::Numpad6 => 6,
        KeyCode::Digit7 | KeyCode::Numpad7 => 7,
        KeyCode::Digit8 | KeyCode::Numpad8 => 8,
        KeyCode::Digit9 | KeyCode::Numpad9 => 9,
        _ => return None,
    };
    Some(digit)
}

/// Left presses may become clicks; right and middle presses only pan.
pub(crate) fn is_clickable_button(button: MouseButton) -> bool {
    matches!(button, MouseButton::Left)
}

pub(crate) fn zoom_steps_from_scroll_delta(delta: MouseScrollDelta) -> i32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y.round() as i32,
        MouseScrollDelta::PixelDelta(position) => {
            if position.y > 0.0 {
                1
            } else if position.y < 0.0 {
                -1
            } else {
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use winit::dpi::PhysicalPosition;

    use super::*;

    fn press(edges: &mut KeyEdges, code: KeyCode) -> Option<KeyCommand> {
        edges.handle(PhysicalKey::Code(code), ElementState::Pressed)
    }

    fn release(edges: &mut KeyEdges, code: KeyCode) {
        edges.handle(PhysicalKey::Code(code), ElementState::Released);
    }

    #[test]
    fn held_key_does_not_retrigger() {
        let mut edges = KeyEdges::default();
        assert_eq!(press(&mut edges, KeyCode::KeyA), Some(KeyCommand::Action(ActionKind::Attack)));
        assert_eq!(press(&mut edges, KeyCode::KeyA), None);
        release(&mut edges, KeyCode::KeyA);
        assert_eq!(press(&mut edges, KeyCode::KeyA), Some(KeyCommand::Action(ActionKind::Attack)));
    }

    #[test]
    fn clear_forgets_held_keys() {
        let mut edges = KeyEdges::default();
        press(&mut edges, KeyCode::Equal);
        edges.clear();
        assert_eq!(press(&mut edges, KeyCode::Equal), Some(KeyCommand::ZoomIn));
    }

    #[test]
    fn zoom_keys_map_from_main_row_and_numpad() {
        assert_eq!(command_for_key(KeyCode::Equal), Some(KeyCommand::ZoomIn));
        assert_eq!(command_for_key(KeyCode::NumpadAdd), Some(KeyCommand::ZoomIn));
        assert_eq!(command_for_key(KeyCode::Minus), Some(KeyCommand::ZoomOut));
        assert_eq!(command_for_key(KeyCode::NumpadSubtract), Some(KeyCommand::ZoomOut));
    }

    #[test]
    fn digits_map_from_both_rows() {
        assert_eq!(command_for_key(KeyCode::Digit0), Some(KeyCommand::Digit(0)));
        assert_eq!(command_for_key(KeyCode::Numpad7), Some(KeyCommand::Digit(7)));
        assert_eq!(command_for_key(KeyCode::F3), None);
    }

    #[test]
    fn only_left_button_clicks() {
        assert!(is_clickable_button(MouseButton::Left));
        assert!(!is_clickable_button(MouseButton::Right));
        assert!(!is_clickable_button(MouseButton::Middle));
    }

    #[test]
    fn pixel_wheel_delta_maps_to_single_discrete_step_direction() {
        assert_eq!(
            zoom_steps_from_scroll_delta(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 12.0))),
            1
        );
        assert_eq!(
            zoom_steps_from_scroll_delta(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -3.0))),
            -1
        );
        assert_eq!(
            zoom_steps_from_scroll_delta(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 0.0))),
            0
        );
        assert_eq!(zoom_steps_from_scroll_delta(MouseScrollDelta::LineDelta(0.0, 2.0)), 2);
    }
}
