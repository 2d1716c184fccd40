//! Touch and pointer-drag interpretation on top of [`Camera`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::camera::{Camera, CameraPose};
use crate::geometry::Vec2;

pub type TouchId = u64;

pub const DEFAULT_DRAG_THRESHOLD_PX: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PanGesture {
    touch: TouchId,
    start: Vec2,
    before: CameraPose,
    travelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PinchGesture {
    touches: [TouchId; 2],
    start_distance: f32,
    start_zoom: f32,
    center: Vec2,
    before: CameraPose,
}

impl PinchGesture {
    fn involves(&self, id: TouchId) -> bool {
        self.touches.contains(&id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Gesture {
    #[default]
    Idle,
    Pan(PanGesture),
    Pinch(PinchGesture),
}

/// One-finger pan and two-finger pinch.
///
/// A pinch is bound to the two touch ids present when it began; when the
/// touch set changes it is dropped and a new one starts on the next frame
/// with exactly two touches down. Cancelled touches restore the camera pose
/// captured when the gesture began.
#[derive(Debug)]
pub struct TouchGestures {
    tap_slop: f32,
    touches: BTreeMap<TouchId, Vec2>,
    gesture: Gesture,
}

impl Default for TouchGestures {
    fn default() -> Self {
        Self::new(DEFAULT_DRAG_THRESHOLD_PX)
    }
}

impl TouchGestures {
    pub fn new(tap_slop: f32) -> Self {
        Self {
            tap_slop: tap_slop.max(0.0),
            touches: BTreeMap::new(),
            gesture: Gesture::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    pub fn active_touches(&self) -> usize {
        self.touches.len()
    }

    pub fn touch_started(&mut self, id: TouchId, pos: Vec2, camera: &Camera) {
        self.touches.insert(id, pos);
        self.gesture = match self.touches.len() {
            1 => Gesture::Pan(PanGesture {
                touch: id,
                start: pos,
                before: camera.pose(),
                travelled: false,
            }),
            2 => self.begin_pinch(camera),
            _ => Gesture::Idle,
        };
    }

    /// Returns true when the camera changed.
    pub fn touch_moved(&mut self, id: TouchId, pos: Vec2, camera: &mut Camera) -> bool {
        let Some(slot) = self.touches.get_mut(&id) else {
            return false;
        };
        *slot = pos;

        if let Gesture::Pan(pan) = &mut self.gesture {
            if pan.touch != id || self.touches.len() != 1 {
                return false;
            }
            if pan.start.distance(pos) > self.tap_slop {
                pan.travelled = true;
            }
            camera.set_origin(pan.before.origin + (pos - pan.start));
            return true;
        }

        match self.gesture {
            Gesture::Pinch(pinch) => {
                let Some(distance) = self.distance_between(pinch.touches) else {
                    self.gesture = Gesture::Idle;
                    return false;
                };
                if self.touches.len() != 2 || pinch.start_distance <= f32::EPSILON {
                    return false;
                }
                let scale = distance / pinch.start_distance;
                camera.set_zoom_around_point(pinch.center, pinch.start_zoom * scale);
                true
            }
            Gesture::Idle if self.touches.len() == 2 => {
                self.gesture = self.begin_pinch(camera);
                false
            }
            _ => false,
        }
    }

    /// Returns the touch-down position when the touch was a tap: a lone
    /// finger that never travelled past the tap slop.
    pub fn touch_ended(&mut self, id: TouchId) -> Option<Vec2> {
        self.touches.remove(&id);
        let (finished, tap) = match self.gesture {
            Gesture::Pan(pan) if pan.touch == id => (true, (!pan.travelled).then_some(pan.start)),
            Gesture::Pinch(pinch) => (pinch.involves(id), None),
            _ => (false, None),
        };
        if finished {
            self.gesture = Gesture::Idle;
        }
        tap
    }

    /// Returns true when the camera was restored.
    pub fn touch_cancelled(&mut self, id: TouchId, camera: &mut Camera) -> bool {
        self.touches.remove(&id);
        let restore = match self.gesture {
            Gesture::Pan(pan) if pan.touch == id => Some(pan.before),
            Gesture::Pinch(pinch) => Some(pinch.before),
            _ => None,
        };
        match restore {
            Some(pose) => {
                debug!(touch = id, "touch_gesture_cancelled");
                self.gesture = Gesture::Idle;
                camera.restore(pose);
                true
            }
            None => false,
        }
    }

    fn begin_pinch(&self, camera: &Camera) -> Gesture {
        let mut ids = self.touches.keys().copied();
        let (Some(first), Some(second)) = (ids.next(), ids.next()) else {
            return Gesture::Idle;
        };
        let touches = [first, second];
        let Some(start_distance) = self.distance_between(touches) else {
            return Gesture::Idle;
        };
        Gesture::Pinch(PinchGesture {
            touches,
            start_distance,
            start_zoom: camera.zoom(),
            center: self.touches[&first].midpoint(self.touches[&second]),
            before: camera.pose(),
        })
    }

    fn distance_between(&self, ids: [TouchId; 2]) -> Option<f32> {
        let a = self.touches.get(&ids[0])?;
        let b = self.touches.get(&ids[1])?;
        Some(a.distance(*b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragState {
    start: Vec2,
    before: CameraPose,
    clickable: bool,
    panning: bool,
}

/// Mouse-button drag panning. A clickable press that never travels past the
/// threshold resolves to a click on release.
#[derive(Debug)]
pub struct PointerDrag {
    threshold: f32,
    state: Option<DragState>,
}

impl Default for PointerDrag {
    fn default() -> Self {
        Self::new(DEFAULT_DRAG_THRESHOLD_PX)
    }
}

impl PointerDrag {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
            state: None,
        }
    }

    pub fn press(&mut self, pos: Vec2, clickable: bool, camera: &Camera) {
        self.state = Some(DragState {
            start: pos,
            before: camera.pose(),
            clickable,
            panning: false,
        });
    }

    /// Returns true when the camera changed.
    pub fn moved(&mut self, pos: Vec2, camera: &mut Camera) -> bool {
        let Some(state) = self.state.as_mut() else {
            return false;
        };
        if !state.panning && state.start.distance(pos) <= self.threshold {
            return false;
        }
        state.panning = true;
        camera.set_origin(state.before.origin + (pos - state.start));
        true
    }

    /// Returns the press position when the press resolves to a click.
    pub fn release(&mut self) -> Option<Vec2> {
        let state = self.state.take()?;
        (state.clickable && !state.panning).then_some(state.start)
    }

    pub fn cancel(&mut self) {
        self.state = None;
    }
}
