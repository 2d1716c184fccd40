//! Software rasterisation of a [`FrameView`] into an RGBA8 frame.

use crate::geometry::Vec2;
use crate::view::{FrameView, TankView};

const BACKGROUND_COLOR: [u8; 4] = [20, 22, 28, 255];
const CELL_LIGHT_COLOR: [u8; 4] = [58, 66, 52, 255];
const CELL_DARK_COLOR: [u8; 4] = [52, 60, 47, 255];
const GRID_LINE_COLOR: [u8; 4] = [35, 39, 46, 255];
const REACHABLE_COLOR: [u8; 4] = [90, 200, 120, 255];
const VIEWER_RANGE_COLOR: [u8; 4] = [80, 160, 255, 255];
const TARGET_RANGE_COLOR: [u8; 4] = [255, 120, 120, 255];
const SELECTED_COLOR: [u8; 4] = [255, 210, 70, 255];
const TRACK_COLOR: [u8; 4] = [28, 30, 24, 255];
const VIEWER_TANK_COLOR: [u8; 4] = [80, 220, 255, 255];
const OTHER_TANK_COLOR: [u8; 4] = [220, 220, 240, 255];
const TURRET_COLOR: [u8; 4] = [40, 44, 52, 255];
const HP_PIP_COLOR: [u8; 4] = [230, 80, 80, 255];
const AP_PIP_COLOR: [u8; 4] = [250, 220, 90, 255];
const SHOT_COLOR: [u8; 4] = [255, 170, 60, 255];
const PROMPT_EMPTY_COLOR: [u8; 4] = [60, 64, 72, 255];
const PROMPT_FILLED_COLOR: [u8; 4] = [250, 220, 90, 255];
const BANNER_COLOR: [u8; 4] = [200, 90, 60, 255];

const REACHABLE_ALPHA: f32 = 0.35;
const RANGE_ALPHA: f32 = 0.18;
const TRACK_ALPHA: f32 = 0.6;
const MAX_PIPS: i32 = 10;
const MAX_PROMPT_SEGMENTS: u32 = 20;
const BANNER_HEIGHT_PX: i32 = 6;

/// Mutable view of an RGBA8 frame with clipped drawing primitives.
pub(crate) struct FrameTarget<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> FrameTarget<'a> {
    pub(crate) fn new(frame: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            frame,
            width,
            height,
        }
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        let pixel = (y as usize)
            .checked_mul(self.width as usize)?
            .checked_add(x as usize)?;
        let byte = pixel.checked_mul(4)?;
        (byte + 4 <= self.frame.len()).then_some(byte)
    }

    #[cfg(test)]
    fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        let at = self.offset(x, y)?;
        let mut color = [0; 4];
        color.copy_from_slice(&self.frame[at..at + 4]);
        Some(color)
    }

    pub(crate) fn clear(&mut self, color: [u8; 4]) {
        for pixel in self.frame.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    fn blend_pixel(&mut self, x: i32, y: i32, color: [u8; 4], alpha: f32) {
        let Some(at) = self.offset(x, y) else {
            return;
        };
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha >= 1.0 {
            self.frame[at..at + 4].copy_from_slice(&color);
            return;
        }
        for channel in 0..3 {
            let under = self.frame[at + channel] as f32;
            let over = color[channel] as f32;
            self.frame[at + channel] = (under + (over - under) * alpha).round() as u8;
        }
        self.frame[at + 3] = 255;
    }

    /// Fills the half-open rectangle `[x0, x1) x [y0, y1)`.
    fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 4], alpha: f32) {
        let (x0, x1) = (x0.max(0), x1.min(self.width as i32));
        let (y0, y1) = (y0.max(0), y1.min(self.height as i32));
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_pixel(x, y, color, alpha);
            }
        }
    }

    fn rect_outline(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 4]) {
        for x in x0..x1 {
            self.blend_pixel(x, y0, color, 1.0);
            self.blend_pixel(x, y1 - 1, color, 1.0);
        }
        for y in y0..y1 {
            self.blend_pixel(x0, y, color, 1.0);
            self.blend_pixel(x1 - 1, y, color, 1.0);
        }
    }

    fn fill_square(&mut self, center: Vec2, half: f32, color: [u8; 4], alpha: f32) {
        self.fill_rect(
            (center.x - half).round() as i32,
            (center.y - half).round() as i32,
            (center.x + half).round() as i32,
            (center.y + half).round() as i32,
            color,
            alpha,
        );
    }

    fn fill_circle(&mut self, center: Vec2, radius: f32, color: [u8; 4], alpha: f32) {
        if radius <= 0.0 {
            return;
        }
        let r = radius.ceil() as i32;
        let (cx, cy) = (center.x.round() as i32, center.y.round() as i32);
        let limit = radius * radius;
        for dy in -r..=r {
            for dx in -r..=r {
                if (dx * dx + dy * dy) as f32 <= limit {
                    self.blend_pixel(cx + dx, cy + dy, color, alpha);
                }
            }
        }
    }

    fn thick_line(&mut self, from: Vec2, to: Vec2, half_width: f32, color: [u8; 4]) {
        let steps = from.distance(to).ceil().max(1.0) as i32;
        for step in 0..=steps {
            let point = from.lerp(to, step as f32 / steps as f32);
            self.fill_square(point, half_width, color, 1.0);
        }
    }
}

pub(crate) fn paint_frame(target: &mut FrameTarget<'_>, view: &FrameView) {
    target.clear(BACKGROUND_COLOR);
    let cell = view.cell_size;

    if view.dim > 0 && cell > 0.0 {
        let cell_rect = |r: i32, c: i32| {
            let x0 = (view.origin.x + c as f32 * cell).round() as i32;
            let y0 = (view.origin.y + r as f32 * cell).round() as i32;
            let x1 = (view.origin.x + (c + 1) as f32 * cell).round() as i32;
            let y1 = (view.origin.y + (r + 1) as f32 * cell).round() as i32;
            (x0, y0, x1, y1)
        };

        let dim = view.dim as i32;
        for r in 0..dim {
            for c in 0..dim {
                let (x0, y0, x1, y1) = cell_rect(r, c);
                let color = if (r + c) % 2 == 0 {
                    CELL_LIGHT_COLOR
                } else {
                    CELL_DARK_COLOR
                };
                target.fill_rect(x0, y0, x1, y1, color, 1.0);
            }
        }

        for (cells, color, alpha) in [
            (&view.viewer_range, VIEWER_RANGE_COLOR, RANGE_ALPHA),
            (&view.target_range, TARGET_RANGE_COLOR, RANGE_ALPHA),
            (&view.reachable, REACHABLE_COLOR, REACHABLE_ALPHA),
        ] {
            for coord in cells {
                let (x0, y0, x1, y1) = cell_rect(coord.r, coord.c);
                target.fill_rect(x0, y0, x1, y1, color, alpha);
            }
        }

        for r in 0..dim {
            for c in 0..dim {
                let (x0, y0, x1, y1) = cell_rect(r, c);
                target.rect_outline(x0, y0, x1 + 1, y1 + 1, GRID_LINE_COLOR);
            }
        }

        for track in &view.tracks {
            let across = Vec2::new(-track.angle.sin(), track.angle.cos()) * (cell * 0.18);
            let half = (cell * 0.04).max(1.0);
            let alpha = track.opacity * TRACK_ALPHA;
            target.fill_square(track.center + across, half, TRACK_COLOR, alpha);
            target.fill_square(track.center - across, half, TRACK_COLOR, alpha);
        }

        if let Some(selected) = view.selected {
            let (x0, y0, x1, y1) = cell_rect(selected.r, selected.c);
            target.rect_outline(x0, y0, x1 + 1, y1 + 1, SELECTED_COLOR);
            target.rect_outline(x0 + 1, y0 + 1, x1, y1, SELECTED_COLOR);
        }

        for tank in &view.tanks {
            paint_tank(target, tank, cell);
        }

        for shot in &view.shots {
            target.fill_circle(shot.center, cell * shot.scale, SHOT_COLOR, shot.opacity);
        }
    }

    if let Some(prompt) = &view.prompt {
        paint_prompt(target, prompt.text.parse().unwrap_or(0), prompt.max);
    }
    if view.banner.is_some() {
        target.fill_rect(0, 0, target.width as i32, BANNER_HEIGHT_PX, BANNER_COLOR, 1.0);
    }
}

fn paint_tank(target: &mut FrameTarget<'_>, tank: &TankView, cell: f32) {
    let center = tank.top_left + Vec2::new(cell * 0.5, cell * 0.5);
    let body = if tank.is_viewer {
        VIEWER_TANK_COLOR
    } else {
        OTHER_TANK_COLOR
    };
    target.fill_square(center, cell * 0.32, body, 1.0);

    let barrel = Vec2::new(tank.turret_angle.cos(), tank.turret_angle.sin()) * (cell * 0.45);
    target.fill_circle(center, cell * 0.14, TURRET_COLOR, 1.0);
    target.thick_line(center, center + barrel, (cell * 0.04).max(1.0), TURRET_COLOR);

    let pip = (cell * 0.035).max(1.0);
    let spacing = pip * 3.0;
    let row_start = center.x - spacing * (MAX_PIPS - 1) as f32 * 0.5;
    for index in 0..tank.hp.clamp(0, MAX_PIPS) {
        let at = Vec2::new(row_start + index as f32 * spacing, center.y - cell * 0.42);
        target.fill_square(at, pip, HP_PIP_COLOR, 1.0);
    }
    for index in 0..tank.ap.clamp(0, MAX_PIPS) {
        let at = Vec2::new(row_start + index as f32 * spacing, center.y + cell * 0.42);
        target.fill_square(at, pip, AP_PIP_COLOR, 1.0);
    }
}

/// Segmented bar along the bottom edge, one segment per unit up to the
/// maximum amount.
fn paint_prompt(target: &mut FrameTarget<'_>, entered: u32, max: u32) {
    let segments = max.clamp(1, MAX_PROMPT_SEGMENTS) as i32;
    let filled = if max <= MAX_PROMPT_SEGMENTS {
        entered.min(max) as i32
    } else {
        ((entered.min(max) as u64 * MAX_PROMPT_SEGMENTS as u64) / max as u64) as i32
    };
    let width = target.width as i32;
    let height = target.height as i32;
    let bar_height = 12;
    let gap = 2;
    let segment_width = ((width - 2 * gap) / segments - gap).max(1);
    let y0 = height - bar_height - gap;
    for index in 0..segments {
        let x0 = gap + index * (segment_width + gap);
        let color = if index < filled {
            PROMPT_FILLED_COLOR
        } else {
            PROMPT_EMPTY_COLOR
        };
        target.fill_rect(x0, y0, x0 + segment_width, y0 + bar_height, color, 1.0);
    }
}
