use serde::Deserialize;

use crate::geometry::{Coord, Vec2};

pub const CAMERA_ZOOM_DEFAULT: f32 = 1.0;
pub const CAMERA_ZOOM_MIN: f32 = 0.5;
pub const CAMERA_ZOOM_MAX: f32 = 2.5;
pub const CAMERA_ZOOM_STEP: f32 = 0.1;
pub const MIN_BASE_CELL_PX: f32 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraTuning {
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub zoom_step: f32,
    pub min_cell_px: f32,
}

impl Default for CameraTuning {
    fn default() -> Self {
        Self {
            min_zoom: CAMERA_ZOOM_MIN,
            max_zoom: CAMERA_ZOOM_MAX,
            zoom_step: CAMERA_ZOOM_STEP,
            min_cell_px: MIN_BASE_CELL_PX,
        }
    }
}

/// Screen/grid mapping for a square grid drawn at `origin` (top-left of
/// cell 0,0) with square cells of `cell_size` pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    tuning: CameraTuning,
    viewport: Vec2,
    dim: usize,
    zoom: f32,
    origin: Vec2,
    cell_size: f32,
}

/// Restorable origin and zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub origin: Vec2,
    pub zoom: f32,
}

impl Camera {
    pub fn new(tuning: CameraTuning, width: u32, height: u32) -> Self {
        let mut camera = Self {
            tuning,
            viewport: Vec2::new(width as f32, height as f32),
            dim: 0,
            zoom: CAMERA_ZOOM_DEFAULT,
            origin: Vec2::ZERO,
            cell_size: tuning.min_cell_px,
        };
        camera.refresh_cell_size();
        camera.bound();
        camera
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn grid_size(&self) -> f32 {
        self.cell_size * self.dim as f32
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            origin: self.origin,
            zoom: self.zoom,
        }
    }

    pub fn restore(&mut self, pose: CameraPose) {
        self.zoom = self.clamp_zoom(pose.zoom);
        self.refresh_cell_size();
        self.origin = pose.origin;
        self.bound();
    }

    pub fn set_dimension(&mut self, dim: usize) {
        self.dim = dim;
        self.refresh_cell_size();
        self.bound();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Vec2::new(width as f32, height as f32);
        self.refresh_cell_size();
        self.bound();
    }

    pub fn screen_to_grid(&self, point: Vec2) -> Coord {
        let local = point - self.origin;
        Coord::new(
            (local.y / self.cell_size).floor() as i32,
            (local.x / self.cell_size).floor() as i32,
        )
    }

    /// Top-left corner of `coord` on screen.
    pub fn grid_to_screen(&self, coord: Coord) -> Vec2 {
        Vec2::new(
            self.origin.x + coord.c as f32 * self.cell_size,
            self.origin.y + coord.r as f32 * self.cell_size,
        )
    }

    pub fn cell_center(&self, coord: Coord) -> Vec2 {
        let half = self.cell_size * 0.5;
        self.grid_to_screen(coord) + Vec2::new(half, half)
    }

    /// Steps the zoom level, keeping the grid point at the viewport centre
    /// fixed. Returns false when already at the limit in that direction.
    pub fn zoom_by(&mut self, steps: i32) -> bool {
        if steps == 0 {
            return false;
        }
        if (steps > 0 && self.zoom >= self.tuning.max_zoom)
            || (steps < 0 && self.zoom <= self.tuning.min_zoom)
        {
            return false;
        }
        let target = self.zoom + steps as f32 * self.tuning.zoom_step;
        self.set_zoom_around_point(self.viewport_center(), target);
        true
    }

    pub fn reset_zoom(&mut self) {
        self.set_zoom_around_point(self.viewport_center(), CAMERA_ZOOM_DEFAULT);
    }

    pub fn zoom_around_point(&mut self, point: Vec2, factor: f32) {
        self.set_zoom_around_point(point, self.zoom * factor);
    }

    /// Sets an absolute zoom level while keeping the grid point under
    /// `point` fixed on screen.
    pub fn set_zoom_around_point(&mut self, point: Vec2, zoom: f32) {
        let anchor = (point - self.origin) * (1.0 / self.cell_size);
        self.zoom = self.clamp_zoom(zoom);
        self.refresh_cell_size();
        self.origin = point - anchor * self.cell_size;
        self.bound();
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.origin = self.origin + Vec2::new(dx, dy);
        self.bound();
    }

    pub fn set_origin(&mut self, origin: Vec2) {
        self.origin = origin;
        self.bound();
    }

    pub fn center_on(&mut self, coord: Coord) {
        let half = self.cell_size * 0.5;
        self.origin = Vec2::new(
            self.viewport.x * 0.5 - coord.c as f32 * self.cell_size - half,
            self.viewport.y * 0.5 - coord.r as f32 * self.cell_size - half,
        );
        self.bound();
    }

    /// Clamps the origin so a larger-than-viewport grid always covers the
    /// viewport and a smaller one sits exactly centred, per axis.
    pub fn bound(&mut self) {
        let grid = self.grid_size();
        self.origin.x = bound_axis(self.origin.x, grid, self.viewport.x);
        self.origin.y = bound_axis(self.origin.y, grid, self.viewport.y);
    }

    fn viewport_center(&self) -> Vec2 {
        self.viewport * 0.5
    }

    fn refresh_cell_size(&mut self) {
        let base = if self.dim == 0 {
            self.tuning.min_cell_px
        } else {
            let dim = self.dim as f32;
            (self.viewport.x / dim)
                .min(self.viewport.y / dim)
                .max(self.tuning.min_cell_px)
        };
        self.cell_size = base * self.zoom;
    }

    fn clamp_zoom(&self, zoom: f32) -> f32 {
        if !zoom.is_finite() {
            return CAMERA_ZOOM_DEFAULT;
        }
        zoom.clamp(self.tuning.min_zoom, self.tuning.max_zoom)
    }
}

fn bound_axis(origin: f32, grid: f32, viewport: f32) -> f32 {
    if grid > viewport {
        origin.clamp(viewport - grid, 0.0)
    } else {
        viewport * 0.5 - grid * 0.5
    }
}
