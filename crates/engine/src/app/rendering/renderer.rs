use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::view::FrameView;

use super::raster::{paint_frame, FrameTarget};

pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    width: u32,
    height: u32,
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            width: size.width,
            height: size.height,
        })
    }

    /// A minimized window reports a zero size; the old surface is kept
    /// until a drawable size arrives.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        let Some((width, height)) = drawable_size(width, height) else {
            return Ok(());
        };
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn render(&mut self, view: &FrameView) -> Result<(), Error> {
        if drawable_size(self.width, self.height).is_none() {
            return Ok(());
        }
        let mut target = FrameTarget::new(self.pixels.frame_mut(), self.width, self.height);
        paint_frame(&mut target, view);
        self.pixels.render()
    }
}

fn drawable_size(width: u32, height: u32) -> Option<(u32, u32)> {
    (width > 0 && height > 0).then_some((width, height))
}
