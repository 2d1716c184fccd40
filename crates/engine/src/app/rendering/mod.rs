mod raster;
mod renderer;

pub use renderer::Renderer;
