//! Software rasterizer for the built-in stimulus shapes.

mod render;

pub use render::StimulusCanvas;
