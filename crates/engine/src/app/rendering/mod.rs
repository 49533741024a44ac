mod commands;
mod generator;
mod renderer;

pub use commands::{RenderCommand, RenderCommandList, BACKGROUND_COLOR, DEFAULT_COMMAND_CAPACITY};
pub use generator::{generate, visible_tiles, VisibleTiles};
pub use renderer::{Renderer, Viewport};
