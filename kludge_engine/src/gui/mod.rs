/// GUI overlay - immediate-mode builder producing a per-frame draw list

pub mod atlas;
pub mod builder;
pub mod draw_list;

pub use atlas::{AtlasGlyph, GlyphAtlas};
pub use builder::{GuiFrame, GuiInput, GuiState};
pub use draw_list::{DrawCmd, DrawList, GuiVertex, Rect};

#[cfg(test)]
#[path = "gui_tests.rs"]
mod tests;
