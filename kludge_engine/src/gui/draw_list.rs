/// Declarative per-frame GUI draw list
///
/// Built by `GuiFrame`, consumed by the renderer session and discarded at
/// the end of the frame. Coordinates are in pixels, origin top-left.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

use crate::device::types::{Extent2D, Format, VertexAttribute, VertexLayout};

use super::atlas::GlyphAtlas;

/// Width of one glyph cell in pixels
pub const GLYPH_WIDTH: f32 = 7.0;
/// Height of one text line in pixels
pub const LINE_HEIGHT: f32 = 14.0;

/// Vertex consumed by the GUI pipeline (position in NDC, atlas uv, straight RGBA)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GuiVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl GuiVertex {
    pub fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<GuiVertex>() as u32,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: Format::R32G32_SFLOAT,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: Format::R32G32B32A32_SFLOAT,
                    offset: 16,
                },
                VertexAttribute {
                    location: 2,
                    format: Format::R32G32_SFLOAT,
                    offset: 8,
                },
            ],
        }
    }
}

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_size(min: Vec2, size: Vec2) -> Self {
        Self { min, max: min + size }
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x < self.max.x && point.y >= self.min.y && point.y < self.max.y
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(self.min.min(other.min), self.max.max(other.max))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    Rect { rect: Rect, color: Vec4 },
    Text { pos: Vec2, text: String, color: Vec4 },
}

/// Ordered list of draw commands for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    cmds: Vec<DrawCmd>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: DrawCmd) -> usize {
        self.cmds.push(cmd);
        self.cmds.len() - 1
    }

    pub fn rect(&mut self, rect: Rect, color: Vec4) -> usize {
        self.push(DrawCmd::Rect { rect, color })
    }

    pub fn text(&mut self, pos: Vec2, text: impl Into<String>, color: Vec4) -> usize {
        self.push(DrawCmd::Text {
            pos,
            text: text.into(),
            color,
        })
    }

    /// Overwrite a previously pushed command (window backgrounds sized at `end`)
    pub fn patch(&mut self, index: usize, cmd: DrawCmd) {
        if let Some(slot) = self.cmds.get_mut(index) {
            *slot = cmd;
        }
    }

    pub fn cmds(&self) -> &[DrawCmd] {
        &self.cmds
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Every text run in draw order
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.cmds.iter().filter_map(|cmd| match cmd {
            DrawCmd::Text { text, .. } => Some(text.as_str()),
            DrawCmd::Rect { .. } => None,
        })
    }

    /// Triangle-list vertices in normalized device coordinates
    ///
    /// Rectangles sample the atlas' opaque block, text one quad per inked glyph.
    pub fn tessellate(&self, display: Extent2D, atlas: &GlyphAtlas) -> Vec<GuiVertex> {
        let mut vertices = Vec::new();
        if display.is_zero_area() {
            return vertices;
        }
        let scale = Vec2::new(2.0 / display.width as f32, 2.0 / display.height as f32);
        let white = atlas.white_uv();
        for cmd in &self.cmds {
            match cmd {
                DrawCmd::Rect { rect, color } => push_quad(&mut vertices, *rect, (white, white), *color, scale),
                DrawCmd::Text { pos, text, color } => {
                    for (i, ch) in text.chars().enumerate() {
                        let glyph = atlas.glyph(ch);
                        if glyph.is_blank() {
                            continue;
                        }
                        let min = *pos + Vec2::new(i as f32 * GLYPH_WIDTH, 0.0) + glyph.offset;
                        let quad = Rect::from_size(min, glyph.size);
                        push_quad(&mut vertices, quad, (glyph.uv_min, glyph.uv_max), *color, scale);
                    }
                }
            }
        }
        vertices
    }
}

fn push_quad(vertices: &mut Vec<GuiVertex>, rect: Rect, uv: (Vec2, Vec2), color: Vec4, scale: Vec2) {
    let to_ndc = |p: Vec2| -> [f32; 2] { (p * scale - Vec2::ONE).to_array() };
    let color = color.to_array();
    let (uv_min, uv_max) = uv;
    let corners = [
        (rect.min, uv_min),
        (Vec2::new(rect.max.x, rect.min.y), Vec2::new(uv_max.x, uv_min.y)),
        (rect.max, uv_max),
        (Vec2::new(rect.min.x, rect.max.y), Vec2::new(uv_min.x, uv_max.y)),
    ];
    for i in [0, 1, 2, 0, 2, 3] {
        let (position, uv) = corners[i];
        vertices.push(GuiVertex {
            position: to_ndc(position),
            uv: uv.to_array(),
            color,
        });
    }
}
