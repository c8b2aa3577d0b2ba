/// Baked glyph atlas for GUI text
///
/// Printable ASCII is rasterized once with fontdue and shelf-packed into a
/// white RGBA texture whose alpha is the glyph coverage. A small opaque
/// block at the origin lets solid rectangles share the same texture.

use glam::Vec2;

use crate::device::types::Extent2D;
use crate::error::{Error, Result};
use crate::upload::TextureData;
use crate::engine_debug;

use super::draw_list::{GLYPH_WIDTH, LINE_HEIGHT};

const BUILTIN_FONT: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");
const FONT_SIZE: f32 = 12.0;
const ATLAS_WIDTH: u32 = 256;
const GLYPH_PADDING: u32 = 1;
const WHITE_BLOCK: u32 = 2;
const FIRST_CHAR: char = ' ';
const LAST_CHAR: char = '~';
const FALLBACK: char = '?';

/// Where one glyph sits inside its text cell and inside the atlas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasGlyph {
    /// Top-left corner relative to the cell origin, in pixels
    pub offset: Vec2,
    /// Bitmap size in pixels, zero for blank glyphs
    pub size: Vec2,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

impl AtlasGlyph {
    pub fn is_blank(&self) -> bool {
        self.size.x == 0.0 || self.size.y == 0.0
    }
}

pub struct GlyphAtlas {
    glyphs: Vec<AtlasGlyph>,
    white_uv: Vec2,
    texture: TextureData,
}

struct Placed {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    offset: Vec2,
    coverage: Vec<u8>,
}

impl GlyphAtlas {
    /// Atlas of the bundled monospace font
    pub fn builtin() -> Result<Self> {
        Self::from_font(BUILTIN_FONT, FONT_SIZE)
    }

    pub fn from_font(bytes: &[u8], px: f32) -> Result<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| Error::InvalidResource(format!("font: {}", e)))?;
        let line = font
            .horizontal_line_metrics(px)
            .ok_or_else(|| Error::InvalidResource("font has no horizontal metrics".to_string()))?;
        let baseline = ((LINE_HEIGHT - (line.ascent - line.descent)) * 0.5 + line.ascent).round();

        // shelf packing, the white block takes the first slot
        let mut cursor_x = GLYPH_PADDING * 2 + WHITE_BLOCK;
        let mut cursor_y = GLYPH_PADDING;
        let mut row_height = WHITE_BLOCK;
        let mut placed = Vec::new();

        for ch in FIRST_CHAR..=LAST_CHAR {
            let (metrics, coverage) = font.rasterize(ch, px);
            let width = metrics.width as u32;
            let height = metrics.height as u32;
            let offset = Vec2::new(
                ((GLYPH_WIDTH - metrics.advance_width) * 0.5).round() + metrics.xmin as f32,
                baseline - (metrics.ymin + metrics.height as i32) as f32,
            );
            if width == 0 || height == 0 {
                placed.push(Placed { x: 0, y: 0, width: 0, height: 0, offset, coverage: Vec::new() });
                continue;
            }
            if width + GLYPH_PADDING * 2 > ATLAS_WIDTH {
                return Err(Error::InvalidResource(format!(
                    "glyph '{}' is {} pixels wide, atlas is {}",
                    ch, width, ATLAS_WIDTH
                )));
            }
            if cursor_x + width + GLYPH_PADDING > ATLAS_WIDTH {
                cursor_y += row_height + GLYPH_PADDING;
                cursor_x = GLYPH_PADDING;
                row_height = 0;
            }
            placed.push(Placed { x: cursor_x, y: cursor_y, width, height, offset, coverage });
            cursor_x += width + GLYPH_PADDING;
            row_height = row_height.max(height);
        }

        let atlas_height = (cursor_y + row_height + GLYPH_PADDING).next_power_of_two();
        let mut pixels = vec![0u8; (ATLAS_WIDTH * atlas_height * 4) as usize];
        let mut put = |x: u32, y: u32, alpha: u8| {
            let i = ((y * ATLAS_WIDTH + x) * 4) as usize;
            pixels[i..i + 4].copy_from_slice(&[255, 255, 255, alpha]);
        };
        for y in 0..WHITE_BLOCK {
            for x in 0..WHITE_BLOCK {
                put(GLYPH_PADDING + x, GLYPH_PADDING + y, 255);
            }
        }

        let size = Vec2::new(ATLAS_WIDTH as f32, atlas_height as f32);
        let mut glyphs = Vec::with_capacity(placed.len());
        for glyph in placed {
            for (i, alpha) in glyph.coverage.iter().enumerate() {
                let i = i as u32;
                put(glyph.x + i % glyph.width, glyph.y + i / glyph.width, *alpha);
            }
            let min = Vec2::new(glyph.x as f32, glyph.y as f32);
            let extent = Vec2::new(glyph.width as f32, glyph.height as f32);
            glyphs.push(AtlasGlyph {
                offset: glyph.offset,
                size: extent,
                uv_min: min / size,
                uv_max: (min + extent) / size,
            });
        }

        let white = (GLYPH_PADDING + WHITE_BLOCK / 2) as f32;
        let texture = TextureData::rgba8(Extent2D::new(ATLAS_WIDTH, atlas_height), pixels)?;
        engine_debug!(
            "kludge::gui",
            "Glyph atlas baked: {} glyphs in {}x{} at {}px",
            glyphs.len(),
            ATLAS_WIDTH,
            atlas_height,
            px
        );
        Ok(Self {
            glyphs,
            white_uv: Vec2::splat(white) / size,
            texture,
        })
    }

    /// Glyph for `ch`, falling back to '?' outside printable ASCII
    pub fn glyph(&self, ch: char) -> &AtlasGlyph {
        let ch = if (FIRST_CHAR..=LAST_CHAR).contains(&ch) { ch } else { FALLBACK };
        &self.glyphs[(ch as u32 - FIRST_CHAR as u32) as usize]
    }

    /// Texture coordinate of a fully opaque texel, used for solid fills
    pub fn white_uv(&self) -> Vec2 {
        self.white_uv
    }

    pub fn texture(&self) -> &TextureData {
        &self.texture
    }
}
