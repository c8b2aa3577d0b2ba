//! Textured quad: a decoded PNG drawn through a static vertex buffer

use kludge_engine::kludge::device::{CullMode, Extent2D, Format, FrontFace, PrimitiveTopology, VertexAttribute, VertexLayout};
use kludge_engine::kludge::{Error, Result, SessionDesc, TextureData, VertexData};

const IMAGE: &[u8] = include_bytes!("../assets/texquad.png");

/// Shader name under the shader root
pub const SHADER: &str = "texquad";

/// Clear color around the quad
pub const BACKGROUND: [f32; 3] = [0.8, 0.8, 0.8];

/// Two counter-clockwise triangles in a fan: clip-space position, then uv
const QUAD: [[f32; 4]; 4] = [
    [-1.0, 1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0, 0.0],
    [-1.0, -1.0, 0.0, 0.0],
];

/// Decode the bundled image to tightly packed RGBA8
pub fn load_image() -> Result<TextureData> {
    decode(IMAGE)
}

fn decode(bytes: &[u8]) -> Result<TextureData> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidResource(format!("texquad image: {}", e)))?
        .to_rgba8();
    let extent = Extent2D::new(image.width(), image.height());
    TextureData::rgba8(extent, image.into_raw())
}

fn quad_vertices() -> Result<VertexData> {
    let layout = VertexLayout {
        stride: 16,
        attributes: vec![
            VertexAttribute { location: 0, format: Format::R32G32_SFLOAT, offset: 0 },
            VertexAttribute { location: 1, format: Format::R32G32_SFLOAT, offset: 8 },
        ],
    };
    VertexData::new(layout, &QUAD)
}

pub fn session_desc(texture: TextureData) -> Result<SessionDesc> {
    let mut desc = SessionDesc::new(SHADER, 0)
        .with_vertices(quad_vertices()?)
        .with_texture(texture)
        .with_topology(PrimitiveTopology::TriangleFan);
    desc.cull_mode = CullMode::Back;
    desc.front_face = FrontFace::CounterClockwise;
    Ok(desc)
}

#[cfg(test)]
#[path = "texquad_demo_tests.rs"]
mod tests;
