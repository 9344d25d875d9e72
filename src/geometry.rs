// Quad geometry and its vertex layout

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};

/// Interleaved vertex: 2D position followed by RGB color
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec2,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(pos: Vec2, color: Vec3) -> Self {
        Self { pos, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
        ]
    }
}

pub const VERTICES: [Vertex; 4] = [
    Vertex::new(Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec2::new(0.5, -0.5), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
    Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(1.0, 1.0, 1.0)),
];

/// Two clockwise triangles sharing the 0-2 diagonal
pub const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Index width matching `INDICES`
pub const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 20);
        assert_eq!(Vertex::binding_description().stride, 20);

        let [pos, color] = Vertex::attribute_descriptions();
        assert_eq!((pos.location, pos.offset), (0, 0));
        assert_eq!(pos.format, vk::Format::R32G32_SFLOAT);
        assert_eq!((color.location, color.offset), (1, 8));
        assert_eq!(color.format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn test_vertex_bytes_are_tightly_packed() {
        let bytes: &[u8] = bytemuck::cast_slice(&VERTICES);
        assert_eq!(bytes.len(), VERTICES.len() * 20);

        let first: &[f32] = bytemuck::cast_slice(&bytes[..20]);
        assert_eq!(first, &[-0.5, -0.5, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_indices_reference_vertices() {
        assert_eq!(INDICES.len() % 3, 0);
        assert!(INDICES.iter().all(|&i| (i as usize) < VERTICES.len()));
        assert_eq!(bytemuck::cast_slice::<u16, u8>(&INDICES).len(), 12);
    }
}
