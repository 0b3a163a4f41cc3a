//! Cube mesh, generated texture and camera math.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use redlilium_rhi::types::ImageFormat;
use redlilium_rhi::RawImageData;

/// Cube vertex: position followed by texture coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

static_assertions::assert_eq_size!(Vertex, [u8; 20]);

/// Bytes between consecutive vertices.
pub const VERTEX_STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

/// Offset of [`Vertex::uv`].
pub const UV_OFFSET: u32 = 12;

/// Number of cube indices.
pub const CUBE_INDEX_COUNT: u32 = 36;

/// Two triangles per face, four vertices per face.
pub const CUBE_INDICES: [u16; CUBE_INDEX_COUNT as usize] = {
    let mut indices = [0u16; CUBE_INDEX_COUNT as usize];
    let mut face = 0;
    while face < 6 {
        let base = (face * 4) as u16;
        let i = face * 6;
        indices[i] = base;
        indices[i + 1] = base + 1;
        indices[i + 2] = base + 2;
        indices[i + 3] = base;
        indices[i + 4] = base + 2;
        indices[i + 5] = base + 3;
        face += 1;
    }
    indices
};

/// Unit cube centered at the origin, 24 vertices with per-face UVs.
///
/// Faces wind clockwise seen from outside, matching the left-handed camera.
pub fn cube_vertices() -> Vec<Vertex> {
    // (face center direction, right, up)
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, 1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
    ];
    let corners = [
        (-1.0, -1.0, [0.0, 1.0]),
        (-1.0, 1.0, [0.0, 0.0]),
        (1.0, 1.0, [1.0, 0.0]),
        (1.0, -1.0, [1.0, 1.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    for (normal, right, up) in faces {
        let (n, r, u) = (Vec3::from(normal), Vec3::from(right), Vec3::from(up));
        for (x, y, uv) in corners {
            let position = (n + r * x + u * y) * 0.5;
            vertices.push(Vertex {
                position: position.to_array(),
                uv,
            });
        }
    }
    vertices
}

/// RGBA8 checkerboard of `size` x `size` texels with `cells` squares per side.
pub fn checkerboard(size: u32, cells: u32) -> RawImageData {
    let cell = (size / cells.max(1)).max(1);
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let texel: [u8; 4] = if ((x / cell) + (y / cell)) % 2 == 0 {
                [0xE0, 0x3C, 0x31, 0xFF]
            } else {
                [0xF5, 0xF5, 0xF5, 0xFF]
            };
            data.extend_from_slice(&texel);
        }
    }
    RawImageData::new_2d(data, ImageFormat::R8G8B8A8Unorm, size, size)
}

// ============================================================================
// Camera
// ============================================================================

/// Vertical field of view in degrees.
pub const FOV_Y_DEGREES: f32 = 45.0;
/// Near clip plane.
pub const Z_NEAR: f32 = 0.1;
/// Far clip plane.
pub const Z_FAR: f32 = 100.0;

/// Perspective projection for a `width` x `height` target.
pub fn projection(width: u32, height: u32) -> Mat4 {
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    Mat4::perspective_lh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR)
}

/// Camera five units in front of the origin looking at it.
pub fn view() -> Mat4 {
    Mat4::look_at_lh(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y)
}

/// Model rotation after `angle` radians of spin.
pub fn model(angle: f32) -> Mat4 {
    Mat4::from_rotation_y(angle) * Mat4::from_rotation_x(angle * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_shape() {
        let vertices = cube_vertices();
        assert_eq!(vertices.len(), 24);
        assert!(vertices
            .iter()
            .all(|v| v.position.iter().all(|c| c.abs() == 0.5)));
        assert!(vertices.iter().all(|v| v.uv.iter().all(|c| (0.0..=1.0).contains(c))));
    }

    #[test]
    fn test_indices_reference_vertices() {
        assert_eq!(CUBE_INDICES.len(), 36);
        assert!(CUBE_INDICES.iter().all(|&i| i < 24));
        assert_eq!(&CUBE_INDICES[6..12], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(VERTEX_STRIDE, 20);
        let vertex = Vertex {
            position: [1.0, 2.0, 3.0],
            uv: [4.0, 5.0],
        };
        let bytes = bytemuck::bytes_of(&vertex);
        assert_eq!(&bytes[UV_OFFSET as usize..UV_OFFSET as usize + 4], &4.0f32.to_ne_bytes());
    }

    #[test]
    fn test_checkerboard() {
        let image = checkerboard(64, 8);
        assert_eq!((image.width, image.height), (64, 64));
        assert_eq!(image.data.len(), 64 * 64 * 4);
        // Neighbouring cells differ
        assert_ne!(&image.data[0..4], &image.data[8 * 4..8 * 4 + 4]);
        assert_eq!(&image.data[0..4], &image.data[16 * 4..16 * 4 + 4]);
    }

    #[test]
    fn test_camera_sees_cube() {
        let mvp = projection(800, 600) * view() * model(0.0);
        let clip = mvp * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..1.0).contains(&ndc.z));
    }
}
