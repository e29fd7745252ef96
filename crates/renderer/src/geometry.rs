//! The subdivided full-screen plane consumed by the vertex stage.
//!
//! Positions are authored directly in clip space ([-1, 1] on both axes, z = 0)
//! so the pass-through vertex shader needs no camera matrices. UVs run from
//! (0, 0) at the bottom-left corner to (1, 1) at the top-right.

/// Segment count per axis of the default plane.
pub const DEFAULT_SEGMENTS: u32 = 10;

/// Vertex format for the plane mesh: clip-space position plus UV.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PlaneVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl PlaneVertex {
    pub fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }

    /// Buffer layout matching the vertex shader's location 0/1 inputs.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<PlaneVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };
}

/// CPU-side plane geometry, built once and uploaded at pipeline creation.
#[derive(Debug, Clone)]
pub struct PlaneMesh {
    pub vertices: Vec<PlaneVertex>,
    pub indices: Vec<u32>,
}

impl PlaneMesh {
    /// Builds a clip-space quad subdivided into `segments_x` by `segments_y`
    /// cells, two counter-clockwise triangles per cell.
    pub fn subdivided(segments_x: u32, segments_y: u32) -> Self {
        let segments_x = segments_x.max(1);
        let segments_y = segments_y.max(1);
        let columns = segments_x + 1;

        let mut vertices = Vec::with_capacity((columns * (segments_y + 1)) as usize);
        for row in 0..=segments_y {
            let v = row as f32 / segments_y as f32;
            for col in 0..=segments_x {
                let u = col as f32 / segments_x as f32;
                vertices.push(PlaneVertex::new(
                    [u * 2.0 - 1.0, v * 2.0 - 1.0, 0.0],
                    [u, v],
                ));
            }
        }

        let mut indices = Vec::with_capacity((segments_x * segments_y * 6) as usize);
        for row in 0..segments_y {
            for col in 0..segments_x {
                let bottom_left = row * columns + col;
                let bottom_right = bottom_left + 1;
                let top_left = bottom_left + columns;
                let top_right = top_left + 1;
                indices.extend_from_slice(&[
                    bottom_left,
                    bottom_right,
                    top_right,
                    bottom_left,
                    top_right,
                    top_left,
                ]);
            }
        }

        Self { vertices, indices }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdivided_plane_has_expected_counts() {
        let mesh = PlaneMesh::subdivided(10, 10);
        assert_eq!(mesh.vertices.len(), 11 * 11);
        assert_eq!(mesh.indices.len(), 10 * 10 * 6);
        assert_eq!(mesh.index_count(), 600);
    }

    #[test]
    fn corner_uvs_span_the_unit_square() {
        let mesh = PlaneMesh::subdivided(4, 4);
        let first = mesh.vertices.first().unwrap();
        let last = mesh.vertices.last().unwrap();
        assert_eq!(first.uv, [0.0, 0.0]);
        assert_eq!(first.position, [-1.0, -1.0, 0.0]);
        assert_eq!(last.uv, [1.0, 1.0]);
        assert_eq!(last.position, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn positions_stay_in_clip_space() {
        let mesh = PlaneMesh::subdivided(7, 3);
        for vertex in &mesh.vertices {
            assert!((-1.0..=1.0).contains(&vertex.position[0]));
            assert!((-1.0..=1.0).contains(&vertex.position[1]));
            assert_eq!(vertex.position[2], 0.0);
        }
    }

    #[test]
    fn indices_reference_valid_vertices_with_ccw_winding() {
        let mesh = PlaneMesh::subdivided(2, 2);
        for triangle in mesh.indices.chunks(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]];
            assert!((a as usize) < mesh.vertices.len());
            assert!((b as usize) < mesh.vertices.len());
            assert!((c as usize) < mesh.vertices.len());

            let pa = mesh.vertices[a as usize].position;
            let pb = mesh.vertices[b as usize].position;
            let pc = mesh.vertices[c as usize].position;
            let cross = (pb[0] - pa[0]) * (pc[1] - pa[1]) - (pb[1] - pa[1]) * (pc[0] - pa[0]);
            assert!(cross > 0.0, "triangle {triangle:?} is not counter-clockwise");
        }
    }

    #[test]
    fn degenerate_segment_counts_are_clamped() {
        let mesh = PlaneMesh::subdivided(0, 0);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }
}
