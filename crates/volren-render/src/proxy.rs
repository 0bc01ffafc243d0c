//! Proxy cube bounding the volume.

use ash::vk;
use gpu_allocator::MemoryLocation;
use volren_gpu::error::Result;
use volren_gpu::memory::{GpuAllocator, GpuBuffer};

/// Corners of the [-0.5, 0.5]^3 cube.
pub const CUBE_VERTICES: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
];

/// Counter-clockwise when seen from outside.
#[rustfmt::skip]
pub const CUBE_INDICES: [u16; 36] = [
    4, 5, 6, 4, 6, 7, // +z
    1, 0, 3, 1, 3, 2, // -z
    5, 1, 2, 5, 2, 6, // +x
    0, 4, 7, 0, 7, 3, // -x
    7, 6, 2, 7, 2, 3, // +y
    0, 1, 5, 0, 5, 4, // -y
];

/// Buffer handles needed to draw the cube, owned by [`ProxyCube`].
#[derive(Debug, Clone, Copy)]
pub struct ProxyGeometry {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

impl ProxyGeometry {
    /// Vertex input: one `vec3` position per vertex.
    pub fn vertex_bindings() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<[f32; 3]>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn vertex_attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        }]
    }

    /// Bind the buffers and draw.
    ///
    /// # Safety
    /// The command buffer must be recording inside a rendering scope.
    pub unsafe fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, self.index_buffer, 0, vk::IndexType::UINT16);
        device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
    }
}

/// Host-visible vertex and index buffers of the proxy cube.
pub struct ProxyCube {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
}

impl ProxyCube {
    /// Upload the cube. The data is tiny, so it stays in host-visible memory.
    pub fn upload(allocator: &mut GpuAllocator) -> Result<Self> {
        let mut vertex_buffer = allocator.create_buffer(
            std::mem::size_of_val(&CUBE_VERTICES) as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::CpuToGpu,
            "proxy_cube_vertices",
        )?;
        if let Err(e) = vertex_buffer.write(&CUBE_VERTICES[..]) {
            allocator.free_buffer(&mut vertex_buffer)?;
            return Err(e);
        }

        let index_buffer = allocator
            .create_buffer(
                std::mem::size_of_val(&CUBE_INDICES) as u64,
                vk::BufferUsageFlags::INDEX_BUFFER,
                MemoryLocation::CpuToGpu,
                "proxy_cube_indices",
            )
            .and_then(|buffer| buffer.write(&CUBE_INDICES[..]).map(|()| buffer));
        let index_buffer = match index_buffer {
            Ok(buffer) => buffer,
            Err(e) => {
                allocator.free_buffer(&mut vertex_buffer)?;
                return Err(e);
            }
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
        })
    }

    pub fn geometry(&self) -> ProxyGeometry {
        ProxyGeometry {
            vertex_buffer: self.vertex_buffer.buffer,
            index_buffer: self.index_buffer.buffer,
            index_count: CUBE_INDICES.len() as u32,
        }
    }

    /// Free both buffers.
    pub fn destroy(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.vertex_buffer)?;
        allocator.free_buffer(&mut self.index_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn triangle_normal(n: usize) -> Vec3 {
        let corner = |i: usize| Vec3::from(CUBE_VERTICES[CUBE_INDICES[n * 3 + i] as usize]);
        let (a, b, c) = (corner(0), corner(1), corner(2));
        (b - a).cross(c - a)
    }

    #[test]
    fn triangles_face_outward() {
        for n in 0..CUBE_INDICES.len() / 3 {
            let centroid = (0..3)
                .map(|i| Vec3::from(CUBE_VERTICES[CUBE_INDICES[n * 3 + i] as usize]))
                .sum::<Vec3>()
                / 3.0;
            assert!(
                triangle_normal(n).dot(centroid) > 0.0,
                "triangle {n} faces inward"
            );
        }
    }

    #[test]
    fn every_face_is_covered() {
        let mut normals: Vec<Vec3> = (0..12).map(|n| triangle_normal(n).normalize()).collect();
        normals.dedup();
        assert_eq!(normals.len(), 6);
    }

    #[test]
    fn indices_are_in_range() {
        assert!(CUBE_INDICES.iter().all(|&i| (i as usize) < CUBE_VERTICES.len()));
    }
}
