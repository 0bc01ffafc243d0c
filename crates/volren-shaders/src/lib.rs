//! SPIR-V for the ray-direction volume renderer.
//!
//! GLSL sources live in `shaders/` and are compiled by the build script.
//! Each accessor returns the word-aligned module, decoded once on first use.

use std::sync::OnceLock;

/// Compiled modules as raw bytes (not guaranteed to be 4-byte aligned).
mod spirv_bytes {
    pub static GEOMETRY_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/geometry_vert.spv"));
    pub static RAYDIR_BACK_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/raydir_back_frag.spv"));
    pub static RAYDIR_FRONT_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/raydir_front_frag.spv"));
    pub static LIGHTING_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/lighting_vert.spv"));
    pub static LIGHTING_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/lighting_frag.spv"));
}

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    debug_assert!(bytes.len() % 4 == 0, "SPIR-V length must be a multiple of 4");
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

macro_rules! shader_accessor {
    ($(#[$doc:meta])* $name:ident, $cache:ident, $bytes:ident) => {
        static $cache: OnceLock<Vec<u32>> = OnceLock::new();

        $(#[$doc])*
        pub fn $name() -> &'static [u32] {
            $cache.get_or_init(|| bytes_to_spirv(spirv_bytes::$bytes))
        }
    };
}

shader_accessor!(
    /// Proxy cube vertex shader used by both ray-direction passes.
    geometry_vertex_shader,
    GEOMETRY_VERT_SPIRV,
    GEOMETRY_VERT
);
shader_accessor!(
    /// Back-face pass: writes exit positions.
    raydir_back_fragment_shader,
    RAYDIR_BACK_FRAG_SPIRV,
    RAYDIR_BACK_FRAG
);
shader_accessor!(
    /// Front-face pass: writes albedo and ray direction.
    raydir_front_fragment_shader,
    RAYDIR_FRONT_FRAG_SPIRV,
    RAYDIR_FRONT_FRAG
);
shader_accessor!(
    /// Fullscreen triangle for the lighting pass.
    lighting_vertex_shader,
    LIGHTING_VERT_SPIRV,
    LIGHTING_VERT
);
shader_accessor!(
    /// Volume march and compositing.
    lighting_fragment_shader,
    LIGHTING_FRAG_SPIRV,
    LIGHTING_FRAG
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_shaders_are_spirv() {
        for (name, shader) in [
            ("geometry.vert", geometry_vertex_shader()),
            ("raydir_back.frag", raydir_back_fragment_shader()),
            ("raydir_front.frag", raydir_front_fragment_shader()),
            ("lighting.vert", lighting_vertex_shader()),
            ("lighting.frag", lighting_fragment_shader()),
        ] {
            assert_eq!(shader[0], SPIRV_MAGIC, "{name}: invalid SPIR-V magic");
            assert!(shader.len() > 20, "{name}: module too small");
        }
    }

    #[test]
    fn accessors_are_cached() {
        assert_eq!(
            lighting_fragment_shader().as_ptr(),
            lighting_fragment_shader().as_ptr()
        );
    }
}
