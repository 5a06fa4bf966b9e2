//! Common utilities for draw path integration tests.
//!
//! Builds model payloads and materials against the recording device.

#![allow(dead_code)]

use std::sync::Arc;

use render_geometry::backend::{PrimitiveTopology, VertexElements};
use render_geometry::resources::{GeometryDesc, IndexBufferDesc, VertexBufferDesc};
use render_geometry::{Material, ModelData, RecordingDevice};

/// Route `log` output to the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Unit cube positions, four per face.
pub fn cube_positions() -> Vec<[f32; 3]> {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 0.5], [0.5, 0.0, 0.0], [0.0, 0.5, 0.0]),
        ([0.0, 0.0, -0.5], [-0.5, 0.0, 0.0], [0.0, 0.5, 0.0]),
        ([0.5, 0.0, 0.0], [0.0, 0.0, -0.5], [0.0, 0.5, 0.0]),
        ([-0.5, 0.0, 0.0], [0.0, 0.0, 0.5], [0.0, 0.5, 0.0]),
        ([0.0, 0.5, 0.0], [0.5, 0.0, 0.0], [0.0, 0.0, -0.5]),
        ([0.0, -0.5, 0.0], [0.5, 0.0, 0.0], [0.0, 0.0, 0.5]),
    ];
    let mut positions = Vec::with_capacity(24);
    for (center, right, up) in faces {
        for (r, u) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            positions.push([
                center[0] + right[0] * r + up[0] * u,
                center[1] + right[1] * r + up[1] * u,
                center[2] + right[2] * r + up[2] * u,
            ]);
        }
    }
    positions
}

/// Two triangles per face.
pub fn cube_indices() -> Vec<u16> {
    (0..6u16)
        .flat_map(|face| {
            let base = face * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect()
}

/// A cube split over two vertex streams (positions, then normal + texcoord)
/// and one 16-bit index stream, with a single 36-index geometry.
pub fn cube_model_data() -> ModelData {
    let positions = cube_positions();
    // Normal (12 bytes) + texcoord (8 bytes) per vertex; values are irrelevant here.
    let attributes = vec![0u8; positions.len() * 20];
    let indices = cube_indices();

    ModelData {
        name: "cube".to_string(),
        vertex_buffers: vec![
            VertexBufferDesc {
                data: bytemuck::cast_slice(&positions).to_vec(),
                vertex_count: positions.len() as u32,
                elements: VertexElements::POSITION,
                ..Default::default()
            },
            VertexBufferDesc {
                data: attributes,
                vertex_count: positions.len() as u32,
                elements: VertexElements::NORMAL | VertexElements::TEXCOORD1,
                ..Default::default()
            },
        ],
        index_buffers: vec![IndexBufferDesc {
            data: bytemuck::cast_slice(&indices).to_vec(),
            index_count: indices.len() as u32,
            index_size: 2,
        }],
        geometries: vec![vec![GeometryDesc {
            vertex_buffers: vec![0, 1],
            index_buffer: Some(0),
            topology: PrimitiveTopology::TriangleList,
            index_start: 0,
            index_count: 36,
            vertex_start: 0,
            vertex_count: 24,
            position_buffer_index: 0,
            lod_distance: 0.0,
        }]],
        geometry_names: vec!["cube".to_string()],
        ..Default::default()
    }
}

/// An opaque material with its own pipeline.
pub fn solid_material(device: &mut RecordingDevice, name: &str) -> Arc<Material> {
    let pipeline = device.create_render_pipeline();
    let parameters = device.create_bind_group();
    Arc::new(Material::new(name, pipeline).with_parameters(parameters))
}
