//! Integration tests for the drawable-to-draw-call path.
//!
//! Every test runs against the recording device and inspects the exact
//! calls the path submits.

mod common;

use std::sync::Arc;

use glam::Vec3;
use rstest::rstest;

use common::{cube_model_data, init_logging, solid_material};
use render_geometry::backend::{DeviceCall, IndexFormat, PrimitiveTopology};
use render_geometry::resources::GeometryError;
use render_geometry::{
    AffineTransform, BatchPass, BatchQueue, DrawConfig, Drawable, FrameInfo, GeometryType, GraphicsDevice,
    LoadError, LoadState, ModelLoader, RecordingDevice, StaticModel,
};

// ============================================================================
// End-to-end
// ============================================================================

/// A two-stream indexed cube seen from distance 10 yields one static batch
/// that draws 36 indices.
#[test]
fn test_cube_single_indexed_draw() {
    init_logging();
    let mut device = RecordingDevice::new();
    let config = DrawConfig::default();
    let mesh = ModelLoader::load(cube_model_data(), &mut device, &config).unwrap();
    assert_eq!(mesh.vertex_buffers().len(), 2);
    assert_eq!(mesh.index_buffers().len(), 1);

    let mut model = StaticModel::new(solid_material(&mut device, "cube"));
    model.set_model(mesh);

    let frame = FrameInfo::new(Vec3::new(0.0, 0.0, 10.0), &config);
    model.update_batches(&frame);
    let mut batches = Vec::new();
    model.collect_batches(&frame, &mut batches);

    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert!((batch.distance - 10.0).abs() < 1e-5);
    assert_eq!(batch.geometry_type, GeometryType::Static);
    assert_eq!(batch.num_transforms(), 1);

    batch.issue_draw(&mut device, true);

    let draws = device.draw_calls();
    assert_eq!(draws.len(), 1);
    assert_eq!(
        draws[0],
        &DeviceCall::DrawIndexed {
            topology: PrimitiveTopology::TriangleList,
            index_start: 0,
            index_count: 36,
            min_vertex: 0,
            vertex_count: 24,
        }
    );
}

/// Both vertex streams are bound in slot order with their element masks.
#[test]
fn test_cube_binds_both_streams() {
    let mut device = RecordingDevice::new();
    let mesh = ModelLoader::load(cube_model_data(), &mut device, &DrawConfig::default()).unwrap();
    let geometry = mesh.geometry(0, 0).unwrap();

    geometry.issue_draw(&mut device);

    let expected_buffers: Vec<_> = mesh.vertex_buffers().iter().map(|vb| vb.handle()).collect();
    let expected_masks: Vec<_> = mesh.vertex_buffers().iter().map(|vb| vb.elements()).collect();
    assert_eq!(
        device.calls(),
        &[
            DeviceCall::SetIndexBuffer {
                buffer: mesh.index_buffers()[0].handle(),
                format: IndexFormat::Uint16,
            },
            DeviceCall::SetVertexBuffers {
                buffers: expected_buffers,
                element_masks: expected_masks,
            },
            DeviceCall::DrawIndexed {
                topology: PrimitiveTopology::TriangleList,
                index_start: 0,
                index_count: 36,
                min_vertex: 0,
                vertex_count: 24,
            },
        ]
    );
}

/// A sub-range whose indices start past vertex 0 draws its indices as-is;
/// the vertex range is reported as the lowest referenced vertex and a count.
#[test]
fn test_sub_range_draws_absolute_indices() {
    let mut data = cube_model_data();
    let desc = &mut data.geometries[0][0];
    desc.index_start = 6;
    desc.index_count = 12;
    desc.vertex_start = 4;
    desc.vertex_count = 8;

    let mut device = RecordingDevice::new();
    let mesh = ModelLoader::load(data, &mut device, &DrawConfig::default()).unwrap();
    let geometry = mesh.geometry(0, 0).unwrap();
    assert_eq!(geometry.vertex_start(), 4);
    assert_eq!(geometry.index_start(), 6);

    geometry.issue_draw(&mut device);

    assert_eq!(
        device.draw_calls(),
        vec![&DeviceCall::DrawIndexed {
            topology: PrimitiveTopology::TriangleList,
            index_start: 6,
            index_count: 12,
            min_vertex: 4,
            vertex_count: 8,
        }]
    );
}

// ============================================================================
// Load failures
// ============================================================================

/// A descriptor whose vertex range runs past the 24-vertex streams fails the
/// load instead of drawing out of bounds.
#[rstest]
#[case::past_end(20, 8)]
#[case::overflow(u32::MAX, 2)]
fn test_vertex_range_past_streams_fails(#[case] vertex_start: u32, #[case] vertex_count: u32) {
    init_logging();
    let mut data = cube_model_data();
    data.geometries[0][0].vertex_start = vertex_start;
    data.geometries[0][0].vertex_count = vertex_count;

    let mut device = RecordingDevice::new();
    let mut loader = ModelLoader::new();
    loader.stage(data).unwrap();
    loader.realize_buffers(&mut device).unwrap();

    let err = loader.build_geometries().unwrap_err();
    assert_eq!(
        err,
        LoadError::Geometry {
            geometry: 0,
            lod: 0,
            source: GeometryError::VertexRangeOutOfBounds {
                start: vertex_start,
                count: vertex_count,
                len: 24,
            },
        }
    );
    assert_eq!(loader.state(), LoadState::Failed);
    assert_eq!(device.purge_released(), 3);
}

/// A geometry that names a vertex buffer beyond the staged list never
/// becomes ready, and the buffers it did create are released.
#[rstest]
#[case::vertex_buffer(2, None)]
#[case::index_buffer(0, Some(1))]
fn test_out_of_range_buffer_fails(#[case] vertex_buffer: usize, #[case] index_buffer: Option<usize>) {
    init_logging();
    let mut data = cube_model_data();
    data.geometries[0][0].vertex_buffers = vec![vertex_buffer];
    data.geometries[0][0].index_buffer = index_buffer.or(Some(0));

    let mut device = RecordingDevice::new();
    let mut loader = ModelLoader::new();
    loader.stage(data).unwrap();
    loader.realize_buffers(&mut device).unwrap();

    let err = loader.build_geometries().unwrap_err();
    assert!(matches!(
        err,
        LoadError::VertexBufferIndex { .. } | LoadError::IndexBufferIndex { .. }
    ));
    assert_eq!(loader.state(), LoadState::Failed);
    assert!(loader.finish().is_err());

    assert_eq!(device.purge_released(), 3);
    assert_eq!(device.live_buffer_count(), 0);
}

// ============================================================================
// Frame assembly
// ============================================================================

/// Disabled geometries drop out of the frame; the rest is sorted and issued.
#[test]
fn test_queue_over_several_models() {
    let mut device = RecordingDevice::new();
    let config = DrawConfig::default();
    let mesh = ModelLoader::load(cube_model_data(), &mut device, &config).unwrap();
    let material = solid_material(&mut device, "cube");

    let mut models: Vec<StaticModel> = [5.0, -20.0, -2.0]
        .into_iter()
        .map(|z| {
            let mut model = StaticModel::new(Arc::clone(&material));
            model.set_model(Arc::clone(&mesh));
            model.set_world_transform(AffineTransform::from_translation(Vec3::new(0.0, 0.0, z)));
            model
        })
        .collect();
    models[2].set_geometry_enabled(0, false).unwrap();

    let frame = FrameInfo::new(Vec3::new(0.0, 0.0, 10.0), &config);
    for model in &mut models {
        model.update_batches(&frame);
    }
    let queue = BatchQueue::from_drawables(models.iter().map(|m| m as &dyn Drawable), &frame);

    let distances: Vec<f32> = queue.opaque().iter().map(|b| b.distance).collect();
    assert_eq!(distances, vec![5.0, 30.0]);

    queue.draw(&mut device);
    assert_eq!(device.draw_calls().len(), 2);
}

/// Drawables outside the frame's view mask contribute nothing.
#[test]
fn test_view_mask_filters_drawables() {
    let mut device = RecordingDevice::new();
    let config = DrawConfig::default();
    let mesh = ModelLoader::load(cube_model_data(), &mut device, &config).unwrap();

    let mut model = StaticModel::new(solid_material(&mut device, "cube"));
    model.set_model(mesh);
    model.set_view_mask(0b10);

    let frame = FrameInfo {
        view_mask: 0b01,
        ..FrameInfo::new(Vec3::ZERO, &config)
    };
    let queue = BatchQueue::from_drawables([&model as &dyn Drawable], &frame);
    assert!(queue.is_empty());
}

/// Occlusion passes use the occlusion LOD level configured for new drawables.
#[test]
fn test_configured_occlusion_lod() {
    let mut device = RecordingDevice::new();
    let mut data = cube_model_data();
    let mut coarse = data.geometries[0][0].clone();
    coarse.index_count = 6;
    coarse.lod_distance = 100.0;
    data.geometries[0].push(coarse);

    let config = DrawConfig {
        default_occlusion_lod_level: Some(1),
        ..Default::default()
    };
    let mesh = ModelLoader::load(data, &mut device, &config).unwrap();
    let mut model = StaticModel::from_config(solid_material(&mut device, "cube"), &config);
    model.set_model(mesh);

    let frame = FrameInfo::new(Vec3::new(0.0, 0.0, 10.0), &config);
    model.update_batches(&frame);

    let mut batches = Vec::new();
    model.collect_batches(&frame, &mut batches);
    model.collect_batches(&frame.with_pass(BatchPass::Occlusion), &mut batches);
    let counts: Vec<u32> = batches.iter().map(|b| b.geometry.index_count()).collect();
    assert_eq!(counts, vec![36, 6]);
}
