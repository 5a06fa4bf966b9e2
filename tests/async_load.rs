//! Integration tests for the staged model loader across threads.

mod common;

use std::sync::mpsc;
use std::thread;

use common::{cube_model_data, init_logging};
use render_geometry::backend::BackendError;
use render_geometry::resources::Attachments;
use render_geometry::{DrawConfig, GraphicsDevice, LoadError, LoadState, ModelLoader, RecordingDevice};

/// Staging runs on a worker; the render thread realizes and finishes.
#[test]
fn test_stage_on_worker_finish_on_render_thread() {
    init_logging();
    let (tx, rx) = mpsc::channel();

    let worker = thread::spawn(move || {
        let mut loader = ModelLoader::new();
        let result = loader.stage(cube_model_data());
        tx.send((loader, result)).unwrap();
    });

    let (mut loader, staged) = rx.recv().unwrap();
    worker.join().unwrap();
    staged.unwrap();
    assert_eq!(loader.state(), LoadState::BuffersStaged);

    let mut device = RecordingDevice::new();
    loader.realize_buffers(&mut device).unwrap();
    loader.build_geometries().unwrap();
    assert_eq!(loader.state(), LoadState::GeometriesBuilt(Attachments::default()));

    loader.attach_skeleton().unwrap();
    loader.compute_bounds().unwrap();
    loader.attach_morphs().unwrap();
    let mesh = loader.finish().unwrap();

    assert_eq!(loader.state(), LoadState::Ready);
    assert_eq!(mesh.geometry_name(0), Some("cube"));
    assert_eq!(device.live_buffer_count(), 3);
}

/// Cancelling after realization releases every buffer.
#[test]
fn test_cancel_releases_buffers() {
    let mut device = RecordingDevice::new();
    let mut loader = ModelLoader::new();
    loader.stage(cube_model_data()).unwrap();
    loader.realize_buffers(&mut device).unwrap();
    loader.build_geometries().unwrap();

    loader.cancel();

    assert_eq!(loader.state(), LoadState::Failed);
    assert_eq!(device.purge_released(), 3);
    assert_eq!(device.live_buffer_count(), 0);
}

/// Dropping an unfinished loader on another thread still releases its
/// buffers to the device's queue.
#[test]
fn test_abandoned_load_released_from_other_thread() {
    let mut device = RecordingDevice::new();
    let mut loader = ModelLoader::new();
    loader.stage(cube_model_data()).unwrap();
    loader.realize_buffers(&mut device).unwrap();

    thread::spawn(move || drop(loader)).join().unwrap();

    assert_eq!(device.release_queue().len(), 3);
    device.purge_released();
    assert_eq!(device.live_buffer_count(), 0);
}

/// Buffers of a finished mesh stay alive until the last drawable lets go.
#[test]
fn test_mesh_buffers_outlive_loader() {
    let mut device = RecordingDevice::new();
    let mesh = ModelLoader::load(cube_model_data(), &mut device, &DrawConfig::default()).unwrap();
    let shared = mesh.clone();

    drop(mesh);
    assert_eq!(device.purge_released(), 0);

    drop(shared);
    assert_eq!(device.purge_released(), 3);
}

/// A device failure mid-realization ends the load as failed, not ready.
#[test]
fn test_device_failure_is_not_fatal() {
    let mut device = RecordingDevice::new();
    device.fail_buffer_creation_after(2);

    let result = ModelLoader::load(cube_model_data(), &mut device, &DrawConfig::default());

    assert!(matches!(
        result,
        Err(LoadError::Backend(BackendError::BufferCreationFailed(_)))
    ));
    assert_eq!(device.purge_released(), 2);
}
