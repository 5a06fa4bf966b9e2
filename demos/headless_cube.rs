//! Headless cube demo
//!
//! Stages a two-stream cube on a worker thread, realizes it on the render
//! thread and draws one frame of instanced and static cubes into an
//! offscreen texture.
//!
//! ```bash
//! cargo run --example headless_cube
//! ```

use std::sync::{mpsc, Arc};
use std::thread;

use glam::{Quat, Vec3};
use render_geometry::backend::{PrimitiveTopology, VertexElements};
use render_geometry::resources::{
    GeometryDesc, IndexBufferDesc, MaterialUniformData, VertexBufferDesc,
};
use render_geometry::scene::Transform;
use render_geometry::{
    AffineTransform, BatchQueue, DrawConfig, Drawable, FrameInfo, InstancedModel, Material,
    ModelData, ModelLoader, StaticModel, WgpuDevice,
};
use wgpu::util::DeviceExt;

const WIDTH: u32 = 256;
const HEIGHT: u32 = 256;
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

const SHADER: &str = r#"
struct Affine {
    r0: vec4<f32>,
    r1: vec4<f32>,
    r2: vec4<f32>,
};

struct MaterialParams {
    base_color: vec4<f32>,
};

@group(0) @binding(0) var<storage, read> transforms: array<Affine>;
@group(1) @binding(0) var<uniform> material: MaterialParams;

struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) shade: f32,
};

@vertex
fn vs_main(
    @builtin(instance_index) instance: u32,
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
) -> VsOut {
    let t = transforms[instance];
    let p = vec4<f32>(position, 1.0);
    let world = vec3<f32>(dot(t.r0, p), dot(t.r1, p), dot(t.r2, p));
    let n = vec4<f32>(normal, 0.0);
    let world_normal = normalize(vec3<f32>(dot(t.r0, n), dot(t.r1, n), dot(t.r2, n)));

    var out: VsOut;
    out.position = vec4<f32>(world.xy * 0.2, 0.5 - world.z * 0.01, 1.0);
    out.shade = 0.3 + 0.7 * max(dot(world_normal, normalize(vec3<f32>(0.3, 0.5, 1.0))), 0.0);
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return vec4<f32>(material.base_color.rgb * in.shade, material.base_color.a);
}
"#;

fn cube_data() -> ModelData {
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (-Vec3::Z, -Vec3::X, Vec3::Y),
        (Vec3::X, -Vec3::Z, Vec3::Y),
        (-Vec3::X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, -Vec3::Z),
        (-Vec3::Y, Vec3::X, Vec3::Z),
    ];

    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut attributes: Vec<[f32; 5]> = Vec::new();
    let mut indices: Vec<u16> = Vec::new();
    for (normal, right, up) in faces {
        let base = positions.len() as u16;
        for (u, v) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let p = (normal + right * u + up * v) * 0.5;
            positions.push(p.to_array());
            attributes.push([normal.x, normal.y, normal.z, (u + 1.0) * 0.5, (v + 1.0) * 0.5]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

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
                data: bytemuck::cast_slice(&attributes).to_vec(),
                vertex_count: attributes.len() as u32,
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
            index_count: indices.len() as u32,
            vertex_count: positions.len() as u32,
            ..Default::default()
        }]],
        geometry_names: vec!["cube".to_string()],
        ..Default::default()
    }
}

/// Build a pipeline and parameter bind group for a solid color material.
fn create_material(device: &mut WgpuDevice, name: &str, color: glam::Vec4) -> Material {
    let gpu = device.device();
    let shader = gpu.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(SHADER.into()),
    });

    let material_layout = gpu.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("material layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    });

    let pipeline_layout = gpu.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(name),
        bind_group_layouts: &[device.transform_bind_group_layout(), &material_layout],
        push_constant_ranges: &[],
    });

    let position_attrs = [wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    }];
    let normal_attrs = [wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 1,
    }];
    let vertex_buffers = [
        wgpu::VertexBufferLayout {
            array_stride: VertexElements::POSITION.vertex_size() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &position_attrs,
        },
        wgpu::VertexBufferLayout {
            array_stride: (VertexElements::NORMAL | VertexElements::TEXCOORD1).vertex_size() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &normal_attrs,
        },
    ];

    let pipeline = gpu.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(name),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &vertex_buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: FORMAT,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    });

    let params = gpu.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(name),
        contents: bytemuck::bytes_of(&MaterialUniformData { base_color: color }),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let bind_group = gpu.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(name),
        layout: &material_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: params.as_entire_binding(),
        }],
    });

    let pipeline = device.register_render_pipeline(pipeline, PrimitiveTopology::TriangleList);
    let bind_group = device.register_bind_group(bind_group);
    Material::new(name, pipeline)
        .with_base_color(color)
        .with_parameters(bind_group)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DrawConfig::default();

    // Stage off the render thread
    let (tx, rx) = mpsc::channel();
    let stage_config = config.clone();
    let worker = thread::spawn(move || {
        let mut loader = ModelLoader::from_config(&stage_config);
        let staged = loader.stage(cube_data());
        let _ = tx.send((loader, staged));
    });

    let mut device = match WgpuDevice::new_headless() {
        Ok(device) => device,
        Err(err) => {
            log::error!("No GPU available: {err}");
            return;
        }
    };

    let Ok((mut loader, staged)) = rx.recv() else {
        log::error!("Loader thread exited early");
        return;
    };
    let _ = worker.join();

    let mesh = match staged
        .and_then(|_| loader.realize_buffers(&mut device))
        .and_then(|_| loader.build_geometries())
        .and_then(|_| loader.attach_morphs())
        .and_then(|_| loader.attach_skeleton())
        .and_then(|_| loader.compute_bounds())
        .and_then(|_| loader.finish())
    {
        Ok(mesh) => mesh,
        Err(err) => {
            log::error!("Cube failed to load: {err}");
            return;
        }
    };

    let red = Arc::new(create_material(&mut device, "red", glam::Vec4::new(0.9, 0.2, 0.2, 1.0)));
    let grey = Arc::new(create_material(&mut device, "grey", glam::Vec4::new(0.6, 0.6, 0.6, 1.0)));

    let mut hero = StaticModel::from_config(Arc::clone(&red), &config);
    hero.set_model(Arc::clone(&mesh));
    hero.set_world_transform(
        Transform::from_position_rotation(Vec3::ZERO, Quat::from_rotation_y(0.6) * Quat::from_rotation_x(0.4))
            .to_affine(),
    );

    let mut ring = InstancedModel::new(grey);
    ring.set_model(mesh);
    for i in 0..8 {
        let angle = i as f32 / 8.0 * std::f32::consts::TAU;
        ring.add_instance(AffineTransform::from_scale_rotation_translation(
            Vec3::splat(0.4),
            Quat::from_rotation_z(angle),
            Vec3::new(angle.cos() * 3.5, angle.sin() * 3.5, 0.0),
        ));
    }

    let frame = FrameInfo::new(Vec3::new(0.0, 0.0, 10.0), &config);
    hero.update_batches(&frame);
    ring.update_batches(&frame);
    let queue = BatchQueue::from_drawables([&hero as &dyn Drawable, &ring as &dyn Drawable], &frame);
    queue.draw(&mut device);
    device.prepare_frame();

    let target = device.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen target"),
        size: wgpu::Extent3d {
            width: WIDTH,
            height: HEIGHT,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = device
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame") });
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("cube pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.05,
                        g: 0.05,
                        b: 0.08,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        device.replay(&mut pass);
    }
    device.queue().submit(Some(encoder.finish()));

    log::info!(
        "Rendered {} batches ({} commands) into a {WIDTH}x{HEIGHT} target",
        queue.len(),
        device.recorded_command_count()
    );

    drop(queue);
    drop(hero);
    drop(ring);
    device.reset_frame();
}
