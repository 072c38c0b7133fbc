//! Draws the plain colored meshes of a scene graph.
//!
//! Used for the main view and for every face of a GPU environment capture.
//! Meshes with an effect surface are skipped.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::gpu::mesh::{GpuMesh, Vertex};
use crate::mesh_asset::MeshAsset;
use crate::scene_graph::SceneGraph;

/// Maximum number of meshes that can be drawn per pass.
/// Each mesh needs its own uniform slot in the dynamic uniform buffer.
pub const MAX_MESHES_PER_PASS: usize = 256;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
const UNIFORM_ALIGNMENT: usize = 256;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct MeshUniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    color: [f32; 4],
    eye: [f32; 4],
    // Padding to reach 256-byte alignment (160 bytes of data + 96 bytes padding)
    _padding: [f32; 24],
}

/// Depth buffer view for a `width` x `height` target.
pub fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Identity of a shared mesh asset. Asset ids are not unique (two OBJ files
/// may share a stem), the allocation is.
fn mesh_key(asset: &Arc<MeshAsset>) -> usize {
    Arc::as_ptr(asset) as usize
}

pub struct ScenePass {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// GPU buffers per mesh asset. The cache holds the asset so its address
    /// cannot be reused by another one.
    meshes: HashMap<usize, (Arc<MeshAsset>, GpuMesh)>,
    /// Mesh keys in uniform slot order, filled by `prepare`.
    draws: Vec<usize>,
}

impl ScenePass {
    /// `cull_mode` must be `None` when drawing cube faces, whose view
    /// matrices mirror.
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat, cull_mode: Option<wgpu::Face>) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_MESHES_PER_PASS) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<MeshUniforms>() as u64),
                },
                count: None,
            }],
            label: Some("scene_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<MeshUniforms>() as u64),
                }),
            }],
            label: Some("scene_bind_group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::include_wgsl!("shader_scene.wgsl"));

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            uniform_buffer,
            bind_group,
            meshes: HashMap::new(),
            draws: Vec::new(),
        }
    }

    /// Upload missing mesh buffers and write one uniform slot per mesh.
    ///
    /// `queue.write_buffer` takes effect at the next submit, so the pass
    /// drawn with these uniforms must be submitted before `prepare` is
    /// called again.
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &SceneGraph, view_proj: Mat4, eye: Vec3) {
        self.draws.clear();

        let meshes: Vec<_> = scene.color_meshes().collect();
        if meshes.len() > MAX_MESHES_PER_PASS {
            log::warn!(
                "Too many meshes ({} > {}), some will not be rendered",
                meshes.len(),
                MAX_MESHES_PER_PASS
            );
        }

        for (slot, (_id, instance, color)) in meshes.into_iter().take(MAX_MESHES_PER_PASS).enumerate() {
            let asset = &instance.mesh;
            let key = mesh_key(asset);
            self.meshes
                .entry(key)
                .or_insert_with(|| (asset.clone(), GpuMesh::from_asset(device, asset)));

            let uniforms = MeshUniforms {
                view_proj: view_proj.to_cols_array_2d(),
                model: instance.transform.matrix().to_cols_array_2d(),
                color,
                eye: eye.extend(1.0).to_array(),
                _padding: [0.0; 24],
            };
            queue.write_buffer(
                &self.uniform_buffer,
                (slot * UNIFORM_ALIGNMENT) as u64,
                bytemuck::cast_slice(&[uniforms]),
            );
            self.draws.push(key);
        }
    }

    /// Record the draws written by the last `prepare`.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        for (slot, key) in self.draws.iter().enumerate() {
            if let Some((_, mesh)) = self.meshes.get(key) {
                pass.set_bind_group(0, &self.bind_group, &[(slot * UNIFORM_ALIGNMENT) as u32]);
                mesh.draw(pass);
            }
        }
    }

    /// Number of meshes drawn by the next `draw`.
    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }
}
