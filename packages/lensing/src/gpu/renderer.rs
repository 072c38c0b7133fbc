//! Frame composition: the scene pass, then every black hole over it.

use std::collections::HashMap;
use std::iter;
use std::sync::Arc;

use crate::black_hole::BlackHole;
use crate::camera::Camera;
use crate::error::EffectError;
use crate::gpu::material_pipeline::{BlackHolePipeline, EffectGlobals, EffectGpuResources};
use crate::gpu::scene_pass::{create_depth_view, ScenePass};
use crate::scene_graph::{EntityId, SceneGraph};

pub struct Renderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    size: wgpu::Extent3d,
    depth_view: wgpu::TextureView,
    scene_pass: ScenePass,
    /// Created with the first effect, from its material and shader.
    black_hole_pipeline: Option<BlackHolePipeline>,
    effects: HashMap<EntityId, EffectGpuResources>,
}

impl Renderer {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let scene_pass = ScenePass::new(&device, format, Some(wgpu::Face::Back));
        let depth_view = create_depth_view(&device, width, height);
        Self {
            device,
            queue,
            format,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            depth_view,
            scene_pass,
            black_hole_pipeline: None,
            effects: HashMap::new(),
        }
    }

    /// Create GPU resources for a black hole. Its environment map must come
    /// from a GPU capture.
    pub fn add_effect(&mut self, effect: &BlackHole, scene: &SceneGraph) -> Result<(), EffectError> {
        let instance = scene
            .mesh(effect.entity())
            .ok_or_else(|| EffectError::Gpu(format!("effect entity {:?} no longer exists", effect.entity())))?;

        let bound = effect.material();
        let pipeline = self.black_hole_pipeline.get_or_insert_with(|| {
            BlackHolePipeline::new(&self.device, self.format, bound.material(), bound.shader())
        });
        let resources = pipeline.create_resources(&self.device, &self.queue, bound, &instance.mesh)?;
        self.effects.insert(effect.entity(), resources);
        log::debug!("Added GPU resources for effect {:?}", effect.entity());
        Ok(())
    }

    pub fn render(&mut self, target: &wgpu::TextureView, scene: &SceneGraph, camera: &Camera, effects: &[BlackHole], time: f32) {
        let aspect = self.size.width as f32 / self.size.height as f32;
        let view_proj = camera.view_projection_matrix(aspect);

        self.scene_pass.prepare(&self.device, &self.queue, scene, view_proj, camera.position);

        // Effects that are still in the scene and have GPU resources.
        let mut visible = Vec::new();
        for effect in effects {
            let entity = effect.entity();
            let Some(resources) = self.effects.get(&entity) else {
                log::debug!("Effect {:?} has no GPU resources, skipping", entity);
                continue;
            };
            let Some(instance) = scene.mesh(entity) else {
                continue;
            };
            if !instance.visible || !scene.is_in_scene(entity) {
                continue;
            }
            let globals = EffectGlobals::new(view_proj, instance.transform.matrix(), camera.position, time);
            resources.upload(&self.queue, &globals, effect.material());
            visible.push(resources);
        }

        let [r, g, b, a] = scene.clear_color;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.scene_pass.draw(&mut pass);
        }

        if let (Some(pipeline), false) = (&self.black_hole_pipeline, visible.is_empty()) {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Effect Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            for resources in &visible {
                resources.draw(&mut pass, pipeline);
            }
        }

        self.queue.submit(iter::once(encoder.finish()));
    }
}
