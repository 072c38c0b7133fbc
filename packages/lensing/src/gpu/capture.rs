//! Environment capture on the GPU.
//!
//! Faces are rendered one submit at a time into the array layers of a
//! cube texture, which is then sampled through a cube view.

use std::sync::Arc;

use crate::camera::CubeFace;
use crate::capture::{CaptureBackend, CubemapStorage, EnvironmentMap, HDR_CUBEMAP_FORMAT};
use crate::error::EffectError;
use crate::gpu::scene_pass::{create_depth_view, ScenePass};
use crate::scene_graph::{EntityId, SceneGraph};

pub struct GpuCaptureBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    scene_pass: ScenePass,
}

impl GpuCaptureBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let scene_pass = ScenePass::new(&device, HDR_CUBEMAP_FORMAT, None);
        Self {
            device,
            queue,
            scene_pass,
        }
    }
}

impl CaptureBackend for GpuCaptureBackend {
    fn allocate_cubemap(&mut self, resolution: u32) -> Result<EnvironmentMap, EffectError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if resolution == 0 || resolution > max {
            return Err(EffectError::CubemapAllocation {
                resolution,
                reason: format!("face size must be in 1..={} on this device", max),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Environment Cubemap"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HDR_CUBEMAP_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(EffectError::CubemapAllocation {
                resolution,
                reason: error.to_string(),
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Environment Cubemap View"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        Ok(EnvironmentMap::new(
            resolution,
            HDR_CUBEMAP_FORMAT,
            CubemapStorage::Gpu { texture, view },
        ))
    }

    fn render_to_cubemap(
        &mut self,
        scene: &SceneGraph,
        probe: EntityId,
        target: &mut EnvironmentMap,
    ) -> Result<(), EffectError> {
        let probe = scene
            .probe(probe)
            .ok_or_else(|| EffectError::Capture(format!("probe {:?} is not in the scene graph", probe)))?;
        let resolution = target.resolution();
        let texture = match target.storage() {
            CubemapStorage::Gpu { texture, .. } => texture,
            CubemapStorage::Software(_) => {
                return Err(EffectError::Capture("GPU backend cannot render into a software cubemap".to_string()));
            }
        };

        let eye = probe.transform.position;
        let depth_view = create_depth_view(&self.device, resolution, resolution);
        let [r, g, b, a] = scene.clear_color;
        let clear = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        for face in CubeFace::ALL {
            let view_proj = probe.camera.face_view_projection(face, eye);
            self.scene_pass.prepare(&self.device, &self.queue, scene, view_proj, eye);

            let face_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Environment Cubemap Face"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: face.layer(),
                array_layer_count: Some(1),
                ..Default::default()
            });

            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Encoder"),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Capture Face Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &face_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(clear),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &depth_view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Discard,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                self.scene_pass.draw(&mut pass);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
            log::trace!("Captured face {:?} ({} meshes)", face, self.scene_pass.draw_count());
        }

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(EffectError::Capture(error.to_string())),
            None => Ok(()),
        }
    }
}
