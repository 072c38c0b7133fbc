use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::black_hole::{BlackHole, BlackHoleDescriptor, EffectAssets};
use crate::camera::Camera;
use crate::capture::SoftwareCaptureBackend;
use crate::config::EffectConfig;
use crate::gpu::capture::GpuCaptureBackend;
use crate::gpu::renderer::Renderer;
use crate::material::{ParamType, ParamValue};
use crate::mesh_asset::MeshAsset;
use crate::scene_graph::{SceneGraph, Surface, Transform};
use crate::texture::Texture2d;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a demo scene with one black hole to PNG frames
    Render {
        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Effect configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of frames
        #[arg(long, default_value_t = 60)]
        frames: u32,

        /// Frames per second
        #[arg(long, default_value_t = 30.0, value_parser = parse_fps)]
        fps: f32,

        /// Output width
        #[arg(long, default_value_t = 800, value_parser = clap::value_parser!(u32).range(1..))]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u32).range(1..))]
        height: u32,

        /// Seed for the tilt and the generated disk noise
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Base mesh (OBJ) instead of the built-in icosphere
        #[arg(long)]
        mesh: Option<PathBuf>,

        /// Disk noise image instead of generated noise
        #[arg(long)]
        noise: Option<PathBuf>,
    },
    /// Initialize a black hole without a GPU and print its bound slots as JSON
    Bindings {
        /// Effect configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed for the tilt and the generated disk noise
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Cubemap face size, overriding the configured one
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        resolution: Option<u32>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            out,
            config,
            frames,
            fps,
            width,
            height,
            seed,
            mesh,
            noise,
        } => {
            let config = load_config(config.as_deref())?;
            let assets = load_assets(seed, mesh.as_deref(), noise.as_deref())?;
            pollster::block_on(render_offline(config, assets, out, frames, fps, width, height, seed))?;
        }
        Commands::Bindings {
            config,
            seed,
            resolution,
        } => {
            let config = bindings_config(config.as_deref(), resolution)?;
            print_bindings(config, seed)?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EffectConfig> {
    match path {
        Some(path) => EffectConfig::load(path).with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(EffectConfig::default()),
    }
}

fn bindings_config(path: Option<&Path>, resolution: Option<u32>) -> Result<EffectConfig> {
    let mut config = load_config(path)?;
    if let Some(resolution) = resolution {
        config.lensing_resolution = resolution;
    }
    Ok(config)
}

fn parse_fps(s: &str) -> Result<f32, String> {
    let fps: f32 = s.parse().map_err(|e| format!("{}", e))?;
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err(format!("fps must be a positive number, got {}", s))
    }
}

fn load_assets(seed: u64, mesh: Option<&Path>, noise: Option<&Path>) -> Result<EffectAssets> {
    let mut assets = EffectAssets::builtin(seed);
    if let Some(path) = mesh {
        let asset = MeshAsset::load_obj(path).map_err(|e| anyhow!(e))?;
        assets.mesh = Some(Arc::new(asset));
    }
    if let Some(path) = noise {
        let texture = Texture2d::load(path).map_err(|e| anyhow!(e))?;
        assets.noise = Some(Arc::new(texture));
    }
    Ok(assets)
}

/// A ring of colored spheres and cubes around the origin, where the black
/// hole goes.
fn demo_scene() -> SceneGraph {
    let mut scene = SceneGraph::new();
    scene.clear_color = [0.01, 0.01, 0.03, 1.0];

    let sphere = Arc::new(MeshAsset::uv_sphere());
    let cube = Arc::new(MeshAsset::cube());
    let count = 12;
    for i in 0..count {
        let angle = i as f32 / count as f32 * std::f32::consts::TAU;
        let hue = i as f32 / count as f32;
        let color = [
            0.5 + 0.5 * (hue * std::f32::consts::TAU).cos(),
            0.5 + 0.5 * ((hue + 1.0 / 3.0) * std::f32::consts::TAU).cos(),
            0.5 + 0.5 * ((hue + 2.0 / 3.0) * std::f32::consts::TAU).cos(),
            1.0,
        ];
        let mesh = if i % 2 == 0 { sphere.clone() } else { cube.clone() };
        let id = scene.create_mesh(mesh, Surface::Color(color));
        if let Some(instance) = scene.mesh_mut(id) {
            instance.transform.position = Vec3::new(angle.cos() * 300.0, (i as f32 - 6.0) * 15.0, angle.sin() * 300.0);
            instance.transform.scale = Vec3::splat(40.0);
            instance.transform.rotation = Vec3::new(angle, angle * 0.5, 0.0);
        }
        scene.add_to_scene(id);
    }
    scene
}

#[derive(Serialize)]
struct SlotReport {
    name: String,
    param_type: ParamType,
    value: ParamValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f32>,
    description: String,
}

#[derive(Serialize)]
struct BindingsReport {
    radius: f32,
    scale: f32,
    tilt_degrees: [f32; 3],
    slots: Vec<SlotReport>,
}

fn print_bindings(config: EffectConfig, seed: u64) -> Result<()> {
    let mut scene = demo_scene();
    let mut backend = SoftwareCaptureBackend::new();
    let mut rng = StdRng::seed_from_u64(seed);
    let descriptor = BlackHoleDescriptor::new(config, EffectAssets::builtin(seed));
    let black_hole = descriptor.initialize(&mut scene, &mut backend, &mut rng, Transform::default())?;

    let bound = black_hole.material();
    let slots = bound
        .material()
        .params
        .iter()
        .filter_map(|def| {
            bound.slot(&def.name).map(|value| SlotReport {
                name: def.name.clone(),
                param_type: def.param_type,
                value,
                min: def.min,
                max: def.max,
                description: def.description.clone(),
            })
        })
        .collect();

    let scale = scene
        .mesh(black_hole.entity())
        .map(|instance| instance.transform.scale.x)
        .unwrap_or_default();
    let report = BindingsReport {
        radius: black_hole.radius(),
        scale,
        tilt_degrees: black_hole.tilt_degrees().to_array(),
        slots,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn render_offline(
    config: EffectConfig,
    assets: EffectAssets,
    out_dir: PathBuf,
    frames: u32,
    fps: f32,
    width: u32,
    height: u32,
    seed: u64,
) -> Result<()> {
    std::fs::create_dir_all(&out_dir)?;

    // WGPU Init
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // Headless
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow!("No adapter found"))?;
    log::info!("Using adapter {}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;
    let device = Arc::new(device);
    let queue = Arc::new(queue);

    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Target Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };
    let texture = device.create_texture(&texture_desc);
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Buffer for reading back data
    let unpadded_bytes_per_row = 4 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Output Buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut scene = demo_scene();
    let mut backend = GpuCaptureBackend::new(device.clone(), queue.clone());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut black_hole: BlackHole = BlackHoleDescriptor::new(config, assets).initialize(
        &mut scene,
        &mut backend,
        &mut rng,
        Transform::default(),
    )?;

    let mut renderer = Renderer::new(device.clone(), queue.clone(), texture_desc.format, width, height);
    renderer.add_effect(&black_hole, &scene)?;

    let orbit_radius = black_hole.radius() * 2.5;
    let mut camera = Camera {
        far: 20_000.0,
        ..Default::default()
    };

    println!("Rendering {} frames to {:?}...", frames, out_dir);

    for i in 0..frames {
        let time = i as f32 / fps;
        let angle = time * 0.2;
        camera.position = Vec3::new(angle.cos() * orbit_radius, orbit_radius * 0.25, angle.sin() * orbit_radius);

        black_hole.update_from_scene(&scene);
        renderer.render(&texture_view, &scene, &camera, std::slice::from_ref(&black_hole), time);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            texture_desc.size,
        );
        queue.submit(Some(encoder.finish()));

        // Map buffer and save
        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()?.context("Failed to map output buffer")?;

        let data = buffer_slice.get_mapped_range();
        let mut unpadded_data = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            let end = start + unpadded_bytes_per_row as usize;
            unpadded_data.extend_from_slice(&data[start..end]);
        }

        let frame_path = out_dir.join(format!("frame_{:05}.png", i));
        image::save_buffer(&frame_path, &unpadded_data, width, height, image::ColorType::Rgba8)
            .with_context(|| format!("Failed to write {}", frame_path.display()))?;

        drop(data);
        output_buffer.unmap();

        if i % 30 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }
    println!("\nDone.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_render() {
        let cli = Cli::try_parse_from(["lensing", "render", "--out", "frames", "--frames", "3", "--seed", "9"]).unwrap();
        match cli.command {
            Commands::Render {
                out, frames, seed, width, ..
            } => {
                assert_eq!(out, PathBuf::from("frames"));
                assert_eq!(frames, 3);
                assert_eq!(seed, 9);
                assert_eq!(width, 800);
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_cli_requires_out_for_render() {
        assert!(Cli::try_parse_from(["lensing", "render"]).is_err());
    }

    #[test]
    fn test_cli_rejects_degenerate_render_sizes() {
        for args in [
            ["lensing", "render", "--out", "f", "--width", "0"],
            ["lensing", "render", "--out", "f", "--height", "0"],
            ["lensing", "render", "--out", "f", "--fps", "0"],
            ["lensing", "render", "--out", "f", "--fps", "inf"],
        ] {
            assert!(Cli::try_parse_from(args).is_err(), "{:?}", args);
        }
        assert!(Cli::try_parse_from(["lensing", "render", "--out", "f", "--fps", "24"]).is_ok());
    }

    #[test]
    fn test_bindings_keeps_configured_resolution() {
        let path = std::env::temp_dir().join(format!("lensing_bindings_{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "lensing_resolution": 256 }"#).unwrap();

        let cli = Cli::try_parse_from(["lensing", "bindings", "--config", path.to_str().unwrap()]).unwrap();
        let Commands::Bindings { config, resolution, .. } = cli.command else {
            panic!("expected bindings");
        };
        assert_eq!(resolution, None);
        let loaded = bindings_config(config.as_deref(), resolution).unwrap();
        assert_eq!(loaded.lensing_resolution, 256);

        let overridden = bindings_config(Some(&path), Some(32)).unwrap();
        assert_eq!(overridden.lensing_resolution, 32);

        std::fs::remove_file(&path).ok();
        assert!(Cli::try_parse_from(["lensing", "bindings", "--resolution", "0"]).is_err());
    }

    #[test]
    fn test_demo_scene_is_capturable() {
        let scene = demo_scene();
        assert_eq!(scene.color_meshes().count(), 12);
    }

    #[test]
    fn test_builtin_assets_with_overrides_missing_files() {
        assert!(load_assets(0, Some(Path::new("/nonexistent/mesh.obj")), None).is_err());
        assert!(load_assets(0, None, None).is_ok());
    }
}
