//! Effect materials: parameter schemas, shader programs and bound parameter sets.
//!
//! A [`Material`] describes which named slots a shader exposes and how it is
//! rasterized. A [`BoundMaterial`] is one effect instance's view of that
//! material: typed values for every slot plus the textures it samples.

use std::borrow::Cow;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::Serialize;

use crate::capture::EnvironmentMap;
use crate::texture::Texture2d;

/// Types of shader parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Signed integer. Booleans are bound as 0 or 1.
    Int,
    Float,
    Vec3,
    /// RGBA color.
    Color,
    Texture2d,
    Cubemap,
}

/// Current or default value of a slot.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    Vec3([f32; 3]),
    Color([f32; 4]),
    /// A bound 2D texture, described by label and size.
    Texture2d { label: String, width: u32, height: u32 },
    /// A bound cubemap, described by face size.
    Cubemap { resolution: u32 },
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Vec3(_) => ParamType::Vec3,
            ParamValue::Color(_) => ParamType::Color,
            ParamValue::Texture2d { .. } => ParamType::Texture2d,
            ParamValue::Cubemap { .. } => ParamType::Cubemap,
        }
    }
}

/// A shader parameter definition.
#[derive(Clone, Debug, Serialize)]
pub struct ParamDef {
    /// Slot name, as seen by the shader.
    pub name: String,
    pub param_type: ParamType,
    /// Value used when nothing else is bound. Texture slots have none.
    pub default_value: Option<ParamValue>,
    /// Optional minimum value (for Float type).
    pub min: Option<f32>,
    /// Optional maximum value (for Float type).
    pub max: Option<f32>,
    pub description: String,
}

impl ParamDef {
    fn new(name: impl Into<String>, param_type: ParamType, default_value: Option<ParamValue>) -> Self {
        Self {
            name: name.into(),
            param_type,
            default_value,
            min: None,
            max: None,
            description: String::new(),
        }
    }

    pub fn int(name: impl Into<String>, default: i32) -> Self {
        Self::new(name, ParamType::Int, Some(ParamValue::Int(default)))
    }

    /// An integer slot fed from a boolean.
    pub fn flag(name: impl Into<String>, default: bool) -> Self {
        Self::int(name, default as i32).with_range(0.0, 1.0)
    }

    pub fn float(name: impl Into<String>, default: f32) -> Self {
        Self::new(name, ParamType::Float, Some(ParamValue::Float(default)))
    }

    pub fn vec3(name: impl Into<String>, default: [f32; 3]) -> Self {
        Self::new(name, ParamType::Vec3, Some(ParamValue::Vec3(default)))
    }

    pub fn color(name: impl Into<String>, default: [f32; 4]) -> Self {
        Self::new(name, ParamType::Color, Some(ParamValue::Color(default)))
    }

    pub fn texture2d(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Texture2d, None)
    }

    pub fn cubemap(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Cubemap, None)
    }

    /// Builder: set min/max range.
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Builder: set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Clamp `value` into the declared range. Open ends are left alone.
    pub fn clamp(&self, value: f32) -> f32 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }
}

/// Blend modes for materials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// No blending, fully opaque.
    #[default]
    Opaque,
    /// Standard alpha blending.
    AlphaBlend,
}

impl BlendMode {
    /// Convert to wgpu blend state.
    pub fn to_blend_state(&self) -> wgpu::BlendState {
        match self {
            BlendMode::Opaque => wgpu::BlendState::REPLACE,
            BlendMode::AlphaBlend => wgpu::BlendState::ALPHA_BLENDING,
        }
    }
}

/// A material: parameter schema plus raster state.
#[derive(Clone, Debug)]
pub struct Material {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Vertex shader entry point.
    pub vertex_entry: String,
    /// Fragment shader entry point.
    pub fragment_entry: String,
    /// Parameter schema, in binding order.
    pub params: Vec<ParamDef>,
    pub blend_mode: BlendMode,
    /// Face culling mode.
    pub cull_mode: Option<wgpu::Face>,
    /// Whether to write to depth buffer.
    pub depth_write: bool,
}

impl Material {
    /// Create a new material builder.
    pub fn builder(id: impl Into<String>) -> MaterialBuilder {
        MaterialBuilder::new(id)
    }

    pub fn param(&self, name: &str) -> Option<&ParamDef> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Get the default value for a parameter by name.
    pub fn get_default(&self, name: &str) -> Option<&ParamValue> {
        self.param(name).and_then(|p| p.default_value.as_ref())
    }

    /// Clamp a float against the named slot's range.
    pub fn clamp_param(&self, name: &str, value: f32) -> f32 {
        self.param(name).map_or(value, |p| p.clamp(value))
    }
}

/// Builder for creating materials.
pub struct MaterialBuilder {
    id: String,
    name: String,
    description: String,
    vertex_entry: String,
    fragment_entry: String,
    params: Vec<ParamDef>,
    blend_mode: BlendMode,
    cull_mode: Option<wgpu::Face>,
    depth_write: bool,
}

impl MaterialBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            vertex_entry: "vs_main".to_string(),
            fragment_entry: "fs_main".to_string(),
            params: Vec::new(),
            blend_mode: BlendMode::Opaque,
            cull_mode: Some(wgpu::Face::Back),
            depth_write: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn vertex_entry(mut self, entry: impl Into<String>) -> Self {
        self.vertex_entry = entry.into();
        self
    }

    pub fn fragment_entry(mut self, entry: impl Into<String>) -> Self {
        self.fragment_entry = entry.into();
        self
    }

    pub fn param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    pub fn blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: Option<wgpu::Face>) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn depth_write(mut self, write: bool) -> Self {
        self.depth_write = write;
        self
    }

    pub fn build(self) -> Material {
        Material {
            id: self.id,
            name: self.name,
            description: self.description,
            vertex_entry: self.vertex_entry,
            fragment_entry: self.fragment_entry,
            params: self.params,
            blend_mode: self.blend_mode,
            cull_mode: self.cull_mode,
            depth_write: self.depth_write,
        }
    }
}

/// The black hole material.
///
/// Drawn on the inside of a large proxy sphere (front faces culled) so the
/// effect keeps rendering when the camera enters its bounds.
pub fn black_hole_material() -> Material {
    Material::builder("black_hole")
        .name("Black Hole")
        .description("Ray-marched gravitational lensing over a captured environment")
        .param(ParamDef::flag("render_enabled", true).with_description("Draw the black hole at all"))
        .param(ParamDef::flag("disk_enabled", false).with_description("Draw the accretion disk"))
        .param(ParamDef::flag("disk_doppler", true).with_description("Doppler-shift the disk brightness"))
        .param(ParamDef::float("disk_speed", 1.0).with_description("Disk rotation speed"))
        .param(ParamDef::float("disk_size", 5.0).with_description("Outer disk radius beyond the horizon"))
        .param(ParamDef::float("disk_gap", 2.0).with_description("Empty band between horizon and disk"))
        .param(ParamDef::float("disk_detail", 100.0).with_description("Noise frequency across the disk"))
        .param(
            ParamDef::float("disk_power", 1.0)
                .with_range(0.0, 2.0)
                .with_description("Disk brightness multiplier"),
        )
        .param(ParamDef::color("disk_color", [1.0, 0.0, 0.0, 1.0]).with_description("Disk tint"))
        .param(ParamDef::float("gravity", 1e10).with_description("Mass term of the light bending"))
        .param(ParamDef::float("bounds_radius", 60.0).with_description("Radius of the ray-marched region"))
        .param(ParamDef::int("marching_steps", 20).with_description("Ray-march iterations per pixel"))
        .param(ParamDef::cubemap("skybox_texture").with_description("Captured surroundings"))
        .param(ParamDef::texture2d("noise_texture").with_description("Accretion disk noise"))
        .param(ParamDef::vec3("world_position", [0.0; 3]).with_description("Centre of the black hole"))
        .blend_mode(BlendMode::AlphaBlend)
        .cull_mode(Some(wgpu::Face::Front))
        .depth_write(false)
        .build()
}

/// WGSL source for a material.
#[derive(Clone, Debug)]
pub struct ShaderProgram {
    pub label: String,
    pub source: Cow<'static, str>,
}

impl ShaderProgram {
    pub fn new(label: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
        }
    }

    /// The built-in lensing shader.
    pub fn black_hole() -> Self {
        Self::new("black_hole", include_str!("gpu/shader_black_hole.wgsl"))
    }
}

/// Typed values of every scalar slot of the black hole material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlackHoleParams {
    pub render_enabled: bool,
    pub disk_enabled: bool,
    pub disk_doppler: bool,
    pub disk_speed: f32,
    pub disk_size: f32,
    pub disk_gap: f32,
    pub disk_detail: f32,
    pub disk_power: f32,
    pub disk_color: [f32; 4],
    pub gravity: f32,
    pub bounds_radius: f32,
    pub marching_steps: i32,
    pub world_position: Vec3,
}

impl BlackHoleParams {
    pub fn to_uniforms(&self) -> BlackHoleUniforms {
        BlackHoleUniforms {
            world_position: self.world_position.extend(1.0).to_array(),
            disk_color: self.disk_color,
            render_enabled: self.render_enabled as i32,
            disk_enabled: self.disk_enabled as i32,
            disk_doppler: self.disk_doppler as i32,
            marching_steps: self.marching_steps,
            disk_speed: self.disk_speed,
            disk_size: self.disk_size,
            disk_gap: self.disk_gap,
            disk_detail: self.disk_detail,
            disk_power: self.disk_power,
            gravity: self.gravity,
            bounds_radius: self.bounds_radius,
            _pad: 0.0,
        }
    }
}

/// Material uniform block, matching `BlackHole` in `shader_black_hole.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BlackHoleUniforms {
    /// World position (vec4, w unused).
    pub world_position: [f32; 4],
    pub disk_color: [f32; 4],
    pub render_enabled: i32,
    pub disk_enabled: i32,
    pub disk_doppler: i32,
    pub marching_steps: i32,
    pub disk_speed: f32,
    pub disk_size: f32,
    pub disk_gap: f32,
    pub disk_detail: f32,
    pub disk_power: f32,
    pub gravity: f32,
    pub bounds_radius: f32,
    pub _pad: f32,
}

/// A material with every slot bound for one effect instance.
#[derive(Debug)]
pub struct BoundMaterial {
    material: Arc<Material>,
    shader: Arc<ShaderProgram>,
    params: BlackHoleParams,
    skybox: Arc<EnvironmentMap>,
    noise: Arc<Texture2d>,
}

impl BoundMaterial {
    pub fn new(
        material: Arc<Material>,
        shader: Arc<ShaderProgram>,
        params: BlackHoleParams,
        skybox: Arc<EnvironmentMap>,
        noise: Arc<Texture2d>,
    ) -> Self {
        Self {
            material,
            shader,
            params,
            skybox,
            noise,
        }
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    pub fn shader(&self) -> &Arc<ShaderProgram> {
        &self.shader
    }

    pub fn params(&self) -> &BlackHoleParams {
        &self.params
    }

    pub fn skybox(&self) -> &Arc<EnvironmentMap> {
        &self.skybox
    }

    pub fn noise(&self) -> &Arc<Texture2d> {
        &self.noise
    }

    /// Overwrite the `world_position` slot.
    pub fn set_world_position(&mut self, position: Vec3) {
        self.params.world_position = position;
    }

    pub fn uniforms(&self) -> BlackHoleUniforms {
        self.params.to_uniforms()
    }

    /// Current value of a named slot.
    pub fn slot(&self, name: &str) -> Option<ParamValue> {
        let p = &self.params;
        let value = match name {
            "render_enabled" => ParamValue::Int(p.render_enabled as i32),
            "disk_enabled" => ParamValue::Int(p.disk_enabled as i32),
            "disk_doppler" => ParamValue::Int(p.disk_doppler as i32),
            "disk_speed" => ParamValue::Float(p.disk_speed),
            "disk_size" => ParamValue::Float(p.disk_size),
            "disk_gap" => ParamValue::Float(p.disk_gap),
            "disk_detail" => ParamValue::Float(p.disk_detail),
            "disk_power" => ParamValue::Float(p.disk_power),
            "disk_color" => ParamValue::Color(p.disk_color),
            "gravity" => ParamValue::Float(p.gravity),
            "bounds_radius" => ParamValue::Float(p.bounds_radius),
            "marching_steps" => ParamValue::Int(p.marching_steps),
            "skybox_texture" => ParamValue::Cubemap {
                resolution: self.skybox.resolution(),
            },
            "noise_texture" => ParamValue::Texture2d {
                label: self.noise.label.clone(),
                width: self.noise.width,
                height: self.noise.height,
            },
            "world_position" => ParamValue::Vec3(p.world_position.to_array()),
            _ => return None,
        };
        Some(value)
    }

    /// Every slot of the material schema with its current value, in schema order.
    pub fn slots(&self) -> Vec<(String, ParamValue)> {
        self.material
            .params
            .iter()
            .filter_map(|def| self.slot(&def.name).map(|value| (def.name.clone(), value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureBackend, SoftwareCaptureBackend};

    fn params() -> BlackHoleParams {
        BlackHoleParams {
            render_enabled: true,
            disk_enabled: false,
            disk_doppler: true,
            disk_speed: 1.0,
            disk_size: 5.0,
            disk_gap: 2.0,
            disk_detail: 100.0,
            disk_power: 1.0,
            disk_color: [1.0, 0.0, 0.0, 1.0],
            gravity: 1e10,
            bounds_radius: 60.0,
            marching_steps: 20,
            world_position: Vec3::new(1.0, 2.0, 3.0),
        }
    }

    fn bound() -> BoundMaterial {
        let skybox = SoftwareCaptureBackend::new().allocate_cubemap(4).unwrap();
        BoundMaterial::new(
            Arc::new(black_hole_material()),
            Arc::new(ShaderProgram::new("test", "")),
            params(),
            Arc::new(skybox),
            Arc::new(Texture2d::value_noise(8, 1, 0)),
        )
    }

    #[test]
    fn test_schema_lists_every_slot() {
        let material = black_hole_material();
        let names: Vec<&str> = material.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "render_enabled",
                "disk_enabled",
                "disk_doppler",
                "disk_speed",
                "disk_size",
                "disk_gap",
                "disk_detail",
                "disk_power",
                "disk_color",
                "gravity",
                "bounds_radius",
                "marching_steps",
                "skybox_texture",
                "noise_texture",
                "world_position",
            ]
        );
        assert_eq!(material.get_default("skybox_texture"), None);
        assert_eq!(material.get_default("marching_steps"), Some(&ParamValue::Int(20)));
    }

    #[test]
    fn test_schema_types_match_slot_values() {
        let bound = bound();
        for def in &bound.material().params {
            let value = bound.slot(&def.name).unwrap();
            assert_eq!(value.param_type(), def.param_type, "{}", def.name);
        }
        assert_eq!(bound.slots().len(), 15);
        assert!(bound.slot("nonexistent").is_none());
    }

    #[test]
    fn test_clamp_uses_declared_range() {
        let material = black_hole_material();
        let clamped: Vec<f32> = [-5.0, 0.0, 1.0, 2.0, 7.0]
            .iter()
            .map(|v| material.clamp_param("disk_power", *v))
            .collect();
        assert_eq!(clamped, vec![0.0, 0.0, 1.0, 2.0, 2.0]);
        // No range declared, no clamping.
        assert_eq!(material.clamp_param("gravity", -3.0), -3.0);
    }

    #[test]
    fn test_flags_bind_as_integers() {
        let bound = bound();
        assert_eq!(bound.slot("render_enabled"), Some(ParamValue::Int(1)));
        assert_eq!(bound.slot("disk_enabled"), Some(ParamValue::Int(0)));
        assert_eq!(bound.slot("disk_doppler"), Some(ParamValue::Int(1)));
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<BlackHoleUniforms>(), 80);

        let uniforms = params().to_uniforms();
        assert_eq!(uniforms.world_position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniforms.render_enabled, 1);
        assert_eq!(uniforms.disk_enabled, 0);
        assert_eq!(uniforms.marching_steps, 20);
    }

    #[test]
    fn test_set_world_position_overwrites() {
        let mut bound = bound();
        bound.set_world_position(Vec3::new(-4.0, 0.5, 9.0));
        assert_eq!(bound.slot("world_position"), Some(ParamValue::Vec3([-4.0, 0.5, 9.0])));
        assert_eq!(bound.uniforms().world_position, [-4.0, 0.5, 9.0, 1.0]);
    }

    #[test]
    fn test_texture_slots_describe_bindings() {
        let bound = bound();
        assert_eq!(bound.slot("skybox_texture"), Some(ParamValue::Cubemap { resolution: 4 }));
        assert_eq!(
            bound.slot("noise_texture"),
            Some(ParamValue::Texture2d {
                label: "value_noise_0".to_string(),
                width: 8,
                height: 8,
            })
        );
    }

    #[test]
    fn test_builtin_shader_has_material_entry_points() {
        let material = black_hole_material();
        let shader = ShaderProgram::black_hole();
        assert!(shader.source.contains(&format!("fn {}", material.vertex_entry)));
        assert!(shader.source.contains(&format!("fn {}", material.fragment_entry)));
    }

    #[test]
    fn test_black_hole_material_raster_state() {
        let material = black_hole_material();
        assert_eq!(material.blend_mode, BlendMode::AlphaBlend);
        assert_eq!(material.cull_mode, Some(wgpu::Face::Front));
        assert!(!material.depth_write);
    }
}
