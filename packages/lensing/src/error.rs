//! Error types for effect setup.
//!
//! Every variant is a setup-time failure. The per-frame update path has no
//! error channel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EffectError {
    #[error("no shader program assigned to the effect")]
    MissingShader,

    #[error("no base mesh assigned to the effect")]
    MissingMesh,

    #[error("no accretion disk noise texture assigned to the effect")]
    MissingNoiseTexture,

    #[error("cannot allocate a {resolution}x{resolution} HDR cubemap: {reason}")]
    CubemapAllocation { resolution: u32, reason: String },

    #[error("environment capture failed: {0}")]
    Capture(String),

    #[error("invalid effect configuration: {0}")]
    InvalidConfig(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}
