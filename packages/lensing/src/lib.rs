pub mod error;
pub mod config;

// Host scene
pub mod camera;
pub mod mesh_asset;
pub mod scene_graph;
pub mod texture;

// Effect
pub mod black_hole;
pub mod capture;
pub mod material;

pub mod gpu;
pub mod cli;

pub use black_hole::{BlackHole, BlackHoleDescriptor, EffectAssets};
pub use capture::{capture_environment, CaptureBackend, EnvironmentMap, SoftwareCaptureBackend};
pub use config::{CaptureSettings, EffectConfig};
pub use error::EffectError;
