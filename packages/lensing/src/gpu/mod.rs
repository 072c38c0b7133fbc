pub mod capture;
pub mod material_pipeline;
pub mod mesh;
pub mod renderer;
pub mod scene_pass;
