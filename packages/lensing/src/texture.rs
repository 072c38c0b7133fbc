//! CPU-side 2D textures.
//!
//! Textures are shared between effects as `Arc<Texture2d>` and uploaded to
//! the GPU by whichever renderer binds them.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// An RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture2d {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

impl Texture2d {
    pub fn from_rgba8(label: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, String> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(format!(
                "Expected {} bytes for a {}x{} RGBA8 texture, got {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            label: label.into(),
            width,
            height,
            pixels,
        })
    }

    /// Load any image format supported by the `image` crate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Self::from_rgba8(path.display().to_string(), width, height, image.into_raw())
    }

    /// Tileable grayscale value noise, summed over `octaves` octaves (at most 8).
    ///
    /// Same seed, same texture.
    pub fn value_noise(size: u32, octaves: u32, seed: u64) -> Self {
        let size = size.max(1);
        let octaves = octaves.clamp(1, 8);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut values = vec![0.0f32; (size * size) as usize];
        let mut amplitude = 0.5;
        let mut total_amplitude = 0.0;

        for octave in 0..octaves {
            let cells = (4u32 << octave).min(size);
            let lattice: Vec<f32> = (0..cells * cells).map(|_| rng.gen::<f32>()).collect();
            let at = |x: u32, y: u32| lattice[((y % cells) * cells + (x % cells)) as usize];

            for y in 0..size {
                for x in 0..size {
                    let fx = x as f32 * cells as f32 / size as f32;
                    let fy = y as f32 * cells as f32 / size as f32;
                    let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
                    let (tx, ty) = (smoothstep(fx.fract()), smoothstep(fy.fract()));

                    let top = lerp(at(x0, y0), at(x0 + 1, y0), tx);
                    let bottom = lerp(at(x0, y0 + 1), at(x0 + 1, y0 + 1), tx);
                    values[(y * size + x) as usize] += lerp(top, bottom, ty) * amplitude;
                }
            }

            total_amplitude += amplitude;
            amplitude *= 0.5;
        }

        let pixels = values
            .iter()
            .flat_map(|v| {
                let g = ((v / total_amplitude).clamp(0.0, 1.0) * 255.0).round() as u8;
                [g, g, g, 255]
            })
            .collect();

        Self {
            label: format!("value_noise_{}", seed),
            width: size,
            height: size,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y % self.height) * self.width + (x % self.width)) as usize * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba8_checks_length() {
        assert!(Texture2d::from_rgba8("ok", 2, 2, vec![0; 16]).is_ok());
        assert!(Texture2d::from_rgba8("short", 2, 2, vec![0; 15]).is_err());
        assert!(Texture2d::from_rgba8("empty", 0, 2, vec![]).is_err());
    }

    #[test]
    fn test_value_noise_is_deterministic() {
        let a = Texture2d::value_noise(32, 3, 7);
        let b = Texture2d::value_noise(32, 3, 7);
        let c = Texture2d::value_noise(32, 3, 8);
        assert_eq!(a, b);
        assert_ne!(a.pixels, c.pixels);
        assert_eq!(a.pixels.len(), 32 * 32 * 4);
    }

    #[test]
    fn test_value_noise_is_grayscale_and_opaque() {
        let noise = Texture2d::value_noise(16, 2, 1);
        for y in 0..16 {
            for x in 0..16 {
                let [r, g, b, a] = noise.pixel(x, y);
                assert_eq!(r, g);
                assert_eq!(g, b);
                assert_eq!(a, 255);
            }
        }
    }

    #[test]
    fn test_pixel_wraps() {
        let texture = Texture2d::from_rgba8("t", 2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(texture.pixel(1, 0), [5, 6, 7, 8]);
        assert_eq!(texture.pixel(2, 0), [1, 2, 3, 4]);
    }
}
