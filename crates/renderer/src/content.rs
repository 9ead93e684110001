//! Renderable content that effects decorate.
//!
//! Any [`Content`] can be rendered to an offscreen RGBA buffer at a given
//! resolution; shaders see that buffer through [`ContentSampler`] as the
//! implicit `content` input.

use std::path::Path;
use std::rc::Rc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::uniforms::{Color, Resolution};

/// Something that can be rendered into an offscreen buffer.
pub trait Content {
    fn render(&self, resolution: Resolution) -> RgbaImage;
}

impl<T: Content + ?Sized> Content for &T {
    fn render(&self, resolution: Resolution) -> RgbaImage {
        (**self).render(resolution)
    }
}

impl<T: Content + ?Sized> Content for Box<T> {
    fn render(&self, resolution: Resolution) -> RgbaImage {
        (**self).render(resolution)
    }
}

impl<T: Content + ?Sized> Content for Rc<T> {
    fn render(&self, resolution: Resolution) -> RgbaImage {
        (**self).render(resolution)
    }
}

/// Read access to rendered content using shader pixel coordinates.
#[derive(Clone, Copy)]
pub struct ContentSampler<'a> {
    image: &'a RgbaImage,
}

impl<'a> ContentSampler<'a> {
    pub fn new(image: &'a RgbaImage) -> Self {
        Self { image }
    }

    /// Texel at `floor(coord)`, clamped to the image bounds.
    pub fn eval(&self, coord: [f32; 2]) -> Color {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return Color::TRANSPARENT;
        }
        let x = clamp_axis(coord[0], width);
        let y = clamp_axis(coord[1], height);
        Color::from_rgba8(self.image.get_pixel(x, y).0)
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.image
            .get_pixel_checked(x, y)
            .map(|pixel| pixel.0[3])
            .unwrap_or(0)
    }
}

fn clamp_axis(value: f32, extent: u32) -> u32 {
    if value.is_nan() || value < 0.0 {
        return 0;
    }
    (value.floor() as u32).min(extent - 1)
}

/// Fully transparent content; decorating it only makes sense with
/// [`Composite::Replace`](crate::Composite::Replace).
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl Content for Empty {
    fn render(&self, resolution: Resolution) -> RgbaImage {
        RgbaImage::new(resolution.width, resolution.height)
    }
}

/// Solid color covering the whole surface.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub color: Color,
}

impl Fill {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl Content for Fill {
    fn render(&self, resolution: Resolution) -> RgbaImage {
        RgbaImage::from_pixel(
            resolution.width,
            resolution.height,
            Rgba(self.color.to_rgba8()),
        )
    }
}

/// Rounded rectangle filling the surface, the shape of a button.
///
/// Corners outside the rounding are transparent; edges are anti-aliased over
/// one pixel.
#[derive(Debug, Clone, Copy)]
pub struct Pill {
    pub color: Color,
    /// Corner radius in pixels; `None` rounds the short side fully.
    pub radius: Option<f32>,
}

impl Pill {
    pub fn new(color: Color) -> Self {
        Self {
            color,
            radius: None,
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }
}

impl Content for Pill {
    fn render(&self, resolution: Resolution) -> RgbaImage {
        let [width, height] = resolution.as_vec2();
        let half = [width * 0.5, height * 0.5];
        let radius = self
            .radius
            .unwrap_or(half[0].min(half[1]))
            .clamp(0.0, half[0].min(half[1]));

        RgbaImage::from_fn(resolution.width, resolution.height, |x, y| {
            let p = [x as f32 + 0.5 - half[0], y as f32 + 0.5 - half[1]];
            let q = [
                p[0].abs() - (half[0] - radius),
                p[1].abs() - (half[1] - radius),
            ];
            let outside = (q[0].max(0.0).powi(2) + q[1].max(0.0).powi(2)).sqrt();
            let distance = outside + q[0].max(q[1]).min(0.0) - radius;
            let coverage = (0.5 - distance).clamp(0.0, 1.0);
            let mut color = self.color;
            color.a *= coverage;
            Rgba(color.to_rgba8())
        })
    }
}

/// Bitmap content scaled to the paint surface.
#[derive(Debug, Clone)]
pub struct ImageContent {
    image: RgbaImage,
}

impl ImageContent {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        Ok(Self::new(image::open(path)?.to_rgba8()))
    }
}

impl Content for ImageContent {
    fn render(&self, resolution: Resolution) -> RgbaImage {
        if self.image.dimensions() == (resolution.width, resolution.height) {
            return self.image.clone();
        }
        imageops::resize(
            &self.image,
            resolution.width,
            resolution.height,
            FilterType::Triangle,
        )
    }
}
