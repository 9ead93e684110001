use image::RgbaImage;

use crate::uniforms::Color;

/// How shader output combines with the decorated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Composite {
    /// Pixels where the content is fully transparent stay transparent.
    #[default]
    MaskByContent,
    /// Shader output replaces the content everywhere.
    Replace,
}

impl Composite {
    /// Final pixel for a shader result over content with alpha `content_alpha`.
    pub fn apply(self, shaded: Color, content_alpha: f32) -> Color {
        match self {
            Composite::MaskByContent if content_alpha <= 0.0 => Color::TRANSPARENT,
            _ => shaded,
        }
    }
}

impl std::str::FromStr for Composite {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mask" | "mask-by-content" => Ok(Composite::MaskByContent),
            "replace" => Ok(Composite::Replace),
            other => Err(format!(
                "unknown composite mode '{other}'; expected 'mask' or 'replace'"
            )),
        }
    }
}

/// Source-over blends `layer` onto `canvas` in place. Both images must have
/// the same dimensions; extra pixels in either are ignored.
pub fn blend_over(canvas: &mut RgbaImage, layer: &RgbaImage) {
    for (dst, src) in canvas.pixels_mut().zip(layer.pixels()) {
        let src_a = src.0[3] as f32 / 255.0;
        if src_a <= 0.0 {
            continue;
        }
        let dst_a = dst.0[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        let mut out = [0u8; 4];
        for channel in 0..3 {
            let s = src.0[channel] as f32 / 255.0;
            let d = dst.0[channel] as f32 / 255.0;
            let value = (s * src_a + d * dst_a * (1.0 - src_a)) / out_a;
            out[channel] = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
        out[3] = (out_a.clamp(0.0, 1.0) * 255.0).round() as u8;
        dst.0 = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn mask_clears_pixels_without_content() {
        let shaded = Color::rgba(0.2, 0.4, 0.9, 1.0);
        assert_eq!(Composite::MaskByContent.apply(shaded, 0.0), Color::TRANSPARENT);
        assert_eq!(Composite::MaskByContent.apply(shaded, 0.01), shaded);
        assert_eq!(Composite::Replace.apply(shaded, 0.0), shaded);
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("Mask".parse::<Composite>(), Ok(Composite::MaskByContent));
        assert_eq!("replace".parse::<Composite>(), Ok(Composite::Replace));
        assert!("multiply".parse::<Composite>().is_err());
    }

    #[test]
    fn opaque_layer_replaces_canvas() {
        let mut canvas = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 255, 255]));
        let mut layer = RgbaImage::new(2, 1);
        layer.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        blend_over(&mut canvas, &layer);

        assert_eq!(canvas.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(1, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn half_transparent_layer_mixes_colors() {
        let mut canvas = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let layer = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 128]));
        blend_over(&mut canvas, &layer);

        let [r, g, b, a] = canvas.get_pixel(0, 0).0;
        assert_eq!(a, 255);
        assert!(r.abs_diff(128) <= 1 && r == g && g == b);
    }
}
