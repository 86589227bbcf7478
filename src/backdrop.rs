//! Generated last-resort background: a vertical two-color gradient.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

use crate::fallback::Dimensions;

/// Parse `#rrggbb`.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

/// PNG of `dimensions` fading from `top` to `bottom`.
pub fn gradient_png(
    dimensions: Dimensions,
    top: [u8; 3],
    bottom: [u8; 3],
) -> Result<Vec<u8>, image::ImageError> {
    let width = dimensions.width.max(1);
    let height = dimensions.height.max(1);
    let span = (height - 1).max(1) as f32;
    let rows: Vec<Rgb<u8>> = (0..height)
        .map(|y| {
            let t = y as f32 / span;
            Rgb([
                lerp(top[0], bottom[0], t),
                lerp(top[1], bottom[1], t),
                lerp(top[2], bottom[2], t),
            ])
        })
        .collect();

    let image = RgbImage::from_fn(width, height, |_, y| rows[y as usize]);
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#1a1a2e"), Some([0x1a, 0x1a, 0x2e]));
        assert_eq!(parse_hex_color(" #FFFFFF "), Some([255, 255, 255]));
        assert_eq!(parse_hex_color("1a1a2e"), None);
        assert_eq!(parse_hex_color("#1a1a2"), None);
        assert_eq!(parse_hex_color("#+a1a2e"), None);
        assert_eq!(parse_hex_color("#ééé"), None);
    }

    #[test]
    fn test_gradient_runs_top_to_bottom() {
        let png = gradient_png(Dimensions::new(4, 11), [0, 0, 0], [200, 100, 50]).unwrap();
        assert!(png.starts_with(b"\x89PNG"));

        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 11));
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(decoded.get_pixel(3, 5), &Rgb([100, 50, 25]));
        assert_eq!(decoded.get_pixel(2, 10), &Rgb([200, 100, 50]));
    }
}
