//! Raster drawing helpers shared by the simulated viewport and the grid
//! overlay.

use std::io::Cursor;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// An opaque RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Creates a colour from its channels.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` or `rrggbb`.
    #[must_use]
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Returns the colour with the given alpha.
    #[must_use]
    pub const fn with_alpha(self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }

    /// Scales brightness by `factor` (clamped to 0..=1).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn shade(self, factor: f64) -> Self {
        let f = factor.clamp(0.0, 1.0);
        let scale = |c: u8| (f64::from(c) * f).round() as u8;
        Self::rgb(scale(self.r), scale(self.g), scale(self.b))
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&value).ok_or_else(|| format!("invalid colour '{value}', expected #rrggbb"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Creates an image filled with `background`.
#[must_use]
pub fn blank(width: u32, height: u32, background: Color) -> RgbaImage {
    RgbaImage::from_pixel(width, height, background.with_alpha(255))
}

/// Alpha-blends `src` over `dst`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn blend_at(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(img.width()) || y >= i64::from(img.height()) {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    let dst = *img.get_pixel(x, y);
    img.put_pixel(x, y, blend_pixel(dst, color));
}

/// Fills a disc centred on `(cx, cy)`.
#[allow(clippy::cast_possible_truncation)]
pub fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    let min_x = (cx - radius).floor() as i64;
    let max_x = (cx + radius).ceil() as i64;
    let min_y = (cy - radius).floor() as i64;
    let max_y = (cy + radius).ceil() as i64;
    let r2 = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            #[allow(clippy::cast_precision_loss)]
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            if dx * dx + dy * dy <= r2 {
                blend_at(img, x, y, color);
            }
        }
    }
}

/// Draws a line of the given pixel width by stamping discs along it.
#[allow(clippy::cast_possible_truncation)]
pub fn draw_thick_line(
    img: &mut RgbaImage,
    from: (f64, f64),
    to: (f64, f64),
    width: f64,
    color: Rgba<u8>,
) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = (dx * dx + dy * dy).sqrt().max(1.0).ceil() as i32;
    let radius = (width.max(1.0) / 2.0).max(0.6);
    for step in 0..=steps {
        let t = f64::from(step) / f64::from(steps);
        draw_disc(img, from.0 + dx * t, from.1 + dy * t, radius, color);
    }
}

/// Fills an axis-aligned rectangle given in pixels (inclusive-exclusive).
#[allow(clippy::cast_possible_truncation)]
pub fn fill_rect(img: &mut RgbaImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgba<u8>) {
    for y in y0.floor() as i64..y1.ceil() as i64 {
        for x in x0.floor() as i64..x1.ceil() as i64 {
            blend_at(img, x, y, color);
        }
    }
}

/// Width in pixels of `text` drawn at `scale`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * 8 * scale.max(1)
}

/// Draws `text` with the 8x8 bitmap font, top-left at `(x, y)`.
pub fn draw_text(img: &mut RgbaImage, x: i64, y: i64, text: &str, scale: u32, color: Rgba<u8>) {
    let scale = i64::from(scale.max(1));
    let mut cursor_x = x;
    for ch in text.chars() {
        if let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) {
            for (row_idx, row_bits) in (0_i64..).zip(glyph.iter()) {
                for col_idx in 0..8_i64 {
                    if (row_bits >> col_idx) & 1 == 0 {
                        continue;
                    }
                    let px = cursor_x + col_idx * scale;
                    let py = y + row_idx * scale;
                    for sy in 0..scale {
                        for sx in 0..scale {
                            blend_at(img, px + sx, py + sy, color);
                        }
                    }
                }
            }
        }
        cursor_x += 8 * scale;
    }
}

/// Draws `text` on a translucent dark plate for legibility.
pub fn draw_label(img: &mut RgbaImage, x: i64, y: i64, text: &str, scale: u32, color: Rgba<u8>) {
    let pad = 2.0;
    #[allow(clippy::cast_precision_loss)]
    let (fx, fy) = (x as f64, y as f64);
    let w = f64::from(text_width(text, scale));
    let h = f64::from(8 * scale.max(1));
    fill_rect(img, fx - pad, fy - pad, fx + w + pad, fy + h + pad, Rgba([0, 0, 0, 150]));
    draw_text(img, x, y, text, scale, color);
}

/// Encodes an image as PNG bytes.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_colours() {
        assert_eq!(Color::parse_hex("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(Color::parse_hex("00ff00"), Some(Color::rgb(0, 255, 0)));
        assert_eq!(Color::parse_hex("#fff"), None);
        assert_eq!(Color::parse_hex("#gg0000"), None);
        assert_eq!(Color::rgb(1, 2, 255).to_string(), "#0102ff");
    }

    #[test]
    fn opaque_blend_replaces_pixel() {
        let out = blend_pixel(Rgba([10, 10, 10, 255]), Rgba([200, 100, 50, 255]));
        assert_eq!(out, Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn disc_is_clipped_to_image() {
        let mut img = blank(10, 10, Color::rgb(0, 0, 0));
        draw_disc(&mut img, 0.0, 0.0, 3.0, Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(9, 9), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn text_marks_pixels() {
        let mut img = blank(32, 16, Color::rgb(0, 0, 0));
        draw_text(&mut img, 0, 0, "A1", 1, Rgba([255, 255, 255, 255]));
        let lit = img.pixels().filter(|p| p[0] == 255).count();
        assert!(lit > 0);
        assert_eq!(text_width("A1", 2), 32);
    }

    #[test]
    fn png_has_signature() {
        let img = blank(4, 4, Color::rgb(1, 2, 3));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
