//! Dominant-color palette extraction, per spec.md §4.6 step 5
//!
//! Grounded in the pack's own `image`-crate dominant-color/thumbnail code
//! (`other_examples/.../cleoapp__api-src-thumbnails.rs.rs`'s
//! `image::ImageReader` decode-then-thumbnail idiom): decode, downscale to a
//! small fixed grid, bucket pixels into a coarse histogram, then derive
//! primary/secondary/foreground and the CSS gradient + blur placeholder from
//! that histogram. No teacher precedent exists for the domain logic itself
//! (dominant-color extraction), so this module is grounded on the pack's
//! `image`-crate usage pattern rather than thorium.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::gradient::models::Gradient;
use crate::utils::{ApiError, ErrorKind};

/// The grid an image is downscaled to before histogram bucketing
const SAMPLE_GRID: u32 = 16;
/// How many buckets to quantize each color channel into (coarse histogram)
const BUCKET_STEP: u8 = 32;
/// The side length of the tiny blurred placeholder, in pixels
const BLUR_SIZE: u32 = 8;
/// How many palette entries to keep, ordered by frequency
const PALETTE_SIZE: usize = 5;

/// Extract a [`Gradient`] from raw, still-encoded image bytes.
pub fn extract(image_bytes: &[u8]) -> Result<Gradient, ApiError> {
    if image_bytes.is_empty() {
        return Err(ApiError::new(
            ErrorKind::InvalidInput,
            Some("image body is empty".to_owned()),
        ));
    }
    let img = image::ImageReader::new(Cursor::new(image_bytes))
        .with_guessed_format()
        .map_err(|err| {
            ApiError::new(
                ErrorKind::InvalidInput,
                Some(format!("failed to sniff image format: {err}")),
            )
        })?
        .decode()?;

    let small = img.resize_exact(SAMPLE_GRID, SAMPLE_GRID, FilterType::Triangle);
    let palette = histogram_palette(&small);
    let primary = palette.first().cloned().unwrap_or((0, 0, 0));
    let secondary = pick_secondary(&palette, primary);
    let foreground = contrast_foreground(primary);

    let primary_hex = to_hex(primary);
    let secondary_hex = to_hex(secondary);
    let css_gradient = format!("linear-gradient(135deg, {primary_hex} 0%, {secondary_hex} 100%)");
    let blur_data_url = blur_placeholder(&img)?;

    Ok(Gradient {
        palette: palette
            .into_iter()
            .take(PALETTE_SIZE)
            .map(to_hex)
            .collect(),
        primary: primary_hex,
        secondary: secondary_hex,
        foreground,
        css_gradient,
        blur_data_url,
    })
}

/// Bucket every pixel in a (small) image into a coarse RGB histogram and
/// return the buckets ordered from most to least frequent.
fn histogram_palette(img: &DynamicImage) -> Vec<(u8, u8, u8)> {
    use std::collections::HashMap;

    let mut counts: HashMap<(u8, u8, u8), u32> = HashMap::new();
    for (_, _, pixel) in img.pixels() {
        let [r, g, b, a] = pixel.0;
        if a < 16 {
            // skip near-fully-transparent pixels; they shouldn't drive the palette
            continue;
        }
        let bucket = (quantize(r), quantize(g), quantize(b));
        *counts.entry(bucket).or_insert(0) += 1;
    }
    if counts.is_empty() {
        // fully transparent image: fall back to a neutral gray
        return vec![(128, 128, 128)];
    }
    let mut ordered: Vec<((u8, u8, u8), u32)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1));
    ordered.into_iter().map(|(color, _)| color).collect()
}

fn quantize(channel: u8) -> u8 {
    (channel / BUCKET_STEP) * BUCKET_STEP
}

/// The second most distinct color from `primary` by squared Euclidean
/// distance in RGB space; falls back to `primary` itself for a monochrome
/// image so the gradient string is still well-formed.
fn pick_secondary(palette: &[(u8, u8, u8)], primary: (u8, u8, u8)) -> (u8, u8, u8) {
    palette
        .iter()
        .copied()
        .filter(|&c| c != primary)
        .max_by_key(|&c| color_distance_sq(c, primary))
        .unwrap_or(primary)
}

fn color_distance_sq(a: (u8, u8, u8), b: (u8, u8, u8)) -> u32 {
    let dr = i32::from(a.0) - i32::from(b.0);
    let dg = i32::from(a.1) - i32::from(b.1);
    let db = i32::from(a.2) - i32::from(b.2);
    (dr * dr + dg * dg + db * db) as u32
}

/// Black or white, chosen by relative luminance contrast against `primary`
fn contrast_foreground(color: (u8, u8, u8)) -> String {
    let luminance = 0.299 * f64::from(color.0) + 0.587 * f64::from(color.1) + 0.114 * f64::from(color.2);
    if luminance > 140.0 {
        "#000000".to_owned()
    } else {
        "#ffffff".to_owned()
    }
}

fn to_hex(color: (u8, u8, u8)) -> String {
    format!("#{:02x}{:02x}{:02x}", color.0, color.1, color.2)
}

/// Re-encode a further-downscaled copy of the image as a base64 data URL,
/// used as a tiny blurred loading placeholder.
fn blur_placeholder(img: &DynamicImage) -> Result<String, ApiError> {
    let tiny = img
        .resize_exact(BLUR_SIZE, BLUR_SIZE, FilterType::Triangle)
        .blur(1.0);
    let mut buf = Cursor::new(Vec::new());
    tiny.write_to(&mut buf, ImageFormat::Png)?;
    Ok(format!(
        "data:image/png;base64,{}",
        BASE64.encode(buf.into_inner())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_png(color: [u8; 3]) -> Vec<u8> {
        let mut img = image::RgbImage::new(32, 32);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb(color);
        }
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn extracts_a_gradient_from_a_solid_color_image() {
        let bytes = solid_png([200, 20, 20]);
        let gradient = extract(&bytes).unwrap();
        assert!(gradient.primary.starts_with('#'));
        assert!(gradient.css_gradient.contains("linear-gradient"));
        assert!(gradient.blur_data_url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn empty_bytes_are_rejected() {
        assert!(extract(&[]).is_err());
    }

    #[test]
    fn dark_primary_picks_white_foreground() {
        assert_eq!(contrast_foreground((10, 10, 10)), "#ffffff");
    }

    #[test]
    fn light_primary_picks_black_foreground() {
        assert_eq!(contrast_foreground((250, 250, 250)), "#000000");
    }
}
