//! Image file adapter around the `image` crate.
//!
//! Kept apart from the core types: the stages only ever see [`PixelBuffer`]s.
use std::path::Path;

use crate::{
    buffer::PixelBuffer,
    foundation::error::{ParconvError, ParconvResult},
};

/// Decode any format `image` understands into a normalized RGB buffer.
pub fn load_image(path: &Path) -> ParconvResult<PixelBuffer> {
    let img = image::open(path)
        .map_err(|e| ParconvError::codec(format!("decode '{}': {e}", path.display())))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    PixelBuffer::from_rgba8(width, height, img.as_raw())
}

/// Encode `buf` as an opaque RGBA8 PNG, clamping samples to `[0, 1]`.
pub fn save_png(buf: &PixelBuffer, path: &Path) -> ParconvResult<()> {
    image::save_buffer_with_format(
        path,
        &buf.to_rgba8(),
        buf.width(),
        buf.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|e| ParconvError::codec(format!("write png '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Rgb;

    #[test]
    fn png_round_trip_preserves_quantized_pixels() {
        let dir = std::path::PathBuf::from("target").join("codec_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("round_trip.png");

        let buf = PixelBuffer::from_fn(4, 3, |x, y| {
            Rgb::new(x as f32 / 3.0, y as f32 / 2.0, if x == y { 1.0 } else { 0.0 })
        })
        .unwrap();
        save_png(&buf, &path).unwrap();
        let back = load_image(&path).unwrap();

        assert_eq!(back.dimensions(), (4, 3));
        assert!(back.max_abs_diff(&buf).unwrap() <= 0.5 / 255.0 + 1e-6);
    }

    #[test]
    fn missing_file_is_a_codec_error() {
        let err = load_image(Path::new("target/does-not-exist.png")).unwrap_err();
        assert!(matches!(err, ParconvError::Codec(_)));
    }
}
